//! Layered configuration: defaults, YAML file, `IDM_*` environment, CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use idm_client::{
    ClientConfig, DEFAULT_ORG_HEADER, DEFAULT_PAGE_SIZE, ExponentialBackoff, ReadRetry,
    SecretString,
};
use serde::{Deserialize, Deserializer};

/// Config file read when `--config` is not given (ignored if absent).
pub const DEFAULT_CONFIG_FILE: &str = "idm-admin.yaml";

/// Prefix of environment overrides; nested keys use `__` (`IDM_REDIRECT__CALLBACK_PATH`).
pub const ENV_PREFIX: &str = "IDM_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Load(#[from] Box<figment::Error>),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the identity platform, e.g. `https://idp.example.com`
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub access_token: Option<SecretString>,
    /// Default organization; numeric ids are accepted unquoted
    #[serde(default, deserialize_with = "string_or_number")]
    pub org_id: String,
    #[serde(default = "default_org_header")]
    pub org_header: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_read_retries")]
    pub read_retries: usize,
    /// Pause between bulk mutations, in humantime notation (`50ms`, `1s`)
    #[serde(default = "default_mutation_pause")]
    pub mutation_pause: String,
    /// Last IPv4 octet used in redirect hosts; detected when unset
    #[serde(default)]
    pub app_last_octet: Option<u8>,
    #[serde(default)]
    pub redirect: RedirectConfig,
}

/// Shape of the redirect URIs written by `update-redirects`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectConfig {
    /// Base URL with an `{octet}` placeholder
    #[serde(default = "default_host_template")]
    pub host_template: String,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_post_logout_path")]
    pub post_logout_path: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            host_template: default_host_template(),
            callback_path: default_callback_path(),
            post_logout_path: default_post_logout_path(),
        }
    }
}

fn default_org_header() -> String {
    DEFAULT_ORG_HEADER.to_owned()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_read_retries() -> usize {
    3
}

fn default_mutation_pause() -> String {
    "50ms".to_owned()
}

fn default_host_template() -> String {
    "https://app{octet}dev.int.capoptix.com".to_owned()
}

fn default_callback_path() -> String {
    "/auth/callback".to_owned()
}

fn default_post_logout_path() -> String {
    "/app-web/".to_owned()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::Str(s) => s,
        Text::Unsigned(n) => n.to_string(),
        Text::Signed(n) => n.to_string(),
    })
}

/// CLI values that take precedence over every other layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub domain: Option<String>,
    pub org_id: Option<String>,
    pub page_size: Option<u32>,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; without one, [`DEFAULT_CONFIG_FILE`] is
    /// read when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing explicit file or unparsable values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let figment = Figment::new()
            .merge(Yaml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(domain) = &overrides.domain {
            self.domain.clone_from(domain);
        }
        if let Some(org_id) = &overrides.org_id {
            self.org_id.clone_from(org_id);
        }
        if let Some(page_size) = overrides.page_size {
            self.page_size = page_size;
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the pause is not a humantime duration.
    pub fn mutation_pause(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.mutation_pause).map_err(|e| {
            ConfigError::Invalid(format!("invalid mutation_pause '{}': {e}", self.mutation_pause))
        })
    }

    #[must_use]
    pub fn read_retry(&self) -> ReadRetry {
        ReadRetry::new(self.read_retries, ExponentialBackoff::default())
    }

    /// Client configuration; field-level validation happens in the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no access token is configured.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let token = self
            .access_token
            .as_ref()
            .filter(|t| !t.is_blank())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "access_token is required (config file or {ENV_PREFIX}ACCESS_TOKEN)"
                ))
            })?;
        Ok(
            ClientConfig::new(self.domain.trim(), token.expose(), self.org_id.trim())
                .with_org_header(self.org_header.as_str())
                .with_page_size(self.page_size)
                .with_request_timeout(Duration::from_secs(self.request_timeout_secs)),
        )
    }
}
