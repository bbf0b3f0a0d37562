//! Connection settings for one platform and organization.

use std::time::Duration;

use crate::error::IdmError;
use crate::secret::SecretString;

/// Default User-Agent string for API requests
pub const DEFAULT_USER_AGENT: &str = concat!("idm-admin/", env!("CARGO_PKG_VERSION"));

/// Default organization-context header understood by the platform
pub const DEFAULT_ORG_HEADER: &str = "x-zitadel-orgid";

/// Default page size requested from search endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one identity platform instance.
///
/// Values are treated as opaque strings; [`validate`](Self::validate) only
/// checks presence. The struct carries no process-wide state: every
/// [`ApiClient`](crate::ApiClient) owns its own copy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://idp.example.com` (trailing `/` is trimmed)
    pub domain: String,

    /// Personal access token sent as `Authorization: Bearer …`
    pub access_token: SecretString,

    /// Organization used as default context for list and search calls
    pub org_id: String,

    /// Header carrying the organization context (default: `x-zitadel-orgid`)
    pub org_header: String,

    /// Per-request timeout; a timed-out request is a transport failure
    pub request_timeout: Duration,

    /// Page size for search endpoints (advisory upper bound, must be > 0)
    pub page_size: u32,

    pub user_agent: String,
}

impl ClientConfig {
    /// Create a config with defaults for everything except the three required values.
    pub fn new(
        domain: impl Into<String>,
        access_token: impl Into<String>,
        org_id: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            access_token: SecretString::new(access_token),
            org_id: org_id.into(),
            org_header: DEFAULT_ORG_HEADER.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_org_header(mut self, header: impl Into<String>) -> Self {
        self.org_header = header.into();
        self
    }

    /// Base URL without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.domain.trim().trim_end_matches('/')
    }

    /// Check that every required value is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::Config`] naming the first missing or invalid value.
    pub fn validate(&self) -> Result<(), IdmError> {
        if self.base_url().is_empty() {
            return Err(IdmError::Config("domain is required".to_owned()));
        }
        if !(self.base_url().starts_with("https://") || self.base_url().starts_with("http://")) {
            return Err(IdmError::Config(format!(
                "domain must include the scheme (https://…), got '{}'",
                self.base_url()
            )));
        }
        if self.access_token.is_blank() {
            return Err(IdmError::Config("access_token is required".to_owned()));
        }
        if self.org_id.trim().is_empty() {
            return Err(IdmError::Config("org_id is required".to_owned()));
        }
        if self.org_header.trim().is_empty() {
            return Err(IdmError::Config("org_header must not be empty".to_owned()));
        }
        if self.page_size == 0 {
            return Err(IdmError::Config("page_size must be a positive integer".to_owned()));
        }
        if self.request_timeout.is_zero() {
            return Err(IdmError::Config("request_timeout must be greater than zero".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::use_debug)]
mod tests {
    use super::*;

    fn valid() -> ClientConfig {
        ClientConfig::new("https://idp.example.com/", "pat", "301926074198032394")
    }

    #[test]
    fn test_defaults() {
        let cfg = valid();
        assert_eq!(cfg.page_size, 200);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.org_header, "x-zitadel-orgid");
        assert!(cfg.user_agent.starts_with("idm-admin/"));
    }

    #[test]
    fn test_base_url_trims_trailing_slashes() {
        assert_eq!(valid().base_url(), "https://idp.example.com");
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_values_are_config_errors() {
        let cases = [
            ClientConfig::new("", "pat", "org"),
            ClientConfig::new("https://idp", "   ", "org"),
            ClientConfig::new("https://idp", "pat", ""),
            ClientConfig::new("idp.example.com", "pat", "org"),
            valid().with_page_size(0),
            valid().with_request_timeout(Duration::ZERO),
            valid().with_org_header(""),
        ];
        for cfg in cases {
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, IdmError::Config(_)), "unexpected: {err:?}");
        }
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let cfg = ClientConfig::new("https://idp", "super-secret-pat", "org");
        assert!(!format!("{cfg:?}").contains("super-secret-pat"));
    }
}
