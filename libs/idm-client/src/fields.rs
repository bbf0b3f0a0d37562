//! Shape-tolerant field extraction.
//!
//! Platform versions disagree on where a value lives (`oidcConfig.clientId`
//! vs `clientId`, `userId` vs `id`). A [`FieldSpec`] lists the candidate
//! paths for one logical field in priority order; the first path that
//! resolves to a non-null value wins.

use std::fmt;

use serde_json::{Map, Value};

/// Ordered key sequence, e.g. `&["oidcConfig", "clientId"]`.
pub type FieldPath<'a> = &'a [&'a str];

/// One record returned by a listing or lookup endpoint.
///
/// No schema is assumed; the record is an arbitrary JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Map<String, Value>);

impl Record {
    #[must_use]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wrap a JSON value if it is an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Resolve a logical field.
    #[must_use]
    pub fn field(&self, spec: &FieldSpec) -> Resolved<'_> {
        resolve(self, spec.paths)
    }

    /// Resolve a logical field and render it as text, empty when absent.
    #[must_use]
    pub fn text(&self, spec: &FieldSpec) -> String {
        self.field(spec).as_text().unwrap_or_default()
    }

    /// Unwrap a single-object envelope such as `{"user": {...}}`.
    ///
    /// Returns the inner object when `key` holds one, otherwise `self`.
    #[must_use]
    pub fn unwrap_envelope(&self, key: &str) -> Self {
        match self.0.get(key) {
            Some(Value::Object(inner)) => Self(inner.clone()),
            _ => self.clone(),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Outcome of resolving a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Present(&'a Value),
    Absent,
}

impl<'a> Resolved<'a> {
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    #[must_use]
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }

    /// Value as a string slice, if it is a JSON string.
    #[must_use]
    pub fn as_str(self) -> Option<&'a str> {
        self.value().and_then(Value::as_str)
    }

    /// Render strings, numbers and booleans as text.
    ///
    /// Identifiers sometimes arrive numeric, so `301926079046713354` and
    /// `"301926079046713354"` render identically.
    #[must_use]
    pub fn as_text(self) -> Option<String> {
        match self.value()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Resolve the first present path within a record.
///
/// A path resolves when every key exists at its level and the final value is
/// not `null`. An empty string counts as present.
#[must_use]
pub fn resolve<'a>(record: &'a Record, paths: &[FieldPath<'_>]) -> Resolved<'a> {
    resolve_in(&record.0, paths)
}

/// [`resolve`] over a bare JSON object.
#[must_use]
pub fn resolve_in<'a>(map: &'a Map<String, Value>, paths: &[FieldPath<'_>]) -> Resolved<'a> {
    paths
        .iter()
        .find_map(|path| walk(map, path))
        .map_or(Resolved::Absent, Resolved::Present)
}

fn walk<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    (!current.is_null()).then_some(current)
}

/// Named logical field with its candidate paths in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub paths: &'static [FieldPath<'static>],
}

impl FieldSpec {
    pub const CLIENT_ID: Self = Self {
        name: "client_id",
        paths: &[&["oidcConfig", "clientId"], &["apiConfig", "clientId"], &["clientId"]],
    };

    pub const DISPLAY_NAME: Self = Self {
        name: "display_name",
        paths: &[
            &["name"],
            &["appName"],
            &["profile", "displayName"],
            &["username"],
            &["id"],
        ],
    };

    pub const APP_TYPE: Self = Self {
        name: "app_type",
        paths: &[&["appType"], &["type"]],
    };

    pub const RESOURCE_ID: Self = Self {
        name: "resource_id",
        paths: &[&["id"], &["projectId"]],
    };

    pub const PROJECT_NAME: Self = Self {
        name: "project_name",
        paths: &[&["name"]],
    };

    pub const USER_ID: Self = Self {
        name: "user_id",
        paths: &[&["userId"], &["user_id"], &["id"]],
    };

    pub const USERNAME: Self = Self {
        name: "username",
        paths: &[&["username"], &["userName"]],
    };

    pub const USER_DISPLAY: Self = Self {
        name: "user_display",
        paths: &[
            &["displayName"],
            &["profile", "displayName"],
            &["username"],
            &["userName"],
            &["userId"],
            &["id"],
        ],
    };

    pub const RESOURCE_OWNER: Self = Self {
        name: "resource_owner",
        paths: &[
            &["details", "resourceOwner"],
            &["user", "details", "resourceOwner"],
            &["resourceOwner"],
        ],
    };

    pub const SECRET: Self = Self {
        name: "secret",
        paths: &[&["clientSecret"], &["secret"], &["value"]],
    };

    pub const CREATED_USER_ID: Self = Self {
        name: "created_user_id",
        paths: &[&["userId"], &["id"], &["user", "id"]],
    };

    pub const USER_TYPE: Self = Self {
        name: "user_type",
        paths: &[&["type"], &["userType"]],
    };

    pub const STATE: Self = Self {
        name: "state",
        paths: &[&["state"]],
    };
}

/// Normalized application type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppKind {
    Oidc,
    Api,
    /// Any other declared type, uppercased (e.g. `SAML`)
    Other(String),
    Unknown,
}

impl AppKind {
    /// Classify an application record.
    ///
    /// The declared `appType`/`type` label wins when it mentions OIDC or API;
    /// otherwise the presence of `oidcConfig`/`apiConfig` decides.
    #[must_use]
    pub fn classify(app: &Record) -> Self {
        let label = app
            .field(&FieldSpec::APP_TYPE)
            .as_text()
            .unwrap_or_default()
            .to_uppercase();
        if label.contains("OIDC") {
            return Self::Oidc;
        }
        if label.contains("API") {
            return Self::Api;
        }
        if app.contains_key("oidcConfig") {
            return Self::Oidc;
        }
        if app.contains_key("apiConfig") {
            return Self::Api;
        }
        if label.is_empty() {
            Self::Unknown
        } else {
            Self::Other(label)
        }
    }

    /// Whether the application carries a rotatable client secret.
    #[must_use]
    pub fn has_client_secret(&self) -> bool {
        matches!(self, Self::Oidc | Self::Api)
    }

    /// Path segment of the v1 secret-generation endpoint.
    #[must_use]
    pub fn config_segment(&self) -> &'static str {
        match self {
            Self::Oidc => "oidc_config",
            Self::Api | Self::Other(_) | Self::Unknown => "api_config",
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Oidc => "OIDC",
            Self::Api => "API",
            Self::Other(label) => label,
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
