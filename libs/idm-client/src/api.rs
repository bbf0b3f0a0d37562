//! Authenticated JSON requests against the platform API.

use std::sync::Arc;

use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{IdmError, TransportError};
use crate::transport::{AUTHORIZATION, ApiRequest, ApiResponse, Transport, UreqTransport};

/// Organization context sent with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrgContext {
    /// The organization from [`ClientConfig::org_id`]
    #[default]
    Default,
    /// An explicit organization (e.g. a resource's owner)
    Org(String),
    /// No organization header at all
    None,
}

impl OrgContext {
    /// `Org(id)` for a non-empty hint, otherwise no header.
    #[must_use]
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some(id) if !id.is_empty() => Self::Org(id.to_owned()),
            _ => Self::None,
        }
    }
}

/// Authenticated access to one platform instance.
///
/// Cheap to clone; clones share the same transport.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Validate `config` and build a client with the default `ureq` transport.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::Config`] if the configuration is incomplete.
    pub fn new(config: ClientConfig) -> Result<Self, IdmError> {
        config.validate()?;
        let transport = UreqTransport::new(config.request_timeout, &config.user_agent);
        Ok(Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
        })
    }

    /// Validate `config` and build a client over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::Config`] if the configuration is incomplete.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, IdmError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL for an API path (`/management/v1/...`).
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.config.base_url())
        } else {
            format!("{}/{path}", self.config.base_url())
        }
    }

    /// Request with authorization, JSON content negotiation and org context.
    #[must_use]
    pub fn request(&self, method: Method, path: &str, org: &OrgContext) -> ApiRequest {
        let mut req = ApiRequest::new(method, self.url(path));
        req.set_header(
            AUTHORIZATION,
            format!("Bearer {}", self.config.access_token.expose()),
        );
        req.set_header("Accept", "application/json");
        req.set_header("Content-Type", "application/json");
        match org {
            OrgContext::Default => req.set_header(&self.config.org_header, &self.config.org_id),
            OrgContext::Org(id) => req.set_header(&self.config.org_header, id),
            OrgContext::None => {}
        }
        req
    }

    /// Send a prepared request through the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for network failures and timeouts.
    pub fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.send(request)?;
        debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            "received response"
        );
        Ok(response)
    }

    /// Send a request and decode a 2xx JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::Transport`] for network failures or non-2xx
    /// statuses and [`IdmError::Decode`] when the body is not JSON.
    pub fn send_json(&self, request: &ApiRequest) -> Result<Value, IdmError> {
        let response = self.send(request)?;
        if !response.is_success() {
            return Err(
                TransportError::status_with_body(&request.url, response.status, &response.body)
                    .into(),
            );
        }
        parse_json(&request.url, &response.body)
    }

    /// `GET path` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub fn get_json(&self, path: &str, org: &OrgContext) -> Result<Value, IdmError> {
        let req = self.request(Method::GET, path, org);
        self.send_json(&req)
    }

    /// `POST path` with a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub fn post_json(&self, path: &str, org: &OrgContext, body: Value) -> Result<Value, IdmError> {
        let mut req = self.request(Method::POST, path, org);
        req.body = Some(body);
        self.send_json(&req)
    }
}

/// Parse a response body; an empty body decodes as `{}`.
pub(crate) fn parse_json(url: &str, body: &str) -> Result<Value, IdmError> {
    if body.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(body).map_err(|e| IdmError::decode(url, format!("invalid JSON: {e}")))
}
