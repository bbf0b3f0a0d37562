//! HTTP transport seam.
//!
//! Components never talk to the network directly; they hand an [`ApiRequest`]
//! to a [`Transport`] and classify the returned [`ApiResponse`] themselves.
//! The transport reports every status code as a response and only fails for
//! network problems and timeouts.

use std::fmt;
use std::io;
use std::time::Duration;

use http::Method;
use serde_json::Value;

use crate::error::TransportError;

/// Header name carrying the bearer token (redacted in `Debug` output)
pub(crate) const AUTHORIZATION: &str = "Authorization";

/// One fully rendered HTTP request.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    /// Header list in insertion order; names compare case-insensitively
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Value of the first header matching `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every header named `name` with a single value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_owned(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(n, v)| {
                if n.eq_ignore_ascii_case(AUTHORIZATION) {
                    (n.as_str(), "[REDACTED]")
                } else {
                    (n.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Raw response: status code plus the body as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking request executor.
///
/// Implementations must be usable from several threads at once; the mutation
/// executor shares one transport between callers.
pub trait Transport: Send + Sync {
    /// Send one request and wait for the complete response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] or [`TransportError::Network`] when
    /// no response was received. Non-2xx statuses are returned as responses.
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Default transport backed by a blocking `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    #[must_use]
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(timeout)
                .user_agent(user_agent)
                .build(),
            timeout,
        }
    }

    fn map_transport_error(&self, url: &str, err: ureq::Transport) -> TransportError {
        if is_timeout(&err) {
            return TransportError::Timeout {
                url: url.to_owned(),
                timeout: self.timeout,
            };
        }
        TransportError::Network {
            url: url.to_owned(),
            source: Box::new(err),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut req = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }

        let result = match &request.body {
            Some(body) => req.send_string(&body.to_string()),
            None => req.call(),
        };

        let response = match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(self.map_transport_error(&request.url, err));
            }
        };

        let status = response.status();
        let body = response.into_string().map_err(|e| {
            if is_io_timeout(&e) {
                TransportError::Timeout {
                    url: request.url.clone(),
                    timeout: self.timeout,
                }
            } else {
                TransportError::Network {
                    url: request.url.clone(),
                    source: Box::new(e),
                }
            }
        })?;

        Ok(ApiResponse { status, body })
    }
}

fn is_timeout(err: &ureq::Transport) -> bool {
    use std::error::Error as _;

    if err.kind() != ureq::ErrorKind::Io {
        return false;
    }
    err.source()
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(is_io_timeout)
}

fn is_io_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
