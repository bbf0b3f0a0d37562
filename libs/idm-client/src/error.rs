//! Error types for transport failures and API outcomes.

use thiserror::Error;

/// Maximum body preview size kept in error values (8KB).
///
/// Error responses are echoed back to operators, so the preview is bounded
/// to keep large HTML error pages out of logs and reports.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Kind of remote operation an error came from.
///
/// Used by [`IdmError::safe_to_rerun`] to tell operators whether repeating the
/// operation can cause a second, unintended mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Listing, searching or fetching; idempotent.
    Read,
    /// Secret rotation, updates, creation; not idempotent in general.
    Mutation,
}

/// Failures at the HTTP boundary: the request never produced a usable 2xx.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Single request attempt exceeded the configured timeout
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout {
        url: String,
        timeout: std::time::Duration,
    },

    /// Connection, DNS, TLS or I/O failure
    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote answered with a status that is not classified as success
    #[error("HTTP {status} from {url}: {body_preview}")]
    Status {
        url: String,
        status: u16,
        body_preview: String,
    },
}

impl TransportError {
    /// HTTP status carried by the error, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Timeout { .. } | Self::Network { .. } => None,
        }
    }

    pub(crate) fn status_with_body(url: &str, status: u16, body: &str) -> Self {
        Self::Status {
            url: url.to_owned(),
            status,
            body_preview: body_preview(body),
        }
    }
}

/// Error taxonomy shared by every component of the client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IdmError {
    /// Missing or invalid configuration, detected before any request is sent
    #[error("configuration error: {0}")]
    Config(String),

    /// Network failure, timeout or non-2xx response
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response body is not in the expected shape
    #[error("cannot decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// A mutation answered 2xx but the result could not be read.
    ///
    /// The server has most likely applied the change; repeating the call
    /// would mutate again (e.g. invalidate a freshly rotated secret).
    #[error("{variant} succeeded with HTTP {status} but no result field was found: {body_preview}")]
    MalformedResponse {
        variant: String,
        status: u16,
        body_preview: String,
    },

    /// Caller lacks privilege for the resource
    #[error("forbidden by {variant}: {body_preview}")]
    Forbidden {
        variant: String,
        body_preview: String,
    },

    /// Every endpoint variant reported that it does not apply
    #[error("no applicable endpoint variant (tried: {})", attempted.join(", "))]
    NoApplicableVariant { attempted: Vec<String> },

    /// The addressed resource could not be found in any visible context
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A machine-only operation was requested for a human user
    #[error("user '{user_id}' is not a machine user (type={user_type}, state={state})")]
    NotMachineUser {
        user_id: String,
        user_type: String,
        state: String,
    },
}

impl IdmError {
    pub(crate) fn decode(url: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.to_owned(),
            reason: reason.into(),
        }
    }

    /// Whether repeating the failed operation is known to be harmless.
    ///
    /// Reads may be repeated after transport failures. Mutations may only be
    /// repeated when no variant accepted the request; every other outcome is
    /// either terminal or ambiguous (the mutation may have been applied).
    #[must_use]
    pub fn safe_to_rerun(&self, operation: Operation) -> bool {
        match self {
            Self::Transport(_) => operation == Operation::Read,
            Self::NoApplicableVariant { .. } | Self::NotFound { .. } => true,
            Self::Config(_)
            | Self::Decode { .. }
            | Self::MalformedResponse { .. }
            | Self::Forbidden { .. }
            | Self::NotMachineUser { .. } => false,
        }
    }

    /// Short machine-friendly classification, used in reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) => "transport",
            Self::Decode { .. } => "decode",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Forbidden { .. } => "forbidden",
            Self::NoApplicableVariant { .. } => "no_applicable_variant",
            Self::NotFound { .. } => "not_found",
            Self::NotMachineUser { .. } => "not_machine_user",
        }
    }
}

/// Truncate a response body to [`ERROR_BODY_PREVIEW_LIMIT`] on a char boundary.
pub(crate) fn body_preview(body: &str) -> String {
    if body.len() <= ERROR_BODY_PREVIEW_LIMIT {
        return body.to_owned();
    }
    let mut end = ERROR_BODY_PREVIEW_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
