//! Error types for `zvault-console`.
//!
//! Variants split into contract errors (`MissingAttribute`, `DataShape`),
//! which callers propagate, and outcomes the action boundary handles:
//! `Aborted` is a silent termination and `Api` carries the server's message
//! list for display.

/// All errors produced by the console data layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required identifying attribute was absent. Raised before any
    /// request is built.
    #[error("missing attribute '{attribute}' for resource '{kind}'")]
    MissingAttribute { kind: String, attribute: String },

    /// The server payload does not match the envelope it claims to be.
    #[error("unexpected payload shape: {reason}")]
    DataShape { reason: String },

    /// The request was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("request aborted")]
    Aborted,

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {}", errors.join(", "))]
    Api { status: u16, errors: Vec<String> },

    /// HTTP client failure (connect, TLS, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transport failure from a non-reqwest transport.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// A 2xx body that is not valid JSON.
    #[error("invalid response json: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether this error is a user-initiated cancellation rather than a failure.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Messages suitable for display at the action boundary.
    ///
    /// Structured API errors return the server's list unchanged; every
    /// other variant returns its own rendering as a single entry.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Api { errors, .. } => errors.clone(),
            other => vec![other.to_string()],
        }
    }

    pub(crate) fn missing(kind: &str, attribute: &str) -> Self {
        Self::MissingAttribute {
            kind: kind.to_owned(),
            attribute: attribute.to_owned(),
        }
    }

    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::DataShape {
            reason: reason.into(),
        }
    }
}
