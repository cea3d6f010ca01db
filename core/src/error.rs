//! Error types surfaced by the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure to reach the server at all.
///
/// Transport errors are retried internally and never reach callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Any other failure while building or sending the request.
    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether the failure means the network is unreachable.
    #[must_use]
    pub const fn is_no_network(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout)
    }
}

/// Error reported by the API.
///
/// Decoded from the `{"errors": {...}}` envelope when the body carries one,
/// synthesized from the status code otherwise.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{title} (status {status})")]
pub struct ServerError {
    /// HTTP status of the response.
    pub status: u16,
    /// Machine-readable error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable summary.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub detail: Option<String>,
    /// Messages suitable for display.
    #[serde(default)]
    pub messages: Vec<String>,
    /// Per-attribute validation messages.
    #[serde(default)]
    pub attrs: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct Envelope {
    errors: EnvelopeBody,
}

#[derive(Deserialize)]
struct EnvelopeBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    attrs: BTreeMap<String, Vec<String>>,
}

impl ServerError {
    /// Generic error for a status code without a usable body.
    #[must_use]
    pub fn synthesized(status: u16) -> Self {
        Self {
            status,
            code: None,
            title: default_title(status).to_string(),
            detail: None,
            messages: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Decode the error envelope from `body`, falling back to
    /// [`ServerError::synthesized`].
    #[must_use]
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<Envelope>(body) {
            Ok(Envelope { errors }) => Self {
                status,
                code: errors.code,
                title: errors
                    .title
                    .unwrap_or_else(|| default_title(status).to_string()),
                detail: errors.detail,
                messages: errors.messages,
                attrs: errors.attrs,
            },
            Err(_) => Self::synthesized(status),
        }
    }
}

fn default_title(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        410 => "Gone",
        420 => "Enhance Your Calm",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500..=599 => "Server Error",
        _ => "Unknown Error",
    }
}

/// Caller-facing failure of a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The current credentials cannot make the request (logged out).
    #[error("Logged out")]
    Unauthenticated,

    /// The server could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with an error status.
    #[error("Server error: {0}")]
    Server(ServerError),

    /// The response body could not be mapped onto the expected node.
    #[error("Failed to map objects: {reason}")]
    MappingFailure {
        /// What went wrong.
        reason: String,
    },

    /// The endpoint is gone (410); the client must be upgraded.
    #[error("Endpoint deprecated: {0}")]
    Deprecated(ServerError),

    /// The request was discarded without a disposition.
    #[error("Request dropped without a response")]
    Dropped,
}

impl ProviderError {
    /// Mapping failure with the given reason.
    #[must_use]
    pub fn mapping(reason: impl Into<String>) -> Self {
        Self::MappingFailure {
            reason: reason.into(),
        }
    }

    /// Status code associated with the failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Unauthenticated => Some(401),
            ProviderError::Server(error) | ProviderError::Deprecated(error) => Some(error.status),
            ProviderError::Transport(_)
            | ProviderError::MappingFailure { .. }
            | ProviderError::Dropped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_error_envelope() {
        let body = br#"{"errors":{"status":"422","title":"Invalid","code":"invalid","messages":["Username taken"],"attrs":{"username":["has already been taken"]}}}"#;
        let error = ServerError::from_body(422, body);

        assert_eq!(error.status, 422);
        assert_eq!(error.title, "Invalid");
        assert_eq!(error.code.as_deref(), Some("invalid"));
        assert_eq!(error.messages, vec!["Username taken".to_string()]);
        assert_eq!(
            error.attrs.get("username"),
            Some(&vec!["has already been taken".to_string()])
        );
    }

    #[test]
    fn test_synthesizes_error_without_envelope() {
        let error = ServerError::from_body(500, b"<html>oops</html>");
        assert_eq!(error, ServerError::synthesized(500));
        assert_eq!(error.title, "Server Error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProviderError::Unauthenticated.status(), Some(401));
        assert_eq!(
            ProviderError::Server(ServerError::synthesized(404)).status(),
            Some(404)
        );
        assert_eq!(ProviderError::Dropped.status(), None);
        assert_eq!(ProviderError::from(TransportError::Timeout).status(), None);
    }

    #[test]
    fn test_no_network_classification() {
        assert!(TransportError::Timeout.is_no_network());
        assert!(TransportError::Connect("refused".into()).is_no_network());
        assert!(!TransportError::Request("bad header".into()).is_no_network());
    }
}
