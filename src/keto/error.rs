//! Errors returned by the Keto ACP engine client.

use reqwest::StatusCode;

/// Keto ACP engine client errors
///
/// All of them are scoped to a single request and safe to retry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request never produced a response (connection failure, timeout)
    #[error("{method} {url} http request failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{method} {url} http request returned unexpected status code {status}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: StatusCode,
    },

    /// The request body could not be serialized, nothing was sent
    #[error("{method} {url} http request body could not be encoded: {source}")]
    Encode {
        method: String,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method} {url} http response could not be decoded: {source}")]
    Decode {
        method: String,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid Keto URL: {0}")]
    InvalidUrl(String),
}

impl EngineError {
    /// HTTP status of an unexpected response
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            EngineError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
