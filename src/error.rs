//! Error taxonomy for the remote API client.

use thiserror::Error;

/// Errors surfaced by the gateway and the typed API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential rejected and the refresh attempt failed. Callers must
    /// prompt for a new login.
    #[error("not logged in (session expired)")]
    Unauthenticated,

    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-2xx response. `message` comes from the body's `error` field when
    /// present.
    #[error("{message}")]
    Application { status: u16, message: String },

    /// A 2xx response that lacked the content the caller needed.
    #[error("{0}")]
    EmptyResponse(String),

    /// A 2xx response whose body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether this error should stop further sends until re-login.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
