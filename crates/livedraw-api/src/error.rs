// Error type for calls to the league-draw service.

use thiserror::Error;

/// Shown when the server gives no message of its own.
pub const DEFAULT_RETRY_MESSAGE: &str = "Failed to complete the draw. Please try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401: the bearer credential is missing or no longer valid.
    #[error("{endpoint}: not authenticated")]
    Unauthorized { endpoint: String },

    /// Any other non-success status. `message` is the server's `error` or
    /// `message` field when the body carried one.
    #[error("{endpoint} returned status {status}{}", message_suffix(.message))]
    Status {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },

    /// A 2xx response whose body said `{"error": ...}`.
    #[error("{endpoint} was rejected: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("network error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },

    #[error("{endpoint} response is missing `{field}`")]
    MissingField { endpoint: String, field: &'static str },
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Text suitable for the retry banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized { .. } => "Your session has expired. Please log in again.".into(),
            ApiError::Status {
                message: Some(m), ..
            }
            | ApiError::Rejected { message: m, .. } => m.clone(),
            _ => DEFAULT_RETRY_MESSAGE.into(),
        }
    }
}
