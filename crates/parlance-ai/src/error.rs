//! Error types for parlance-ai

use thiserror::Error;

/// Result type alias using parlance-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the provider
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Stream was aborted
    #[error("Request aborted")]
    Aborted,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is retryable: server-side failures, decode
    /// failures, and transport-level errors. Request errors (4xx) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Sse(_) => true,
            // Decode failures of individual stream frames are transient
            Error::Json(_) => true,
            Error::Api { status, message } => {
                if *status >= 500 {
                    return true;
                }
                let msg = message.to_lowercase();
                msg.contains("timeout") || msg.contains("timed out")
            }
            _ => false,
        }
    }

    /// Check if this error is a missing-tool-output desync rejection
    pub fn is_tool_output_desync(&self) -> bool {
        match self {
            Error::Api { status, message } => {
                let msg = message.to_lowercase();
                *status < 500
                    && msg.contains("tool output")
                    && (msg.contains("no ") || msg.contains("not found") || msg.contains("missing"))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_typed_variants() {
        assert!(Error::Sse("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_retryable_server_errors() {
        assert!(Error::api(500, "internal server error").is_retryable());
        assert!(Error::api(503, "service unavailable").is_retryable());
    }

    #[test]
    fn test_retryable_timeout_message() {
        assert!(Error::api(408, "request timed out").is_retryable());
    }

    #[test]
    fn test_not_retryable_rate_limit() {
        // 4xx request errors surface immediately; the caller decides what
        // to tell the user
        assert!(!Error::api(429, "Rate limit exceeded, please retry").is_retryable());
        assert!(
            !Error::RateLimited {
                retry_after: Some(5)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_not_retryable_auth() {
        assert!(!Error::api(401, "Invalid API key").is_retryable());
        assert!(!Error::InvalidApiKey.is_retryable());
        assert!(!Error::Aborted.is_retryable());
    }

    #[test]
    fn test_not_retryable_bad_request() {
        assert!(!Error::api(400, "malformed input item").is_retryable());
    }

    #[test]
    fn test_desync_detection() {
        assert!(
            Error::api(400, "No tool output found for function call call_abc123")
                .is_tool_output_desync()
        );
        assert!(Error::api(400, "Missing tool output for call_7").is_tool_output_desync());
    }

    #[test]
    fn test_not_desync() {
        assert!(!Error::api(400, "malformed request").is_tool_output_desync());
        assert!(!Error::api(500, "no tool output found").is_tool_output_desync());
        assert!(!Error::Aborted.is_tool_output_desync());
    }
}
