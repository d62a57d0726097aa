use thiserror::Error;

/// Error types that can occur when interacting with LLM providers.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Non-2xx HTTP response from a provider endpoint
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },
    /// Connection-level failure (no usable response body)
    #[error("Transport error: {0}")]
    TransportError(String),
    /// Provider name not recognized by the factory
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    /// Authentication and authorization errors
    #[error("Auth error: {0}")]
    AuthError(String),
    /// Invalid request parameters or format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// API response parsing or format error
    #[error("Response format error: {message}. Raw response: {raw_response}")]
    ResponseFormatError {
        message: String,
        raw_response: String,
    },
    /// JSON serialization/deserialization errors
    #[error("JSON parse error: {0}")]
    JsonError(String),
}

/// Converts reqwest errors into LLMErrors.
///
/// Non-2xx statuses are mapped to [`LLMError::HttpError`] at the call
/// site, where the response body is still readable; everything that
/// reaches this conversion failed below the HTTP layer.
impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        LLMError::TransportError(err.to_string())
    }
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::JsonError(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}
