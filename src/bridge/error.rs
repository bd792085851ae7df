//! Error types for the protocol adapter.

use thiserror::Error;

/// Errors that can occur while adapting or uploading.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The chat request carried no messages.
    #[error("empty messages")]
    EmptyInput,

    /// Attachment source data could not be decoded or fetched.
    #[error("preprocess file data failed: {0}")]
    Preprocess(String),

    /// File type unsupported or payload too large.
    #[error("validate file failed: {0}")]
    Validation(String),

    /// The backend rejected a phase or reported an indexing failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Indexing never completed within the polling budget.
    #[error("file processing timeout after {retries} retries")]
    ProcessingTimeout {
        /// Number of poll attempts made.
        retries: u32,
    },

    /// The caller cancelled the operation or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience result alias for adapter operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Whether the caller's input is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::Preprocess(_) | Self::Validation(_)
        )
    }

    /// HTTP status code this error should surface as.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::EmptyInput | Self::Preprocess(_) | Self::Validation(_) => 400,
            Self::Cancelled => 408,
            Self::Upstream(_) | Self::HttpRequest(_) => 502,
            Self::ProcessingTimeout { .. } => 504,
            Self::HttpClient(_) | Self::JsonParse(_) | Self::InvalidUrl(_) | Self::Config(_) => {
                500
            }
        }
    }

    /// OpenAI-style error type string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput | Self::Preprocess(_) | Self::Validation(_) => {
                "invalid_request_error"
            }
            Self::ProcessingTimeout { .. } | Self::Cancelled => "timeout_error",
            Self::Upstream(_) | Self::HttpRequest(_) => "upstream_error",
            _ => "server_error",
        }
    }
}
