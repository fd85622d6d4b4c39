/*
[INPUT]:  Error sources (WebSocket, serialization, URL parsing, hub completions, timeouts)
[OUTPUT]: Structured error types with retry hints
[POS]:    Error handling layer - unified error type for the adapter crate
[UPDATE]: When adding new error sources or changing error messages
*/

use thiserror::Error;

/// Main error type for the chain feed adapter
#[derive(Error, Debug)]
pub enum ChainFeedError {
    /// A call was attempted while the channel is down
    #[error("not connected")]
    NotConnected,

    /// `open` was called on a transport that is already running
    #[error("already connected")]
    AlreadyConnected,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Subscription key failed validation
    #[error("Invalid subscription key: {0}")]
    InvalidKey(String),

    /// The remote hub completed an invocation with an error
    #[error("{method} rejected by hub: {message}")]
    Rejected { method: String, message: String },

    /// No completion arrived in time
    #[error("Invocation timed out after {duration}s")]
    Timeout { duration: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChainFeedError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainFeedError::NotConnected
                | ChainFeedError::WebSocket(_)
                | ChainFeedError::Timeout { .. }
        )
    }

    /// Create a rejection error for a hub method
    pub fn rejected(method: impl Into<String>, message: impl Into<String>) -> Self {
        ChainFeedError::Rejected {
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for chain feed operations
pub type Result<T> = std::result::Result<T, ChainFeedError>;
