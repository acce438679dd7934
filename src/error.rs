//! CairnKV Error Types

use thiserror::Error;

/// Result type alias for CairnKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// CairnKV error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // WAL errors
    #[error("WAL record corrupted at line {line}: {reason}")]
    CorruptLog { line: usize, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Cluster errors
    #[error("Quorum not reached: {reached}/{required}")]
    NoQuorum { reached: usize, required: usize },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NoQuorum { .. }
                | Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::Io(_)
        )
    }

    /// Check if this error is fatal to the store instance that raised it
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CorruptLog { .. })
    }
}
