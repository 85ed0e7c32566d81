//! Error types for the live voice core.

use thiserror::Error;

/// Primary error type for all live session operations.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Permission,
    Channel,
    Decode,
    Authentication,
    Configuration,
    Network,
    Serialization,
}

impl LiveError {
    /// Create an API error from a handshake or HTTP status.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PermissionDenied(_) => ErrorCategory::Permission,
            Self::Channel(_) | Self::Stream(_) => ErrorCategory::Channel,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                _ => ErrorCategory::Network,
            },
        }
    }

    /// Whether this error ends the live session it occurred in.
    ///
    /// Capture and playback failures are contained; only channel-level
    /// failures tear the session down.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Channel)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LiveError>;
