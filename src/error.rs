//! Error types for the dashboard engine.

use thiserror::Error;

/// Main error type for dashboard operations.
///
/// Event reconciliation never fails; these errors come from configuration,
/// the bus transport, and lifecycle misuse.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Registration with {destination} failed: {reason}")]
    Registration { destination: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("Dispatch queue is full, event dropped")]
    QueueFull,

    #[error("Dashboard already started")]
    AlreadyStarted,

    #[error("Dashboard not started")]
    NotStarted,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Dispatch consumer thread panicked")]
    ConsumerPanicked,
}

impl From<serde_json::Error> for ViewError {
    fn from(e: serde_json::Error) -> Self {
        ViewError::Serialization(e.to_string())
    }
}

/// Result type for dashboard operations.
pub type Result<T> = std::result::Result<T, ViewError>;
