//! Unified error types for wavegate

use thiserror::Error;

/// Unified error type for all wavegate operations
#[derive(Error, Debug)]
pub enum WaveGateError {
    // Input errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Signal errors
    #[error("Malformed signal {path}: {reason}")]
    MalformedSignal { path: String, reason: String },

    // Gate errors
    #[error("Phase {phase} of wave {wave} requires a valid lock for phase {required}")]
    LockOrder { wave: u32, phase: u32, required: u32 },

    #[error("Circuit breaker open for wave {wave}: {reason}")]
    BreakerOpen { wave: u32, reason: String },

    // Collaborator errors
    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("VCS error: {0}")]
    Vcs(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using WaveGateError
pub type Result<T> = std::result::Result<T, WaveGateError>;
