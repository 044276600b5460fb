//! Error handling for VidFlow

use thiserror::Error;

/// Main error type for VidFlow
#[derive(Debug, Error)]
pub enum VidflowError {
    #[error("Invalid download request: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Duplicate task id: {0}")]
    DuplicateId(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to start download: {0}")]
    EngineStart(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse engine output: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
