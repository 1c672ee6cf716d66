// src/infra/errors.rs — Error types for koi-learn

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnerError {
    // Usage lifecycle
    #[error("Agent usage '{id}' not found")]
    UsageNotFound { id: String },

    #[error("Agent usage '{id}' was already completed")]
    UsageAlreadyCompleted { id: String },

    #[error("An '{agent_type}' usage is already open in session '{session_id}'")]
    UsageAlreadyOpen {
        session_id: String,
        agent_type: String,
    },

    // Error clustering
    #[error("Error instance '{id}' not found")]
    InstanceNotFound { id: String },

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LearnerError {
    /// True when the failure came from the persistent store rather than
    /// from the caller's input. Callers degrade (skip learning) on these.
    pub fn is_store_failure(&self) -> bool {
        match self {
            LearnerError::Database(_) => true,
            LearnerError::Other(e) => e.downcast_ref::<rusqlite::Error>().is_some(),
            _ => false,
        }
    }
}
