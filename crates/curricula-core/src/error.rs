//! Error types shared by every curricula crate

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// A stopwatch was read, lapped or stopped while not running
    #[error("Cannot {0} - the stopwatch is not running")]
    NotRunning(&'static str),

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested agent family does not exist
    #[error("Unknown agent family: {0}")]
    UnknownAgentFamily(String),

    /// The requested environment is not registered
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Environment-related errors
    #[error("Environment error: {0}")]
    Environment(String),

    /// Agent-related errors
    #[error("Agent error: {0}")]
    Agent(String),

    /// Invalid action
    #[error("Invalid action {action} for an action space of size {n_actions}")]
    InvalidAction {
        /// Offending action index
        action: usize,
        /// Size of the action space
        n_actions: usize,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// A checkpoint archive is missing a member or is malformed
    #[error("Malformed checkpoint {path}: {reason}")]
    Checkpoint {
        /// Archive location
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A run observed the interrupt flag and stopped early
    #[error("Run interrupted")]
    Interrupted,

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Binary encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;
