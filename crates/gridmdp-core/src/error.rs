//! Error types for the MDP core library

use thiserror::Error;
use uuid::Uuid;

/// Core error type for MDP operations
#[derive(Error, Debug)]
pub enum MdpError {
    /// Action index outside the four grid directions
    #[error("Invalid action index: {0}")]
    InvalidAction(usize),

    /// `step` called before any `reset`
    #[error("Environment not initialized. Call reset() first")]
    NotReset,

    /// State index outside `[0, n_states)`
    #[error("Invalid state {state}: environment has {n_states} states")]
    InvalidState { state: usize, n_states: usize },

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transition table violating the probability invariant
    #[error("Invalid transitions for state {state}, action {action}: {reason}")]
    InvalidTransitions {
        state: usize,
        action: usize,
        reason: String,
    },

    /// Unknown algorithm name
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Unknown environment name
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No experiment stored under this id
    #[error("Experiment {0} not found")]
    ExperimentNotFound(Uuid),

    /// A background experiment run did not finish
    #[error("Experiment failed: {0}")]
    ExperimentFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for MDP operations
pub type Result<T> = std::result::Result<T, MdpError>;
