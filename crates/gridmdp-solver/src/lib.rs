//! Solvers for grid-world Markov decision processes
//!
//! This crate provides:
//! - dynamic programming over a full transition model (policy evaluation,
//!   policy iteration, value iteration)
//! - temporal-difference control from sampled experience (SARSA, Q-learning)
//! - an experiment runner comparing TD algorithms across seeds
//! - JSON export of results and an in-memory experiment store

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod dp;
pub mod experiment;
pub mod export;
pub mod store;
pub mod td;
pub mod utils;

// Re-export solvers
pub use dp::{DpAlgorithm, DpResult, DpSolver, PolicyEvaluation};
pub use td::{TdAlgorithm, TdResult, TdSolver};

// Re-export configuration
pub use config::{DpConfig, InitialPolicy, SolverSettings, TdConfig};

// Re-export experiments and export
pub use experiment::{
    cliff_walking_comparison, windy_grid_comparison, AlgorithmSummary, ComparisonResult, ExperimentRunner,
    LearningCurve, Winners,
};
pub use export::{DpExport, JsonDocument, TdExport};
pub use store::{ExperimentEntry, ExperimentOutcome, ExperimentSpec, ExperimentStatus, ExperimentStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DpAlgorithm, DpConfig, DpResult, DpSolver, ExperimentRunner, JsonDocument, TdAlgorithm, TdConfig, TdResult,
        TdSolver,
    };
    pub use gridmdp_env::prelude::*;
}
