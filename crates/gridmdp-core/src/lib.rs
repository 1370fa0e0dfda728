//! Core types for grid-world Markov decision processes
//!
//! This crate provides the shared vocabulary used by the environments and the
//! solvers: actions, grid geometry, the tabular transition model, the
//! `Environment` / `MdpModel` traits, policy helpers, record types and
//! progress reporting.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod action;
pub mod environment;
pub mod error;
pub mod policy;
pub mod progress;
pub mod state;
pub mod trajectory;
pub mod value;

// Re-export core traits and types
pub use action::Action;
pub use environment::{
    build_rng, EnvDescriptor, Environment, MdpModel, StepInfo, StepOutcome, Transition, TransitionTable,
};
pub use error::{MdpError, Result};
pub use policy::{argmax_first, maximal_actions, EpsilonGreedy, TIE_TOLERANCE};
pub use progress::{sink_fn, FnSink, ProgressEvent, ProgressSink};
pub use state::{BoundaryPolicy, GridShape, Position, StateId};
pub use trajectory::{DpEpisodeRecord, IterationRecord, TdEpisodeRecord, Trajectory, TrajectoryStep};
pub use value::{action_value, action_values};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Action, Environment, GridShape, MdpError, MdpModel, Position, ProgressEvent, ProgressSink, Result,
        StateId, StepOutcome, TransitionTable,
    };
}
