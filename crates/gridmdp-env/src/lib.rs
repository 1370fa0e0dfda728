//! Grid-world environments for MDP solvers
//!
//! This crate provides three table-driven grid worlds:
//! - a square grid with absorbing corners
//! - the windy gridworld
//! - cliff walking
//!
//! Each exposes both the sampling [`Environment`] interface and the full
//! [`MdpModel`] transition table.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod cliff;
pub mod plain;
pub mod registry;
pub mod render;
mod tabular;
pub mod windy;

// Re-export environments
pub use cliff::{CliffWalking, CliffWalkingConfig};
pub use plain::{PlainGrid, PlainGridConfig};
pub use registry::{list_envs, make_env, EnvConfig, EnvKind, GridWorld};
pub use render::{render_grid, render_policy, render_values, terminal_mask};
pub use windy::{WindyGrid, WindyGridConfig};

// Re-export core types
pub use gridmdp_core::{Action, EnvDescriptor, Environment, MdpModel, StateId, StepOutcome};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{make_env, CliffWalking, EnvKind, GridWorld, PlainGrid, WindyGrid};
    pub use gridmdp_core::prelude::*;
}
