//! Square grid with two absorbing corners

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use gridmdp_core::{
    Action, BoundaryPolicy, EnvDescriptor, Environment, GridShape, MdpError, MdpModel, Result, StateId,
    StepOutcome, Transition, TransitionTable,
};

use crate::tabular::{absorbing, TabularGrid};

/// Plain grid configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlainGridConfig {
    /// Side length of the square grid
    pub grid_size: usize,
    /// Reward for every non-terminal move
    pub step_reward: f64,
    /// Reward for moving into a terminal corner
    pub terminal_reward: f64,
    /// Discount reported alongside the model
    pub gamma: f64,
    /// Seed for random start states
    pub seed: Option<u64>,
}

impl Default for PlainGridConfig {
    fn default() -> Self {
        Self {
            grid_size: 4,
            step_reward: -1.0,
            terminal_reward: 0.0,
            gamma: 1.0,
            seed: None,
        }
    }
}

impl PlainGridConfig {
    /// Reject sizes without a non-terminal state and discounts outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.grid_size < 2 {
            return Err(MdpError::InvalidConfig(format!(
                "grid_size must be at least 2, got {}",
                self.grid_size
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(MdpError::InvalidConfig(format!("gamma must be in [0, 1], got {}", self.gamma)));
        }
        Ok(())
    }
}

/// `N × N` grid whose top-left and bottom-right corners are terminal.
///
/// Moves off the edge leave the agent in place.
#[derive(Debug, Clone)]
pub struct PlainGrid {
    config: PlainGridConfig,
    grid: TabularGrid,
}

impl PlainGrid {
    /// Create a new plain grid
    pub fn new(config: PlainGridConfig) -> Result<Self> {
        config.validate()?;
        let shape = GridShape::square(config.grid_size);
        let n = shape.n_states();
        let mut terminal = vec![false; n];
        terminal[0] = true;
        terminal[n - 1] = true;

        let table = TransitionTable::from_fn(n, |state, action| {
            if terminal[state] {
                return absorbing(state);
            }
            let next = shape.to_state(shape.shift(shape.to_position(state), action.delta(), BoundaryPolicy::Hold));
            let done = terminal[next];
            let reward = if done { config.terminal_reward } else { config.step_reward };
            vec![Transition::certain(next, reward, done)]
        });

        debug!(grid_size = config.grid_size, "built plain grid");
        let grid = TabularGrid::new(shape, table, terminal, config.seed)?;
        Ok(Self { config, grid })
    }

    /// Configuration the grid was built from
    #[must_use]
    pub fn config(&self) -> &PlainGridConfig {
        &self.config
    }

    /// Side length
    #[must_use]
    pub fn grid_size(&self) -> usize {
        self.config.grid_size
    }
}

impl Environment for PlainGrid {
    fn n_states(&self) -> usize {
        self.grid.shape.n_states()
    }

    fn is_terminal(&self, state: StateId) -> bool {
        self.grid.is_terminal(state)
    }

    fn current_state(&self) -> Option<StateId> {
        self.grid.current
    }

    fn reset(&mut self, start_state: Option<StateId>) -> Result<StateId> {
        match start_state {
            Some(state) => self.grid.place(state),
            None => {
                let candidates: Vec<StateId> = (0..self.n_states()).filter(|&s| !self.is_terminal(s)).collect();
                if candidates.is_empty() {
                    return Err(MdpError::InvalidConfig("grid has no non-terminal state".to_string()));
                }
                let state = candidates[self.grid.rng.gen_range(0..candidates.len())];
                self.grid.place(state)
            }
        }
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome> {
        let (from, t) = self.grid.advance(action)?;
        Ok(StepOutcome {
            next_state: t.next_state,
            reward: t.reward,
            done: t.done,
            info: self.grid.step_info(from, action, t.next_state),
        })
    }

    fn reseed(&mut self, seed: u64) {
        self.grid.rng = gridmdp_core::build_rng(Some(seed));
    }
}

impl MdpModel for PlainGrid {
    fn transitions(&self) -> Arc<TransitionTable> {
        Arc::clone(&self.grid.table)
    }

    fn shape(&self) -> GridShape {
        self.grid.shape
    }

    fn describe(&self) -> EnvDescriptor {
        let mut params = serde_json::Map::new();
        params.insert("grid_size".into(), json!(self.config.grid_size));
        params.insert("step_reward".into(), json!(self.config.step_reward));
        params.insert("terminal_reward".into(), json!(self.config.terminal_reward));
        params.insert("gamma".into(), json!(self.config.gamma));
        EnvDescriptor {
            name: "grid".to_string(),
            shape: self.grid.shape,
            n_states: self.n_states(),
            n_actions: self.n_actions(),
            terminal_states: self.terminal_states(),
            boundary: BoundaryPolicy::Hold,
            params,
        }
    }
}
