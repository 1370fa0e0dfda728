//! Windy gridworld: an upward wind pushes the agent in some columns

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use gridmdp_core::{
    build_rng, Action, BoundaryPolicy, EnvDescriptor, Environment, GridShape, MdpError, MdpModel, Position,
    Result, StateId, StepOutcome, Transition, TransitionTable,
};

use crate::tabular::{absorbing, TabularGrid};

/// Windy grid configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindyGridConfig {
    /// Number of rows
    pub height: usize,
    /// Number of columns
    pub width: usize,
    /// Start cell
    pub start: Position,
    /// Goal cell, the only terminal
    pub goal: Position,
    /// Reward for every move that does not reach the goal
    pub step_reward: f64,
    /// Reward for reaching the goal
    pub goal_reward: f64,
    /// Upward push per column; missing columns have no wind
    pub wind: Vec<usize>,
    /// Seed for the environment's random source
    pub seed: Option<u64>,
}

impl Default for WindyGridConfig {
    fn default() -> Self {
        Self {
            height: 7,
            width: 10,
            start: Position::new(3, 0),
            goal: Position::new(3, 7),
            step_reward: -1.0,
            goal_reward: 0.0,
            wind: vec![0, 0, 0, 1, 1, 1, 2, 2, 1, 0],
            seed: None,
        }
    }
}

impl WindyGridConfig {
    /// Check dimensions and that start and goal lie on the grid
    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(MdpError::InvalidConfig(format!(
                "windy grid must be non-empty, got {}x{}",
                self.height, self.width
            )));
        }
        let shape = GridShape::new(self.height, self.width);
        shape.check_position(self.start)?;
        shape.check_position(self.goal)?;
        if self.start == self.goal {
            return Err(MdpError::InvalidConfig("start and goal coincide".to_string()));
        }
        Ok(())
    }

    /// Wind strength of `col`
    #[must_use]
    pub fn wind_at(&self, col: usize) -> usize {
        self.wind.get(col).copied().unwrap_or(0)
    }
}

/// Grid where the wind of the column being left shifts the agent upward
/// after each move, clamped at the edges.
#[derive(Debug, Clone)]
pub struct WindyGrid {
    config: WindyGridConfig,
    grid: TabularGrid,
    start_state: StateId,
    goal_state: StateId,
}

impl WindyGrid {
    /// Create a new windy grid
    pub fn new(config: WindyGridConfig) -> Result<Self> {
        config.validate()?;
        let shape = GridShape::new(config.height, config.width);
        let start_state = shape.to_state(config.start);
        let goal_state = shape.to_state(config.goal);
        let mut terminal = vec![false; shape.n_states()];
        terminal[goal_state] = true;

        let table = TransitionTable::from_fn(shape.n_states(), |state, action| {
            if state == goal_state {
                return absorbing(state);
            }
            let pos = shape.to_position(state);
            let (d_row, d_col) = action.delta();
            let row = pos.row as isize + d_row - config.wind_at(pos.col) as isize;
            let col = pos.col as isize + d_col;
            let next = shape.to_state(shape.clamp(row, col));
            let done = next == goal_state;
            let reward = if done { config.goal_reward } else { config.step_reward };
            vec![Transition::certain(next, reward, done)]
        });

        debug!(height = config.height, width = config.width, wind = ?config.wind, "built windy grid");
        let grid = TabularGrid::new(shape, table, terminal, config.seed)?;
        Ok(Self {
            config,
            grid,
            start_state,
            goal_state,
        })
    }

    /// Configuration the grid was built from
    #[must_use]
    pub fn config(&self) -> &WindyGridConfig {
        &self.config
    }

    /// Wind strength for every column
    #[must_use]
    pub fn wind(&self) -> Vec<usize> {
        (0..self.config.width).map(|c| self.config.wind_at(c)).collect()
    }

    /// Default start state
    #[must_use]
    pub fn start_state(&self) -> StateId {
        self.start_state
    }

    /// Goal state
    #[must_use]
    pub fn goal_state(&self) -> StateId {
        self.goal_state
    }
}

impl Environment for WindyGrid {
    fn n_states(&self) -> usize {
        self.grid.shape.n_states()
    }

    fn is_terminal(&self, state: StateId) -> bool {
        state == self.goal_state
    }

    fn current_state(&self) -> Option<StateId> {
        self.grid.current
    }

    fn reset(&mut self, start_state: Option<StateId>) -> Result<StateId> {
        self.grid.place(start_state.unwrap_or(self.start_state))
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome> {
        let (from, t) = self.grid.advance(action)?;
        let wind = self.config.wind_at(self.grid.shape.to_position(from).col);
        let info = self.grid.step_info(from, action, t.next_state).with("wind", json!(wind));
        Ok(StepOutcome {
            next_state: t.next_state,
            reward: t.reward,
            done: t.done,
            info,
        })
    }

    fn reseed(&mut self, seed: u64) {
        self.grid.rng = build_rng(Some(seed));
    }
}

impl MdpModel for WindyGrid {
    fn transitions(&self) -> Arc<TransitionTable> {
        Arc::clone(&self.grid.table)
    }

    fn shape(&self) -> GridShape {
        self.grid.shape
    }

    fn terminal_states(&self) -> Vec<StateId> {
        vec![self.goal_state]
    }

    fn describe(&self) -> EnvDescriptor {
        let mut params = serde_json::Map::new();
        params.insert("start_state".into(), json!(self.start_state));
        params.insert("goal_state".into(), json!(self.goal_state));
        params.insert("wind".into(), json!(self.wind()));
        params.insert("step_reward".into(), json!(self.config.step_reward));
        params.insert("goal_reward".into(), json!(self.config.goal_reward));
        EnvDescriptor {
            name: "windy".to_string(),
            shape: self.grid.shape,
            n_states: self.n_states(),
            n_actions: self.n_actions(),
            terminal_states: self.terminal_states(),
            boundary: BoundaryPolicy::Clamp,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn windy() -> WindyGrid {
        WindyGrid::new(WindyGridConfig::default()).unwrap()
    }

    #[test]
    fn defaults_match_classic_layout() {
        let env = windy();
        assert_eq!(env.n_states(), 70);
        assert_eq!(env.start_state(), 30);
        assert_eq!(env.goal_state(), 37);
        assert_eq!(env.terminal_states(), vec![37]);
        assert_eq!(env.wind(), vec![0, 0, 0, 1, 1, 1, 2, 2, 1, 0]);
    }

    #[test]
    fn wind_uses_origin_column() {
        let mut env = windy();
        // (3, 2) has no wind; moving right into column 3 is not pushed
        env.reset(Some(32)).unwrap();
        let out = env.step(Action::Right).unwrap();
        assert_eq!(out.next_state, 33);
        assert_eq!(out.info.get("wind"), Some(&json!(0)));
        // from column 3 the wind of 1 applies
        let out = env.step(Action::Right).unwrap();
        assert_eq!(out.next_state, 24);
    }

    #[test]
    fn reaching_goal_ends_episode() {
        let mut env = windy();
        // (4, 6) right: column 6 has wind 2
        env.reset(Some(46)).unwrap();
        let out = env.step(Action::Right).unwrap();
        assert_eq!(out.next_state, 27);
        env.reset(Some(47)).unwrap();
        // (4, 7) left with wind 2 lands on (2, 6)
        assert_eq!(env.step(Action::Left).unwrap().next_state, 26);
        env.reset(Some(38)).unwrap();
        let out = env.step(Action::Left).unwrap();
        // column 8 wind 1: (3,8) -> (2,7)
        assert_eq!(out.next_state, 27);
        env.reset(Some(48)).unwrap();
        let out = env.step(Action::Left).unwrap();
        assert_eq!(out.next_state, 37);
        assert!(out.done);
        assert_relative_eq!(out.reward, 0.0);
    }

    #[test]
    fn short_wind_vector_is_padded() {
        let env = WindyGrid::new(WindyGridConfig {
            wind: vec![1],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(env.wind().iter().sum::<usize>(), 1);
    }

    #[test]
    fn goal_outside_grid_is_rejected() {
        let config = WindyGridConfig {
            goal: Position::new(7, 0),
            ..Default::default()
        };
        assert!(matches!(WindyGrid::new(config), Err(MdpError::InvalidConfig(_))));
    }

    #[test]
    fn start_on_goal_is_rejected() {
        let config = WindyGridConfig {
            start: Position::new(3, 7),
            ..Default::default()
        };
        assert!(matches!(WindyGrid::new(config), Err(MdpError::InvalidConfig(_))));
    }

    proptest! {
        #[test]
        fn wind_lifts_at_least_its_strength(row in 0usize..7, col in 0usize..10, a in 0usize..4) {
            let mut env = windy();
            let state = row * 10 + col;
            prop_assume!(!env.is_terminal(state));
            let action = Action::try_from(a).unwrap();
            env.reset(Some(state)).unwrap();
            let out = env.step(action).unwrap();
            let w = env.config().wind_at(col) as isize;
            let nominal = row as isize + action.delta().0;
            let landed = (out.next_state / 10) as isize;
            prop_assert_eq!(landed, (nominal - w).clamp(0, 6));
            if w > 0 && nominal >= w {
                prop_assert!(landed <= nominal - w);
            }
        }
    }
}
