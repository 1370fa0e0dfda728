//! Cliff walking

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use gridmdp_core::{
    build_rng, Action, BoundaryPolicy, EnvDescriptor, Environment, GridShape, MdpError, MdpModel, Position,
    Result, StateId, StepOutcome, Transition, TransitionTable,
};

use crate::tabular::{absorbing, TabularGrid};

/// Cliff walking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliffWalkingConfig {
    /// Number of rows
    pub height: usize,
    /// Number of columns
    pub width: usize,
    /// Start cell, where cliff falls send the agent
    pub start: Position,
    /// Goal cell, the only terminal
    pub goal: Position,
    /// Reward for an ordinary move
    pub step_reward: f64,
    /// Reward for walking into the cliff
    pub cliff_reward: f64,
    /// Reward for reaching the goal
    pub goal_reward: f64,
    /// Seed for the environment's random source
    pub seed: Option<u64>,
}

impl Default for CliffWalkingConfig {
    fn default() -> Self {
        Self {
            height: 4,
            width: 12,
            start: Position::new(3, 0),
            goal: Position::new(3, 11),
            step_reward: -1.0,
            cliff_reward: -100.0,
            goal_reward: 0.0,
            seed: None,
        }
    }
}

impl CliffWalkingConfig {
    /// Check dimensions and that start and goal lie on the grid
    pub fn validate(&self) -> Result<()> {
        if self.height < 2 || self.width < 3 {
            return Err(MdpError::InvalidConfig(format!(
                "cliff walking needs at least a 2x3 grid, got {}x{}",
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

    /// Bottom-row cells strictly between the start and goal columns
    #[must_use]
    pub fn cliff_cells(&self) -> BTreeSet<StateId> {
        let shape = GridShape::new(self.height, self.width);
        let (lo, hi) = if self.start.col <= self.goal.col {
            (self.start.col, self.goal.col)
        } else {
            (self.goal.col, self.start.col)
        };
        ((lo + 1)..hi)
            .map(|col| shape.to_state(Position::new(self.height - 1, col)))
            .collect()
    }
}

/// Grid with a cliff along the bottom edge.
///
/// Walking into the cliff costs `cliff_reward` and sends the agent back to
/// the start without ending the episode.
#[derive(Debug, Clone)]
pub struct CliffWalking {
    config: CliffWalkingConfig,
    grid: TabularGrid,
    cliff: BTreeSet<StateId>,
    start_state: StateId,
    goal_state: StateId,
}

impl CliffWalking {
    /// Create a new cliff walking grid
    pub fn new(config: CliffWalkingConfig) -> Result<Self> {
        config.validate()?;
        let shape = GridShape::new(config.height, config.width);
        let start_state = shape.to_state(config.start);
        let goal_state = shape.to_state(config.goal);
        let cliff = config.cliff_cells();
        let mut terminal = vec![false; shape.n_states()];
        terminal[goal_state] = true;

        let fall = Transition::certain(start_state, config.cliff_reward, false);
        let table = TransitionTable::from_fn(shape.n_states(), |state, action| {
            if state == goal_state {
                return absorbing(state);
            }
            if cliff.contains(&state) {
                return vec![fall];
            }
            let next = shape.to_state(shape.shift(shape.to_position(state), action.delta(), BoundaryPolicy::Clamp));
            if cliff.contains(&next) {
                vec![fall]
            } else if next == goal_state {
                vec![Transition::certain(next, config.goal_reward, true)]
            } else {
                vec![Transition::certain(next, config.step_reward, false)]
            }
        });

        debug!(height = config.height, width = config.width, cliff_cells = cliff.len(), "built cliff walking grid");
        let grid = TabularGrid::new(shape, table, terminal, config.seed)?;
        Ok(Self {
            config,
            grid,
            cliff,
            start_state,
            goal_state,
        })
    }

    /// Configuration the grid was built from
    #[must_use]
    pub fn config(&self) -> &CliffWalkingConfig {
        &self.config
    }

    /// Whether `state` is a cliff cell
    #[must_use]
    pub fn is_cliff(&self, state: StateId) -> bool {
        self.cliff.contains(&state)
    }

    /// Cliff cells in ascending order
    #[must_use]
    pub fn cliff_states(&self) -> Vec<StateId> {
        self.cliff.iter().copied().collect()
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

impl Environment for CliffWalking {
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
        let shape = self.grid.shape;
        let target = shape.to_state(shape.shift(shape.to_position(from), action.delta(), BoundaryPolicy::Clamp));
        let fell = !self.is_terminal(from) && (self.is_cliff(from) || self.is_cliff(target));
        let info = self
            .grid
            .step_info(from, action, t.next_state)
            .with("fell_off_cliff", json!(fell));
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

impl MdpModel for CliffWalking {
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
        params.insert("cliff_states".into(), json!(self.cliff_states()));
        params.insert("step_reward".into(), json!(self.config.step_reward));
        params.insert("cliff_reward".into(), json!(self.config.cliff_reward));
        params.insert("goal_reward".into(), json!(self.config.goal_reward));
        EnvDescriptor {
            name: "cliff".to_string(),
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

    fn cliff() -> CliffWalking {
        CliffWalking::new(CliffWalkingConfig::default()).unwrap()
    }

    #[test]
    fn default_layout() {
        let env = cliff();
        assert_eq!(env.n_states(), 48);
        assert_eq!(env.start_state(), 36);
        assert_eq!(env.goal_state(), 47);
        assert_eq!(env.cliff_states(), (37..47).collect::<Vec<_>>());
        assert!(!env.is_terminal(40));
    }

    #[test]
    fn stepping_into_cliff_returns_to_start() {
        let mut env = cliff();
        env.reset(None).unwrap();
        let out = env.step(Action::Right).unwrap();
        assert_eq!(out.next_state, 36);
        assert_relative_eq!(out.reward, -100.0);
        assert!(!out.done);
        assert_eq!(out.info.get("fell_off_cliff"), Some(&json!(true)));
    }

    #[test]
    fn actions_from_cliff_cells_relocate() {
        let mut env = cliff();
        env.reset(Some(40)).unwrap();
        let out = env.step(Action::Up).unwrap();
        assert_eq!(out.next_state, 36);
        assert_relative_eq!(out.reward, -100.0);
    }

    #[test]
    fn safe_path_reaches_goal() {
        let mut env = cliff();
        env.reset(None).unwrap();
        let mut total = 0.0;
        let mut plan = vec![Action::Up];
        plan.extend(std::iter::repeat(Action::Right).take(11));
        plan.push(Action::Down);
        let mut done = false;
        for a in plan {
            let out = env.step(a).unwrap();
            total += out.reward;
            done = out.done;
            assert_eq!(out.info.get("fell_off_cliff"), Some(&json!(false)));
        }
        assert!(done);
        assert_relative_eq!(total, -12.0);
    }

    #[test]
    fn edges_clamp() {
        let mut env = cliff();
        env.reset(Some(0)).unwrap();
        assert_eq!(env.step(Action::Up).unwrap().next_state, 0);
        assert_eq!(env.step(Action::Left).unwrap().next_state, 0);
    }

    #[test]
    fn rejects_degenerate_layouts() {
        let same = CliffWalkingConfig {
            goal: Position::new(3, 0),
            ..Default::default()
        };
        assert!(CliffWalking::new(same).is_err());
        let tiny = CliffWalkingConfig {
            height: 1,
            ..Default::default()
        };
        assert!(CliffWalking::new(tiny).is_err());
    }
}
