//! State shared by the table-driven grid worlds

use std::sync::Arc;

use rand::rngs::StdRng;
use serde_json::json;

use gridmdp_core::{
    build_rng, Action, GridShape, MdpError, Result, StateId, StepInfo, Transition, TransitionTable,
};

/// Grid geometry, a validated transition table and the episode cursor
#[derive(Debug, Clone)]
pub(crate) struct TabularGrid {
    pub(crate) shape: GridShape,
    pub(crate) table: Arc<TransitionTable>,
    pub(crate) terminal: Vec<bool>,
    pub(crate) current: Option<StateId>,
    pub(crate) rng: StdRng,
}

impl TabularGrid {
    pub(crate) fn new(shape: GridShape, table: TransitionTable, terminal: Vec<bool>, seed: Option<u64>) -> Result<Self> {
        if terminal.len() != shape.n_states() {
            return Err(MdpError::DimensionMismatch {
                expected: shape.n_states(),
                actual: terminal.len(),
            });
        }
        table.validate()?;
        Ok(Self {
            shape,
            table: Arc::new(table),
            terminal,
            current: None,
            rng: build_rng(seed),
        })
    }

    pub(crate) fn is_terminal(&self, state: StateId) -> bool {
        self.terminal.get(state).copied().unwrap_or(false)
    }

    pub(crate) fn place(&mut self, state: StateId) -> Result<StateId> {
        self.shape.check_state(state)?;
        self.current = Some(state);
        Ok(state)
    }

    /// Sample the outcome of `action` and move the cursor
    pub(crate) fn advance(&mut self, action: Action) -> Result<(StateId, Transition)> {
        let from = self.current.ok_or(MdpError::NotReset)?;
        let outcome = self.table.sample(from, action.index(), &mut self.rng)?;
        self.current = Some(outcome.next_state);
        Ok((from, outcome))
    }

    /// Fields every grid reports on a step
    pub(crate) fn step_info(&self, from: StateId, action: Action, to: StateId) -> StepInfo {
        let old = self.shape.to_position(from);
        let new = self.shape.to_position(to);
        StepInfo::default()
            .with("previous_state", json!(from))
            .with("action", json!(action.name()))
            .with("old_position", json!([old.row, old.col]))
            .with("new_position", json!([new.row, new.col]))
    }
}

/// Absorbing self-loop used for every action of a terminal state
pub(crate) fn absorbing(state: StateId) -> Vec<Transition> {
    vec![Transition::certain(state, 0.0, true)]
}
