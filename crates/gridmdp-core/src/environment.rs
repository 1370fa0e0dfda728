//! Environment traits and the tabular transition model

use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::{Action, BoundaryPolicy, GridShape, MdpError, Result, StateId};

/// Tolerance on the probability mass of a transition list
const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// One outcome of taking an action in a state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Probability of this outcome
    pub probability: f64,
    /// Resulting state
    pub next_state: StateId,
    /// Immediate reward
    pub reward: f64,
    /// Whether `next_state` ends the episode
    pub done: bool,
}

impl Transition {
    /// A certain outcome
    #[must_use]
    pub fn certain(next_state: StateId, reward: f64, done: bool) -> Self {
        Self {
            probability: 1.0,
            next_state,
            reward,
            done,
        }
    }
}

/// `state → action → [Transition]`, stored flat in row-major order.
///
/// Built once by the environment and shared read-only behind an [`Arc`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    n_states: usize,
    n_actions: usize,
    entries: Vec<Vec<Transition>>,
}

impl TransitionTable {
    /// Table with an empty list for every `(state, action)` pair
    #[must_use]
    pub fn new(n_states: usize, n_actions: usize) -> Self {
        Self {
            n_states,
            n_actions,
            entries: vec![Vec::new(); n_states * n_actions],
        }
    }

    /// Build a four-action table by asking `f` for every `(state, action)` pair
    pub fn from_fn<F>(n_states: usize, mut f: F) -> Self
    where
        F: FnMut(StateId, Action) -> Vec<Transition>,
    {
        let mut entries = Vec::with_capacity(n_states * Action::COUNT);
        for state in 0..n_states {
            for action in Action::ALL {
                entries.push(f(state, action));
            }
        }
        Self {
            n_states,
            n_actions: Action::COUNT,
            entries,
        }
    }

    /// Number of states
    #[must_use]
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Number of actions
    #[must_use]
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Outcomes of `action` in `state`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range; callers iterate `0..n_states`
    /// and `0..n_actions`.
    #[must_use]
    pub fn get(&self, state: StateId, action: usize) -> &[Transition] {
        &self.entries[state * self.n_actions + action]
    }

    /// Checked variant of [`TransitionTable::get`]
    pub fn try_get(&self, state: StateId, action: usize) -> Result<&[Transition]> {
        if state >= self.n_states {
            return Err(MdpError::InvalidState {
                state,
                n_states: self.n_states,
            });
        }
        if action >= self.n_actions {
            return Err(MdpError::InvalidAction(action));
        }
        Ok(self.get(state, action))
    }

    /// Replace the outcomes of `(state, action)`
    pub fn set(&mut self, state: StateId, action: usize, transitions: Vec<Transition>) -> Result<()> {
        self.try_get(state, action)?;
        self.entries[state * self.n_actions + action] = transitions;
        Ok(())
    }

    /// Check that every list is non-empty, points inside the table and sums to 1
    pub fn validate(&self) -> Result<()> {
        for state in 0..self.n_states {
            for action in 0..self.n_actions {
                let list = self.get(state, action);
                let invalid = |reason: String| MdpError::InvalidTransitions {
                    state,
                    action,
                    reason,
                };
                if list.is_empty() {
                    return Err(invalid("no outcomes".to_string()));
                }
                let mut mass = 0.0;
                for t in list {
                    if t.next_state >= self.n_states {
                        return Err(invalid(format!("next state {} out of range", t.next_state)));
                    }
                    if !(0.0..=1.0).contains(&t.probability) {
                        return Err(invalid(format!("probability {} outside [0, 1]", t.probability)));
                    }
                    mass += t.probability;
                }
                if (mass - 1.0).abs() > PROBABILITY_TOLERANCE {
                    return Err(invalid(format!("probabilities sum to {mass}")));
                }
            }
        }
        Ok(())
    }

    /// Draw one outcome of `(state, action)`.
    ///
    /// Single-entry lists are returned directly without touching `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, state: StateId, action: usize, rng: &mut R) -> Result<Transition> {
        let list = self.try_get(state, action)?;
        match list {
            [] => Err(MdpError::InvalidTransitions {
                state,
                action,
                reason: "no outcomes".to_string(),
            }),
            [only] => Ok(*only),
            many => {
                let dist = WeightedIndex::new(many.iter().map(|t| t.probability)).map_err(|e| {
                    MdpError::InvalidTransitions {
                        state,
                        action,
                        reason: e.to_string(),
                    }
                })?;
                Ok(many[dist.sample(rng)])
            }
        }
    }
}

/// Seeded generator when `seed` is given, entropy-seeded otherwise
#[must_use]
pub fn build_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StepInfo {
    /// Add a field
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(key.into(), value);
    }

    /// Builder form of [`StepInfo::insert`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// Result of a single environment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// State after the step
    pub next_state: StateId,
    /// Reward signal
    pub reward: f64,
    /// Whether the episode is done
    pub done: bool,
    /// Variant-specific details
    pub info: StepInfo,
}

/// Static description of an environment, used in exports and logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvDescriptor {
    /// Environment name (`grid`, `windy`, `cliff`)
    pub name: String,
    /// Grid dimensions
    pub shape: GridShape,
    /// Number of states
    pub n_states: usize,
    /// Number of actions
    pub n_actions: usize,
    /// Absorbing states
    pub terminal_states: Vec<StateId>,
    /// How off-grid moves are resolved
    pub boundary: BoundaryPolicy,
    /// Variant parameters (rewards, wind, start/goal)
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Sampling interface used by temporal-difference control
pub trait Environment: Send + Sync {
    /// Number of states
    fn n_states(&self) -> usize;

    /// Number of actions
    fn n_actions(&self) -> usize {
        Action::COUNT
    }

    /// Whether `state` is absorbing
    fn is_terminal(&self, state: StateId) -> bool;

    /// Current state, `None` before the first reset
    fn current_state(&self) -> Option<StateId>;

    /// Start a new episode, at `start_state` if given
    fn reset(&mut self, start_state: Option<StateId>) -> Result<StateId>;

    /// Take a step from the current state
    fn step(&mut self, action: Action) -> Result<StepOutcome>;

    /// Reseed the environment's random source
    fn reseed(&mut self, seed: u64);
}

/// Full-model interface used by dynamic programming
pub trait MdpModel: Environment {
    /// Shared transition table
    fn transitions(&self) -> Arc<TransitionTable>;

    /// Grid dimensions
    fn shape(&self) -> GridShape;

    /// Static description
    fn describe(&self) -> EnvDescriptor;

    /// All absorbing states in ascending order
    fn terminal_states(&self) -> Vec<StateId> {
        (0..self.n_states()).filter(|&s| self.is_terminal(s)).collect()
    }
}
