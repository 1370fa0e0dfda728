//! Iteration, episode and trajectory records

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{Action, StateId};

/// One state update made by a dynamic-programming sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Sweep index
    pub iteration: usize,
    /// Updated state
    pub state: StateId,
    /// Greedy action (value iteration only)
    pub action: Option<Action>,
    /// Value before the update
    pub old_value: f64,
    /// Value after the update
    pub new_value: f64,
    /// `|new_value - old_value|`
    pub delta: f64,
}

impl IterationRecord {
    /// Build a record, computing the delta
    #[must_use]
    pub fn new(iteration: usize, state: StateId, action: Option<Action>, old_value: f64, new_value: f64) -> Self {
        Self {
            iteration,
            state,
            action,
            old_value,
            new_value,
            delta: (new_value - old_value).abs(),
        }
    }
}

/// Snapshot taken after a policy-iteration round or a value-iteration sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpEpisodeRecord {
    /// Position in the episode history
    pub episode: usize,
    /// Whether policy improvement left the policy unchanged
    pub policy_stable: bool,
    /// Largest update in the round, `None` for the initial snapshot
    pub max_delta: Option<f64>,
    /// Value function at snapshot time
    pub values: Array1<f64>,
    /// Policy at snapshot time
    pub policy: Array2<f64>,
    /// Start of the covered span in the solver's iteration history
    pub first_record: usize,
    /// Number of iteration records in the span
    pub record_count: usize,
}

impl DpEpisodeRecord {
    /// Indices of the covered iteration records
    #[must_use]
    pub fn records(&self) -> Range<usize> {
        self.first_record..self.first_record + self.record_count
    }
}

/// Single transition taken during a TD episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    /// State the action was taken in
    pub state: StateId,
    /// Action taken
    pub action: Action,
    /// Reward received
    pub reward: f64,
    /// Resulting state
    pub next_state: StateId,
    /// Whether the step ended the episode
    pub done: bool,
}

/// Ordered steps of one episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Sequence of steps
    pub steps: Vec<TrajectoryStep>,
    /// Total reward
    pub total_reward: f64,
}

impl Trajectory {
    /// Create a new empty trajectory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step to the trajectory
    pub fn push(&mut self, step: TrajectoryStep) {
        self.total_reward += step.reward;
        self.steps.push(step);
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the trajectory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Visited states, starting state first
    #[must_use]
    pub fn states(&self) -> Vec<StateId> {
        let mut states: Vec<StateId> = self.steps.iter().map(|s| s.state).collect();
        if let Some(last) = self.steps.last() {
            states.push(last.next_state);
        }
        states
    }
}

/// Summary of one completed TD episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdEpisodeRecord {
    /// Episode index within the run
    pub episode: usize,
    /// Sum of rewards
    pub total_reward: f64,
    /// Number of steps taken
    pub steps: usize,
    /// State the episode started in
    pub start_state: StateId,
    /// State the episode ended in
    pub end_state: StateId,
    /// Whether the episode ended in a terminal state
    pub success: bool,
    /// Exploration rate used during the episode
    pub epsilon: f64,
    /// Full trajectory when recording is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_accumulates_reward() {
        let mut t = Trajectory::new();
        assert!(t.is_empty());
        t.push(TrajectoryStep { state: 4, action: Action::Up, reward: -1.0, next_state: 0, done: true });
        assert_eq!(t.len(), 1);
        assert!((t.total_reward + 1.0).abs() < f64::EPSILON);
        assert_eq!(t.states(), vec![4, 0]);
    }

    #[test]
    fn record_delta_is_absolute() {
        let r = IterationRecord::new(0, 3, None, -2.0, -3.5);
        assert!((r.delta - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn episode_span() {
        let record = DpEpisodeRecord {
            episode: 1,
            policy_stable: false,
            max_delta: None,
            values: Array1::zeros(2),
            policy: Array2::zeros((2, 4)),
            first_record: 14,
            record_count: 7,
        };
        assert_eq!(record.records(), 14..21);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"max_delta\":null"));
    }
}
