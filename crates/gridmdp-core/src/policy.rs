//! Tabular policies and action selection

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Action, StateId};

/// Two action values closer than this are treated as tied
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Index of the largest value, first index on ties
#[must_use]
pub fn argmax_first(values: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Every index whose value is within `tolerance` of the maximum, ascending
#[must_use]
pub fn maximal_actions(values: ArrayView1<'_, f64>, tolerance: f64) -> Vec<usize> {
    let max = values.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| max - **v <= tolerance)
        .map(|(i, _)| i)
        .collect()
}

/// Distribution splitting mass evenly over the maximal actions of `values`
#[must_use]
pub fn tie_split(values: ArrayView1<'_, f64>) -> Array1<f64> {
    let best = maximal_actions(values, TIE_TOLERANCE);
    let mut row = Array1::zeros(values.len());
    let share = 1.0 / best.len() as f64;
    for a in best {
        row[a] = share;
    }
    row
}

/// Uniform over actions, zero rows for terminal states
#[must_use]
pub fn uniform_policy(n_actions: usize, terminal: &[bool]) -> Array2<f64> {
    let mut policy = Array2::from_elem((terminal.len(), n_actions), 1.0 / n_actions as f64);
    zero_terminal_rows(&mut policy, terminal);
    policy
}

/// All mass on action 0, zero rows for terminal states
#[must_use]
pub fn first_action_policy(n_actions: usize, terminal: &[bool]) -> Array2<f64> {
    let mut policy = Array2::zeros((terminal.len(), n_actions));
    policy.column_mut(0).fill(1.0);
    zero_terminal_rows(&mut policy, terminal);
    policy
}

/// One-hot on the first arg-max of every row of `q`
#[must_use]
pub fn one_hot_policy(q: &Array2<f64>) -> Array2<f64> {
    let mut policy = Array2::zeros(q.raw_dim());
    for (s, row) in q.rows().into_iter().enumerate() {
        policy[[s, argmax_first(row)]] = 1.0;
    }
    policy
}

fn zero_terminal_rows(policy: &mut Array2<f64>, terminal: &[bool]) {
    for (s, _) in terminal.iter().enumerate().filter(|(_, t)| **t) {
        policy.row_mut(s).fill(0.0);
    }
}

/// Arrow glyphs per state: `"T"` for terminals, otherwise the actions with
/// non-zero probability
#[must_use]
pub fn policy_arrows(policy: &Array2<f64>, terminal: &[bool]) -> Vec<String> {
    policy
        .rows()
        .into_iter()
        .enumerate()
        .map(|(s, row)| {
            if terminal.get(s).copied().unwrap_or(false) {
                return "T".to_string();
            }
            row.iter()
                .enumerate()
                .filter(|(_, p)| **p > 0.0)
                .filter_map(|(a, _)| Action::try_from(a).ok())
                .map(Action::arrow)
                .collect()
        })
        .collect()
}

/// Epsilon-greedy selection over a Q-table row with a decaying rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    /// Exploration rate
    pub epsilon: f64,
    /// Multiplicative decay applied once per episode
    pub decay: f64,
    /// Floor for the decayed rate
    pub min_epsilon: f64,
}

impl EpsilonGreedy {
    /// Create a new epsilon-greedy selector
    #[must_use]
    pub fn new(epsilon: f64, decay: f64, min_epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            decay,
            min_epsilon,
        }
    }

    /// Set the exploration rate
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// `ε ← max(min_epsilon, ε · decay)`
    pub fn decay(&mut self) {
        self.epsilon = (self.epsilon * self.decay).max(self.min_epsilon);
    }

    /// Pick an action for `state` from `q` with the current rate
    pub fn select<R: Rng + ?Sized>(&self, q: &Array2<f64>, state: StateId, rng: &mut R) -> usize {
        select_epsilon_greedy(q.row(state), self.epsilon, rng)
    }
}

/// With probability `epsilon` a uniform action, otherwise the first arg-max
pub fn select_epsilon_greedy<R: Rng + ?Sized>(q_row: ArrayView1<'_, f64>, epsilon: f64, rng: &mut R) -> usize {
    if rng.gen::<f64>() < epsilon {
        rng.gen_range(0..q_row.len())
    } else {
        argmax_first(q_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn argmax_prefers_first_index() {
        assert_eq!(argmax_first(array![0.0, 2.0, 2.0, -1.0].view()), 1);
        assert_eq!(argmax_first(array![0.0, 0.0, 0.0, 0.0].view()), 0);
    }

    #[test]
    fn ties_within_tolerance_share_mass() {
        let row = tie_split(array![-1.0, -1.0 + 1e-12, -3.0, -2.0].view());
        assert_relative_eq!(row[0], 0.5);
        assert_relative_eq!(row[1], 0.5);
        assert_relative_eq!(row.sum(), 1.0);
        assert_eq!(maximal_actions(array![1.0, 0.5].view(), TIE_TOLERANCE), vec![0]);
    }

    #[test]
    fn uniform_policy_zeroes_terminals() {
        let terminal = [true, false, false, true];
        let policy = uniform_policy(4, &terminal);
        assert_relative_eq!(policy.row(0).sum(), 0.0);
        assert_relative_eq!(policy.row(1).sum(), 1.0);
        assert_relative_eq!(policy[[2, 3]], 0.25);

        let first = first_action_policy(4, &terminal);
        assert_relative_eq!(first[[1, 0]], 1.0);
        assert_relative_eq!(first.row(3).sum(), 0.0);
    }

    #[test]
    fn one_hot_follows_first_argmax() {
        let q = array![[0.0, 1.0, 1.0, 0.0], [-2.0, -1.0, -3.0, -1.0]];
        let policy = one_hot_policy(&q);
        assert_eq!(policy, array![[0.0, 1.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]]);
    }

    #[test]
    fn arrows_mark_terminals() {
        let policy = array![[0.0, 0.0, 0.0, 0.0], [0.0, 0.5, 0.0, 0.5]];
        assert_eq!(policy_arrows(&policy, &[true, false]), vec!["T".to_string(), "↓→".to_string()]);
    }

    #[test]
    fn epsilon_decays_to_floor() {
        let mut eg = EpsilonGreedy::new(0.5, 0.5, 0.1);
        eg.decay();
        assert_relative_eq!(eg.epsilon, 0.25);
        eg.decay();
        eg.decay();
        assert_relative_eq!(eg.epsilon, 0.1);
    }

    #[test]
    fn greedy_selection_without_exploration() {
        let q = array![[0.0, 3.0, 1.0, 3.0]];
        let mut rng = StdRng::seed_from_u64(3);
        let eg = EpsilonGreedy::new(0.0, 1.0, 0.0);
        for _ in 0..20 {
            assert_eq!(eg.select(&q, 0, &mut rng), 1);
        }
    }

    #[test]
    fn full_exploration_visits_every_action() {
        let q = array![[0.0, 3.0, 1.0, 3.0]];
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[select_epsilon_greedy(q.row(0), 1.0, &mut rng)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
