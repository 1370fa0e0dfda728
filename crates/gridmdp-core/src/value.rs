//! Bellman backups over a transition table

use ndarray::{Array1, ArrayView1};

use crate::{StateId, TransitionTable};

/// `Σ p [r + γ V(s')]` for one `(state, action)` pair
#[must_use]
pub fn action_value(
    table: &TransitionTable,
    values: ArrayView1<'_, f64>,
    state: StateId,
    action: usize,
    gamma: f64,
) -> f64 {
    table
        .get(state, action)
        .iter()
        .map(|t| t.probability * (t.reward + gamma * values[t.next_state]))
        .sum()
}

/// [`action_value`] for every action of `state`
#[must_use]
pub fn action_values(
    table: &TransitionTable,
    values: ArrayView1<'_, f64>,
    state: StateId,
    gamma: f64,
) -> Array1<f64> {
    Array1::from_iter((0..table.n_actions()).map(|a| action_value(table, values, state, a, gamma)))
}

/// Expected backup under a stochastic policy row: `Σ_a π(a|s) Q(s, a)`.
///
/// Actions with zero probability are skipped.
#[must_use]
pub fn expected_value(
    table: &TransitionTable,
    values: ArrayView1<'_, f64>,
    policy_row: ArrayView1<'_, f64>,
    state: StateId,
    gamma: f64,
) -> f64 {
    policy_row
        .iter()
        .enumerate()
        .filter(|(_, p)| **p != 0.0)
        .map(|(a, p)| p * action_value(table, values, state, a, gamma))
        .sum()
}

/// Row maxima of a Q-table
#[must_use]
pub fn state_values(q: &ndarray::Array2<f64>) -> Array1<f64> {
    q.rows()
        .into_iter()
        .map(|row| row.fold(f64::NEG_INFINITY, |m, &v| m.max(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, Transition};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_state() -> TransitionTable {
        TransitionTable::from_fn(2, |s, a| match (s, a) {
            (1, _) => vec![Transition::certain(1, 0.0, true)],
            (0, Action::Right) => vec![Transition::certain(1, 5.0, true)],
            _ => vec![Transition::certain(0, -1.0, false)],
        })
    }

    #[test]
    fn backups_use_discounted_successor() {
        let table = two_state();
        let v = array![2.0, 0.0];
        let q = action_values(&table, v.view(), 0, 0.5);
        assert_relative_eq!(q[Action::Up.index()], -1.0 + 0.5 * 2.0);
        assert_relative_eq!(q[Action::Right.index()], 5.0);
    }

    #[test]
    fn expected_value_weights_actions() {
        let table = two_state();
        let v = array![0.0, 0.0];
        let uniform = array![0.25, 0.25, 0.25, 0.25];
        assert_relative_eq!(expected_value(&table, v.view(), uniform.view(), 0, 1.0), 0.5);
    }

    #[test]
    fn row_maxima() {
        let q = array![[1.0, -2.0], [-3.0, -1.0]];
        assert_eq!(state_values(&q), array![1.0, -1.0]);
    }
}
