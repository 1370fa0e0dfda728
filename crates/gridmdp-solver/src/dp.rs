//! Dynamic programming: policy evaluation, policy iteration, value iteration

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gridmdp_core::policy::{first_action_policy, policy_arrows, tie_split, uniform_policy};
use gridmdp_core::value::expected_value;
use gridmdp_core::{
    action_values, argmax_first, maximal_actions, Action, DpEpisodeRecord, IterationRecord, MdpError, MdpModel,
    ProgressEvent, ProgressSink, Result, StateId, TransitionTable, TIE_TOLERANCE,
};

use crate::config::{DpConfig, InitialPolicy};

/// Dynamic-programming entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpAlgorithm {
    /// Evaluate the current policy
    PolicyEvaluation,
    /// Alternate evaluation and greedy improvement
    PolicyIteration,
    /// Bellman-optimality sweeps
    ValueIteration,
}

impl DpAlgorithm {
    /// Canonical name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DpAlgorithm::PolicyEvaluation => "policy_evaluation",
            DpAlgorithm::PolicyIteration => "policy_iteration",
            DpAlgorithm::ValueIteration => "value_iteration",
        }
    }
}

impl fmt::Display for DpAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for DpAlgorithm {
    type Err = MdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "policy_evaluation" => Ok(DpAlgorithm::PolicyEvaluation),
            "policy_iteration" => Ok(DpAlgorithm::PolicyIteration),
            "value_iteration" => Ok(DpAlgorithm::ValueIteration),
            other => Err(MdpError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Summary of one policy-evaluation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// Sweeps performed
    pub sweeps: usize,
    /// Max delta of every sweep
    pub deltas: Vec<f64>,
    /// Whether the last sweep fell below theta
    pub converged: bool,
    /// Start of this call's records in the solver history
    pub first_record: usize,
    /// Number of records this call appended
    pub record_count: usize,
}

impl PolicyEvaluation {
    /// Largest single-state update, 0 when nothing was updated
    #[must_use]
    pub fn max_delta(&self) -> f64 {
        self.deltas.iter().copied().fold(0.0, f64::max)
    }
}

/// Terminal snapshot of a dynamic-programming run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpResult {
    /// Algorithm that produced the result
    pub algorithm: DpAlgorithm,
    /// Whether the stopping criterion was met before the cap
    pub converged: bool,
    /// Evaluation or Bellman sweeps performed
    pub total_iterations: usize,
    /// Single-state updates performed
    pub total_updates: usize,
    /// Policy-iteration rounds, or value-iteration sweeps
    pub total_episodes: usize,
    /// Final value function
    pub final_values: Array1<f64>,
    /// Final policy
    pub final_policy: Array2<f64>,
    /// Every state update in order
    pub history: Vec<IterationRecord>,
    /// Round or sweep snapshots
    pub episode_history: Vec<DpEpisodeRecord>,
    /// Wall-clock seconds
    pub execution_time: f64,
}

/// Exact solver over a full transition model.
///
/// Owns its value function, policy and history; the transition table is
/// shared read-only with the environment it came from.
pub struct DpSolver {
    table: Arc<TransitionTable>,
    terminal: Vec<bool>,
    config: DpConfig,
    values: Array1<f64>,
    policy: Array2<f64>,
    history: Vec<IterationRecord>,
    episode_history: Vec<DpEpisodeRecord>,
    sink: Option<Box<dyn ProgressSink>>,
}

impl fmt::Debug for DpSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DpSolver")
            .field("n_states", &self.table.n_states())
            .field("config", &self.config)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl DpSolver {
    /// Create a solver for `model`
    pub fn new<M: MdpModel + ?Sized>(model: &M, config: DpConfig) -> Result<Self> {
        let terminal = (0..model.n_states()).map(|s| model.is_terminal(s)).collect();
        Self::from_parts(model.transitions(), terminal, config)
    }

    /// Create a solver from a table and a terminal mask
    pub fn from_parts(table: Arc<TransitionTable>, terminal: Vec<bool>, config: DpConfig) -> Result<Self> {
        config.validate()?;
        if terminal.len() != table.n_states() {
            return Err(MdpError::DimensionMismatch {
                expected: table.n_states(),
                actual: terminal.len(),
            });
        }
        let policy = initial_policy(config.initial_policy, table.n_actions(), &terminal);
        Ok(Self {
            values: Array1::zeros(table.n_states()),
            policy,
            table,
            terminal,
            config,
            history: Vec::new(),
            episode_history: Vec::new(),
            sink: None,
        })
    }

    /// Attach a progress sink
    #[must_use]
    pub fn with_progress(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace or remove the progress sink
    pub fn set_progress(&mut self, sink: Option<Box<dyn ProgressSink>>) {
        self.sink = sink;
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &DpConfig {
        &self.config
    }

    /// Zero the values, restore the initial policy and drop all history
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.policy = initial_policy(self.config.initial_policy, self.table.n_actions(), &self.terminal);
        self.history.clear();
        self.episode_history.clear();
    }

    /// Iteratively solve `V = Σ_a π(a|s) Σ p [r + γV(s')]` for `policy`, or the
    /// solver's own policy when `None`.
    ///
    /// `in_place` selects Gauss–Seidel updates; otherwise each sweep reads a
    /// snapshot of the previous sweep.
    pub fn policy_evaluation(&mut self, policy: Option<&Array2<f64>>, in_place: bool) -> Result<PolicyEvaluation> {
        let policy = match policy {
            Some(p) => {
                let expected = self.policy.dim();
                if p.dim() != expected {
                    return Err(MdpError::DimensionMismatch {
                        expected: expected.0 * expected.1,
                        actual: p.len(),
                    });
                }
                p.clone()
            }
            None => self.policy.clone(),
        };
        Ok(self.evaluate(&policy, in_place))
    }

    fn evaluate(&mut self, policy: &Array2<f64>, in_place: bool) -> PolicyEvaluation {
        let table = Arc::clone(&self.table);
        let gamma = self.config.gamma;
        let first_record = self.history.len();
        let mut deltas = Vec::new();
        let mut converged = false;

        for sweep in 0..self.config.max_iterations {
            let previous = if in_place { None } else { Some(self.values.clone()) };
            let mut delta: f64 = 0.0;
            for state in self.non_terminal_states() {
                let old = self.values[state];
                let source = previous.as_ref().unwrap_or(&self.values);
                let new = expected_value(&table, source.view(), policy.row(state), state, gamma);
                self.values[state] = new;
                delta = delta.max((new - old).abs());
                self.record(IterationRecord::new(sweep, state, None, old, new));
            }
            deltas.push(delta);
            if delta < self.config.theta {
                converged = true;
                break;
            }
        }

        let record_count = self.history.len() - first_record;
        counter!("gridmdp_dp_sweeps_total", deltas.len() as u64);
        counter!("gridmdp_dp_updates_total", record_count as u64);
        if !converged {
            warn!(sweeps = deltas.len(), "policy evaluation hit max_iterations without converging");
        }
        PolicyEvaluation {
            sweeps: deltas.len(),
            deltas,
            converged,
            first_record,
            record_count,
        }
    }

    /// Make the policy greedy in the current values.
    ///
    /// Each non-terminal row becomes uniform over every action attaining the
    /// maximum. Returns true when the previous first arg-max is among them
    /// for every state.
    pub fn policy_improvement(&mut self) -> bool {
        let mut stable = true;
        let mut improved = Array2::zeros(self.policy.raw_dim());
        for state in self.non_terminal_states() {
            let q = action_values(&self.table, self.values.view(), state, self.config.gamma);
            let best = maximal_actions(q.view(), TIE_TOLERANCE);
            if !best.contains(&argmax_first(self.policy.row(state))) {
                stable = false;
            }
            improved.row_mut(state).assign(&tie_split(q.view()));
        }
        self.policy = improved;
        stable
    }

    /// Alternate evaluation and improvement until the policy is stable or
    /// `max_iterations` rounds have run
    pub fn policy_iteration(&mut self) -> DpResult {
        let started = Instant::now();
        self.history.clear();
        self.episode_history.clear();
        info!(gamma = self.config.gamma, theta = self.config.theta, "starting policy iteration");

        let mut rounds = 0;
        let mut sweeps = 0;
        let mut stable = false;
        while rounds < self.config.max_iterations {
            let policy = self.policy.clone();
            let evaluation = self.evaluate(&policy, self.config.in_place);
            sweeps += evaluation.sweeps;
            stable = self.policy_improvement();
            debug!(round = rounds, sweeps = evaluation.sweeps, stable, "policy iteration round");
            self.push_episode(DpEpisodeRecord {
                episode: rounds,
                policy_stable: stable,
                max_delta: Some(evaluation.max_delta()),
                values: self.values.clone(),
                policy: self.policy.clone(),
                first_record: evaluation.first_record,
                record_count: evaluation.record_count,
            });
            rounds += 1;
            if stable {
                break;
            }
        }

        if !stable {
            warn!(rounds, "policy iteration stopped before the policy stabilized");
        }
        info!(rounds, sweeps, converged = stable, "policy iteration finished");
        self.result(DpAlgorithm::PolicyIteration, stable, sweeps, rounds, started)
    }

    /// Bellman-optimality sweeps until the max delta drops below theta, then
    /// extract a greedy policy with ties split evenly
    pub fn value_iteration(&mut self) -> DpResult {
        let started = Instant::now();
        self.history.clear();
        self.episode_history.clear();
        info!(gamma = self.config.gamma, theta = self.config.theta, "starting value iteration");

        let initial = uniform_policy(self.table.n_actions(), &self.terminal);
        self.push_episode(DpEpisodeRecord {
            episode: 0,
            policy_stable: false,
            max_delta: None,
            values: self.values.clone(),
            policy: initial,
            first_record: 0,
            record_count: 0,
        });

        let table = Arc::clone(&self.table);
        let mut sweeps = 0;
        let mut converged = false;
        while sweeps < self.config.max_iterations {
            let first_record = self.history.len();
            let mut delta: f64 = 0.0;
            for state in self.non_terminal_states() {
                let old = self.values[state];
                let q = action_values(&table, self.values.view(), state, self.config.gamma);
                let best = argmax_first(q.view());
                let new = q[best];
                self.values[state] = new;
                let state_delta = (new - old).abs();
                delta = delta.max(state_delta);
                self.record(IterationRecord::new(sweeps, state, Action::try_from(best).ok(), old, new));

                if self.config.snapshot_every_update {
                    let policy = self.greedy_policy();
                    self.push_episode(DpEpisodeRecord {
                        episode: self.episode_history.len(),
                        policy_stable: false,
                        max_delta: Some(state_delta),
                        values: self.values.clone(),
                        policy,
                        first_record: self.history.len() - 1,
                        record_count: 1,
                    });
                }
            }

            let policy = self.greedy_policy();
            let stable = self.episode_history.last().is_some_and(|prev| prev.policy == policy);
            self.push_episode(DpEpisodeRecord {
                episode: self.episode_history.len(),
                policy_stable: stable,
                max_delta: Some(delta),
                values: self.values.clone(),
                policy,
                first_record,
                record_count: self.history.len() - first_record,
            });
            sweeps += 1;
            counter!("gridmdp_dp_sweeps_total", 1);
            if delta < self.config.theta {
                converged = true;
                break;
            }
        }
        counter!("gridmdp_dp_updates_total", self.history.len() as u64);

        self.policy = self.greedy_policy();
        if !converged {
            warn!(sweeps, "value iteration hit max_iterations without converging");
        }
        info!(sweeps, converged, "value iteration finished");
        self.result(DpAlgorithm::ValueIteration, converged, sweeps, sweeps, started)
    }

    /// Run one algorithm and package its outcome
    pub fn run(&mut self, algorithm: DpAlgorithm) -> Result<DpResult> {
        match algorithm {
            DpAlgorithm::PolicyIteration => Ok(self.policy_iteration()),
            DpAlgorithm::ValueIteration => Ok(self.value_iteration()),
            DpAlgorithm::PolicyEvaluation => {
                let started = Instant::now();
                self.history.clear();
                self.episode_history.clear();
                info!(in_place = self.config.in_place, "starting policy evaluation");
                let evaluation = self.policy_evaluation(None, self.config.in_place)?;
                self.push_episode(DpEpisodeRecord {
                    episode: 0,
                    policy_stable: false,
                    max_delta: Some(evaluation.max_delta()),
                    values: self.values.clone(),
                    policy: self.policy.clone(),
                    first_record: evaluation.first_record,
                    record_count: evaluation.record_count,
                });
                info!(sweeps = evaluation.sweeps, converged = evaluation.converged, "policy evaluation finished");
                Ok(self.result(algorithm, evaluation.converged, evaluation.sweeps, 1, started))
            }
        }
    }

    /// Current value function
    #[must_use]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Current policy
    #[must_use]
    pub fn policy(&self) -> &Array2<f64> {
        &self.policy
    }

    /// `Q(s, a)` under the current values
    pub fn action_values(&self, state: StateId) -> Result<Array1<f64>> {
        self.check_state(state)?;
        Ok(action_values(&self.table, self.values.view(), state, self.config.gamma))
    }

    /// First arg-max of the current policy row
    pub fn greedy_action(&self, state: StateId) -> Result<Action> {
        self.check_state(state)?;
        Action::try_from(argmax_first(self.policy.row(state)))
    }

    /// Arrows of every action with non-zero probability, `T` for terminals
    #[must_use]
    pub fn policy_arrows(&self) -> Vec<String> {
        policy_arrows(&self.policy, &self.terminal)
    }

    /// State updates recorded by the last algorithm call
    #[must_use]
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Snapshots recorded by the last algorithm call
    #[must_use]
    pub fn episode_history(&self) -> &[DpEpisodeRecord] {
        &self.episode_history
    }

    /// Terminal flag per state
    #[must_use]
    pub fn terminal_mask(&self) -> &[bool] {
        &self.terminal
    }

    fn check_state(&self, state: StateId) -> Result<()> {
        if state < self.table.n_states() {
            Ok(())
        } else {
            Err(MdpError::InvalidState {
                state,
                n_states: self.table.n_states(),
            })
        }
    }

    fn non_terminal_states(&self) -> Vec<StateId> {
        (0..self.table.n_states()).filter(|&s| !self.terminal[s]).collect()
    }

    fn greedy_policy(&self) -> Array2<f64> {
        let mut policy = Array2::zeros(self.policy.raw_dim());
        for state in self.non_terminal_states() {
            let q = action_values(&self.table, self.values.view(), state, self.config.gamma);
            policy.row_mut(state).assign(&tie_split(q.view()));
        }
        policy
    }

    fn record(&mut self, record: IterationRecord) {
        if let Some(sink) = self.sink.as_mut() {
            sink.emit(ProgressEvent::Iteration(record));
        }
        self.history.push(record);
    }

    fn push_episode(&mut self, record: DpEpisodeRecord) {
        if let Some(sink) = self.sink.as_mut() {
            sink.emit(ProgressEvent::DpEpisode(record.clone()));
        }
        self.episode_history.push(record);
    }

    fn result(
        &self,
        algorithm: DpAlgorithm,
        converged: bool,
        total_iterations: usize,
        total_episodes: usize,
        started: Instant,
    ) -> DpResult {
        DpResult {
            algorithm,
            converged,
            total_iterations,
            total_updates: self.history.len(),
            total_episodes,
            final_values: self.values.clone(),
            final_policy: self.policy.clone(),
            history: self.history.clone(),
            episode_history: self.episode_history.clone(),
            execution_time: started.elapsed().as_secs_f64(),
        }
    }
}

fn initial_policy(kind: InitialPolicy, n_actions: usize, terminal: &[bool]) -> Array2<f64> {
    match kind {
        InitialPolicy::Uniform => uniform_policy(n_actions, terminal),
        InitialPolicy::FirstAction => first_action_policy(n_actions, terminal),
    }
}
