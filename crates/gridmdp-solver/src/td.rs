//! Temporal-difference control: SARSA and Q-learning

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use metrics::counter;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use gridmdp_core::policy::{one_hot_policy, policy_arrows, select_epsilon_greedy, tie_split};
use gridmdp_core::value::state_values;
use gridmdp_core::{
    argmax_first, build_rng, Action, Environment, EpsilonGreedy, MdpError, ProgressEvent, ProgressSink, Result,
    StateId, TdEpisodeRecord, Trajectory, TrajectoryStep,
};

use crate::config::TdConfig;

/// Temporal-difference control algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TdAlgorithm {
    /// On-policy TD control
    Sarsa,
    /// Off-policy TD control
    QLearning,
}

impl TdAlgorithm {
    /// Both algorithms, SARSA first
    pub const ALL: [TdAlgorithm; 2] = [TdAlgorithm::Sarsa, TdAlgorithm::QLearning];

    /// Canonical name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TdAlgorithm::Sarsa => "sarsa",
            TdAlgorithm::QLearning => "q_learning",
        }
    }
}

impl fmt::Display for TdAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for TdAlgorithm {
    type Err = MdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sarsa" => Ok(TdAlgorithm::Sarsa),
            "q_learning" | "qlearning" | "q-learning" => Ok(TdAlgorithm::QLearning),
            _ => Err(MdpError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Terminal snapshot of a TD run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdResult {
    /// Algorithm that produced the result
    pub algorithm: TdAlgorithm,
    /// Episodes run
    pub episodes: usize,
    /// Steps across all episodes
    pub total_steps: usize,
    /// Total reward per episode
    pub episode_rewards: Vec<f64>,
    /// Step count per episode
    pub episode_lengths: Vec<usize>,
    /// Fraction of episodes that ended in a terminal state
    pub success_rate: f64,
    /// Mean episode reward
    pub avg_reward: f64,
    /// Learned action values
    pub final_q: Array2<f64>,
    /// One-hot greedy policy
    pub final_policy: Array2<f64>,
    /// Exploration rate after the last decay
    pub final_epsilon: f64,
    /// Wall-clock seconds
    pub execution_time: f64,
}

/// Sample-based solver learning a Q-table from environment interaction
pub struct TdSolver<E: Environment> {
    env: E,
    config: TdConfig,
    q: Array2<f64>,
    explorer: EpsilonGreedy,
    rng: StdRng,
    records: Vec<TdEpisodeRecord>,
    sink: Option<Box<dyn ProgressSink>>,
}

impl<E: Environment + fmt::Debug> fmt::Debug for TdSolver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TdSolver")
            .field("env", &self.env)
            .field("config", &self.config)
            .field("epsilon", &self.explorer.epsilon)
            .field("episodes", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl<E: Environment> TdSolver<E> {
    /// Create a solver owning `env`.
    ///
    /// A configured seed also reseeds the environment so start states and
    /// stochastic transitions are reproducible.
    pub fn new(mut env: E, config: TdConfig) -> Result<Self> {
        config.validate()?;
        if let Some(seed) = config.seed {
            env.reseed(seed);
        }
        let q = Array2::zeros((env.n_states(), env.n_actions()));
        let explorer = EpsilonGreedy::new(config.epsilon, config.epsilon_decay, config.min_epsilon);
        Ok(Self {
            rng: build_rng(config.seed),
            env,
            config,
            q,
            explorer,
            records: Vec::new(),
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
    pub fn config(&self) -> &TdConfig {
        &self.config
    }

    /// Current exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.explorer.epsilon
    }

    /// With probability `epsilon` a uniform action, otherwise the first arg-max of `Q(state, ·)`
    pub fn epsilon_greedy_action(&mut self, state: StateId, epsilon: f64) -> Result<Action> {
        self.check_state(state)?;
        let index = select_epsilon_greedy(self.q.row(state), epsilon, &mut self.rng);
        Action::try_from(index)
    }

    /// On-policy control, bootstrapping on the next action actually chosen
    pub fn sarsa(&mut self, max_episodes: usize, max_steps: usize) -> Result<TdResult> {
        self.train(TdAlgorithm::Sarsa, max_episodes, max_steps)
    }

    /// Off-policy control, bootstrapping on the greedy value of the next state
    pub fn q_learning(&mut self, max_episodes: usize, max_steps: usize) -> Result<TdResult> {
        self.train(TdAlgorithm::QLearning, max_episodes, max_steps)
    }

    /// Dispatch to one algorithm
    pub fn run(&mut self, algorithm: TdAlgorithm, max_episodes: usize, max_steps: usize) -> Result<TdResult> {
        self.train(algorithm, max_episodes, max_steps)
    }

    fn train(&mut self, algorithm: TdAlgorithm, max_episodes: usize, max_steps: usize) -> Result<TdResult> {
        if max_episodes == 0 || max_steps == 0 {
            return Err(MdpError::InvalidConfig(
                "max_episodes and max_steps must be positive".to_string(),
            ));
        }
        let started = Instant::now();
        self.q.fill(0.0);
        self.records.clear();
        self.explorer.set_epsilon(self.config.epsilon);
        info!(
            algorithm = %algorithm,
            alpha = self.config.alpha,
            gamma = self.config.gamma,
            epsilon = self.config.epsilon,
            max_episodes,
            "starting TD training"
        );

        let mut total_steps = 0;
        for episode in 0..max_episodes {
            let record = self.run_episode(algorithm, episode, max_steps)?;
            total_steps += record.steps;
            if let Some(sink) = self.sink.as_mut() {
                sink.emit(ProgressEvent::TdEpisode(record.clone()));
            }
            self.records.push(record);
            self.explorer.decay();

            if (episode + 1) % 100 == 0 {
                let recent = &self.records[self.records.len() - 100..];
                let mean = recent.iter().map(|r| r.total_reward).mean();
                debug!(episode = episode + 1, recent_mean_reward = mean, epsilon = self.explorer.epsilon, "TD progress");
            }
        }
        counter!("gridmdp_td_episodes_total", max_episodes as u64, "algorithm" => algorithm.name());
        counter!("gridmdp_td_steps_total", total_steps as u64, "algorithm" => algorithm.name());

        let episode_rewards: Vec<f64> = self.records.iter().map(|r| r.total_reward).collect();
        let episode_lengths: Vec<usize> = self.records.iter().map(|r| r.steps).collect();
        let successes = self.records.iter().filter(|r| r.success).count();
        let success_rate = successes as f64 / max_episodes as f64;
        let avg_reward = episode_rewards.iter().mean();
        info!(algorithm = %algorithm, avg_reward, success_rate, total_steps, "TD training finished");

        Ok(TdResult {
            algorithm,
            episodes: max_episodes,
            total_steps,
            episode_rewards,
            episode_lengths,
            success_rate,
            avg_reward,
            final_q: self.q.clone(),
            final_policy: one_hot_policy(&self.q),
            final_epsilon: self.explorer.epsilon,
            execution_time: started.elapsed().as_secs_f64(),
        })
    }

    fn run_episode(&mut self, algorithm: TdAlgorithm, episode: usize, max_steps: usize) -> Result<TdEpisodeRecord> {
        let epsilon = self.explorer.epsilon;
        let (alpha, gamma) = (self.config.alpha, self.config.gamma);
        let start_state = self.env.reset(None)?;
        let mut trajectory = self.config.record_trajectory.then(Trajectory::new);
        let mut state = start_state;
        let mut action = self.explorer.select(&self.q, state, &mut self.rng);
        let mut total_reward = 0.0;
        let mut steps = 0;

        while steps < max_steps {
            let outcome = self.env.step(Action::try_from(action)?)?;
            steps += 1;
            total_reward += outcome.reward;
            let next = outcome.next_state;
            if let Some(t) = trajectory.as_mut() {
                t.push(TrajectoryStep {
                    state,
                    action: Action::try_from(action)?,
                    reward: outcome.reward,
                    next_state: next,
                    done: outcome.done,
                });
            }

            let (bootstrap, next_action) = match algorithm {
                TdAlgorithm::Sarsa => {
                    let a = self.explorer.select(&self.q, next, &mut self.rng);
                    (self.q[[next, a]], Some(a))
                }
                TdAlgorithm::QLearning => (self.q.row(next).iter().copied().fold(f64::NEG_INFINITY, f64::max), None),
            };
            let continuing = if outcome.done { 0.0 } else { 1.0 };
            let target = outcome.reward + gamma * bootstrap * continuing;
            let current = self.q[[state, action]];
            self.q[[state, action]] = current + alpha * (target - current);

            state = next;
            if outcome.done {
                break;
            }
            action = match next_action {
                Some(a) => a,
                None => self.explorer.select(&self.q, state, &mut self.rng),
            };
        }

        Ok(TdEpisodeRecord {
            episode,
            total_reward,
            steps,
            start_state,
            end_state: state,
            success: self.env.is_terminal(state),
            epsilon,
            trajectory,
        })
    }

    /// Learned action values
    #[must_use]
    pub fn q_values(&self) -> &Array2<f64> {
        &self.q
    }

    /// First arg-max of `Q(state, ·)`
    pub fn greedy_action(&self, state: StateId) -> Result<Action> {
        self.check_state(state)?;
        Action::try_from(argmax_first(self.q.row(state)))
    }

    /// `V(s) = max_a Q(s, a)`
    #[must_use]
    pub fn value_function(&self) -> Array1<f64> {
        state_values(&self.q)
    }

    /// Arrows of every action within tolerance of the row max, `T` for terminals
    #[must_use]
    pub fn policy_arrows(&self) -> Vec<String> {
        let terminal: Vec<bool> = (0..self.env.n_states()).map(|s| self.env.is_terminal(s)).collect();
        let mut policy = Array2::zeros(self.q.raw_dim());
        for (state, mut row) in policy.axis_iter_mut(Axis(0)).enumerate() {
            row.assign(&tie_split(self.q.row(state)));
        }
        policy_arrows(&policy, &terminal)
    }

    /// Follow the greedy policy from `start` without learning.
    ///
    /// Returns the visited states, stopping at a terminal state or after
    /// `max_steps` moves.
    pub fn greedy_path(&mut self, start: Option<StateId>, max_steps: usize) -> Result<Vec<StateId>> {
        let mut state = self.env.reset(start)?;
        let mut path = vec![state];
        for _ in 0..max_steps {
            let outcome = self.env.step(self.greedy_action(state)?)?;
            state = outcome.next_state;
            path.push(state);
            if outcome.done {
                break;
            }
        }
        Ok(path)
    }

    /// Per-episode records of the last run
    #[must_use]
    pub fn episode_records(&self) -> &[TdEpisodeRecord] {
        &self.records
    }

    /// Environment being trained on
    #[must_use]
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Give back the environment
    pub fn into_env(self) -> E {
        self.env
    }

    fn check_state(&self, state: StateId) -> Result<()> {
        if state < self.q.nrows() {
            Ok(())
        } else {
            Err(MdpError::InvalidState {
                state,
                n_states: self.q.nrows(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gridmdp_env::{CliffWalking, CliffWalkingConfig, PlainGrid, PlainGridConfig, WindyGrid, WindyGridConfig};

    fn seeded(seed: u64) -> TdConfig {
        TdConfig::default().with_seed(seed)
    }

    fn cliff() -> CliffWalking {
        CliffWalking::new(CliffWalkingConfig::default()).unwrap()
    }

    fn windy() -> WindyGrid {
        WindyGrid::new(WindyGridConfig::default()).unwrap()
    }

    #[test]
    fn zero_episodes_is_a_config_error() {
        let mut solver = TdSolver::new(cliff(), seeded(1)).unwrap();
        assert!(matches!(solver.sarsa(0, 100), Err(MdpError::InvalidConfig(_))));
    }

    #[test]
    fn greedy_selection_with_zero_epsilon() {
        let mut solver = TdSolver::new(cliff(), seeded(2)).unwrap();
        // untrained rows tie, first index wins
        assert_eq!(solver.epsilon_greedy_action(36, 0.0).unwrap(), Action::Up);
        assert_eq!(solver.greedy_action(36).unwrap(), Action::Up);
        assert!(solver.epsilon_greedy_action(48, 0.0).is_err());
    }

    #[test]
    fn q_learning_solves_cliff_walking() {
        let mut solver = TdSolver::new(cliff(), seeded(7)).unwrap();
        let result = solver.q_learning(300, 1000).unwrap();
        assert_eq!(result.episodes, 300);
        assert_eq!(result.episode_rewards.len(), 300);
        assert_eq!(result.total_steps, result.episode_lengths.iter().sum::<usize>());
        assert!(result.success_rate > 0.9);
        let path = solver.greedy_path(None, 100).unwrap();
        assert_eq!(path.first(), Some(&36));
        assert_eq!(path.last(), Some(&47));
        // optimal route is 13 moves
        assert!(path.len() <= 18);
    }

    #[test]
    fn sarsa_records_trajectories_and_events() {
        let config = TdConfig {
            record_trajectory: true,
            ..seeded(3)
        };
        let mut solver = TdSolver::new(windy(), config)
            .unwrap()
            .with_progress(Box::new(Vec::<ProgressEvent>::new()));
        let result = solver.sarsa(50, 500).unwrap();
        for (record, len) in solver.episode_records().iter().zip(&result.episode_lengths) {
            let trajectory = record.trajectory.as_ref().unwrap();
            assert_eq!(trajectory.len(), *len);
            assert_relative_eq!(trajectory.total_reward, record.total_reward);
        }
    }

    #[test]
    fn step_cap_truncates_episodes() {
        let mut solver = TdSolver::new(windy(), seeded(4)).unwrap();
        let result = solver.sarsa(5, 3).unwrap();
        assert!(result.episode_lengths.iter().all(|&n| n <= 3));
        assert!(solver.episode_records().iter().all(|r| !r.success));
        assert_relative_eq!(result.success_rate, 0.0);
    }

    #[test]
    fn epsilon_decays_per_episode() {
        let config = TdConfig {
            epsilon: 0.5,
            epsilon_decay: 0.5,
            min_epsilon: 0.1,
            ..seeded(5)
        };
        let env = PlainGrid::new(PlainGridConfig::default()).unwrap();
        let mut solver = TdSolver::new(env, config).unwrap();
        let result = solver.q_learning(4, 100).unwrap();
        let used: Vec<f64> = solver.episode_records().iter().map(|r| r.epsilon).collect();
        assert_relative_eq!(used[0], 0.5);
        assert_relative_eq!(used[1], 0.25);
        assert_relative_eq!(used[2], 0.125);
        assert_relative_eq!(used[3], 0.1);
        assert_relative_eq!(result.final_epsilon, 0.1);

        // a second run starts over
        solver.q_learning(1, 100).unwrap();
        assert_relative_eq!(solver.episode_records()[0].epsilon, 0.5);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = |seed| {
            let mut solver = TdSolver::new(cliff(), seeded(seed)).unwrap();
            solver.sarsa(20, 200).unwrap().episode_rewards
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn queries_follow_q_table() {
        let mut solver = TdSolver::new(cliff(), seeded(6)).unwrap();
        solver.q_learning(200, 500).unwrap();
        let v = solver.value_function();
        assert_eq!(v.len(), 48);
        assert_relative_eq!(v[47], 0.0);
        let arrows = solver.policy_arrows();
        assert_eq!(arrows[47], "T");
        assert!(!arrows[36].is_empty());
        assert_eq!(solver.env().n_states(), 48);
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("Q-Learning".parse::<TdAlgorithm>().unwrap(), TdAlgorithm::QLearning);
        assert_eq!(TdAlgorithm::Sarsa.to_string(), "sarsa");
        assert!("dqn".parse::<TdAlgorithm>().is_err());
    }
}
