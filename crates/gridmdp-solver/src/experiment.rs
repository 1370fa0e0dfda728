//! Repeated TD runs across seeds and algorithms

use std::collections::HashSet;
use std::time::Instant;

use indexmap::IndexMap;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use gridmdp_core::{Environment, MdpError, Result};
use gridmdp_env::{CliffWalking, CliffWalkingConfig, WindyGrid, WindyGridConfig};

use crate::config::TdConfig;
use crate::td::{TdAlgorithm, TdResult, TdSolver};
use crate::utils::{mean_std, moving_average};

/// Aggregate of every run of one algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSummary {
    /// Per-run results in seed order
    pub runs: Vec<TdResult>,
    /// Mean of the per-run average rewards
    pub avg_reward: f64,
    /// Population standard deviation of the per-run average rewards
    pub std_reward: f64,
    /// Mean of the per-run success rates
    pub avg_success_rate: f64,
    /// Episode-wise mean reward across runs
    pub avg_episode_rewards: Vec<f64>,
    /// Episode-wise mean length across runs
    pub avg_episode_lengths: Vec<f64>,
}

/// Best algorithm per criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winners {
    /// Highest average reward
    pub avg_reward: TdAlgorithm,
    /// Highest success rate
    pub success_rate: TdAlgorithm,
    /// Lowest reward standard deviation
    pub stability: TdAlgorithm,
}

/// Outcome of [`ExperimentRunner::compare`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Environment label
    pub environment: String,
    /// Episodes per run
    pub max_episodes: usize,
    /// Runs per algorithm
    pub num_runs: usize,
    /// Summaries in the order the algorithms were given
    pub summaries: IndexMap<TdAlgorithm, AlgorithmSummary>,
    /// Best algorithm per criterion
    pub winners: Winners,
    /// Wall-clock seconds for the whole comparison
    pub total_time: f64,
}

/// Raw and smoothed reward curve of one algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCurve {
    /// Episode-wise mean reward
    pub raw: Vec<f64>,
    /// Moving average of `raw`
    pub smoothed: Vec<f64>,
    /// Episode index of each raw point
    pub episodes: Vec<usize>,
    /// Episode index at the end of each smoothing window
    pub smoothed_episodes: Vec<usize>,
}

/// Runs TD algorithms repeatedly on fresh copies of one environment
#[derive(Debug, Clone)]
pub struct ExperimentRunner<E: Environment + Clone> {
    env: E,
    env_name: String,
    config: TdConfig,
    max_steps: usize,
    base_seed: u64,
}

impl<E: Environment + Clone> ExperimentRunner<E> {
    /// Create a runner. Run `i` uses seed `base_seed + i`, wrapping at `u64::MAX`.
    pub fn new(env: E, env_name: impl Into<String>, config: TdConfig, max_steps: usize, base_seed: u64) -> Result<Self> {
        config.validate()?;
        if max_steps == 0 {
            return Err(MdpError::InvalidConfig("max_steps must be positive".to_string()));
        }
        Ok(Self {
            env,
            env_name: env_name.into(),
            config,
            max_steps,
            base_seed,
        })
    }

    /// Environment label
    #[must_use]
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// Shared TD configuration
    #[must_use]
    pub fn config(&self) -> &TdConfig {
        &self.config
    }

    /// One run of `algorithm` on a fresh environment copy
    pub fn run_single(&self, algorithm: TdAlgorithm, max_episodes: usize, seed: u64) -> Result<TdResult> {
        let mut solver = TdSolver::new(self.env.clone(), self.config.with_seed(seed))?;
        solver.run(algorithm, max_episodes, self.max_steps)
    }

    /// Run every algorithm `num_runs` times and summarize.
    ///
    /// Ties between algorithms go to the one listed first.
    pub fn compare(&self, algorithms: &[TdAlgorithm], max_episodes: usize, num_runs: usize) -> Result<ComparisonResult> {
        if algorithms.is_empty() {
            return Err(MdpError::InvalidConfig("no algorithms to compare".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = algorithms.iter().find(|a| !seen.insert(**a)) {
            return Err(MdpError::InvalidConfig(format!("algorithm {dup} listed twice")));
        }
        if num_runs == 0 {
            return Err(MdpError::InvalidConfig("num_runs must be positive".to_string()));
        }

        let started = Instant::now();
        info!(env = %self.env_name, ?algorithms, max_episodes, num_runs, "starting comparison");
        let mut summaries = IndexMap::with_capacity(algorithms.len());
        for &algorithm in algorithms {
            let runs = (0..num_runs)
                .map(|run| self.run_single(algorithm, max_episodes, self.base_seed.wrapping_add(run as u64)))
                .collect::<Result<Vec<_>>>()?;
            let summary = summarize(runs, max_episodes);
            info!(
                env = %self.env_name,
                algorithm = %algorithm,
                avg_reward = summary.avg_reward,
                std_reward = summary.std_reward,
                success_rate = summary.avg_success_rate,
                "algorithm summary"
            );
            summaries.insert(algorithm, summary);
        }

        let winners = Winners {
            avg_reward: pick(&summaries, |s| s.avg_reward),
            success_rate: pick(&summaries, |s| s.avg_success_rate),
            stability: pick(&summaries, |s| -s.std_reward),
        };
        let total_time = started.elapsed().as_secs_f64();
        info!(env = %self.env_name, ?winners, total_time, "comparison finished");
        Ok(ComparisonResult {
            environment: self.env_name.clone(),
            max_episodes,
            num_runs,
            summaries,
            winners,
            total_time,
        })
    }

    /// Episode-wise mean reward per algorithm and its moving average over `window`
    pub fn learning_curves(
        &self,
        algorithms: &[TdAlgorithm],
        max_episodes: usize,
        num_runs: usize,
        window: usize,
    ) -> Result<IndexMap<TdAlgorithm, LearningCurve>> {
        let comparison = self.compare(algorithms, max_episodes, num_runs)?;
        Ok(comparison
            .summaries
            .into_iter()
            .map(|(algorithm, summary)| (algorithm, learning_curve(summary.avg_episode_rewards, window)))
            .collect())
    }
}

/// Build a curve from raw per-episode values
#[must_use]
pub fn learning_curve(raw: Vec<f64>, window: usize) -> LearningCurve {
    let smoothed = moving_average(&raw, window);
    let smoothed_episodes = (0..smoothed.len()).map(|i| i + window - 1).collect();
    LearningCurve {
        episodes: (0..raw.len()).collect(),
        smoothed,
        smoothed_episodes,
        raw,
    }
}

fn summarize(runs: Vec<TdResult>, max_episodes: usize) -> AlgorithmSummary {
    let rewards: Vec<f64> = runs.iter().map(|r| r.avg_reward).collect();
    let success: Vec<f64> = runs.iter().map(|r| r.success_rate).collect();
    let (avg_reward, std_reward) = mean_std(&rewards);
    let (avg_success_rate, _) = mean_std(&success);

    let mut episode_rewards = Array2::zeros((runs.len(), max_episodes));
    let mut episode_lengths = Array2::zeros((runs.len(), max_episodes));
    for (i, run) in runs.iter().enumerate() {
        for (j, (&reward, &len)) in run.episode_rewards.iter().zip(&run.episode_lengths).enumerate() {
            episode_rewards[[i, j]] = reward;
            episode_lengths[[i, j]] = len as f64;
        }
    }
    let column_means = |m: Array2<f64>| m.mean_axis(Axis(0)).map(|a| a.to_vec()).unwrap_or_default();

    AlgorithmSummary {
        avg_episode_rewards: column_means(episode_rewards),
        avg_episode_lengths: column_means(episode_lengths),
        runs,
        avg_reward,
        std_reward,
        avg_success_rate,
    }
}

fn pick<F>(summaries: &IndexMap<TdAlgorithm, AlgorithmSummary>, score: F) -> TdAlgorithm
where
    F: Fn(&AlgorithmSummary) -> f64,
{
    let mut best: Option<(TdAlgorithm, f64)> = None;
    for (algorithm, summary) in summaries {
        let value = score(summary);
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((*algorithm, value));
        }
    }
    best.map_or(TdAlgorithm::Sarsa, |(a, _)| a)
}

/// SARSA vs Q-learning on the default cliff walk, α = 0.5, γ = 1, ε = 0.1
pub fn cliff_walking_comparison(max_episodes: usize, num_runs: usize, base_seed: u64) -> Result<ComparisonResult> {
    let env = CliffWalking::new(CliffWalkingConfig::default())?;
    ExperimentRunner::new(env, "cliff", preset_config(), 1000, base_seed)?.compare(
        &TdAlgorithm::ALL,
        max_episodes,
        num_runs,
    )
}

/// SARSA vs Q-learning on the default windy grid, α = 0.5, γ = 1, ε = 0.1
pub fn windy_grid_comparison(max_episodes: usize, num_runs: usize, base_seed: u64) -> Result<ComparisonResult> {
    let env = WindyGrid::new(WindyGridConfig::default())?;
    ExperimentRunner::new(env, "windy", preset_config(), 1000, base_seed)?.compare(
        &TdAlgorithm::ALL,
        max_episodes,
        num_runs,
    )
}

fn preset_config() -> TdConfig {
    TdConfig {
        alpha: 0.5,
        gamma: 1.0,
        epsilon: 0.1,
        ..TdConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn runner() -> ExperimentRunner<CliffWalking> {
        let env = CliffWalking::new(CliffWalkingConfig::default()).unwrap();
        ExperimentRunner::new(env, "cliff", preset_config(), 500, 42).unwrap()
    }

    #[test]
    fn compare_summarizes_each_algorithm() {
        let result = runner().compare(&TdAlgorithm::ALL, 30, 3).unwrap();
        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.summaries.keys().copied().collect::<Vec<_>>(), TdAlgorithm::ALL.to_vec());
        for summary in result.summaries.values() {
            assert_eq!(summary.runs.len(), 3);
            assert_eq!(summary.avg_episode_rewards.len(), 30);
            assert_eq!(summary.avg_episode_lengths.len(), 30);
            let manual = summary.runs.iter().map(|r| r.avg_reward).sum::<f64>() / 3.0;
            assert_relative_eq!(summary.avg_reward, manual, epsilon = 1e-9);
            assert!(summary.std_reward >= 0.0);
        }
    }

    #[test]
    fn runs_use_consecutive_seeds() {
        let runner = runner();
        let result = runner.compare(&[TdAlgorithm::Sarsa], 10, 2).unwrap();
        let second = runner.run_single(TdAlgorithm::Sarsa, 10, 43).unwrap();
        assert_eq!(result.summaries[&TdAlgorithm::Sarsa].runs[1].episode_rewards, second.episode_rewards);
    }

    #[test]
    fn seeds_wrap_past_u64_max() {
        let env = CliffWalking::new(CliffWalkingConfig::default()).unwrap();
        let runner = ExperimentRunner::new(env, "cliff", preset_config(), 200, u64::MAX).unwrap();
        let result = runner.compare(&[TdAlgorithm::QLearning], 5, 2).unwrap();
        let wrapped = runner.run_single(TdAlgorithm::QLearning, 5, 0).unwrap();
        assert_eq!(
            result.summaries[&TdAlgorithm::QLearning].runs[1].episode_rewards,
            wrapped.episode_rewards
        );
    }

    #[test]
    fn invalid_comparisons_are_rejected() {
        let runner = runner();
        assert!(runner.compare(&[], 10, 1).is_err());
        assert!(runner.compare(&[TdAlgorithm::Sarsa, TdAlgorithm::Sarsa], 10, 1).is_err());
        assert!(runner.compare(&TdAlgorithm::ALL, 10, 0).is_err());
    }

    #[test]
    fn ties_go_to_first_listed() {
        let summary = |avg_reward, std_reward| AlgorithmSummary {
            runs: Vec::new(),
            avg_reward,
            std_reward,
            avg_success_rate: 1.0,
            avg_episode_rewards: Vec::new(),
            avg_episode_lengths: Vec::new(),
        };
        let mut summaries = IndexMap::new();
        summaries.insert(TdAlgorithm::QLearning, summary(-20.0, 1.0));
        summaries.insert(TdAlgorithm::Sarsa, summary(-20.0, 0.5));
        assert_eq!(pick(&summaries, |s| s.avg_reward), TdAlgorithm::QLearning);
        assert_eq!(pick(&summaries, |s| s.avg_success_rate), TdAlgorithm::QLearning);
        assert_eq!(pick(&summaries, |s| -s.std_reward), TdAlgorithm::Sarsa);
    }

    #[test]
    fn curves_align_with_episodes() {
        let curve = learning_curve(vec![-10.0, -8.0, -6.0, -4.0], 2);
        assert_eq!(curve.episodes, vec![0, 1, 2, 3]);
        assert_eq!(curve.smoothed, vec![-9.0, -7.0, -5.0]);
        assert_eq!(curve.smoothed_episodes, vec![1, 2, 3]);

        let curves = runner().learning_curves(&TdAlgorithm::ALL, 20, 2, 5).unwrap();
        assert_eq!(curves[&TdAlgorithm::QLearning].smoothed.len(), 16);
        assert!(learning_curve(vec![1.0], 3).smoothed_episodes.is_empty());
    }
}
