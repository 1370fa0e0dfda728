//! Solver configuration

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use gridmdp_core::{MdpError, Result};

/// Starting policy for dynamic programming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPolicy {
    /// Equal probability on every action
    #[default]
    Uniform,
    /// All mass on action 0 (`up`)
    FirstAction,
}

/// Dynamic-programming configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpConfig {
    /// Discount factor
    pub gamma: f64,
    /// Convergence threshold on the per-sweep max delta
    pub theta: f64,
    /// Cap on sweeps (evaluation, value iteration) and rounds (policy iteration)
    pub max_iterations: usize,
    /// Gauss–Seidel updates when true, synchronous sweeps otherwise
    pub in_place: bool,
    /// Policy the solver starts from
    pub initial_policy: InitialPolicy,
    /// Record a value-iteration snapshot after every single state update
    pub snapshot_every_update: bool,
}

impl Default for DpConfig {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            theta: 1e-6,
            max_iterations: 1000,
            in_place: true,
            initial_policy: InitialPolicy::Uniform,
            snapshot_every_update: false,
        }
    }
}

impl DpConfig {
    /// Check the discount, threshold and iteration cap
    pub fn validate(&self) -> Result<()> {
        check_unit("gamma", self.gamma)?;
        if !(self.theta > 0.0 && self.theta.is_finite()) {
            return Err(MdpError::InvalidConfig(format!("theta must be positive, got {}", self.theta)));
        }
        if self.max_iterations == 0 {
            return Err(MdpError::InvalidConfig("max_iterations must be positive".to_string()));
        }
        Ok(())
    }
}

/// Temporal-difference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdConfig {
    /// Learning rate
    pub alpha: f64,
    /// Discount factor
    pub gamma: f64,
    /// Initial exploration rate
    pub epsilon: f64,
    /// Multiplicative exploration decay per episode
    pub epsilon_decay: f64,
    /// Exploration floor
    pub min_epsilon: f64,
    /// Seed for action selection and environment resets
    pub seed: Option<u64>,
    /// Keep every step of every episode
    pub record_trajectory: bool,
}

impl Default for TdConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            gamma: 1.0,
            epsilon: 0.1,
            epsilon_decay: 1.0,
            min_epsilon: 0.01,
            seed: None,
            record_trajectory: false,
        }
    }
}

impl TdConfig {
    /// Check that every rate lies in `[0, 1]` and alpha is positive
    pub fn validate(&self) -> Result<()> {
        check_unit("alpha", self.alpha)?;
        if self.alpha == 0.0 {
            return Err(MdpError::InvalidConfig("alpha must be positive".to_string()));
        }
        check_unit("gamma", self.gamma)?;
        check_unit("epsilon", self.epsilon)?;
        check_unit("epsilon_decay", self.epsilon_decay)?;
        check_unit("min_epsilon", self.min_epsilon)?;
        Ok(())
    }

    /// Same configuration with a different seed
    #[must_use]
    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self.clone()
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MdpError::InvalidConfig(format!("{name} must be in [0, 1], got {value}")))
    }
}

/// Defaults shared by every run, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Default grid size for the plain grid
    pub default_grid_size: usize,
    /// Smallest accepted plain grid
    pub min_grid_size: usize,
    /// Largest accepted plain grid
    pub max_grid_size: usize,
    /// Dynamic-programming defaults
    pub dp: DpConfig,
    /// Temporal-difference defaults
    pub td: TdConfig,
    /// Episodes per TD run
    pub max_episodes: usize,
    /// Step cap per TD episode
    pub max_steps_per_episode: usize,
    /// Repetitions per algorithm in comparisons
    pub num_runs: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            default_grid_size: 4,
            min_grid_size: 3,
            max_grid_size: 20,
            dp: DpConfig::default(),
            td: TdConfig::default(),
            max_episodes: 500,
            max_steps_per_episode: 1000,
            num_runs: 10,
        }
    }
}

impl SolverSettings {
    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded solver settings");
        Ok(settings)
    }

    /// Accepted plain grid sizes
    #[must_use]
    pub fn grid_size_range(&self) -> RangeInclusive<usize> {
        self.min_grid_size..=self.max_grid_size
    }

    /// Reject grid sizes outside the configured bounds
    pub fn check_grid_size(&self, grid_size: usize) -> Result<()> {
        if self.grid_size_range().contains(&grid_size) {
            Ok(())
        } else {
            Err(MdpError::InvalidConfig(format!(
                "grid_size must be in {}..={}, got {grid_size}",
                self.min_grid_size, self.max_grid_size
            )))
        }
    }

    /// Validate every nested configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_grid_size < 2 || self.min_grid_size > self.max_grid_size {
            return Err(MdpError::InvalidConfig(format!(
                "invalid grid size bounds {}..={}",
                self.min_grid_size, self.max_grid_size
            )));
        }
        self.check_grid_size(self.default_grid_size)?;
        if self.max_episodes == 0 || self.max_steps_per_episode == 0 || self.num_runs == 0 {
            return Err(MdpError::InvalidConfig(
                "max_episodes, max_steps_per_episode and num_runs must be positive".to_string(),
            ));
        }
        self.dp.validate()?;
        self.td.validate()
    }
}
