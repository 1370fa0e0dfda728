//! JSON documents for solver results

use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gridmdp_core::policy::policy_arrows;
use gridmdp_core::{EnvDescriptor, IterationRecord, MdpError, Result};

use crate::config::{DpConfig, TdConfig};
use crate::dp::{DpAlgorithm, DpResult};
use crate::td::{TdAlgorithm, TdResult};
use crate::utils::round_to;

/// Version written into every document
pub const FORMAT_VERSION: &str = "1.0";

/// Decimal places kept for values, policies and Q-tables
pub const PRECISION: i32 = 6;

/// Pretty JSON serialization with file helpers
pub trait JsonDocument: Serialize + DeserializeOwned {
    /// Serialize as pretty-printed JSON
    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document
    fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write the document to `path`
    fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        tracing::debug!(path = %path.as_ref().display(), "exported document");
        Ok(())
    }

    /// Read a document from `path`
    fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Who produced a document and with what settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata<A, P> {
    /// Environment the solver ran on
    pub environment: EnvDescriptor,
    /// Algorithm name
    pub algorithm: A,
    /// Solver configuration
    pub parameters: P,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Document format version
    pub format_version: String,
}

impl<A, P> ExportMetadata<A, P> {
    fn now(environment: EnvDescriptor, algorithm: A, parameters: P) -> Self {
        Self {
            environment,
            algorithm,
            parameters,
            created_at: Utc::now(),
            format_version: FORMAT_VERSION.to_string(),
        }
    }
}

/// Scalar outcome of a DP run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpSummary {
    /// Whether the run converged
    pub converged: bool,
    /// Sweeps performed
    pub total_iterations: usize,
    /// Single-state updates performed
    pub total_updates: usize,
    /// Rounds or sweeps
    pub total_episodes: usize,
    /// Wall-clock seconds
    pub execution_time: f64,
}

/// Exported dynamic-programming result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpExport {
    /// Provenance
    pub metadata: ExportMetadata<DpAlgorithm, DpConfig>,
    /// Scalar outcome
    pub summary: DpSummary,
    /// Final values, rounded
    pub values: Vec<f64>,
    /// Final policy rows, rounded
    pub policy: Vec<Vec<f64>>,
    /// Policy arrows per state
    pub arrows: Vec<String>,
    /// Every state update
    pub iterations: Vec<IterationRecord>,
}

impl JsonDocument for DpExport {}

impl DpExport {
    /// Package `result` with its provenance
    #[must_use]
    pub fn new(environment: EnvDescriptor, config: &DpConfig, result: &DpResult) -> Self {
        let terminal: Vec<bool> = (0..environment.n_states)
            .map(|s| environment.terminal_states.contains(&s))
            .collect();
        Self {
            arrows: policy_arrows(&result.final_policy, &terminal),
            metadata: ExportMetadata::now(environment, result.algorithm, config.clone()),
            summary: DpSummary {
                converged: result.converged,
                total_iterations: result.total_iterations,
                total_updates: result.total_updates,
                total_episodes: result.total_episodes,
                execution_time: result.execution_time,
            },
            values: round_vec(result.final_values.iter()),
            policy: round_rows(&result.final_policy),
            iterations: result.history.clone(),
        }
    }

    /// Values as an array
    #[must_use]
    pub fn values_array(&self) -> Array1<f64> {
        Array1::from_vec(self.values.clone())
    }

    /// Policy as an `n_states × n_actions` array
    pub fn policy_array(&self) -> Result<Array2<f64>> {
        rows_to_array(&self.policy)
    }
}

/// Scalar outcome of a TD run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdSummary {
    /// Episodes run
    pub episodes: usize,
    /// Steps across all episodes
    pub total_steps: usize,
    /// Fraction of successful episodes
    pub success_rate: f64,
    /// Mean episode reward
    pub avg_reward: f64,
    /// Exploration rate at the end
    pub final_epsilon: f64,
    /// Wall-clock seconds
    pub execution_time: f64,
}

/// Exported temporal-difference result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdExport {
    /// Provenance
    pub metadata: ExportMetadata<TdAlgorithm, TdConfig>,
    /// Scalar outcome
    pub summary: TdSummary,
    /// Final Q-table rows, rounded
    pub q_values: Vec<Vec<f64>>,
    /// Greedy policy rows
    pub policy: Vec<Vec<f64>>,
    /// Reward per episode
    pub episode_rewards: Vec<f64>,
    /// Length per episode
    pub episode_lengths: Vec<usize>,
}

impl JsonDocument for TdExport {}

impl TdExport {
    /// Package `result` with its provenance
    #[must_use]
    pub fn new(environment: EnvDescriptor, config: &TdConfig, result: &TdResult) -> Self {
        Self {
            metadata: ExportMetadata::now(environment, result.algorithm, config.clone()),
            summary: TdSummary {
                episodes: result.episodes,
                total_steps: result.total_steps,
                success_rate: result.success_rate,
                avg_reward: result.avg_reward,
                final_epsilon: result.final_epsilon,
                execution_time: result.execution_time,
            },
            q_values: round_rows(&result.final_q),
            policy: round_rows(&result.final_policy),
            episode_rewards: result.episode_rewards.clone(),
            episode_lengths: result.episode_lengths.clone(),
        }
    }

    /// Q-table as an `n_states × n_actions` array
    pub fn q_array(&self) -> Result<Array2<f64>> {
        rows_to_array(&self.q_values)
    }
}

fn round_vec<'a>(values: impl Iterator<Item = &'a f64>) -> Vec<f64> {
    values.map(|v| round_to(*v, PRECISION)).collect()
}

fn round_rows(array: &Array2<f64>) -> Vec<Vec<f64>> {
    array.rows().into_iter().map(|row| round_vec(row.iter())).collect()
}

fn rows_to_array(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(MdpError::DimensionMismatch {
            expected: width,
            actual: bad.len(),
        });
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| MdpError::DimensionMismatch {
        expected: rows.len() * width,
        actual: rows.iter().map(Vec::len).sum(),
    })
}
