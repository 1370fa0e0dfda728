//! In-memory registry of experiments run on the blocking thread pool
//!
//! Each experiment is created from an [`ExperimentSpec`], started with
//! [`ExperimentStore::spawn`] and moves through
//! `Pending → Running → Completed | Failed`. Progress events stream through an
//! unbounded channel while the solver runs.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gridmdp_core::{MdpError, ProgressEvent, ProgressSink, Result};
use gridmdp_env::{EnvConfig, GridWorld};

use crate::config::{DpConfig, TdConfig};
use crate::dp::{DpAlgorithm, DpResult, DpSolver};
use crate::td::{TdAlgorithm, TdResult, TdSolver};

/// What to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ExperimentSpec {
    /// A dynamic-programming run
    Dp {
        /// Environment to build
        env: EnvConfig,
        /// Solver configuration
        config: DpConfig,
        /// Entry point
        algorithm: DpAlgorithm,
    },
    /// A temporal-difference run
    Td {
        /// Environment to build
        env: EnvConfig,
        /// Solver configuration
        config: TdConfig,
        /// Entry point
        algorithm: TdAlgorithm,
        /// Episodes to train
        max_episodes: usize,
        /// Step cap per episode
        max_steps: usize,
    },
}

impl ExperimentSpec {
    /// Validate the environment and solver configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ExperimentSpec::Dp { env, config, .. } => {
                env.validate()?;
                config.validate()
            }
            ExperimentSpec::Td {
                env,
                config,
                max_episodes,
                max_steps,
                ..
            } => {
                env.validate()?;
                config.validate()?;
                if *max_episodes == 0 || *max_steps == 0 {
                    return Err(MdpError::InvalidConfig(
                        "max_episodes and max_steps must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    fn label(&self) -> String {
        match self {
            ExperimentSpec::Dp { env, algorithm, .. } => format!("{algorithm} on {}", env.kind()),
            ExperimentSpec::Td { env, algorithm, .. } => format!("{algorithm} on {}", env.kind()),
        }
    }

    fn execute(&self, sink: Box<dyn ProgressSink>) -> Result<ExperimentOutcome> {
        match self {
            ExperimentSpec::Dp { env, config, algorithm } => {
                let world = GridWorld::from_config(env.clone())?;
                let mut solver = DpSolver::new(&world, config.clone())?.with_progress(sink);
                solver.run(*algorithm).map(ExperimentOutcome::Dp)
            }
            ExperimentSpec::Td {
                env,
                config,
                algorithm,
                max_episodes,
                max_steps,
            } => {
                let world = GridWorld::from_config(env.clone())?;
                let mut solver = TdSolver::new(world, config.clone())?.with_progress(sink);
                solver
                    .run(*algorithm, *max_episodes, *max_steps)
                    .map(ExperimentOutcome::Td)
            }
        }
    }
}

/// Lifecycle of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Created, not started
    Pending,
    /// Solver running
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

/// Result of a finished experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ExperimentOutcome {
    /// Dynamic-programming result
    Dp(DpResult),
    /// Temporal-difference result
    Td(TdResult),
}

/// Stored state of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEntry {
    /// Identifier
    pub id: Uuid,
    /// What runs
    pub spec: ExperimentSpec,
    /// Current status
    pub status: ExperimentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the solver started
    pub started_at: Option<DateTime<Utc>>,
    /// When the solver finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Result once completed
    pub outcome: Option<ExperimentOutcome>,
    /// Error message once failed
    pub error: Option<String>,
}

/// Concurrent experiment registry, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct ExperimentStore {
    entries: Arc<DashMap<Uuid, ExperimentEntry>>,
}

impl ExperimentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending experiment
    pub fn create(&self, spec: ExperimentSpec) -> Result<Uuid> {
        spec.validate()?;
        let id = Uuid::new_v4();
        debug!(%id, experiment = %spec.label(), "experiment created");
        self.entries.insert(
            id,
            ExperimentEntry {
                id,
                spec,
                status: ExperimentStatus::Pending,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
                outcome: None,
                error: None,
            },
        );
        Ok(id)
    }

    /// Snapshot of one experiment
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<ExperimentEntry> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    /// Snapshots of every experiment, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<ExperimentEntry> {
        let mut entries: Vec<ExperimentEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Remove an experiment. A running solver finishes but its result is dropped.
    pub fn delete(&self, id: Uuid) -> Result<ExperimentEntry> {
        self.entries
            .remove(&id)
            .map(|(_, entry)| entry)
            .ok_or(MdpError::ExperimentNotFound(id))
    }

    /// Current status
    pub fn status(&self, id: Uuid) -> Result<ExperimentStatus> {
        self.entries
            .get(&id)
            .map(|e| e.status)
            .ok_or(MdpError::ExperimentNotFound(id))
    }

    /// Number of stored experiments
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a pending experiment on the blocking pool.
    ///
    /// Must be called from within a Tokio runtime. Returns the task handle and
    /// the receiving end of the progress channel.
    pub fn spawn(
        &self,
        id: Uuid,
    ) -> Result<(JoinHandle<Result<ExperimentOutcome>>, UnboundedReceiver<ProgressEvent>)> {
        self.launch(id, ExperimentSpec::execute)
    }

    fn launch<F>(
        &self,
        id: Uuid,
        job: F,
    ) -> Result<(JoinHandle<Result<ExperimentOutcome>>, UnboundedReceiver<ProgressEvent>)>
    where
        F: FnOnce(&ExperimentSpec, Box<dyn ProgressSink>) -> Result<ExperimentOutcome> + Send + 'static,
    {
        let handle = Handle::try_current()
            .map_err(|e| MdpError::ExperimentFailed(format!("no tokio runtime: {e}")))?;
        let spec = {
            let mut entry = self.entries.get_mut(&id).ok_or(MdpError::ExperimentNotFound(id))?;
            if entry.status != ExperimentStatus::Pending {
                return Err(MdpError::ExperimentFailed(format!(
                    "experiment {id} is {:?}, not pending",
                    entry.status
                )));
            }
            entry.status = ExperimentStatus::Running;
            entry.started_at = Some(Utc::now());
            entry.spec.clone()
        };

        let (tx, rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let store = self.clone();
        info!(%id, experiment = %spec.label(), "experiment started");
        let task = handle.spawn_blocking(move || {
            // a panicking solver must not leave the entry Running
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&spec, Box::new(tx))))
                .unwrap_or_else(|payload| Err(MdpError::ExperimentFailed(panic_message(payload.as_ref()))));
            store.finish(id, &outcome);
            outcome
        });
        Ok((task, rx))
    }

    /// Start an experiment and wait for it, discarding progress events
    pub async fn run(&self, id: Uuid) -> Result<ExperimentOutcome> {
        let (task, _progress) = self.spawn(id)?;
        task.await
            .map_err(|e| MdpError::ExperimentFailed(format!("experiment task panicked: {e}")))?
    }

    fn finish(&self, id: Uuid, outcome: &Result<ExperimentOutcome>) {
        let Some(mut entry) = self.entries.get_mut(&id) else {
            debug!(%id, "experiment deleted while running");
            return;
        };
        entry.finished_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                entry.status = ExperimentStatus::Completed;
                entry.outcome = Some(result.clone());
                counter!("gridmdp_experiments_total", 1, "status" => "completed");
                info!(%id, "experiment completed");
            }
            Err(e) => {
                entry.status = ExperimentStatus::Failed;
                entry.error = Some(e.to_string());
                counter!("gridmdp_experiments_total", 1, "status" => "failed");
                warn!(%id, error = %e, "experiment failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("solver panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmdp_env::{EnvKind, PlainGridConfig};

    fn dp_spec() -> ExperimentSpec {
        ExperimentSpec::Dp {
            env: EnvConfig::default_for(EnvKind::Grid),
            config: DpConfig::default(),
            algorithm: DpAlgorithm::ValueIteration,
        }
    }

    fn td_spec(max_episodes: usize) -> ExperimentSpec {
        ExperimentSpec::Td {
            env: EnvConfig::default_for(EnvKind::Cliff),
            config: TdConfig::default().with_seed(1),
            algorithm: TdAlgorithm::QLearning,
            max_episodes,
            max_steps: 500,
        }
    }

    #[test]
    fn crud_without_runtime() {
        let store = ExperimentStore::new();
        let a = store.create(dp_spec()).unwrap();
        let b = store.create(td_spec(5)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.status(a).unwrap(), ExperimentStatus::Pending);
        let ids: Vec<Uuid> = store.list().iter().map(|e| e.id).collect();
        assert!(ids.contains(&a) && ids.contains(&b));
        assert_eq!(store.delete(b).unwrap().id, b);
        assert!(matches!(store.status(b), Err(MdpError::ExperimentNotFound(_))));
        assert!(store.get(b).is_none());
        // no runtime: refused without touching the entry
        assert!(matches!(store.spawn(a), Err(MdpError::ExperimentFailed(_))));
        assert_eq!(store.status(a).unwrap(), ExperimentStatus::Pending);
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let store = ExperimentStore::new();
        let bad_env = ExperimentSpec::Dp {
            env: EnvConfig::Grid(PlainGridConfig {
                grid_size: 1,
                ..Default::default()
            }),
            config: DpConfig::default(),
            algorithm: DpAlgorithm::PolicyIteration,
        };
        assert!(store.create(bad_env).is_err());
        assert!(store.create(td_spec(0)).is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn dp_experiment_completes() {
        let store = ExperimentStore::new();
        let id = store.create(dp_spec()).unwrap();
        let outcome = store.run(id).await.unwrap();
        let ExperimentOutcome::Dp(result) = outcome else {
            panic!("expected a DP outcome");
        };
        assert!(result.converged);
        let entry = store.get(id).unwrap();
        assert_eq!(entry.status, ExperimentStatus::Completed);
        assert!(entry.started_at.is_some() && entry.finished_at.is_some());
        assert!(matches!(entry.outcome, Some(ExperimentOutcome::Dp(_))));
    }

    #[tokio::test]
    async fn td_experiment_streams_progress() {
        let store = ExperimentStore::new();
        let id = store.create(td_spec(25)).unwrap();
        let (task, mut rx) = store.spawn(id).unwrap();
        let mut episodes = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, ProgressEvent::TdEpisode(_)) {
                episodes += 1;
            }
        }
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(episodes, 25);
        assert!(matches!(outcome, ExperimentOutcome::Td(ref r) if r.episodes == 25));
        assert_eq!(store.status(id).unwrap(), ExperimentStatus::Completed);

        // a finished experiment cannot be restarted
        assert!(matches!(store.spawn(id), Err(MdpError::ExperimentFailed(_))));
    }

    #[tokio::test]
    async fn panicking_solver_marks_experiment_failed() {
        let store = ExperimentStore::new();
        let id = store.create(dp_spec()).unwrap();
        let (task, _rx) = store.launch(id, |_, _| panic!("diverged")).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, MdpError::ExperimentFailed(ref m) if m.contains("diverged")));
        let entry = store.get(id).unwrap();
        assert_eq!(entry.status, ExperimentStatus::Failed);
        assert!(entry.finished_at.is_some());
        assert!(entry.error.as_deref().is_some_and(|e| e.contains("diverged")));
        assert!(entry.outcome.is_none());
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let store = ExperimentStore::new();
        assert!(matches!(
            store.run(Uuid::new_v4()).await,
            Err(MdpError::ExperimentNotFound(_))
        ));
    }
}
