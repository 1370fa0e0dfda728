//! Progress events emitted while solvers run

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::{DpEpisodeRecord, IterationRecord, TdEpisodeRecord};

/// Something a solver reports while it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A single DP state update
    Iteration(IterationRecord),
    /// A DP round or sweep snapshot
    DpEpisode(DpEpisodeRecord),
    /// A finished TD episode
    TdEpisode(TdEpisodeRecord),
}

/// Receiver of [`ProgressEvent`]s, invoked synchronously from the solver loop
pub trait ProgressSink: Send {
    /// Handle one event
    fn emit(&mut self, event: ProgressEvent);
}

/// Adapts a closure into a [`ProgressSink`]
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: FnMut(ProgressEvent) + Send,
{
    fn emit(&mut self, event: ProgressEvent) {
        (self.0)(event);
    }
}

/// Wrap a closure as a boxed sink
pub fn sink_fn<F>(f: F) -> Box<dyn ProgressSink>
where
    F: FnMut(ProgressEvent) + Send + 'static,
{
    Box::new(FnSink(f))
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        // Receiver gone: the run continues without observers
        if self.send(event).is_err() {
            tracing::trace!("progress receiver dropped");
        }
    }
}

impl ProgressSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}
