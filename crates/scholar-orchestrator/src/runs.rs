//! Registry of the runs started by this process.
//!
//! Each run task owns its state and publishes snapshots over a `watch`
//! channel; the registry only keeps the receiving ends. Runs are not
//! persisted and disappear when the process exits. Once more runs are held
//! than the retention limit, the oldest finished ones are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::pipeline_state::{PipelineState, RunSummary};

/// Runs kept by a registry created with [`RunRegistry::new`].
pub const DEFAULT_RETAINED_RUNS: usize = 20;

/// Shared, cloneable map from run id to the run's latest state.
#[derive(Debug, Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<String, watch::Receiver<PipelineState>>>>,
    counter: Arc<AtomicU64>,
    max_retained: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }
}

impl RunRegistry {
    /// Creates an empty registry with the default retention limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that keeps at most `max_retained` runs,
    /// not counting runs that are still in progress.
    #[must_use]
    pub fn with_retention(max_retained: usize) -> Self {
        Self {
            runs: Arc::default(),
            counter: Arc::default(),
            max_retained: max_retained.max(1),
        }
    }

    /// Returns a fresh, unique run identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use scholar_orchestrator::RunRegistry;
    ///
    /// let runs = RunRegistry::new();
    /// assert_ne!(runs.next_run_id(), runs.next_run_id());
    /// ```
    #[must_use]
    pub fn next_run_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("run-{}-{n}", Utc::now().format("%Y%m%d%H%M%S"))
    }

    /// Registers a run's state channel.
    ///
    /// When the registry is over its limit, finished runs are dropped
    /// oldest first. Runs in progress are always kept, so the registry can
    /// exceed the limit while many runs are active.
    pub async fn insert(&self, run_id: impl Into<String>, receiver: watch::Receiver<PipelineState>) {
        let mut runs = self.runs.write().await;
        runs.insert(run_id.into(), receiver);

        while runs.len() > self.max_retained {
            let oldest = runs
                .iter()
                .filter_map(|(id, receiver)| {
                    let state = receiver.borrow();
                    state.is_terminal().then(|| (state.started_at, id.clone()))
                })
                .min();
            let Some((_, evicted)) = oldest else {
                break;
            };
            runs.remove(&evicted);
            debug!(run_id = %evicted, "Dropped finished run from registry");
        }
    }

    /// Returns the latest state of a run.
    pub async fn get(&self, run_id: &str) -> Option<PipelineState> {
        let runs = self.runs.read().await;
        runs.get(run_id).map(|receiver| receiver.borrow().clone())
    }

    /// Returns a receiver that observes every future update of a run.
    pub async fn subscribe(&self, run_id: &str) -> Option<watch::Receiver<PipelineState>> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// Summaries of every run, oldest first.
    pub async fn summaries(&self) -> Vec<RunSummary> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<RunSummary> =
            runs.values().map(|receiver| receiver.borrow().summary()).collect();
        summaries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        summaries
    }

    /// Number of runs that have not finished.
    pub async fn active_count(&self) -> usize {
        let runs = self.runs.read().await;
        runs.values()
            .filter(|receiver| !receiver.borrow().is_terminal())
            .count()
    }

    /// Number of registered runs.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Returns `true` if no run has been registered.
    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}
