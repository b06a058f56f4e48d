//! Batch engine: wave dispatch, the per-task pipeline, the worker pool,
//! and the orchestrator that ties them to the store.
//!
//! A run is a sequence of waves. Each wave claims up to
//! `workers * batch_size` eligible tasks, drains them through the pool,
//! and records one outcome per task. The run ends when a claim comes back
//! empty, the wave limit is hit, or shutdown is requested.

pub mod dispatch;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::gate::DEFAULT_MIN_QUALITY;

pub use dispatch::{Dequeue, Dispatcher, WorkQueue};
pub use orchestrator::{Orchestrator, RunSummary};
pub use pipeline::{Collaborators, Pipeline, TaskReport};
pub use pool::{WaveReport, WorkerPool};

/// Tuning for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: usize,
    pub batch_size: usize,
    /// Claim failed tasks that still have attempts left instead of pending ones.
    pub retry_failed: bool,
    /// Stop after this many waves even if work remains.
    pub max_waves: Option<usize>,
    /// Pause each worker takes after finishing a task.
    pub throttle: Duration,
    /// How long a worker waits on the queue before checking again.
    pub dequeue_timeout: Duration,
    /// Inputs longer than this (in chars) fail without generation.
    pub max_input_chars: usize,
    pub min_quality: f64,
    /// Write a row to `runs` for each engine run.
    pub record_runs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 10,
            retry_failed: false,
            max_waves: None,
            throttle: Duration::from_millis(500),
            dequeue_timeout: Duration::from_secs(1),
            max_input_chars: 50_000,
            min_quality: DEFAULT_MIN_QUALITY,
            record_runs: true,
        }
    }
}

impl EngineConfig {
    /// Tasks claimed per wave.
    pub fn wave_capacity(&self) -> usize {
        self.workers.max(1) * self.batch_size.max(1)
    }
}

/// Cooperative stop signal shared by the orchestrator and its workers.
///
/// Triggering stops new dequeues; tasks already in a pipeline finish and
/// are recorded.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
