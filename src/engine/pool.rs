//! Fixed-size worker pool that drains one wave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::dispatch::{Dequeue, WorkQueue};
use super::pipeline::{Pipeline, TaskReport};
use super::{EngineConfig, Shutdown};
use crate::model::TaskId;

/// Counts for one wave (or, merged, for a whole run).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks whose outcome the store rejected.
    pub unrecorded: Vec<TaskId>,
    quality_sum: f64,
    quality_count: usize,
}

impl WaveReport {
    pub fn record(&mut self, report: &TaskReport) {
        self.attempted += 1;
        match report {
            TaskReport::Recorded { outcome, .. } => {
                if outcome.is_success() {
                    self.succeeded += 1;
                } else {
                    self.failed += 1;
                }
                if let Some(score) = outcome.quality_score {
                    self.quality_sum += score;
                    self.quality_count += 1;
                }
            }
            TaskReport::Unrecorded { id, .. } => self.unrecorded.push(*id),
        }
    }

    pub fn merge(&mut self, other: WaveReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.unrecorded.extend(other.unrecorded);
        self.quality_sum += other.quality_sum;
        self.quality_count += other.quality_count;
    }

    /// Mean score over outcomes that carried one.
    pub fn avg_quality(&self) -> Option<f64> {
        (self.quality_count > 0).then(|| self.quality_sum / self.quality_count as f64)
    }
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    throttle: Duration,
    dequeue_timeout: Duration,
}

pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    workers: usize,
    pacing: Pacing,
    shutdown: Shutdown,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, config: &EngineConfig, shutdown: Shutdown) -> Self {
        Self {
            pipeline,
            workers: config.workers.max(1),
            pacing: Pacing {
                throttle: config.throttle,
                dequeue_timeout: config.dequeue_timeout,
            },
            shutdown,
        }
    }

    /// Run workers until `queue` is drained or shutdown is requested.
    ///
    /// Returns after every worker has stopped, so no task from this wave
    /// is still in flight.
    pub async fn drain(&self, queue: WorkQueue) -> WaveReport {
        let mut set = JoinSet::new();
        for worker in 0..self.workers {
            set.spawn(worker_loop(
                worker,
                queue.clone(),
                Arc::clone(&self.pipeline),
                self.pacing,
                self.shutdown.subscribe(),
            ));
        }

        let mut report = WaveReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            unrecorded = report.unrecorded.len(),
            "wave drained"
        );
        report
    }
}

async fn worker_loop(
    worker: usize,
    queue: WorkQueue,
    pipeline: Arc<Pipeline>,
    pacing: Pacing,
    mut shutdown: watch::Receiver<bool>,
) -> WaveReport {
    let mut report = WaveReport::default();
    loop {
        if *shutdown.borrow() {
            debug!(worker, "shutdown requested, worker stopping");
            break;
        }

        let task = match queue.next(pacing.dequeue_timeout).await {
            Dequeue::Task(task) => task,
            Dequeue::Drained => break,
            Dequeue::TimedOut => continue,
        };

        let task_report = pipeline.execute(&task, worker).await;
        report.record(&task_report);

        if !pacing.throttle.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(pacing.throttle) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
    debug!(worker, attempted = report.attempted, "worker finished");
    report
}
