//! Run loop: dispatch waves until the store has nothing eligible left.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::dispatch::Dispatcher;
use super::pipeline::{Collaborators, Pipeline};
use super::pool::{WaveReport, WorkerPool};
use super::{EngineConfig, Shutdown};
use crate::db::Db;
use crate::db::run::RunTotals;
use crate::error::Result;
use crate::gate::QualityGate;
use crate::model::Statistics;

/// Totals for one orchestrator run plus the store state at its end.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Present when the run was recorded in the `runs` table.
    pub run_id: Option<Uuid>,
    pub waves: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks whose outcome could not be recorded.
    pub unrecorded: usize,
    pub avg_quality: Option<f64>,
    /// Shutdown was requested before the store ran dry.
    pub interrupted: bool,
    pub store: Statistics,
}

pub struct Orchestrator {
    db: Arc<Db>,
    dispatcher: Dispatcher,
    pool: WorkerPool,
    shutdown: Shutdown,
    record_runs: bool,
}

impl Orchestrator {
    pub fn new(
        db: Arc<Db>,
        collaborators: Collaborators,
        gate: QualityGate,
        config: EngineConfig,
    ) -> Self {
        info!(
            generator = collaborators.generator.name(),
            workers = config.workers,
            batch_size = config.batch_size,
            retry_failed = config.retry_failed,
            "engine configured"
        );
        let shutdown = Shutdown::new();
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&db), collaborators, gate, &config));
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&db), &config),
            pool: WorkerPool::new(pipeline, &config, shutdown.clone()),
            db,
            shutdown,
            record_runs: config.record_runs,
        }
    }

    /// Handle for requesting a graceful stop from outside the run.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Process waves until no eligible task remains, the wave limit is
    /// reached, or shutdown is requested.
    ///
    /// # Errors
    ///
    /// Fails only when the store cannot serve a claim or the final
    /// statistics. Per-task failures are recorded, not returned.
    pub async fn run(mut self) -> Result<RunSummary> {
        let run_id = if self.record_runs {
            match self.db.start_run().await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "could not open run record");
                    None
                }
            }
        } else {
            None
        };

        info!(run_id = ?run_id, "run started");
        let mut totals = WaveReport::default();
        let waves = self.run_waves(&mut totals).await;

        if let Some(run_id) = run_id {
            let record = RunTotals {
                attempted: totals.attempted as u64,
                succeeded: totals.succeeded as u64,
                failed: totals.failed as u64,
                avg_quality: totals.avg_quality(),
            };
            if let Err(e) = self.db.finish_run(run_id, record).await {
                warn!(%run_id, error = %e, "could not close run record");
            }
        }

        let interrupted = waves?;
        let store = self.db.statistics().await?;
        let summary = RunSummary {
            run_id,
            waves: self.dispatcher.waves(),
            attempted: totals.attempted,
            succeeded: totals.succeeded,
            failed: totals.failed,
            unrecorded: totals.unrecorded.len(),
            avg_quality: totals.avg_quality(),
            interrupted,
            store,
        };
        info!(
            waves = summary.waves,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            interrupted,
            "run finished"
        );
        Ok(summary)
    }

    /// Returns whether the loop stopped because of shutdown.
    async fn run_waves(&mut self, totals: &mut WaveReport) -> Result<bool> {
        loop {
            if self.shutdown.is_triggered() {
                info!("shutdown requested, no further waves");
                return Ok(true);
            }

            let Some(queue) = self.dispatcher.refill().await? else {
                return Ok(false);
            };

            let report = self.pool.drain(queue).await;
            for id in &report.unrecorded {
                self.dispatcher.skip(*id);
            }
            totals.merge(report);
        }
    }
}
