//! Per-run aggregate records. Auxiliary: nothing in the engine depends on
//! them for correctness.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};

/// One orchestrator run as stored in the `runs` table.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_quality: Option<f64>,
}

/// Final counters written when a run ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_quality: Option<f64>,
}

impl super::Db {
    /// Open a run record and return its id.
    pub async fn start_run(&self) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        sqlx::query("INSERT INTO runs (run_id, started_at) VALUES (?1, ?2)")
            .bind(run_id.to_string())
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(run_id)
    }

    /// Close a run record with its totals.
    pub async fn finish_run(&self, run_id: Uuid, totals: RunTotals) -> Result<()> {
        let rows = sqlx::query(
            "UPDATE runs SET finished_at = ?1, attempted = ?2, succeeded = ?3, failed = ?4, avg_quality = ?5
             WHERE run_id = ?6",
        )
        .bind(Utc::now())
        .bind(totals.attempted as i64)
        .bind(totals.succeeded as i64)
        .bind(totals.failed as i64)
        .bind(totals.avg_quality)
        .bind(run_id.to_string())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(Error::NotFound(format!("run {run_id}")));
        }
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT run_id, started_at, finished_at, attempted, succeeded, failed, avg_quality
             FROM runs ORDER BY started_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(RunRow::try_into_record).collect()
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    attempted: i64,
    succeeded: i64,
    failed: i64,
    avg_quality: Option<f64>,
}

impl RunRow {
    fn try_into_record(self) -> Result<RunRecord> {
        Ok(RunRecord {
            run_id: Uuid::parse_str(&self.run_id)
                .map_err(|e| Error::Other(format!("bad run id {}: {e}", self.run_id)))?,
            started_at: self.started_at,
            finished_at: self.finished_at,
            attempted: self.attempted as u64,
            succeeded: self.succeeded as u64,
            failed: self.failed as u64,
            avg_quality: self.avg_quality,
        })
    }
}
