//! Task operations: idempotent insert, advisory claims, outcome recording.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;

const TASK_COLUMNS: &str = "id, source_key, group_label, item_label, size_hint, status, attempts, \
     created_at, completed_at, error_message, quality_score, resource_usage";

impl super::Db {
    /// Insert a discovered task. Returns `false` when the source key is
    /// already known; that is the normal re-discovery path, not an error.
    pub async fn insert_task(&self, new: NewTask) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO tasks (source_key, group_label, item_label, size_hint, status, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)
             ON CONFLICT (source_key) DO NOTHING",
        )
        .bind(&new.source_key)
        .bind(&new.group_label)
        .bind(&new.item_label)
        .bind(new.size_hint)
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .rows_affected()
            > 0;

        metrics::tasks_inserted().add(
            1,
            &[KeyValue::new(
                "result",
                if inserted { "ok" } else { "duplicate" },
            )],
        );
        if !inserted {
            tracing::debug!(source_key = %new.source_key, "task already known");
        }

        Ok(inserted)
    }

    /// Snapshot of up to `limit` eligible tasks, smallest `size_hint` first,
    /// ties in insertion order.
    ///
    /// Normal mode takes pending tasks; with `include_failed` only failed
    /// tasks are taken. Both stay below the attempt ceiling. Nothing is marked: running
    /// two orchestrators against one store can double-process a task.
    pub async fn claim_batch(&self, limit: usize, include_failed: bool) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE attempts < ?1 AND status = CASE WHEN ?2 THEN 'failed' ELSE 'pending' END
             ORDER BY size_hint ASC, id ASC
             LIMIT ?3"
        ))
        .bind(i64::from(self.max_attempts()))
        .bind(include_failed)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    /// Record the outcome of one pipeline execution.
    ///
    /// A single UPDATE bumps `attempts`, sets the status, stamps
    /// `completed_at` only for completions, and overwrites the error,
    /// score and usage columns. Completed tasks are never touched again.
    pub async fn record_outcome(&self, id: TaskId, outcome: &TaskOutcome) -> Result<Task> {
        if outcome.status == TaskStatus::Pending {
            let current = self.get_task(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: outcome.status,
            });
        }

        // Pending and Failed are the only states that may move to
        // Completed or Failed.
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "UPDATE tasks SET
                status = ?1,
                attempts = attempts + 1,
                completed_at = CASE WHEN ?1 = 'completed' THEN ?2 ELSE completed_at END,
                error_message = ?3,
                quality_score = ?4,
                resource_usage = ?5
             WHERE id = ?6 AND status IN ('pending', 'failed')
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(outcome.status.as_str())
        .bind(Utc::now())
        .bind(&outcome.error_message)
        .bind(outcome.quality_score)
        .bind(outcome.resource_usage)
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            let current = self.get_task(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: outcome.status,
            });
        };

        metrics::task_outcomes().add(1, &[KeyValue::new("status", outcome.status.as_str())]);

        row.try_into_task()
    }

    /// Get a task by ID.
    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .try_into_task()
    }

    /// Store-wide counts.
    pub async fn statistics(&self) -> Result<Statistics> {
        let (total, completed, pending, retryable, terminally_failed, avg_quality): (
            i64,
            i64,
            i64,
            i64,
            i64,
            Option<f64>,
        ) = sqlx::query_as(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' AND attempts < ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' AND attempts >= ?1 THEN 1 ELSE 0 END), 0),
                AVG(quality_score)
             FROM tasks",
        )
        .bind(i64::from(self.max_attempts()))
        .fetch_one(self.pool())
        .await?;

        Ok(Statistics {
            total: total as u64,
            completed: completed as u64,
            pending: pending as u64,
            retryable: retryable as u64,
            terminally_failed: terminally_failed as u64,
            avg_quality: avg_quality.unwrap_or(0.0),
        })
    }

    /// Failed tasks that hit the attempt ceiling, for operator inspection.
    pub async fn list_terminally_failed(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'failed' AND attempts >= ?1
             ORDER BY item_label ASC, id ASC"
        ))
        .bind(i64::from(self.max_attempts()))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    /// List tasks, optionally filtered by status and group.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(ref group) = filter.group_label {
            qb.push(" AND group_label = ").push_bind(group.clone());
        }
        qb.push(" ORDER BY id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows: Vec<TaskRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        rows.into_iter().map(TaskRow::try_into_task).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    source_key: String,
    group_label: String,
    item_label: String,
    size_hint: i64,
    status: String,
    attempts: i64,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    quality_score: Option<f64>,
    resource_usage: Option<i64>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            source_key: self.source_key,
            group_label: self.group_label,
            item_label: self.item_label,
            size_hint: self.size_hint,
            status: self.status.parse()?,
            attempts: self.attempts as u32,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
            quality_score: self.quality_score,
            resource_usage: self.resource_usage,
        })
    }
}
