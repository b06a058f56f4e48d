//! Core data model.
//!
//! A task is one transcript waiting to become notes. It has identity
//! (a store-assigned id plus the unique source key), descriptive labels,
//! a size hint that orders processing, and a small lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work tracked by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier. Ascending ids follow insertion order.
    pub id: TaskId,

    /// Unique business key, usually the transcript path.
    pub source_key: String,

    /// Grouping label (e.g. the course directory).
    pub group_label: String,

    /// Item label (e.g. the lecture name).
    pub item_label: String,

    /// Orders processing, smallest first.
    pub size_hint: i64,

    pub status: TaskStatus,

    /// Number of recorded processing attempts.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Reason for the last failure, if the last attempt failed.
    pub error_message: Option<String>,

    /// Gate score of the last attempt that reached the gate.
    pub quality_score: Option<f64>,

    /// Estimated resource units spent by the last attempt.
    pub resource_usage: Option<i64>,
}

impl Task {
    /// Failed with attempts left under the given ceiling.
    pub fn is_retryable(&self, max_attempts: u32) -> bool {
        self.status == TaskStatus::Failed && self.attempts < max_attempts
    }

    /// Failed and out of attempts. Never offered again.
    pub fn is_terminally_failed(&self, max_attempts: u32) -> bool {
        self.status == TaskStatus::Failed && self.attempts >= max_attempts
    }
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Discovered, never attempted.
    Pending,
    /// Notes written and accepted. Terminal.
    Completed,
    /// Last attempt failed. Retryable until the attempt ceiling.
    Failed,
}

impl TaskStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Completed) | (Pending, Failed) | (Failed, Completed) | (Failed, Failed) // retry failed again
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(Error::Other(format!("unknown task status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one pipeline execution, recorded with `Db::record_outcome`.
///
/// All three detail fields overwrite the stored values, so a `None`
/// clears whatever the previous attempt left behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub quality_score: Option<f64>,
    pub resource_usage: Option<i64>,
}

impl TaskOutcome {
    pub fn completed(quality_score: f64, resource_usage: i64) -> Self {
        Self {
            status: TaskStatus::Completed,
            error_message: None,
            quality_score: Some(quality_score),
            resource_usage: Some(resource_usage),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            error_message: Some(error.into()),
            quality_score: None,
            resource_usage: None,
        }
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Store-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    /// Failed with attempts left.
    pub retryable: u64,
    /// Failed at the attempt ceiling.
    pub terminally_failed: u64,
    /// Mean of recorded quality scores; 0.0 when none exist.
    pub avg_quality: f64,
}

impl Statistics {
    /// Percentage of `part` in `total`, 0.0 for an empty store.
    pub fn percent(&self, part: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            part as f64 / self.total as f64 * 100.0
        }
    }
}

/// Filters for `Db::list_tasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub group_label: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for new tasks. Discovery's way of handing work to the store.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub(crate) source_key: String,
    pub(crate) group_label: String,
    pub(crate) item_label: String,
    pub(crate) size_hint: i64,
}

impl NewTask {
    pub fn new(
        source_key: impl Into<String>,
        group_label: impl Into<String>,
        item_label: impl Into<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            group_label: group_label.into(),
            item_label: item_label.into(),
            size_hint: 0,
        }
    }

    pub fn size_hint(mut self, size_hint: i64) -> Self {
        self.size_hint = size_hint;
        self
    }
}
