//! Task execution span helpers.

use tracing::Span;

use crate::model::{Task, TaskStatus};

/// Start a span for one pipeline execution.
///
/// `task.outcome` is declared empty and filled by [`record_outcome`].
pub fn start_task_span(task: &Task, worker: usize) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.id" = %task.id,
        "task.item" = %task.item_label,
        "task.group" = %task.group_label,
        "task.attempt" = task.attempts + 1,
        "worker" = worker,
        "task.outcome" = tracing::field::Empty,
    )
}

/// Record the final status on the span and emit a transition event.
pub fn record_outcome(span: &Span, from: TaskStatus, to: TaskStatus) {
    span.record("task.outcome", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
}
