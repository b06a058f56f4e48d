//! Per-task pipeline: extract, bound, generate, judge, persist, record.
//!
//! Every claimed task ends with exactly one recorded outcome unless the
//! store itself fails, in which case the task is reported as unrecorded.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};

use crate::db::Db;
use crate::files::{NoteSink, TextSource};
use crate::gate::QualityGate;
use crate::llm::{Generation, GenerationRequest, Generator};
use crate::model::{Task, TaskId, TaskOutcome, TaskStatus};
use crate::telemetry::{metrics, task as task_span};

use super::EngineConfig;

/// The pluggable pieces a pipeline runs through.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn TextSource>,
    pub generator: Arc<dyn Generator>,
    pub sink: Arc<dyn NoteSink>,
}

/// What happened to one task.
#[derive(Debug, Clone)]
pub enum TaskReport {
    /// The outcome is in the store; `task` is the row after the write.
    Recorded { task: Task, outcome: TaskOutcome },
    /// The store rejected the write. The task keeps its previous state.
    Unrecorded { id: TaskId, error: String },
}

pub struct Pipeline {
    db: Arc<Db>,
    collaborators: Collaborators,
    gate: QualityGate,
    max_input_chars: usize,
    min_quality: f64,
}

impl Pipeline {
    pub fn new(
        db: Arc<Db>,
        collaborators: Collaborators,
        gate: QualityGate,
        config: &EngineConfig,
    ) -> Self {
        Self {
            db,
            collaborators,
            gate,
            max_input_chars: config.max_input_chars,
            min_quality: config.min_quality,
        }
    }

    /// Run `task` through every stage and record the single outcome.
    ///
    /// The stages run on their own tokio task, so a collaborator that
    /// panics fails this task instead of taking the worker down with it.
    pub async fn execute(self: &Arc<Self>, task: &Task, worker: usize) -> TaskReport {
        let span = task_span::start_task_span(task, worker);
        let started = Instant::now();

        let stages = {
            let pipeline = Arc::clone(self);
            let task = task.clone();
            async move { pipeline.attempt(&task).await }
        };
        let outcome = match tokio::spawn(stages.instrument(span.clone())).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = match e.try_into_panic() {
                    Ok(payload) => format!("pipeline panicked: {}", panic_message(&*payload)),
                    Err(e) => format!("pipeline aborted: {e}"),
                };
                span.in_scope(|| error!(reason = %reason, "task stages did not finish"));
                TaskOutcome::failed(reason)
            }
        };

        metrics::pipeline_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("status", outcome.status.as_str())],
        );

        match self.db.record_outcome(task.id, &outcome).await {
            Ok(updated) => {
                task_span::record_outcome(&span, task.status, outcome.status);
                span.in_scope(|| match outcome.status {
                    TaskStatus::Completed => info!(
                        attempts = updated.attempts,
                        score = outcome.quality_score,
                        "task completed"
                    ),
                    _ => warn!(
                        attempts = updated.attempts,
                        error = outcome.error_message.as_deref().unwrap_or_default(),
                        "task failed"
                    ),
                });
                TaskReport::Recorded {
                    task: updated,
                    outcome,
                }
            }
            Err(e) => {
                span.in_scope(|| error!(error = %e, "outcome could not be recorded"));
                TaskReport::Unrecorded {
                    id: task.id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Produce the outcome for one attempt. Never touches the store.
    async fn attempt(&self, task: &Task) -> TaskOutcome {
        let transcript = match self.collaborators.source.extract(&task.source_key).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(source = %task.source_key, "transcript is empty");
                return TaskOutcome::failed("read failure");
            }
            Err(e) => {
                warn!(source = %task.source_key, error = %e, "transcript unreadable");
                return TaskOutcome::failed("read failure");
            }
        };

        let chars = transcript.chars().count();
        if chars > self.max_input_chars {
            return TaskOutcome::failed(format!(
                "input too large ({chars} chars, max {})",
                self.max_input_chars
            ));
        }

        let request = GenerationRequest {
            transcript,
            item_label: task.item_label.clone(),
            group_label: task.group_label.clone(),
        };
        let generated = match self.collaborators.generator.generate(&request).await {
            Generation::Success(generated) if !generated.text.trim().is_empty() => generated,
            Generation::Success(_) => {
                return TaskOutcome::failed("generation failed: empty output");
            }
            Generation::Transient(reason) | Generation::Fatal(reason) => {
                return TaskOutcome::failed(format!("generation failed: {reason}"));
            }
        };

        let report = self.gate.evaluate(&generated.text, &task.item_label);
        metrics::quality_scores().record(report.score, &[]);
        if !report.passes(self.min_quality) {
            return TaskOutcome::failed(format!("quality issues: {}", report.issues.join(", ")))
                .with_quality(report.score);
        }

        if let Err(e) = self
            .collaborators
            .sink
            .write(&task.source_key, &generated.text)
            .await
        {
            return TaskOutcome::failed(format!("write failure: {e}")).with_quality(report.score);
        }

        let usage = generated.usage.unwrap_or((chars / 4) as u64);
        TaskOutcome::completed(report.score, i64::try_from(usage).unwrap_or(i64::MAX))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}
