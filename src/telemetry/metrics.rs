//! Metric instrument factories for synthq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`;
//! without one, every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for synthq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("synthq")
}

/// Counter: tasks offered by discovery.
/// Labels: `result` ("ok" | "duplicate").
pub fn tasks_inserted() -> Counter<u64> {
    meter()
        .u64_counter("synthq.tasks.inserted")
        .with_description("Number of discovered tasks offered to the store")
        .build()
}

/// Counter: recorded task outcomes.
/// Labels: `status` ("completed" | "failed").
pub fn task_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("synthq.tasks.outcomes")
        .with_description("Number of recorded task outcomes")
        .build()
}

/// Histogram: quality gate scores.
pub fn quality_scores() -> Histogram<f64> {
    meter()
        .f64_histogram("synthq.gate.score")
        .with_description("Quality gate scores of generated notes")
        .build()
}

/// Counter: calls into the generation provider.
/// Labels: `result` ("success" | "transient" | "fatal").
pub fn generation_attempts() -> Counter<u64> {
    meter()
        .u64_counter("synthq.generation.attempts")
        .with_description("Number of generation calls")
        .build()
}

/// Histogram: pipeline duration in milliseconds.
/// Labels: `status`.
pub fn pipeline_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("synthq.pipeline.duration_ms")
        .with_description("Per-task pipeline duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: estimated LLM token usage.
/// Labels: `model`.
pub fn llm_tokens() -> Counter<u64> {
    meter()
        .u64_counter("synthq.llm.tokens")
        .with_description("Estimated LLM token usage")
        .build()
}
