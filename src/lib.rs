//! # synthq
//!
//! Durable batch synthesis of lecture transcripts into study notes.
//!
//! A SQLite task store tracks every transcript through
//! `pending -> completed | failed`, with a bounded number of attempts.
//! The engine claims work in waves, runs each task through extraction,
//! LLM generation (rig-core), a deterministic quality gate, and note
//! output, and records exactly one outcome per attempt. Telemetry goes
//! through `tracing` with optional OpenTelemetry export.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod files;
pub mod gate;
pub mod llm;
pub mod model;
pub mod telemetry;
