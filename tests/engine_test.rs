//! Integration tests for the batch engine, driven by fake collaborators.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use synthq::db::Db;
use synthq::engine::{Collaborators, EngineConfig, Orchestrator, RunSummary, Shutdown};
use synthq::error::{Error, Result};
use synthq::files::{NoteSink, TextSource};
use synthq::gate::QualityGate;
use synthq::llm::{Generated, Generation, GenerationRequest, Generator};
use synthq::model::*;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Transcripts keyed by source key; unknown keys fail to read.
struct MapSource(HashMap<String, String>);

#[async_trait]
impl TextSource for MapSource {
    async fn extract(&self, source_key: &str) -> Result<String> {
        self.0
            .get(source_key)
            .cloned()
            .ok_or_else(|| Error::NotFound(source_key.to_string()))
    }
}

/// Returns scripted results in order, then repeats the fallback.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Generation>>,
    fallback: Generation,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn always(result: Generation) -> Self {
        Self::scripted(vec![], result)
    }

    fn scripted(script: Vec<Generation>, fallback: Generation) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Generation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
struct MemorySink {
    written: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MemorySink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn keys(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl NoteSink for MemorySink {
    async fn write(&self, source_key: &str, content: &str) -> Result<PathBuf> {
        if self.fail {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only folder",
            )));
        }
        self.written
            .lock()
            .unwrap()
            .push((source_key.to_string(), content.to_string()));
        Ok(PathBuf::from(format!("{source_key}.md")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TRANSCRIPT: &str = "today we talk about retry budgets and why they matter in services";

fn good_notes() -> String {
    let mut s = String::from(
        "## Retry Budgets\n\nIn production this is where **most** outages start.\n\n\
         - keep retries bounded\n- log every give-up\n\n",
    );
    while s.chars().count() < 2000 {
        s.push_str("Timeouts compound across layers, so budget them end to end. ");
    }
    s
}

fn success() -> Generation {
    Generation::Success(Generated::text(good_notes()))
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        throttle: Duration::ZERO,
        dequeue_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

struct Harness {
    db: Arc<Db>,
    sources: HashMap<String, String>,
}

impl Harness {
    async fn new() -> Self {
        Self {
            db: Arc::new(Db::in_memory().await.unwrap()),
            sources: HashMap::new(),
        }
    }

    /// Insert a task with a readable transcript.
    async fn task(&mut self, key: &str, size_hint: i64) -> TaskId {
        self.sources.insert(key.to_string(), TRANSCRIPT.to_string());
        self.unreadable(key, size_hint).await
    }

    /// Insert a task whose transcript cannot be read.
    async fn unreadable(&mut self, key: &str, size_hint: i64) -> TaskId {
        self.db
            .insert_task(NewTask::new(key, "Course", "Lecture").size_hint(size_hint))
            .await
            .unwrap();
        self.db
            .list_tasks(&TaskFilter::default())
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.source_key == key)
            .unwrap()
            .id
    }

    fn orchestrator(
        &self,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn NoteSink>,
        config: EngineConfig,
    ) -> Orchestrator {
        let collaborators = Collaborators {
            source: Arc::new(MapSource(self.sources.clone())),
            generator,
            sink,
        };
        Orchestrator::new(
            Arc::clone(&self.db),
            collaborators,
            QualityGate::default(),
            config,
        )
    }

    async fn run(
        &self,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn NoteSink>,
        config: EngineConfig,
    ) -> RunSummary {
        self.orchestrator(generator, sink, config).run().await.unwrap()
    }

    async fn get(&self, id: TaskId) -> Task {
        self.db.get_task(id).await.unwrap()
    }
}

// ---------------------------------------------------------------------------
// Pipeline outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn good_notes_complete_the_task() {
    let mut h = Harness::new().await;
    let id = h.task("/c/05.srt", 5).await;
    let sink = Arc::new(MemorySink::default());

    let summary = h
        .run(Arc::new(ScriptedGenerator::always(success())), sink.clone(), fast_config())
        .await;

    assert_eq!(summary.waves, 1);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(!summary.interrupted);
    assert_eq!(summary.store.completed, 1);

    let task = h.get(id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 1);
    assert_eq!(task.quality_score, Some(1.0));
    // No provider usage reported: chars / 4.
    assert_eq!(task.resource_usage, Some((TRANSCRIPT.len() / 4) as i64));
    assert_eq!(sink.keys(), vec!["/c/05.srt".to_string()]);
}

#[tokio::test]
async fn reported_usage_wins_over_the_estimate() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;
    let generated = Generated {
        text: good_notes(),
        usage: Some(1234),
    };

    h.run(
        Arc::new(ScriptedGenerator::always(Generation::Success(generated))),
        Arc::new(MemorySink::default()),
        fast_config(),
    )
    .await;

    assert_eq!(h.get(id).await.resource_usage, Some(1234));
}

#[tokio::test]
async fn meta_commentary_fails_the_task_without_writing() {
    let mut h = Harness::new().await;
    let id = h.task("/c/05.srt", 5).await;
    let sink = Arc::new(MemorySink::default());
    let notes = format!("{}\nAs an AI, I cannot attend lectures.", good_notes());

    let summary = h
        .run(
            Arc::new(ScriptedGenerator::always(Generation::Success(Generated::text(notes)))),
            sink.clone(),
            fast_config(),
        )
        .await;

    assert_eq!(summary.failed, 1);
    let task = h.get(id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 1);
    assert_eq!(task.quality_score, Some(0.0));
    let error = task.error_message.unwrap();
    assert!(error.starts_with("quality issues: "), "{error}");
    assert!(error.contains("critical: meta-commentary detected"), "{error}");
    assert!(sink.keys().is_empty());
}

#[tokio::test]
async fn unreadable_input_fails_before_generation() {
    let mut h = Harness::new().await;
    let id = h.unreadable("/c/missing.srt", 1).await;
    let generator = Arc::new(ScriptedGenerator::always(success()));

    h.run(generator.clone(), Arc::new(MemorySink::default()), fast_config())
        .await;

    let task = h.get(id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("read failure"));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn oversized_input_fails_before_generation() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;
    let generator = Arc::new(ScriptedGenerator::always(success()));
    let config = EngineConfig {
        max_input_chars: 10,
        ..fast_config()
    };

    h.run(generator.clone(), Arc::new(MemorySink::default()), config)
        .await;

    let task = h.get(id).await;
    let expected = format!("input too large ({} chars, max 10)", TRANSCRIPT.len());
    assert_eq!(task.error_message.as_deref(), Some(expected.as_str()));
    assert_eq!(task.quality_score, None);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn generation_failure_is_recorded_with_its_reason() {
    let mut h = Harness::new().await;
    let fatal = h.task("/c/a.srt", 1).await;
    let empty = h.task("/c/b.srt", 2).await;
    let generator = ScriptedGenerator::scripted(
        vec![
            Generation::Fatal("invalid x-api-key".into()),
            Generation::Success(Generated::text("   ")),
        ],
        success(),
    );

    let summary = h
        .run(Arc::new(generator), Arc::new(MemorySink::default()), fast_config())
        .await;

    assert_eq!(summary.failed, 2);
    assert_eq!(
        h.get(fatal).await.error_message.as_deref(),
        Some("generation failed: invalid x-api-key")
    );
    assert_eq!(
        h.get(empty).await.error_message.as_deref(),
        Some("generation failed: empty output")
    );
}

#[tokio::test]
async fn write_failure_fails_the_task() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;

    h.run(
        Arc::new(ScriptedGenerator::always(success())),
        Arc::new(MemorySink::failing()),
        fast_config(),
    )
    .await;

    let task = h.get(id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error_message.unwrap();
    assert!(error.starts_with("write failure: "), "{error}");
    assert!(error.contains("read-only folder"), "{error}");
}

// ---------------------------------------------------------------------------
// Waves, retry mode, and the attempt ceiling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failures_are_not_reoffered_outside_retry_mode() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;
    let generator = Arc::new(ScriptedGenerator::always(Generation::Transient(
        "overloaded".into(),
    )));

    let summary = h
        .run(generator.clone(), Arc::new(MemorySink::default()), fast_config())
        .await;

    assert_eq!(summary.waves, 1);
    assert_eq!(generator.calls(), 1);
    assert_eq!(summary.store.retryable, 1);
    assert_eq!(h.get(id).await.attempts, 1);
}

#[tokio::test]
async fn retry_mode_keeps_going_until_success() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;
    let generator = Arc::new(ScriptedGenerator::scripted(
        vec![
            Generation::Transient("timeout".into()),
            Generation::Transient("timeout".into()),
        ],
        success(),
    ));

    let first = h
        .run(generator.clone(), Arc::new(MemorySink::default()), fast_config())
        .await;
    assert_eq!(first.failed, 1);

    let config = EngineConfig {
        retry_failed: true,
        ..fast_config()
    };
    let summary = h
        .run(generator.clone(), Arc::new(MemorySink::default()), config)
        .await;

    assert_eq!(summary.waves, 2);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 1);
    let task = h.get(id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 3);
    assert_eq!(task.error_message, None);
}

#[tokio::test]
async fn retry_mode_leaves_pending_tasks_alone() {
    let mut h = Harness::new().await;
    let failed = h.task("/c/a.srt", 1).await;
    let generator = Arc::new(ScriptedGenerator::scripted(
        vec![Generation::Fatal("bad".into())],
        success(),
    ));
    h.run(generator.clone(), Arc::new(MemorySink::default()), fast_config())
        .await;
    let pending = h.task("/c/b.srt", 2).await;

    let config = EngineConfig {
        retry_failed: true,
        ..fast_config()
    };
    let summary = h
        .run(generator.clone(), Arc::new(MemorySink::default()), config)
        .await;

    assert_eq!(summary.attempted, 1);
    assert_eq!(h.get(failed).await.status, TaskStatus::Completed);
    let untouched = h.get(pending).await;
    assert_eq!(untouched.status, TaskStatus::Pending);
    assert_eq!(untouched.attempts, 0);
}

#[tokio::test]
async fn retry_mode_stops_at_the_ceiling() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;
    let generator = Arc::new(ScriptedGenerator::always(Generation::Fatal("bad".into())));

    let first = h
        .run(generator.clone(), Arc::new(MemorySink::default()), fast_config())
        .await;
    assert_eq!(first.waves, 1);

    let config = EngineConfig {
        retry_failed: true,
        ..fast_config()
    };
    let summary = h
        .run(generator.clone(), Arc::new(MemorySink::default()), config.clone())
        .await;
    assert_eq!(summary.waves, 2);
    assert_eq!(summary.store.terminally_failed, 1);
    assert_eq!(h.get(id).await.attempts, 3);

    let again = h
        .run(generator.clone(), Arc::new(MemorySink::default()), config)
        .await;
    assert_eq!(again.waves, 0);
    assert_eq!(again.attempted, 0);
    assert_eq!(generator.calls(), 3);
    assert_eq!(h.db.list_terminally_failed().await.unwrap().len(), 1);
}

#[tokio::test]
async fn workers_share_waves_without_double_processing() {
    let mut h = Harness::new().await;
    for i in 0..12 {
        h.task(&format!("/c/{i:02}.srt"), i).await;
    }
    let sink = Arc::new(MemorySink::default());
    let config = EngineConfig {
        workers: 3,
        batch_size: 2,
        ..fast_config()
    };

    let summary = h
        .run(Arc::new(ScriptedGenerator::always(success())), sink.clone(), config)
        .await;

    assert_eq!(summary.waves, 2);
    assert_eq!(summary.succeeded, 12);
    let mut keys = sink.keys();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 12);
    for task in h.db.list_tasks(&TaskFilter::default()).await.unwrap() {
        assert_eq!(task.attempts, 1, "{}", task.source_key);
    }
}

#[tokio::test]
async fn smallest_tasks_go_first() {
    let mut h = Harness::new().await;
    for (key, size) in [("/c/big.srt", 50), ("/c/small.srt", 10), ("/c/mid.srt", 30)] {
        h.task(key, size).await;
    }
    let sink = Arc::new(MemorySink::default());

    h.run(
        Arc::new(ScriptedGenerator::always(success())),
        sink.clone(),
        fast_config(),
    )
    .await;

    assert_eq!(sink.keys(), vec!["/c/small.srt", "/c/mid.srt", "/c/big.srt"]);
}

#[tokio::test]
async fn wave_limit_leaves_remaining_work_pending() {
    let mut h = Harness::new().await;
    for i in 0..5 {
        h.task(&format!("/c/{i}.srt"), i).await;
    }
    let config = EngineConfig {
        batch_size: 2,
        max_waves: Some(1),
        ..fast_config()
    };

    let summary = h
        .run(
            Arc::new(ScriptedGenerator::always(success())),
            Arc::new(MemorySink::default()),
            config,
        )
        .await;

    assert_eq!(summary.waves, 1);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.store.pending, 3);
}

#[tokio::test]
async fn runs_are_recorded() {
    let mut h = Harness::new().await;
    h.task("/c/a.srt", 1).await;

    let summary = h
        .run(
            Arc::new(ScriptedGenerator::always(success())),
            Arc::new(MemorySink::default()),
            fast_config(),
        )
        .await;

    let runs = h.db.list_runs(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(Some(runs[0].run_id), summary.run_id);
    assert_eq!(runs[0].succeeded, 1);
    assert_eq!(runs[0].avg_quality, Some(1.0));
}

// ---------------------------------------------------------------------------
// Shutdown and store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_before_run_dispatches_nothing() {
    let mut h = Harness::new().await;
    h.task("/c/a.srt", 1).await;
    let orchestrator = h.orchestrator(
        Arc::new(ScriptedGenerator::always(success())),
        Arc::new(MemorySink::default()),
        fast_config(),
    );
    orchestrator.shutdown_handle().trigger();

    let summary = orchestrator.run().await.unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.waves, 0);
    assert_eq!(summary.store.pending, 1);
}

/// Requests shutdown from inside the first generation call.
struct StopOnFirstCall {
    shutdown: Arc<OnceLock<Shutdown>>,
}

#[async_trait]
impl Generator for StopOnFirstCall {
    async fn generate(&self, _request: &GenerationRequest) -> Generation {
        if let Some(shutdown) = self.shutdown.get() {
            shutdown.trigger();
        }
        success()
    }
}

#[tokio::test]
async fn shutdown_finishes_the_in_flight_task_and_stops() {
    let mut h = Harness::new().await;
    for i in 0..4 {
        h.task(&format!("/c/{i}.srt"), i).await;
    }
    let handle = Arc::new(OnceLock::new());
    let generator = StopOnFirstCall {
        shutdown: Arc::clone(&handle),
    };
    let orchestrator = h.orchestrator(
        Arc::new(generator),
        Arc::new(MemorySink::default()),
        fast_config(),
    );
    handle.set(orchestrator.shutdown_handle()).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.store.completed, 1);
    assert_eq!(summary.store.pending, 3);
}

/// Wipes the store mid-pipeline so the outcome has nowhere to go.
struct WipesStore {
    db: Arc<Db>,
}

#[async_trait]
impl Generator for WipesStore {
    async fn generate(&self, _request: &GenerationRequest) -> Generation {
        self.db.reset().await.unwrap();
        success()
    }
}

#[tokio::test]
async fn unrecorded_outcomes_are_reported_not_propagated() {
    let mut h = Harness::new().await;
    h.task("/c/a.srt", 1).await;
    let generator = WipesStore {
        db: Arc::clone(&h.db),
    };

    let summary = h
        .run(Arc::new(generator), Arc::new(MemorySink::default()), fast_config())
        .await;

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.unrecorded, 1);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.store.total, 0);
}

/// Panics on the first `panics` calls, then succeeds.
struct PanickingGenerator {
    panics: usize,
    calls: AtomicUsize,
}

impl PanickingGenerator {
    fn new(panics: usize) -> Self {
        Self {
            panics,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Generator for PanickingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Generation {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.panics {
            panic!("provider client bug");
        }
        success()
    }
}

#[tokio::test]
async fn panicking_generator_fails_the_task_and_the_run_ends() {
    let mut h = Harness::new().await;
    let id = h.task("/c/a.srt", 1).await;
    let generator = Arc::new(PanickingGenerator::new(usize::MAX));

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        h.run(generator.clone(), Arc::new(MemorySink::default()), fast_config()),
    )
    .await
    .expect("run should end once the panic is recorded");

    assert_eq!(summary.waves, 1);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.unrecorded, 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let task = h.get(id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 1);
    assert_eq!(
        task.error_message.as_deref(),
        Some("pipeline panicked: provider client bug")
    );
}

#[tokio::test]
async fn a_panic_does_not_lose_the_rest_of_the_wave() {
    let mut h = Harness::new().await;
    for i in 0..3 {
        h.task(&format!("/c/{i}.srt"), i).await;
    }
    let sink = Arc::new(MemorySink::default());
    let config = EngineConfig {
        workers: 1,
        ..fast_config()
    };

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        h.run(Arc::new(PanickingGenerator::new(1)), sink.clone(), config),
    )
    .await
    .expect("run should not hang after a panic");

    assert_eq!(summary.waves, 1);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.store.completed, 2);
    assert_eq!(summary.store.retryable, 1);
    assert_eq!(sink.keys(), vec!["/c/1.srt".to_string(), "/c/2.srt".to_string()]);
}
