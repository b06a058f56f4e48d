//! synthq CLI: inventory transcripts and turn them into study notes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use synthq::config::{Config, Settings};
use synthq::db::Db;
use synthq::engine::{Collaborators, EngineConfig, Orchestrator, RunSummary};
use synthq::files::{MarkdownNotes, SrtTranscripts, discover, inventory};
use synthq::gate::QualityGate;
use synthq::llm::{AnthropicGenerator, RetryingGenerator, anthropic_client};
use synthq::model::Statistics;
use synthq::telemetry::{TelemetryConfig, init_telemetry};
use tracing::warn;

#[derive(Parser)]
#[command(name = "synthq", about = "Durable batch synthesis of lecture transcripts into notes")]
struct Cli {
    /// Task database file (overrides SYNTHQ_DATABASE)
    #[arg(long, global = true)]
    db: Option<String>,
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover transcripts and add them to the task store
    Scan {
        /// Folders to scan
        #[arg(required = true)]
        folders: Vec<PathBuf>,
        /// Descend into subfolders
        #[arg(long)]
        recursive: bool,
    },
    /// Process eligible tasks
    Run(RunArgs),
    /// Show store statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List tasks that are out of attempts
    Failed,
    /// Delete every task and run record
    Reset,
}

#[derive(Args)]
struct RunArgs {
    /// Scan these folders before processing
    #[arg(long, num_args = 1..)]
    scan: Vec<PathBuf>,
    /// Descend into subfolders when scanning
    #[arg(long)]
    recursive: bool,
    /// Concurrent workers
    #[arg(long)]
    workers: Option<usize>,
    /// Tasks per worker per wave
    #[arg(long)]
    batch_size: Option<usize>,
    /// Retry failed tasks that have attempts left instead of pending ones
    #[arg(long)]
    retry_failed: bool,
    /// Model alias or full model id
    #[arg(long)]
    model: Option<String>,
    /// File whose contents replace the built-in system prompt
    #[arg(long)]
    system_prompt: Option<PathBuf>,
    /// Stop after this many waves
    #[arg(long)]
    max_waves: Option<usize>,
    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Show what the first wave would process, then exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let settings = Settings::load_or_default(cli.config.as_deref())?;

    let log_file = match &cli.command {
        Command::Run(args) => args.log_file.clone(),
        _ => None,
    };
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "synthq".to_string(),
        log_file,
        default_level: config.log_level.clone(),
    })?;

    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path.clone());
    let db = Db::open(&db_path)
        .await?
        .with_max_attempts(settings.engine.max_attempts);

    match cli.command {
        Command::Scan { folders, recursive } => {
            scan(&db, &folders, recursive, &settings.notes.suffix).await
        }
        Command::Run(args) => cmd_run(db, &config, settings, args).await,
        Command::Stats { json } => cmd_stats(&db, json).await,
        Command::Failed => cmd_failed(&db).await,
        Command::Reset => cmd_reset(&db).await,
    }
}

async fn scan(db: &Db, folders: &[PathBuf], recursive: bool, suffix: &str) -> anyhow::Result<()> {
    let folders = folders.to_vec();
    let suffix_owned = suffix.to_string();
    let report =
        tokio::task::spawn_blocking(move || discover(&folders, recursive, &suffix_owned)).await??;
    let already_noted = report.already_noted;
    let added = inventory(db, report.found).await?;

    println!(
        "Scan: {} new, {} already known, {} already have notes",
        added.added, added.known, already_noted
    );
    Ok(())
}

async fn cmd_run(
    db: Db,
    config: &Config,
    mut settings: Settings,
    args: RunArgs,
) -> anyhow::Result<()> {
    if let Some(workers) = args.workers {
        settings.engine.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        settings.engine.batch_size = batch_size;
    }
    if let Some(max_waves) = args.max_waves {
        settings.engine.max_waves = Some(max_waves);
    }
    if let Some(model) = args.model {
        settings.generation.model = model;
    }
    if let Some(prompt) = args.system_prompt {
        settings.generation.system_prompt_file = Some(prompt);
    }
    settings.validate()?;
    let system_prompt = settings.system_prompt()?;

    if !args.scan.is_empty() {
        scan(&db, &args.scan, args.recursive, &settings.notes.suffix).await?;
    }

    let mut engine = settings.engine_config();
    engine.retry_failed = args.retry_failed;
    let db = Arc::new(db);

    if args.dry_run {
        return preview(&db, &engine).await;
    }

    let client = anthropic_client(config.api_key()?)
        .map_err(|e| anyhow::anyhow!("cannot create Anthropic client: {e}"))?;
    let generator = AnthropicGenerator::new(client, settings.model_id()?, system_prompt)
        .max_tokens(settings.generation.max_tokens)
        .min_length(settings.quality.min_length)
        .timeout(Duration::from_secs(settings.generation.timeout_secs));
    let generator = RetryingGenerator::new(generator, settings.retry_policy());

    let collaborators = Collaborators {
        source: Arc::new(SrtTranscripts),
        generator: Arc::new(generator),
        sink: Arc::new(MarkdownNotes::new(settings.notes.suffix.clone())),
    };
    let orchestrator = Orchestrator::new(
        Arc::clone(&db),
        collaborators,
        QualityGate::new(settings.quality.clone()),
        engine,
    );

    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight tasks");
            shutdown.trigger();
        }
    });

    let summary = orchestrator.run().await?;
    print_summary(&summary);
    Ok(())
}

async fn preview(db: &Db, engine: &EngineConfig) -> anyhow::Result<()> {
    let tasks = db
        .claim_batch(engine.wave_capacity(), engine.retry_failed)
        .await?;
    if tasks.is_empty() {
        println!("Nothing to process.");
        return Ok(());
    }

    println!("{:<6}  {:<8}  {:<4}  {:<24}  ITEM", "ID", "SIZE_KB", "TRY", "GROUP");
    println!("{}", "-".repeat(80));
    for task in &tasks {
        println!(
            "{:<6}  {:<8}  {:<4}  {:<24}  {}",
            task.id.0,
            task.size_hint,
            task.attempts + 1,
            truncate(&task.group_label, 24),
            task.item_label
        );
    }
    println!("\n{} task(s) in the first wave (dry run)", tasks.len());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.interrupted {
        println!("Run interrupted after {} wave(s)", summary.waves);
    } else {
        println!("Run finished after {} wave(s)", summary.waves);
    }
    println!(
        "  attempted {}  succeeded {}  failed {}",
        summary.attempted, summary.succeeded, summary.failed
    );
    if summary.unrecorded > 0 {
        println!("  unrecorded {} (see log)", summary.unrecorded);
    }
    if let Some(avg) = summary.avg_quality {
        println!("  average quality this run: {avg:.2}");
    }
    println!();
    print_statistics(&summary.store);

    if summary.store.terminally_failed > 0 {
        println!(
            "\n{} task(s) are out of attempts; `synthq failed` lists them.",
            summary.store.terminally_failed
        );
    } else if summary.store.retryable > 0 {
        println!(
            "\n{} failed task(s) can be retried with `synthq run --retry-failed`.",
            summary.store.retryable
        );
    }
}

fn print_statistics(stats: &Statistics) {
    println!("Total:              {}", stats.total);
    println!(
        "Completed:          {} ({:.1}%)",
        stats.completed,
        stats.percent(stats.completed)
    );
    println!(
        "Pending:            {} ({:.1}%)",
        stats.pending,
        stats.percent(stats.pending)
    );
    println!(
        "Failed (retryable): {} ({:.1}%)",
        stats.retryable,
        stats.percent(stats.retryable)
    );
    println!(
        "Failed (terminal):  {} ({:.1}%)",
        stats.terminally_failed,
        stats.percent(stats.terminally_failed)
    );
    println!("Average quality:    {:.2}", stats.avg_quality);
}

async fn cmd_stats(db: &Db, json: bool) -> anyhow::Result<()> {
    let stats = db.statistics().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_statistics(&stats);
    }
    Ok(())
}

async fn cmd_failed(db: &Db) -> anyhow::Result<()> {
    let tasks = db.list_terminally_failed().await?;
    if tasks.is_empty() {
        println!("No terminally failed tasks.");
        return Ok(());
    }

    for task in &tasks {
        println!(
            "{}  [{}] {} (attempts: {})",
            task.id, task.group_label, task.item_label, task.attempts
        );
        println!("      {}", task.error_message.as_deref().unwrap_or("-"));
        println!("      {}", task.source_key);
    }
    println!("\n{} task(s)", tasks.len());
    Ok(())
}

async fn cmd_reset(db: &Db) -> anyhow::Result<()> {
    let before = db.statistics().await?;
    db.reset().await?;
    println!("Removed {} task(s).", before.total);
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
