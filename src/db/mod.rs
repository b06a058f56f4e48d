//! Database connection pool, migrations, and health check.
//!
//! SQLite in WAL mode is the single source of truth for task state.
//! Every write is one statement, so concurrent workers never hold a
//! transaction across a pipeline.

pub mod run;
pub mod task;

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::Result;

/// Attempts allowed per task unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Database handle. Owns the connection pool shared by all workers.
pub struct Db {
    pool: SqlitePool,
    max_attempts: u32,
}

impl Db {
    /// Open (or create) a database file and run migrations.
    pub async fn open(path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;

        let db = Self {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        };
        db.migrate().await?;
        tracing::info!(path, "task store opened");
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool
    /// is pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let db = Self {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        };
        db.migrate().await?;
        Ok(db)
    }

    /// Override the attempt ceiling used by claims and statistics.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Delete every task and run record.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tasks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM runs").execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::warn!("task store reset");
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
