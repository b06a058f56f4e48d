//! File-system collaborators: transcript discovery, text extraction, and
//! note output.
//!
//! The engine depends only on [`TextSource`] and [`NoteSink`]; discovery
//! feeds the store through `Db::insert_task`.

pub mod discovery;
pub mod notes;
pub mod transcript;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

pub use discovery::{Discovered, DiscoveryReport, InventoryReport, discover, inventory};
pub use notes::{DEFAULT_NOTES_SUFFIX, MarkdownNotes, notes_path};
pub use transcript::{SrtTranscripts, clean_srt};

/// Produces cleaned input text for a task.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn extract(&self, source_key: &str) -> Result<String>;
}

/// Persists accepted notes for a task.
#[async_trait]
pub trait NoteSink: Send + Sync {
    /// Write `content` for the task identified by `source_key`; returns
    /// where it landed.
    async fn write(&self, source_key: &str, content: &str) -> Result<PathBuf>;
}
