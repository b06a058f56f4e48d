//! Markdown note output.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::NoteSink;
use crate::error::Result;

pub const DEFAULT_NOTES_SUFFIX: &str = "Notes";

/// `<dir>/<stem>_<suffix>.md` next to the transcript.
pub fn notes_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{stem}_{suffix}.md");
    match source.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Writes notes beside their transcripts.
#[derive(Debug, Clone)]
pub struct MarkdownNotes {
    suffix: String,
}

impl MarkdownNotes {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Default for MarkdownNotes {
    fn default() -> Self {
        Self::new(DEFAULT_NOTES_SUFFIX)
    }
}

#[async_trait]
impl NoteSink for MarkdownNotes {
    async fn write(&self, source_key: &str, content: &str) -> Result<PathBuf> {
        let path = notes_path(Path::new(source_key), &self.suffix);
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), "notes saved");
        Ok(path)
    }
}
