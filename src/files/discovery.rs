//! Transcript discovery and inventory.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::notes::notes_path;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::NewTask;

const TRANSCRIPT_EXTENSION: &str = "srt";

/// A transcript found on disk, ready to become a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered {
    pub source_key: String,
    /// Parent directory name (the course).
    pub group_label: String,
    /// File stem (the lecture).
    pub item_label: String,
    /// File size in KiB.
    pub size_hint: i64,
}

impl Discovered {
    pub fn into_new_task(self) -> NewTask {
        NewTask::new(self.source_key, self.group_label, self.item_label).size_hint(self.size_hint)
    }
}

/// What a scan found.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub found: Vec<Discovered>,
    /// Transcripts skipped because their notes already exist.
    pub already_noted: usize,
}

/// What an inventory pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InventoryReport {
    pub added: usize,
    pub known: usize,
}

/// Scan `folders` for transcripts. Only the top level of each folder is
/// read unless `recursive` is set.
pub fn discover(folders: &[PathBuf], recursive: bool, notes_suffix: &str) -> Result<DiscoveryReport> {
    let mut report = DiscoveryReport::default();

    for folder in folders {
        if !folder.is_dir() {
            return Err(Error::Config(format!(
                "scan path is not a directory: {}",
                folder.display()
            )));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut found_here = 0usize;
        for entry in WalkDir::new(folder)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_transcript(path) {
                continue;
            }
            found_here += 1;

            if notes_path(path, notes_suffix).exists() {
                debug!(path = %path.display(), "notes already exist, skipping");
                report.already_noted += 1;
                continue;
            }

            let size = entry.metadata().map_err(|e| Error::Io(e.into()))?.len();
            report.found.push(Discovered {
                source_key: path.to_string_lossy().into_owned(),
                group_label: label(path.parent()),
                item_label: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_hint: (size / 1024) as i64,
            });
        }

        info!(folder = %folder.display(), transcripts = found_here, "folder scanned");
    }

    Ok(report)
}

/// Insert discovered transcripts. Already-known source keys are counted,
/// not treated as errors.
pub async fn inventory(db: &Db, items: Vec<Discovered>) -> Result<InventoryReport> {
    let mut report = InventoryReport::default();
    for item in items {
        if db.insert_task(item.into_new_task()).await? {
            report.added += 1;
        } else {
            report.known += 1;
        }
    }
    info!(added = report.added, known = report.known, "inventory complete");
    Ok(report)
}

fn is_transcript(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TRANSCRIPT_EXTENSION))
}

fn label(dir: Option<&Path>) -> String {
    dir.and_then(Path::file_name)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
