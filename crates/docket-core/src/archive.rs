//! Append-only historical store for archived items.
//!
//! One JSON line per archived item: `{ archived_at, hash, item }`, where
//! `hash` is the BLAKE3 hash of the canonical item JSON. Archival is one-way;
//! the line is appended and the active record deleted by the engine. On read,
//! lines that fail to parse or whose hash does not match are skipped with a
//! warning and counted, never silently dropped or deleted: the file is the
//! historical record.

use crate::model::item::{Kind, WorkItem};
use crate::model::item_id::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::warn;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One archived item with its archival stamp and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedItem {
    pub archived_at: DateTime<Utc>,
    pub hash: String,
    pub item: WorkItem,
}

/// Result of scanning the archive file.
#[derive(Debug, Clone, Default)]
pub struct ArchiveScan {
    /// Entries that parsed and verified, in file order.
    pub items: Vec<ArchivedItem>,
    /// Lines skipped because they were torn, malformed or hash-mismatched.
    pub skipped: usize,
}

/// Precedent lookup filter. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct ArchiveQuery {
    pub subsystem: Option<String>,
    pub kind: Option<Kind>,
    pub feature: Option<String>,
}

impl ArchiveQuery {
    #[must_use]
    pub fn matches(&self, item: &WorkItem) -> bool {
        if let Some(subsystem) = &self.subsystem {
            if !item.subsystems.contains(subsystem) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        if let Some(feature) = &self.feature {
            if item.feature_ref.as_deref() != Some(feature.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Errors from archive reads and appends.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("archive serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// The append-only archive store.
#[derive(Debug, Clone)]
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one item. The caller guarantees the item is terminal; the
    /// archive itself only records.
    pub fn append(&self, item: &WorkItem, archived_at: DateTime<Utc>) -> Result<(), ArchiveError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = ArchivedItem {
            archived_at,
            hash: content_hash(item)?,
            item: item.clone(),
        };
        let line = serde_json::to_string(&entry)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Read the whole archive, skipping damaged lines.
    pub fn scan(&self) -> Result<ArchiveScan, ArchiveError> {
        let mut result = ArchiveScan::default();
        if !self.path.exists() {
            return Ok(result);
        }

        let raw = std::fs::read_to_string(&self.path)?;
        for (idx, line) in raw.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(entry) => result.items.push(entry),
                Err(reason) => {
                    warn!(line = idx + 1, %reason, "skipping damaged archive line");
                    result.skipped += 1;
                }
            }
        }
        Ok(result)
    }

    /// Every id that has ever been archived. Feeds allocator seeding so
    /// retired ids are never reissued.
    pub fn ids(&self) -> Result<Vec<ItemId>, ArchiveError> {
        Ok(self.scan()?.items.into_iter().map(|e| e.item.id).collect())
    }

    /// Precedent lookup over the archived set.
    pub fn lookup(&self, query: &ArchiveQuery) -> Result<Vec<ArchivedItem>, ArchiveError> {
        Ok(self
            .scan()?
            .items
            .into_iter()
            .filter(|entry| query.matches(&entry.item))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn content_hash(item: &WorkItem) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(item)?;
    Ok(format!("blake3:{}", blake3::hash(canonical.as_bytes())))
}

fn parse_line(line: &str) -> Result<ArchivedItem, String> {
    let entry: ArchivedItem =
        serde_json::from_str(line).map_err(|e| format!("bad JSON: {e}"))?;
    let recomputed = content_hash(&entry.item).map_err(|e| e.to_string())?;
    if recomputed != entry.hash {
        return Err(format!(
            "hash mismatch: line has '{}', computed '{recomputed}'",
            entry.hash
        ));
    }
    Ok(entry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
