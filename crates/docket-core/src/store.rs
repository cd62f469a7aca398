//! Record persistence and the detail/summary synchronization manager.
//!
//! # Overview
//!
//! The detailed records under `items/` are the single source of truth. The
//! summary list is a projection, rewritten from the records on every commit
//! and regenerated from scratch by [`Store::repair`]. Commits are two-phase
//! (record first, then summary) and idempotent: replaying a commit with
//! identical content changes nothing.
//!
//! # Crash safety
//!
//! Every write is temp-then-rename, never in-place. A crash between the two
//! phases leaves a stale summary, which is exactly the divergence `repair`
//! exists to heal; it never corrupts a record.

use crate::model::item::WorkItem;
use crate::model::item_id::ItemId;
use crate::model::Feature;
use crate::paths;
use crate::record::{self, DecodeError};
use crate::summary::{self, SummaryDiff, SummaryEntry};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A commit against a stale revision. The caller re-reads and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale write to {id}: expected revision {expected}, found {found}")]
pub struct ConflictError {
    pub id: ItemId,
    pub expected: DateTime<Utc>,
    pub found: DateTime<Utc>,
}

/// Errors from record persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt record {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("no record for item {0}")]
    NotFound(ItemId),

    #[error("no record for feature '{0}'")]
    FeatureNotFound(String),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Creating an item whose id already has a record. Distinct from
    /// [`StoreError::Conflict`]: this is an allocation bug, not a race.
    #[error("record for item {0} already exists")]
    AlreadyExists(ItemId),
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// Optimistic version token, derived from a record's `updated` stamp at load
/// time. Commits carry the revision they read; a mismatch on disk means
/// someone else wrote in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision(DateTime<Utc>);

impl Revision {
    #[must_use]
    pub fn of(item: &WorkItem) -> Self {
        Self(item.updated_at)
    }

    #[must_use]
    pub const fn stamp(self) -> DateTime<Utc> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// RepairReport
// ---------------------------------------------------------------------------

/// Report returned after a summary regeneration.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Active records successfully decoded.
    pub item_count: usize,
    /// How the old summary diverged from the projection.
    pub diff: SummaryDiff,
    /// False when the old summary was missing or unparseable.
    pub summary_was_readable: bool,
    /// Records that failed to decode, with the reason. These are reported,
    /// never deleted.
    pub unreadable_records: Vec<(PathBuf, String)>,
    /// Whether the summary file content actually changed.
    pub rewritten: bool,
}

impl RepairReport {
    /// True when the two views already agreed and every record decoded.
    #[must_use]
    pub fn was_consistent(&self) -> bool {
        self.summary_was_readable && self.diff.is_clean() && self.unreadable_records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// File-backed store for item and feature records plus the derived summary.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    summary_file: String,
}

impl Store {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, summary_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            summary_file: summary_file.into(),
        }
    }

    /// Create the on-disk layout. Idempotent.
    pub fn init(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(paths::items_dir(&self.root))?;
        std::fs::create_dir_all(paths::features_dir(&self.root))?;
        let summary = self.summary_path();
        if !summary.exists() {
            atomic_write(&summary, summary::render(&[]).as_bytes())?;
        }
        Ok(())
    }

    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        paths::summary_path(&self.root, &self.summary_file)
    }

    #[must_use]
    pub fn exists(&self, id: ItemId) -> bool {
        paths::item_path(&self.root, id).exists()
    }

    /// Load one record with its revision token.
    pub fn load(&self, id: ItemId) -> Result<(WorkItem, Revision), StoreError> {
        let path = paths::item_path(&self.root, id);
        if !path.exists() {
            return Err(StoreError::NotFound(id));
        }
        let item = read_record(&path)?;
        let revision = Revision::of(&item);
        Ok((item, revision))
    }

    /// Load every active record, strictly: one corrupt record fails the call.
    pub fn list(&self) -> Result<Vec<WorkItem>, StoreError> {
        let (items, unreadable) = self.scan_tolerant()?;
        if let Some((path, reason)) = unreadable.into_iter().next() {
            return Err(StoreError::Decode {
                path,
                source: reason,
            });
        }
        Ok(items)
    }

    /// Load every record that decodes, collecting failures instead of
    /// aborting. Items come back sorted by id.
    pub fn scan_tolerant(&self) -> Result<(Vec<WorkItem>, Vec<(PathBuf, DecodeError)>), StoreError> {
        let dir = paths::items_dir(&self.root);
        let mut items = Vec::new();
        let mut failures = Vec::new();
        if !dir.exists() {
            return Ok((items, failures));
        }

        let mut paths_found: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                paths_found.push(path);
            }
        }

        for path in paths_found {
            match read_record(&path) {
                Ok(item) => items.push(item),
                Err(StoreError::Decode { path, source }) => failures.push((path, source)),
                Err(other) => return Err(other),
            }
        }
        items.sort_by_key(|item| item.id);
        Ok((items, failures))
    }

    /// Two-phase commit: write the record, then rewrite the summary.
    ///
    /// `base` is the revision the caller read, or `None` when creating.
    /// Identical content is a no-op for both phases.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] on a stale `base`,
    /// [`StoreError::AlreadyExists`] when creating over an existing record,
    /// [`StoreError::NotFound`] when updating a record that is gone.
    pub fn commit(&self, item: &WorkItem, base: Option<Revision>) -> Result<Revision, StoreError> {
        let path = paths::item_path(&self.root, item.id);
        let encoded = record::encode(item);

        match (path.exists(), base) {
            (false, None) => {}
            (false, Some(_)) => return Err(StoreError::NotFound(item.id)),
            (true, None) => return Err(StoreError::AlreadyExists(item.id)),
            (true, Some(base)) => {
                let existing = read_record(&path)?;
                if existing.updated_at != base.stamp() {
                    return Err(StoreError::Conflict(ConflictError {
                        id: item.id,
                        expected: base.stamp(),
                        found: existing.updated_at,
                    }));
                }
                if record::encode(&existing) == encoded {
                    debug!(id = %item.id, "commit is identical, skipping both phases");
                    return Ok(Revision::of(item));
                }
            }
        }

        // Phase 1: the record itself.
        atomic_write(&path, encoded.as_bytes())?;
        debug!(id = %item.id, "record written");

        // Phase 2: the derived summary.
        let items = self.list()?;
        self.write_summary(&items)?;

        Ok(Revision::of(item))
    }

    /// Delete a record and drop its summary entry. Used by archival; the
    /// caller is responsible for having preserved the item first.
    pub fn remove(&self, id: ItemId) -> Result<(), StoreError> {
        let path = paths::item_path(&self.root, id);
        if !path.exists() {
            return Err(StoreError::NotFound(id));
        }
        std::fs::remove_file(&path)?;
        let items = self.list()?;
        self.write_summary(&items)?;
        Ok(())
    }

    /// Regenerate the summary from the records and report every divergence.
    ///
    /// This is the consistency oracle: the summary afterwards is exactly the
    /// projection of the decodable records. Records that fail to decode are
    /// reported and left in place.
    pub fn repair(&self) -> Result<RepairReport, StoreError> {
        let (items, failures) = self.scan_tolerant()?;
        let expected: Vec<SummaryEntry> = items.iter().map(summary::project).collect();

        let summary_path = self.summary_path();
        let (actual, summary_was_readable) = if summary_path.exists() {
            match std::fs::read_to_string(&summary_path) {
                Ok(raw) => match summary::parse(&raw) {
                    Ok(entries) => (entries, true),
                    Err(err) => {
                        warn!(%err, "summary file unparseable, regenerating");
                        (Vec::new(), false)
                    }
                },
                Err(err) => {
                    warn!(%err, "summary file unreadable, regenerating");
                    (Vec::new(), false)
                }
            }
        } else {
            (Vec::new(), false)
        };

        let diff = summary::diff(&expected, &actual);
        let rendered = summary::render(&expected);
        let rewritten = !summary_path.exists()
            || std::fs::read_to_string(&summary_path).unwrap_or_default() != rendered;
        atomic_write(&summary_path, rendered.as_bytes())?;

        for (path, reason) in &failures {
            warn!(path = %path.display(), %reason, "record failed to decode during repair");
        }
        info!(
            items = items.len(),
            stale = diff.stale.len(),
            missing = diff.missing.len(),
            foreign = diff.foreign.len(),
            "summary regenerated"
        );

        Ok(RepairReport {
            item_count: items.len(),
            diff,
            summary_was_readable,
            unreadable_records: failures
                .into_iter()
                .map(|(path, err)| (path, err.to_string()))
                .collect(),
            rewritten,
        })
    }

    fn write_summary(&self, items: &[WorkItem]) -> Result<(), StoreError> {
        let entries: Vec<SummaryEntry> = items.iter().map(summary::project).collect();
        atomic_write(&self.summary_path(), summary::render(&entries).as_bytes())?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Feature records
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn feature_exists(&self, name: &str) -> bool {
        paths::feature_path(&self.root, name).exists()
    }

    pub fn load_feature(&self, name: &str) -> Result<Feature, StoreError> {
        let path = paths::feature_path(&self.root, name);
        if !path.exists() {
            return Err(StoreError::FeatureNotFound(name.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        record::decode_feature(&raw).map_err(|source| StoreError::Decode { path, source })
    }

    pub fn save_feature(&self, feature: &Feature) -> Result<(), StoreError> {
        let path = paths::feature_path(&self.root, &feature.name);
        atomic_write(&path, record::encode_feature(feature).as_bytes())?;
        Ok(())
    }

    pub fn list_features(&self) -> Result<Vec<Feature>, StoreError> {
        let dir = paths::features_dir(&self.root);
        let mut features = Vec::new();
        if !dir.exists() {
            return Ok(features);
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "md") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let feature = record::decode_feature(&raw)
                .map_err(|source| StoreError::Decode { path, source })?;
            features.push(feature);
        }
        features.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(features)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_record(path: &Path) -> Result<WorkItem, StoreError> {
    let raw = std::fs::read_to_string(path)?;
    record::decode(&raw).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Write via a temp file in the same directory and rename over the target.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
