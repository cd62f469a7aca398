//! On-disk layout of a docket project.
//!
//! Everything lives under `.docket/` at the project root:
//!
//! ```text
//! .docket/
//!   config.toml      engine configuration
//!   ids.toml         allocator counters
//!   lock             advisory lock file
//!   items/<id>.md    one detailed record per active item
//!   features/<name>.md
//!   summary.md       derived summary list (file name configurable)
//!   archive.jsonl    append-only historical store
//! ```

use crate::model::item_id::ItemId;
use std::path::{Path, PathBuf};

/// Name of the engine directory at the project root.
pub const DOCKET_DIR: &str = ".docket";

#[must_use]
pub fn docket_dir(root: &Path) -> PathBuf {
    root.join(DOCKET_DIR)
}

#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    docket_dir(root).join("config.toml")
}

#[must_use]
pub fn ids_path(root: &Path) -> PathBuf {
    docket_dir(root).join("ids.toml")
}

#[must_use]
pub fn lock_path(root: &Path) -> PathBuf {
    docket_dir(root).join("lock")
}

#[must_use]
pub fn items_dir(root: &Path) -> PathBuf {
    docket_dir(root).join("items")
}

#[must_use]
pub fn item_path(root: &Path, id: ItemId) -> PathBuf {
    items_dir(root).join(format!("{id}.md"))
}

#[must_use]
pub fn features_dir(root: &Path) -> PathBuf {
    docket_dir(root).join("features")
}

#[must_use]
pub fn feature_path(root: &Path, name: &str) -> PathBuf {
    features_dir(root).join(format!("{name}.md"))
}

#[must_use]
pub fn summary_path(root: &Path, file_name: &str) -> PathBuf {
    docket_dir(root).join(file_name)
}

#[must_use]
pub fn archive_path(root: &Path) -> PathBuf {
    docket_dir(root).join("archive.jsonl")
}
