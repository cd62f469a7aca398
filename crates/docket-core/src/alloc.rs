//! Monotonic identifier allocation.
//!
//! Counters persist in `.docket/ids.toml` and only ever grow: an id retired
//! by archival or deletion is never handed out again, so historical
//! references stay stable. Callers must hold the engine lock across an
//! allocation; the allocator itself just does read-bump-write on the counter
//! file.

use crate::model::item_id::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

/// Errors from counter-file handling and allocation.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("counter file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("counter file parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("counter file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Children can only hang off top-level items; one nesting level exists.
    #[error("cannot allocate a child under composite id {0}")]
    NotTopLevel(ItemId),
}

/// Persistent counters: the next unused top-level id and the next unused
/// child suffix per parent. TOML table keys are strings, so parents are
/// stored in their string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub next_top: u32,
    #[serde(default)]
    pub children: BTreeMap<String, u32>,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            next_top: 1,
            children: BTreeMap::new(),
        }
    }
}

impl Counters {
    /// Raise counters so they will never re-issue `id`. Used to seed a
    /// missing counter file from the active item set and the archive.
    pub fn observe(&mut self, id: ItemId) {
        match id.child_component() {
            None => {
                self.next_top = self.next_top.max(id.top_component() + 1);
            }
            Some(suffix) => {
                // A child implies its parent id is taken too.
                self.next_top = self.next_top.max(id.top_component() + 1);
                let entry = self
                    .children
                    .entry(id.top_component().to_string())
                    .or_insert(1);
                *entry = (*entry).max(suffix + 1);
            }
        }
    }
}

/// Allocator over a persistent counter file.
#[derive(Debug)]
pub struct IdAllocator {
    path: PathBuf,
}

impl IdAllocator {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write `counters` if no counter file exists yet. Returns `true` when
    /// the file was written.
    pub fn seed_if_missing(&self, counters: &Counters) -> Result<bool, AllocError> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save(counters)?;
        Ok(true)
    }

    /// Allocate the next top-level id: one greater than the maximum ever
    /// issued, starting at 1.
    ///
    /// # Errors
    ///
    /// Counter-file I/O or parse failures.
    pub fn next_top_level(&self) -> Result<ItemId, AllocError> {
        let mut counters = self.load()?;
        let id = ItemId::top(counters.next_top);
        counters.next_top += 1;
        self.save(&counters)?;
        Ok(id)
    }

    /// Allocate the next child id under `parent`, starting at `parent.1`.
    ///
    /// # Errors
    ///
    /// [`AllocError::NotTopLevel`] if `parent` is itself a composite id,
    /// plus counter-file I/O or parse failures.
    pub fn next_child(&self, parent: ItemId) -> Result<ItemId, AllocError> {
        if !parent.is_top_level() {
            return Err(AllocError::NotTopLevel(parent));
        }
        let mut counters = self.load()?;
        let entry = counters
            .children
            .entry(parent.top_component().to_string())
            .or_insert(1);
        let id = ItemId::child_of(parent.top_component(), *entry);
        *entry += 1;
        self.save(&counters)?;
        Ok(id)
    }

    fn load(&self) -> Result<Counters, AllocError> {
        if !self.path.exists() {
            return Ok(Counters::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&raw)?)
    }

    fn save(&self, counters: &Counters) -> Result<(), AllocError> {
        let raw = toml::to_string_pretty(counters)?;
        let tmp = self.path.with_extension("toml.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Build counters from everything currently known: active items and archived
/// ones both pin their ids forever.
pub fn counters_from_ids<I: IntoIterator<Item = ItemId>>(ids: I) -> Counters {
    let mut counters = Counters::default();
    for id in ids {
        counters.observe(id);
    }
    counters
}
