//! The engine facade.
//!
//! Wires the codec, validator, allocator, graph, state machine, store and
//! archive behind the operations external collaborators consume: create,
//! update, transition, decompose/confirm, archive, query, repair, plus the
//! feature records. Mutating operations hold the engine lock; reads do not.
//!
//! Contextual state-machine gates live here because they need the active item
//! set:
//!
//! - entering `in-progress` requires every dependency terminal and not
//!   failed (a failed dependency blocks its dependents until it is archived,
//!   which is the explicit unblock action);
//! - entering `completed` requires every dependency `completed` and every
//!   child terminal.

use crate::alloc::{counters_from_ids, IdAllocator};
use crate::archive::{Archive, ArchiveQuery, ArchivedItem};
use crate::assess::{self, ComplexityReport, DecompositionProposal};
use crate::clock::now_utc;
use crate::config::{self, EngineConfig};
use crate::error::{EngineError, ErrorCode};
use crate::graph::DepGraph;
use crate::lock::EngineLock;
use crate::model::feature::{self, Feature};
use crate::model::item::{
    BugExtension, EffortEstimate, Kind, Priority, Status, WorkItem,
};
use crate::model::item_id::ItemId;
use crate::paths;
use crate::record;
use crate::store::{RepairReport, Revision, Store, StoreError};
use crate::validate;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Fields for creating an item. The id is allocated by the engine.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub title: String,
    pub kind: Kind,
    pub priority: Priority,
    pub subsystems: BTreeSet<String>,
    pub dependencies: BTreeSet<ItemId>,
    /// Creating under a parent allocates a composite id.
    pub parent: Option<ItemId>,
    pub feature_ref: Option<String>,
    pub context_note: String,
    pub effort: Option<EffortEstimate>,
    pub bug: Option<BugExtension>,
    pub body: String,
}

impl ItemDraft {
    #[must_use]
    pub fn new(title: impl Into<String>, kind: Kind) -> Self {
        Self {
            title: title.into(),
            kind,
            priority: Priority::Medium,
            subsystems: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            parent: None,
            feature_ref: None,
            context_note: String::new(),
            effort: None,
            bug: None,
            body: String::new(),
        }
    }
}

/// Partial update. `None` leaves a field alone; the nested `Option` fields
/// can also clear a value. Status is never patched here; use `transition`.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub subsystems: Option<BTreeSet<String>>,
    pub dependencies: Option<BTreeSet<ItemId>>,
    pub feature_ref: Option<Option<String>>,
    pub context_note: Option<String>,
    pub effort: Option<Option<EffortEstimate>>,
    pub bug: Option<Option<BugExtension>>,
    pub body: Option<String>,
}

/// Query filter over the active set. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub status: Option<Status>,
    pub kind: Option<Kind>,
    pub priority: Option<Priority>,
    pub subsystem: Option<String>,
    pub feature: Option<String>,
}

impl QueryFilter {
    #[must_use]
    pub fn matches(&self, item: &WorkItem) -> bool {
        if self.status.is_some_and(|s| s != item.status) {
            return false;
        }
        if self.kind.is_some_and(|k| k != item.kind) {
            return false;
        }
        if self.priority.is_some_and(|p| p != item.priority) {
            return false;
        }
        if let Some(subsystem) = &self.subsystem {
            if !item.subsystems.contains(subsystem) {
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

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// File-backed work-item lifecycle engine rooted at one project directory.
#[derive(Debug)]
pub struct Engine {
    root: PathBuf,
    config: EngineConfig,
    store: Store,
    archive: Archive,
    allocator: IdAllocator,
}

impl Engine {
    /// Initialize the on-disk layout and open the engine. Idempotent: an
    /// already-initialized project is opened as-is.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        let config = config::load_config(&root).map_err(EngineError::Config)?;
        if !paths::config_path(&root).exists() {
            config::save_config(&root, &config).map_err(EngineError::Config)?;
        }
        let engine = Self::assemble(root, config);
        engine.store.init()?;
        engine.seed_allocator()?;
        info!(root = %engine.root.display(), "project initialized");
        Ok(engine)
    }

    /// Open an existing project.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotInitialized`] when no `.docket/` directory exists.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        if !paths::docket_dir(&root).exists() {
            return Err(EngineError::NotInitialized(root));
        }
        let config = config::load_config(&root).map_err(EngineError::Config)?;
        let engine = Self::assemble(root, config);
        engine.seed_allocator()?;
        Ok(engine)
    }

    fn assemble(root: PathBuf, config: EngineConfig) -> Self {
        let store = Store::new(&root, config.summary.file_name.clone());
        let archive = Archive::new(paths::archive_path(&root));
        let allocator = IdAllocator::new(paths::ids_path(&root));
        Self {
            root,
            config,
            store,
            archive,
            allocator,
        }
    }

    /// Seed allocator counters from active and archived ids when the counter
    /// file is missing. Counters are the source afterwards, so retired ids
    /// stay retired.
    fn seed_allocator(&self) -> Result<(), EngineError> {
        if paths::ids_path(&self.root).exists() {
            return Ok(());
        }
        let (items, _) = self.store.scan_tolerant()?;
        let mut ids: Vec<ItemId> = items.iter().map(|item| item.id).collect();
        ids.extend(self.archive.ids()?);
        self.allocator.seed_if_missing(&counters_from_ids(ids))?;
        Ok(())
    }

    fn lock(&self) -> Result<EngineLock, EngineError> {
        Ok(EngineLock::acquire(
            &paths::lock_path(&self.root),
            self.config.lock.timeout(),
        )?)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Create / read / update
    // -----------------------------------------------------------------------

    /// Create a new item from `draft`: allocate an id, validate, check
    /// references and acyclicity, then commit both views.
    pub fn create(&self, draft: &ItemDraft) -> Result<ItemId, EngineError> {
        let _guard = self.lock()?;
        let items = self.store.list()?;

        for dep in &draft.dependencies {
            if !items.iter().any(|item| item.id == *dep) {
                return Err(EngineError::UnknownDependency(*dep));
            }
        }
        if let Some(parent) = draft.parent {
            if !parent.is_top_level() || !items.iter().any(|item| item.id == parent) {
                return Err(EngineError::UnknownParent(parent));
            }
        }
        if let Some(name) = &draft.feature_ref {
            if !self.store.feature_exists(name) {
                return Err(EngineError::UnknownFeature(name.clone()));
            }
        }

        let id = match draft.parent {
            Some(parent) => self.allocator.next_child(parent)?,
            None => self.allocator.next_top_level()?,
        };

        let now = now_utc();
        let mut item = WorkItem::new(id, draft.title.clone(), draft.kind, now);
        item.priority = draft.priority;
        item.subsystems = draft.subsystems.clone();
        item.dependencies = draft.dependencies.clone();
        item.feature_ref = draft.feature_ref.clone();
        item.context_note = draft.context_note.clone();
        item.effort = draft.effort;
        item.bug = draft.bug.clone();
        item.body = draft.body.clone();

        let errors = validate::validate(&item);
        if !errors.is_empty() {
            return Err(EngineError::Validation { id, errors });
        }

        // Simulate the new edges against the existing graph before anything
        // is written.
        let mut graph = DepGraph::from_items(&items);
        graph.add_node(id);
        for dep in &item.dependencies {
            graph.add_edge(id, *dep)?;
        }
        if let Some(parent) = item.parent_id {
            graph.add_edge(parent, id)?;
        }

        self.store.commit(&item, None)?;
        info!(id = %id, kind = %item.kind, "item created");
        Ok(id)
    }

    /// Load one item with its revision token.
    pub fn get(&self, id: ItemId) -> Result<(WorkItem, Revision), EngineError> {
        match self.store.load(id) {
            Ok(loaded) => Ok(loaded),
            Err(StoreError::NotFound(_)) => Err(EngineError::UnknownItem(id)),
            Err(other) => Err(other.into()),
        }
    }

    /// Apply a field patch against the revision the caller read.
    ///
    /// A patch that changes nothing returns `base` unchanged without
    /// rewriting anything. Status is not patchable; see [`Engine::transition`].
    pub fn update(
        &self,
        id: ItemId,
        patch: &ItemPatch,
        base: Revision,
    ) -> Result<Revision, EngineError> {
        let _guard = self.lock()?;
        let (mut item, current) = self.get(id)?;
        if current != base {
            // Surface the conflict through the store's error type.
            return Err(StoreError::Conflict(crate::store::ConflictError {
                id,
                expected: base.stamp(),
                found: current.stamp(),
            })
            .into());
        }

        let before = item.clone();
        apply_patch(&mut item, patch);
        if item == before {
            return Ok(base);
        }

        if let Some(name) = &item.feature_ref {
            if !self.store.feature_exists(name) {
                return Err(EngineError::UnknownFeature(name.clone()));
            }
        }

        let items = self.store.list()?;
        if item.dependencies != before.dependencies {
            for dep in &item.dependencies {
                if !items.iter().any(|other| other.id == *dep) {
                    return Err(EngineError::UnknownDependency(*dep));
                }
            }
            // Rebuild the graph with this item's edges replaced and simulate.
            let others = items.iter().filter(|other| other.id != id);
            let mut graph = DepGraph::from_items(others);
            graph.add_node(id);
            for dep in &item.dependencies {
                graph.add_edge(id, *dep)?;
            }
            if let Some(parent) = item.parent_id {
                graph.add_edge(parent, id)?;
            }
        }

        item.updated_at = bump_stamp(before.updated_at, now_utc());
        let errors = validate::validate(&item);
        if !errors.is_empty() {
            return Err(EngineError::Validation { id, errors });
        }

        let revision = self.store.commit(&item, Some(base))?;
        info!(id = %id, "item updated");
        Ok(revision)
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Transition an item's status, enforcing the transition table plus the
    /// dependency and child gates.
    pub fn transition(
        &self,
        id: ItemId,
        to: Status,
        base: Revision,
    ) -> Result<Revision, EngineError> {
        let _guard = self.lock()?;
        let (mut item, current) = self.get(id)?;
        if current != base {
            return Err(StoreError::Conflict(crate::store::ConflictError {
                id,
                expected: base.stamp(),
                found: current.stamp(),
            })
            .into());
        }

        item.status.can_transition_to(to)?;

        let items = self.store.list()?;
        if to == Status::InProgress {
            // Dependencies must have finished, one way or another, before
            // work starts. A failed dependency keeps blocking until it is
            // archived or cancelled.
            let blocking = self.unsatisfied_deps(&item, &items, |status| {
                matches!(status, Status::Completed | Status::Cancelled)
            });
            if !blocking.is_empty() {
                return Err(EngineError::DependencyNotSatisfied { id, to, blocking });
            }
        }
        if to == Status::Completed {
            let blocking =
                self.unsatisfied_deps(&item, &items, |status| status == Status::Completed);
            if !blocking.is_empty() {
                return Err(EngineError::DependencyNotSatisfied { id, to, blocking });
            }

            let open: Vec<ItemId> = items
                .iter()
                .filter(|other| other.parent_id == Some(id))
                .filter(|child| {
                    !matches!(child.status, Status::Completed | Status::Cancelled)
                })
                .map(|child| child.id)
                .collect();
            if !open.is_empty() {
                return Err(EngineError::ChildrenBlocking { id, children: open });
            }
        }

        let from = item.status;
        item.status = to;
        item.updated_at = bump_stamp(item.updated_at, now_utc());
        let revision = self.store.commit(&item, Some(base))?;
        info!(id = %id, %from, %to, "status transition");
        Ok(revision)
    }

    /// Dependencies of `item` whose status fails `satisfied`. A dependency
    /// with no active record is also unsatisfied unless it was archived,
    /// which removes the edge at archival time.
    fn unsatisfied_deps(
        &self,
        item: &WorkItem,
        items: &[WorkItem],
        satisfied: impl Fn(Status) -> bool,
    ) -> Vec<ItemId> {
        item.dependencies
            .iter()
            .filter(|dep| {
                match items.iter().find(|other| other.id == **dep) {
                    Some(dep_item) => !satisfied(dep_item.status),
                    // Dangling references block; repair or an update fixes
                    // the record.
                    None => true,
                }
            })
            .copied()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Decomposition
    // -----------------------------------------------------------------------

    /// Assess an item and build a decomposition proposal. Read-only: nothing
    /// changes until [`Engine::confirm_decompose`].
    pub fn decompose(
        &self,
        id: ItemId,
    ) -> Result<(ComplexityReport, DecompositionProposal), EngineError> {
        let (item, _) = self.get(id)?;
        let report = assess::assess(&item, &self.config.complexity);
        let proposal = assess::propose(&item);
        Ok((report, proposal))
    }

    /// Create the children of a confirmed proposal and re-validate the
    /// parent. Children are `task` items inheriting priority, feature and a
    /// disjoint subsystem subset from their drafts.
    pub fn confirm_decompose(
        &self,
        id: ItemId,
        proposal: &DecompositionProposal,
    ) -> Result<Vec<ItemId>, EngineError> {
        let _guard = self.lock()?;
        let (parent, _) = self.get(id)?;

        if proposal.parent != id {
            return Err(EngineError::ProposalMismatch {
                id,
                proposal: proposal.parent,
            });
        }
        if parent.status.is_terminal() {
            return Err(EngineError::DecomposeTerminal {
                id,
                status: parent.status,
            });
        }
        if proposal.children.is_empty() {
            return Err(EngineError::EmptyProposal(id));
        }
        if !proposal.subsystems_are_disjoint(&parent.subsystems) {
            return Err(EngineError::ProposalNotDisjoint(id));
        }

        let now = now_utc();
        let mut created = Vec::with_capacity(proposal.children.len());
        for draft in &proposal.children {
            let child_id = self.allocator.next_child(id)?;
            let mut child = WorkItem::new(child_id, draft.title.clone(), Kind::Task, now);
            child.priority = draft.priority;
            child.subsystems = draft.subsystems.clone();
            child.feature_ref = draft.feature_ref.clone();
            child.context_note = draft.context_note.clone();

            let errors = validate::validate(&child);
            if !errors.is_empty() {
                return Err(EngineError::Validation {
                    id: child_id,
                    errors,
                });
            }
            self.store.commit(&child, None)?;
            created.push(child_id);
        }

        // Re-validate the parent: children exist, graph still acyclic.
        let items = self.store.list()?;
        for child_id in &created {
            if !items.iter().any(|item| item.id == *child_id) {
                return Err(EngineError::UnknownItem(*child_id));
            }
        }
        DepGraph::from_items(&items).topo_order()?;

        info!(parent = %id, children = created.len(), "decomposition confirmed");
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Archival
    // -----------------------------------------------------------------------

    /// Move a terminal item into the historical store. One-way: the id is
    /// never reused. Archiving removes the item's edge from every remaining
    /// dependency set, which is also the explicit unblock path for
    /// dependents of a failed item.
    pub fn archive(&self, id: ItemId) -> Result<(), EngineError> {
        let _guard = self.lock()?;
        let (item, _) = self.get(id)?;

        if !item.status.is_terminal() {
            return Err(EngineError::NotTerminal {
                id,
                status: item.status,
            });
        }

        let items = self.store.list()?;
        let children: Vec<ItemId> = items
            .iter()
            .filter(|other| other.parent_id == Some(id))
            .map(|child| child.id)
            .collect();
        if !children.is_empty() {
            return Err(EngineError::ChildrenBlocking { id, children });
        }

        // Preserve first, then drop from the active set.
        self.archive.append(&item, now_utc())?;
        self.store.remove(id)?;

        for other in items {
            if other.id != id && other.dependencies.contains(&id) {
                let mut updated = other.clone();
                updated.dependencies.remove(&id);
                updated.updated_at = bump_stamp(updated.updated_at, now_utc());
                self.store.commit(&updated, Some(Revision::of(&other)))?;
                info!(dependent = %updated.id, archived = %id, "dropped archived dependency");
            }
        }

        info!(id = %id, "item archived");
        Ok(())
    }

    /// Precedent lookup over the archive.
    pub fn lookup_archive(&self, query: &ArchiveQuery) -> Result<Vec<ArchivedItem>, EngineError> {
        Ok(self.archive.lookup(query)?)
    }

    // -----------------------------------------------------------------------
    // Query / repair
    // -----------------------------------------------------------------------

    /// Active items matching `filter`, in id order.
    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<WorkItem>, EngineError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect())
    }

    /// Regenerate the summary from the records. The sole recovery path when
    /// the two views diverge.
    pub fn repair(&self) -> Result<RepairReport, EngineError> {
        let _guard = self.lock()?;
        let report = self.store.repair()?;
        if !report.was_consistent() {
            warn!(
                code = %ErrorCode::SummaryDiverged,
                stale = report.diff.stale.len(),
                missing = report.diff.missing.len(),
                foreign = report.diff.foreign.len(),
                unreadable = report.unreadable_records.len(),
                "summary had diverged from the records"
            );
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Features
    // -----------------------------------------------------------------------

    /// Create a feature record. Names are unique and slug-shaped.
    pub fn create_feature(&self, feature: &Feature) -> Result<(), EngineError> {
        let _guard = self.lock()?;
        if !feature::is_valid_name(&feature.name) {
            return Err(EngineError::InvalidFeatureName(feature.name.clone()));
        }
        if self.store.feature_exists(&feature.name) {
            return Err(EngineError::FeatureExists(feature.name.clone()));
        }
        self.store.save_feature(feature)?;
        info!(name = %feature.name, "feature created");
        Ok(())
    }

    pub fn get_feature(&self, name: &str) -> Result<Feature, EngineError> {
        match self.store.load_feature(name) {
            Ok(feature) => Ok(feature),
            Err(StoreError::FeatureNotFound(_)) => {
                Err(EngineError::UnknownFeature(name.to_string()))
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn list_features(&self) -> Result<Vec<Feature>, EngineError> {
        Ok(self.store.list_features()?)
    }

    /// Active items linked to a feature, derived by scanning `feature_ref`.
    pub fn feature_items(&self, name: &str) -> Result<Vec<WorkItem>, EngineError> {
        let feature = self.get_feature(name)?;
        let items = self.store.list()?;
        Ok(feature::linked_items(&feature, &items)
            .into_iter()
            .cloned()
            .collect())
    }

    // -----------------------------------------------------------------------
    // Raw record access
    // -----------------------------------------------------------------------

    /// Decode a raw record without touching the store. Collaborators that
    /// receive records out-of-band go through the same strict codec.
    pub fn decode_record(raw: &str) -> Result<WorkItem, record::DecodeError> {
        record::decode(raw)
    }

    /// Encode an item to its record form.
    #[must_use]
    pub fn encode_record(item: &WorkItem) -> String {
        record::encode(item)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn apply_patch(item: &mut WorkItem, patch: &ItemPatch) {
    if let Some(title) = &patch.title {
        item.title = title.clone();
    }
    if let Some(priority) = patch.priority {
        item.priority = priority;
    }
    if let Some(subsystems) = &patch.subsystems {
        item.subsystems = subsystems.clone();
    }
    if let Some(dependencies) = &patch.dependencies {
        item.dependencies = dependencies.clone();
    }
    if let Some(feature_ref) = &patch.feature_ref {
        item.feature_ref = feature_ref.clone();
    }
    if let Some(context_note) = &patch.context_note {
        item.context_note = context_note.clone();
    }
    if let Some(effort) = patch.effort {
        item.effort = effort;
    }
    if let Some(bug) = &patch.bug {
        item.bug = bug.clone();
    }
    if let Some(body) = &patch.body {
        item.body = body.clone();
    }
}

/// Next updated stamp: wall clock, nudged forward when the clock has not
/// advanced past the previous stamp so the revision always changes.
fn bump_stamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
