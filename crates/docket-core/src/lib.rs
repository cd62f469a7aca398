#![forbid(unsafe_code)]
//! docket-core: a file-backed work-item lifecycle engine.
//!
//! Plain-text records under `.docket/items/` are the single source of truth;
//! a derived summary list, a dependency graph and an append-only archive are
//! all projections of them. The [`engine::Engine`] facade ties together the
//! record codec, schema validation, identifier allocation, cycle detection,
//! the status state machine, complexity-triggered decomposition and the
//! summary synchronization/repair logic.
//!
//! # Conventions
//!
//! - **Errors**: typed per-module errors aggregated into
//!   [`error::EngineError`], each mapping to a stable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`) at
//!   state-changing seams; no subscriber is installed by the library.

pub mod alloc;
pub mod archive;
pub mod assess;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lock;
pub mod model;
pub mod paths;
pub mod record;
pub mod store;
pub mod summary;
pub mod validate;

pub use engine::{Engine, ItemDraft, ItemPatch, QueryFilter};
pub use error::{EngineError, ErrorCode};
pub use model::{
    BugExtension, BugSource, EffortEstimate, Feature, ItemId, Kind, Priority, Severity, Status,
    WorkItem,
};
pub use store::{RepairReport, Revision};
