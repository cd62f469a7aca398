use crate::alloc::AllocError;
use crate::archive::ArchiveError;
use crate::graph::CycleError;
use crate::lock::LockError;
use crate::model::item::{StateError, Status};
use crate::model::item_id::ItemId;
use crate::store::StoreError;
use crate::validate::FieldError;
use std::fmt;
use std::path::PathBuf;

/// Machine-readable error codes for operator- and agent-friendly handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ItemNotFound,
    InvalidStateTransition,
    CycleDetected,
    UnknownReference,
    ValidationFailed,
    DependencyNotSatisfied,
    ChildrenBlocking,
    NotTerminalStatus,
    DuplicateFeature,
    InvalidProposal,
    SummaryDiverged,
    RecordDecodeFailed,
    StaleRevision,
    StorageFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ItemNotFound => "E2001",
            Self::InvalidStateTransition => "E2002",
            Self::CycleDetected => "E2003",
            Self::UnknownReference => "E2004",
            Self::ValidationFailed => "E2005",
            Self::DependencyNotSatisfied => "E2006",
            Self::ChildrenBlocking => "E2007",
            Self::NotTerminalStatus => "E2008",
            Self::DuplicateFeature => "E2009",
            Self::InvalidProposal => "E2010",
            Self::SummaryDiverged => "E3001",
            Self::RecordDecodeFailed => "E3002",
            Self::StaleRevision => "E4001",
            Self::StorageFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ItemNotFound => "Item not found",
            Self::InvalidStateTransition => "Invalid status transition",
            Self::CycleDetected => "Cycle would be created",
            Self::UnknownReference => "Unknown dependency, parent or feature",
            Self::ValidationFailed => "Schema validation failed",
            Self::DependencyNotSatisfied => "Dependencies not satisfied",
            Self::ChildrenBlocking => "Children block this operation",
            Self::NotTerminalStatus => "Status is not terminal",
            Self::DuplicateFeature => "Feature already exists",
            Self::InvalidProposal => "Decomposition proposal is invalid",
            Self::SummaryDiverged => "Summary diverged from records",
            Self::RecordDecodeFailed => "Record failed to decode",
            Self::StaleRevision => "Stale revision",
            Self::StorageFailed => "Storage operation failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Initialize the project before using the engine."),
            Self::ConfigParseError => Some("Fix syntax in .docket/config.toml and retry."),
            Self::ItemNotFound => None,
            Self::InvalidStateTransition => {
                Some("Follow valid transitions: pending -> in-progress -> completed.")
            }
            Self::CycleDetected => Some("Adjust dependency links to keep the graph acyclic."),
            Self::UnknownReference => Some("Create the referenced item or feature first."),
            Self::ValidationFailed => Some("Fix every reported field and retry."),
            Self::DependencyNotSatisfied => {
                Some("Complete the blocking dependencies first, or archive a failed one.")
            }
            Self::ChildrenBlocking => Some("Resolve or archive the children first."),
            Self::NotTerminalStatus => {
                Some("Only completed, failed or cancelled items can be archived.")
            }
            Self::DuplicateFeature => Some("Pick a different feature name."),
            Self::InvalidProposal => Some("Regenerate the proposal from the current item."),
            Self::SummaryDiverged => Some("Run repair to regenerate the summary."),
            Self::RecordDecodeFailed => Some("Fix or restore the named record file."),
            Self::StaleRevision => Some("Re-read the item and retry the write."),
            Self::StorageFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

fn fmt_ids(ids: &[ItemId]) -> String {
    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    rendered.join(", ")
}

fn fmt_fields(errors: &[FieldError]) -> String {
    let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
    rendered.join("; ")
}

/// The engine facade's error type, aggregating every module's failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("project not initialized at {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("configuration error: {0}")]
    Config(anyhow::Error),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("unknown dependency {0}")]
    UnknownDependency(ItemId),

    #[error("unknown parent {0}")]
    UnknownParent(ItemId),

    #[error("unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("feature '{0}' already exists")]
    FeatureExists(String),

    #[error("invalid feature name '{0}'")]
    InvalidFeatureName(String),

    #[error("validation failed for {id}: {}", fmt_fields(.errors))]
    Validation { id: ItemId, errors: Vec<FieldError> },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("cannot move {id} to {to}: unsatisfied dependencies: {}", fmt_ids(.blocking))]
    DependencyNotSatisfied {
        id: ItemId,
        to: Status,
        blocking: Vec<ItemId>,
    },

    #[error("children of {id} block the operation: {}", fmt_ids(.children))]
    ChildrenBlocking { id: ItemId, children: Vec<ItemId> },

    #[error("cannot archive {id}: status {status} is not terminal")]
    NotTerminal { id: ItemId, status: Status },

    #[error("cannot decompose {id}: status {status} is terminal")]
    DecomposeTerminal { id: ItemId, status: Status },

    #[error("proposal targets {proposal} but was confirmed against {id}")]
    ProposalMismatch { id: ItemId, proposal: ItemId },

    #[error("proposal for {0} has no children")]
    EmptyProposal(ItemId),

    #[error("proposal subsystems are not a disjoint split of {0}'s")]
    ProposalNotDisjoint(ItemId),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl EngineError {
    /// The machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::UnknownItem(_) => ErrorCode::ItemNotFound,
            Self::UnknownDependency(_)
            | Self::UnknownParent(_)
            | Self::UnknownFeature(_) => ErrorCode::UnknownReference,
            Self::FeatureExists(_) => ErrorCode::DuplicateFeature,
            Self::InvalidFeatureName(_) | Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::State(_) | Self::DecomposeTerminal { .. } => ErrorCode::InvalidStateTransition,
            Self::DependencyNotSatisfied { .. } => ErrorCode::DependencyNotSatisfied,
            Self::ChildrenBlocking { .. } => ErrorCode::ChildrenBlocking,
            Self::NotTerminal { .. } => ErrorCode::NotTerminalStatus,
            Self::ProposalMismatch { .. }
            | Self::EmptyProposal(_)
            | Self::ProposalNotDisjoint(_) => ErrorCode::InvalidProposal,
            Self::Cycle(_) => ErrorCode::CycleDetected,
            Self::Lock(LockError::Timeout { .. }) => ErrorCode::LockContention,
            Self::Lock(LockError::Io(_)) => ErrorCode::StorageFailed,
            Self::Store(StoreError::NotFound(_) | StoreError::FeatureNotFound(_)) => {
                ErrorCode::ItemNotFound
            }
            Self::Store(StoreError::Decode { .. }) => ErrorCode::RecordDecodeFailed,
            Self::Store(StoreError::Conflict(_)) => ErrorCode::StaleRevision,
            Self::Store(StoreError::Io(_) | StoreError::AlreadyExists(_)) => {
                ErrorCode::StorageFailed
            }
            Self::Alloc(AllocError::NotTopLevel(_)) => ErrorCode::InvalidProposal,
            Self::Alloc(_) | Self::Archive(_) => ErrorCode::StorageFailed,
        }
    }

    /// Optional remediation hint for this error's code.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorCode};
    use crate::model::item_id::ItemId;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 18] = [
        ErrorCode::NotInitialized,
        ErrorCode::ConfigParseError,
        ErrorCode::ItemNotFound,
        ErrorCode::InvalidStateTransition,
        ErrorCode::CycleDetected,
        ErrorCode::UnknownReference,
        ErrorCode::ValidationFailed,
        ErrorCode::DependencyNotSatisfied,
        ErrorCode::ChildrenBlocking,
        ErrorCode::NotTerminalStatus,
        ErrorCode::DuplicateFeature,
        ErrorCode::InvalidProposal,
        ErrorCode::SummaryDiverged,
        ErrorCode::RecordDecodeFailed,
        ErrorCode::StaleRevision,
        ErrorCode::StorageFailed,
        ErrorCode::LockContention,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let rendered = code.code();
            assert_eq!(rendered.len(), 5);
            assert!(rendered.starts_with('E'));
            assert!(rendered.chars().skip(1).all(|c| c.is_ascii_digit()));
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn engine_errors_map_to_codes() {
        assert_eq!(
            EngineError::UnknownItem(ItemId::top(1)).code(),
            ErrorCode::ItemNotFound
        );
        assert_eq!(
            EngineError::UnknownDependency(ItemId::top(2)).code(),
            ErrorCode::UnknownReference
        );
        assert_eq!(
            EngineError::EmptyProposal(ItemId::top(3)).code(),
            ErrorCode::InvalidProposal
        );
    }

    #[test]
    fn display_includes_blocking_ids() {
        let err = EngineError::DependencyNotSatisfied {
            id: ItemId::top(1),
            to: crate::model::item::Status::Completed,
            blocking: vec![ItemId::top(2), ItemId::child_of(3, 1)],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("2, 3.1"), "display: {rendered}");
        assert!(err.hint().is_some());
    }
}
