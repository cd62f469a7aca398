//! Pure schema validation for work items.
//!
//! `validate` checks field shapes and cross-field rules and reports every
//! violation at once. It never mutates its input, allocates ids, or touches
//! the filesystem; reference resolution (do dependencies exist, is the parent
//! real) is the engine's job because it needs the active item set.

use crate::model::item::{Kind, WorkItem};

/// Title length bounds, inclusive.
pub const TITLE_MIN: usize = 5;
pub const TITLE_MAX: usize = 100;

/// A single schema violation, batched into the full report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn single_line(value: &str) -> bool {
    !value.contains('\n')
}

/// Validate one work item against the schema rules.
///
/// Returns an empty vector for a valid item; otherwise every violation found,
/// in field order. All checks are local to the item.
#[must_use]
pub fn validate(item: &WorkItem) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut push = |field: &'static str, message: String| {
        errors.push(FieldError { field, message });
    };

    // Id shape vs parent linkage. Composite ids name their parent; top-level
    // ids must not carry one.
    match (item.id.parent_id(), item.parent_id) {
        (Some(expected), Some(actual)) if expected != actual => push(
            "parent",
            format!("composite id {} requires parent {expected}, found {actual}", item.id),
        ),
        (Some(expected), None) => push(
            "parent",
            format!("composite id {} requires parent {expected}", item.id),
        ),
        (None, Some(actual)) => push(
            "parent",
            format!("top-level id {} cannot have a parent (found {actual})", item.id),
        ),
        _ => {}
    }

    let title_chars = item.title.chars().count();
    if !(TITLE_MIN..=TITLE_MAX).contains(&title_chars) {
        push(
            "title",
            format!("length {title_chars} outside [{TITLE_MIN}, {TITLE_MAX}]"),
        );
    }
    if !single_line(&item.title) {
        push("title", "must be a single line".to_string());
    }

    for tag in &item.subsystems {
        if tag.is_empty() || tag.contains(',') || !single_line(tag) {
            push("subsystems", format!("malformed tag '{tag}'"));
        }
    }

    if item.dependencies.contains(&item.id) {
        push("dependencies", "item cannot depend on itself".to_string());
    }

    if !single_line(&item.context_note) {
        push("context", "must be a single line".to_string());
    }

    match (&item.feature_ref, item.kind) {
        // A feature item describes a feature; pointing it at another one is
        // a modeling error.
        (Some(_), Kind::Feature) => {
            push("feature", "a feature item cannot carry a feature reference".to_string());
        }
        (Some(name), _) if !crate::model::feature::is_valid_name(name) => {
            push("feature", format!("malformed feature name '{name}'"));
        }
        _ => {}
    }

    match (&item.bug, item.kind) {
        (None, Kind::Bug) => {
            push(
                "severity",
                "bug items require severity, source, reproduction, expected and actual".to_string(),
            );
        }
        (Some(_), kind) if kind != Kind::Bug => {
            push("severity", format!("bug fields are not allowed on a {kind} item"));
        }
        (Some(bug), Kind::Bug) => {
            for (field, value) in [
                ("reproduction", &bug.reproduction),
                ("expected", &bug.expected),
                ("actual", &bug.actual),
            ] {
                if value.trim().is_empty() {
                    push(field, "must not be empty".to_string());
                } else if !single_line(value) {
                    push(field, "must be a single line".to_string());
                }
            }
        }
        _ => {}
    }

    if item.updated_at < item.created_at {
        push("updated", "updated stamp precedes created stamp".to_string());
    }

    errors
}
