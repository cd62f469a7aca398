use crate::model::item::WorkItem;
use serde::{Deserialize, Serialize};

/// A named feature that work items link to through `feature_ref`.
///
/// Linked items are never stored on the feature; they are derived by scanning
/// the active item set (see [`linked_items`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Unique name, used as the record file name. Kept slug-shaped so it is
    /// safe as a path component.
    pub name: String,
    pub description: String,
    /// Ordered requirement list.
    pub requirements: Vec<String>,
}

impl Feature {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            requirements: Vec::new(),
        }
    }
}

/// Returns `true` if `name` is a valid feature name: non-empty, lowercase
/// ASCII alphanumerics with `-` or `_` separators.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Items whose `feature_ref` names this feature, in id order.
pub fn linked_items<'a>(feature: &Feature, items: &'a [WorkItem]) -> Vec<&'a WorkItem> {
    items
        .iter()
        .filter(|item| item.feature_ref.as_deref() == Some(feature.name.as_str()))
        .collect()
}
