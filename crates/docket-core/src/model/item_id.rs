//! Composite work-item identifiers.
//!
//! Top-level items carry a bare integer id (`"42"`). Sub-items carry a dotted
//! composite id (`"42.1"`) naming their position under the parent. Internally
//! an id is always the structured pair `(parent, child)`; the dotted string
//! form exists only at the I/O boundary.
//!
//! Ids are ordered: all top-level ids sort before their children, children
//! sort by suffix. That ordering is what makes serialized id sets canonical.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A work-item identifier: a top-level integer or a dotted composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId {
    parent: u32,
    child: Option<u32>,
}

impl ItemId {
    /// A top-level id (`"42"`).
    #[must_use]
    pub const fn top(n: u32) -> Self {
        Self {
            parent: n,
            child: None,
        }
    }

    /// A composite sub-item id (`"42.1"`).
    #[must_use]
    pub const fn child_of(parent: u32, n: u32) -> Self {
        Self {
            parent,
            child: Some(n),
        }
    }

    /// Returns `true` for a bare integer id.
    #[must_use]
    pub const fn is_top_level(self) -> bool {
        self.child.is_none()
    }

    /// The top-level integer component.
    #[must_use]
    pub const fn top_component(self) -> u32 {
        self.parent
    }

    /// The child suffix, if this is a composite id.
    #[must_use]
    pub const fn child_component(self) -> Option<u32> {
        self.child
    }

    /// The parent id of a composite id; `None` for top-level ids.
    #[must_use]
    pub const fn parent_id(self) -> Option<Self> {
        match self.child {
            Some(_) => Some(Self::top(self.parent)),
            None => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.child {
            Some(n) => write!(f, "{}.{}", self.parent, n),
            None => write!(f, "{}", self.parent),
        }
    }
}

/// Error returned when parsing an id from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub got: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item id: '{}'", self.got)
    }
}

impl std::error::Error for ParseIdError {}

fn parse_component(s: &str, original: &str) -> Result<u32, ParseIdError> {
    // Reject empty, signs, leading zeros and zero itself; ids start at 1.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || s.starts_with('0') {
        return Err(ParseIdError {
            got: original.to_string(),
        });
    }
    s.parse::<u32>().map_err(|_| ParseIdError {
        got: original.to_string(),
    })
}

impl FromStr for ItemId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once('.') {
            None => Ok(Self::top(parse_component(trimmed, s)?)),
            Some((parent, child)) => {
                if child.contains('.') {
                    // Only one nesting level exists.
                    return Err(ParseIdError { got: s.to_string() });
                }
                Ok(Self::child_of(
                    parse_component(parent, s)?,
                    parse_component(child, s)?,
                ))
            }
        }
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
