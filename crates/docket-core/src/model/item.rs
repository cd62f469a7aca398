use crate::model::item_id::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

/// The seven kinds of work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Feature,
    Bug,
    Task,
    Refactor,
    Documentation,
    Testing,
    Infrastructure,
}

impl Kind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Task => "task",
            Self::Refactor => "refactor",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
            Self::Infrastructure => "infrastructure",
        }
    }
}

/// The six lifecycle statuses.
///
/// `Completed`, `Failed` and `Cancelled` are terminal: no transition leads
/// out of them. Archival removes an item from the active set; it is not a
/// status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Cancelled,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` if no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The fixed-width summary glyph for this status.
    ///
    /// Exactly four tokens exist: all three terminal statuses render as
    /// `[x]`.
    #[must_use]
    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[~]",
            Self::Blocked => "[!]",
            Self::Completed | Self::Failed | Self::Cancelled => "[x]",
        }
    }

    /// Validate whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `pending -> in-progress | blocked | cancelled`
    /// - `in-progress -> completed | failed | blocked | cancelled`
    /// - `blocked -> pending | in-progress | cancelled`
    /// - `completed | failed | cancelled -> (none)`
    ///
    /// Contextual gates (dependencies satisfied, children terminal) are the
    /// engine's job; this table is purely structural.
    pub const fn can_transition_to(self, target: Status) -> Result<(), StateError> {
        let allowed = matches!(
            (self, target),
            (Self::Pending, Self::InProgress | Self::Blocked | Self::Cancelled)
                | (
                    Self::InProgress,
                    Self::Completed | Self::Failed | Self::Blocked | Self::Cancelled
                )
                | (Self::Blocked, Self::Pending | Self::InProgress | Self::Cancelled)
        );

        if allowed {
            Ok(())
        } else {
            Err(StateError {
                from: self,
                to: target,
            })
        }
    }
}

/// The four priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Bug severity, distinct from scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Where a bug report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugSource {
    UserReported,
    Development,
    Testing,
    Production,
}

impl BugSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::UserReported => "user_reported",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

/// Extra fields carried by `kind = bug` items. Created and destroyed
/// atomically with the owning item; all five fields are required together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugExtension {
    pub severity: Severity,
    pub source: BugSource,
    pub reproduction: String,
    pub expected: String,
    pub actual: String,
}

/// An effort estimate, normalized to whole days.
///
/// Parsed from `"3 days"` / `"2 weeks"` / `"6 hours"` style text; hours round
/// up to one day. The canonical rendering uses weeks when the count divides
/// evenly, so `decode(encode(_))` is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortEstimate {
    days: u32,
}

impl EffortEstimate {
    /// An estimate of `days` whole days. Zero-day estimates are meaningless
    /// and clamp to one.
    #[must_use]
    pub const fn from_days(days: u32) -> Self {
        Self {
            days: if days == 0 { 1 } else { days },
        }
    }

    #[must_use]
    pub const fn days(self) -> u32 {
        self.days
    }

    /// The complexity threshold predicate: strictly more than one week.
    #[must_use]
    pub const fn exceeds_days(self, limit: u32) -> bool {
        self.days > limit
    }
}

impl fmt::Display for EffortEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days >= 7 && self.days % 7 == 0 {
            let weeks = self.days / 7;
            write!(f, "{} week{}", weeks, if weeks == 1 { "" } else { "s" })
        } else {
            write!(f, "{} day{}", self.days, if self.days == 1 { "" } else { "s" })
        }
    }
}

impl FromStr for EffortEstimate {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEnumError {
            expected: "effort",
            got: s.to_string(),
        };
        let normalized = normalize(s);
        let (amount, unit) = normalized.split_once(' ').ok_or_else(err)?;
        let amount: u32 = amount.parse().map_err(|_| err())?;
        if amount == 0 {
            return Err(err());
        }
        let days = match unit {
            "day" | "days" => amount,
            "week" | "weeks" => amount.saturating_mul(7),
            // Partial days round up.
            "hour" | "hours" => amount.div_ceil(24).max(1),
            _ => return Err(err()),
        };
        Ok(Self::from_days(days))
    }
}

/// The atomic unit of trackable work.
///
/// Field invariants beyond construction (title length, bug extension
/// presence, id shape vs parent) are checked by [`crate::validate`]; set
/// fields use `BTreeSet` so the encoded form is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    pub kind: Kind,
    pub subsystems: BTreeSet<String>,
    pub dependencies: BTreeSet<ItemId>,
    pub parent_id: Option<ItemId>,
    pub feature_ref: Option<String>,
    pub context_note: String,
    pub effort: Option<EffortEstimate>,
    pub bug: Option<BugExtension>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: String,
}

impl WorkItem {
    /// A fresh pending item with the given identity fields.
    #[must_use]
    pub fn new(id: ItemId, title: impl Into<String>, kind: Kind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            status: Status::Pending,
            priority: Priority::Medium,
            kind,
            subsystems: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            parent_id: id.parent_id(),
            feature_ref: None,
            context_note: String::new(),
            effort: None,
            bug: None,
            created_at: now,
            updated_at: now,
            body: String::new(),
        }
    }
}

/// Error returned when a status transition is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateError {
    pub from: Status,
    pub to: Status,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal status transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for StateError {}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BugSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for Kind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "task" => Ok(Self::Task),
            "refactor" => Ok(Self::Refactor),
            "documentation" => Ok(Self::Documentation),
            "testing" => Ok(Self::Testing),
            "infrastructure" => Ok(Self::Infrastructure),
            _ => Err(ParseEnumError {
                expected: "kind",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParseEnumError {
                expected: "severity",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for BugSource {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "user_reported" => Ok(Self::UserReported),
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            _ => Err(ParseEnumError {
                expected: "source",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BugSource, EffortEstimate, Kind, Priority, StateError, Status, WorkItem,
    };
    use crate::model::item_id::ItemId;
    use chrono::Utc;
    use std::str::FromStr;

    #[test]
    fn display_parse_roundtrips() {
        for value in [
            Kind::Feature,
            Kind::Bug,
            Kind::Task,
            Kind::Refactor,
            Kind::Documentation,
            Kind::Testing,
            Kind::Infrastructure,
        ] {
            assert_eq!(Kind::from_str(&value.to_string()).unwrap(), value);
        }

        for value in [
            Status::Pending,
            Status::InProgress,
            Status::Completed,
            Status::Failed,
            Status::Blocked,
            Status::Cancelled,
        ] {
            assert_eq!(Status::from_str(&value.to_string()).unwrap(), value);
        }

        for value in [
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ] {
            assert_eq!(Priority::from_str(&value.to_string()).unwrap(), value);
        }

        for value in [
            BugSource::UserReported,
            BugSource::Development,
            BugSource::Testing,
            BugSource::Production,
        ] {
            assert_eq!(BugSource::from_str(&value.to_string()).unwrap(), value);
        }
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert!(Kind::from_str("epic").is_err());
        assert!(Status::from_str("done").is_err());
        assert!(Priority::from_str("urgent").is_err());
        assert!(BugSource::from_str("qa").is_err());
    }

    #[test]
    fn status_transition_table() {
        use Status::{Blocked, Cancelled, Completed, Failed, InProgress, Pending};

        assert!(Pending.can_transition_to(InProgress).is_ok());
        assert!(Pending.can_transition_to(Blocked).is_ok());
        assert!(Pending.can_transition_to(Cancelled).is_ok());
        assert!(InProgress.can_transition_to(Completed).is_ok());
        assert!(InProgress.can_transition_to(Failed).is_ok());
        assert!(InProgress.can_transition_to(Blocked).is_ok());
        assert!(InProgress.can_transition_to(Cancelled).is_ok());
        assert!(Blocked.can_transition_to(Pending).is_ok());
        assert!(Blocked.can_transition_to(InProgress).is_ok());
        assert!(Blocked.can_transition_to(Cancelled).is_ok());

        // Skipping in-progress is not allowed.
        assert!(matches!(
            Pending.can_transition_to(Completed),
            Err(StateError {
                from: Pending,
                to: Completed,
            })
        ));
        assert!(Pending.can_transition_to(Failed).is_err());
        assert!(Blocked.can_transition_to(Completed).is_err());

        // Terminal statuses never transition, including to themselves.
        for terminal in [Completed, Failed, Cancelled] {
            for target in [Pending, InProgress, Completed, Failed, Blocked, Cancelled] {
                assert!(
                    terminal.can_transition_to(target).is_err(),
                    "{terminal} -> {target} should be rejected"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Cancelled.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::InProgress.is_terminal());
        assert!(!Status::Blocked.is_terminal());
    }

    #[test]
    fn exactly_four_glyph_tokens() {
        let glyphs: std::collections::BTreeSet<&str> = [
            Status::Pending,
            Status::InProgress,
            Status::Completed,
            Status::Failed,
            Status::Blocked,
            Status::Cancelled,
        ]
        .iter()
        .map(|s| s.glyph())
        .collect();
        assert_eq!(glyphs.len(), 4);
        // Fixed width: every token is exactly three bytes.
        assert!(glyphs.iter().all(|g| g.len() == 3));
    }

    #[test]
    fn effort_parse_and_display() {
        assert_eq!(EffortEstimate::from_str("3 days").unwrap().days(), 3);
        assert_eq!(EffortEstimate::from_str("1 week").unwrap().days(), 7);
        assert_eq!(EffortEstimate::from_str("2 weeks").unwrap().days(), 14);
        assert_eq!(EffortEstimate::from_str("6 hours").unwrap().days(), 1);
        assert_eq!(EffortEstimate::from_str("36 hours").unwrap().days(), 2);

        assert_eq!(EffortEstimate::from_days(1).to_string(), "1 day");
        assert_eq!(EffortEstimate::from_days(3).to_string(), "3 days");
        assert_eq!(EffortEstimate::from_days(7).to_string(), "1 week");
        assert_eq!(EffortEstimate::from_days(14).to_string(), "2 weeks");
        assert_eq!(EffortEstimate::from_days(10).to_string(), "10 days");
    }

    #[test]
    fn effort_display_parse_is_stable() {
        for days in [1, 2, 6, 7, 8, 13, 14, 21, 30] {
            let effort = EffortEstimate::from_days(days);
            let reparsed = EffortEstimate::from_str(&effort.to_string()).unwrap();
            assert_eq!(effort, reparsed);
        }
    }

    #[test]
    fn effort_rejects_malformed() {
        for raw in ["", "week", "2", "0 days", "two weeks", "3 months"] {
            assert!(EffortEstimate::from_str(raw).is_err(), "accepted '{raw}'");
        }
    }

    #[test]
    fn effort_threshold() {
        assert!(!EffortEstimate::from_days(7).exceeds_days(7));
        assert!(EffortEstimate::from_days(8).exceeds_days(7));
    }

    #[test]
    fn new_item_derives_parent_from_id() {
        let now = Utc::now();
        let top = WorkItem::new(ItemId::top(1), "Top-level item", Kind::Task, now);
        assert_eq!(top.parent_id, None);
        assert_eq!(top.status, Status::Pending);

        let child = WorkItem::new(ItemId::child_of(1, 2), "A sub-item", Kind::Task, now);
        assert_eq!(child.parent_id, Some(ItemId::top(1)));
    }
}
