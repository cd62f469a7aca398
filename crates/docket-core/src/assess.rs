//! Complexity assessment and decomposition proposals.
//!
//! The assessor looks at three signals: how many subsystems an item touches,
//! how many dependencies it declares, and its effort estimate. Crossing any
//! threshold flags the item as high-complexity and a decomposition can be
//! proposed. Proposing is pure; nothing is created until the caller confirms
//! through the engine, which is the only place child ids are allocated.

use crate::config::ComplexityThresholds;
use crate::model::item::{Priority, WorkItem};
use crate::model::item_id::ItemId;
use crate::validate::TITLE_MAX;
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// One triggered complexity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexitySignal {
    /// The item touches at least `limit` distinct subsystems.
    SubsystemSpread { count: usize, limit: usize },
    /// The item declares at least `limit` dependencies.
    DependencyFanIn { count: usize, limit: usize },
    /// The effort estimate exceeds `limit_days`.
    EffortAboveLimit { days: u32, limit_days: u32 },
}

impl fmt::Display for ComplexitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubsystemSpread { count, limit } => {
                write!(f, "touches {count} subsystems (limit {limit})")
            }
            Self::DependencyFanIn { count, limit } => {
                write!(f, "declares {count} dependencies (limit {limit})")
            }
            Self::EffortAboveLimit { days, limit_days } => {
                write!(f, "estimated at {days} days (limit {limit_days})")
            }
        }
    }
}

/// The assessor's verdict for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexityReport {
    pub id: ItemId,
    pub subsystem_count: usize,
    pub dependency_count: usize,
    pub effort_days: Option<u32>,
    /// Every threshold that was crossed; empty means the item is fine.
    pub signals: Vec<ComplexitySignal>,
}

impl ComplexityReport {
    #[must_use]
    pub fn is_high_complexity(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// Evaluate the complexity heuristics for one item. Pure.
#[must_use]
pub fn assess(item: &WorkItem, thresholds: &ComplexityThresholds) -> ComplexityReport {
    let subsystem_count = item.subsystems.len();
    let dependency_count = item.dependencies.len();
    let effort_days = item.effort.map(crate::model::item::EffortEstimate::days);

    let mut signals = Vec::new();
    if subsystem_count >= thresholds.subsystem_limit {
        signals.push(ComplexitySignal::SubsystemSpread {
            count: subsystem_count,
            limit: thresholds.subsystem_limit,
        });
    }
    if dependency_count >= thresholds.dependency_limit {
        signals.push(ComplexitySignal::DependencyFanIn {
            count: dependency_count,
            limit: thresholds.dependency_limit,
        });
    }
    if let Some(effort) = item.effort {
        if effort.exceeds_days(thresholds.effort_limit_days) {
            signals.push(ComplexitySignal::EffortAboveLimit {
                days: effort.days(),
                limit_days: thresholds.effort_limit_days,
            });
        }
    }

    ComplexityReport {
        id: item.id,
        subsystem_count,
        dependency_count,
        effort_days,
        signals,
    }
}

// ---------------------------------------------------------------------------
// Decomposition proposals
// ---------------------------------------------------------------------------

/// A proposed child item. Ids are not assigned until the caller confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDraft {
    pub title: String,
    /// A disjoint subset of the parent's subsystems.
    pub subsystems: BTreeSet<String>,
    pub priority: Priority,
    pub feature_ref: Option<String>,
    pub context_note: String,
}

/// A proposed split of one item into children. Holding a proposal changes
/// nothing; it is confirmed or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompositionProposal {
    pub parent: ItemId,
    pub children: Vec<ChildDraft>,
}

impl DecompositionProposal {
    /// Checks that the drafts carry subsystem subsets that are pairwise
    /// disjoint and drawn from `parent_subsystems`.
    #[must_use]
    pub fn subsystems_are_disjoint(&self, parent_subsystems: &BTreeSet<String>) -> bool {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for draft in &self.children {
            for tag in &draft.subsystems {
                if !parent_subsystems.contains(tag) || !seen.insert(tag.as_str()) {
                    return false;
                }
            }
        }
        true
    }
}

fn child_title(parent_title: &str, suffix: &str) -> String {
    let mut title = format!("{parent_title}: {suffix}");
    if title.chars().count() > TITLE_MAX {
        title = title.chars().take(TITLE_MAX).collect();
    }
    title
}

/// Build a decomposition proposal for `item`. Pure; never touches state.
///
/// With two or more subsystems the split is one child per subsystem, each
/// taking exactly that tag. Otherwise (dependency- or effort-triggered) the
/// split is a two-stage groundwork/completion pair. Children inherit the
/// parent's priority and feature reference.
#[must_use]
pub fn propose(item: &WorkItem) -> DecompositionProposal {
    let note = format!("split from {}", item.id);

    let children = if item.subsystems.len() >= 2 {
        item.subsystems
            .iter()
            .map(|tag| ChildDraft {
                title: child_title(&item.title, tag),
                subsystems: BTreeSet::from([tag.clone()]),
                priority: item.priority,
                feature_ref: item.feature_ref.clone(),
                context_note: note.clone(),
            })
            .collect()
    } else {
        // Disjointness still holds: the groundwork stage takes whatever
        // subsystems the parent had, the completion stage takes none.
        ["groundwork", "completion"]
            .iter()
            .enumerate()
            .map(|(idx, stage)| ChildDraft {
                title: child_title(&item.title, stage),
                subsystems: if idx == 0 {
                    item.subsystems.clone()
                } else {
                    BTreeSet::new()
                },
                priority: item.priority,
                feature_ref: item.feature_ref.clone(),
                context_note: note.clone(),
            })
            .collect()
    };

    DecompositionProposal {
        parent: item.id,
        children,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{assess, propose, ComplexitySignal};
    use crate::config::ComplexityThresholds;
    use crate::model::item::{EffortEstimate, Kind, Priority, WorkItem};
    use crate::model::item_id::ItemId;
    use chrono::Utc;

    fn item_with(subsystems: &[&str], dependencies: &[u32]) -> WorkItem {
        let mut item = WorkItem::new(ItemId::top(1), "A busy item", Kind::Task, Utc::now());
        item.subsystems = subsystems.iter().map(ToString::to_string).collect();
        item.dependencies = dependencies.iter().map(|&n| ItemId::top(n)).collect();
        item
    }

    // -----------------------------------------------------------------------
    // assess
    // -----------------------------------------------------------------------

    #[test]
    fn simple_item_is_not_flagged() {
        let report = assess(&item_with(&["auth"], &[2]), &ComplexityThresholds::default());
        assert!(!report.is_high_complexity());
        assert!(report.signals.is_empty());
    }

    #[test]
    fn subsystem_spread_triggers_at_limit() {
        let report = assess(
            &item_with(&["auth", "network", "storage"], &[]),
            &ComplexityThresholds::default(),
        );
        assert!(report.is_high_complexity());
        assert_eq!(
            report.signals,
            vec![ComplexitySignal::SubsystemSpread { count: 3, limit: 3 }]
        );
    }

    #[test]
    fn dependency_fan_in_triggers_at_limit() {
        let report = assess(
            &item_with(&[], &[2, 3, 4, 5, 6]),
            &ComplexityThresholds::default(),
        );
        assert_eq!(
            report.signals,
            vec![ComplexitySignal::DependencyFanIn { count: 5, limit: 5 }]
        );
    }

    #[test]
    fn effort_triggers_only_above_one_week() {
        let mut item = item_with(&[], &[]);
        item.effort = Some(EffortEstimate::from_days(7));
        let report = assess(&item, &ComplexityThresholds::default());
        assert!(!report.is_high_complexity());

        item.effort = Some(EffortEstimate::from_days(8));
        let report = assess(&item, &ComplexityThresholds::default());
        assert_eq!(
            report.signals,
            vec![ComplexitySignal::EffortAboveLimit {
                days: 8,
                limit_days: 7,
            }]
        );
    }

    #[test]
    fn multiple_signals_accumulate() {
        let mut item = item_with(&["a", "b", "c", "d"], &[2, 3, 4, 5, 6, 7]);
        item.effort = Some(EffortEstimate::from_days(14));
        let report = assess(&item, &ComplexityThresholds::default());
        assert_eq!(report.signals.len(), 3);
        assert_eq!(report.subsystem_count, 4);
        assert_eq!(report.dependency_count, 6);
        assert_eq!(report.effort_days, Some(14));
    }

    #[test]
    fn thresholds_are_tunable() {
        let relaxed = ComplexityThresholds {
            subsystem_limit: 10,
            dependency_limit: 10,
            effort_limit_days: 30,
        };
        let mut item = item_with(&["a", "b", "c", "d"], &[2, 3, 4, 5, 6]);
        item.effort = Some(EffortEstimate::from_days(14));
        assert!(!assess(&item, &relaxed).is_high_complexity());
    }

    // -----------------------------------------------------------------------
    // propose
    // -----------------------------------------------------------------------

    #[test]
    fn propose_splits_by_subsystem() {
        let mut item = item_with(&["auth", "network", "storage"], &[]);
        item.priority = Priority::High;
        item.feature_ref = Some("resilience".to_string());

        let proposal = propose(&item);
        assert_eq!(proposal.parent, item.id);
        assert_eq!(proposal.children.len(), 3);
        assert!(proposal.subsystems_are_disjoint(&item.subsystems));
        for draft in &proposal.children {
            assert_eq!(draft.priority, Priority::High);
            assert_eq!(draft.feature_ref.as_deref(), Some("resilience"));
            assert_eq!(draft.subsystems.len(), 1);
        }
    }

    #[test]
    fn propose_falls_back_to_two_stages() {
        let mut item = item_with(&["auth"], &[]);
        item.effort = Some(EffortEstimate::from_days(21));

        let proposal = propose(&item);
        assert_eq!(proposal.children.len(), 2);
        assert!(proposal.children[0].title.ends_with("groundwork"));
        assert!(proposal.children[1].title.ends_with("completion"));
        assert!(proposal.subsystems_are_disjoint(&item.subsystems));
    }

    #[test]
    fn propose_never_mutates_the_item() {
        let item = item_with(&["auth", "network"], &[2]);
        let before = item.clone();
        let _ = propose(&item);
        assert_eq!(item, before);
    }

    #[test]
    fn child_titles_stay_within_bounds() {
        let mut item = item_with(&["auth", "network"], &[]);
        item.title = "t".repeat(100);
        let proposal = propose(&item);
        for draft in &proposal.children {
            assert!(draft.title.chars().count() <= 100);
        }
    }

    #[test]
    fn disjointness_check_rejects_overlap() {
        let item = item_with(&["auth", "network"], &[]);
        let mut proposal = propose(&item);
        proposal.children[1].subsystems = proposal.children[0].subsystems.clone();
        assert!(!proposal.subsystems_are_disjoint(&item.subsystems));
    }

    #[test]
    fn disjointness_check_rejects_foreign_tags() {
        let item = item_with(&["auth", "network"], &[]);
        let mut proposal = propose(&item);
        proposal.children[0]
            .subsystems
            .insert("not-on-parent".to_string());
        assert!(!proposal.subsystems_are_disjoint(&item.subsystems));
    }
}
