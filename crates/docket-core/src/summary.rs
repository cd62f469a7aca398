//! The derived summary list.
//!
//! One line per active item: a fixed-width status glyph, the id, the title.
//! The summary is a pure projection of the detailed records and is never the
//! source of truth; `repair()` regenerates it from scratch whenever the two
//! views diverge. The rendered file starts with a comment header marking it
//! as generated.

use crate::model::item::WorkItem;
use crate::model::item_id::ItemId;
use std::collections::BTreeMap;

/// Header written at the top of every summary file.
pub const SUMMARY_HEADER: &str = "# docket summary v1";

/// The warning line after the header.
pub const DERIVED_COMMENT: &str =
    "# derived from items/ - edits here are overwritten by repair";

/// The four status glyph tokens, in display order.
pub const GLYPHS: [&str; 4] = ["[ ]", "[~]", "[!]", "[x]"];

/// One summary line: the projection of a single work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub id: ItemId,
    pub glyph: &'static str,
    pub title: String,
}

/// Project one item to its summary entry.
#[must_use]
pub fn project(item: &WorkItem) -> SummaryEntry {
    SummaryEntry {
        id: item.id,
        glyph: item.status.glyph(),
        title: item.title.clone(),
    }
}

/// Render the summary file for a set of entries, sorted by id.
#[must_use]
pub fn render(entries: &[SummaryEntry]) -> String {
    let mut sorted: Vec<&SummaryEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.id);

    let mut out = String::new();
    out.push_str(SUMMARY_HEADER);
    out.push('\n');
    out.push_str(DERIVED_COMMENT);
    out.push('\n');
    for entry in sorted {
        out.push_str(&format!("{} {} {}\n", entry.glyph, entry.id, entry.title));
    }
    out
}

/// Errors when reading back a summary file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummaryParseError {
    #[error("summary line {line} is malformed: '{content}'")]
    MalformedLine { line: usize, content: String },
}

/// Parse a summary file back into entries. Comment and blank lines are
/// skipped. Any malformed line is an error; repair treats that as divergence
/// and rewrites the whole file.
pub fn parse(raw: &str) -> Result<Vec<SummaryEntry>, SummaryParseError> {
    let mut entries = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = || SummaryParseError::MalformedLine {
            line: idx + 1,
            content: line.to_string(),
        };

        let glyph = GLYPHS
            .iter()
            .find(|&&g| line.starts_with(g))
            .copied()
            .ok_or_else(malformed)?;
        let rest = line[glyph.len()..].strip_prefix(' ').ok_or_else(malformed)?;
        let (id_raw, title) = rest.split_once(' ').ok_or_else(malformed)?;
        let id: ItemId = id_raw.parse().map_err(|_| malformed())?;

        entries.push(SummaryEntry {
            id,
            glyph,
            title: title.to_string(),
        });
    }
    Ok(entries)
}

/// How a summary file differs from the projection of the records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryDiff {
    /// Present in both views but with a different glyph or title.
    pub stale: Vec<ItemId>,
    /// In the records but absent from the summary.
    pub missing: Vec<ItemId>,
    /// In the summary but matching no record.
    pub foreign: Vec<ItemId>,
}

impl SummaryDiff {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.stale.is_empty() && self.missing.is_empty() && self.foreign.is_empty()
    }
}

/// Compare the expected projection against what a summary file contains.
#[must_use]
pub fn diff(expected: &[SummaryEntry], actual: &[SummaryEntry]) -> SummaryDiff {
    let expected_by_id: BTreeMap<ItemId, &SummaryEntry> =
        expected.iter().map(|e| (e.id, e)).collect();
    let actual_by_id: BTreeMap<ItemId, &SummaryEntry> =
        actual.iter().map(|e| (e.id, e)).collect();

    let mut result = SummaryDiff::default();
    for (id, entry) in &expected_by_id {
        match actual_by_id.get(id) {
            None => result.missing.push(*id),
            Some(found) if *found != *entry => result.stale.push(*id),
            Some(_) => {}
        }
    }
    for id in actual_by_id.keys() {
        if !expected_by_id.contains_key(id) {
            result.foreign.push(*id);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{diff, parse, project, render, SummaryEntry, SummaryParseError};
    use crate::model::item::{Kind, Status, WorkItem};
    use crate::model::item_id::ItemId;
    use chrono::Utc;

    fn entry(id: ItemId, glyph: &'static str, title: &str) -> SummaryEntry {
        SummaryEntry {
            id,
            glyph,
            title: title.to_string(),
        }
    }

    #[test]
    fn projection_tracks_status_glyph() {
        let mut item = WorkItem::new(ItemId::top(3), "Ship the thing", Kind::Task, Utc::now());
        assert_eq!(project(&item).glyph, "[ ]");
        item.status = Status::InProgress;
        assert_eq!(project(&item).glyph, "[~]");
        item.status = Status::Blocked;
        assert_eq!(project(&item).glyph, "[!]");
        item.status = Status::Failed;
        assert_eq!(project(&item).glyph, "[x]");
    }

    #[test]
    fn render_parse_roundtrip() {
        let entries = vec![
            entry(ItemId::top(1), "[x]", "Finished work"),
            entry(ItemId::child_of(1, 1), "[~]", "Child in flight"),
            entry(ItemId::top(2), "[ ]", "Not started"),
        ];
        let rendered = render(&entries);
        let back = parse(&rendered).unwrap();
        // render sorts by id
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].id, ItemId::top(1));
        assert_eq!(back[1].id, ItemId::child_of(1, 1));
        assert_eq!(back[2].id, ItemId::top(2));
    }

    #[test]
    fn render_is_deterministic_regardless_of_input_order() {
        let a = vec![
            entry(ItemId::top(2), "[ ]", "Two"),
            entry(ItemId::top(1), "[ ]", "One"),
        ];
        let b = vec![
            entry(ItemId::top(1), "[ ]", "One"),
            entry(ItemId::top(2), "[ ]", "Two"),
        ];
        assert_eq!(render(&a), render(&b));
    }

    #[test]
    fn rendered_file_is_marked_derived() {
        let rendered = render(&[]);
        assert!(rendered.starts_with(super::SUMMARY_HEADER));
        assert!(rendered.contains(super::DERIVED_COMMENT));
    }

    #[test]
    fn parse_rejects_hand_edited_garbage() {
        let raw = "# docket summary v1\n(*) 1 not a real glyph\n";
        let err = parse(raw).unwrap_err();
        assert!(matches!(err, SummaryParseError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn parse_rejects_missing_title() {
        let raw = "[ ] 1\n";
        assert!(parse(raw).is_err());
    }

    #[test]
    fn titles_keep_internal_spaces() {
        let entries = vec![entry(ItemId::top(1), "[ ]", "title with  double  spaces")];
        let back = parse(&render(&entries)).unwrap();
        assert_eq!(back[0].title, "title with  double  spaces");
    }

    #[test]
    fn diff_detects_every_divergence_kind() {
        let expected = vec![
            entry(ItemId::top(1), "[x]", "Done"),
            entry(ItemId::top(2), "[ ]", "Waiting"),
            entry(ItemId::top(3), "[~]", "Running"),
        ];
        let actual = vec![
            entry(ItemId::top(1), "[~]", "Done"),     // stale glyph
            entry(ItemId::top(3), "[~]", "Running"),  // matches
            entry(ItemId::top(9), "[ ]", "Invented"), // foreign
        ];
        let d = diff(&expected, &actual);
        assert_eq!(d.stale, vec![ItemId::top(1)]);
        assert_eq!(d.missing, vec![ItemId::top(2)]);
        assert_eq!(d.foreign, vec![ItemId::top(9)]);
        assert!(!d.is_clean());
    }

    #[test]
    fn diff_is_clean_when_views_agree() {
        let entries = vec![entry(ItemId::top(1), "[ ]", "Same")];
        assert!(diff(&entries, &entries).is_clean());
    }
}
