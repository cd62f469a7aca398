//! Plain-text record codec for work items and features.
//!
//! A record is a metadata header of `key: value` lines, terminated by the
//! first blank line, followed by a free-form body:
//!
//! ```text
//! id: 42.1
//! title: Harden auth token refresh
//! status: in-progress
//! priority: high
//! kind: bug
//! subsystems: auth, network
//! dependencies: 3, 7.2
//! parent: 42
//! severity: high
//! source: production
//! reproduction: refresh with an expired token
//! expected: new token issued
//! actual: 500 from the token endpoint
//! created: 2026-08-06T12:00:00.000000Z
//! updated: 2026-08-06T12:34:00.000000Z
//!
//! Free-form narrative...
//! ```
//!
//! Guarantees:
//!
//! - Deterministic: the same item always encodes to the same bytes (fixed
//!   key order, `BTreeSet`-canonical lists, fixed timestamp precision).
//! - Round-trip: `decode(encode(item)) == item` for every valid item.
//! - Strict: unknown header keys are a hard error, never silently dropped.

use crate::model::item::{
    BugExtension, BugSource, EffortEstimate, Kind, Priority, Severity, Status, WorkItem,
};
use crate::model::item_id::ItemId;
use crate::model::Feature;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A header line is not a well-formed `key: value` pair.
    #[error("header line {line} is not 'key: value': '{content}'")]
    MalformedHeader { line: usize, content: String },

    /// A header key outside the recognized set. Rejected rather than dropped
    /// so a typo never loses data silently.
    #[error("unknown header field: '{key}'")]
    UnknownField { key: String },

    /// The same header key appeared twice.
    #[error("duplicate header field: '{key}'")]
    DuplicateField { key: String },

    /// A required header field is absent.
    #[error("missing header field: '{key}'")]
    MissingField { key: &'static str },

    /// A header value failed to parse for its field type.
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// Header scanning
// ---------------------------------------------------------------------------

/// Recognized work-item header keys, in canonical encode order.
const ITEM_KEYS: &[&str] = &[
    "id",
    "title",
    "status",
    "priority",
    "kind",
    "subsystems",
    "dependencies",
    "parent",
    "feature",
    "context",
    "effort",
    "severity",
    "source",
    "reproduction",
    "expected",
    "actual",
    "created",
    "updated",
];

/// Recognized feature header keys.
const FEATURE_KEYS: &[&str] = &["name", "description"];

struct Header<'a> {
    fields: Vec<(&'a str, &'a str)>,
}

impl<'a> Header<'a> {
    fn scan(raw: &'a str, recognized: &[&str]) -> Result<Self, DecodeError> {
        let mut fields: Vec<(&'a str, &'a str)> = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let Some((key, value)) = line.split_once(": ") else {
                return Err(DecodeError::MalformedHeader {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            if !recognized.contains(&key) {
                return Err(DecodeError::UnknownField {
                    key: key.to_string(),
                });
            }
            if fields.iter().any(|(k, _)| *k == key) {
                return Err(DecodeError::DuplicateField {
                    key: key.to_string(),
                });
            }
            fields.push((key, value));
        }
        Ok(Self { fields })
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    fn require(&self, key: &'static str) -> Result<&'a str, DecodeError> {
        self.get(key).ok_or(DecodeError::MissingField { key })
    }
}

fn invalid(key: &'static str, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::InvalidValue {
        key,
        message: err.to_string(),
    }
}

fn parse_field<T>(raw: &str, key: &'static str) -> Result<T, DecodeError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| invalid(key, e))
}

fn parse_timestamp(raw: &str, key: &'static str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| invalid(key, e))
}

fn parse_id_list(raw: &str, key: &'static str) -> Result<BTreeSet<ItemId>, DecodeError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_field::<ItemId>(part, key))
        .collect()
}

fn parse_tag_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a record into its header block and body at the first blank line.
fn split_record(raw: &str) -> (&str, &str) {
    match raw.split_once("\n\n") {
        Some((header, body)) => (header, body),
        None => (raw.trim_end_matches('\n'), ""),
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Work-item codec
// ---------------------------------------------------------------------------

/// Decode a work-item record.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedHeader`] for a non-`key: value` header
/// line, [`DecodeError::UnknownField`] for an unrecognized key, and typed
/// per-field errors for bad values. The five bug fields travel together:
/// when any is present, all are required.
pub fn decode(raw: &str) -> Result<WorkItem, DecodeError> {
    let (header_raw, body) = split_record(raw);
    let header = Header::scan(header_raw, ITEM_KEYS)?;

    let id: ItemId = parse_field(header.require("id")?, "id")?;
    let title = header.require("title")?.to_string();
    let status: Status = parse_field(header.require("status")?, "status")?;
    let priority: Priority = parse_field(header.require("priority")?, "priority")?;
    let kind: Kind = parse_field(header.require("kind")?, "kind")?;

    let subsystems = header.get("subsystems").map(parse_tag_list).unwrap_or_default();
    let dependencies = match header.get("dependencies") {
        Some(raw) => parse_id_list(raw, "dependencies")?,
        None => BTreeSet::new(),
    };
    let parent_id = match header.get("parent") {
        Some(raw) => Some(parse_field::<ItemId>(raw, "parent")?),
        None => None,
    };
    let feature_ref = header.get("feature").map(str::to_string);
    let context_note = header.get("context").unwrap_or("").to_string();
    let effort = match header.get("effort") {
        Some(raw) => Some(parse_field::<EffortEstimate>(raw, "effort")?),
        None => None,
    };

    let bug = decode_bug_fields(&header)?;

    let created_at = parse_timestamp(header.require("created")?, "created")?;
    let updated_at = parse_timestamp(header.require("updated")?, "updated")?;

    Ok(WorkItem {
        id,
        title,
        status,
        priority,
        kind,
        subsystems,
        dependencies,
        parent_id,
        feature_ref,
        context_note,
        effort,
        bug,
        created_at,
        updated_at,
        body: body.to_string(),
    })
}

/// The five bug-extension fields are all-or-none at the codec level.
fn decode_bug_fields(header: &Header<'_>) -> Result<Option<BugExtension>, DecodeError> {
    const BUG_KEYS: [&str; 5] = ["severity", "source", "reproduction", "expected", "actual"];
    let present = BUG_KEYS.iter().filter(|k| header.get(k).is_some()).count();
    if present == 0 {
        return Ok(None);
    }

    let severity: Severity = parse_field(header.require("severity")?, "severity")?;
    let source: BugSource = parse_field(header.require("source")?, "source")?;
    Ok(Some(BugExtension {
        severity,
        source,
        reproduction: header.require("reproduction")?.to_string(),
        expected: header.require("expected")?.to_string(),
        actual: header.require("actual")?.to_string(),
    }))
}

/// Encode a work-item record. Deterministic: fixed key order, canonical list
/// ordering, microsecond timestamps.
#[must_use]
pub fn encode(item: &WorkItem) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id: {}", item.id);
    let _ = writeln!(out, "title: {}", item.title);
    let _ = writeln!(out, "status: {}", item.status);
    let _ = writeln!(out, "priority: {}", item.priority);
    let _ = writeln!(out, "kind: {}", item.kind);
    if !item.subsystems.is_empty() {
        let tags: Vec<&str> = item.subsystems.iter().map(String::as_str).collect();
        let _ = writeln!(out, "subsystems: {}", tags.join(", "));
    }
    if !item.dependencies.is_empty() {
        let deps: Vec<String> = item.dependencies.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "dependencies: {}", deps.join(", "));
    }
    if let Some(parent) = item.parent_id {
        let _ = writeln!(out, "parent: {parent}");
    }
    if let Some(feature) = &item.feature_ref {
        let _ = writeln!(out, "feature: {feature}");
    }
    if !item.context_note.is_empty() {
        let _ = writeln!(out, "context: {}", item.context_note);
    }
    if let Some(effort) = item.effort {
        let _ = writeln!(out, "effort: {effort}");
    }
    if let Some(bug) = &item.bug {
        let _ = writeln!(out, "severity: {}", bug.severity);
        let _ = writeln!(out, "source: {}", bug.source);
        let _ = writeln!(out, "reproduction: {}", bug.reproduction);
        let _ = writeln!(out, "expected: {}", bug.expected);
        let _ = writeln!(out, "actual: {}", bug.actual);
    }
    let _ = writeln!(out, "created: {}", format_timestamp(item.created_at));
    let _ = writeln!(out, "updated: {}", format_timestamp(item.updated_at));
    out.push('\n');
    out.push_str(&item.body);
    out
}

// ---------------------------------------------------------------------------
// Feature codec
// ---------------------------------------------------------------------------

/// Decode a feature record: `name`/`description` header, `- ` requirement
/// lines in the body.
///
/// # Errors
///
/// Same header failure modes as [`decode`]; body lines that are not `- `
/// bullets are [`DecodeError::InvalidValue`] on `requirements`.
pub fn decode_feature(raw: &str) -> Result<Feature, DecodeError> {
    let (header_raw, body) = split_record(raw);
    let header = Header::scan(header_raw, FEATURE_KEYS)?;

    let name = header.require("name")?.to_string();
    let description = header.get("description").unwrap_or("").to_string();

    let mut requirements = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            continue;
        }
        let Some(req) = line.strip_prefix("- ") else {
            return Err(DecodeError::InvalidValue {
                key: "requirements",
                message: format!("expected '- ' bullet, got '{line}'"),
            });
        };
        requirements.push(req.to_string());
    }

    Ok(Feature {
        name,
        description,
        requirements,
    })
}

/// Encode a feature record.
#[must_use]
pub fn encode_feature(feature: &Feature) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "name: {}", feature.name);
    if !feature.description.is_empty() {
        let _ = writeln!(out, "description: {}", feature.description);
    }
    out.push('\n');
    for req in &feature.requirements {
        let _ = writeln!(out, "- {req}");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{decode, decode_feature, encode, encode_feature, DecodeError};
    use crate::model::item::{
        BugExtension, BugSource, EffortEstimate, Kind, Priority, Severity, Status, WorkItem,
    };
    use crate::model::item_id::ItemId;
    use crate::model::Feature;
    use chrono::{TimeZone, Utc};

    fn stamp(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid stamp")
    }

    fn sample_item() -> WorkItem {
        let mut item = WorkItem::new(ItemId::top(42), "Harden token refresh", Kind::Task, stamp(1_700_000_000));
        item.status = Status::InProgress;
        item.priority = Priority::High;
        item.subsystems = ["auth", "network"].iter().map(ToString::to_string).collect();
        item.dependencies = [ItemId::top(3), ItemId::child_of(7, 2)].into_iter().collect();
        item.feature_ref = Some("login-hardening".to_string());
        item.context_note = "regression after the retry rework".to_string();
        item.effort = Some(EffortEstimate::from_days(10));
        item.updated_at = stamp(1_700_000_100);
        item.body = "Longer narrative.\n\nWith a second paragraph.\n".to_string();
        item
    }

    fn sample_bug() -> WorkItem {
        let mut item = WorkItem::new(
            ItemId::child_of(42, 1),
            "500 from token endpoint",
            Kind::Bug,
            stamp(1_700_000_000),
        );
        item.bug = Some(BugExtension {
            severity: Severity::High,
            source: BugSource::Production,
            reproduction: "refresh with an expired token".to_string(),
            expected: "new token issued".to_string(),
            actual: "500 from the token endpoint".to_string(),
        });
        item
    }

    // -----------------------------------------------------------------------
    // Round-trip
    // -----------------------------------------------------------------------

    #[test]
    fn roundtrip_full_item() {
        let item = sample_item();
        let raw = encode(&item);
        let back = decode(&raw).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn roundtrip_bug_item() {
        let item = sample_bug();
        let back = decode(&encode(&item)).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn roundtrip_minimal_item() {
        let item = WorkItem::new(ItemId::top(1), "Bare minimum", Kind::Task, stamp(0));
        let back = decode(&encode(&item)).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn roundtrip_preserves_body_exactly() {
        let mut item = sample_item();
        item.body = "line one\n\nline three, after an inner blank\nno trailing newline".to_string();
        let back = decode(&encode(&item)).unwrap();
        assert_eq!(back.body, item.body);
    }

    #[test]
    fn encode_is_deterministic() {
        let item = sample_item();
        assert_eq!(encode(&item), encode(&item));
    }

    // -----------------------------------------------------------------------
    // Header failure modes
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_field_is_rejected() {
        let raw = encode(&sample_item()).replace("context: ", "remark: ");
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownField { key } if key == "remark"));
    }

    #[test]
    fn malformed_header_line_is_rejected() {
        let raw = "id: 1\nthis line has no separator\n\nbody";
        let err = decode(raw).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeader { line: 2, .. }));
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let raw = encode(&sample_item()).replace("priority: high\n", "priority: high\npriority: low\n");
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::DuplicateField { key } if key == "priority"));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let raw = encode(&sample_item()).replace("status: in-progress\n", "");
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { key: "status" }));
    }

    #[test]
    fn invalid_enum_value_is_rejected() {
        let raw = encode(&sample_item()).replace("status: in-progress", "status: doing");
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { key: "status", .. }));
    }

    #[test]
    fn invalid_dependency_id_is_rejected() {
        let raw = encode(&sample_item()).replace("dependencies: 3, 7.2", "dependencies: 3, x");
        let err = decode(&raw).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidValue {
                key: "dependencies",
                ..
            }
        ));
    }

    #[test]
    fn partial_bug_fields_are_rejected() {
        let item = sample_bug();
        let raw = encode(&item).replace("source: production\n", "");
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { key: "source" }));
    }

    #[test]
    fn record_without_body_separator_still_decodes() {
        // A hand-truncated record with a header only.
        let item = WorkItem::new(ItemId::top(9), "Header only item", Kind::Task, stamp(10));
        let raw = encode(&item);
        let trimmed = raw.trim_end_matches('\n');
        let back = decode(trimmed).unwrap();
        assert_eq!(back.body, "");
        assert_eq!(back.id, item.id);
    }

    // -----------------------------------------------------------------------
    // Feature codec
    // -----------------------------------------------------------------------

    #[test]
    fn feature_roundtrip() {
        let mut feature = Feature::new("login-hardening", "Make login robust under churn");
        feature.requirements = vec![
            "tokens refresh without user-visible errors".to_string(),
            "lockout after five failed attempts".to_string(),
        ];
        let back = decode_feature(&encode_feature(&feature)).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn feature_rejects_non_bullet_requirement() {
        let raw = "name: auth\n\nnot a bullet\n";
        let err = decode_feature(raw).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidValue {
                key: "requirements",
                ..
            }
        ));
    }

    #[test]
    fn feature_rejects_unknown_key() {
        let raw = "name: auth\nowner: someone\n\n";
        let err = decode_feature(raw).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownField { key } if key == "owner"));
    }
}
