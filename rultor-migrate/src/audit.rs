//! Post-migration audit
//!
//! Read-only scan that reports every document still violating the shape a
//! fully migrated stand must have. Consumers read tags through the strict
//! canonical form, so tag content is checked here as well: label and
//! attribute name syntax, known severity levels, URN owners and parseable
//! scheduled times.

use crate::stages::MergePair;
use chrono::DateTime;
use rultor_common::db::{Document, DocumentStore, Predicate};
use rultor_common::model::{
    is_valid_attribute_name, is_valid_label, ATTR_COORDS, ATTR_TAGS, TAG_ATTRIBUTES, TAG_DATA,
    TAG_LEVEL,
};
use rultor_common::{Coordinates, Level, Result, TagEntry, TagRecord};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// Kind of invariant a document breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    MissingCoordinates,
    InvalidCoordinates,
    TagsNotArray,
    BareTag,
    MalformedTag,
    LegacyData,
    InvalidAttributes,
    InvalidLabel,
    InvalidAttributeName,
    UnknownLevel,
    UnmergedPair,
}

/// One broken invariant on one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub id: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}: {}", self.id, self.kind, self.detail)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub scanned: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

struct Findings<'a> {
    id: &'a str,
    found: Vec<Violation>,
}

impl Findings<'_> {
    fn push(&mut self, kind: ViolationKind, detail: impl Into<String>) {
        self.found.push(Violation {
            id: self.id.to_string(),
            kind,
            detail: detail.into(),
        });
    }
}

fn check_coordinates(value: Option<&Value>, findings: &mut Findings<'_>) {
    let Some(value) = value else {
        findings.push(ViolationKind::MissingCoordinates, "no coordinates");
        return;
    };
    let Some(coords) = Coordinates::from_value(value) else {
        findings.push(ViolationKind::InvalidCoordinates, format!("not a coordinates record: {}", value));
        return;
    };
    if !coords.is_complete() {
        findings.push(ViolationKind::InvalidCoordinates, format!("empty field in {}", coords));
    }
    if !coords.owner.starts_with("urn:") {
        findings.push(ViolationKind::InvalidCoordinates, format!("owner '{}' is not a URN", coords.owner));
    }
    if DateTime::parse_from_rfc3339(&coords.scheduled).is_err() {
        findings.push(
            ViolationKind::InvalidCoordinates,
            format!("scheduled '{}' is not an RFC 3339 time", coords.scheduled),
        );
    }
}

fn check_record(index: usize, record: &TagRecord, findings: &mut Findings<'_>) {
    let Some(label) = record.label() else {
        findings.push(ViolationKind::MalformedTag, format!("tag #{} has no label", index));
        return;
    };
    if !is_valid_label(label) {
        findings.push(ViolationKind::InvalidLabel, format!("invalid label '{}'", label));
    }
    if record.get(TAG_DATA).is_some() {
        findings.push(ViolationKind::LegacyData, format!("tag '{}' still carries data", label));
    }
    match record.get(TAG_ATTRIBUTES) {
        Some(Value::Object(attributes)) => {
            for name in attributes.keys().filter(|n| !is_valid_attribute_name(n)) {
                findings.push(
                    ViolationKind::InvalidAttributeName,
                    format!("tag '{}' has attribute '{}'", label, name),
                );
            }
        }
        Some(other) => findings.push(
            ViolationKind::InvalidAttributes,
            format!("tag '{}' attributes are {}", label, other),
        ),
        None => findings.push(
            ViolationKind::InvalidAttributes,
            format!("tag '{}' has no attributes", label),
        ),
    }
    match record.get(TAG_LEVEL).and_then(Value::as_str) {
        Some(level) if level.parse::<Level>().is_ok() => {}
        Some(level) => findings.push(
            ViolationKind::UnknownLevel,
            format!("tag '{}' has level '{}'", label, level),
        ),
        None => findings.push(
            ViolationKind::MalformedTag,
            format!("tag '{}' has no level", label),
        ),
    }
}

fn check_tags(value: &Value, pairs: &[MergePair], findings: &mut Findings<'_>) {
    let Some(entries) = TagEntry::parse_all(value) else {
        findings.push(ViolationKind::TagsNotArray, "tags is not an array");
        return;
    };

    for (index, entry) in entries.iter().enumerate() {
        match entry {
            TagEntry::Label(label) => {
                findings.push(ViolationKind::BareTag, format!("bare tag '{}'", label))
            }
            TagEntry::Record(record) => check_record(index, record, findings),
            TagEntry::Other(other) => findings.push(
                ViolationKind::MalformedTag,
                format!("tag #{} is {}", index, other),
            ),
        }
    }

    let labels: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.as_record().and_then(|r| r.label()))
        .collect();
    for pair in pairs {
        if labels.contains(&pair.left.as_str()) && labels.contains(&pair.right.as_str()) {
            findings.push(
                ViolationKind::UnmergedPair,
                format!("both '{}' and '{}' present", pair.left, pair.right),
            );
        }
    }
}

/// Every invariant `doc` breaks
pub fn audit_document(doc: &Document, pairs: &[MergePair]) -> Vec<Violation> {
    let mut findings = Findings {
        id: &doc.id,
        found: Vec::new(),
    };

    check_coordinates(doc.get(ATTR_COORDS), &mut findings);
    if let Some(tags) = doc.get(ATTR_TAGS) {
        check_tags(tags, pairs, &mut findings);
    }

    findings.found
}

/// Audit the whole collection, or one stand of it
pub async fn audit(
    store: &dyn DocumentStore,
    pairs: &[MergePair],
    stand: Option<&str>,
) -> Result<AuditReport> {
    let predicate = match stand {
        Some(name) => Predicate::InStand(name.to_string()),
        None => Predicate::Any,
    };
    let docs = store.find(&predicate).await?;

    let mut report = AuditReport {
        scanned: docs.len(),
        violations: Vec::new(),
    };
    for doc in &docs {
        for violation in audit_document(doc, pairs) {
            warn!("{}", violation);
            report.violations.push(violation);
        }
    }

    info!(
        "Audit: {} document(s) scanned, {} violation(s)",
        report.scanned,
        report.violations.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs() -> Vec<MergePair> {
        vec![MergePair::new("ci", "on-commit")]
    }

    fn kinds(value: Value) -> Vec<ViolationKind> {
        let doc = Document::from_json(value).unwrap();
        audit_document(&doc, &pairs()).into_iter().map(|v| v.kind).collect()
    }

    fn coords() -> Value {
        json!({
            "owner": "urn:facebook:1",
            "rule": "rultor-on-commit",
            "scheduled": "2013-08-28T18:05:00Z"
        })
    }

    #[test]
    fn test_clean_document() {
        let found = kinds(json!({
            "_id": "a",
            "coordinates": coords(),
            "tags": [{"label": "ci", "level": "INFO", "markdown": "", "attributes": {"sha": "x"}}]
        }));
        assert!(found.is_empty(), "unexpected violations: {:?}", found);
    }

    #[test]
    fn test_missing_and_bad_coordinates() {
        assert_eq!(kinds(json!({"_id": "a"})), vec![ViolationKind::MissingCoordinates]);
        assert_eq!(
            kinds(json!({"_id": "a", "coordinates": "urn:x"})),
            vec![ViolationKind::InvalidCoordinates]
        );
        assert_eq!(
            kinds(json!({
                "_id": "a",
                "coordinates": {"owner": "facebook", "rule": "r", "scheduled": "yesterday"}
            })),
            vec![ViolationKind::InvalidCoordinates, ViolationKind::InvalidCoordinates]
        );
    }

    #[test]
    fn test_legacy_tag_shapes() {
        let found = kinds(json!({
            "_id": "a",
            "coordinates": coords(),
            "tags": [
                "built",
                {"label": "ci", "level": "INFO", "markdown": "", "data": "{}"},
                {"label": "deploy", "level": "INFO", "markdown": "", "attributes": []}
            ]
        }));
        assert_eq!(
            found,
            vec![
                ViolationKind::BareTag,
                ViolationKind::LegacyData,
                ViolationKind::InvalidAttributes,
                ViolationKind::InvalidAttributes,
            ]
        );
    }

    #[test]
    fn test_tag_content_rules() {
        let found = kinds(json!({
            "_id": "a",
            "coordinates": coords(),
            "tags": [
                {"label": "CI", "level": "LOUD", "markdown": "", "attributes": {"build_id": 1}}
            ]
        }));
        assert_eq!(
            found,
            vec![
                ViolationKind::InvalidLabel,
                ViolationKind::InvalidAttributeName,
                ViolationKind::UnknownLevel,
            ]
        );
    }

    #[test]
    fn test_unmerged_pair() {
        let tag = |label: &str| json!({"label": label, "level": "INFO", "markdown": "", "attributes": {}});
        let found = kinds(json!({
            "_id": "a",
            "coordinates": coords(),
            "tags": [tag("ci"), tag("on-commit")]
        }));
        assert_eq!(found, vec![ViolationKind::UnmergedPair]);
    }
}
