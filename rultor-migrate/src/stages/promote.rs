//! Stage 3: promote JSON-encoded `data` strings into `attributes` maps
//!
//! Malformed `data` never fails the document: the tag simply ends up with
//! empty attributes. Legacy writers sometimes stored `attributes: []`; an
//! array is never a valid attribute set, so it is reset to `{}` too.

use super::{Outcome, Stage};
use rultor_common::db::{Document, Predicate};
use rultor_common::model::{ATTR_TAGS, TAG_ATTRIBUTES, TAG_DATA};
use rultor_common::{TagEntry, TagRecord};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a `data` string could not become an attribute map
#[derive(Error, Debug)]
pub enum AttributeParseError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Parse a `data` string as an attribute map
pub fn parse_attributes(text: &str) -> Result<Map<String, Value>, AttributeParseError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(AttributeParseError::NotAnObject("array")),
        Value::String(_) => Err(AttributeParseError::NotAnObject("string")),
        Value::Number(_) => Err(AttributeParseError::NotAnObject("number")),
        Value::Bool(_) => Err(AttributeParseError::NotAnObject("boolean")),
        Value::Null => Err(AttributeParseError::NotAnObject("null")),
    }
}

/// Promote one tag record in place; returns true if it changed
pub fn promote_record(record: &mut TagRecord) -> bool {
    let mut changed = false;

    if let Some(data) = record.remove(TAG_DATA) {
        let attributes = match data {
            Value::String(text) => parse_attributes(&text).unwrap_or_else(|e| {
                debug!("tag {:?}: data '{}' not usable ({}) - using {{}}", record.label(), text, e);
                Map::new()
            }),
            other => {
                debug!("tag {:?}: data {} is not a string - using {{}}", record.label(), other);
                Map::new()
            }
        };
        record.insert(TAG_ATTRIBUTES, Value::Object(attributes));
        changed = true;
    }

    if matches!(record.get(TAG_ATTRIBUTES), Some(Value::Array(_))) {
        info!("tag {:?}: array-typed attributes reset to {{}}", record.label());
        record.insert(TAG_ATTRIBUTES, Value::Object(Map::new()));
        changed = true;
    }

    changed
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PromoteAttributes;

impl Stage for PromoteAttributes {
    fn name(&self) -> String {
        "promote-attributes".to_string()
    }

    fn selector(&self) -> Predicate {
        Predicate::exists(ATTR_TAGS)
    }

    fn apply(&self, doc: &Document) -> Outcome {
        let Some(mut entries) = doc.get(ATTR_TAGS).and_then(TagEntry::parse_all) else {
            warn!("{}: tags is not an array - skipping", doc.id);
            return Outcome::Skip("tags is not an array".to_string());
        };

        let mut promoted = 0;
        for entry in entries.iter_mut() {
            if let TagEntry::Record(record) = entry {
                if promote_record(record) {
                    promoted += 1;
                }
            }
        }

        if promoted == 0 {
            debug!("{}: no tags to promote", doc.id);
            return Outcome::Unchanged;
        }

        info!("{}: promoted attributes of {} tag(s)", doc.id, promoted);
        Outcome::set(ATTR_TAGS, TagEntry::to_value_all(&entries))
    }
}
