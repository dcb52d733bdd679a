//! Stand document model
//!
//! A stand document is stored as a loose JSON object. Legacy documents carry
//! a free-text `pulse` and tags in several historical shapes; migrated ones
//! carry a structured `coordinates` record and canonical tag records.
//!
//! The types here sit at the boundary between those shapes:
//! - [`TagEntry`] accepts whatever a `tags` array element happens to be
//! - [`TagRecord`] is an object-shaped tag kept verbatim (unknown keys included)
//! - [`Tag`] is the canonical typed form every migrated tag converts into

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Stand document field: legacy pulse identifier
pub const ATTR_PULSE: &str = "pulse";
/// Stand document field: structured coordinates
pub const ATTR_COORDS: &str = "coordinates";
/// Stand document field: tag sequence
pub const ATTR_TAGS: &str = "tags";
/// Stand document field: stand name
pub const ATTR_STAND: &str = "stand";

/// Tag field: label
pub const TAG_LABEL: &str = "label";
/// Tag field: severity level
pub const TAG_LEVEL: &str = "level";
/// Tag field: markdown description
pub const TAG_MARKDOWN: &str = "markdown";
/// Tag field: legacy JSON-encoded attributes
pub const TAG_DATA: &str = "data";
/// Tag field: attribute map
pub const TAG_ATTRIBUTES: &str = "attributes";

static LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]+$").expect("valid label pattern"));

static ATTRIBUTE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]+$").expect("valid attribute pattern"));

/// Tag labels are lowercase, start with a letter, and may contain digits and dashes
pub fn is_valid_label(label: &str) -> bool {
    LABEL_PATTERN.is_match(label)
}

/// Attribute names are plain ASCII letters
pub fn is_valid_attribute_name(name: &str) -> bool {
    ATTRIBUTE_PATTERN.is_match(name)
}

/// Coordinates of a pulse: who owns it, which rule produced it, and when
/// it was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub owner: String,
    pub rule: String,
    pub scheduled: String,
}

impl Coordinates {
    pub fn new(
        owner: impl Into<String>,
        rule: impl Into<String>,
        scheduled: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            rule: rule.into(),
            scheduled: scheduled.into(),
        }
    }

    /// Read coordinates back from a stored `coordinates` value
    ///
    /// Returns `None` if the value is not an object with all three string fields.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Stored form of the coordinates
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "owner": self.owner,
            "rule": self.rule,
            "scheduled": self.scheduled,
        })
    }

    /// True when none of the three fields is empty
    pub fn is_complete(&self) -> bool {
        !self.owner.is_empty() && !self.rule.is_empty() && !self.scheduled.is_empty()
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner, self.rule, self.scheduled)
    }
}

/// Tag severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Severe,
    Warning,
    #[default]
    Info,
    Config,
    Fine,
    Finer,
    Finest,
    All,
    Off,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Severe => "SEVERE",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Config => "CONFIG",
            Level::Fine => "FINE",
            Level::Finer => "FINER",
            Level::Finest => "FINEST",
            Level::All => "ALL",
            Level::Off => "OFF",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SEVERE" => Ok(Level::Severe),
            "WARNING" => Ok(Level::Warning),
            "INFO" => Ok(Level::Info),
            "CONFIG" => Ok(Level::Config),
            "FINE" => Ok(Level::Fine),
            "FINER" => Ok(Level::Finer),
            "FINEST" => Ok(Level::Finest),
            "ALL" => Ok(Level::All),
            "OFF" => Ok(Level::Off),
            other => Err(Error::InvalidInput(format!("unknown level '{}'", other))),
        }
    }
}

/// Object-shaped tag, kept exactly as stored
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagRecord(Map<String, Value>);

impl TagRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Legacy record shape for a tag that was stored as a bare label
    pub fn from_label(label: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(TAG_LABEL.to_string(), Value::String(label.to_string()));
        fields.insert(
            TAG_LEVEL.to_string(),
            Value::String(Level::Info.as_str().to_string()),
        );
        fields.insert(TAG_DATA.to_string(), Value::String("{}".to_string()));
        fields.insert(TAG_MARKDOWN.to_string(), Value::String(String::new()));
        Self(fields)
    }

    /// Label, if present and a string
    pub fn label(&self) -> Option<&str> {
        self.0.get(TAG_LABEL).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.0.insert(key.to_string(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Attribute map, only when `attributes` is object-typed
    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.0.get(TAG_ATTRIBUTES).and_then(Value::as_object)
    }

    /// Mutable attribute map; a missing or non-object `attributes` is
    /// replaced with an empty map first
    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry(TAG_ATTRIBUTES.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("attributes slot was just set to an object"),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// One element of a stand's `tags` array, in any of its historical shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagEntry {
    /// Bare label string (oldest documents)
    Label(String),
    /// Structured record
    Record(TagRecord),
    /// Anything else (numbers, nulls, nested arrays)
    Other(Value),
}

impl TagEntry {
    /// Read a stored `tags` value
    ///
    /// Returns `None` when the value is not an array.
    pub fn parse_all(value: &Value) -> Option<Vec<TagEntry>> {
        if !value.is_array() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Stored form of a tag sequence
    pub fn to_value_all(entries: &[TagEntry]) -> Value {
        Value::Array(entries.iter().map(TagEntry::to_value).collect())
    }

    pub fn to_value(&self) -> Value {
        match self {
            TagEntry::Label(label) => Value::String(label.clone()),
            TagEntry::Record(record) => Value::Object(record.as_map().clone()),
            TagEntry::Other(value) => value.clone(),
        }
    }

    pub fn as_record(&self) -> Option<&TagRecord> {
        match self {
            TagEntry::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Canonical tag, as every tag looks once fully migrated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub level: Level,
    pub markdown: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Tag {
    pub fn new(label: impl Into<String>, level: Level) -> Self {
        Self {
            label: label.into(),
            level,
            markdown: String::new(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn into_record(self) -> TagRecord {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => TagRecord::new(map),
            _ => TagRecord::default(),
        }
    }
}

impl TryFrom<&TagRecord> for Tag {
    type Error = Error;

    fn try_from(record: &TagRecord) -> Result<Self> {
        serde_json::from_value(Value::Object(record.as_map().clone()))
            .map_err(|e| Error::InvalidInput(format!("not a canonical tag: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinates_round_trip_through_value() {
        let coords = Coordinates::new("urn:facebook:1", "rule-x", "2013-08-28T18:05:00Z");
        let value = coords.to_value();
        assert_eq!(value["owner"], "urn:facebook:1");
        assert_eq!(Coordinates::from_value(&value), Some(coords));
    }

    #[test]
    fn test_coordinates_from_incomplete_value() {
        assert_eq!(Coordinates::from_value(&json!({"owner": "urn:x:1"})), None);
        assert_eq!(Coordinates::from_value(&json!("urn:x:1")), None);
    }

    #[test]
    fn test_coordinates_completeness() {
        assert!(Coordinates::new("a", "b", "c").is_complete());
        assert!(!Coordinates::new("a", "", "c").is_complete());
    }

    #[test]
    fn test_label_validation() {
        assert!(is_valid_label("on-pull-request"));
        assert!(is_valid_label("ci"));
        assert!(is_valid_label("b2"));
        assert!(!is_valid_label("c"));
        assert!(!is_valid_label("CI"));
        assert!(!is_valid_label("2ci"));
        assert!(!is_valid_label("on_commit"));
    }

    #[test]
    fn test_attribute_name_validation() {
        assert!(is_valid_attribute_name("sha"));
        assert!(is_valid_attribute_name("startedAt"));
        assert!(!is_valid_attribute_name("started_at"));
        assert!(!is_valid_attribute_name(""));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("INFO".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("SEVERE".parse::<Level>().unwrap(), Level::Severe);
        assert!("info".parse::<Level>().is_err());
        assert!("DEBUG".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Level::Warning).unwrap(), json!("WARNING"));
    }

    #[test]
    fn test_tag_entry_shapes() {
        let entries = TagEntry::parse_all(&json!(["built", {"label": "ci"}, 7])).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], TagEntry::Label("built".to_string()));
        assert_eq!(entries[1].as_record().and_then(TagRecord::label), Some("ci"));
        assert_eq!(entries[2], TagEntry::Other(json!(7)));
    }

    #[test]
    fn test_tag_entry_rejects_non_array() {
        assert!(TagEntry::parse_all(&json!({"label": "ci"})).is_none());
        assert!(TagEntry::parse_all(&json!("ci")).is_none());
    }

    #[test]
    fn test_record_from_label_has_legacy_shape() {
        let record = TagRecord::from_label("built");
        assert_eq!(
            Value::Object(record.into_map()),
            json!({"label": "built", "level": "INFO", "data": "{}", "markdown": ""})
        );
    }

    #[test]
    fn test_attributes_mut_replaces_array() {
        let mut record = TagRecord::new(
            json!({"label": "ci", "attributes": []}).as_object().unwrap().clone(),
        );
        assert!(record.attributes().is_none());
        record.attributes_mut().insert("a".to_string(), json!(1));
        assert_eq!(record.attributes().unwrap()["a"], json!(1));
    }

    #[test]
    fn test_canonical_tag_from_record() {
        let record = Tag::new("ci", Level::Info)
            .with_attribute("x", json!(1))
            .into_record();
        let tag = Tag::try_from(&record).unwrap();
        assert_eq!(tag.label, "ci");
        assert_eq!(tag.attributes["x"], json!(1));
    }

    #[test]
    fn test_canonical_tag_rejects_bad_level() {
        let record = TagRecord::new(
            json!({"label": "ci", "level": "LOUD", "markdown": ""})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert!(Tag::try_from(&record).is_err());
    }
}
