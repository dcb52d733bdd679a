//! Stage 4: merge same-purpose tags
//!
//! A merge pair `(left, right)` says that a tag labeled `right` carries
//! information that belongs on the tag labeled `left`. Every `right` tag is
//! folded into the first `left` tag of the sequence, wherever it sits, and
//! then dropped. `right` attributes win on key collision. Without a `left`
//! tag nothing changes.

use super::{Outcome, Stage};
use rultor_common::config::MergePairConfig;
use rultor_common::db::{Document, Predicate};
use rultor_common::model::ATTR_TAGS;
use rultor_common::TagEntry;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, warn};

/// Ordered label pair: `right` folds into `left`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePair {
    pub left: String,
    pub right: String,
}

impl MergePair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl From<&MergePairConfig> for MergePair {
    fn from(config: &MergePairConfig) -> Self {
        Self::new(config.left.clone(), config.right.clone())
    }
}

impl fmt::Display for MergePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<-{}", self.left, self.right)
    }
}

fn label_of(entry: &TagEntry) -> Option<&str> {
    entry.as_record().and_then(|r| r.label())
}

/// Fold `right`-labeled tags into the first `left`-labeled tag
pub fn merge_tags(tags: Vec<TagEntry>, left: &str, right: &str) -> Vec<TagEntry> {
    let Some(target) = tags.iter().position(|t| label_of(t) == Some(left)) else {
        return tags;
    };

    let mut folded: Vec<Map<String, Value>> = Vec::new();
    let mut merged = Vec::with_capacity(tags.len());
    let mut target_at = 0;

    for (i, entry) in tags.into_iter().enumerate() {
        if label_of(&entry) == Some(right) {
            let attributes = entry
                .as_record()
                .and_then(|r| r.attributes())
                .cloned()
                .unwrap_or_default();
            folded.push(attributes);
            continue;
        }
        if i == target {
            target_at = merged.len();
        }
        merged.push(entry);
    }

    if let Some(TagEntry::Record(record)) = merged.get_mut(target_at) {
        let attributes = record.attributes_mut();
        for extra in folded {
            for (key, value) in extra {
                attributes.insert(key, value);
            }
        }
    }

    merged
}

/// Applies one merge pair to every document with tags
#[derive(Debug, Clone)]
pub struct MergeTags {
    pair: MergePair,
}

impl MergeTags {
    pub fn new(pair: MergePair) -> Self {
        Self { pair }
    }

    pub fn pair(&self) -> &MergePair {
        &self.pair
    }
}

impl Stage for MergeTags {
    fn name(&self) -> String {
        format!("merge-tags({})", self.pair)
    }

    fn selector(&self) -> Predicate {
        Predicate::exists(ATTR_TAGS)
    }

    fn apply(&self, doc: &Document) -> Outcome {
        let Some(entries) = doc.get(ATTR_TAGS).and_then(TagEntry::parse_all) else {
            warn!("{}: tags is not an array - skipping", doc.id);
            return Outcome::Skip("tags is not an array".to_string());
        };

        let before = entries.len();
        let merged = merge_tags(entries, &self.pair.left, &self.pair.right);
        if merged.len() == before {
            debug!("{}: nothing to merge for {}", doc.id, self.pair);
            return Outcome::Unchanged;
        }

        info!(
            "{}: merged {} '{}' tag(s) into '{}'",
            doc.id,
            before - merged.len(),
            self.pair.right,
            self.pair.left
        );
        Outcome::set(ATTR_TAGS, TagEntry::to_value_all(&merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merge(tags: Value, left: &str, right: &str) -> Value {
        let entries = TagEntry::parse_all(&tags).unwrap();
        TagEntry::to_value_all(&merge_tags(entries, left, right))
    }

    #[test]
    fn test_right_before_left_is_merged() {
        let merged = merge(
            json!([
                {"label": "on-commit", "attributes": {"x": 1}},
                {"label": "ci", "attributes": {"y": 2}}
            ]),
            "ci",
            "on-commit",
        );
        assert_eq!(merged, json!([{"label": "ci", "attributes": {"x": 1, "y": 2}}]));
    }

    #[test]
    fn test_right_after_left_is_merged() {
        let merged = merge(
            json!([
                {"label": "on-pull-request", "level": "INFO", "attributes": {"pr": 5}},
                {"label": "built", "attributes": {}},
                {"label": "merge", "attributes": {"sha": "abc"}}
            ]),
            "on-pull-request",
            "merge",
        );
        assert_eq!(
            merged,
            json!([
                {"label": "on-pull-request", "level": "INFO", "attributes": {"pr": 5, "sha": "abc"}},
                {"label": "built", "attributes": {}}
            ])
        );
    }

    #[test]
    fn test_right_wins_on_collision() {
        let merged = merge(
            json!([
                {"label": "ci", "attributes": {"status": "old", "keep": true}},
                {"label": "on-commit", "attributes": {"status": "new"}}
            ]),
            "ci",
            "on-commit",
        );
        assert_eq!(
            merged,
            json!([{"label": "ci", "attributes": {"status": "new", "keep": true}}])
        );
    }

    #[test]
    fn test_without_left_nothing_changes() {
        let tags = json!([
            {"label": "on-commit", "attributes": {"x": 1}},
            {"label": "built", "attributes": {}}
        ]);
        assert_eq!(merge(tags.clone(), "ci", "on-commit"), tags);
    }

    #[test]
    fn test_several_right_tags_fold_into_first_left() {
        let merged = merge(
            json!([
                {"label": "ci", "attributes": {}},
                {"label": "on-commit", "attributes": {"a": 1}},
                {"label": "ci", "attributes": {"second": true}},
                {"label": "on-commit", "attributes": {"b": 2}}
            ]),
            "ci",
            "on-commit",
        );
        assert_eq!(
            merged,
            json!([
                {"label": "ci", "attributes": {"a": 1, "b": 2}},
                {"label": "ci", "attributes": {"second": true}}
            ])
        );
    }

    #[test]
    fn test_left_without_attributes_gets_map() {
        let merged = merge(
            json!([
                {"label": "ci"},
                {"label": "on-commit", "attributes": {"a": 1}}
            ]),
            "ci",
            "on-commit",
        );
        assert_eq!(merged, json!([{"label": "ci", "attributes": {"a": 1}}]));
    }

    #[test]
    fn test_stage_is_idempotent() {
        let stage = MergeTags::new(MergePair::new("ci", "on-commit"));
        let doc = Document::from_json(json!({
            "_id": "d",
            "tags": [
                {"label": "ci", "attributes": {"y": 2}},
                {"label": "on-commit", "attributes": {"x": 1}}
            ]
        }))
        .unwrap();

        let Outcome::Update(fields) = stage.apply(&doc) else {
            panic!("expected update");
        };
        let mut migrated = doc.clone();
        migrated.fields.extend(fields);
        assert_eq!(stage.apply(&migrated), Outcome::Unchanged);
    }

    #[test]
    fn test_stage_name() {
        let stage = MergeTags::new(MergePair::new("on-pull-request", "merge"));
        assert_eq!(stage.name(), "merge-tags(on-pull-request<-merge)");
    }
}
