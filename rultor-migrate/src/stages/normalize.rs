//! Stage 2: wrap bare string tags into tag records

use super::{Outcome, Stage};
use rultor_common::db::{Document, Predicate};
use rultor_common::model::ATTR_TAGS;
use rultor_common::{TagEntry, TagRecord};
use tracing::{debug, info, warn};

/// Replace every bare label with its legacy record shape, keeping order
///
/// Records and any other values pass through untouched.
pub fn normalize_tags(entries: Vec<TagEntry>) -> Vec<TagEntry> {
    entries
        .into_iter()
        .map(|entry| match entry {
            TagEntry::Label(label) => TagEntry::Record(TagRecord::from_label(&label)),
            other => other,
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizeTags;

impl Stage for NormalizeTags {
    fn name(&self) -> String {
        "normalize-tags".to_string()
    }

    fn selector(&self) -> Predicate {
        Predicate::exists(ATTR_TAGS)
    }

    fn apply(&self, doc: &Document) -> Outcome {
        let Some(entries) = doc.get(ATTR_TAGS).and_then(TagEntry::parse_all) else {
            warn!("{}: tags is not an array - skipping", doc.id);
            return Outcome::Skip("tags is not an array".to_string());
        };

        let bare = entries
            .iter()
            .filter(|e| matches!(e, TagEntry::Label(_)))
            .count();
        for entry in &entries {
            if let TagEntry::Other(value) = entry {
                warn!("{}: leaving non-tag value {} in tags", doc.id, value);
            }
        }

        if bare == 0 {
            debug!("{}: all tags already structured", doc.id);
            return Outcome::Unchanged;
        }

        info!("{}: wrapping {} bare tag(s)", doc.id, bare);
        Outcome::set(ATTR_TAGS, TagEntry::to_value_all(&normalize_tags(entries)))
    }
}
