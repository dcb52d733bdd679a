//! Migration stages
//!
//! Each stage is a pure function over one document: it decides whether the
//! document needs work and, if so, which fields to write back. Reading from
//! and writing to the store is the driver's job (see [`crate::driver`]).
//!
//! Stages, in application order:
//! 1. [`ExtractCoordinates`] - legacy `pulse` string to `coordinates` record
//! 2. [`NormalizeTags`] - bare string tags to tag records
//! 3. [`PromoteAttributes`] - JSON `data` strings to `attributes` maps
//! 4. [`MergeTags`] - fold same-purpose tags together, once per label pair

use rultor_common::db::{Document, Predicate};
use serde_json::{Map, Value};

pub mod coordinates;
pub mod merge;
pub mod normalize;
pub mod promote;

pub use coordinates::{extract_coordinates, ExtractCoordinates};
pub use merge::{merge_tags, MergePair, MergeTags};
pub use normalize::{normalize_tags, NormalizeTags};
pub use promote::{parse_attributes, promote_record, AttributeParseError, PromoteAttributes};

/// What a stage decided for one document
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Write these top-level fields back
    Update(Map<String, Value>),
    /// Document already in the target shape
    Unchanged,
    /// Document cannot be migrated by this stage; left untouched
    Skip(String),
}

impl Outcome {
    /// Single-field update
    pub fn set(field: &str, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        Outcome::Update(fields)
    }
}

/// One migration stage
pub trait Stage: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> String;

    /// Documents this stage looks at
    fn selector(&self) -> Predicate;

    /// Decide what to do with one selected document
    fn apply(&self, doc: &Document) -> Outcome;
}
