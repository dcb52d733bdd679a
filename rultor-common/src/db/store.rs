//! Document store contract
//!
//! Migrations only ever scan by field presence and set named top-level
//! fields on a single document. Stores never delete documents.

use super::Document;
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// Selection predicate for [`DocumentStore::find`]
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every document
    Any,
    /// Field is present (any value, including null)
    Exists(String),
    /// Field is absent
    Missing(String),
    /// Document belongs to the named stand
    InStand(String),
    /// All inner predicates hold
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn exists(field: &str) -> Self {
        Predicate::Exists(field.to_string())
    }

    pub fn missing(field: &str) -> Self {
        Predicate::Missing(field.to_string())
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Any, p) | (p, Predicate::Any) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(mut right)) => {
                right.insert(0, p);
                Predicate::And(right)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Exists(field) => doc.has(field),
            Predicate::Missing(field) => !doc.has(field),
            Predicate::InStand(name) => doc.stand() == Some(name.as_str()),
            Predicate::And(all) => all.iter().all(|p| p.matches(doc)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Any => write!(f, "*"),
            Predicate::Exists(field) => write!(f, "exists({})", field),
            Predicate::Missing(field) => write!(f, "missing({})", field),
            Predicate::InStand(name) => write!(f, "stand={}", name),
            Predicate::And(all) => {
                let parts: Vec<String> = all.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" && "))
            }
        }
    }
}

/// Injected document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching `predicate`, in id order
    async fn find(&self, predicate: &Predicate) -> Result<Vec<Document>>;

    /// Set the given top-level fields on one document
    ///
    /// Fields not named in `fields` are left untouched.
    /// Returns [`crate::Error::NotFound`] for an unknown id.
    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Add a document, replacing any existing one with the same id
    async fn insert(&self, doc: Document) -> Result<()>;

    /// Highest completed migration version (0 when none recorded)
    async fn schema_version(&self) -> Result<i32>;

    /// Record a completed migration version
    async fn set_schema_version(&self, version: i32) -> Result<()>;

    /// Names of the migration stages completed over the whole collection
    async fn applied_stages(&self) -> Result<Vec<String>>;

    /// Mark a migration stage as completed (idempotent)
    async fn record_stage(&self, name: &str) -> Result<()>;

    /// Number of stored documents
    async fn count(&self) -> Result<usize> {
        Ok(self.find(&Predicate::Any).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn test_exists_and_missing() {
        let d = doc(json!({"_id": "1", "pulse": "p", "coordinates": null}));
        assert!(Predicate::exists("pulse").matches(&d));
        assert!(Predicate::exists("coordinates").matches(&d));
        assert!(!Predicate::missing("coordinates").matches(&d));
        assert!(Predicate::missing("tags").matches(&d));
    }

    #[test]
    fn test_in_stand() {
        let d = doc(json!({"_id": "1", "stand": "main"}));
        assert!(Predicate::InStand("main".to_string()).matches(&d));
        assert!(!Predicate::InStand("other".to_string()).matches(&d));
        assert!(!Predicate::InStand("main".to_string()).matches(&doc(json!({"_id": "2"}))));
    }

    #[test]
    fn test_and_flattens() {
        let p = Predicate::missing("coordinates")
            .and(Predicate::exists("pulse"))
            .and(Predicate::Any)
            .and(Predicate::InStand("s".to_string()));
        match &p {
            Predicate::And(all) => assert_eq!(all.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        assert_eq!(p.to_string(), "missing(coordinates) && exists(pulse) && stand=s");
    }

    #[test]
    fn test_any_is_identity() {
        assert_eq!(Predicate::Any.and(Predicate::exists("tags")), Predicate::exists("tags"));
    }
}
