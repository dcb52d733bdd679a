//! Generic stage driver
//!
//! For every document matching a stage's selector: read, apply the pure
//! transform, write back the stage's fields. Documents are processed one at
//! a time and a failure is contained to the document it happened on; there
//! is no rollback of documents already written.

use crate::stages::{Outcome, Stage};
use rultor_common::db::{DocumentStore, Predicate};
use rultor_common::Result;
use serde::Serialize;
use tracing::{error, info};

/// Options shared by every stage of one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Compute and count changes without writing anything
    pub dry_run: bool,
    /// Ignore the recorded schema version and run every stage
    pub rerun: bool,
    /// Restrict the run to one stand
    pub stand: Option<String>,
}

impl RunOptions {
    /// Selector of `stage`, narrowed to the configured stand
    pub fn selector_for(&self, stage: &dyn Stage) -> Predicate {
        match &self.stand {
            Some(name) => stage.selector().and(Predicate::InStand(name.clone())),
            None => stage.selector(),
        }
    }

    /// Whether this run covers every document
    pub fn covers_collection(&self) -> bool {
        self.stand.is_none()
    }
}

/// Per-stage tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub scanned: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageReport {
    fn new(stage: String) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }
}

/// Run one stage over the store
///
/// Only a failing scan is an error. Write failures are logged, counted in
/// `failed` and the pass carries on with the next document.
pub async fn run_stage(
    store: &dyn DocumentStore,
    stage: &dyn Stage,
    options: &RunOptions,
) -> Result<StageReport> {
    let mut report = StageReport::new(stage.name());
    let selector = options.selector_for(stage);
    let docs = store.find(&selector).await?;

    info!(
        "Stage {}: {} document(s) match {}{}",
        report.stage,
        docs.len(),
        selector,
        if options.dry_run { " (dry run)" } else { "" }
    );

    for doc in docs {
        report.scanned += 1;
        match stage.apply(&doc) {
            Outcome::Update(fields) => {
                if options.dry_run {
                    report.updated += 1;
                    continue;
                }
                match store.update(&doc.id, fields).await {
                    Ok(()) => report.updated += 1,
                    Err(e) => {
                        error!("{}: write failed in {}: {}", doc.id, report.stage, e);
                        report.failed += 1;
                    }
                }
            }
            Outcome::Unchanged => report.unchanged += 1,
            Outcome::Skip(_) => report.skipped += 1,
        }
    }

    info!(
        "Stage {} done: {} scanned, {} updated, {} unchanged, {} skipped, {} failed",
        report.stage,
        report.scanned,
        report.updated,
        report.unchanged,
        report.skipped,
        report.failed
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::ExtractCoordinates;
    use crate::test_support::FlakyStore;
    use rultor_common::db::{Document, MemoryStore};
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[tokio::test]
    async fn test_counts_each_outcome() {
        let store = MemoryStore::with_documents(vec![
            doc(json!({"_id": "a", "pulse": "urn:facebook:1:r-x:2013-08-28T18:05:00Z"})),
            doc(json!({"_id": "b", "pulse": "garbage"})),
            doc(json!({"_id": "c", "pulse": "p", "coordinates": {}})),
            doc(json!({"_id": "d"})),
        ]);

        let report = run_stage(&store, &ExtractCoordinates, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.stage, "extract-coordinates");
        assert_eq!(report.scanned, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(store.get("a").await.unwrap().has("coordinates"));
        assert!(!store.get("b").await.unwrap().has("coordinates"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = MemoryStore::with_documents(vec![doc(
            json!({"_id": "a", "pulse": "urn:facebook:1:r-x:2013-08-28T18:05:00Z"}),
        )]);
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };

        let report = run_stage(&store, &ExtractCoordinates, &options).await.unwrap();

        assert_eq!(report.updated, 1);
        assert!(!store.get("a").await.unwrap().has("coordinates"));
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_pass() {
        let inner = MemoryStore::with_documents(vec![
            doc(json!({"_id": "a", "pulse": "urn:facebook:1:r-x:2013-08-28T18:05:00Z"})),
            doc(json!({"_id": "b", "pulse": "urn:facebook:2:r-y:2013-08-28T18:05:00Z"})),
        ]);
        let store = FlakyStore::new(inner, "a");

        let report = run_stage(&store, &ExtractCoordinates, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        assert!(store.inner.get("b").await.unwrap().has("coordinates"));
    }

    #[tokio::test]
    async fn test_stand_filter() {
        let store = MemoryStore::with_documents(vec![
            doc(json!({"_id": "a", "stand": "one", "pulse": "urn:facebook:1:r-x:2013-08-28T18:05:00Z"})),
            doc(json!({"_id": "b", "stand": "two", "pulse": "urn:facebook:2:r-y:2013-08-28T18:05:00Z"})),
        ]);
        let options = RunOptions {
            stand: Some("two".to_string()),
            ..RunOptions::default()
        };

        let report = run_stage(&store, &ExtractCoordinates, &options).await.unwrap();

        assert_eq!(report.scanned, 1);
        assert!(!store.get("a").await.unwrap().has("coordinates"));
        assert!(store.get("b").await.unwrap().has("coordinates"));
    }
}
