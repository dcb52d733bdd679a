//! In-memory document store

use super::{Document, DocumentStore, Predicate};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, Map<String, Value>>,
    version: i32,
    applied: BTreeSet<String>,
}

/// Document store held entirely in memory, ordered by id
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `docs`
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let docs = docs.into_iter().map(|d| (d.id, d.fields)).collect();
        Self {
            inner: Mutex::new(Inner {
                docs,
                ..Inner::default()
            }),
        }
    }

    /// Copy of one document
    pub async fn get(&self, id: &str) -> Option<Document> {
        let inner = self.inner.lock().await;
        inner
            .docs
            .get(id)
            .map(|fields| Document::new(id, fields.clone()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, predicate: &Predicate) -> Result<Vec<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .docs
            .iter()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .filter(|doc| predicate.matches(doc))
            .collect())
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .docs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        for (key, value) in fields {
            doc.insert(key, value);
        }
        Ok(())
    }

    async fn insert(&self, doc: Document) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.docs.insert(doc.id, doc.fields);
        Ok(())
    }

    async fn schema_version(&self) -> Result<i32> {
        Ok(self.inner.lock().await.version)
    }

    async fn set_schema_version(&self, version: i32) -> Result<()> {
        self.inner.lock().await.version = version;
        Ok(())
    }

    async fn applied_stages(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().await.applied.iter().cloned().collect())
    }

    async fn record_stage(&self, name: &str) -> Result<()> {
        self.inner.lock().await.applied.insert(name.to_string());
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.lock().await.docs.len())
    }
}
