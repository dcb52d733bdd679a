//! Store doubles for unit tests

use async_trait::async_trait;
use rultor_common::db::{Document, DocumentStore, MemoryStore, Predicate};
use rultor_common::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Mutex;

/// Memory store whose updates fail for one id until healed
pub struct FlakyStore {
    pub inner: MemoryStore,
    broken_id: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, broken_id: &str) -> Self {
        Self {
            inner,
            broken_id: Mutex::new(Some(broken_id.to_string())),
        }
    }

    /// Let every following update through
    pub fn heal(&self) {
        *self.broken_id.lock().unwrap() = None;
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn find(&self, predicate: &Predicate) -> Result<Vec<Document>> {
        self.inner.find(predicate).await
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let broken = self.broken_id.lock().unwrap().as_deref() == Some(id);
        if broken {
            return Err(Error::Internal("disk full".to_string()));
        }
        self.inner.update(id, fields).await
    }

    async fn insert(&self, doc: Document) -> Result<()> {
        self.inner.insert(doc).await
    }

    async fn schema_version(&self) -> Result<i32> {
        self.inner.schema_version().await
    }

    async fn set_schema_version(&self, version: i32) -> Result<()> {
        self.inner.set_schema_version(version).await
    }

    async fn applied_stages(&self) -> Result<Vec<String>> {
        self.inner.applied_stages().await
    }

    async fn record_stage(&self, name: &str) -> Result<()> {
        self.inner.record_stage(name).await
    }
}
