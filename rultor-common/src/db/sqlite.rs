//! SQLite-backed document store
//!
//! Each document is one row of the `stands` table; its fields are kept as a
//! JSON object in `body`. Updates are single-row read-modify-write
//! transactions, so one document update is atomic and nothing more.

use super::{init_database, Document, DocumentStore, Predicate};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, warn};

/// Document store over a SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an already-initialized pool (see [`super::create_tables`])
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open or create the database file and wrap it
    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(init_database(db_path).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_body(id: &str, body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::InvalidInput(format!(
            "stored body of document {} is not a JSON object",
            id
        ))),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find(&self, predicate: &Predicate) -> Result<Vec<Document>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, body FROM stands ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let mut found = Vec::new();
        for (id, body) in rows {
            let fields = match decode_body(&id, &body) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!("{}: unreadable document skipped: {}", id, e);
                    continue;
                }
            };
            let doc = Document::new(id, fields);
            if predicate.matches(&doc) {
                found.push(doc);
            }
        }
        debug!("find({}) matched {} documents", predicate, found.len());
        Ok(found)
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let body: Option<String> = sqlx::query_scalar("SELECT body FROM stands WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(body) = body else {
            return Err(Error::NotFound(format!("document {}", id)));
        };

        let mut current = decode_body(id, &body)?;
        for (key, value) in fields {
            current.insert(key, value);
        }

        sqlx::query("UPDATE stands SET body = ? WHERE id = ?")
            .bind(serde_json::to_string(&current)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert(&self, doc: Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stands (id, body) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(&doc.id)
        .bind(serde_json::to_string(&doc.fields)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn schema_version(&self) -> Result<i32> {
        let version: Option<i32> =
            sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.unwrap_or(0))
    }

    async fn set_schema_version(&self, version: i32) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn applied_stages(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM applied_stages ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn record_stage(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO applied_stages (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stands")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
