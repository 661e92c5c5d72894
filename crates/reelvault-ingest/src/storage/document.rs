//! Document backend: schemaless JSON documents grouped into collections
//!
//! Each record is stored whole as a JSON body in a `documents` table keyed by
//! `(collection, doc_id)`. Filters are evaluated on the decoded documents.

use async_trait::async_trait;
use reelvault_common::types::{encode_timestamp, EntityKind, EntityRecord};
use sqlx::{AnyPool, Row};
use tracing::{debug, info, warn};

use super::sql::{open_pool, run_ddl, save_error};
use super::{validate_key, Filter, StorageBackend};
use crate::error::{ConnectError, QueryError, SaveError, SchemaError};

const BACKEND: &str = "document";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (collection, doc_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_documents_created ON documents (collection, created_at)",
];

/// Collection holding documents of `kind`
pub fn collection_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Video => "videos",
        EntityKind::User => "users",
        EntityKind::Trending => "trending",
        EntityKind::Hashtag => "hashtags",
    }
}

#[derive(Debug)]
pub struct DocumentBackend {
    url: String,
    pool: Option<AnyPool>,
}

impl DocumentBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: None,
        }
    }
}

#[async_trait]
impl StorageBackend for DocumentBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.pool.is_none() {
            self.pool = Some(open_pool(BACKEND, &self.url).await?);
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), SchemaError> {
        let pool = self.pool.as_ref().ok_or(SchemaError::NotConnected)?;
        run_ddl(BACKEND, pool, SCHEMA).await?;
        info!("Document collections ready");
        Ok(())
    }

    async fn save(&self, record: &EntityRecord) -> Result<(), SaveError> {
        let pool = self.pool.as_ref().ok_or(SaveError::NotConnected)?;
        let key = validate_key(record)?;
        let body = serde_json::to_string(record)
            .map_err(|e| SaveError::IoFailure(format!("encode {}/{}: {}", record.kind(), key, e)))?;

        sqlx::query("INSERT INTO documents (collection, doc_id, body, created_at) VALUES ($1, $2, $3, $4)")
            .bind(collection_for(record.kind()).to_string())
            .bind(key.clone())
            .bind(body)
            .bind(encode_timestamp(&record.fetched_at()))
            .execute(pool)
            .await
            .map_err(|e| save_error(e, record.kind(), &key))?;

        debug!(collection = collection_for(record.kind()), doc_id = %key, "Inserted document");
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<EntityRecord>, QueryError> {
        let pool = self.pool.as_ref().ok_or(QueryError::NotConnected)?;
        filter.validate()?;

        let collection = collection_for(filter.kind);
        let rows = sqlx::query("SELECT doc_id, body FROM documents WHERE collection = $1 ORDER BY doc_id")
            .bind(collection.to_string())
            .fetch_all(pool)
            .await?;

        let mut records = Vec::new();
        for row in &rows {
            let doc_id: String = row.try_get("doc_id")?;
            let body: String = row.try_get("body")?;
            match EntityRecord::from_json(&body) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {},
                Err(e) => warn!(collection, doc_id = %doc_id, error = %e, "Skipping undecodable document"),
            }
        }
        Ok(records)
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Document pool closed");
        }
    }
}
