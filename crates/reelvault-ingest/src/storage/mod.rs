//! Storage backends
//!
//! One contract, three variants. A backend is built by the
//! [`factory`](crate::storage::factory), connected once, has its schema
//! ensured, takes any number of saves and queries, and is closed at the end of
//! the run.
//!
//! ```text
//! BackendFactory::create ─► connect ─► ensure_schema ─► save / query ─► close
//! ```

pub mod document;
pub mod factory;
pub mod file;
pub mod relational;
mod sql;

use async_trait::async_trait;
use reelvault_common::types::{EntityKind, EntityRecord, FieldType, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ConnectError, QueryError, SaveError, SchemaError};

pub use document::DocumentBackend;
pub use factory::{BackendFactory, ConnectionInfo, StorageDescriptor, StorageType};
pub use file::FileBackend;
pub use relational::RelationalBackend;

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Gt,
}

impl Comparator {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Gt => ">",
        }
    }
}

/// Predicate over one scalar field of one entity kind
///
/// Equality works on every published field; greater-than only on integer
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: EntityKind,
    pub field: String,
    pub op: Comparator,
    pub value: FieldValue,
}

impl Filter {
    pub fn eq(kind: EntityKind, field: &str, value: impl Into<FieldValue>) -> Self {
        Self {
            kind,
            field: field.to_string(),
            op: Comparator::Eq,
            value: value.into(),
        }
    }

    pub fn gt(kind: EntityKind, field: &str, value: impl Into<FieldValue>) -> Self {
        Self {
            kind,
            field: field.to_string(),
            op: Comparator::Gt,
            value: value.into(),
        }
    }

    /// Check the filter against the published fields of its kind
    pub fn validate(&self) -> Result<(), QueryError> {
        let field_type = self.kind.field_type(&self.field).ok_or_else(|| {
            QueryError::UnsupportedFilter(format!(
                "{} has no field '{}'",
                self.kind, self.field
            ))
        })?;

        if self.value.field_type() != field_type {
            return Err(QueryError::UnsupportedFilter(format!(
                "{}.{} is {:?}, got value '{}'",
                self.kind, self.field, field_type, self.value
            )));
        }

        if self.op == Comparator::Gt && field_type == FieldType::Text {
            return Err(QueryError::UnsupportedFilter(format!(
                "greater-than is not supported on text field {}.{}",
                self.kind, self.field
            )));
        }

        Ok(())
    }

    /// Evaluate against an in-memory record
    pub fn matches(&self, record: &EntityRecord) -> bool {
        if record.kind() != self.kind {
            return false;
        }
        match (record.field(&self.field), self.op) {
            (Some(actual), Comparator::Eq) => actual == self.value,
            (Some(actual), Comparator::Gt) => actual > self.value,
            (None, _) => false,
        }
    }
}

// ============================================================================
// Batch Results
// ============================================================================

/// Outcome of [`StorageBackend::save_batch`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Keys saved, in input order
    pub succeeded: Vec<String>,
    pub failed: BTreeMap<String, SaveError>,
    /// Records not attempted because the run was cancelled
    pub skipped: usize,
}

impl SaveSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Reject keys that cannot name a storage slot
pub(crate) fn validate_key(record: &EntityRecord) -> Result<String, SaveError> {
    let key = record.key();
    if key.trim().is_empty() {
        return Err(SaveError::ConstraintViolation(format!(
            "{} record has an empty {}",
            record.kind(),
            record.kind().key_field()
        )));
    }
    if key.contains(['/', '\\', '\0']) || key.contains("..") {
        return Err(SaveError::ConstraintViolation(format!(
            "{} key '{}' contains a path separator",
            record.kind(),
            key
        )));
    }
    Ok(key)
}

// ============================================================================
// Backend Contract
// ============================================================================

/// Durable store for entity records
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Variant label used in logs
    fn name(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    /// Acquire the underlying handle. Calling again once connected is a no-op.
    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Create directories, tables and indexes; idempotent
    async fn ensure_schema(&self) -> Result<(), SchemaError>;

    async fn save(&self, record: &EntityRecord) -> Result<(), SaveError>;

    /// Save records one by one, isolating per-record failures
    ///
    /// The token is checked before each record; once it fires the remaining
    /// records are counted as skipped. Fails as a whole only when the backend
    /// is not connected.
    async fn save_batch(
        &self,
        records: &[EntityRecord],
        cancel: &CancellationToken,
    ) -> Result<SaveSummary, SaveError> {
        if !self.is_connected() {
            return Err(SaveError::NotConnected);
        }

        let mut summary = SaveSummary::default();
        for (index, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.skipped = records.len() - index;
                debug!(backend = self.name(), skipped = summary.skipped, "Batch cancelled");
                break;
            }

            let key = record.key();
            match self.save(record).await {
                Ok(()) => summary.succeeded.push(key),
                Err(SaveError::NotConnected) => return Err(SaveError::NotConnected),
                Err(err) => {
                    warn!(
                        backend = self.name(),
                        kind = %record.kind(),
                        key = %key,
                        error = %err,
                        "Failed to save record"
                    );
                    summary.failed.insert(key, err);
                },
            }
        }

        Ok(summary)
    }

    /// Records of `filter.kind` matching the filter, ordered by key
    async fn query(&self, filter: &Filter) -> Result<Vec<EntityRecord>, QueryError>;

    /// Release the handle; idempotent
    async fn close(&mut self);
}

/// The backend variant chosen for a run
#[derive(Debug)]
pub enum Backend {
    File(FileBackend),
    Relational(RelationalBackend),
    Document(DocumentBackend),
}

#[async_trait]
impl StorageBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::File(b) => b.name(),
            Backend::Relational(b) => b.name(),
            Backend::Document(b) => b.name(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Backend::File(b) => b.is_connected(),
            Backend::Relational(b) => b.is_connected(),
            Backend::Document(b) => b.is_connected(),
        }
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        match self {
            Backend::File(b) => b.connect().await,
            Backend::Relational(b) => b.connect().await,
            Backend::Document(b) => b.connect().await,
        }
    }

    async fn ensure_schema(&self) -> Result<(), SchemaError> {
        match self {
            Backend::File(b) => b.ensure_schema().await,
            Backend::Relational(b) => b.ensure_schema().await,
            Backend::Document(b) => b.ensure_schema().await,
        }
    }

    async fn save(&self, record: &EntityRecord) -> Result<(), SaveError> {
        match self {
            Backend::File(b) => b.save(record).await,
            Backend::Relational(b) => b.save(record).await,
            Backend::Document(b) => b.save(record).await,
        }
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<EntityRecord>, QueryError> {
        match self {
            Backend::File(b) => b.query(filter).await,
            Backend::Relational(b) => b.query(filter).await,
            Backend::Document(b) => b.query(filter).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Backend::File(b) => b.close().await,
            Backend::Relational(b) => b.close().await,
            Backend::Document(b) => b.close().await,
        }
    }
}
