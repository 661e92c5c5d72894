//! Flat-file backend: one pretty-printed JSON document per record
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/video_<id>.json
//! <root>/user_<id>.json
//! <root>/trending_<YYYYmmdd_HHMMSS_ffffff>_p<page>.json
//! <root>/hashtag_<tag>.json
//! ```

use async_trait::async_trait;
use reelvault_common::types::EntityRecord;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{validate_key, Filter, StorageBackend};
use crate::error::{ConnectError, QueryError, SaveError, SchemaError};

const BACKEND: &str = "file";

#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    connected: bool,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document holding `record`
    pub fn record_path(&self, record: &EntityRecord, key: &str) -> PathBuf {
        self.root.join(format!("{}_{}.json", record.kind(), key))
    }

    fn require_connected<E>(&self, err: E) -> Result<(), E> {
        if self.connected {
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.connected {
            return Ok(());
        }

        fs::create_dir_all(&self.root).await.map_err(|e| ConnectError {
            backend: BACKEND,
            reason: format!("{}: {}", self.root.display(), e),
        })?;

        let metadata = fs::metadata(&self.root).await.map_err(|e| ConnectError {
            backend: BACKEND,
            reason: format!("{}: {}", self.root.display(), e),
        })?;
        if !metadata.is_dir() {
            return Err(ConnectError {
                backend: BACKEND,
                reason: format!("{} is not a directory", self.root.display()),
            });
        }

        self.connected = true;
        info!(root = %self.root.display(), "File backend ready");
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), SchemaError> {
        self.require_connected(SchemaError::NotConnected)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SchemaError::Failed {
                backend: BACKEND,
                reason: format!("{}: {}", self.root.display(), e),
            })
    }

    async fn save(&self, record: &EntityRecord) -> Result<(), SaveError> {
        self.require_connected(SaveError::NotConnected)?;
        let key = validate_key(record)?;

        let path = self.record_path(record, &key);
        let tmp = path.with_extension("json.tmp");
        let json = record.to_json_pretty()?;

        // Write then rename so readers never see a partial document
        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "Saved record");
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<EntityRecord>, QueryError> {
        self.require_connected(QueryError::NotConnected)?;
        filter.validate()?;

        let prefix = format!("{}_", filter.kind);
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut records = Vec::new();
        for path in paths {
            let raw = fs::read_to_string(&path).await?;
            let record = match EntityRecord::from_json(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    continue;
                },
            };
            if filter.matches(&record) {
                records.push(record);
            }
        }

        records.sort_by_key(|r| r.key());
        Ok(records)
    }

    async fn close(&mut self) {
        if self.connected {
            debug!(root = %self.root.display(), "File backend closed");
        }
        self.connected = false;
    }
}
