//! Run configuration
//!
//! Layers, later wins:
//!
//! 1. Built-in defaults
//! 2. A TOML or JSON file (format taken from the extension)
//! 3. `REELVAULT__<SECTION>__<KEY>` environment variables, e.g.
//!    `REELVAULT__STORAGE__STORAGE_TYPE=relational`
//!
//! Command-line flags are applied on top by the binary.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;
use crate::fetcher::FetcherConfig;
use crate::pipeline::PipelineConfig;
use crate::storage::StorageDescriptor;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "REELVAULT";

/// Separator between prefix, section and key in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub storage: StorageDescriptor,
    pub fetcher: FetcherConfig,
    pub pipeline: PipelineConfig,
}

impl IngestConfig {
    /// Load defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Load(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: IngestConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        debug!(
            storage_type = %config.storage.kind,
            jobs = config.pipeline.jobs.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validate every section; storage fields are checked by the factory as well
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fetcher.validate()?;
        self.pipeline.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline::IngestJob;
    use crate::storage::StorageType;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        let config = IngestConfig::load_with_prefix(None, "REELVAULT_TEST_NOTHING_SET").unwrap();
        assert_eq!(config, IngestConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.location.as_deref(), Some("data/"));
        assert_eq!(config.fetcher.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            r#"
            [storage]
            storage_type = "relational"

            [storage.connection]
            host = "db.local"
            user = "reel"
            password = "secret"
            database = "reelvault"

            [fetcher]
            timeout_secs = 5

            [pipeline]
            fetch_concurrency = 2

            [[pipeline.jobs]]
            kind = "trending"

            [[pipeline.jobs]]
            kind = "user"
            id = "42"
            "#,
        );

        let config = IngestConfig::load_with_prefix(Some(file.path()), "REELVAULT_TEST_TOML").unwrap();
        assert_eq!(config.storage.kind, StorageType::Relational);
        assert_eq!(config.storage.connection.host.as_deref(), Some("db.local"));
        assert_eq!(config.storage.connection.port, None);
        assert_eq!(config.fetcher.timeout_secs, 5);
        assert_eq!(config.fetcher.max_retries, 3);
        assert_eq!(config.pipeline.fetch_concurrency, 2);
        assert_eq!(
            config.pipeline.jobs,
            vec![
                IngestJob::Trending { page: 1, count: 20 },
                IngestJob::User { id: "42".to_string() },
            ]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_json() {
        let file = write_config(
            ".json",
            r#"{"storage": {"storage_type": "file", "storage_location": "/tmp/reels"}}"#,
        );
        let config = IngestConfig::load_with_prefix(Some(file.path()), "REELVAULT_TEST_JSON").unwrap();
        assert_eq!(config.storage.location.as_deref(), Some("/tmp/reels"));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let file = write_config(".toml", "[fetcher]\nmax_retries = 5\n");
        std::env::set_var("REELVAULT_TEST_ENV__FETCHER__MAX_RETRIES", "7");
        std::env::set_var("REELVAULT_TEST_ENV__STORAGE__STORAGE_TYPE", "document");

        let config = IngestConfig::load_with_prefix(Some(file.path()), "REELVAULT_TEST_ENV");
        std::env::remove_var("REELVAULT_TEST_ENV__FETCHER__MAX_RETRIES");
        std::env::remove_var("REELVAULT_TEST_ENV__STORAGE__STORAGE_TYPE");

        let config = config.unwrap();
        assert_eq!(config.fetcher.max_retries, 7);
        assert_eq!(config.storage.kind, StorageType::Document);
    }

    #[test]
    #[serial]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/reelvault.example.toml");
        let config = IngestConfig::load_with_prefix(Some(&path), "REELVAULT_TEST_EXAMPLE").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.jobs, crate::pipeline::default_jobs());
    }

    #[test]
    #[serial]
    fn test_missing_file_is_load_error() {
        let err = IngestConfig::load_with_prefix(Some(Path::new("/definitely/not/here.toml")), "X").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = IngestConfig::default();
        config.fetcher.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.pipeline.fetch_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
