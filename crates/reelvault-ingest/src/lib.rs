//! ReelVault Ingest Library
//!
//! Fetches short-video platform entities and persists them through a
//! pluggable storage backend.
//!
//! # Components
//!
//! - **fetcher**: one request per entity kind, with timeouts and retries
//! - **storage**: the [`StorageBackend`](storage::StorageBackend) contract and
//!   its file, relational and document variants
//! - **pipeline**: runs configured jobs from the fetcher into one backend
//! - **config**: file and environment configuration
//!
//! # Example
//!
//! ```no_run
//! use reelvault_ingest::fetcher::{Fetcher, FetcherConfig};
//! use reelvault_ingest::pipeline::{run_ingestion, PipelineConfig};
//! use reelvault_ingest::storage::StorageDescriptor;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Fetcher::from_config(FetcherConfig::default())?;
//!     let summary = run_ingestion(
//!         &StorageDescriptor::file("./data"),
//!         &fetcher,
//!         &PipelineConfig::default(),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!     println!("saved {} records", summary.total_saved());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod storage;

pub use error::{ConfigError, ConnectError, FetchError, IngestError, QueryError, SaveError, SchemaError};
