//! Ingestion pipeline: fetch → normalize → persist
//!
//! Jobs are fetched concurrently through an ordered buffered stream and
//! persisted one job at a time, in job order. A failing job is recorded
//! against its entity kind and the run moves on; only config, connect and
//! schema failures abort a run.

use futures::stream::{self, StreamExt};
use reelvault_common::types::{EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{ConfigError, FetchError, IngestError, SaveError};
use crate::fetcher::{FetchRequest, Fetched, Fetcher, HttpClient};
use crate::storage::{BackendFactory, StorageBackend, StorageDescriptor};

/// Default number of jobs fetched at the same time.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

fn default_page() -> u32 {
    1
}

fn default_count() -> u32 {
    20
}

/// One configured unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestJob {
    Trending {
        #[serde(default = "default_page")]
        page: u32,
        #[serde(default = "default_count")]
        count: u32,
    },
    /// Search, then fetch every hit as a full video
    Search {
        keyword: String,
        #[serde(default = "default_page")]
        page: u32,
        #[serde(default = "default_count")]
        count: u32,
    },
    Video {
        id: String,
    },
    User {
        id: String,
    },
    Hashtag {
        tag: String,
        #[serde(default = "default_page")]
        page: u32,
        #[serde(default = "default_count")]
        count: u32,
    },
}

impl IngestJob {
    /// Kind the job's records are stored and counted under
    pub fn kind(&self) -> EntityKind {
        self.request().kind()
    }

    pub fn request(&self) -> FetchRequest {
        match self {
            IngestJob::Trending { page, count } => FetchRequest::Trending {
                page: *page,
                count: *count,
            },
            IngestJob::Search {
                keyword,
                page,
                count,
            } => FetchRequest::Search {
                keyword: keyword.clone(),
                page: *page,
                count: *count,
            },
            IngestJob::Video { id } => FetchRequest::Video { id: id.clone() },
            IngestJob::User { id } => FetchRequest::User { id: id.clone() },
            IngestJob::Hashtag { tag, page, count } => FetchRequest::Hashtag {
                tag: tag.clone(),
                page: *page,
                count: *count,
            },
        }
    }
}

/// The stock run: trending, a search for the hot-list keyword, one
/// profile and one hashtag challenge
pub fn default_jobs() -> Vec<IngestJob> {
    vec![
        IngestJob::Trending { page: 1, count: 20 },
        IngestJob::Search {
            keyword: "抖音热搜".to_string(),
            page: 1,
            count: 50,
        },
        IngestJob::User {
            id: "123456789".to_string(),
        },
        IngestJob::Hashtag {
            tag: "热搜2024".to_string(),
            page: 1,
            count: 20,
        },
    ]
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch_concurrency: usize,

    /// Jobs in run order; empty means [`default_jobs`]
    pub jobs: Vec<IngestJob>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            jobs: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.fetch_concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured jobs, or the stock run when none are configured
    pub fn effective_jobs(&self) -> Vec<IngestJob> {
        if self.jobs.is_empty() {
            default_jobs()
        } else {
            self.jobs.clone()
        }
    }
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Fetching(EntityKind),
    Persisting(EntityKind),
    Done,
    Cancelled,
}

/// Per-kind outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    /// Records obtained from the source
    pub fetched: usize,
    /// Records persisted
    pub saved: usize,
    /// Fetch and save failures
    pub failed: usize,
    pub errors: Vec<String>,
}

impl KindSummary {
    fn record_fetch_error(&mut self, err: &FetchError) {
        self.failed += 1;
        self.errors.push(err.to_string());
    }

    fn record_save_error(&mut self, key: &str, err: &SaveError) {
        self.failed += 1;
        self.errors.push(format!("{}: {}", key, err));
    }
}

/// Terminal value of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub per_kind: BTreeMap<EntityKind, KindSummary>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn kind(&self, kind: EntityKind) -> Option<&KindSummary> {
        self.per_kind.get(&kind)
    }

    pub fn total_saved(&self) -> usize {
        self.per_kind.values().map(|k| k.saved).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.per_kind.values().map(|k| k.failed).sum()
    }
}

/// Records and failures produced by fetching one job
struct JobFetch {
    kind: EntityKind,
    records: Vec<EntityRecord>,
    errors: Vec<FetchError>,
}

/// Drives configured jobs from a fetcher into one backend
pub struct IngestionPipeline<'a, C, B: ?Sized> {
    fetcher: &'a Fetcher<C>,
    backend: &'a B,
    jobs: Vec<IngestJob>,
    fetch_concurrency: usize,
    state: PipelineState,
}

impl<'a, C, B> IngestionPipeline<'a, C, B>
where
    C: HttpClient,
    B: StorageBackend + ?Sized,
{
    pub fn new(fetcher: &'a Fetcher<C>, backend: &'a B, jobs: Vec<IngestJob>) -> Self {
        Self {
            fetcher,
            backend,
            jobs,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            state: PipelineState::Idle,
        }
    }

    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Pipeline state");
            self.state = next;
        }
    }

    /// Run every job once
    pub async fn run(&mut self, cancel: &CancellationToken) -> RunSummary {
        let span = info_span!(
            "ingestion_run",
            backend = self.backend.name(),
            jobs = self.jobs.len()
        );
        self.run_jobs(cancel).instrument(span).await
    }

    async fn run_jobs(&mut self, cancel: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary::default();
        for job in &self.jobs {
            summary.per_kind.entry(job.kind()).or_default();
        }

        let jobs = self.jobs.clone();
        let fetcher = self.fetcher;
        let concurrency = self.fetch_concurrency;
        // Bounds requests in flight across jobs and search hits alike
        let in_flight = Semaphore::new(concurrency);
        let mut fetches = stream::iter(jobs.iter())
            .map(|job| fetch_job(fetcher, job, &in_flight, concurrency))
            .buffered(concurrency);

        info!(jobs = jobs.len(), concurrency, "Starting ingestion run");

        for job in &jobs {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.transition(PipelineState::Fetching(job.kind()));

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                next = fetches.next() => match next {
                    Some(fetched) => fetched,
                    None => break,
                },
            };

            self.transition(PipelineState::Persisting(fetched.kind));
            let entry = summary.per_kind.entry(fetched.kind).or_default();
            entry.fetched += fetched.records.len();
            for err in &fetched.errors {
                warn!(kind = %fetched.kind, error = %err, "Fetch failed");
                entry.record_fetch_error(err);
            }

            if fetched.records.is_empty() {
                continue;
            }

            match self.backend.save_batch(&fetched.records, cancel).await {
                Ok(batch) => {
                    entry.saved += batch.succeeded.len();
                    for (key, err) in &batch.failed {
                        entry.record_save_error(key, err);
                    }
                    if batch.skipped > 0 {
                        summary.cancelled = true;
                        break;
                    }
                },
                Err(err) => {
                    for record in &fetched.records {
                        entry.record_save_error(&record.key(), &err);
                    }
                },
            }
        }

        let final_state = if summary.cancelled {
            PipelineState::Cancelled
        } else {
            PipelineState::Done
        };
        self.transition(final_state);

        info!(
            saved = summary.total_saved(),
            failed = summary.total_failed(),
            cancelled = summary.cancelled,
            "Ingestion run finished"
        );
        summary
    }
}

async fn fetch_job<C: HttpClient>(
    fetcher: &Fetcher<C>,
    job: &IngestJob,
    in_flight: &Semaphore,
    concurrency: usize,
) -> JobFetch {
    let kind = job.kind();
    let mut out = JobFetch {
        kind,
        records: Vec::new(),
        errors: Vec::new(),
    };

    let fetched = {
        let _permit = in_flight.acquire().await.ok();
        fetcher.fetch(&job.request()).await
    };

    match fetched {
        Ok(Fetched::Record(record)) => out.records.push(record),
        Ok(Fetched::Summaries(hits)) => {
            debug!(hits = hits.len(), "Fetching full videos for search hits");
            let mut videos = stream::iter(hits.iter())
                .map(|hit| async move {
                    let _permit = in_flight.acquire().await.ok();
                    fetcher.fetch_video(&hit.id).await
                })
                .buffered(concurrency);
            while let Some(result) = videos.next().await {
                match result {
                    Ok(video) => out.records.push(EntityRecord::Video(video)),
                    Err(err) => out.errors.push(err),
                }
            }
        },
        Err(err) => out.errors.push(err),
    }

    out
}

/// Run the pipeline against an already constructed backend
///
/// Connects, ensures the schema, runs every job and closes the backend on
/// every path.
pub async fn run_with_backend<C, B>(
    backend: &mut B,
    fetcher: &Fetcher<C>,
    pipeline: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary, IngestError>
where
    C: HttpClient,
    B: StorageBackend,
{
    let outcome = connect_and_run(backend, fetcher, pipeline, cancel).await;
    backend.close().await;
    outcome
}

async fn connect_and_run<C, B>(
    backend: &mut B,
    fetcher: &Fetcher<C>,
    pipeline: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary, IngestError>
where
    C: HttpClient,
    B: StorageBackend,
{
    pipeline.validate()?;
    backend.connect().await?;
    backend.ensure_schema().await?;

    let mut run = IngestionPipeline::new(fetcher, &*backend, pipeline.effective_jobs())
        .with_fetch_concurrency(pipeline.fetch_concurrency);
    Ok(run.run(cancel).await)
}

/// Build the configured backend and run the pipeline through it
pub async fn run_ingestion<C: HttpClient>(
    descriptor: &StorageDescriptor,
    fetcher: &Fetcher<C>,
    pipeline: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary, IngestError> {
    let mut backend = BackendFactory::create(descriptor)?;
    info!(backend = backend.name(), "Storage backend selected");
    run_with_backend(&mut backend, fetcher, pipeline, cancel).await
}
