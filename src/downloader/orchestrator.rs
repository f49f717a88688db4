use crate::config::Config;
use crate::downloader::job::{BatchId, Job, JobState};
use crate::downloader::pool::{JobRunner, WorkerPool};
use crate::downloader::progress::{ProgressAggregator, ProgressEvent};
use crate::downloader::{AudioFetcher, MetadataResolver, RefKind, TagWriter, TrackRecord};
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One collection-level request: the jobs it expanded into, fixed at creation.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub batch_id: BatchId,
    pub total: usize,
    /// Pending snapshots in dispatch order
    pub jobs: Vec<Job>,
}

/// Runs one job through fetch and tag, reporting every step to the
/// aggregator. Errors stop at the job boundary: they are recorded on the job
/// and surface only through its terminal event.
struct TrackRunner {
    fetcher: Arc<dyn AudioFetcher>,
    tagger: Arc<dyn TagWriter>,
    aggregator: Arc<ProgressAggregator>,
}

#[async_trait]
impl JobRunner for TrackRunner {
    async fn run(&self, mut job: Job) {
        job.transition(JobState::Fetching);
        self.aggregator.started(&job);
        self.aggregator.update(job.batch_id, &job.id, 0, job.total);

        let stem = job.target_stem();
        match self
            .fetcher
            .fetch(&job.track.title, &job.track.artist, &stem)
            .await
        {
            Ok(audio_path) => {
                job.transition(JobState::Tagging);
                let tagged = self
                    .tagger
                    .write(
                        &audio_path,
                        &job.track.title,
                        &job.track.artist,
                        &job.track.album,
                        job.track.cover_url.as_deref(),
                    )
                    .await;

                match tagged {
                    Ok(()) => {
                        job.current = job.total;
                        job.transition(JobState::Completed);
                        self.aggregator.update(job.batch_id, &job.id, job.total, job.total);
                        info!("Downloaded {} -> {}", job.track.title, audio_path.display());
                    }
                    Err(e) => {
                        // The fetched audio file stays on disk; a metadata
                        // failure never deletes the media.
                        warn!("Tagging failed for {}: {}", job.track.title, e);
                        job.fail(e.to_string());
                    }
                }
            }
            Err(e) => {
                warn!("Fetch failed for {}: {}", job.track.title, e);
                job.fail(e.to_string());
            }
        }

        self.aggregator.complete(&job);
    }

    fn abandon(&self, mut job: Job, reason: String) {
        job.fail(reason);
        self.aggregator.complete(&job);
    }
}

/// Top-level download API: expands references into jobs, fans them out over
/// the worker pool and exposes the progress event stream.
pub struct Orchestrator {
    resolver: Arc<dyn MetadataResolver>,
    pool: WorkerPool,
    aggregator: Arc<ProgressAggregator>,
    download_directory: PathBuf,
    events: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ProgressEvent>>>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        resolver: Arc<dyn MetadataResolver>,
        fetcher: Arc<dyn AudioFetcher>,
        tagger: Arc<dyn TagWriter>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let aggregator = Arc::new(ProgressAggregator::new(event_tx));

        let runner = Arc::new(TrackRunner {
            fetcher,
            tagger,
            aggregator: Arc::clone(&aggregator),
        });
        let pool = WorkerPool::new(config.max_workers, runner);

        Self {
            resolver,
            pool,
            aggregator,
            download_directory: config.download_directory.clone(),
            events: std::sync::Mutex::new(Some(event_rx)),
        }
    }

    /// Take the progress event stream. Can be consumed once, by whatever
    /// presentation layer is driving this orchestrator.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<ProgressEvent>> {
        self.events.lock().unwrap().take()
    }

    /// Download a reference, routing to single-track or collection handling
    /// based on the resolver's classification.
    pub async fn download(&self, reference: &str) -> Result<BatchRequest> {
        match self.resolver.classify(reference) {
            RefKind::Collection => self.download_collection(reference).await,
            RefKind::Track => {
                let job = self.download_track(reference).await?;
                Ok(BatchRequest {
                    batch_id: job.batch_id,
                    total: 1,
                    jobs: vec![job],
                })
            }
        }
    }

    /// Resolve and submit a single track. Resolution errors are returned
    /// here; download errors arrive through the event stream.
    pub async fn download_track(&self, reference: &str) -> Result<Job> {
        let track = self.resolver.resolve_track(reference).await?;
        let batch_id = BatchId::new_v4();

        let job = Job::build(track, &self.download_directory, batch_id);
        let snapshot = job.clone();

        self.aggregator.register(batch_id, 1);
        if let Err(e) = self.pool.submit(job) {
            self.abandon_unsubmitted(snapshot, &e);
            return Err(e);
        }
        Ok(snapshot)
    }

    /// Resolve a collection and submit a job per track, in resolver order.
    ///
    /// The batch total is fixed before the first submission, so the batch
    /// completion signal cannot fire early however the jobs interleave.
    pub async fn download_collection(&self, reference: &str) -> Result<BatchRequest> {
        let tracks = self.resolver.resolve_collection(reference).await?;
        let batch_id = BatchId::new_v4();

        let jobs: Vec<Job> = tracks
            .into_iter()
            .map(|track| Job::build(track, &self.download_directory, batch_id))
            .collect();
        let total = jobs.len();

        info!("Submitting batch {} with {} tracks", batch_id, total);
        self.aggregator.register(batch_id, total);
        for (submitted, job) in jobs.iter().enumerate() {
            if let Err(e) = self.pool.submit(job.clone()) {
                // Jobs already in the pool will report their own terminal
                // state; fail the rest here so the batch still closes at
                // exactly `total` terminal signals.
                warn!(
                    "Submission failed after {} of {} jobs in batch {}: {}",
                    submitted, total, batch_id, e
                );
                for unsubmitted in &jobs[submitted..] {
                    self.abandon_unsubmitted(unsubmitted.clone(), &e);
                }
                return Err(e);
            }
        }

        Ok(BatchRequest { batch_id, total, jobs })
    }

    /// Close the books on a job the pool never accepted.
    fn abandon_unsubmitted(&self, mut job: Job, error: &DownloaderError) {
        job.fail(error.to_string());
        self.aggregator.complete(&job);
    }

    /// Free-text search, capped at `limit` results. No jobs are created.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRecord>> {
        let mut results = self.resolver.search(query, limit).await?;
        results.truncate(limit);
        Ok(results)
    }

    /// Drain the worker pool: every accepted job reaches a terminal state
    /// before this returns.
    pub async fn shutdown(&self) {
        self.pool.shutdown(true).await;
    }
}
