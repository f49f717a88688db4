use crate::downloader::job::Job;
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Executes one job to a terminal state.
///
/// The pool stays agnostic of what a job actually does; the orchestrator
/// supplies the runner that wires in the fetcher, tagger and aggregator.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    /// Run the job through its lifecycle, reporting progress and the
    /// terminal state to the aggregator.
    async fn run(&self, job: Job);

    /// Mark a job that will never execute (discarded at shutdown, or whose
    /// task died unexpectedly) as failed and report it, so per-batch
    /// accounting still sees exactly one terminal signal for it.
    fn abandon(&self, job: Job, reason: String);
}

/// Bounded concurrent executor for download jobs.
///
/// Jobs are pulled from an internal FIFO queue by a fixed number of worker
/// tasks, so at most `workers` jobs execute at once while `submit` never
/// blocks the caller.
pub struct WorkerPool {
    job_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    discard_queued: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn a pool with the given number of worker tasks.
    pub fn new(workers: usize, runner: Arc<dyn JobRunner>) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let queue = Arc::new(tokio::sync::Mutex::new(job_rx));
        let discard_queued = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for worker_id in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            let runner = Arc::clone(&runner);
            let discard = Arc::clone(&discard_queued);
            handles.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, queue, runner, discard).await;
            }));
        }

        Self {
            job_tx: std::sync::Mutex::new(Some(job_tx)),
            workers: tokio::sync::Mutex::new(handles),
            discard_queued,
        }
    }

    /// Queue a job for execution, in submission order. Non-blocking.
    pub fn submit(&self, job: Job) -> Result<()> {
        let guard = self.job_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|e| DownloaderError::Concurrency(format!("Worker pool queue closed: {}", e))),
            None => Err(DownloaderError::Concurrency(
                "Worker pool is shut down".to_string(),
            )),
        }
    }

    /// Stop accepting submissions and wait for the workers to exit.
    ///
    /// With `drain_pending` every queued and in-flight job reaches a terminal
    /// state before this returns. Without it, in-flight jobs still run to
    /// completion (partial writes are never abandoned mid-write) but
    /// queued-not-yet-started jobs are handed to `JobRunner::abandon`.
    pub async fn shutdown(&self, drain_pending: bool) {
        if !drain_pending {
            self.discard_queued.store(true, Ordering::SeqCst);
        }

        // Closing the channel lets each worker drain out and exit.
        self.job_tx.lock().unwrap().take();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker task failed during shutdown: {}", e);
            }
        }
    }

    async fn worker_loop(
        worker_id: usize,
        queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
        runner: Arc<dyn JobRunner>,
        discard: Arc<AtomicBool>,
    ) {
        loop {
            // Lock only around the receive so an idle worker never starves
            // the others once a job has been handed out.
            let job = { queue.lock().await.recv().await };
            let Some(job) = job else { break };

            if discard.load(Ordering::SeqCst) {
                runner.abandon(job, "discarded during shutdown".to_string());
                continue;
            }

            // Run the job in its own task so a panic is contained at the job
            // boundary instead of taking the worker down with it.
            let snapshot = job.clone();
            let job_runner = Arc::clone(&runner);
            let handle = tokio::spawn(async move { job_runner.run(job).await });
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Job {} panicked: {}", snapshot.id, e);
                    runner.abandon(snapshot, format!("job panicked: {}", e));
                }
            }
        }
        debug!("Worker {} exiting", worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::job::BatchId;
    use crate::downloader::TrackRecord;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    fn test_job(n: usize) -> Job {
        Job::build(
            TrackRecord {
                id: n.to_string(),
                title: format!("Track {}", n),
                ..Default::default()
            },
            Path::new("songs"),
            BatchId::new_v4(),
        )
    }

    /// Runner that blocks each job on a gate and records peak concurrency.
    struct GatedRunner {
        gate: Semaphore,
        active: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
        abandoned: Mutex<Vec<String>>,
    }

    impl GatedRunner {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                done: AtomicUsize::new(0),
                abandoned: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run(&self, _job: Job) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let permit = self.gate.acquire().await.unwrap();
            permit.forget();

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
        }

        fn abandon(&self, job: Job, _reason: String) {
            self.abandoned.lock().unwrap().push(job.id);
        }
    }

    async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) {
        timeout(deadline, async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn pool_never_exceeds_worker_capacity() {
        let runner = Arc::new(GatedRunner::new());
        let pool = WorkerPool::new(2, Arc::clone(&runner) as Arc<dyn JobRunner>);

        for n in 0..5 {
            pool.submit(test_job(n)).unwrap();
        }

        wait_until(Duration::from_secs(2), || {
            runner.active.load(Ordering::SeqCst) == 2
        })
        .await;

        // Queue holds 3 more jobs but no third slot opens up.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runner.peak.load(Ordering::SeqCst), 2);

        runner.gate.add_permits(5);
        pool.shutdown(true).await;

        assert_eq!(runner.done.load(Ordering::SeqCst), 5);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn drain_shutdown_waits_for_every_accepted_job() {
        let runner = Arc::new(GatedRunner::new());
        let pool = WorkerPool::new(4, Arc::clone(&runner) as Arc<dyn JobRunner>);

        for n in 0..10 {
            pool.submit(test_job(n)).unwrap();
        }
        runner.gate.add_permits(10);

        pool.shutdown(true).await;

        assert_eq!(runner.done.load(Ordering::SeqCst), 10);
        assert!(runner.abandoned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_drain_shutdown_abandons_queued_jobs_but_finishes_inflight() {
        let runner = Arc::new(GatedRunner::new());
        let pool = Arc::new(WorkerPool::new(1, Arc::clone(&runner) as Arc<dyn JobRunner>));

        for n in 0..5 {
            pool.submit(test_job(n)).unwrap();
        }

        wait_until(Duration::from_secs(2), || {
            runner.active.load(Ordering::SeqCst) == 1
        })
        .await;

        let shutdown_pool = Arc::clone(&pool);
        let shutdown = tokio::spawn(async move { shutdown_pool.shutdown(false).await });

        // The in-flight job is still gated; release it so the worker can
        // finish it and then discard the rest of the queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.gate.add_permits(5);
        shutdown.await.unwrap();

        assert_eq!(runner.done.load(Ordering::SeqCst), 1, "in-flight job should finish");
        assert_eq!(runner.abandoned.lock().unwrap().len(), 4, "queued jobs should be abandoned");
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let runner = Arc::new(GatedRunner::new());
        let pool = WorkerPool::new(1, Arc::clone(&runner) as Arc<dyn JobRunner>);
        pool.shutdown(true).await;

        let result = pool.submit(test_job(0));
        assert!(matches!(result, Err(DownloaderError::Concurrency(_))));
    }

    /// Runner that panics on one job id.
    struct PanickyRunner {
        poison: String,
        done: AtomicUsize,
        abandoned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobRunner for PanickyRunner {
        async fn run(&self, job: Job) {
            if job.id == self.poison {
                panic!("boom");
            }
            self.done.fetch_add(1, Ordering::SeqCst);
        }

        fn abandon(&self, job: Job, _reason: String) {
            self.abandoned.lock().unwrap().push(job.id);
        }
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_its_worker() {
        let runner = Arc::new(PanickyRunner {
            poison: "single:1".to_string(),
            done: AtomicUsize::new(0),
            abandoned: Mutex::new(Vec::new()),
        });
        let pool = WorkerPool::new(1, Arc::clone(&runner) as Arc<dyn JobRunner>);

        for n in 0..3 {
            pool.submit(test_job(n)).unwrap();
        }
        pool.shutdown(true).await;

        assert_eq!(runner.done.load(Ordering::SeqCst), 2);
        assert_eq!(runner.abandoned.lock().unwrap().as_slice(), ["single:1"]);
    }
}
