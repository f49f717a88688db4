use crate::downloader::job::{BatchId, Job, JobId, JobState};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Progress event delivered to the presentation layer.
///
/// Events are pushed over a channel so the core never has to know what
/// thread, if any, the consumer renders on.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    JobStarted {
        batch_id: BatchId,
        job_id: JobId,
        title: String,
    },
    JobProgress {
        batch_id: BatchId,
        job_id: JobId,
        current: u64,
        total: u64,
    },
    /// Terminal per-job signal, sent exactly once per job
    JobFinished {
        batch_id: BatchId,
        job_id: JobId,
        state: JobState,
        error: Option<String>,
    },
    /// Sent exactly once per batch, strictly after every `JobFinished` of
    /// that batch
    BatchFinished {
        batch_id: BatchId,
        completed: usize,
        failed: usize,
    },
}

struct BatchProgress {
    total: usize,
    completed: usize,
    failed: usize,
}

impl BatchProgress {
    fn terminal_count(&self) -> usize {
        self.completed + self.failed
    }
}

/// Tracks per-job and per-batch completion and pushes events to the sink.
///
/// Counter mutation and the completion check happen inside one critical
/// section, so two workers finishing simultaneously can neither double-fire
/// the batch signal nor both skip it.
pub struct ProgressAggregator {
    batches: Mutex<HashMap<BatchId, BatchProgress>>,
    events: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressAggregator {
    pub fn new(events: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Register a batch before any of its jobs are submitted.
    ///
    /// An empty batch is already complete and fires its signal immediately.
    pub fn register(&self, batch_id: BatchId, total: usize) {
        let mut batches = self.batches.lock().unwrap();
        if total == 0 {
            let _ = self.events.send(ProgressEvent::BatchFinished {
                batch_id,
                completed: 0,
                failed: 0,
            });
            return;
        }
        batches.insert(
            batch_id,
            BatchProgress {
                total,
                completed: 0,
                failed: 0,
            },
        );
        debug!("Registered batch {} with {} jobs", batch_id, total);
    }

    /// Report that a job has started executing
    pub fn started(&self, job: &Job) {
        let _ = self.events.send(ProgressEvent::JobStarted {
            batch_id: job.batch_id,
            job_id: job.id.clone(),
            title: job.track.title.clone(),
        });
    }

    /// Report step progress for a running job
    pub fn update(&self, batch_id: BatchId, job_id: &str, current: u64, total: u64) {
        let _ = self.events.send(ProgressEvent::JobProgress {
            batch_id,
            job_id: job_id.to_string(),
            current,
            total,
        });
    }

    /// Report a job's terminal state.
    ///
    /// Fires the batch-completion event when this was the last outstanding
    /// job of its batch, then releases the batch bookkeeping.
    pub fn complete(&self, job: &Job) {
        let mut batches = self.batches.lock().unwrap();

        let _ = self.events.send(ProgressEvent::JobFinished {
            batch_id: job.batch_id,
            job_id: job.id.clone(),
            state: job.state,
            error: job.error.clone(),
        });

        let Some(batch) = batches.get_mut(&job.batch_id) else {
            warn!("Terminal signal for unregistered batch {}", job.batch_id);
            return;
        };

        match job.state {
            JobState::Completed => batch.completed += 1,
            JobState::Failed => batch.failed += 1,
            other => {
                warn!("Non-terminal state {} reported as terminal for job {}", other, job.id);
                return;
            }
        }

        if batch.terminal_count() == batch.total {
            let _ = self.events.send(ProgressEvent::BatchFinished {
                batch_id: job.batch_id,
                completed: batch.completed,
                failed: batch.failed,
            });
            batches.remove(&job.batch_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::TrackRecord;
    use std::path::Path;
    use std::sync::Arc;

    fn job_in_state(batch_id: BatchId, track_id: &str, state: JobState) -> Job {
        let mut job = Job::build(
            TrackRecord {
                id: track_id.to_string(),
                title: format!("Track {}", track_id),
                ..Default::default()
            },
            Path::new("songs"),
            batch_id,
        );
        job.state = state;
        job
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn batch_fires_exactly_once_after_all_terminal_signals() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let aggregator = ProgressAggregator::new(tx);
        let batch_id = BatchId::new_v4();
        aggregator.register(batch_id, 3);

        aggregator.complete(&job_in_state(batch_id, "a", JobState::Completed));
        aggregator.complete(&job_in_state(batch_id, "b", JobState::Failed));

        let early = drain(&mut rx);
        assert_eq!(early.len(), 2);
        assert!(
            !early.iter().any(|e| matches!(e, ProgressEvent::BatchFinished { .. })),
            "batch fired before all jobs were terminal"
        );

        aggregator.complete(&job_in_state(batch_id, "c", JobState::Completed));

        let rest = drain(&mut rx);
        let finished: Vec<_> = rest
            .iter()
            .filter(|e| matches!(e, ProgressEvent::BatchFinished { .. }))
            .collect();
        assert_eq!(finished.len(), 1);
        match finished[0] {
            ProgressEvent::BatchFinished { completed, failed, .. } => {
                assert_eq!((*completed, *failed), (2, 1));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn concurrent_terminal_signals_do_not_double_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let aggregator = Arc::new(ProgressAggregator::new(tx));
        let batch_id = BatchId::new_v4();
        let total = 32;
        aggregator.register(batch_id, total);

        let mut handles = Vec::new();
        for i in 0..total {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                aggregator.complete(&job_in_state(batch_id, &i.to_string(), JobState::Completed));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = drain(&mut rx);
        let batch_events = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::BatchFinished { .. }))
            .count();
        let job_events = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::JobFinished { .. }))
            .count();
        assert_eq!(job_events, total);
        assert_eq!(batch_events, 1);

        // Batch signal is ordered after every per-job terminal signal.
        assert!(matches!(events.last(), Some(ProgressEvent::BatchFinished { .. })));
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let aggregator = ProgressAggregator::new(tx);
        aggregator.register(BatchId::new_v4(), 0);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [ProgressEvent::BatchFinished { completed: 0, failed: 0, .. }]
        ));
    }

    #[tokio::test]
    async fn updates_are_forwarded_without_touching_counters() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let aggregator = ProgressAggregator::new(tx);
        let batch_id = BatchId::new_v4();
        aggregator.register(batch_id, 1);

        aggregator.update(batch_id, "single:a", 0, 1);
        aggregator.update(batch_id, "single:a", 1, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, ProgressEvent::JobProgress { .. })));
    }
}
