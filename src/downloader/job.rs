use crate::downloader::TrackRecord;
use crate::utils::Utils;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Target audio extension for fetched files
pub const AUDIO_EXTENSION: &str = "mp3";

/// Stable job identifier, derived from the track and its source collection
pub type JobId = String;

/// Identifier of one batch of jobs submitted together
pub type BatchId = uuid::Uuid;

/// Lifecycle states of a download job.
///
/// `Completed` and `Failed` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Fetching,
    Tagging,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "Pending"),
            JobState::Fetching => write!(f, "Fetching"),
            JobState::Tagging => write!(f, "Tagging"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}

/// One track's download + tag lifecycle.
///
/// Owned by the worker slot executing it until terminal; the progress
/// aggregator only ever sees read-only snapshots.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub batch_id: BatchId,
    pub track: TrackRecord,
    pub target_path: PathBuf,
    pub state: JobState,
    pub error: Option<String>,
    pub current: u64,
    pub total: u64,
}

impl Job {
    /// Build a job for a resolved track.
    ///
    /// The target path is deterministic for a given (title, target dir), so
    /// re-running the same request overwrites instead of duplicating. No I/O.
    pub fn build(track: TrackRecord, target_dir: &Path, batch_id: BatchId) -> Self {
        let sanitized = Utils::sanitize_filename(&track.title);
        let file_name = if sanitized.ends_with(&format!(".{}", AUDIO_EXTENSION)) {
            sanitized
        } else {
            format!("{}.{}", sanitized, AUDIO_EXTENSION)
        };

        let id = match &track.collection_id {
            Some(collection) => format!("{}:{}", collection, track.id),
            None => format!("single:{}", track.id),
        };

        Self {
            id,
            batch_id,
            target_path: target_dir.join(file_name),
            track,
            state: JobState::Pending,
            error: None,
            current: 0,
            total: 1,
        }
    }

    /// Target path with the audio extension stripped, handed to the fetcher
    /// which appends the extension of whatever it transcodes to.
    pub fn target_stem(&self) -> PathBuf {
        self.target_path.with_extension("")
    }

    /// Advance the state machine. Transitions out of a terminal state are
    /// ignored, so a job can never regress once finished.
    pub fn transition(&mut self, next: JobState) {
        if self.state.is_terminal() {
            warn!(
                "Ignoring transition {} -> {} for job {}",
                self.state, next, self.id
            );
            return;
        }
        self.state = next;
    }

    /// Record a failure and move to the terminal `Failed` state.
    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.transition(JobState::Failed);
    }
}
