pub mod audio;
pub mod job;
pub mod metadata;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod spotify;

pub use job::{BatchId, Job, JobId, JobState};
pub use orchestrator::{BatchRequest, Orchestrator};
pub use pool::WorkerPool;
pub use progress::{ProgressAggregator, ProgressEvent};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Track metadata resolved from the source catalog.
///
/// Read-only input to a job; the core never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackRecord {
    /// Catalog identifier of the track
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// URL of the cover art image, if the catalog provides one
    pub cover_url: Option<String>,
    /// Identifier of the playlist/album this record came from, if any
    pub collection_id: Option<String>,
}

/// Shape of a request reference as classified by the metadata resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Track,
    Collection,
}

/// Resolves references and free-text queries into track records.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Classify a reference as a single track or a collection
    fn classify(&self, reference: &str) -> RefKind;

    /// Resolve a single-track reference
    async fn resolve_track(&self, reference: &str) -> Result<TrackRecord>;

    /// Resolve a collection reference into its tracks, in catalog order
    async fn resolve_collection(&self, reference: &str) -> Result<Vec<TrackRecord>>;

    /// Free-text track search
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRecord>>;
}

/// Retrieves an audio stream for a track and transcodes it to disk.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch audio for (title, artist) into `dest_stem` + the fetcher's
    /// extension, returning the final file path.
    async fn fetch(&self, title: &str, artist: &str, dest_stem: &Path) -> Result<PathBuf>;
}

/// Embeds track metadata into a finished audio file.
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write(
        &self,
        file_path: &Path,
        title: &str,
        artist: &str,
        album: &str,
        cover_url: Option<&str>,
    ) -> Result<()>;
}
