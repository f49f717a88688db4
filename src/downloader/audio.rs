use crate::downloader::job::AUDIO_EXTENSION;
use crate::downloader::AudioFetcher;
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Audio fetcher backed by the yt-dlp executable.
///
/// Searches YouTube for "{title} {artist}", downloads the best audio stream
/// and lets yt-dlp's ffmpeg postprocessor transcode it to mp3 next to the
/// requested stem.
pub struct YtDlpFetcher {
    executable_path: String,
    audio_quality: u32,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self {
            executable_path: "yt-dlp".to_string(),
            audio_quality: 192,
        }
    }

    /// Check if yt-dlp is available
    pub async fn is_available(&self) -> bool {
        AsyncCommand::new(&self.executable_path)
            .arg("--version")
            .output()
            .await
            .is_ok()
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(&self, title: &str, artist: &str, dest_stem: &Path) -> Result<PathBuf> {
        let search_query = format!("ytsearch1:{} {}", title, artist);
        let output_template = format!("{}.%(ext)s", dest_stem.display());
        debug!("Fetching audio: {}", search_query);

        let output = AsyncCommand::new(&self.executable_path)
            .arg(&search_query)
            .arg("--format").arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format").arg(AUDIO_EXTENSION)
            .arg("--audio-quality").arg(self.audio_quality.to_string())
            .arg("--output").arg(&output_template)
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .output()
            .await
            .map_err(|e| DownloaderError::Fetch(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloaderError::Fetch(format!(
                "yt-dlp failed for '{}' by '{}': {}",
                title, artist, stderr
            )));
        }

        let final_path = dest_stem.with_extension(AUDIO_EXTENSION);
        if !final_path.exists() {
            return Err(DownloaderError::Fetch(format!(
                "No search result for '{}' by '{}'",
                title, artist
            )));
        }
        Ok(final_path)
    }
}
