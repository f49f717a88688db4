use crate::config::Config;
use crate::downloader::audio::YtDlpFetcher;
use crate::downloader::metadata::Id3TagWriter;
use crate::downloader::spotify::SpotifyResolver;
use crate::downloader::{JobState, Orchestrator, ProgressEvent};
use crate::errors::{DownloaderError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Playlist downloader - fetch tagged audio for Spotify tracks and playlists
#[derive(Parser)]
#[command(name = "playlist-dl")]
#[command(about = "Download and tag audio for Spotify tracks, albums and playlists")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a track, album or playlist reference
    Download {
        /// Spotify URL (track, album, or playlist)
        reference: String,

        /// Output directory (defaults to the configured download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum concurrent downloads
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Search for tracks
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Configure application settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set download directory
    SetDir {
        /// Directory path
        path: PathBuf,
    },

    /// Set maximum concurrent downloads
    SetWorkers {
        /// Worker count
        workers: usize,
    },

    /// Set Spotify API credentials
    SetCredentials {
        /// Spotify client id
        client_id: String,
        /// Spotify client secret
        client_secret: String,
    },
}

impl Cli {
    /// Execute the parsed command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Download {
                reference,
                output,
                workers,
            } => Self::download(reference, output, workers).await,
            Commands::Search { query, limit } => Self::search(query, limit).await,
            Commands::Config { command } => Self::configure(command),
        }
    }

    async fn download(
        reference: String,
        output: Option<PathBuf>,
        workers: Option<usize>,
    ) -> Result<()> {
        let mut config = Config::load()?;
        if let Some(output) = output {
            config.download_directory = output;
        }
        if let Some(workers) = workers {
            config.max_workers = workers;
        }
        config.ensure_download_directory()?;

        let fetcher = YtDlpFetcher::new();
        if !fetcher.is_available().await {
            return Err(DownloaderError::Fetch(
                "yt-dlp executable not found on PATH".to_string(),
            ));
        }

        let resolver = Arc::new(SpotifyResolver::from_config(&config)?);
        let orchestrator = Orchestrator::new(
            &config,
            resolver,
            Arc::new(fetcher),
            Arc::new(Id3TagWriter::new()),
        );
        let Some(mut events) = orchestrator.take_event_receiver() else {
            return Err(DownloaderError::Concurrency(
                "Progress stream already taken".to_string(),
            ));
        };

        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ProgressEvent::JobStarted { title, .. } => {
                        println!("  downloading  {}", title);
                    }
                    ProgressEvent::JobFinished { job_id, state, error, .. } => match state {
                        JobState::Completed => println!("  done         {}", job_id),
                        _ => {
                            let reason = error.unwrap_or_else(|| "unknown error".to_string());
                            println!("  FAILED       {} ({})", job_id, reason);
                        }
                    },
                    ProgressEvent::BatchFinished { completed, failed, .. } => {
                        println!("Batch finished: {} succeeded, {} failed", completed, failed);
                    }
                    ProgressEvent::JobProgress { .. } => {}
                }
            }
        });

        let batch = orchestrator.download(&reference).await?;
        println!(
            "Submitted {} track(s) to {}",
            batch.total,
            config.download_directory.display()
        );

        orchestrator.shutdown().await;
        // Dropping the orchestrator closes the event channel and lets the
        // printer task drain out.
        drop(orchestrator);
        if let Err(e) = printer.await {
            error!("Progress printer task failed: {}", e);
        }
        Ok(())
    }

    async fn search(query: String, limit: usize) -> Result<()> {
        let config = Config::load()?;
        let resolver = SpotifyResolver::from_config(&config)?;

        use crate::downloader::MetadataResolver;
        let mut results = resolver.search(&query, limit).await?;
        results.truncate(limit);

        if results.is_empty() {
            println!("No results for '{}'", query);
            return Ok(());
        }
        for (index, track) in results.iter().enumerate() {
            println!(
                "{:2}. {} - {} ({})",
                index + 1,
                track.artist,
                track.title,
                track.album
            );
        }
        Ok(())
    }

    fn configure(command: ConfigCommands) -> Result<()> {
        let mut config = Config::load()?;
        match command {
            ConfigCommands::Show => {
                println!("Download directory: {}", config.download_directory.display());
                println!("Max workers: {}", config.max_workers);
                println!(
                    "Spotify credentials: {}",
                    if config.api_keys.spotify_client_id.is_some() {
                        "configured"
                    } else {
                        "not configured"
                    }
                );
                return Ok(());
            }
            ConfigCommands::SetDir { path } => config.download_directory = path,
            ConfigCommands::SetWorkers { workers } => config.max_workers = workers,
            ConfigCommands::SetCredentials {
                client_id,
                client_secret,
            } => {
                config.api_keys.spotify_client_id = Some(client_id);
                config.api_keys.spotify_client_secret = Some(client_secret);
            }
        }
        config.save()?;
        println!("Settings saved");
        Ok(())
    }
}
