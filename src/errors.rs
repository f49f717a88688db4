use thiserror::Error;

/// Main error type for the playlist downloader
#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ID3 tagging error: {0}")]
    Id3(#[from] id3::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Tag error: {0}")]
    Tag(String),

    #[error("Concurrency error: {0}")]
    Concurrency(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, DownloaderError>;
