use crate::downloader::TagWriter;
use crate::errors::Result;
use async_trait::async_trait;
use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};
use std::path::Path;
use tracing::debug;

/// ID3 tag writer for finished mp3 files.
///
/// Cover art is downloaded over HTTP and embedded as the front-cover frame;
/// a failed art download fails the write (the audio file itself is untouched).
pub struct Id3TagWriter {
    client: reqwest::Client,
}

impl Id3TagWriter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_cover(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TagWriter for Id3TagWriter {
    async fn write(
        &self,
        file_path: &Path,
        title: &str,
        artist: &str,
        album: &str,
        cover_url: Option<&str>,
    ) -> Result<()> {
        debug!("Embedding metadata: {}", file_path.display());

        let mut tag = Tag::read_from_path(file_path).unwrap_or_else(|_| Tag::new());
        tag.set_title(title);
        tag.set_artist(artist);
        tag.set_album(album);

        if let Some(url) = cover_url {
            let data = self.fetch_cover(url).await?;
            tag.add_frame(Picture {
                mime_type: "image/jpeg".to_string(),
                picture_type: PictureType::CoverFront,
                description: "Cover".to_string(),
                data,
            });
        }

        tag.write_to_path(file_path, Version::Id3v24)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_basic_frames_without_cover_art() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"").unwrap();

        let writer = Id3TagWriter::new();
        writer
            .write(&path, "Title", "Artist", "Album", None)
            .await
            .unwrap();

        let tag = Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.title(), Some("Title"));
        assert_eq!(tag.artist(), Some("Artist"));
        assert_eq!(tag.album(), Some("Album"));
    }

    #[tokio::test]
    async fn rewriting_tags_is_an_overwrite_not_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"").unwrap();

        let writer = Id3TagWriter::new();
        writer.write(&path, "First", "A", "X", None).await.unwrap();
        writer.write(&path, "Second", "B", "Y", None).await.unwrap();

        let tag = Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.title(), Some("Second"));
        assert_eq!(tag.artist(), Some("B"));
    }
}
