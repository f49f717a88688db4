use crate::config::Config;
use crate::downloader::{MetadataResolver, RefKind, TrackRecord};
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Spotify Web API metadata resolver.
///
/// Thin boundary adapter: resolves track/playlist/album references and
/// free-text queries into `TrackRecord`s. Holds a client-credentials token
/// behind a mutex so the shared resolver can refresh it lazily.
pub struct SpotifyResolver {
    client: Client,
    client_id: String,
    client_secret: String,
    access_token: tokio::sync::Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: String,
    name: String,
    artists: Vec<ApiArtist>,
    album: ApiAlbum,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    name: String,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
    #[serde(default)]
    width: u32,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylist {
    id: String,
    tracks: ApiPlaylistTracks,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistTracks {
    items: Vec<ApiPlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiAlbumFull {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<ApiImage>,
    tracks: ApiAlbumTracks,
}

#[derive(Debug, Deserialize)]
struct ApiAlbumTracks {
    items: Vec<ApiSimpleTrack>,
}

/// Track object as returned inside an album, without the album block.
#[derive(Debug, Deserialize)]
struct ApiSimpleTrack {
    id: String,
    name: String,
    artists: Vec<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiSearch {
    tracks: ApiSearchTracks,
}

#[derive(Debug, Deserialize)]
struct ApiSearchTracks {
    items: Vec<ApiTrack>,
}

impl SpotifyResolver {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            access_token: tokio::sync::Mutex::new(None),
        }
    }

    /// Build a resolver from configured credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client_id = config
            .api_keys
            .spotify_client_id
            .clone()
            .ok_or_else(|| DownloaderError::Auth("Spotify client id not configured".to_string()))?;
        let client_secret = config
            .api_keys
            .spotify_client_secret
            .clone()
            .ok_or_else(|| DownloaderError::Auth("Spotify client secret not configured".to_string()))?;
        Ok(Self::new(client_id, client_secret))
    }

    /// Fetch (or reuse) a client-credentials access token.
    async fn token(&self) -> Result<String> {
        let mut guard = self.access_token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        debug!("Authenticating with the Spotify API");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];
        let response = self.client.post(ACCOUNTS_URL).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownloaderError::Auth(format!(
                "Authentication failed: {} - {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        *guard = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let token = self.token().await?;
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloaderError::NotFound(url.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DownloaderError::Auth(format!("{} for {}", status, url)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownloaderError::Resolution(format!(
                "Spotify API error {}: {}",
                status, body
            )));
        }
        Ok(response)
    }

    /// Extract the catalog id from a reference like
    /// `https://open.spotify.com/track/{id}?si=...`. A bare id passes through.
    fn extract_id(reference: &str) -> String {
        if let Ok(url) = url::Url::parse(reference) {
            if let Some(segments) = url.path_segments() {
                if let Some(last) = segments.filter(|s| !s.is_empty()).last() {
                    return last.to_string();
                }
            }
        }
        reference.to_string()
    }

    fn record_from_track(track: ApiTrack, collection_id: Option<String>) -> TrackRecord {
        let cover_url = track
            .album
            .images
            .iter()
            .max_by_key(|img| img.width)
            .map(|img| img.url.clone());

        TrackRecord {
            id: track.id,
            title: track.name,
            artist: track
                .artists
                .first()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            album: track.album.name,
            cover_url,
            collection_id,
        }
    }

    async fn resolve_playlist(&self, reference: &str) -> Result<Vec<TrackRecord>> {
        let playlist_id = Self::extract_id(reference);
        let response = self
            .get(&format!("{}/playlists/{}", API_BASE, playlist_id))
            .await?;
        let playlist: ApiPlaylist = response.json().await?;

        let mut records = Vec::new();
        let mut page = playlist.tracks;
        loop {
            for item in page.items {
                // Local or removed tracks come back without a track object.
                if let Some(track) = item.track {
                    records.push(Self::record_from_track(track, Some(playlist.id.clone())));
                }
            }
            match page.next {
                Some(next_url) => {
                    let response = self.get(&next_url).await?;
                    page = response.json().await?;
                }
                None => break,
            }
        }
        Ok(records)
    }

    async fn resolve_album(&self, reference: &str) -> Result<Vec<TrackRecord>> {
        let album_id = Self::extract_id(reference);
        let response = self.get(&format!("{}/albums/{}", API_BASE, album_id)).await?;
        let album: ApiAlbumFull = response.json().await?;

        let cover_url = album
            .images
            .iter()
            .max_by_key(|img| img.width)
            .map(|img| img.url.clone());

        Ok(album
            .tracks
            .items
            .into_iter()
            .map(|track| TrackRecord {
                id: track.id,
                title: track.name,
                artist: track
                    .artists
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
                album: album.name.clone(),
                cover_url: cover_url.clone(),
                collection_id: Some(album.id.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl MetadataResolver for SpotifyResolver {
    fn classify(&self, reference: &str) -> RefKind {
        if reference.contains("/playlist/") || reference.contains("/album/") {
            RefKind::Collection
        } else {
            RefKind::Track
        }
    }

    async fn resolve_track(&self, reference: &str) -> Result<TrackRecord> {
        let track_id = Self::extract_id(reference);
        let response = self.get(&format!("{}/tracks/{}", API_BASE, track_id)).await?;
        let track: ApiTrack = response.json().await?;
        Ok(Self::record_from_track(track, None))
    }

    async fn resolve_collection(&self, reference: &str) -> Result<Vec<TrackRecord>> {
        if reference.contains("/album/") {
            self.resolve_album(reference).await
        } else {
            self.resolve_playlist(reference).await
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRecord>> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            API_BASE,
            urlencoding::encode(query),
            limit
        );
        let response = self.get(&url).await?;
        let results: ApiSearch = response.json().await?;
        Ok(results
            .tracks
            .items
            .into_iter()
            .map(|track| Self::record_from_track(track, None))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_routes_playlists_and_albums_to_collection() {
        let resolver = SpotifyResolver::new("id".into(), "secret".into());
        assert_eq!(
            resolver.classify("https://open.spotify.com/playlist/37i9dQ"),
            RefKind::Collection
        );
        assert_eq!(
            resolver.classify("https://open.spotify.com/album/6rqhFg"),
            RefKind::Collection
        );
        assert_eq!(
            resolver.classify("https://open.spotify.com/track/11dFgh"),
            RefKind::Track
        );
    }

    #[test]
    fn extract_id_strips_path_and_query() {
        assert_eq!(
            SpotifyResolver::extract_id("https://open.spotify.com/track/11dFghVXANMlKmJXsNCbNl?si=abc"),
            "11dFghVXANMlKmJXsNCbNl"
        );
        assert_eq!(SpotifyResolver::extract_id("11dFghVXANMlKmJXsNCbNl"), "11dFghVXANMlKmJXsNCbNl");
    }

    #[test]
    fn record_picks_the_largest_cover_image() {
        let track = ApiTrack {
            id: "t".into(),
            name: "Song".into(),
            artists: vec![ApiArtist { name: "Artist".into() }],
            album: ApiAlbum {
                name: "Album".into(),
                images: vec![
                    ApiImage { url: "small".into(), width: 64 },
                    ApiImage { url: "large".into(), width: 640 },
                    ApiImage { url: "medium".into(), width: 300 },
                ],
            },
        };
        let record = SpotifyResolver::record_from_track(track, None);
        assert_eq!(record.cover_url.as_deref(), Some("large"));
    }
}
