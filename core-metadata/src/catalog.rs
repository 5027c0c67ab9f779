//! JioSaavn-compatible catalog client
//!
//! ## API Endpoints
//!
//! - **Search**: `{base}/search/songs?query={query}&limit={limit}`
//! - **Album**: `{base}/albums?id={id}`
//! - **Playlist**: `{base}/playlists?id={id}`
//!
//! Every response is wrapped as `{"success": bool, "data": {...}}`. A
//! response with `success: false` or without a song list maps to an empty
//! result, not an error.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpRequest};
use core_library::{Song, SongSource, SAAVN_ID_PREFIX};
use core_runtime::config::CatalogApiConfig;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{MetadataError, Result};

/// Queries rotated through by [`SaavnClient::trending`].
pub const TRENDING_SEED_QUERIES: [&str; 3] =
    ["arijit singh", "latest hindi songs", "bollywood hits"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const DEFAULT_GENRE: &str = "Indian";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    results: Option<Vec<SaavnSong>>,
}

#[derive(Debug, Deserialize)]
struct SongListData {
    #[serde(default)]
    songs: Option<Vec<SaavnSong>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaavnSong {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Option<SaavnArtists>,
    #[serde(default)]
    album: Option<SaavnAlbum>,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default)]
    image: Vec<SaavnLink>,
    #[serde(default)]
    download_url: Vec<SaavnLink>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    year: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SaavnArtists {
    #[serde(default)]
    primary: Vec<SaavnArtist>,
}

#[derive(Debug, Deserialize)]
struct SaavnArtist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct SaavnAlbum {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaavnLink {
    #[serde(default)]
    url: String,
    #[serde(default)]
    quality: Option<String>,
}

/// Catalog search client.
pub struct SaavnClient {
    http_client: Arc<dyn HttpClient>,
    config: CatalogApiConfig,
}

impl SaavnClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: CatalogApiConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Searches songs. A blank query returns an empty list without a request.
    ///
    /// # Errors
    ///
    /// Network failures, non-2xx responses and unparseable bodies.
    #[instrument(skip(self))]
    pub async fn search_songs(&self, query: &str, limit: Option<u32>) -> Result<Vec<Song>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let limit = limit.unwrap_or(self.config.search_limit);
        let url = format!(
            "{}/search/songs?query={}&limit={}",
            self.base_url(),
            urlencoding::encode(query),
            limit
        );

        let envelope: Envelope<SearchData> = self.get_json(url).await?;
        Ok(Self::map_songs(
            envelope,
            |data: SearchData| data.results,
        ))
    }

    /// Popular songs, from a randomly picked seed query.
    #[instrument(skip(self))]
    pub async fn trending(&self) -> Result<Vec<Song>> {
        let seed = TRENDING_SEED_QUERIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(TRENDING_SEED_QUERIES[0]);
        debug!(seed, "Fetching trending songs");
        self.search_songs(seed, Some(self.config.trending_limit))
            .await
    }

    #[instrument(skip(self))]
    pub async fn album_songs(&self, album_id: &str) -> Result<Vec<Song>> {
        let url = format!(
            "{}/albums?id={}",
            self.base_url(),
            urlencoding::encode(album_id)
        );
        let envelope: Envelope<SongListData> = self.get_json(url).await?;
        Ok(Self::map_songs(envelope, |data: SongListData| data.songs))
    }

    #[instrument(skip(self))]
    pub async fn playlist_songs(&self, playlist_id: &str) -> Result<Vec<Song>> {
        let url = format!(
            "{}/playlists?id={}",
            self.base_url(),
            urlencoding::encode(playlist_id)
        );
        let envelope: Envelope<SongListData> = self.get_json(url).await?;
        Ok(Self::map_songs(envelope, |data: SongListData| data.songs))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn get_json<T>(&self, url: String) -> Result<Envelope<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!(url = %url, "Catalog request");

        let request = HttpRequest::get(url).accept_json().timeout(REQUEST_TIMEOUT);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| MetadataError::NetworkError(format!("Catalog request failed: {}", e)))?;

        if !response.is_success() {
            return Err(MetadataError::HttpError {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| MetadataError::JsonParse(format!("Failed to parse catalog response: {}", e)))
    }

    fn map_songs<T, F>(envelope: Envelope<T>, songs: F) -> Vec<Song>
    where
        F: FnOnce(T) -> Option<Vec<SaavnSong>>,
    {
        if !envelope.success {
            warn!("Catalog reported an unsuccessful response");
            return Vec::new();
        }
        envelope
            .data
            .and_then(songs)
            .unwrap_or_default()
            .into_iter()
            .map(transform_song)
            .collect()
    }
}

fn transform_song(song: SaavnSong) -> Song {
    let download_url = pick_download_url(&song.download_url).unwrap_or_default();

    let artist = song
        .artists
        .as_ref()
        .map(|a| {
            a.primary
                .iter()
                .map(|artist| artist.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|names| !names.is_empty())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    let genre = song
        .language
        .clone()
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_GENRE.to_string());

    let mut result = Song::new(
        format!("{}{}", SAAVN_ID_PREFIX, song.id),
        song.name.clone(),
        artist,
        SongSource::Online,
        download_url,
    )
    .with_duration(song.duration.as_ref().and_then(as_f64).unwrap_or(0.0))
    .with_genre(genre);

    if let Some(album) = song.album.and_then(|a| a.name).filter(|n| !n.is_empty()) {
        result = result.with_album(album);
    }
    if let Some(artwork) = pick_artwork(&song.image) {
        result = result.with_artwork(artwork);
    }
    if let Some(year) = song.year.as_ref().and_then(as_f64) {
        result = result.with_year(year as i32);
    }
    result
}

/// 320kbps, then 160kbps, then whatever comes first.
fn pick_download_url(links: &[SaavnLink]) -> Option<String> {
    let by_quality = |quality: &str| {
        links
            .iter()
            .find(|l| l.quality.as_deref() == Some(quality) && !l.url.is_empty())
    };

    by_quality("320kbps")
        .or_else(|| by_quality("160kbps"))
        .or_else(|| links.first())
        .map(|l| l.url.clone())
}

/// The 500x500 rendition, else the last (largest) one.
fn pick_artwork(images: &[SaavnLink]) -> Option<String> {
    images
        .iter()
        .find(|i| i.url.contains("500x500"))
        .or_else(|| images.last())
        .map(|i| i.url.clone())
        .filter(|url| !url.is_empty())
}

/// Accepts numbers and numeric strings (`"2023"`).
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpResponse, RetryPolicy};
    use bytes::Bytes;
    use mockall::mock;
    use serde_json::json;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn sample_song() -> Value {
        json!({
            "id": "Xy12",
            "name": "Kesariya",
            "artists": { "primary": [{ "name": "Arijit Singh" }, { "name": "Pritam" }] },
            "album": { "name": "Brahmastra" },
            "duration": 268,
            "image": [
                { "url": "https://c.saavncdn.com/x-50x50.jpg", "quality": "50x50" },
                { "url": "https://c.saavncdn.com/x-500x500.jpg", "quality": "500x500" },
                { "url": "https://c.saavncdn.com/x-150x150.jpg", "quality": "150x150" }
            ],
            "downloadUrl": [
                { "url": "https://aac.saavncdn.com/x_96.mp4", "quality": "96kbps" },
                { "url": "https://aac.saavncdn.com/x_160.mp4", "quality": "160kbps" },
                { "url": "https://aac.saavncdn.com/x_320.mp4", "quality": "320kbps" }
            ],
            "language": "hindi",
            "year": "2022"
        })
    }

    fn client(http: MockHttp) -> SaavnClient {
        SaavnClient::new(Arc::new(http), CatalogApiConfig::default())
    }

    #[test]
    fn test_transform_song_mapping() {
        let raw: SaavnSong = serde_json::from_value(sample_song()).unwrap();
        let song = transform_song(raw);

        assert_eq!(song.id, "saavn-Xy12");
        assert_eq!(song.artist, "Arijit Singh, Pritam");
        assert_eq!(song.album.as_deref(), Some("Brahmastra"));
        assert_eq!(song.duration, 268.0);
        assert_eq!(song.url, "https://aac.saavncdn.com/x_320.mp4");
        assert_eq!(
            song.artwork.as_deref(),
            Some("https://c.saavncdn.com/x-500x500.jpg")
        );
        assert_eq!(song.genre.as_deref(), Some("hindi"));
        assert_eq!(song.year, Some(2022));
        assert_eq!(song.source, SongSource::Online);
    }

    #[test]
    fn test_transform_song_fallbacks() {
        let raw: SaavnSong = serde_json::from_value(json!({
            "id": "q",
            "name": "Untitled",
            "image": [
                { "url": "https://c/a-50x50.jpg" },
                { "url": "https://c/a-150x150.jpg" }
            ],
            "downloadUrl": [{ "url": "https://aac/q_96.mp4", "quality": "96kbps" }],
            "year": null
        }))
        .unwrap();
        let song = transform_song(raw);

        assert_eq!(song.artist, "Unknown Artist");
        assert_eq!(song.genre.as_deref(), Some("Indian"));
        assert_eq!(song.url, "https://aac/q_96.mp4");
        assert_eq!(song.artwork.as_deref(), Some("https://c/a-150x150.jpg"));
        assert_eq!(song.year, None);
        assert_eq!(song.duration, 0.0);
    }

    #[tokio::test]
    async fn test_search_builds_encoded_url() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.url == "https://saavn.dev/api/search/songs?query=arijit%20singh&limit=20"
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    json!({ "success": true, "data": { "results": [sample_song()] } }),
                ))
            });

        let songs = client(http).search_songs("  arijit singh ", None).await.unwrap();
        assert_eq!(songs.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_query_skips_request() {
        let http = MockHttp::new();
        let songs = client(http).search_songs("   ", None).await.unwrap();
        assert!(songs.is_empty());
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_empty() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(response(200, json!({ "success": false, "data": null }))));

        let songs = client(http).album_songs("123").await.unwrap();
        assert!(songs.is_empty());
    }

    #[tokio::test]
    async fn test_trending_uses_seed_and_limit() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url.ends_with("&limit=15"))
            .returning(|_| {
                Ok(response(
                    200,
                    json!({ "success": true, "data": { "results": [] } }),
                ))
            });

        assert!(client(http).trending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_failure_is_error() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("offline".into())));

        let result = client(http).playlist_songs("p1").await;
        assert!(matches!(result, Err(MetadataError::NetworkError(_))));

        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(response(502, json!({ "message": "bad gateway" }))));
        let result = client(http).playlist_songs("p1").await;
        assert!(matches!(result, Err(MetadataError::HttpError { status: 502, .. })));
    }
}
