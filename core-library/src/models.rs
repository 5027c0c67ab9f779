//! Domain models shared by every player crate
//!
//! A [`Song`] is a plain value: services replace songs, they never mutate
//! one in place. The serialized shape (camelCase keys) matches what the web
//! client keeps in local storage, so documents written by either side load in
//! the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id prefix of YouTube-sourced songs.
pub const YOUTUBE_ID_PREFIX: &str = "yt-";
/// Id prefix of imported local files.
pub const LOCAL_ID_PREFIX: &str = "local-";
/// Id prefix of catalog songs.
pub const SAAVN_ID_PREFIX: &str = "saavn-";

// =============================================================================
// Song
// =============================================================================

/// Where a song's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongSource {
    Local,
    Online,
}

impl fmt::Display for SongSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SongSource::Local => f.write_str("local"),
            SongSource::Online => f.write_str("online"),
        }
    }
}

/// A playable song reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// `yt-{videoId}`, `local-...`, or a catalog id such as `saavn-...`
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Seconds; 0 when unknown
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    pub source: SongSource,
    /// Direct audio URL, or the watch page for YouTube songs
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl Song {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        source: SongSource,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration: 0.0,
            artwork: None,
            source,
            url: url.into(),
            genre: None,
            year: None,
            added_at: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
        self
    }

    pub fn with_artwork(mut self, artwork: impl Into<String>) -> Self {
        self.artwork = Some(artwork.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_added_at(mut self, added_at: DateTime<Utc>) -> Self {
        self.added_at = Some(added_at);
        self
    }

    /// YouTube songs need audio extraction before they can play.
    pub fn is_youtube(&self) -> bool {
        self.id.starts_with(YOUTUBE_ID_PREFIX)
    }

    pub fn is_local(&self) -> bool {
        self.source == SongSource::Local
    }

    /// Video id of a YouTube song, `None` for every other song.
    pub fn youtube_video_id(&self) -> Option<&str> {
        self.id
            .strip_prefix(YOUTUBE_ID_PREFIX)
            .filter(|id| !id.is_empty())
    }
}

/// Watch-page URL for a YouTube video.
pub fn youtube_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Default thumbnail for a YouTube video.
pub fn youtube_thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
}

/// Builds a `yt-` song whose url is the watch page, pending extraction.
pub fn youtube_song(
    video_id: &str,
    title: impl Into<String>,
    artist: impl Into<String>,
    duration: f64,
) -> Song {
    Song::new(
        format!("{}{}", YOUTUBE_ID_PREFIX, video_id),
        title,
        artist,
        SongSource::Online,
        youtube_watch_url(video_id),
    )
    .with_duration(duration)
    .with_artwork(youtube_thumbnail_url(video_id))
}

// =============================================================================
// Playlist
// =============================================================================

/// User playlist, stored with its songs inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    /// `playlist-{millis}`
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Artwork of the first song added
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    #[serde(default)]
    pub songs: Vec<Song>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Playlist {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description,
            artwork: None,
            songs: Vec::new(),
            created_at: now,
            updated_at: now,
            is_public: false,
            user_id: None,
        }
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.songs.iter().any(|s| s.id == song_id)
    }

    /// Total duration in seconds.
    pub fn total_duration(&self) -> f64 {
        self.songs.iter().map(|s| s.duration).sum()
    }

    /// Validate playlist data
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Playlist name cannot be empty".to_string());
        }
        Ok(())
    }
}
