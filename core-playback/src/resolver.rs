//! Track Source Resolver
//!
//! Decides how a [`Song`] becomes audio: its own URL, an extracted stream for
//! YouTube songs, or the video embed when extraction gives up.

use std::sync::Arc;

use core_extraction::{AudioExtractor, AudioResult};
use core_library::Song;
use tracing::{debug, info, instrument};

use crate::error::{PlaybackError, Result};

/// Where the audio for a song comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    /// Local file or proxied online URL, played as-is.
    Direct(String),
    /// YouTube audio stream found by the extraction chain.
    Extracted(AudioResult),
    /// No audio stream; the visible video embed plays the song.
    VideoEmbed { video_id: String },
}

impl ResolvedSource {
    /// URL to hand to the audio engine, `None` for the video embed.
    pub fn audio_url(&self) -> Option<&str> {
        match self {
            ResolvedSource::Direct(url) => Some(url),
            ResolvedSource::Extracted(result) => Some(&result.audio_url),
            ResolvedSource::VideoEmbed { .. } => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct TrackResolver {
    extractor: Option<Arc<dyn AudioExtractor>>,
}

impl TrackResolver {
    pub fn new(extractor: Arc<dyn AudioExtractor>) -> Self {
        Self {
            extractor: Some(extractor),
        }
    }

    /// Resolver that sends every YouTube song straight to the video embed.
    pub fn without_extraction() -> Self {
        Self { extractor: None }
    }

    /// # Errors
    ///
    /// Returns [`PlaybackError::NoPlayableSource`] for a non-YouTube song with
    /// an empty URL. YouTube songs never fail here.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn resolve(&self, song: &Song) -> Result<ResolvedSource> {
        if let Some(video_id) = song.youtube_video_id() {
            let Some(extractor) = &self.extractor else {
                debug!("No extractor configured, using video embed");
                return Ok(ResolvedSource::VideoEmbed {
                    video_id: video_id.to_string(),
                });
            };

            return Ok(match extractor.extract(video_id).await {
                Some(result) => ResolvedSource::Extracted(result),
                None => {
                    info!(video_id, "Extraction exhausted, using video embed");
                    ResolvedSource::VideoEmbed {
                        video_id: video_id.to_string(),
                    }
                }
            });
        }

        if song.url.is_empty() {
            return Err(PlaybackError::NoPlayableSource(song.id.clone()));
        }
        Ok(ResolvedSource::Direct(song.url.clone()))
    }
}

impl std::fmt::Debug for TrackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackResolver")
            .field("extraction", &self.extractor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_library::{youtube_song, SongSource};

    struct FixedExtractor(Option<AudioResult>);

    #[async_trait]
    impl AudioExtractor for FixedExtractor {
        async fn extract(&self, _video_id: &str) -> Option<AudioResult> {
            self.0.clone()
        }
    }

    fn stream() -> AudioResult {
        AudioResult {
            audio_url: "https://cdn.example/a.m4a".to_string(),
            title: "Song".to_string(),
            thumbnail: "https://i.ytimg.com/vi/abc/hqdefault.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_direct_songs_use_their_url() {
        let resolver = TrackResolver::without_extraction();
        let song = Song::new("saavn-1", "A", "B", SongSource::Online, "https://x/a.mp4");

        let source = resolver.resolve(&song).await.unwrap();
        assert_eq!(source.audio_url(), Some("https://x/a.mp4"));
    }

    #[tokio::test]
    async fn test_empty_url_is_not_playable() {
        let resolver = TrackResolver::without_extraction();
        let song = Song::new("local-1", "A", "B", SongSource::Local, "");

        let result = resolver.resolve(&song).await;
        assert!(matches!(result, Err(PlaybackError::NoPlayableSource(id)) if id == "local-1"));
    }

    #[tokio::test]
    async fn test_youtube_uses_extracted_stream() {
        let resolver = TrackResolver::new(Arc::new(FixedExtractor(Some(stream()))));
        let source = resolver
            .resolve(&youtube_song("abc", "T", "A", 0.0))
            .await
            .unwrap();

        assert_eq!(source, ResolvedSource::Extracted(stream()));
    }

    #[tokio::test]
    async fn test_exhausted_extraction_falls_back_to_embed() {
        let resolver = TrackResolver::new(Arc::new(FixedExtractor(None)));
        let source = resolver
            .resolve(&youtube_song("abc", "T", "A", 0.0))
            .await
            .unwrap();

        assert_eq!(
            source,
            ResolvedSource::VideoEmbed {
                video_id: "abc".to_string()
            }
        );
        assert_eq!(source.audio_url(), None);
    }
}
