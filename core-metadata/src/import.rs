//! Local file import
//!
//! Turns audio files on disk into `local-` songs. Duration and tags come from
//! `lofty`; a file lofty cannot parse still imports, titled after its file
//! name with a duration of 0.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::time::{Clock, SystemClock};
use core_library::{Song, SongSource, LOCAL_ID_PREFIX};
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::error::{MetadataError, Result};

/// File extensions accepted for import (case-insensitive).
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "m4a", "flac", "aac"];

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Tags and properties read from one file.
#[derive(Debug, Default)]
struct ProbedTags {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    genre: Option<String>,
    year: Option<i32>,
    duration_secs: f64,
}

pub struct LocalImporter {
    clock: Arc<dyn Clock>,
}

impl Default for LocalImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalImporter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Imports one file.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for extensions outside [`SUPPORTED_EXTENSIONS`],
    /// `FileNotFound` when the path does not exist.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn import_file(&self, path: &Path) -> Result<Song> {
        if !is_supported_audio_file(path) {
            return Err(MetadataError::UnsupportedFormat(path.display().to_string()));
        }

        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetadataError::FileNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let tags = probe_tags(&data).unwrap_or_else(|reason| {
            warn!(reason = %reason, "Could not read audio metadata, importing with defaults");
            ProbedTags::default()
        });

        Ok(self.build_song(path, tags))
    }

    /// Imports every supported file in `paths`, skipping files that fail.
    pub async fn import_files(&self, paths: &[PathBuf]) -> Vec<Song> {
        let mut songs = Vec::with_capacity(paths.len());
        for path in paths {
            match self.import_file(path).await {
                Ok(song) => songs.push(song),
                Err(MetadataError::UnsupportedFormat(_)) => {
                    debug!(path = %path.display(), "Skipping non-audio file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to import file"),
            }
        }
        info!(imported = songs.len(), requested = paths.len(), "Local import finished");
        songs
    }

    /// Imports the audio files directly inside `dir` (no recursion), in file
    /// name order.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn import_directory(&self, dir: &Path) -> Result<Vec<Song>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_supported_audio_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            info!("No audio files found in folder");
        }
        Ok(self.import_files(&paths).await)
    }

    fn build_song(&self, path: &Path, tags: ProbedTags) -> Song {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let mut song = Song::new(
            self.generate_id(),
            tags.title.unwrap_or(stem),
            tags.artist.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            SongSource::Local,
            file_url(path),
        )
        .with_duration(tags.duration_secs.floor())
        .with_added_at(self.clock.now());

        if let Some(album) = tags.album {
            song = song.with_album(album);
        }
        if let Some(genre) = tags.genre {
            song = song.with_genre(genre);
        }
        if let Some(year) = tags.year {
            song = song.with_year(year);
        }
        song
    }

    /// `local-{millis}-{9 base36 chars}`
    fn generate_id(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        format!(
            "{}{}-{}",
            LOCAL_ID_PREFIX,
            self.clock.unix_timestamp_millis(),
            suffix
        )
    }
}

fn probe_tags(data: &[u8]) -> std::result::Result<ProbedTags, String> {
    let tagged_file = Probe::new(std::io::Cursor::new(data))
        .options(ParseOptions::new())
        .guess_file_type()
        .map_err(|e| format!("Failed to probe file: {}", e))?
        .read()
        .map_err(|e| format!("Failed to parse file: {}", e))?;

    let mut tags = ProbedTags {
        duration_secs: tagged_file.properties().duration().as_secs_f64(),
        ..ProbedTags::default()
    };

    if let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    {
        tags.title = non_empty(tag.title().as_deref());
        tags.artist = non_empty(tag.artist().as_deref());
        tags.album = non_empty(tag.album().as_deref());
        tags.genre = non_empty(tag.genre().as_deref());
        tags.year = tag.year().map(|y| y as i32);
    }
    Ok(tags)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let display = absolute.to_string_lossy().replace('\\', "/");
    if display.starts_with('/') {
        format!("file://{}", display)
    } else {
        format!("file:///{}", display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::FixedClock;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "core-metadata-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_audio_file(Path::new("a/b/song.MP3")));
        assert!(is_supported_audio_file(Path::new("x.flac")));
        assert!(!is_supported_audio_file(Path::new("cover.jpg")));
        assert!(!is_supported_audio_file(Path::new("README")));
    }

    #[test]
    fn test_generated_id_shape() {
        let importer = LocalImporter::with_clock(Arc::new(FixedClock::from_millis(1_700_000_000_000)));
        let id = importer.generate_id();

        let suffix = id.strip_prefix("local-1700000000000-").unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_unparseable_file_still_imports() {
        let dir = temp_dir("garbage");
        let path = dir.join("My Demo.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let song = LocalImporter::new().import_file(&path).await.unwrap();
        assert_eq!(song.title, "My Demo");
        assert_eq!(song.artist, "Unknown Artist");
        assert_eq!(song.duration, 0.0);
        assert_eq!(song.source, SongSource::Local);
        assert!(song.url.starts_with("file://"));
        assert!(song.added_at.is_some());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_missing_and_unsupported_files() {
        let importer = LocalImporter::new();

        let missing = importer.import_file(Path::new("/nonexistent/x.mp3")).await;
        assert!(matches!(missing, Err(MetadataError::FileNotFound(_))));

        let unsupported = importer.import_file(Path::new("notes.txt")).await;
        assert!(matches!(unsupported, Err(MetadataError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_import_directory_is_one_level() {
        let dir = temp_dir("folder");
        std::fs::write(dir.join("b.ogg"), b"x").unwrap();
        std::fs::write(dir.join("a.wav"), b"x").unwrap();
        std::fs::write(dir.join("cover.png"), b"x").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("c.mp3"), b"x").unwrap();

        let songs = LocalImporter::new().import_directory(&dir).await.unwrap();
        let titles: Vec<_> = songs.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
