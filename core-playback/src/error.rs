//! # Playback Error Types

use thiserror::Error;

/// Errors surfaced by the transport engine.
///
/// Only non-YouTube sources produce these: a YouTube source that cannot be
/// extracted or played falls back to the video embed instead.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The song has no URL to open (e.g. a reloaded local import).
    #[error("No playable source for song {0}")]
    NoPlayableSource(String),

    /// The host could not open the source.
    #[error("Failed to open audio source: {0}")]
    SourceError(String),

    /// The host opened the source but refused to play it.
    #[error("Playback operation failed: {0}")]
    PlaybackFailed(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
