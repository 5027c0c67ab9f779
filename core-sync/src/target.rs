//! Seam between the sync layer and the local transport engine.

use async_trait::async_trait;
use core_library::Song;
use core_playback::Player;

use crate::error::Result;

/// Local transport the sync layer drives.
///
/// The host calls it for its own intents; a guest calls it for intents
/// received from the host.
#[async_trait]
pub trait PlaybackTarget: Send + Sync {
    /// Load `song` and start it at `time` seconds.
    ///
    /// `Ok(false)` when a later play replaced this one before it started.
    async fn play_at(&self, song: Song, time: f64) -> Result<bool>;

    fn pause(&self);

    fn seek(&self, time: f64);
}

#[async_trait]
impl PlaybackTarget for Player {
    async fn play_at(&self, song: Song, time: f64) -> Result<bool> {
        let loaded = self.load_song(song).await?;
        if loaded && time > 0.0 {
            Player::seek(self, time);
        }
        Ok(loaded)
    }

    fn pause(&self) {
        Player::pause(self);
    }

    fn seek(&self, time: f64) {
        Player::seek(self, time);
    }
}
