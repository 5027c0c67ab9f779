//! Imported local song index
//!
//! The in-memory list keeps the playable URLs handed over at import time.
//! The stored copy blanks every `url`: object URLs do not survive a restart,
//! so only metadata is persisted and reloaded songs need re-importing before
//! they can play.

use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use core_runtime::events::{EventBus, LibraryEvent};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::{emit, load_document, save_document, LOCAL_SONGS_KEY};
use crate::error::Result;
use crate::models::Song;

pub struct LocalSongStore {
    store: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    songs: RwLock<Vec<Song>>,
}

impl LocalSongStore {
    pub async fn open(store: Arc<dyn SettingsStore>, event_bus: EventBus) -> Result<Self> {
        let songs: Vec<Song> = load_document(store.as_ref(), LOCAL_SONGS_KEY).await?;
        Ok(Self {
            store,
            event_bus,
            songs: RwLock::new(songs),
        })
    }

    /// Appends freshly imported songs. Returns how many were added.
    #[instrument(skip(self, imported), fields(count = imported.len()))]
    pub async fn add(&self, imported: Vec<Song>) -> Result<usize> {
        if imported.is_empty() {
            return Ok(0);
        }

        let count = imported.len();
        let mut songs = self.songs.write().await;
        let mut updated = songs.clone();
        updated.extend(imported);

        self.persist(&updated).await?;
        *songs = updated;
        drop(songs);

        info!(count, "Imported local songs");
        emit(&self.event_bus, LibraryEvent::LocalSongsImported { count });
        Ok(count)
    }

    /// Returns `false` when no song has that id.
    #[instrument(skip(self))]
    pub async fn remove(&self, song_id: &str) -> Result<bool> {
        let mut songs = self.songs.write().await;
        if !songs.iter().any(|s| s.id == song_id) {
            return Ok(false);
        }

        let updated: Vec<Song> = songs.iter().filter(|s| s.id != song_id).cloned().collect();
        self.persist(&updated).await?;
        *songs = updated;
        drop(songs);

        emit(
            &self.event_bus,
            LibraryEvent::LocalSongRemoved {
                song_id: song_id.to_string(),
            },
        );
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut songs = self.songs.write().await;
        self.store.delete(LOCAL_SONGS_KEY).await?;
        songs.clear();
        drop(songs);

        emit(&self.event_bus, LibraryEvent::LocalSongsCleared);
        Ok(())
    }

    pub async fn list(&self) -> Vec<Song> {
        self.songs.read().await.clone()
    }

    async fn persist(&self, songs: &[Song]) -> Result<()> {
        let stored: Vec<Song> = songs
            .iter()
            .map(|song| Song {
                url: String::new(),
                ..song.clone()
            })
            .collect();
        save_document(self.store.as_ref(), LOCAL_SONGS_KEY, &stored).await
    }
}
