//! Liked songs
//!
//! The list keeps like order: newly liked songs are appended.

use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use core_runtime::events::{EventBus, LibraryEvent};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{emit, load_document, save_document, LIKED_SONGS_KEY};
use crate::error::Result;
use crate::models::Song;

pub struct LikesStore {
    store: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    songs: RwLock<Vec<Song>>,
}

impl LikesStore {
    /// Loads the stored likes.
    pub async fn open(store: Arc<dyn SettingsStore>, event_bus: EventBus) -> Result<Self> {
        let songs: Vec<Song> = load_document(store.as_ref(), LIKED_SONGS_KEY).await?;
        debug!(count = songs.len(), "Loaded liked songs");
        Ok(Self {
            store,
            event_bus,
            songs: RwLock::new(songs),
        })
    }

    /// Likes `song` if it is not liked yet, unlikes it otherwise.
    ///
    /// Returns the new liked state.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn toggle_like(&self, song: &Song) -> Result<bool> {
        let mut songs = self.songs.write().await;

        let mut updated = songs.clone();
        let liked = match updated.iter().position(|s| s.id == song.id) {
            Some(index) => {
                updated.remove(index);
                false
            }
            None => {
                updated.push(song.clone());
                true
            }
        };

        save_document(self.store.as_ref(), LIKED_SONGS_KEY, &updated).await?;
        *songs = updated;
        drop(songs);

        let song_id = song.id.clone();
        emit(
            &self.event_bus,
            if liked {
                LibraryEvent::SongLiked { song_id }
            } else {
                LibraryEvent::SongUnliked { song_id }
            },
        );
        Ok(liked)
    }

    pub async fn is_liked(&self, song_id: &str) -> bool {
        self.songs.read().await.iter().any(|s| s.id == song_id)
    }

    pub async fn liked_songs(&self) -> Vec<Song> {
        self.songs.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.songs.read().await.len()
    }
}
