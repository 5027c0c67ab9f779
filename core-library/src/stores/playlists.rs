//! User playlists
//!
//! Playlists embed their songs. Ids are `playlist-{millis}` taken from the
//! injected clock; when two playlists are created within the same
//! millisecond the later one takes the next free millisecond.

use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use core_runtime::events::{EventBus, LibraryEvent};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::{emit, load_document, save_document, PLAYLISTS_KEY};
use crate::error::{LibraryError, Result};
use crate::models::{Playlist, Song};

pub struct PlaylistStore {
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    playlists: RwLock<Vec<Playlist>>,
}

impl PlaylistStore {
    pub async fn open(
        store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let playlists: Vec<Playlist> = load_document(store.as_ref(), PLAYLISTS_KEY).await?;
        debug!(count = playlists.len(), "Loaded playlists");
        Ok(Self {
            store,
            clock,
            event_bus,
            playlists: RwLock::new(playlists),
        })
    }

    /// Creates an empty playlist and returns it.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `name` is blank.
    #[instrument(skip(self, description))]
    pub async fn create(&self, name: &str, description: Option<String>) -> Result<Playlist> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "name".to_string(),
                message: "Playlist name cannot be empty".to_string(),
            });
        }

        let mut playlists = self.playlists.write().await;

        let now = self.clock.now();
        let mut millis = now.timestamp_millis();
        while playlists.iter().any(|p| p.id == format!("playlist-{}", millis)) {
            millis += 1;
        }

        let playlist = Playlist::new(format!("playlist-{}", millis), name, description, now);

        let mut updated = playlists.clone();
        updated.push(playlist.clone());
        save_document(self.store.as_ref(), PLAYLISTS_KEY, &updated).await?;
        *playlists = updated;
        drop(playlists);

        info!(playlist_id = %playlist.id, "Created playlist");
        emit(
            &self.event_bus,
            LibraryEvent::PlaylistCreated {
                playlist_id: playlist.id.clone(),
                name: playlist.name.clone(),
            },
        );
        Ok(playlist)
    }

    /// Deletes a playlist. Returns `false` when no playlist has that id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut playlists = self.playlists.write().await;
        if !playlists.iter().any(|p| p.id == id) {
            return Ok(false);
        }

        let updated: Vec<Playlist> = playlists.iter().filter(|p| p.id != id).cloned().collect();
        save_document(self.store.as_ref(), PLAYLISTS_KEY, &updated).await?;
        *playlists = updated;
        drop(playlists);

        emit(
            &self.event_bus,
            LibraryEvent::PlaylistDeleted {
                playlist_id: id.to_string(),
            },
        );
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn rename(&self, id: &str, name: &str) -> Result<Playlist> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "name".to_string(),
                message: "Playlist name cannot be empty".to_string(),
            });
        }

        self.update(id, "renamed", |playlist| {
            playlist.name = name;
            Ok(())
        })
        .await
    }

    /// Appends `song`. The first song added gives the playlist its artwork.
    ///
    /// # Errors
    ///
    /// `Duplicate` when the playlist already holds a song with the same id.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn add_song(&self, playlist_id: &str, song: &Song) -> Result<Playlist> {
        self.update(playlist_id, "song_added", |playlist| {
            if playlist.contains(&song.id) {
                return Err(LibraryError::Duplicate {
                    entity_type: "Playlist".to_string(),
                    id: playlist.id.clone(),
                    item: song.id.clone(),
                });
            }
            if playlist.songs.is_empty() {
                playlist.artwork = song.artwork.clone();
            }
            playlist.songs.push(song.clone());
            Ok(())
        })
        .await
    }

    /// Removes every entry with `song_id`. Removing an absent song still
    /// bumps `updated_at`.
    #[instrument(skip(self))]
    pub async fn remove_song(&self, playlist_id: &str, song_id: &str) -> Result<Playlist> {
        self.update(playlist_id, "song_removed", |playlist| {
            playlist.songs.retain(|s| s.id != song_id);
            Ok(())
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Option<Playlist> {
        self.playlists
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// All playlists in creation order.
    pub async fn list(&self) -> Vec<Playlist> {
        self.playlists.read().await.clone()
    }

    async fn update<F>(&self, id: &str, change_type: &str, apply: F) -> Result<Playlist>
    where
        F: FnOnce(&mut Playlist) -> Result<()>,
    {
        let mut playlists = self.playlists.write().await;

        let mut updated = playlists.clone();
        let playlist = updated
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| LibraryError::playlist_not_found(id))?;

        apply(playlist)?;
        playlist.updated_at = self.clock.now();
        let result = playlist.clone();

        save_document(self.store.as_ref(), PLAYLISTS_KEY, &updated).await?;
        *playlists = updated;
        drop(playlists);

        emit(
            &self.event_bus,
            LibraryEvent::PlaylistUpdated {
                playlist_id: id.to_string(),
                change_type: change_type.to_string(),
            },
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SongSource;
    use bridge_desktop::MemorySettingsStore;
    use bridge_traits::time::FixedClock;

    async fn open_store(millis: i64) -> PlaylistStore {
        PlaylistStore::open(
            Arc::new(MemorySettingsStore::new()),
            Arc::new(FixedClock::from_millis(millis)),
            EventBus::new(16),
        )
        .await
        .unwrap()
    }

    fn song(id: &str, artwork: Option<&str>) -> Song {
        let song = Song::new(id, id, "Artist", SongSource::Online, "https://x/a.mp3");
        match artwork {
            Some(url) => song.with_artwork(url),
            None => song,
        }
    }

    #[tokio::test]
    async fn test_create_uses_clock_for_id() {
        let store = open_store(1_700_000_000_000).await;

        let first = store.create("Focus", None).await.unwrap();
        let second = store.create("Gym", Some("loud".into())).await.unwrap();

        assert_eq!(first.id, "playlist-1700000000000");
        assert_eq!(second.id, "playlist-1700000000001");
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let store = open_store(1).await;
        let result = store.create("   ", None).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_first_song_sets_artwork() {
        let store = open_store(1).await;
        let playlist = store.create("Mix", None).await.unwrap();

        store
            .add_song(&playlist.id, &song("a", Some("https://img/a.jpg")))
            .await
            .unwrap();
        let updated = store
            .add_song(&playlist.id, &song("b", Some("https://img/b.jpg")))
            .await
            .unwrap();

        assert_eq!(updated.artwork.as_deref(), Some("https://img/a.jpg"));
        assert_eq!(updated.songs.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_song_rejected() {
        let store = open_store(1).await;
        let playlist = store.create("Mix", None).await.unwrap();
        store.add_song(&playlist.id, &song("a", None)).await.unwrap();

        let result = store.add_song(&playlist.id, &song("a", None)).await;
        assert!(matches!(result, Err(LibraryError::Duplicate { .. })));
        assert_eq!(store.get(&playlist.id).await.unwrap().songs.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_playlist_is_not_found() {
        let store = open_store(1).await;
        let result = store.remove_song("playlist-0", "a").await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
        assert!(!store.delete("playlist-0").await.unwrap());
    }
}
