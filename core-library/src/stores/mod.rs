//! Persisted collaborator stores
//!
//! Each store owns one JSON document in the host settings store. Documents
//! that fail to parse are treated as absent so a corrupted entry never blocks
//! startup.

pub mod equalizer;
pub mod likes;
pub mod local_songs;
pub mod playlists;

use bridge_traits::storage::SettingsStore;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Storage key of the liked songs list.
pub const LIKED_SONGS_KEY: &str = "melodia_liked_songs";
/// Storage key of the playlists list.
pub const PLAYLISTS_KEY: &str = "music-app-playlists";
/// Storage key of the equalizer state.
pub const EQUALIZER_KEY: &str = "melodia_equalizer";
/// Storage key of the imported local song index.
pub const LOCAL_SONGS_KEY: &str = "localSongs";

/// Reads the document under `key`, falling back to `T::default()` when the key
/// is missing or its content does not parse.
pub(crate) async fn load_document<T>(store: &dyn SettingsStore, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = store.get_string(key).await? else {
        debug!(key, "No stored document, using default");
        return Ok(T::default());
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(key, error = %e, "Stored document is corrupt, using default");
            Ok(T::default())
        }
    }
}

pub(crate) async fn save_document<T>(store: &dyn SettingsStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set_string(key, &raw).await?;
    Ok(())
}

/// Publishes a library event; having no subscribers is not an error.
pub(crate) fn emit(event_bus: &EventBus, event: LibraryEvent) {
    let _ = event_bus.emit(CoreEvent::Library(event));
}
