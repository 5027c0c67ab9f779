//! # Library Module
//!
//! Song and playlist models plus the small persisted collaborator stores the
//! player keeps next to its playback state.
//!
//! ## Overview
//!
//! Every store keeps one JSON document under a fixed key in the host
//! [`SettingsStore`](bridge_traits::storage::SettingsStore):
//!
//! | Store | Key |
//! |-------|-----|
//! | [`LikesStore`] | `melodia_liked_songs` |
//! | [`PlaylistStore`] | `music-app-playlists` |
//! | [`EqualizerStore`] | `melodia_equalizer` |
//! | [`LocalSongStore`] | `localSongs` |
//!
//! Stores load their document once when opened, serve reads from memory and
//! write the whole document back after every change.

pub mod error;
pub mod models;
pub mod stores;

pub use error::{LibraryError, Result};
pub use models::{
    youtube_song, youtube_thumbnail_url, youtube_watch_url, Playlist, Song, SongSource,
    LOCAL_ID_PREFIX, SAAVN_ID_PREFIX, YOUTUBE_ID_PREFIX,
};
pub use stores::{
    equalizer::{EqualizerPreset, EqualizerState, EqualizerStore, BAND_COUNT},
    likes::LikesStore,
    local_songs::LocalSongStore,
    playlists::PlaylistStore,
};
