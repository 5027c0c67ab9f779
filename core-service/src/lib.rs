//! Core service façade.
//!
//! [`CoreService`] is the application root of the player core. It takes a
//! validated [`CoreConfig`], builds every service on top of the injected host
//! bridges and hands them out to the UI layer:
//!
//! - the transport engine ([`Player`]) with its extraction chain
//! - the sync broadcast layer ([`SyncManager`]), when `enable_sync` is set
//! - the persisted library stores (likes, playlists, equalizer, local songs)
//! - the catalog client ([`SaavnClient`]), when `enable_catalog` is set
//! - local file import ([`LocalImporter`])
//!
//! All services share one [`EventBus`]. Desktop hosts typically enable the
//! `desktop-shims` feature so that `CoreConfig::builder()` falls back to the
//! `bridge-desktop` adapters for anything not injected.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .audio_engine(engine)
//!     .enable_sync(true)
//!     .build()?;
//! let core = CoreService::new(config).await?;
//! let mut events = core.subscribe();
//! core.player().play(Some(song)).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

use std::path::PathBuf;
use std::sync::Arc;

use bridge_traits::{Clock, SystemClock};
use core_extraction::build_extractor;
use core_library::{EqualizerStore, LikesStore, LocalSongStore, PlaylistStore, Song};
use core_metadata::{LocalImporter, SaavnClient};
use core_playback::{Player, TrackResolver};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, Receiver};
use core_sync::{PlaybackTarget, SyncManager};
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<Services>,
}

struct Services {
    config: CoreConfig,
    event_bus: EventBus,
    player: Player,
    sync: Option<SyncManager>,
    likes: Arc<LikesStore>,
    playlists: Arc<PlaylistStore>,
    equalizer: Arc<EqualizerStore>,
    local_songs: Arc<LocalSongStore>,
    catalog: Option<Arc<SaavnClient>>,
    importer: Arc<LocalImporter>,
}

impl CoreService {
    /// Builds every service from `config`.
    ///
    /// Library stores read their persisted documents here, so a failing
    /// settings store fails construction.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Same as [`CoreService::new`] with an explicit clock for generated ids
    /// and timestamps.
    #[instrument(skip_all)]
    pub async fn with_clock(config: CoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);

        let extractor = build_extractor(
            &config.extraction,
            &config.features,
            Arc::clone(&config.http_client),
            event_bus.clone(),
        )?;
        let player = Player::new(
            Arc::clone(&config.audio_engine),
            TrackResolver::new(extractor),
            config.player.clone(),
            event_bus.clone(),
        );

        let store = Arc::clone(&config.settings_store);
        let likes = LikesStore::open(Arc::clone(&store), event_bus.clone()).await?;
        let playlists =
            PlaylistStore::open(Arc::clone(&store), Arc::clone(&clock), event_bus.clone())
                .await?;
        let equalizer = EqualizerStore::open(Arc::clone(&store), event_bus.clone()).await?;
        let local_songs = LocalSongStore::open(store, event_bus.clone()).await?;

        let catalog = config.features.enable_catalog.then(|| {
            Arc::new(SaavnClient::new(
                Arc::clone(&config.http_client),
                config.catalog.clone(),
            ))
        });

        let sync = config.features.enable_sync.then(|| {
            let target: Arc<dyn PlaybackTarget> = Arc::new(player.clone());
            SyncManager::new(
                Arc::clone(&config.realtime_client),
                target,
                event_bus.clone(),
                Arc::clone(&clock),
            )
        });

        info!(
            sync = config.features.enable_sync,
            catalog = config.features.enable_catalog,
            remote_extraction = config.features.enable_remote_extraction,
            "Core services initialized"
        );

        Ok(Self {
            inner: Arc::new(Services {
                event_bus,
                player,
                sync,
                likes: Arc::new(likes),
                playlists: Arc::new(playlists),
                equalizer: Arc::new(equalizer),
                local_songs: Arc::new(local_songs),
                catalog,
                importer: Arc::new(LocalImporter::with_clock(clock)),
                config,
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Subscription that only yields events accepted by `predicate`.
    ///
    /// ```ignore
    /// let mut sync_only = core.events(|event| matches!(event, CoreEvent::Sync(_)));
    /// ```
    pub fn events<F>(&self, predicate: F) -> EventStream
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        EventStream::new(self.inner.event_bus.subscribe()).filter(predicate)
    }

    pub fn player(&self) -> &Player {
        &self.inner.player
    }

    /// The sync layer, or `CapabilityMissing` when sync is disabled.
    pub fn sync(&self) -> Result<&SyncManager> {
        self.inner
            .sync
            .as_ref()
            .ok_or_else(|| disabled("sync", "enable_sync is off"))
    }

    /// The catalog client, or `CapabilityMissing` when the catalog is disabled.
    pub fn catalog(&self) -> Result<&SaavnClient> {
        self.inner
            .catalog
            .as_deref()
            .ok_or_else(|| disabled("catalog", "enable_catalog is off"))
    }

    pub fn likes(&self) -> Arc<LikesStore> {
        Arc::clone(&self.inner.likes)
    }

    pub fn playlists(&self) -> Arc<PlaylistStore> {
        Arc::clone(&self.inner.playlists)
    }

    pub fn equalizer(&self) -> Arc<EqualizerStore> {
        Arc::clone(&self.inner.equalizer)
    }

    pub fn local_songs(&self) -> Arc<LocalSongStore> {
        Arc::clone(&self.inner.local_songs)
    }

    pub fn importer(&self) -> Arc<LocalImporter> {
        Arc::clone(&self.inner.importer)
    }

    /// Imports `paths` and records them in the local-song index.
    ///
    /// The returned songs keep their `file://` URLs and can be queued right
    /// away; the persisted copies do not.
    #[instrument(skip(self, paths), fields(requested = paths.len()))]
    pub async fn import_local_files(&self, paths: &[PathBuf]) -> Result<Vec<Song>> {
        let songs = self.inner.importer.import_files(paths).await;
        if !songs.is_empty() {
            self.inner.local_songs.add(songs.clone()).await?;
        }
        Ok(songs)
    }

    /// Leaves any sync session and tears the transport engine down.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if let Some(sync) = &self.inner.sync {
            sync.leave_session().await;
        }
        self.inner.player.shutdown();
        info!("Core services shut down");
    }
}

fn disabled(capability: &str, message: &str) -> CoreError {
    CoreError::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}
