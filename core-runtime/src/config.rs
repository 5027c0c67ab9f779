//! # Core Configuration Module
//!
//! Builder-based configuration for the player core.
//!
//! ## Overview
//!
//! A [`CoreConfig`] holds every host bridge the services need plus the plain
//! settings that tune them. [`CoreConfigBuilder::build`] fails fast with an
//! actionable [`Error::CapabilityMissing`] when a bridge is absent, then runs
//! [`CoreConfig::validate`].
//!
//! ## Required Dependencies
//!
//! - `AudioEngine` - always required, there is no portable default
//!
//! ## Dependencies with desktop defaults
//!
//! - `HttpClient` - `ReqwestHttpClient`
//! - `SettingsStore` - `SqliteSettingsStore` when a database path is set, else `MemorySettingsStore`
//! - `RealtimeClient` - `InProcessRealtimeHub`
//!
//! The defaults are only available with the `desktop-shims` feature. Without
//! it every bridge must be injected.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .audio_engine(Arc::new(MyAudioEngine))
//!     .database_path("/home/ana/.local/share/vibes/settings.db")
//!     .enable_remote_extraction(false)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // No audio engine was provided
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing audio engine");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AudioEngine, HttpClient, LoggerSink, RealtimeClient, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Cobalt instances tried in order.
pub const DEFAULT_COBALT_INSTANCES: &[&str] = &["https://api.cobalt.tools", "https://co.wuk.sh"];

/// Piped instances tried in order, after every Cobalt instance.
pub const DEFAULT_PIPED_INSTANCES: &[&str] = &[
    "https://pipedapi.kavin.rocks",
    "https://pipedapi.adminforge.de",
    "https://pipedapi.moomoo.me",
];

/// Desktop-browser user agent sent to extraction backends.
pub const DEFAULT_EXTRACTION_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://saavn.dev/api";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Core configuration for the player.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub http_client: Arc<dyn HttpClient>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub realtime_client: Arc<dyn RealtimeClient>,
    pub audio_engine: Arc<dyn AudioEngine>,
    /// Optional mirror of tracing events into host logging
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub features: FeatureFlags,
    pub extraction: ExtractionApiConfig,
    pub catalog: CatalogApiConfig,
    pub player: PlayerSettings,
    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("realtime_client", &"RealtimeClient { ... }")
            .field("audio_engine", &"AudioEngine { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("features", &self.features)
            .field("extraction", &self.extraction)
            .field("catalog", &self.catalog)
            .field("player", &self.player)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Construct the sync session manager
    pub enable_sync: bool,

    /// Construct the online catalog client
    pub enable_catalog: bool,

    /// Resolve YouTube audio through the hosted extraction function instead
    /// of calling Cobalt/Piped directly
    pub enable_remote_extraction: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_sync: true,
            enable_catalog: true,
            enable_remote_extraction: false,
        }
    }
}

/// Audio extraction backends.
///
/// # Security Note
///
/// `remote_api_key` is a bearer credential. Load it from the host's
/// configuration, never from source.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtractionApiConfig {
    pub cobalt_instances: Vec<String>,
    pub piped_instances: Vec<String>,
    pub cobalt_timeout: Duration,
    pub piped_timeout: Duration,
    /// Hosted extraction function, used when remote extraction is enabled
    pub remote_endpoint: Option<String>,
    pub remote_api_key: Option<String>,
    pub remote_timeout: Duration,
    pub user_agent: String,
}

impl Default for ExtractionApiConfig {
    fn default() -> Self {
        Self {
            cobalt_instances: DEFAULT_COBALT_INSTANCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            piped_instances: DEFAULT_PIPED_INSTANCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cobalt_timeout: Duration::from_secs(10),
            piped_timeout: Duration::from_secs(8),
            remote_endpoint: None,
            remote_api_key: None,
            remote_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_EXTRACTION_USER_AGENT.to_string(),
        }
    }
}

impl std::fmt::Debug for ExtractionApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionApiConfig")
            .field("cobalt_instances", &self.cobalt_instances)
            .field("piped_instances", &self.piped_instances)
            .field("cobalt_timeout", &self.cobalt_timeout)
            .field("piped_timeout", &self.piped_timeout)
            .field("remote_endpoint", &self.remote_endpoint)
            .field(
                "remote_api_key",
                &self.remote_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("remote_timeout", &self.remote_timeout)
            .finish()
    }
}

impl ExtractionApiConfig {
    pub fn with_remote(mut self, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.remote_endpoint = Some(endpoint.into());
        self.remote_api_key = Some(api_key.into());
        self
    }

    pub fn with_cobalt_instances<I, S>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cobalt_instances = instances.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_piped_instances<I, S>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.piped_instances = instances.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the configuration for the selected extraction mode.
    pub fn validate(&self, remote: bool) -> Result<()> {
        if remote {
            match self.remote_endpoint.as_deref() {
                Some(endpoint) if !endpoint.trim().is_empty() => {}
                _ => {
                    return Err(Error::Config(
                        "Remote extraction enabled but no endpoint configured. \
                         Use ExtractionApiConfig::with_remote() or disable the feature."
                            .to_string(),
                    ))
                }
            }
            if self.remote_timeout.is_zero() {
                return Err(Error::Config(
                    "Remote extraction timeout must be greater than 0".to_string(),
                ));
            }
            return Ok(());
        }

        if self.cobalt_instances.is_empty() && self.piped_instances.is_empty() {
            return Err(Error::Config(
                "At least one Cobalt or Piped instance is required for extraction".to_string(),
            ));
        }

        if self.cobalt_timeout.is_zero() || self.piped_timeout.is_zero() {
            return Err(Error::Config(
                "Extraction backend timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Online catalog (JioSaavn-compatible API).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogApiConfig {
    pub base_url: String,
    pub search_limit: u32,
    pub trending_limit: u32,
}

impl Default for CatalogApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            search_limit: 20,
            trending_limit: 15,
        }
    }
}

impl CatalogApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("Catalog base URL cannot be empty".to_string()));
        }
        if self.search_limit == 0 || self.trending_limit == 0 {
            return Err(Error::Config(
                "Catalog limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport engine tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    pub initial_volume: f32,
    /// Position sampling period while playing
    pub poll_interval: Duration,
    /// `previous()` restarts the track once more than this has elapsed
    pub restart_threshold: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            initial_volume: 0.7,
            poll_interval: Duration::from_millis(250),
            restart_threshold: Duration::from_secs(3),
        }
    }
}

impl PlayerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "Initial volume must be within 0.0..=1.0, got {}",
                self.initial_volume
            )));
        }

        if self.poll_interval < MIN_POLL_INTERVAL || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "Poll interval must be between {}ms and {}ms, got {}ms",
                MIN_POLL_INTERVAL.as_millis(),
                MAX_POLL_INTERVAL.as_millis(),
                self.poll_interval.as_millis()
            )));
        }

        Ok(())
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Extraction instance lists and timeouts (or the remote endpoint)
    /// - Catalog base URL and limits, when the catalog is enabled
    /// - Initial volume and poll interval ranges
    /// - Event buffer size is non-zero
    pub fn validate(&self) -> Result<()> {
        self.extraction
            .validate(self.features.enable_remote_extraction)?;

        if self.features.enable_catalog {
            self.catalog.validate()?;
        }

        self.player.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn audio_engine_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioEngine".to_string(),
        message: "AudioEngine implementation is required for playback. \
                 Web: wrap HTMLAudioElement. Desktop/mobile: wrap the native media player. \
                 Tests: inject a fake engine."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for extraction and catalog requests. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP client."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for likes, playlists and equalizer state. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteSettingsStore. \
                 Web: inject a localStorage-backed store."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn realtime_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "RealtimeClient".to_string(),
        message: "RealtimeClient implementation is required for sync sessions. \
                 Desktop: enable the 'desktop-shims' feature to use InProcessRealtimeHub. \
                 Hosted: inject the deployment's realtime client, or disable sync."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client: Arc<dyn HttpClient> = Arc::new(bridge_desktop::ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_realtime_client() -> Result<Arc<dyn RealtimeClient>> {
    let client: Arc<dyn RealtimeClient> = Arc::new(bridge_desktop::InProcessRealtimeHub::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_realtime_client() -> Result<Arc<dyn RealtimeClient>> {
    Err(realtime_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::{MemorySettingsStore, SqliteSettingsStore};
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let Some(path) = database_path else {
        let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
        return Ok(store);
    };

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        Ok(runtime.block_on(SqliteSettingsStore::new(path))?)
    };

    // block_on is not allowed on a runtime thread
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path)).join().map_err(|_| {
            Error::Internal(
                "Worker thread panicked while creating default SettingsStore".to_string(),
            )
        })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _database_path: Option<PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    realtime_client: Option<Arc<dyn RealtimeClient>>,
    audio_engine: Option<Arc<dyn AudioEngine>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    database_path: Option<PathBuf>,
    features: FeatureFlags,
    extraction: Option<ExtractionApiConfig>,
    catalog: Option<CatalogApiConfig>,
    player: Option<PlayerSettings>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn realtime_client(mut self, client: Arc<dyn RealtimeClient>) -> Self {
        self.realtime_client = Some(client);
        self
    }

    /// Sets the audio engine (required).
    pub fn audio_engine(mut self, engine: Arc<dyn AudioEngine>) -> Self {
        self.audio_engine = Some(engine);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// SQLite file for the desktop default settings store.
    ///
    /// Ignored when a settings store is injected.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn enable_sync(mut self, enabled: bool) -> Self {
        self.features.enable_sync = enabled;
        self
    }

    pub fn enable_catalog(mut self, enabled: bool) -> Self {
        self.features.enable_catalog = enabled;
        self
    }

    pub fn enable_remote_extraction(mut self, enabled: bool) -> Self {
        self.features.enable_remote_extraction = enabled;
        self
    }

    /// Replaces all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn extraction_config(mut self, config: ExtractionApiConfig) -> Self {
        self.extraction = Some(config);
        self
    }

    pub fn catalog_config(mut self, config: CatalogApiConfig) -> Self {
        self.catalog = Some(config);
        self
    }

    pub fn player_settings(mut self, settings: PlayerSettings) -> Self {
        self.player = Some(settings);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when the audio engine is missing, or when
    ///   another bridge is missing and `desktop-shims` is disabled
    /// - [`Error::Config`] when validation fails
    pub fn build(self) -> Result<CoreConfig> {
        let audio_engine = self.audio_engine.ok_or_else(audio_engine_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.database_path)?,
        };

        let realtime_client = match self.realtime_client {
            Some(client) => client,
            None => provide_default_realtime_client()?,
        };

        let config = CoreConfig {
            http_client,
            settings_store,
            realtime_client,
            audio_engine,
            logger_sink: self.logger_sink,
            features: self.features,
            extraction: self.extraction.unwrap_or_default(),
            catalog: self.catalog.unwrap_or_default(),
            player: self.player.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
