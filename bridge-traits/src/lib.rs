//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the player core and the
//! platform-specific pieces it cannot own itself: the network, local key-value
//! storage, the realtime pub/sub transport used by sync sessions, audio output,
//! and the clock/log sinks.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP for extraction backends and the catalog
//! - [`RealtimeClient`](realtime::RealtimeClient) - Named broadcast topics with presence
//!
//! ### Playback
//! - [`AudioEngine`](playback::AudioEngine) - Opens one [`AudioHandle`](playback::AudioHandle) per loaded source
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - `localStorage`-style keyed strings
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Web      | host-provided       |
//!
//! The audio engine has no desktop default: every host supplies its own player.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations should convert platform-specific errors into it with an
//! actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared across
//! tokio tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod playback;
pub mod realtime;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use playback::{AudioEngine, AudioHandle};
pub use realtime::{
    BroadcastEnvelope, ChannelMessage, PresenceEntry, RealtimeChannel, RealtimeClient,
    Subscription,
};
pub use storage::SettingsStore;
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
