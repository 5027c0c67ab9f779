//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate libraries:
//! - `HttpClient` using `reqwest`
//! - `SettingsStore` using a SQLite-backed key-value table, or an in-memory map
//! - `RealtimeClient` using an in-process `tokio::sync::broadcast` hub
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{InProcessRealtimeHub, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let settings = SqliteSettingsStore::new("vibes/settings.db".into()).await.unwrap();
//!     let realtime = InProcessRealtimeHub::new();
//!
//!     // Use in core configuration
//! }
//! ```

mod http;
mod realtime;
mod settings;

pub use http::ReqwestHttpClient;
pub use realtime::InProcessRealtimeHub;
pub use settings::{MemorySettingsStore, SqliteSettingsStore};
