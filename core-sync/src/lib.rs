//! # Sync Broadcast Layer
//!
//! Mirrors one host's playback onto guest devices over a realtime topic.
//!
//! ## Components
//!
//! - **Messages** (`message`): the `{event, payload}` wire codec
//! - **Session replica** (`session`): users, lock, shared queue and mirrored
//!   transport state as seen by this device
//! - **Playback target** (`target`): the seam to the local transport engine
//! - **Manager** (`manager`): session lifecycle, host authority, the channel
//!   listener
//!
//! There is no server validating who the host is. Any device that claims the
//! role in presence, or sends a `transfer_host`, is believed.

pub mod error;
pub mod manager;
pub mod message;
pub mod session;
pub mod target;

pub use error::{Result, SyncError};
pub use manager::{channel_topic, SyncManager};
pub use message::SyncMessage;
pub use session::{PresenceState, SyncSession, SyncUser};
pub use target::PlaybackTarget;
