//! # Playback Core
//!
//! The single player of a client device.
//!
//! ## Overview
//!
//! - [`session`]: queue, shuffle and repeat policy as plain state transitions
//! - [`resolver`]: turns a [`Song`](core_library::Song) into a direct URL, an
//!   extracted YouTube stream, or the video embed
//! - [`player`]: the transport engine driving one host
//!   [`AudioHandle`](bridge_traits::playback::AudioHandle) at a time
//!
//! ```text
//! intent ─▶ PlaybackSession ─▶ TrackResolver ─▶ AudioEngine::open ─▶ poller
//!                ▲                                                     │
//!                └──────────────── end of track ◀──────────────────────┘
//! ```

pub mod error;
pub mod player;
pub mod resolver;
pub mod session;

pub use error::{PlaybackError, Result};
pub use player::Player;
pub use resolver::{ResolvedSource, TrackResolver};
pub use session::{EndOfTrack, PlaybackSession, PreviousAction, RepeatMode};
