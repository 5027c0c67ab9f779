//! # Event Bus System
//!
//! Typed event distribution for the player core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: one enum per domain, wrapped by [`CoreEvent`]
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with predicate filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Player       ├──────────────>│           │
//! └──────────────┘               │           │
//!                                │ EventBus  │
//! ┌──────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Extraction   ├──────────────>│  channel) ├─────────────────>│ UI / host  │
//! └──────────────┘               │           │                  └────────────┘
//!                                │           │
//! ┌──────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ Sync / Stores├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! User-facing notices ("toasts") are events too: a non-YouTube playback
//! failure arrives as [`PlaybackEvent::Error`], a failed sync send as
//! [`SyncEvent::ChannelError`].
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::Started {
//!         song_id: "saavn-1".to_string(),
//!         title: "Kesariya".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Playback started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped, treat as shutdown.
//!
//! `emit` returns an error when nobody is subscribed. Publishers in this
//! workspace ignore that case with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// The position poller publishes four events per second while playing, so
/// this leaves a few seconds of headroom for a slow subscriber.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Extraction(ExtractionEvent),
    Sync(SyncEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Extraction(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::ChannelError { .. }) => EventSeverity::Error,
            CoreEvent::Extraction(ExtractionEvent::Exhausted { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::VideoFallback { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Kicked { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Extraction(ExtractionEvent::Resolved { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::SessionCreated { .. })
            | CoreEvent::Sync(SyncEvent::SessionJoined { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events emitted by the transport engine.
///
/// Positions and durations are whole milliseconds so events stay `Eq`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A load began; the source may still be resolving.
    TrackLoading { song_id: String, title: String },
    /// A handle was opened and playback began.
    Started { song_id: String, title: String },
    Paused { song_id: String, position_ms: u64 },
    Resumed { song_id: String, position_ms: u64 },
    /// Playback stopped and the handle was released.
    Stopped { song_id: Option<String> },
    /// Track reached its natural end.
    Completed { song_id: String },
    /// Sampled by the position poller, or set by a seek.
    PositionChanged {
        song_id: String,
        position_ms: u64,
        duration_ms: u64,
    },
    /// Media-session metadata for the track that just started.
    NowPlaying {
        song_id: String,
        title: String,
        artist: String,
        album: Option<String>,
        artwork: Option<String>,
    },
    /// Audio extraction failed; the video embed is now the player.
    VideoFallback { song_id: String, video_id: String },
    VideoModeChanged { enabled: bool },
    VolumeChanged { volume_percent: u8, muted: bool },
    QueueChanged { length: usize, index: Option<usize> },
    ModeChanged { shuffle: bool, repeat: String },
    /// Playback error; `recoverable: false` is shown to the user.
    Error {
        song_id: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::TrackLoading { .. } => "Loading track",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::PositionChanged { .. } => "Playback position changed",
            PlaybackEvent::NowPlaying { .. } => "Now playing",
            PlaybackEvent::VideoFallback { .. } => "Falling back to video playback",
            PlaybackEvent::VideoModeChanged { .. } => "Video mode changed",
            PlaybackEvent::VolumeChanged { .. } => "Volume changed",
            PlaybackEvent::QueueChanged { .. } => "Queue changed",
            PlaybackEvent::ModeChanged { .. } => "Shuffle or repeat changed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Extraction Events
// ============================================================================

/// Progress of the YouTube audio extraction chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ExtractionEvent {
    /// A backend failed and the chain moved on.
    BackendSkipped {
        video_id: String,
        backend: String,
        reason: String,
    },
    Resolved { video_id: String, backend: String },
    /// Every backend failed.
    Exhausted { video_id: String, attempts: usize },
}

impl ExtractionEvent {
    fn description(&self) -> &str {
        match self {
            ExtractionEvent::BackendSkipped { .. } => "Extraction backend skipped",
            ExtractionEvent::Resolved { .. } => "Audio stream resolved",
            ExtractionEvent::Exhausted { .. } => "All extraction backends failed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to multi-device sync sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    SessionCreated { session_id: String, host_id: String },
    SessionJoined { session_id: String, user_id: String },
    SessionLeft { session_id: String },
    /// The local user was kicked by the host.
    Kicked { session_id: String },
    HostChanged { session_id: String, host_id: String },
    LockChanged { session_id: String, locked: bool },
    PresenceChanged { session_id: String, user_count: usize },
    SharedQueueChanged { session_id: String, length: usize },
    /// Subscribe or send failed; the local player keeps working.
    ChannelError {
        session_id: Option<String>,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::SessionCreated { .. } => "Sync session created",
            SyncEvent::SessionJoined { .. } => "Joined sync session",
            SyncEvent::SessionLeft { .. } => "Left sync session",
            SyncEvent::Kicked { .. } => "Removed from sync session",
            SyncEvent::HostChanged { .. } => "Session host changed",
            SyncEvent::LockChanged { .. } => "Session lock changed",
            SyncEvent::PresenceChanged { .. } => "Session members changed",
            SyncEvent::SharedQueueChanged { .. } => "Shared queue changed",
            SyncEvent::ChannelError { .. } => "Sync channel error",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Changes to persisted collaborator state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    SongLiked { song_id: String },
    SongUnliked { song_id: String },
    PlaylistCreated { playlist_id: String, name: String },
    /// `change_type` is one of "renamed", "song_added", "song_removed".
    PlaylistUpdated {
        playlist_id: String,
        change_type: String,
    },
    PlaylistDeleted { playlist_id: String },
    EqualizerChanged { preset: String },
    LocalSongsImported { count: usize },
    LocalSongRemoved { song_id: String },
    LocalSongsCleared,
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::SongLiked { .. } => "Song liked",
            LibraryEvent::SongUnliked { .. } => "Song unliked",
            LibraryEvent::PlaylistCreated { .. } => "Playlist created",
            LibraryEvent::PlaylistUpdated { .. } => "Playlist updated",
            LibraryEvent::PlaylistDeleted { .. } => "Playlist deleted",
            LibraryEvent::EqualizerChanged { .. } => "Equalizer changed",
            LibraryEvent::LocalSongsImported { .. } => "Local songs imported",
            LibraryEvent::LocalSongRemoved { .. } => "Local song removed",
            LibraryEvent::LocalSongsCleared => "Local songs cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events gets
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events not matching a predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`/`try_recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next matching event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(song_id: &str) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::Started {
            song_id: song_id.to_string(),
            title: "Test Song".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("a")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::SessionCreated {
            session_id: "session-1".to_string(),
            host_id: "user-1".to_string(),
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Extraction(_)));

        bus.emit(started("a")).ok();
        let resolved = CoreEvent::Extraction(ExtractionEvent::Resolved {
            video_id: "dQw4w9WgXcQ".to_string(),
            backend: "piped".to_string(),
        });
        bus.emit(resolved.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), resolved);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::Playback(PlaybackEvent::PositionChanged {
                song_id: "a".to_string(),
                position_ms: i * 250,
                duration_ms: 180_000,
            }))
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error = CoreEvent::Playback(PlaybackEvent::Error {
            song_id: Some("local-1".to_string()),
            message: "decode failed".to_string(),
            recoverable: false,
        });
        assert_eq!(error.severity(), EventSeverity::Error);

        let exhausted = CoreEvent::Extraction(ExtractionEvent::Exhausted {
            video_id: "x".to_string(),
            attempts: 5,
        });
        assert_eq!(exhausted.severity(), EventSeverity::Warning);

        assert_eq!(started("a").severity(), EventSeverity::Info);
        assert_eq!(
            CoreEvent::Library(LibraryEvent::LocalSongsCleared).severity(),
            EventSeverity::Debug
        );
        assert!(EventSeverity::Error > EventSeverity::Warning);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Sync(SyncEvent::Kicked {
            session_id: "session-1".to_string(),
        });
        assert_eq!(event.description(), "Removed from sync session");
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut stream = EventStream::new(bus.subscribe());

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(started(&format!("song-{}", i))).ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(CoreEvent::Library(LibraryEvent::SongLiked {
                    song_id: format!("song-{}", i),
                }))
                .ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while let Some(Ok(_)) = stream.try_recv() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Playback(PlaybackEvent::VideoFallback {
            song_id: "yt-abc".to_string(),
            video_id: "abc".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Playback");
        assert_eq!(value["payload"]["event"], "VideoFallback");
        assert_eq!(value["payload"]["video_id"], "abc");

        let back: CoreEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::default();
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }
}
