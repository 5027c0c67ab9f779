//! # Sync Manager
//!
//! Owns the device's single sync session and its realtime channel.
//!
//! ## Authority
//!
//! Only the host drives playback. Host intents go to the local
//! [`PlaybackTarget`] first and are then broadcast; a `play` overtaken by a
//! newer one while loading is dropped without a broadcast. A guest applies
//! received `play`/`pause`/`seek` to its own target and never re-broadcasts
//! them. Remote plays load on a separate task so that control messages keep
//! flowing while a song resolves, and a newer play replaces a pending one.
//! Host-only operations called on a guest fail with [`SyncError::NotHost`]
//! before anything is sent.
//!
//! ## Channel lifecycle
//!
//! At most one subscription is live per manager. Creating or joining a
//! session first leaves the current one, and leaving always unsubscribes the
//! channel handle. A failed subscription is reported and not retried.
//! Broadcast send failures never fail the operation: they are logged and
//! published as [`SyncEvent::ChannelError`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = SyncManager::new(realtime, Arc::new(player.clone()), event_bus, clock);
//! let session_id = manager.create_session("Friday", "Ana").await?;
//! manager.sync_play(song, 0.0).await?;
//! ```

use std::sync::{Arc, Weak};

use bridge_traits::realtime::{ChannelMessage, RealtimeChannel, RealtimeClient};
use bridge_traits::time::Clock;
use core_library::Song;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::message::SyncMessage;
use crate::session::{PresenceState, SyncSession, SyncUser};
use crate::target::PlaybackTarget;

pub const SESSION_ID_PREFIX: &str = "session-";
pub const USER_ID_PREFIX: &str = "user-";
pub const TOPIC_PREFIX: &str = "sync-";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Realtime topic of a session.
pub fn channel_topic(session_id: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, session_id)
}

/// `user-{millis}-{9 base36 chars}`, fixed for the lifetime of a manager.
fn generate_user_id(clock: &dyn Clock) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!(
        "{}{}-{}",
        USER_ID_PREFIX,
        clock.unix_timestamp_millis(),
        suffix
    )
}

#[derive(Clone)]
pub struct SyncManager {
    shared: Arc<Shared>,
}

struct Shared {
    realtime: Arc<dyn RealtimeClient>,
    target: Arc<dyn PlaybackTarget>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    user_id: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    session: Option<SyncSession>,
    user_name: String,
    link: Option<Link>,
}

/// The live subscription of the current session.
struct Link {
    session_id: String,
    channel: Arc<dyn RealtimeChannel>,
    listener: CancellationToken,
    plays: watch::Sender<Option<RemotePlay>>,
}

/// A host `play` waiting to be mirrored by this guest.
#[derive(Clone)]
struct RemotePlay {
    song: Song,
    time: f64,
}

impl Link {
    async fn close(self) {
        self.listener.cancel();
        if let Err(error) = self.channel.unsubscribe().await {
            warn!(session_id = %self.session_id, %error, "Failed to unsubscribe sync channel");
        }
    }
}

impl State {
    fn session_mut(&mut self, session_id: &str) -> Option<&mut SyncSession> {
        self.session.as_mut().filter(|s| s.id == session_id)
    }
}

impl SyncManager {
    pub fn new(
        realtime: Arc<dyn RealtimeClient>,
        target: Arc<dyn PlaybackTarget>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user_id = generate_user_id(clock.as_ref());
        debug!(user_id = %user_id, "Sync manager created");

        Self {
            shared: Arc::new(Shared {
                realtime,
                target,
                event_bus,
                clock,
                user_id,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    pub fn session(&self) -> Option<SyncSession> {
        self.shared.state.lock().session.clone()
    }

    pub fn is_host(&self) -> bool {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.is_host(&self.shared.user_id))
    }

    /// True while the session's channel subscription is live.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().link.is_some()
    }

    /// Starts a session hosted by this device and returns its id.
    ///
    /// # Errors
    ///
    /// [`SyncError::Channel`] when the session topic cannot be joined; no
    /// session is kept in that case.
    #[instrument(skip(self))]
    pub async fn create_session(&self, name: &str, user_name: &str) -> Result<String> {
        self.leave_session().await;

        let session_id = format!(
            "{}{}",
            SESSION_ID_PREFIX,
            self.shared.clock.unix_timestamp_millis()
        );
        let me = SyncUser {
            id: self.shared.user_id.clone(),
            name: user_name.to_string(),
            is_host: true,
        };
        self.shared
            .connect(SyncSession::hosted(session_id.as_str(), name, me), user_name)
            .await?;

        info!(session_id = %session_id, "Sync session created");
        self.shared.emit(SyncEvent::SessionCreated {
            session_id: session_id.clone(),
            host_id: self.shared.user_id.clone(),
        });
        Ok(session_id)
    }

    /// Joins an existing session as a guest.
    ///
    /// The host is unknown until the first presence sync arrives.
    #[instrument(skip(self))]
    pub async fn join_session(&self, session_id: &str, user_name: &str) -> Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SyncError::InvalidSessionId(session_id.to_string()));
        }

        self.leave_session().await;

        let me = SyncUser {
            id: self.shared.user_id.clone(),
            name: user_name.to_string(),
            is_host: false,
        };
        self.shared
            .connect(SyncSession::joined(session_id, me), user_name)
            .await?;

        info!(session_id, "Joined sync session");
        self.shared.emit(SyncEvent::SessionJoined {
            session_id: session_id.to_string(),
            user_id: self.shared.user_id.clone(),
        });
        Ok(())
    }

    /// Drops the session and unsubscribes its channel. Returns `false` when
    /// there was no session.
    pub async fn leave_session(&self) -> bool {
        match self.shared.disconnect().await {
            Some(session_id) => {
                info!(session_id = %session_id, "Left sync session");
                self.shared.emit(SyncEvent::SessionLeft { session_id });
                true
            }
            None => false,
        }
    }

    /// Host only: play `song` from `time` locally and on every guest.
    ///
    /// Returns `Ok(false)` when a newer play overtook this one while it was
    /// loading. Nothing is broadcast then and the replica keeps the newer song.
    ///
    /// # Errors
    ///
    /// [`SyncError::Playback`] when the local engine fails; nothing is
    /// broadcast then.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn sync_play(&self, song: Song, time: f64) -> Result<bool> {
        self.shared.require_host("control playback")?;
        if !self.shared.target.play_at(song.clone(), time).await? {
            debug!("Play superseded locally, not broadcasting");
            return Ok(false);
        }
        self.shared.publish(SyncMessage::Play { song, time }).await;
        Ok(true)
    }

    /// Host only.
    pub async fn sync_pause(&self) -> Result<()> {
        self.shared.require_host("control playback")?;
        self.shared.target.pause();
        self.shared.publish(SyncMessage::Pause {}).await;
        Ok(())
    }

    /// Host only.
    pub async fn sync_seek(&self, time: f64) -> Result<()> {
        self.shared.require_host("control playback")?;
        self.shared.target.seek(time);
        self.shared.publish(SyncMessage::Seek { time }).await;
        Ok(())
    }

    /// Host only. The lock is advisory UI state.
    pub async fn set_locked(&self, locked: bool) -> Result<()> {
        let session_id = self.shared.require_host("lock the session")?;
        self.shared.publish(SyncMessage::Lock { locked }).await;
        self.shared
            .emit(SyncEvent::LockChanged { session_id, locked });
        Ok(())
    }

    /// Host only. The kicked device leaves on receipt.
    pub async fn kick(&self, user_id: &str) -> Result<()> {
        self.shared.require_host("remove participants")?;
        if user_id.is_empty() || user_id == self.shared.user_id {
            return Err(SyncError::InvalidUser(user_id.to_string()));
        }

        self.shared
            .publish(SyncMessage::Kick {
                user_id: user_id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Host only: hands authority to `user_id`. This device becomes a guest.
    pub async fn transfer_host(&self, user_id: &str) -> Result<()> {
        let session_id = self.shared.require_host("transfer the host role")?;
        if user_id.is_empty() {
            return Err(SyncError::InvalidUser(user_id.to_string()));
        }
        if user_id == self.shared.user_id {
            return Ok(());
        }

        self.shared
            .publish(SyncMessage::TransferHost {
                new_host_id: user_id.to_string(),
            })
            .await;
        self.shared.track_presence(false).await;

        info!(session_id = %session_id, new_host = user_id, "Host role transferred");
        self.shared.emit(SyncEvent::HostChanged {
            session_id,
            host_id: user_id.to_string(),
        });
        Ok(())
    }

    /// Any participant may append to the shared queue.
    pub async fn add_to_shared_queue(&self, song: Song) -> Result<()> {
        let queue = {
            let state = self.shared.state.lock();
            let session = state.session.as_ref().ok_or(SyncError::NoActiveSession)?;
            let mut queue = session.shared_queue.clone();
            queue.push(song);
            queue
        };

        self.shared.publish_queue(queue).await;
        Ok(())
    }

    /// Host only. Out-of-range indices are a no-op returning `Ok(false)`.
    pub async fn remove_from_shared_queue(&self, index: usize) -> Result<bool> {
        let session_id = self.shared.require_host("edit the shared queue")?;
        let queue = {
            let mut state = self.shared.state.lock();
            let Some(session) = state.session_mut(&session_id) else {
                return Err(SyncError::NoActiveSession);
            };
            if index >= session.shared_queue.len() {
                return Ok(false);
            }
            let mut queue = session.shared_queue.clone();
            queue.remove(index);
            queue
        };

        self.shared.publish_queue(queue).await;
        Ok(true)
    }

    /// Host only.
    pub async fn clear_shared_queue(&self) -> Result<()> {
        self.shared.require_host("edit the shared queue")?;
        self.shared.publish_queue(Vec::new()).await;
        Ok(())
    }

    /// Host only: plays a shared-queue entry everywhere from the start.
    ///
    /// `Ok(false)` for an out-of-range index or a play overtaken while loading.
    pub async fn play_from_shared_queue(&self, index: usize) -> Result<bool> {
        self.shared.require_host("play from the shared queue")?;
        let song = self
            .shared
            .state
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.shared_queue.get(index).cloned());

        match song {
            Some(song) => self.sync_play(song, 0.0).await,
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SyncManager")
            .field("user_id", &self.shared.user_id)
            .field("session", &state.session.as_ref().map(|s| &s.id))
            .field("connected", &state.link.is_some())
            .finish()
    }
}

impl Shared {
    fn emit(&self, event: SyncEvent) {
        let _ = self.event_bus.emit(CoreEvent::Sync(event));
    }

    fn report_channel_error(&self, session_id: Option<&str>, message: String) {
        warn!(session_id, message = %message, "Sync channel error");
        self.emit(SyncEvent::ChannelError {
            session_id: session_id.map(str::to_string),
            message,
        });
    }

    /// Returns the session id when this device hosts the current session.
    fn require_host(&self, action: &'static str) -> Result<String> {
        let state = self.state.lock();
        let session = state.session.as_ref().ok_or(SyncError::NoActiveSession)?;
        if !session.is_host(&self.user_id) {
            debug!(action, "Rejected host-only action from guest");
            return Err(SyncError::NotHost { action });
        }
        Ok(session.id.clone())
    }

    /// Subscribes the session topic and installs `session` as current.
    async fn connect(self: &Arc<Self>, session: SyncSession, user_name: &str) -> Result<()> {
        let topic = channel_topic(&session.id);
        let subscription = match self.realtime.subscribe(&topic, &self.user_id).await {
            Ok(subscription) => subscription,
            Err(error) => {
                self.report_channel_error(Some(&session.id), error.to_string());
                return Err(error.into());
            }
        };

        let channel: Arc<dyn RealtimeChannel> = Arc::from(subscription.channel);
        let token = CancellationToken::new();
        let (plays, pending_plays) = watch::channel(None);
        let session_id = session.id.clone();
        let is_host = session.is_host(&self.user_id);

        let previous = {
            let mut state = self.state.lock();
            state.session = Some(session);
            state.user_name = user_name.to_string();
            state.link.replace(Link {
                session_id: session_id.clone(),
                channel,
                listener: token.clone(),
                plays,
            })
        };
        if let Some(previous) = previous {
            previous.close().await;
        }

        tokio::spawn(mirror_plays(
            Arc::downgrade(self),
            session_id.clone(),
            pending_plays,
            token.clone(),
        ));
        tokio::spawn(listen(
            Arc::downgrade(self),
            session_id,
            subscription.messages,
            token,
        ));
        self.track_presence(is_host).await;
        Ok(())
    }

    /// Takes the session and closes its channel. Returns the session id.
    async fn disconnect(&self) -> Option<String> {
        let (session, link) = {
            let mut state = self.state.lock();
            (state.session.take(), state.link.take())
        };
        if let Some(link) = link {
            link.close().await;
        }
        session.map(|s| s.id)
    }

    async fn track_presence(&self, is_host: bool) {
        let (channel, session_id, name) = {
            let state = self.state.lock();
            let Some(link) = &state.link else {
                return;
            };
            (
                link.channel.clone(),
                link.session_id.clone(),
                state.user_name.clone(),
            )
        };

        let presence = PresenceState { name, is_host };
        let result = match serde_json::to_value(&presence) {
            Ok(value) => channel.track(value).await.map_err(|e| e.to_string()),
            Err(error) => Err(error.to_string()),
        };
        if let Err(message) = result {
            self.report_channel_error(Some(&session_id), message);
        }
    }

    /// Applies `message` to the local replica, then broadcasts it.
    async fn publish(&self, message: SyncMessage) {
        let (channel, session_id) = {
            let mut state = self.state.lock();
            let Some(session) = state.session.as_mut() else {
                return;
            };
            session.apply(&message);
            let session_id = session.id.clone();
            (state.link.as_ref().map(|l| l.channel.clone()), session_id)
        };

        let Some(channel) = channel else {
            self.report_channel_error(Some(&session_id), "Not connected".to_string());
            return;
        };

        let envelope = match message.to_envelope() {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "Failed to encode sync message");
                return;
            }
        };

        debug!(event = %envelope.event, session_id = %session_id, "Broadcasting");
        if let Err(error) = channel.send(envelope).await {
            self.report_channel_error(Some(&session_id), error.to_string());
        }
    }

    async fn publish_queue(&self, queue: Vec<Song>) {
        let length = queue.len();
        self.publish(SyncMessage::QueueUpdate { queue }).await;

        let session_id = self.state.lock().session.as_ref().map(|s| s.id.clone());
        if let Some(session_id) = session_id {
            self.emit(SyncEvent::SharedQueueChanged { session_id, length });
        }
    }

    async fn handle_message(&self, session_id: &str, message: ChannelMessage) {
        match message {
            ChannelMessage::PresenceSync(entries) => {
                let user_count = {
                    let mut state = self.state.lock();
                    let Some(session) = state.session_mut(session_id) else {
                        return;
                    };
                    session.apply_presence(&entries);
                    session.users.len()
                };
                self.emit(SyncEvent::PresenceChanged {
                    session_id: session_id.to_string(),
                    user_count,
                });
            }
            ChannelMessage::Broadcast(envelope) => match SyncMessage::from_envelope(&envelope) {
                Ok(message) => self.apply_remote(session_id, message).await,
                Err(error) => {
                    warn!(event = %envelope.event, %error, "Ignoring malformed sync message");
                }
            },
        }
    }

    async fn apply_remote(&self, session_id: &str, message: SyncMessage) {
        if let SyncMessage::Kick { user_id } = &message {
            if *user_id == self.user_id {
                self.kicked(session_id).await;
            }
            return;
        }

        let event = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
                return;
            };
            if message.is_transport() && session.is_host(&self.user_id) {
                debug!(event = message.event_name(), "Host ignores transport broadcast");
                return;
            }

            session.apply(&message);
            if let (SyncMessage::Play { song, time }, Some(link)) = (&message, &state.link) {
                link.plays.send_replace(Some(RemotePlay {
                    song: song.clone(),
                    time: *time,
                }));
            }
            match &message {
                SyncMessage::Lock { locked } => Some(SyncEvent::LockChanged {
                    session_id: session_id.to_string(),
                    locked: *locked,
                }),
                SyncMessage::TransferHost { new_host_id } => Some(SyncEvent::HostChanged {
                    session_id: session_id.to_string(),
                    host_id: new_host_id.clone(),
                }),
                SyncMessage::QueueUpdate { queue } => Some(SyncEvent::SharedQueueChanged {
                    session_id: session_id.to_string(),
                    length: queue.len(),
                }),
                _ => None,
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }

        match message {
            SyncMessage::Pause {} => self.target.pause(),
            SyncMessage::Seek { time } => self.target.seek(time),
            SyncMessage::TransferHost { new_host_id } if new_host_id == self.user_id => {
                info!(session_id, "This device is now the session host");
                self.track_presence(true).await;
            }
            _ => {}
        }
    }

    /// Re-applies a pause or seek that arrived while `play` was loading.
    fn settle_remote_play(&self, session_id: &str, play: &RemotePlay, loaded: Result<bool>) {
        match loaded {
            Ok(true) => {}
            Ok(false) => {
                debug!(song_id = %play.song.id, "Mirrored play superseded");
                return;
            }
            Err(error) => {
                warn!(%error, "Failed to mirror host playback");
                return;
            }
        }

        let (paused, time) = {
            let state = self.state.lock();
            let Some(session) = state.session.as_ref().filter(|s| s.id == session_id) else {
                return;
            };
            let same_song = session
                .current_song
                .as_ref()
                .is_some_and(|s| s.id == play.song.id);
            if !same_song {
                return;
            }
            (!session.is_playing, session.current_time)
        };

        if time != play.time {
            self.target.seek(time);
        }
        if paused {
            self.target.pause();
        }
    }

    async fn kicked(&self, session_id: &str) {
        let current = self
            .state
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.id == session_id);
        if !current {
            return;
        }

        warn!(session_id, "Removed from sync session by the host");
        self.disconnect().await;
        self.emit(SyncEvent::Kicked {
            session_id: session_id.to_string(),
        });
    }

    /// The transport ended the message stream on its own.
    fn channel_closed(&self, session_id: &str) {
        let closed = {
            let mut state = self.state.lock();
            let ours = state
                .link
                .as_ref()
                .is_some_and(|link| link.session_id == session_id);
            if ours {
                if let Some(link) = state.link.take() {
                    link.listener.cancel();
                }
            }
            ours
        };
        if closed {
            self.report_channel_error(Some(session_id), "Channel closed".to_string());
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(link) = self.state.get_mut().link.take() {
            link.listener.cancel();
        }
    }
}

async fn listen(
    shared: Weak<Shared>,
    session_id: String,
    mut messages: BoxStream<'static, ChannelMessage>,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => break,
            message = messages.next() => message,
        };

        let Some(shared) = shared.upgrade() else {
            break;
        };
        match message {
            Some(message) => shared.handle_message(&session_id, message).await,
            None => {
                shared.channel_closed(&session_id);
                break;
            }
        }
    }
    debug!(session_id = %session_id, "Sync listener stopped");
}

/// Loads host plays on behalf of a guest, one at a time. A play that arrives
/// while another is loading drops the pending load and starts over.
async fn mirror_plays(
    shared: Weak<Shared>,
    session_id: String,
    mut plays: watch::Receiver<Option<RemotePlay>>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            changed = plays.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let mut pending = plays.borrow_and_update().clone();
        while let Some(play) = pending.take() {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            tokio::select! {
                _ = token.cancelled() => return,
                loaded = shared.target.play_at(play.song.clone(), play.time) => {
                    shared.settle_remote_play(&session_id, &play, loaded);
                }
                changed = plays.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!(song_id = %play.song.id, "Newer host play replaces pending load");
                    pending = plays.borrow_and_update().clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::FixedClock;

    #[test]
    fn test_user_id_shape() {
        let clock = FixedClock::from_millis(1_700_000_000_000);
        let id = generate_user_id(&clock);

        let suffix = id.strip_prefix("user-1700000000000-").unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_channel_topic() {
        assert_eq!(channel_topic("session-42"), "sync-session-42");
    }
}
