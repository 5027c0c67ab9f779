//! Transport Engine
//!
//! [`Player`] owns the single [`AudioHandle`] of a client, the
//! [`PlaybackSession`] and the position poller. Every public operation is one
//! atomic transition under the state lock; the lock is never held across an
//! await.
//!
//! ## Load generations
//!
//! Each `load_song` call takes a new generation number before it starts
//! resolving the source. When resolution or opening completes, the result is
//! applied only if no newer load (or `clear_queue`/`shutdown`) has happened
//! in the meantime; otherwise the freshly opened handle is stopped and
//! dropped. In-flight extraction requests are not aborted.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bridge_traits::playback::{AudioEngine, AudioHandle};
use core_library::Song;
use core_runtime::config::PlayerSettings;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, Receiver};
use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::resolver::{ResolvedSource, TrackResolver};
use crate::session::{EndOfTrack, PlaybackSession, PreviousAction, RepeatMode};

/// The transport engine. Cloning is cheap and every clone drives the same
/// player.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

struct Shared {
    engine: Arc<dyn AudioEngine>,
    resolver: TrackResolver,
    settings: PlayerSettings,
    event_bus: EventBus,
    state: Mutex<Inner>,
}

struct Inner {
    session: PlaybackSession,
    handle: Option<Box<dyn AudioHandle>>,
    /// The video embed is the player for the current song
    embed: bool,
    poller: Option<CancellationToken>,
    generation: u64,
}

enum Tick {
    Continue,
    Ended,
    Stop,
}

impl Player {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        resolver: TrackResolver,
        settings: PlayerSettings,
        event_bus: EventBus,
    ) -> Self {
        let session = PlaybackSession::new(settings.initial_volume);
        Self {
            shared: Arc::new(Shared {
                engine,
                resolver,
                settings,
                event_bus,
                state: Mutex::new(Inner {
                    session,
                    handle: None,
                    embed: false,
                    poller: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Copy of the current session state.
    pub fn snapshot(&self) -> PlaybackSession {
        self.shared.state.lock().session.clone()
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.shared.event_bus.subscribe()
    }

    /// Tears down the current source, then resolves and starts `song`.
    ///
    /// Returns `Ok(false)` when a newer load superseded this one before it
    /// could apply its result. YouTube songs never fail: when no audio stream
    /// can be found or played, the video embed takes over.
    ///
    /// # Errors
    ///
    /// A non-YouTube source that cannot be opened or played. The session is
    /// left paused with the song loaded, and a non-recoverable
    /// [`PlaybackEvent::Error`] is emitted.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn load_song(&self, song: Song) -> Result<bool> {
        let generation = self.shared.begin_load(&song);

        let url = match self.shared.resolver.resolve(&song).await {
            Ok(ResolvedSource::Direct(url)) => url,
            Ok(ResolvedSource::Extracted(result)) => {
                debug!(title = %result.title, "Using extracted audio stream");
                result.audio_url
            }
            Ok(ResolvedSource::VideoEmbed { video_id }) => {
                let mut inner = self.shared.state.lock();
                if inner.generation != generation {
                    debug!("Discarding superseded load");
                    return Ok(false);
                }
                self.shared.enter_video_fallback(&mut inner, &song, &video_id);
                return Ok(true);
            }
            Err(error) => {
                let mut inner = self.shared.state.lock();
                if inner.generation != generation {
                    return Ok(false);
                }
                return self.shared.settle_failure(&mut inner, &song, error);
            }
        };

        if !self.shared.is_current(generation) {
            debug!("Load superseded before opening the source");
            return Ok(false);
        }

        let opened = self.shared.engine.open(&url).await;

        let mut guard = self.shared.state.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            if let Ok(handle) = opened {
                handle.stop();
            }
            debug!("Discarding superseded load");
            return Ok(false);
        }

        let handle = match opened {
            Ok(handle) => handle,
            Err(error) => {
                let error = PlaybackError::SourceError(error.to_string());
                return self.shared.settle_failure(inner, &song, error);
            }
        };

        handle.set_volume(inner.session.effective_volume());
        if let Err(error) = handle.play() {
            let error = PlaybackError::PlaybackFailed(error.to_string());
            if song.is_youtube() {
                handle.stop();
            } else {
                inner.handle = Some(handle);
            }
            return self.shared.settle_failure(inner, &song, error);
        }

        inner.session.is_playing = true;
        inner.session.duration = handle
            .duration()
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(song.duration);
        inner.handle = Some(handle);
        Shared::start_poller(&self.shared, inner, generation);

        self.shared.emit(PlaybackEvent::Started {
            song_id: song.id.clone(),
            title: song.title.clone(),
        });
        self.shared.emit_now_playing(&song);
        info!("Playback started");
        Ok(true)
    }

    /// Loads and plays `song`, or resumes the loaded source when `None`.
    ///
    /// Resuming with nothing loaded is a no-op returning `Ok(false)`.
    pub async fn play(&self, song: Option<Song>) -> Result<bool> {
        match song {
            Some(song) => self.load_song(song).await,
            None => self.resume(),
        }
    }

    fn resume(&self) -> Result<bool> {
        let mut guard = self.shared.state.lock();
        let inner = &mut *guard;
        let Some(song) = inner.session.current_song.clone() else {
            return Ok(false);
        };

        if let Some(handle) = &inner.handle {
            if let Err(error) = handle.play() {
                inner.session.is_playing = false;
                let error = PlaybackError::PlaybackFailed(error.to_string());
                self.shared.report_error(&song, &error);
                return Err(error);
            }
            let generation = inner.generation;
            Shared::start_poller(&self.shared, inner, generation);
        } else if !inner.embed {
            return Ok(false);
        }

        inner.session.is_playing = true;
        self.shared.emit(PlaybackEvent::Resumed {
            song_id: song.id,
            position_ms: to_millis(inner.session.current_time),
        });
        Ok(true)
    }

    /// Stops sound and the poller. Returns `false` when nothing is loaded.
    pub fn pause(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let inner = &mut *guard;
        let Some(song_id) = inner.session.current_song.as_ref().map(|s| s.id.clone()) else {
            return false;
        };

        inner.stop_poller();
        if let Some(handle) = &inner.handle {
            handle.pause();
            inner.session.current_time = handle.position();
        } else if !inner.embed {
            return false;
        }

        inner.session.is_playing = false;
        self.shared.emit(PlaybackEvent::Paused {
            song_id,
            position_ms: to_millis(inner.session.current_time),
        });
        true
    }

    /// Flips playback based on the handle's live state rather than the
    /// cached `is_playing` flag.
    pub async fn toggle(&self) -> Result<bool> {
        let playing = {
            let inner = self.shared.state.lock();
            match &inner.handle {
                Some(handle) => handle.is_playing(),
                None => inner.session.is_playing,
            }
        };

        if playing {
            Ok(self.pause())
        } else {
            self.play(None).await
        }
    }

    /// Sets `current_time` to exactly `time` and forwards it to the handle.
    /// Non-finite values are ignored.
    pub fn seek(&self, time: f64) {
        if !time.is_finite() {
            return;
        }

        let mut guard = self.shared.state.lock();
        let inner = &mut *guard;
        inner.session.current_time = time;
        if let Some(handle) = &inner.handle {
            handle.seek(time);
        }
        if let Some(song) = &inner.session.current_song {
            self.shared.emit(PlaybackEvent::PositionChanged {
                song_id: song.id.clone(),
                position_ms: to_millis(time),
                duration_ms: to_millis(inner.session.duration),
            });
        }
    }

    /// Sets the level (clamped to `0.0..=1.0`) and unmutes. A level of 0
    /// does not count as muted.
    pub fn set_volume(&self, volume: f32) {
        let mut inner = self.shared.state.lock();
        inner.session.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        inner.session.is_muted = false;
        self.shared.apply_volume(&inner);
    }

    /// Returns the new mute state. The numeric volume is kept.
    pub fn toggle_mute(&self) -> bool {
        let mut inner = self.shared.state.lock();
        inner.session.is_muted = !inner.session.is_muted;
        self.shared.apply_volume(&inner);
        inner.session.is_muted
    }

    /// Advances per the queue policy. `Ok(false)` when there is nowhere to go.
    pub async fn next(&self) -> Result<bool> {
        let song = {
            let mut inner = self.shared.state.lock();
            let index = {
                let mut rng = rand::thread_rng();
                inner.session.next_index(&mut rng)
            };
            let Some(index) = index else {
                debug!("Next: nothing to advance to");
                return Ok(false);
            };
            inner.session.queue_index = Some(index);
            match inner.session.queued_song() {
                Some(song) => song.clone(),
                None => return Ok(false),
            }
        };

        self.load_song(song).await
    }

    /// Restarts the track after the restart threshold, otherwise steps back.
    pub async fn previous(&self) -> Result<bool> {
        let song = {
            let mut inner = self.shared.state.lock();
            match inner
                .session
                .previous_action(self.shared.settings.restart_threshold)
            {
                PreviousAction::Restart => None,
                PreviousAction::Goto(index) => {
                    inner.session.queue_index = Some(index);
                    inner.session.queued_song().cloned()
                }
                PreviousAction::Nothing => return Ok(false),
            }
        };

        match song {
            Some(song) => self.load_song(song).await,
            None => {
                self.seek(0.0);
                Ok(true)
            }
        }
    }

    /// Appends without touching the queue index or current playback.
    pub fn add_to_queue<I>(&self, songs: I)
    where
        I: IntoIterator<Item = Song>,
    {
        let mut inner = self.shared.state.lock();
        inner.session.add_to_queue(songs);
        self.shared.emit_queue(&inner.session);
    }

    /// Out-of-range indices are a no-op returning `false`.
    pub fn remove_from_queue(&self, index: usize) -> bool {
        let mut inner = self.shared.state.lock();
        let removed = inner.session.remove_from_queue(index);
        if removed {
            self.shared.emit_queue(&inner.session);
        }
        removed
    }

    /// Stops playback, releases the handle and empties the queue.
    pub fn clear_queue(&self) {
        let mut inner = self.shared.state.lock();
        let song_id = inner.session.current_song.as_ref().map(|s| s.id.clone());
        inner.release();
        inner.generation += 1;
        inner.session.clear_queue();

        self.shared.emit(PlaybackEvent::Stopped { song_id });
        self.shared.emit_queue(&inner.session);
    }

    /// Replaces the queue and starts `start_index`. A start index outside
    /// `songs` is a no-op returning `Ok(false)`.
    pub async fn play_playlist(&self, songs: Vec<Song>, start_index: usize) -> Result<bool> {
        let song = {
            let mut inner = self.shared.state.lock();
            let Some(song) = inner.session.replace_queue(songs, start_index) else {
                return Ok(false);
            };
            self.shared.emit_queue(&inner.session);
            song
        };

        self.load_song(song).await
    }

    /// Returns the new shuffle state.
    pub fn toggle_shuffle(&self) -> bool {
        let mut inner = self.shared.state.lock();
        inner.session.shuffle = !inner.session.shuffle;
        self.shared.emit_mode(&inner.session);
        inner.session.shuffle
    }

    pub fn set_repeat(&self, mode: RepeatMode) {
        let mut inner = self.shared.state.lock();
        inner.session.repeat = mode;
        self.shared.emit_mode(&inner.session);
    }

    /// Steps the repeat button: none, all, one, then back to none.
    pub fn cycle_repeat(&self) -> RepeatMode {
        let mut inner = self.shared.state.lock();
        inner.session.repeat = inner.session.repeat.cycle();
        self.shared.emit_mode(&inner.session);
        inner.session.repeat
    }

    /// Returns the new video mode.
    pub fn toggle_video_mode(&self) -> bool {
        let mut inner = self.shared.state.lock();
        inner.session.video_mode = !inner.session.video_mode;
        let enabled = inner.session.video_mode;
        self.shared
            .emit(PlaybackEvent::VideoModeChanged { enabled });
        enabled
    }

    /// Releases the handle and poller; any in-flight load is discarded.
    pub fn shutdown(&self) {
        let mut inner = self.shared.state.lock();
        inner.release();
        inner.generation += 1;
        inner.session.is_playing = false;
        let song_id = inner.session.current_song.as_ref().map(|s| s.id.clone());
        self.shared.emit(PlaybackEvent::Stopped { song_id });
        info!("Player shut down");
    }

    /// Natural end of the track loaded by `generation`.
    async fn handle_song_end(&self, generation: u64) {
        let song = {
            let mut guard = self.shared.state.lock();
            let inner = &mut *guard;
            if inner.generation != generation {
                return;
            }

            let action = {
                let mut rng = rand::thread_rng();
                inner.session.end_of_track(&mut rng)
            };
            match action {
                EndOfTrack::Restart => {
                    let restarted = inner.handle.as_ref().map(|handle| {
                        handle.seek(0.0);
                        handle.play()
                    });
                    inner.session.current_time = 0.0;
                    match restarted {
                        Some(Ok(())) => {
                            inner.session.is_playing = true;
                            Shared::start_poller(&self.shared, inner, generation);
                        }
                        Some(Err(error)) => warn!(%error, "Failed to restart track"),
                        None => {}
                    }
                    return;
                }
                EndOfTrack::Advance(index) => {
                    inner.session.queue_index = Some(index);
                    match inner.session.queued_song() {
                        Some(song) => song.clone(),
                        None => return,
                    }
                }
                EndOfTrack::Stop => {
                    debug!("Queue finished");
                    return;
                }
            }
        };

        if let Err(error) = self.load_song(song).await {
            warn!(%error, "Auto-advance failed");
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.state.lock();
        f.debug_struct("Player")
            .field("current_song", &inner.session.current_song.as_ref().map(|s| &s.id))
            .field("is_playing", &inner.session.is_playing)
            .field("generation", &inner.generation)
            .finish()
    }
}

impl Shared {
    fn emit(&self, event: PlaybackEvent) {
        let _ = self.event_bus.emit(CoreEvent::Playback(event));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Releases the previous source and takes a new generation.
    fn begin_load(&self, song: &Song) -> u64 {
        let mut inner = self.state.lock();
        inner.release();
        inner.embed = false;
        inner.session.begin_load(song.clone());
        inner.generation += 1;

        self.emit(PlaybackEvent::TrackLoading {
            song_id: song.id.clone(),
            title: song.title.clone(),
        });
        inner.generation
    }

    /// YouTube failures become the video embed, anything else is reported.
    fn settle_failure(&self, inner: &mut Inner, song: &Song, error: PlaybackError) -> Result<bool> {
        if let Some(video_id) = song.youtube_video_id() {
            debug!(%error, "Audio failed for YouTube song");
            self.enter_video_fallback(inner, song, video_id);
            return Ok(true);
        }

        inner.session.is_playing = false;
        self.report_error(song, &error);
        Err(error)
    }

    fn report_error(&self, song: &Song, error: &PlaybackError) {
        warn!(song_id = %song.id, %error, "Playback failed");
        self.emit(PlaybackEvent::Error {
            song_id: Some(song.id.clone()),
            message: error.to_string(),
            recoverable: false,
        });
    }

    fn enter_video_fallback(&self, inner: &mut Inner, song: &Song, video_id: &str) {
        inner.embed = true;
        inner.session.video_mode = true;
        inner.session.is_playing = true;
        if inner.session.duration <= 0.0 {
            inner.session.duration = song.duration;
        }

        info!(video_id, "Playing through the video embed");
        self.emit(PlaybackEvent::VideoFallback {
            song_id: song.id.clone(),
            video_id: video_id.to_string(),
        });
        self.emit_now_playing(song);
    }

    fn emit_now_playing(&self, song: &Song) {
        self.emit(PlaybackEvent::NowPlaying {
            song_id: song.id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            artwork: song.artwork.clone(),
        });
    }

    fn apply_volume(&self, inner: &Inner) {
        if let Some(handle) = &inner.handle {
            handle.set_volume(inner.session.effective_volume());
        }
        self.emit(PlaybackEvent::VolumeChanged {
            volume_percent: (inner.session.volume * 100.0).round() as u8,
            muted: inner.session.is_muted,
        });
    }

    fn emit_queue(&self, session: &PlaybackSession) {
        self.emit(PlaybackEvent::QueueChanged {
            length: session.queue.len(),
            index: session.queue_index,
        });
    }

    fn emit_mode(&self, session: &PlaybackSession) {
        self.emit(PlaybackEvent::ModeChanged {
            shuffle: session.shuffle,
            repeat: session.repeat.to_string(),
        });
    }

    /// Replaces any running poller with a fresh one bound to `generation`.
    fn start_poller(shared: &Arc<Shared>, inner: &mut Inner, generation: u64) {
        inner.stop_poller();
        let token = CancellationToken::new();
        inner.poller = Some(token.clone());

        tokio::spawn(poll_position(
            Arc::downgrade(shared),
            token,
            generation,
            shared.settings.poll_interval,
        ));
    }

    fn sample(&self, generation: u64) -> Tick {
        let mut guard = self.state.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            return Tick::Stop;
        }
        let (Some(handle), Some(song)) = (&inner.handle, &inner.session.current_song) else {
            return Tick::Stop;
        };

        inner.session.current_time = handle.position();
        if let Some(duration) = handle.duration().filter(|d| d.is_finite() && *d > 0.0) {
            inner.session.duration = duration;
        }

        if handle.is_ended() {
            inner.session.is_playing = false;
            inner.poller = None;
            self.emit(PlaybackEvent::Completed {
                song_id: song.id.clone(),
            });
            return Tick::Ended;
        }

        self.emit(PlaybackEvent::PositionChanged {
            song_id: song.id.clone(),
            position_ms: to_millis(inner.session.current_time),
            duration_ms: to_millis(inner.session.duration),
        });
        Tick::Continue
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.state.get_mut().release();
    }
}

impl Inner {
    fn stop_poller(&mut self) {
        if let Some(token) = self.poller.take() {
            token.cancel();
        }
    }

    /// Stops the poller and the handle.
    fn release(&mut self) {
        self.stop_poller();
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

async fn poll_position(
    shared: Weak<Shared>,
    token: CancellationToken,
    generation: u64,
    period: Duration,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };
        match shared.sample(generation) {
            Tick::Continue => {}
            Tick::Stop => break,
            Tick::Ended => {
                Player { shared }.handle_song_end(generation).await;
                break;
            }
        }
    }
}

fn to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}
