//! Transport engine behaviour against a scripted audio host.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::playback::{AudioEngine, AudioHandle};
use core_extraction::{AudioExtractor, AudioResult};
use core_library::{youtube_song, youtube_thumbnail_url, Song, SongSource};
use core_playback::{PlaybackError, Player, RepeatMode, TrackResolver};
use core_runtime::config::PlayerSettings;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, Receiver};
use parking_lot::Mutex;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug)]
struct HandleState {
    playing: bool,
    position: f64,
    duration: Option<f64>,
    ended: bool,
    volume: f32,
    stopped: bool,
    seeks: Vec<f64>,
}

impl Default for HandleState {
    fn default() -> Self {
        Self {
            playing: false,
            position: 0.0,
            duration: Some(180.0),
            ended: false,
            volume: 1.0,
            stopped: false,
            seeks: Vec::new(),
        }
    }
}

struct FakeHandle {
    state: Arc<Mutex<HandleState>>,
    fail_play: bool,
}

impl AudioHandle for FakeHandle {
    fn play(&self) -> BridgeResult<()> {
        if self.fail_play {
            return Err(BridgeError::OperationFailed("decode error".to_string()));
        }
        self.state.lock().playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().playing = false;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.stopped = true;
    }

    fn seek(&self, position_secs: f64) {
        let mut state = self.state.lock();
        state.position = position_secs;
        state.ended = false;
        state.seeks.push(position_secs);
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn is_ended(&self) -> bool {
        self.state.lock().ended
    }
}

#[derive(Default)]
struct FakeEngine {
    opened: Mutex<Vec<(String, Arc<Mutex<HandleState>>)>>,
    fail_open: Mutex<HashSet<String>>,
    fail_play: Mutex<HashSet<String>>,
}

impl FakeEngine {
    fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    fn handle(&self, url: &str) -> Arc<Mutex<HandleState>> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|(opened, _)| opened == url)
            .map(|(_, state)| state.clone())
            .unwrap_or_else(|| panic!("{} was never opened", url))
    }

    fn live_handles(&self) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|(_, state)| !state.lock().stopped)
            .count()
    }
}

#[async_trait]
impl AudioEngine for FakeEngine {
    async fn open(&self, url: &str) -> BridgeResult<Box<dyn AudioHandle>> {
        if self.fail_open.lock().contains(url) {
            return Err(BridgeError::NotAvailable(format!("cannot open {}", url)));
        }

        let state = Arc::new(Mutex::new(HandleState::default()));
        self.opened.lock().push((url.to_string(), state.clone()));
        Ok(Box::new(FakeHandle {
            state,
            fail_play: self.fail_play.lock().contains(url),
        }))
    }
}

/// Extractor whose per-video latency and outcome are scripted.
#[derive(Default)]
struct ScriptedExtractor {
    delays: HashMap<String, Duration>,
    unavailable: HashSet<String>,
}

impl ScriptedExtractor {
    fn delay(mut self, video_id: &str, delay: Duration) -> Self {
        self.delays.insert(video_id.to_string(), delay);
        self
    }

    fn unavailable(mut self, video_id: &str) -> Self {
        self.unavailable.insert(video_id.to_string());
        self
    }
}

#[async_trait]
impl AudioExtractor for ScriptedExtractor {
    async fn extract(&self, video_id: &str) -> Option<AudioResult> {
        if let Some(delay) = self.delays.get(video_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.unavailable.contains(video_id) {
            return None;
        }
        Some(AudioResult {
            audio_url: stream_url(video_id),
            title: video_id.to_string(),
            thumbnail: youtube_thumbnail_url(video_id),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn stream_url(video_id: &str) -> String {
    format!("https://stream.test/{}.m4a", video_id)
}

fn song(id: &str) -> Song {
    Song::new(id, id.to_uppercase(), "Artist", SongSource::Online, url(id)).with_duration(200.0)
}

fn url(id: &str) -> String {
    format!("https://cdn.test/{}.mp4", id)
}

fn harness(extractor: ScriptedExtractor) -> (Player, Arc<FakeEngine>, Receiver<CoreEvent>) {
    let engine = Arc::new(FakeEngine::default());
    let bus = EventBus::new(256);
    let events = bus.subscribe();
    let player = Player::new(
        engine.clone(),
        TrackResolver::new(Arc::new(extractor)),
        PlayerSettings::default(),
        bus,
    );
    (player, engine, events)
}

fn drain(events: &mut Receiver<CoreEvent>) -> Vec<PlaybackEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Playback(event) = event {
            drained.push(event);
        }
    }
    drained
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// Queue navigation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_next_walks_queue_then_stops() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    assert!(player
        .play_playlist(vec![song("a"), song("b"), song("c")], 0)
        .await
        .unwrap());

    assert!(player.next().await.unwrap());
    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(1));
    assert_eq!(session.current_song.unwrap().id, "b");

    assert!(player.next().await.unwrap());
    assert_eq!(player.snapshot().current_song.unwrap().id, "c");

    assert!(!player.next().await.unwrap());
    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(2));
    assert_eq!(session.current_song.unwrap().id, "c");
    assert_eq!(engine.opened_urls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_next_wraps_with_repeat_all() {
    let (player, _engine, _events) = harness(ScriptedExtractor::default());
    player.set_repeat(RepeatMode::All);
    player
        .play_playlist(vec![song("a"), song("b"), song("c")], 0)
        .await
        .unwrap();

    for _ in 0..3 {
        player.next().await.unwrap();
    }

    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(0));
    assert_eq!(session.current_song.unwrap().id, "a");
}

#[tokio::test(start_paused = true)]
async fn test_next_on_empty_queue_is_noop() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());

    assert!(!player.next().await.unwrap());
    assert!(!player.previous().await.unwrap());
    assert!(engine.opened_urls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_play_playlist_with_bad_start_is_noop() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());

    assert!(!player.play_playlist(vec![song("a")], 4).await.unwrap());
    assert!(!player.play_playlist(Vec::new(), 0).await.unwrap());
    assert!(player.snapshot().queue.is_empty());
    assert!(engine.opened_urls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_previous_restarts_after_three_seconds() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player
        .play_playlist(vec![song("a"), song("b")], 1)
        .await
        .unwrap();
    player.seek(10.0);

    assert!(player.previous().await.unwrap());

    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(1));
    assert_eq!(session.current_time, 0.0);
    assert_eq!(engine.handle(&url("b")).lock().seeks, vec![10.0, 0.0]);
    assert_eq!(engine.opened_urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_previous_within_threshold_steps_back() {
    let (player, _engine, _events) = harness(ScriptedExtractor::default());
    player
        .play_playlist(vec![song("a"), song("b")], 1)
        .await
        .unwrap();
    player.seek(2.0);

    assert!(player.previous().await.unwrap());
    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(0));
    assert_eq!(session.current_song.unwrap().id, "a");

    assert!(player.previous().await.unwrap());
    assert_eq!(player.snapshot().queue_index, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_queue_edits_do_not_interrupt_playback() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default());
    player
        .play_playlist(vec![song("a"), song("b"), song("c")], 2)
        .await
        .unwrap();
    drain(&mut events);

    player.add_to_queue(vec![song("d")]);
    assert!(player.remove_from_queue(0));
    assert!(!player.remove_from_queue(9));

    let session = player.snapshot();
    assert_eq!(session.queue.len(), 3);
    assert_eq!(session.queue_index, Some(1));
    assert_eq!(session.current_song.unwrap().id, "c");
    assert!(session.is_playing);
    assert_eq!(engine.live_handles(), 1);

    let queue_events: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PlaybackEvent::QueueChanged { .. }))
        .collect();
    assert_eq!(
        queue_events.last(),
        Some(&PlaybackEvent::QueueChanged {
            length: 3,
            index: Some(1)
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_clear_queue_releases_handle() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player
        .play_playlist(vec![song("a"), song("b")], 0)
        .await
        .unwrap();

    player.clear_queue();

    let session = player.snapshot();
    assert!(session.queue.is_empty());
    assert_eq!(session.queue_index, None);
    assert!(session.current_song.is_none());
    assert!(!session.is_playing);
    assert!(engine.handle(&url("a")).lock().stopped);
    assert!(!player.play(None).await.unwrap());
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_only_one_handle_sounds_at_a_time() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());

    player.play(Some(song("a"))).await.unwrap();
    player.play(Some(song("b"))).await.unwrap();
    player.play(Some(song("c"))).await.unwrap();

    assert_eq!(engine.opened_urls().len(), 3);
    assert_eq!(engine.live_handles(), 1);
    assert!(engine.handle(&url("c")).lock().playing);
    assert!(engine.handle(&url("a")).lock().stopped);
}

#[tokio::test(start_paused = true)]
async fn test_play_outside_queue_keeps_queue_index() {
    let (player, _engine, _events) = harness(ScriptedExtractor::default());
    player
        .play_playlist(vec![song("a"), song("b")], 0)
        .await
        .unwrap();

    player.play(Some(song("x"))).await.unwrap();
    player.next().await.unwrap();

    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(1));
    assert_eq!(session.current_song.unwrap().id, "b");
}

#[tokio::test(start_paused = true)]
async fn test_poller_publishes_position_until_paused() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default());
    player.play(Some(song("a"))).await.unwrap();
    let handle = engine.handle(&url("a"));

    handle.lock().position = 12.5;
    advance(300).await;
    assert_eq!(player.snapshot().current_time, 12.5);
    assert!(drain(&mut events).contains(&PlaybackEvent::PositionChanged {
        song_id: "a".to_string(),
        position_ms: 12_500,
        duration_ms: 180_000,
    }));

    assert!(player.pause());
    assert!(!handle.lock().playing);
    handle.lock().position = 40.0;
    advance(1_000).await;

    let session = player.snapshot();
    assert_eq!(session.current_time, 12.5);
    assert!(!session.is_playing);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, PlaybackEvent::PositionChanged { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_seek_sets_requested_time_exactly() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player.play(Some(song("a"))).await.unwrap();

    player.seek(42.25);

    assert_eq!(player.snapshot().current_time, 42.25);
    assert_eq!(engine.handle(&url("a")).lock().position, 42.25);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_reads_live_handle_state() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player.play(Some(song("a"))).await.unwrap();
    let handle = engine.handle(&url("a"));

    // The host paused the element behind the player's back.
    handle.lock().playing = false;
    assert!(player.snapshot().is_playing);

    assert!(player.toggle().await.unwrap());
    assert!(handle.lock().playing);
    assert!(player.snapshot().is_playing);

    assert!(player.toggle().await.unwrap());
    assert!(!handle.lock().playing);
    assert!(!player.snapshot().is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_mute_is_independent_of_volume() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player.play(Some(song("a"))).await.unwrap();
    let handle = engine.handle(&url("a"));
    assert_eq!(handle.lock().volume, 0.7);

    player.set_volume(0.4);
    assert_eq!(handle.lock().volume, 0.4);

    assert!(player.toggle_mute());
    assert_eq!(handle.lock().volume, 0.0);
    assert_eq!(player.snapshot().volume, 0.4);

    player.play(Some(song("b"))).await.unwrap();
    assert_eq!(engine.handle(&url("b")).lock().volume, 0.0);

    assert!(!player.toggle_mute());
    assert_eq!(engine.handle(&url("b")).lock().volume, 0.4);

    player.set_volume(0.0);
    let session = player.snapshot();
    assert!(!session.is_muted);
    assert_eq!(session.volume, 0.0);
}

// ============================================================================
// End of track
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_of_track_advances_queue() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default());
    player
        .play_playlist(vec![song("a"), song("b")], 0)
        .await
        .unwrap();

    engine.handle(&url("a")).lock().ended = true;
    advance(300).await;

    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(1));
    assert_eq!(session.current_song.unwrap().id, "b");
    assert!(session.is_playing);
    assert!(engine.handle(&url("a")).lock().stopped);
    assert!(drain(&mut events).contains(&PlaybackEvent::Completed {
        song_id: "a".to_string()
    }));
}

#[tokio::test(start_paused = true)]
async fn test_repeat_one_restarts_without_moving() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player.set_repeat(RepeatMode::One);
    player
        .play_playlist(vec![song("a"), song("b")], 0)
        .await
        .unwrap();
    let handle = engine.handle(&url("a"));

    handle.lock().position = 180.0;
    handle.lock().ended = true;
    advance(300).await;

    let session = player.snapshot();
    assert_eq!(session.queue_index, Some(0));
    assert_eq!(session.current_song.unwrap().id, "a");
    assert!(session.is_playing);
    assert_eq!(handle.lock().seeks, vec![0.0]);
    assert_eq!(engine.opened_urls().len(), 1);

    // The restarted track keeps being sampled.
    handle.lock().position = 5.0;
    advance(300).await;
    assert_eq!(player.snapshot().current_time, 5.0);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_exhausted_queue_stops() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    player.play_playlist(vec![song("a")], 0).await.unwrap();

    engine.handle(&url("a")).lock().ended = true;
    advance(1_000).await;

    let session = player.snapshot();
    assert!(!session.is_playing);
    assert_eq!(session.queue_index, Some(0));
    assert_eq!(engine.opened_urls().len(), 1);
}

// ============================================================================
// Failures and YouTube fallback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_youtube_open_failure_is_reported() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default());
    engine.fail_open.lock().insert(url("a"));

    let result = player.play(Some(song("a"))).await;

    assert!(matches!(result, Err(PlaybackError::SourceError(_))));
    let session = player.snapshot();
    assert!(!session.is_playing);
    assert_eq!(session.current_song.unwrap().id, "a");
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        PlaybackEvent::Error { recoverable: false, song_id: Some(id), .. } if id == "a"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_non_youtube_play_failure_leaves_song_paused() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    engine.fail_play.lock().insert(url("a"));

    let result = player.play(Some(song("a"))).await;

    assert!(matches!(result, Err(PlaybackError::PlaybackFailed(_))));
    let session = player.snapshot();
    assert!(!session.is_playing);
    assert!(!session.video_mode);
    assert_eq!(session.current_song.unwrap().id, "a");
}

#[tokio::test(start_paused = true)]
async fn test_local_song_without_url_is_not_playable() {
    let (player, engine, _events) = harness(ScriptedExtractor::default());
    let local = Song::new("local-1", "Intro", "Unknown Artist", SongSource::Local, "");

    let result = player.play(Some(local)).await;

    assert!(matches!(result, Err(PlaybackError::NoPlayableSource(_))));
    assert!(engine.opened_urls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_youtube_plays_extracted_stream() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default());

    assert!(player
        .play(Some(youtube_song("abc", "Song", "Band", 240.0)))
        .await
        .unwrap());

    assert_eq!(engine.opened_urls(), vec![stream_url("abc")]);
    let session = player.snapshot();
    assert!(session.is_playing);
    assert!(!session.video_mode);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        PlaybackEvent::NowPlaying { song_id, artist, .. } if song_id == "yt-abc" && artist == "Band"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_youtube_extraction_failure_falls_back_to_video() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default().unavailable("abc"));

    assert!(player
        .play(Some(youtube_song("abc", "Song", "Band", 240.0)))
        .await
        .unwrap());

    assert!(engine.opened_urls().is_empty());
    let session = player.snapshot();
    assert!(session.video_mode);
    assert!(session.is_playing);
    assert!(drain(&mut events).contains(&PlaybackEvent::VideoFallback {
        song_id: "yt-abc".to_string(),
        video_id: "abc".to_string(),
    }));

    assert!(player.pause());
    assert!(!player.snapshot().is_playing);
    assert!(player.play(None).await.unwrap());
    assert!(player.snapshot().is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_youtube_play_failure_falls_back_to_video() {
    let (player, engine, mut events) = harness(ScriptedExtractor::default());
    engine.fail_play.lock().insert(stream_url("abc"));

    let result = player
        .play(Some(youtube_song("abc", "Song", "Band", 240.0)))
        .await;

    assert!(result.unwrap());
    let session = player.snapshot();
    assert!(session.video_mode);
    assert!(session.is_playing);
    assert_eq!(engine.live_handles(), 0);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Error { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stale_extraction_result_is_discarded() {
    let extractor = ScriptedExtractor::default().delay("slow", Duration::from_secs(5));
    let (player, engine, _events) = harness(extractor);

    let first = tokio::spawn({
        let player = player.clone();
        async move { player.load_song(youtube_song("slow", "A", "X", 0.0)).await }
    });
    tokio::task::yield_now().await;

    assert!(player
        .load_song(youtube_song("fast", "B", "X", 0.0))
        .await
        .unwrap());
    assert!(!first.await.unwrap().unwrap());

    let session = player.snapshot();
    assert_eq!(session.current_song.unwrap().id, "yt-fast");
    assert!(session.is_playing);
    assert_eq!(engine.opened_urls(), vec![stream_url("fast")]);
    assert_eq!(engine.live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_inflight_load() {
    let extractor = ScriptedExtractor::default().delay("slow", Duration::from_secs(5));
    let (player, engine, _events) = harness(extractor);

    let pending = tokio::spawn({
        let player = player.clone();
        async move { player.load_song(youtube_song("slow", "A", "X", 0.0)).await }
    });
    tokio::task::yield_now().await;
    player.shutdown();

    assert!(!pending.await.unwrap().unwrap());
    assert!(engine.opened_urls().is_empty());
    assert!(!player.snapshot().is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_shuffle_and_video_mode_toggles() {
    let (player, _engine, mut events) = harness(ScriptedExtractor::default());

    assert!(player.toggle_shuffle());
    assert!(player.toggle_video_mode());
    assert!(!player.toggle_video_mode());

    let events = drain(&mut events);
    assert!(events.contains(&PlaybackEvent::ModeChanged {
        shuffle: true,
        repeat: "none".to_string(),
    }));
    assert!(events.contains(&PlaybackEvent::VideoModeChanged { enabled: true }));
}

#[tokio::test(start_paused = true)]
async fn test_cycle_repeat_steps_through_modes() {
    let (player, _engine, mut events) = harness(ScriptedExtractor::default());

    assert_eq!(player.cycle_repeat(), RepeatMode::All);
    assert_eq!(player.cycle_repeat(), RepeatMode::One);
    assert_eq!(player.snapshot().repeat, RepeatMode::One);
    assert_eq!(player.cycle_repeat(), RepeatMode::None);

    let events = drain(&mut events);
    assert!(events.contains(&PlaybackEvent::ModeChanged {
        shuffle: false,
        repeat: "one".to_string(),
    }));
}
