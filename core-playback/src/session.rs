//! Playback session state and queue policy
//!
//! [`PlaybackSession`] is a plain value. The transition functions here never
//! touch an audio handle: they either mutate the session in one step or
//! return a decision ([`EndOfTrack`], [`PreviousAction`]) that the transport
//! engine carries out.

use std::fmt;
use std::time::Duration;

use core_library::Song;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    /// Order used by a single repeat button: none, all, one.
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the current track ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfTrack {
    /// Seek to 0 and play again, queue position unchanged
    Restart,
    Advance(usize),
    Stop,
}

/// Outcome of a "previous" press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousAction {
    Restart,
    Goto(usize),
    Nothing,
}

/// The single mutable playback state of one player.
///
/// `current_song` and `queue_index` may disagree: a song played outside the
/// queue becomes current while the index keeps pointing at the old slot.
/// Navigation always works from `queue_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub current_song: Option<Song>,
    pub is_playing: bool,
    /// 0.0..=1.0, kept while muted
    pub volume: f32,
    pub is_muted: bool,
    /// Seconds
    pub current_time: f64,
    /// Seconds, 0 while unknown
    pub duration: f64,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub queue: Vec<Song>,
    /// `None` means no queue position
    pub queue_index: Option<usize>,
    /// YouTube only: show the visible video embed
    pub video_mode: bool,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl PlaybackSession {
    pub fn new(volume: f32) -> Self {
        Self {
            current_song: None,
            is_playing: false,
            volume: volume.clamp(0.0, 1.0),
            is_muted: false,
            current_time: 0.0,
            duration: 0.0,
            shuffle: false,
            repeat: RepeatMode::None,
            queue: Vec::new(),
            queue_index: None,
            video_mode: false,
        }
    }

    /// Volume to apply to a handle, honouring mute.
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Song at the current queue position.
    pub fn queued_song(&self) -> Option<&Song> {
        self.queue_index.and_then(|i| self.queue.get(i))
    }

    /// Index `next()` would move to, or `None` when it is a no-op.
    ///
    /// Shuffle picks uniformly at random, retrying until the pick differs from
    /// the current index. A single-song queue yields that same index.
    pub fn next_index<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let len = self.queue.len();
        if len == 0 {
            return None;
        }

        let candidate = if self.shuffle {
            random_other_index(len, self.queue_index, rng)
        } else {
            self.queue_index.map_or(0, |i| i + 1)
        };
        self.wrap(candidate)
    }

    /// Decision for a natural end of track.
    ///
    /// Unlike [`next_index`](Self::next_index), shuffle only applies when the
    /// queue holds more than one song.
    pub fn end_of_track<R: Rng + ?Sized>(&self, rng: &mut R) -> EndOfTrack {
        if self.repeat == RepeatMode::One {
            return EndOfTrack::Restart;
        }

        let len = self.queue.len();
        if len == 0 {
            return EndOfTrack::Stop;
        }

        let candidate = if self.shuffle && len > 1 {
            random_other_index(len, self.queue_index, rng)
        } else {
            self.queue_index.map_or(0, |i| i + 1)
        };
        self.wrap(candidate)
            .map_or(EndOfTrack::Stop, EndOfTrack::Advance)
    }

    /// Restart when more than `restart_threshold` has elapsed, else step back
    /// one slot. Stepping back from the first slot wraps to the end under
    /// repeat-all and stays at 0 otherwise.
    pub fn previous_action(&self, restart_threshold: Duration) -> PreviousAction {
        if self.current_time > restart_threshold.as_secs_f64() {
            return PreviousAction::Restart;
        }

        let len = self.queue.len();
        if len == 0 {
            return PreviousAction::Nothing;
        }

        let index = match self.queue_index {
            Some(i) if i > 0 => i - 1,
            _ if self.repeat == RepeatMode::All => len - 1,
            _ => 0,
        };
        PreviousAction::Goto(index.min(len - 1))
    }

    /// Resets transport fields for a newly loading song.
    pub fn begin_load(&mut self, song: Song) {
        self.current_song = Some(song);
        self.is_playing = false;
        self.current_time = 0.0;
        self.duration = 0.0;
    }

    pub fn add_to_queue<I>(&mut self, songs: I)
    where
        I: IntoIterator<Item = Song>,
    {
        self.queue.extend(songs);
    }

    /// Removes one slot. Out-of-range indices are a no-op returning `false`.
    ///
    /// Removing a slot before the current one shifts the index down so it
    /// keeps pointing at the same song. Removing the current slot leaves the
    /// playing song untouched and keeps the index where it was, so it now
    /// names the song that followed. When that slot was the last one the
    /// index is clamped to the new last slot instead of running past the end,
    /// and `next()` then treats that slot as already played.
    pub fn remove_from_queue(&mut self, index: usize) -> bool {
        if index >= self.queue.len() {
            return false;
        }

        self.queue.remove(index);
        self.queue_index = match self.queue_index {
            Some(current) if index < current => Some(current - 1),
            Some(_) if self.queue.is_empty() => None,
            Some(current) => Some(current.min(self.queue.len() - 1)),
            None => None,
        };
        true
    }

    /// Empties the queue and forgets the current song.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.queue_index = None;
        self.current_song = None;
        self.is_playing = false;
        self.current_time = 0.0;
        self.duration = 0.0;
    }

    /// Replaces the queue and points at `start_index`. Returns the song to
    /// load, or `None` (leaving the session untouched) when `start_index` is
    /// out of range.
    pub fn replace_queue(&mut self, songs: Vec<Song>, start_index: usize) -> Option<Song> {
        let song = songs.get(start_index).cloned()?;
        self.queue = songs;
        self.queue_index = Some(start_index);
        Some(song)
    }

    fn wrap(&self, candidate: usize) -> Option<usize> {
        if candidate < self.queue.len() {
            Some(candidate)
        } else if self.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        }
    }
}

fn random_other_index<R: Rng + ?Sized>(len: usize, current: Option<usize>, rng: &mut R) -> usize {
    loop {
        let pick = rng.gen_range(0..len);
        if len == 1 || Some(pick) != current {
            return pick;
        }
    }
}
