//! Sync session replica
//!
//! Every device keeps its own [`SyncSession`]. On the host it reflects the
//! host's own intents; on a guest it is a projection of what the host has
//! broadcast so far. Nothing here is persisted.

use bridge_traits::realtime::PresenceEntry;
use core_library::Song;
use serde::{Deserialize, Serialize};

use crate::message::SyncMessage;

/// Default name for a presence entry without one.
const UNKNOWN_USER_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUser {
    pub id: String,
    pub name: String,
    pub is_host: bool,
}

/// State published through presence for the local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(default)]
    pub is_host: bool,
}

fn unknown_name() -> String {
    UNKNOWN_USER_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// `session-{millis}`
    pub id: String,
    pub name: String,
    /// Empty on a guest until presence reveals the host
    pub host_id: String,
    /// Unique by id, host first then by name
    pub users: Vec<SyncUser>,
    /// Advisory only; nothing enforces it
    pub is_locked: bool,
    pub shared_queue: Vec<Song>,
    pub current_song: Option<Song>,
    pub is_playing: bool,
    pub current_time: f64,
}

impl SyncSession {
    /// Session as seen by the device that created it.
    pub fn hosted(id: impl Into<String>, name: impl Into<String>, host: SyncUser) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            host_id: host.id.clone(),
            users: vec![SyncUser {
                is_host: true,
                ..host
            }],
            is_locked: false,
            shared_queue: Vec::new(),
            current_song: None,
            is_playing: false,
            current_time: 0.0,
        }
    }

    /// Session as seen by a device that joined by id. The host is unknown
    /// until the first presence sync.
    pub fn joined(id: impl Into<String>, guest: SyncUser) -> Self {
        Self {
            id: id.into(),
            name: "Sync Session".to_string(),
            host_id: String::new(),
            users: vec![SyncUser {
                is_host: false,
                ..guest
            }],
            is_locked: false,
            shared_queue: Vec::new(),
            current_song: None,
            is_playing: false,
            current_time: 0.0,
        }
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        !self.host_id.is_empty() && self.host_id == user_id
    }

    pub fn user(&self, user_id: &str) -> Option<&SyncUser> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// Rebuilds `users` from a full presence snapshot.
    ///
    /// Presence flags are what each device claims about itself; when the
    /// replica already knows a host, its own `host_id` wins. A replica with no
    /// host yet adopts the first entry flagged as host.
    pub fn apply_presence(&mut self, entries: &[PresenceEntry]) {
        if self.host_id.is_empty() {
            if let Some(host) = entries.iter().find(|e| presence_state(e).is_host) {
                self.host_id = host.key.clone();
            }
        }

        let mut users: Vec<SyncUser> = Vec::with_capacity(entries.len());
        for entry in entries {
            if users.iter().any(|u| u.id == entry.key) {
                continue;
            }
            users.push(SyncUser {
                id: entry.key.clone(),
                name: presence_state(entry).name,
                is_host: entry.key == self.host_id,
            });
        }
        users.sort_by(|a, b| b.is_host.cmp(&a.is_host).then_with(|| a.name.cmp(&b.name)));
        self.users = users;
    }

    pub fn set_host(&mut self, host_id: &str) {
        self.host_id = host_id.to_string();
        for user in &mut self.users {
            user.is_host = user.id == host_id;
        }
        self.users
            .sort_by(|a, b| b.is_host.cmp(&a.is_host).then_with(|| a.name.cmp(&b.name)));
    }

    /// Applies a broadcast to the replica. `kick` changes nothing here: the
    /// kicked device tears its own session down and presence catches up.
    pub fn apply(&mut self, message: &SyncMessage) {
        match message {
            SyncMessage::Play { song, time } => {
                self.current_song = Some(song.clone());
                self.is_playing = true;
                self.current_time = *time;
            }
            SyncMessage::Pause {} => self.is_playing = false,
            SyncMessage::Seek { time } => self.current_time = *time,
            SyncMessage::Lock { locked } => self.is_locked = *locked,
            SyncMessage::Kick { .. } => {}
            SyncMessage::TransferHost { new_host_id } => self.set_host(new_host_id),
            SyncMessage::QueueUpdate { queue } => self.shared_queue = queue.clone(),
        }
    }
}

fn presence_state(entry: &PresenceEntry) -> PresenceState {
    serde_json::from_value(entry.state.clone()).unwrap_or_else(|_| PresenceState {
        name: unknown_name(),
        is_host: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::SongSource;
    use serde_json::json;

    fn user(id: &str, name: &str) -> SyncUser {
        SyncUser {
            id: id.to_string(),
            name: name.to_string(),
            is_host: false,
        }
    }

    fn entry(key: &str, state: serde_json::Value) -> PresenceEntry {
        PresenceEntry {
            key: key.to_string(),
            state,
        }
    }

    #[test]
    fn test_guest_learns_host_from_presence() {
        let mut session = SyncSession::joined("session-1", user("guest", "Bo"));
        assert!(!session.is_host("guest"));

        session.apply_presence(&[
            entry("guest", json!({ "name": "Bo", "isHost": false })),
            entry("host", json!({ "name": "Ana", "isHost": true })),
        ]);

        assert_eq!(session.host_id, "host");
        assert_eq!(session.users[0].id, "host");
        assert!(session.users[0].is_host);
        assert_eq!(session.users.len(), 2);
    }

    #[test]
    fn test_known_host_beats_presence_claims() {
        let mut session = SyncSession::hosted("session-1", "Party", user("host", "Ana"));

        session.apply_presence(&[
            entry("host", json!({ "name": "Ana", "isHost": true })),
            entry("mallory", json!({ "name": "Mal", "isHost": true })),
        ]);

        assert_eq!(session.host_id, "host");
        assert!(!session.user("mallory").unwrap().is_host);
    }

    #[test]
    fn test_presence_is_unique_and_sorted() {
        let mut session = SyncSession::hosted("s", "Party", user("h", "Zed"));

        session.apply_presence(&[
            entry("c", json!({ "name": "Cy" })),
            entry("h", json!({ "name": "Zed", "isHost": true })),
            entry("a", json!({ "name": "Al" })),
            entry("a", json!({ "name": "Al again" })),
            entry("x", json!("garbage")),
        ]);

        let names: Vec<&str> = session.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Al", "Cy", "Unknown"]);
    }

    #[test]
    fn test_transport_messages_update_replica() {
        let mut session = SyncSession::joined("s", user("g", "Bo"));
        let song = Song::new("saavn-1", "A", "B", SongSource::Online, "u");

        session.apply(&SyncMessage::Play {
            song: song.clone(),
            time: 12.0,
        });
        assert_eq!(session.current_song, Some(song));
        assert!(session.is_playing);
        assert_eq!(session.current_time, 12.0);

        session.apply(&SyncMessage::Seek { time: 30.0 });
        session.apply(&SyncMessage::Pause {});
        assert_eq!(session.current_time, 30.0);
        assert!(!session.is_playing);
    }

    #[test]
    fn test_transfer_host_updates_flags() {
        let mut session = SyncSession::hosted("s", "Party", user("h", "Ana"));
        session.users.push(user("g", "Bo"));

        session.apply(&SyncMessage::TransferHost {
            new_host_id: "g".to_string(),
        });

        assert!(session.is_host("g"));
        assert!(!session.is_host("h"));
        assert_eq!(session.users[0].id, "g");
        assert!(!session.user("h").unwrap().is_host);
    }
}
