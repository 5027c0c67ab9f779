//! Sync wire messages
//!
//! Every broadcast is an `{event, payload}` envelope. Event names are
//! snake_case and payload keys camelCase:
//!
//! ```text
//! {"event":"play","payload":{"song":{...},"time":12.0}}
//! {"event":"transfer_host","payload":{"newHostId":"user-1-abc"}}
//! ```

use bridge_traits::realtime::BroadcastEnvelope;
use core_library::Song;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SyncMessage {
    Play {
        song: Song,
        #[serde(default)]
        time: f64,
    },
    Pause {},
    Seek {
        time: f64,
    },
    Lock {
        locked: bool,
    },
    #[serde(rename_all = "camelCase")]
    Kick {
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TransferHost {
        new_host_id: String,
    },
    QueueUpdate {
        queue: Vec<Song>,
    },
}

impl SyncMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            SyncMessage::Play { .. } => "play",
            SyncMessage::Pause {} => "pause",
            SyncMessage::Seek { .. } => "seek",
            SyncMessage::Lock { .. } => "lock",
            SyncMessage::Kick { .. } => "kick",
            SyncMessage::TransferHost { .. } => "transfer_host",
            SyncMessage::QueueUpdate { .. } => "queue_update",
        }
    }

    /// True for the messages that drive a guest's transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncMessage::Play { .. } | SyncMessage::Pause {} | SyncMessage::Seek { .. }
        )
    }

    pub fn to_envelope(&self) -> Result<BroadcastEnvelope> {
        let mut value = serde_json::to_value(self)?;
        let payload = value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(BroadcastEnvelope::new(self.event_name(), payload))
    }

    /// # Errors
    ///
    /// Unknown event names and payloads of the wrong shape.
    pub fn from_envelope(envelope: &BroadcastEnvelope) -> Result<Self> {
        // Senders may omit the payload of `pause`.
        let payload = match &envelope.payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let tagged = serde_json::json!({
            "event": envelope.event,
            "payload": payload,
        });
        Ok(serde_json::from_value(tagged)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::SongSource;
    use serde_json::json;

    fn song() -> Song {
        Song::new("saavn-1", "Kesariya", "Arijit Singh", SongSource::Online, "https://x/1.mp4")
    }

    #[test]
    fn test_play_envelope_shape() {
        let envelope = SyncMessage::Play {
            song: song(),
            time: 12.0,
        }
        .to_envelope()
        .unwrap();

        assert_eq!(envelope.event, "play");
        assert_eq!(envelope.payload["time"], 12.0);
        assert_eq!(envelope.payload["song"]["id"], "saavn-1");
    }

    #[test]
    fn test_camel_case_payload_keys() {
        let envelope = SyncMessage::TransferHost {
            new_host_id: "user-2".to_string(),
        }
        .to_envelope()
        .unwrap();

        assert_eq!(envelope.event, "transfer_host");
        assert_eq!(envelope.payload, json!({ "newHostId": "user-2" }));

        let kick = SyncMessage::Kick {
            user_id: "user-3".to_string(),
        }
        .to_envelope()
        .unwrap();
        assert_eq!(kick.payload, json!({ "userId": "user-3" }));
    }

    #[test]
    fn test_pause_with_missing_payload() {
        let envelope = BroadcastEnvelope::new("pause", Value::Null);
        assert_eq!(SyncMessage::from_envelope(&envelope).unwrap(), SyncMessage::Pause {});

        let empty = SyncMessage::Pause {}.to_envelope().unwrap();
        assert_eq!(empty.payload, json!({}));
    }

    #[test]
    fn test_play_time_defaults_to_zero() {
        let envelope = BroadcastEnvelope::new(
            "play",
            json!({ "song": serde_json::to_value(song()).unwrap() }),
        );

        match SyncMessage::from_envelope(&envelope).unwrap() {
            SyncMessage::Play { time, .. } => assert_eq!(time, 0.0),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_malformed_messages_are_rejected() {
        let unknown = BroadcastEnvelope::new("dance", json!({}));
        assert!(SyncMessage::from_envelope(&unknown).is_err());

        let malformed = BroadcastEnvelope::new("seek", json!({ "time": "soon" }));
        assert!(SyncMessage::from_envelope(&malformed).is_err());
    }
}
