//! Realtime Channel Abstraction
//!
//! Named pub/sub topics carrying `{event, payload}` broadcast envelopes, plus a
//! separate presence primitive keyed by a per-device user id.
//!
//! Delivery is fire-and-forget: no acknowledgement and no ordering guarantee
//! beyond the transport's natural order. A sender does not receive its own
//! broadcasts.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Broadcast message envelope as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl BroadcastEnvelope {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// One tracked presence entry: the key it was tracked under plus its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub key: String,
    pub state: serde_json::Value,
}

/// Messages delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// A broadcast sent by another member of the topic.
    Broadcast(BroadcastEnvelope),
    /// Full presence state after any join, leave, or track update.
    PresenceSync(Vec<PresenceEntry>),
}

/// A live subscription handle.
///
/// Dropping the handle without calling [`RealtimeChannel::unsubscribe`] leaves
/// presence tracked until the transport notices the disconnect.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Topic this channel is subscribed to.
    fn topic(&self) -> &str;

    /// Broadcast an envelope to every other subscriber of the topic.
    async fn send(&self, envelope: BroadcastEnvelope) -> Result<()>;

    /// Publish (or replace) this subscriber's presence state.
    async fn track(&self, state: serde_json::Value) -> Result<()>;

    /// Leave the topic: presence is removed and the message stream ends.
    async fn unsubscribe(&self) -> Result<()>;
}

/// Result of a successful subscription.
pub struct Subscription {
    pub channel: Box<dyn RealtimeChannel>,
    pub messages: BoxStream<'static, ChannelMessage>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.channel.topic())
            .finish()
    }
}

/// Realtime transport trait
///
/// Platform implementations:
/// - **Desktop/tests**: `bridge-desktop::InProcessRealtimeHub`
/// - **Hosted**: a websocket client for the deployment's realtime service
///
/// # Errors
///
/// `subscribe` fails when the transport cannot join the topic. Callers are
/// responsible for any reconnection.
#[async_trait]
pub trait RealtimeClient: Send + Sync {
    /// Join `topic`, tracking presence under `presence_key`.
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription>;
}
