//! In-process realtime transport
//!
//! Implements [`RealtimeClient`] with one `tokio::sync::broadcast` channel per
//! topic and a presence map per topic. Every client created from the same hub
//! (via `Clone`) shares topics, so several devices can be simulated inside one
//! process, or one desktop instance can host sessions for local windows.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    realtime::{
        BroadcastEnvelope, ChannelMessage, PresenceEntry, RealtimeChannel, RealtimeClient,
        Subscription,
    },
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

const TOPIC_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone)]
enum Frame {
    Broadcast {
        origin: u64,
        envelope: BroadcastEnvelope,
    },
    Presence(Vec<PresenceEntry>),
    Close {
        subscriber: u64,
    },
}

struct Topic {
    sender: broadcast::Sender<Frame>,
    presence: BTreeMap<String, serde_json::Value>,
    members: usize,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(TOPIC_BUFFER_SIZE);
        Self {
            sender,
            presence: BTreeMap::new(),
            members: 0,
        }
    }

    fn presence_snapshot(&self) -> Vec<PresenceEntry> {
        self.presence
            .iter()
            .map(|(key, state)| PresenceEntry {
                key: key.clone(),
                state: state.clone(),
            })
            .collect()
    }
}

#[derive(Default)]
struct HubState {
    topics: Mutex<HashMap<String, Topic>>,
    next_subscriber: AtomicU64,
}

/// Shared in-process pub/sub hub.
#[derive(Clone, Default)]
pub struct InProcessRealtimeHub {
    state: Arc<HubState>,
}

impl InProcessRealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `topic`.
    pub fn member_count(&self, topic: &str) -> usize {
        self.state
            .topics
            .lock()
            .get(topic)
            .map(|t| t.members)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for InProcessRealtimeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessRealtimeHub")
            .field("topics", &self.state.topics.lock().len())
            .finish()
    }
}

#[async_trait]
impl RealtimeClient for InProcessRealtimeHub {
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription> {
        let subscriber = self.state.next_subscriber.fetch_add(1, Ordering::Relaxed);

        let receiver = {
            let mut topics = self.state.topics.lock();
            let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
            entry.members += 1;
            entry.sender.subscribe()
        };

        debug!(topic, presence_key, subscriber, "Subscribed to topic");

        let messages = futures::stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(Frame::Broadcast { origin, .. }) if origin == subscriber => continue,
                    Ok(Frame::Broadcast { envelope, .. }) => {
                        return Some((ChannelMessage::Broadcast(envelope), receiver))
                    }
                    Ok(Frame::Presence(entries)) => {
                        return Some((ChannelMessage::PresenceSync(entries), receiver))
                    }
                    Ok(Frame::Close { subscriber: closed }) if closed == subscriber => {
                        return None
                    }
                    Ok(Frame::Close { .. }) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(subscriber, skipped, "Realtime subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        let channel = HubChannel {
            hub: Arc::clone(&self.state),
            topic: topic.to_string(),
            presence_key: presence_key.to_string(),
            subscriber,
            closed: AtomicBool::new(false),
        };

        Ok(Subscription {
            channel: Box::new(channel),
            messages,
        })
    }
}

struct HubChannel {
    hub: Arc<HubState>,
    topic: String,
    presence_key: String,
    subscriber: u64,
    closed: AtomicBool,
}

impl HubChannel {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::ChannelClosed(self.topic.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeChannel for HubChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, envelope: BroadcastEnvelope) -> Result<()> {
        self.ensure_open()?;

        let topics = self.hub.topics.lock();
        let topic = topics
            .get(&self.topic)
            .ok_or_else(|| BridgeError::ChannelClosed(self.topic.clone()))?;

        // No receivers simply means nobody is listening
        let _ = topic.sender.send(Frame::Broadcast {
            origin: self.subscriber,
            envelope,
        });
        Ok(())
    }

    async fn track(&self, state: serde_json::Value) -> Result<()> {
        self.ensure_open()?;

        let mut topics = self.hub.topics.lock();
        let topic = topics
            .get_mut(&self.topic)
            .ok_or_else(|| BridgeError::ChannelClosed(self.topic.clone()))?;

        topic.presence.insert(self.presence_key.clone(), state);
        let _ = topic.sender.send(Frame::Presence(topic.presence_snapshot()));
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut topics = self.hub.topics.lock();
        let Some(topic) = topics.get_mut(&self.topic) else {
            return Ok(());
        };

        topic.members = topic.members.saturating_sub(1);
        let _ = topic.sender.send(Frame::Close {
            subscriber: self.subscriber,
        });

        if topic.presence.remove(&self.presence_key).is_some() {
            let _ = topic.sender.send(Frame::Presence(topic.presence_snapshot()));
        }

        if topic.members == 0 {
            topics.remove(&self.topic);
        }

        debug!(topic = %self.topic, subscriber = self.subscriber, "Unsubscribed from topic");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next_message(sub: &mut Subscription) -> Option<ChannelMessage> {
        timeout(Duration::from_secs(1), sub.messages.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_others_but_not_sender() {
        let hub = InProcessRealtimeHub::new();
        let mut host = hub.subscribe("sync-1", "host").await.unwrap();
        let mut guest = hub.subscribe("sync-1", "guest").await.unwrap();

        host.channel
            .send(BroadcastEnvelope::new("pause", json!({})))
            .await
            .unwrap();

        match next_message(&mut guest).await {
            Some(ChannelMessage::Broadcast(envelope)) => assert_eq!(envelope.event, "pause"),
            other => panic!("unexpected message: {:?}", other),
        }

        host.channel.unsubscribe().await.unwrap();
        assert!(next_message(&mut host).await.is_none());
    }

    #[tokio::test]
    async fn test_presence_sync_and_leave() {
        let hub = InProcessRealtimeHub::new();
        let mut host = hub.subscribe("sync-2", "host").await.unwrap();
        let guest = hub.subscribe("sync-2", "guest").await.unwrap();

        host.channel
            .track(json!({ "name": "Ana", "isHost": true }))
            .await
            .unwrap();
        guest
            .channel
            .track(json!({ "name": "Bo", "isHost": false }))
            .await
            .unwrap();

        let first = next_message(&mut host).await;
        assert!(matches!(first, Some(ChannelMessage::PresenceSync(ref e)) if e.len() == 1));
        let second = next_message(&mut host).await;
        assert!(matches!(second, Some(ChannelMessage::PresenceSync(ref e)) if e.len() == 2));

        guest.channel.unsubscribe().await.unwrap();
        match next_message(&mut host).await {
            Some(ChannelMessage::PresenceSync(entries)) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].key, "host");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(hub.member_count("sync-2"), 1);
    }

    #[tokio::test]
    async fn test_send_after_unsubscribe_fails() {
        let hub = InProcessRealtimeHub::new();
        let sub = hub.subscribe("sync-3", "solo").await.unwrap();

        sub.channel.unsubscribe().await.unwrap();

        let result = sub
            .channel
            .send(BroadcastEnvelope::new("seek", json!({ "time": 1.0 })))
            .await;
        assert!(matches!(result, Err(BridgeError::ChannelClosed(_))));
        assert_eq!(hub.member_count("sync-3"), 0);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = InProcessRealtimeHub::new();
        let a = hub.subscribe("sync-a", "a").await.unwrap();
        let mut b = hub.subscribe("sync-b", "b").await.unwrap();

        a.channel
            .send(BroadcastEnvelope::new("pause", json!({})))
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(50), b.messages.next())
            .await
            .is_err());
    }
}
