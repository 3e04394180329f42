//! Middleware Bus Interface
//!
//! The bridge consumes the robotics middleware bus through the
//! [`MessageBus`] trait: publish a structured message to a topic, or
//! subscribe to a topic and receive its messages in order. Concrete
//! middleware adapters (DDS, Zenoh, a rosbridge socket) implement this
//! trait out of tree.
//!
//! [`InProcessBus`] is the built-in implementation: a topic-keyed set of
//! tokio broadcast channels. It backs the binary's host integration point
//! and the test suite.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use tokio::sync::broadcast;
use tracing::warn;

/// Structured message exchanged on the middleware bus.
///
/// Concrete message content types are the middleware's concern; the bridge
/// only moves structured values between the two domains.
pub type BusMessage = serde_json::Value;

/// Bus-side failure surfaced on publish.
#[derive(Debug)]
pub enum BusError {
    /// The bus or topic channel is no longer accepting messages
    Closed(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Closed(topic) => write!(f, "bus topic closed: {}", topic),
        }
    }
}

impl std::error::Error for BusError {}

/// The consumed middleware bus surface.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a structured message to a bus topic.
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError>;

    /// Subscribe to a bus topic. Messages arrive in publish order.
    fn subscribe(&self, topic: &str) -> BusSubscription;
}

/// A live subscription to one bus topic.
pub struct BusSubscription {
    topic: String,
    rx: broadcast::Receiver<BusMessage>,
}

impl BusSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next message. Returns `None` once the topic channel is
    /// closed. A slow consumer that lags behind skips the overwritten
    /// messages and keeps receiving.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Bus subscription '{}' lagged, {} messages skipped",
                        self.topic, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Default channel capacity per topic.
const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// In-process topic bus backed by tokio broadcast channels.
pub struct InProcessBus {
    channels: DashMap<String, broadcast::Sender<BusMessage>>,
    capacity: usize,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a bus with a custom per-topic channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError> {
        if let Some(tx) = self.channels.get(topic) {
            // A send error only means every subscriber is gone; the message
            // is dropped, matching at-most-once forwarding.
            let _ = tx.send(message);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> BusSubscription {
        BusSubscription {
            topic: topic.to_string(),
            rx: self.sender(topic).subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe("/sensors/temp");

        bus.publish("/sensors/temp", json!({"c": 21.5})).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, json!({"c": 21.5}));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = InProcessBus::new();
        bus.publish("/nobody/home", json!(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InProcessBus::new();
        let mut sub_a = bus.subscribe("/a");
        let mut sub_b = bus.subscribe("/b");

        bus.publish("/a", json!("for a")).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), sub_a.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, json!("for a"));

        let nothing = tokio::time::timeout(Duration::from_millis(50), sub_b.recv()).await;
        assert!(nothing.is_err(), "topic /b must not see /a traffic");
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe("/seq");

        for i in 0..5 {
            bus.publish("/seq", json!(i)).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(sub.recv().await.unwrap(), json!(i));
        }
    }
}
