//! MQTT Side: Broker Client and Connection Lifecycle
//!
//! The broker is consumed through the [`BrokerClient`] trait: request
//! methods (connect, disconnect, subscribe, publish) plus [`poll`], which
//! yields the client's network events one at a time. The
//! [`ConnectionManager`] owns the polling loop and the connection state
//! machine built on those events.
//!
//! [`RumqttClient`] is the production implementation; tests drive the
//! manager with a scripted in-memory client.
//!
//! [`poll`]: BrokerClient::poll

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

mod client;
mod manager;

#[cfg(test)]
mod tests;

pub use client::RumqttClient;
pub use manager::ConnectionManager;

/// Broker connection failure. Fatal: the manager converts it into the
/// process shutdown signal.
#[derive(Debug)]
pub enum ConnectionError {
    /// The broker rejected the connection
    Refused(String),
    /// Transport-level failure with no recovery path
    Transport(String),
    /// The client's request channel is gone; no further operations possible
    ChannelClosed,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Refused(reason) => write!(f, "connection refused: {}", reason),
            ConnectionError::Transport(reason) => write!(f, "transport error: {}", reason),
            ConnectionError::ChannelClosed => write!(f, "client request channel closed"),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Connection state, driven by client events. Never polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session with the broker
    Disconnected,
    /// Connect initiated, session not yet acknowledged
    Connecting,
    /// Session established, subscriptions installed
    Connected,
    /// Unrecoverable failure; the process is shutting down
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// One event from the client's network loop.
#[derive(Debug)]
pub enum ClientEvent {
    /// The broker acknowledged the session
    Connected,
    /// The session dropped; the client owns any reconnect policy
    Disconnected {
        reason: String,
    },
    /// An inbound publish arrived on a subscribed topic
    Message {
        topic: String,
        payload: Bytes,
    },
}

/// The consumed broker client surface.
///
/// Connection parameters are supplied when the concrete client is
/// constructed; `connect` starts the session with those parameters.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Start the session. Completion of the handshake is reported as a
    /// [`ClientEvent::Connected`] from `poll`.
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Close the session. Best effort.
    async fn disconnect(&self) -> Result<(), ConnectionError>;

    /// Subscribe to a topic at QoS 0. Idempotent.
    async fn subscribe(&self, topic: &str) -> Result<(), ConnectionError>;

    /// Publish a payload to a topic at QoS 0.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ConnectionError>;

    /// Drive the network loop until the next event. An `Err` is
    /// unrecoverable; transient drops surface as
    /// [`ClientEvent::Disconnected`].
    async fn poll(&self) -> Result<ClientEvent, ConnectionError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted broker client for manager and bridge tests.

    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::{BrokerClient, ClientEvent, ConnectionError};

    type ScriptItem = Result<ClientEvent, ConnectionError>;

    /// Replays a scripted event sequence from `poll` and records every
    /// request call. Once the script runs out, `poll` parks forever so a
    /// test can end the run via the shutdown signal.
    pub(crate) struct ScriptedClient {
        events: tokio::sync::Mutex<mpsc::UnboundedReceiver<ScriptItem>>,
        pub(crate) subscribes: Mutex<Vec<String>>,
        pub(crate) publishes: Mutex<Vec<(String, Bytes)>>,
        pub(crate) disconnects: Mutex<usize>,
    }

    impl ScriptedClient {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<ScriptItem>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let client = Arc::new(Self {
                events: tokio::sync::Mutex::new(rx),
                subscribes: Mutex::new(Vec::new()),
                publishes: Mutex::new(Vec::new()),
                disconnects: Mutex::new(0),
            });
            (client, tx)
        }
    }

    #[async_trait]
    impl BrokerClient for ScriptedClient {
        async fn connect(&self) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ConnectionError> {
            *self.disconnects.lock() += 1;
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<(), ConnectionError> {
            self.subscribes.lock().push(topic.to_string());
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ConnectionError> {
            self.publishes.lock().push((topic.to_string(), payload));
            Ok(())
        }

        async fn poll(&self) -> Result<ClientEvent, ConnectionError> {
            let mut events = self.events.lock().await;
            match events.recv().await {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }
    }
}
