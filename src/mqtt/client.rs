//! rumqttc-backed broker client
//!
//! Wraps `rumqttc`'s `AsyncClient` + `EventLoop` pair behind the
//! [`BrokerClient`] trait. The event loop establishes and re-establishes
//! the TCP session as it is polled; request methods enqueue operations on
//! the client's request channel.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ConnectionConfig;

use super::{BrokerClient, ClientEvent, ConnectionError};

/// Pause before reporting a transient drop, so a dead broker does not spin
/// the polling loop.
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(1);

/// Capacity of the client's request channel.
const REQUEST_CAPACITY: usize = 64;

pub struct RumqttClient {
    client: AsyncClient,
    // Only the connection manager polls; the lock is never contended
    event_loop: Mutex<EventLoop>,
}

impl RumqttClient {
    /// Build a client from the validated connection parameters. The
    /// session is established once the manager starts polling.
    pub fn new(config: &ConnectionConfig) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.host.clone(),
            config.port,
        );
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(config.clean_session);
        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                options.set_credentials(username.clone(), password.clone());
            }
            (Some(username), None) => {
                options.set_credentials(username.clone(), String::new());
            }
            _ => {}
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        Self {
            client,
            event_loop: Mutex::new(event_loop),
        }
    }
}

#[async_trait]
impl BrokerClient for RumqttClient {
    async fn connect(&self) -> Result<(), ConnectionError> {
        // The event loop performs the handshake from poll(); nothing to
        // send ahead of it.
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.client
            .disconnect()
            .await
            .map_err(|_| ConnectionError::ChannelClosed)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ConnectionError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|_| ConnectionError::ChannelClosed)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ConnectionError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .await
            .map_err(|_| ConnectionError::ChannelClosed)
    }

    async fn poll(&self) -> Result<ClientEvent, ConnectionError> {
        let mut event_loop = self.event_loop.lock().await;
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        Ok(ClientEvent::Connected)
                    } else {
                        Err(ConnectionError::Refused(format!("{:?}", ack.code)))
                    };
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(ClientEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload,
                    });
                }
                Ok(event) => {
                    // Pings, acks and outgoing notifications carry no
                    // bridge-visible state
                    debug!("MQTT event: {:?}", event);
                }
                Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                    return Err(ConnectionError::Refused(format!("{:?}", code)));
                }
                Err(rumqttc::ConnectionError::RequestsDone) => {
                    return Err(ConnectionError::ChannelClosed);
                }
                Err(e) => {
                    // The event loop retries the connection on the next
                    // poll; report the drop after a short pause
                    tokio::time::sleep(TRANSIENT_BACKOFF).await;
                    return Ok(ClientEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
