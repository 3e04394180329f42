//! Connection Manager
//!
//! Owns the broker client lifecycle: one dedicated polling loop that
//! drives the connection state machine, installs the registry's
//! subscription set on every (re)connect, and routes inbound broker
//! messages to the matching bridges.
//!
//! State machine: Disconnected --connect--> Connecting --ConnAck-->
//! Connected --drop--> Disconnected (and back to Connected on the
//! client's reconnect). Any unrecoverable client error moves to Failed
//! and fires the process shutdown signal.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeRegistry;
use crate::shutdown::ShutdownSignal;

use super::{BrokerClient, ClientEvent, ConnectionError, ConnectionState};

pub struct ConnectionManager {
    client: Arc<dyn BrokerClient>,
    registry: Arc<BridgeRegistry>,
    state: RwLock<ConnectionState>,
    shutdown: ShutdownSignal,
}

impl ConnectionManager {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        registry: Arc<BridgeRegistry>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            client,
            registry,
            state: RwLock::new(ConnectionState::Disconnected),
            shutdown,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            debug!("MQTT connection state: {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Subscribe to every topic in the registry's subscription set. The
    /// set is fixed at registry build; repeating it on reconnect is
    /// idempotent.
    async fn install_subscriptions(&self) -> Result<(), ConnectionError> {
        for topic in self.registry.subscriptions() {
            self.client.subscribe(topic).await?;
            debug!("Subscribed to '{}'", topic);
        }
        Ok(())
    }

    /// Run the network loop for the life of the process. Returns once the
    /// shutdown signal fires or an unrecoverable client error is hit;
    /// the latter fires the signal itself. The broker connection is never
    /// left open without this loop pumping it.
    pub async fn run(&self) {
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.client.connect().await {
            self.fail(e);
            return;
        }

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => {
                    if let Err(e) = self.client.disconnect().await {
                        debug!("Disconnect on shutdown failed: {}", e);
                    }
                    self.set_state(ConnectionState::Disconnected);
                    info!("MQTT loop stopped");
                    return;
                }
                event = self.client.poll() => match event {
                    Ok(ClientEvent::Connected) => {
                        info!("MQTT connected");
                        self.set_state(ConnectionState::Connected);
                        if let Err(e) = self.install_subscriptions().await {
                            self.fail(e);
                            return;
                        }
                    }
                    Ok(ClientEvent::Disconnected { reason }) => {
                        warn!("MQTT disconnected: {}", reason);
                        self.set_state(ConnectionState::Disconnected);
                    }
                    Ok(ClientEvent::Message { topic, payload }) => {
                        self.registry.dispatch_inbound(&topic, &payload).await;
                    }
                    Err(e) => {
                        self.fail(e);
                        return;
                    }
                }
            }
        }
    }

    fn fail(&self, error: ConnectionError) {
        error!("MQTT connection failed: {}", error);
        self.set_state(ConnectionState::Failed);
        self.shutdown.trigger(format!("mqtt connection error: {}", error));
    }
}
