//! Bridge Core
//!
//! A bridge is the unit of translation between the two messaging domains.
//! Exactly two variants exist, one per direction:
//!
//! - [`InboundBridge`]: broker to bus. Deserializes a raw MQTT payload and
//!   republishes the structured message on the middleware bus.
//! - [`OutboundBridge`]: bus to broker. Serializes a structured bus message
//!   and publishes the bytes to the broker.
//!
//! Bridges are built once from the declarative mapping list by the
//! [`BridgeRegistry`] and never remapped afterwards. Per-message codec
//! failures drop that message and leave the bridge alive.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::bus::{BusMessage, MessageBus};
use crate::codec::{CodecBinding, CodecError};
use crate::mqtt::BrokerClient;

mod registry;


pub use registry::{BridgeContext, BridgeRegistry};

/// Optional per-bridge forward-rate limit.
///
/// Messages arriving within `interval` of the last forwarded one are
/// dropped. The timestamp is the only mutable state a bridge carries.
pub(crate) struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub(crate) fn from_frequency(hz: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / hz),
            last: Mutex::new(None),
        }
    }

    /// Returns true if a message may be forwarded now, claiming the slot.
    pub(crate) fn ready(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// A configured bridge instance. Closed set: only two directions exist.
pub enum Bridge {
    /// Broker to bus
    Inbound(Arc<InboundBridge>),
    /// Bus to broker
    Outbound(Arc<OutboundBridge>),
}

impl Bridge {
    /// Source topic in the source domain's concrete namespace.
    pub fn source(&self) -> &str {
        match self {
            Bridge::Inbound(b) => b.source(),
            Bridge::Outbound(b) => b.source(),
        }
    }

    /// Destination topic in the destination domain's concrete namespace.
    pub fn destination(&self) -> &str {
        match self {
            Bridge::Inbound(b) => b.destination(),
            Bridge::Outbound(b) => b.destination(),
        }
    }
}

/// Broker-to-bus bridge: one MQTT source topic (possibly a filter), one
/// bus destination topic.
pub struct InboundBridge {
    source: String,
    destination: String,
    codec: CodecBinding,
    bus: Arc<dyn MessageBus>,
    throttle: Option<Throttle>,
}

impl InboundBridge {
    pub(crate) fn new(
        source: String,
        destination: String,
        codec: CodecBinding,
        bus: Arc<dyn MessageBus>,
        throttle: Option<Throttle>,
    ) -> Self {
        Self {
            source,
            destination,
            codec,
            bus,
            throttle,
        }
    }

    /// Resolved MQTT source topic this bridge listens on.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Bus topic this bridge republishes to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Handle one raw broker payload. A deserialization failure is returned
    /// to the dispatching caller and the message is dropped; the bridge
    /// stays alive.
    pub async fn handle_broker_message(&self, payload: &[u8]) -> Result<(), CodecError> {
        if let Some(throttle) = &self.throttle {
            if !throttle.ready() {
                trace!("Bridge {}: rate limit, message dropped", self.source);
                return Ok(());
            }
        }

        let message = self.codec.deserialize(payload)?;

        if let Err(e) = self.bus.publish(&self.destination, message).await {
            warn!(
                "Bridge {} -> {}: bus publish failed: {}",
                self.source, self.destination, e
            );
        }
        Ok(())
    }
}

/// Bus-to-broker bridge: one bus source topic, one MQTT destination topic.
pub struct OutboundBridge {
    source: String,
    destination: String,
    codec: CodecBinding,
    broker: Arc<dyn BrokerClient>,
    throttle: Option<Throttle>,
}

impl OutboundBridge {
    pub(crate) fn new(
        source: String,
        destination: String,
        codec: CodecBinding,
        broker: Arc<dyn BrokerClient>,
        throttle: Option<Throttle>,
    ) -> Self {
        Self {
            source,
            destination,
            codec,
            broker,
            throttle,
        }
    }

    /// Bus topic this bridge listens on.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolved MQTT topic this bridge publishes to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Handle one structured bus message. A serialization failure is
    /// returned to the caller and the message is dropped, never retried.
    pub async fn handle_bus_message(&self, message: &BusMessage) -> Result<(), CodecError> {
        if let Some(throttle) = &self.throttle {
            if !throttle.ready() {
                trace!("Bridge {}: rate limit, message dropped", self.source);
                return Ok(());
            }
        }

        let payload = self.codec.serialize(message)?;

        if let Err(e) = self.broker.publish(&self.destination, payload).await {
            warn!(
                "Bridge {} -> {}: broker publish failed: {}",
                self.source, self.destination, e
            );
        }
        Ok(())
    }
}
