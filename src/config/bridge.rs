//! Bridge Mapping Configuration
//!
//! One `[[bridge]]` entry per bridge instance: which direction it runs,
//! the source and destination topics, and optional per-bridge overrides.

use serde::Deserialize;

/// Which bridge variant a mapping entry constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeFactory {
    /// Broker to bus: subscribe on MQTT, republish on the middleware bus
    #[serde(alias = "inbound")]
    MqttToBus,
    /// Bus to broker: subscribe on the middleware bus, publish to MQTT
    #[serde(alias = "outbound")]
    BusToMqtt,
}

impl std::fmt::Display for BridgeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeFactory::MqttToBus => write!(f, "mqtt_to_bus"),
            BridgeFactory::BusToMqtt => write!(f, "bus_to_mqtt"),
        }
    }
}

/// One declarative topic mapping. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeMapping {
    /// Bridge variant to construct
    pub factory: BridgeFactory,

    /// Source topic, in the source domain's namespace. `~` selects the
    /// private path on the MQTT side.
    #[serde(alias = "from")]
    pub topic_from: String,

    /// Destination topic, in the destination domain's namespace
    #[serde(alias = "to")]
    pub topic_to: String,

    /// Maximum forward rate in messages per second; messages arriving
    /// faster are dropped
    #[serde(default)]
    pub frequency: Option<f64>,

    /// Per-bridge serializer override (registry name)
    #[serde(default)]
    pub serializer: Option<String>,

    /// Per-bridge deserializer override (registry name)
    #[serde(default)]
    pub deserializer: Option<String>,
}

impl BridgeMapping {
    /// Whether this mapping constructs a broker-to-bus bridge.
    pub fn is_inbound(&self) -> bool {
        matches!(self.factory, BridgeFactory::MqttToBus)
    }

    /// Whether this mapping constructs a bus-to-broker bridge.
    pub fn is_outbound(&self) -> bool {
        matches!(self.factory, BridgeFactory::BusToMqtt)
    }
}
