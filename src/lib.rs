//! mqbridge - Configuration-driven bridge between a robotics middleware
//! bus and an MQTT broker
//!
//! Messages published on one side are translated and republished on the
//! other under a declarative list of topic-to-topic mappings. Each mapping
//! builds one bridge instance: inbound (broker to bus) or outbound (bus to
//! broker), with its own codec binding and private-path resolved topics.

pub mod bridge;
pub mod bus;
pub mod codec;
pub mod config;
pub mod mqtt;
pub mod shutdown;
pub mod topic;

pub use bridge::{Bridge, BridgeContext, BridgeRegistry, InboundBridge, OutboundBridge};
pub use bus::{BusError, BusMessage, BusSubscription, InProcessBus, MessageBus};
pub use codec::{Codec, CodecBinding, CodecError, CodecRef, ResolutionError};
pub use config::{BridgeFactory, BridgeMapping, Config, ConfigError, ConnectionConfig};
pub use mqtt::{BrokerClient, ClientEvent, ConnectionError, ConnectionManager, ConnectionState, RumqttClient};
pub use shutdown::ShutdownSignal;
pub use topic::{matches_filter, resolve_private_path};
