//! Bridge Registry
//!
//! Builds the full bridge set from the declarative mapping list, resolving
//! codecs and private-path topics for each entry. The build is all or
//! nothing: the first resolution failure aborts it, so a partially wired
//! bridge set is never activated.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::bus::MessageBus;
use crate::codec::{CodecBinding, CodecRef, ResolutionError};
use crate::config::{BridgeFactory, BridgeMapping};
use crate::mqtt::BrokerClient;
use crate::topic::{matches_filter, resolve_private_path};

use super::{Bridge, InboundBridge, OutboundBridge, Throttle};

/// Shared, pre-resolved collaborators handed to the registry build.
///
/// This is the single injection point for everything a bridge needs beyond
/// its own mapping entry: the default codec references, the private path
/// prefix, and the two publish targets.
#[derive(Clone)]
pub struct BridgeContext {
    /// Default serializer, used when a mapping has no override
    pub serializer: CodecRef,
    /// Default deserializer, used when a mapping has no override
    pub deserializer: CodecRef,
    /// Private namespace prefix substituted for the `~` marker
    pub private_path: String,
    /// Middleware bus handle, the inbound publish target
    pub bus: Arc<dyn MessageBus>,
    /// Broker client handle, the outbound publish target
    pub broker: Arc<dyn BrokerClient>,
}

impl BridgeContext {
    /// Resolve the codec binding for one mapping entry, applying per-bridge
    /// overrides over the defaults.
    fn binding_for(&self, mapping: &BridgeMapping) -> Result<CodecBinding, ResolutionError> {
        let serializer = mapping
            .serializer
            .as_deref()
            .map(CodecRef::from)
            .unwrap_or_else(|| self.serializer.clone());
        let deserializer = mapping
            .deserializer
            .as_deref()
            .map(CodecRef::from)
            .unwrap_or_else(|| self.deserializer.clone());
        CodecBinding::resolve(&serializer, &deserializer)
    }
}

/// The ordered collection of all configured bridges, plus the set of
/// broker topics the connection manager must subscribe to.
pub struct BridgeRegistry {
    bridges: Vec<Bridge>,
    subscriptions: BTreeSet<String>,
}

impl BridgeRegistry {
    /// Build every bridge in the mapping list, in order. Fails fast: any
    /// unresolvable entry aborts the whole build.
    pub fn build(
        mappings: &[BridgeMapping],
        ctx: &BridgeContext,
    ) -> Result<Self, ResolutionError> {
        let mut bridges = Vec::with_capacity(mappings.len());
        let mut subscriptions = BTreeSet::new();

        for mapping in mappings {
            let codec = ctx.binding_for(mapping)?;
            let throttle = mapping.frequency.map(Throttle::from_frequency);

            match mapping.factory {
                BridgeFactory::MqttToBus => {
                    let source = resolve_private_path(&mapping.topic_from, &ctx.private_path);
                    debug!(
                        "Configured mqtt_to_bus bridge: {} -> {}",
                        source, mapping.topic_to
                    );
                    subscriptions.insert(source.clone());
                    bridges.push(Bridge::Inbound(Arc::new(InboundBridge::new(
                        source,
                        mapping.topic_to.clone(),
                        codec,
                        ctx.bus.clone(),
                        throttle,
                    ))));
                }
                BridgeFactory::BusToMqtt => {
                    let destination = resolve_private_path(&mapping.topic_to, &ctx.private_path);
                    debug!(
                        "Configured bus_to_mqtt bridge: {} -> {}",
                        mapping.topic_from, destination
                    );
                    bridges.push(Bridge::Outbound(Arc::new(OutboundBridge::new(
                        mapping.topic_from.clone(),
                        destination,
                        codec,
                        ctx.broker.clone(),
                        throttle,
                    ))));
                }
            }
        }

        Ok(Self {
            bridges,
            subscriptions,
        })
    }

    /// Broker topics every inbound bridge listens on. Computed once at
    /// build; reconnects re-subscribe this same set.
    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    /// All bridges, in mapping-list order.
    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    pub fn inbound_count(&self) -> usize {
        self.bridges
            .iter()
            .filter(|b| matches!(b, Bridge::Inbound(_)))
            .count()
    }

    pub fn outbound_count(&self) -> usize {
        self.bridges.len() - self.inbound_count()
    }

    /// Route one broker message to every inbound bridge whose source topic
    /// matches. Codec failures are logged and isolated per message; the
    /// loop that delivers the next message is never affected.
    pub async fn dispatch_inbound(&self, topic: &str, payload: &[u8]) {
        let mut delivered = false;

        for bridge in &self.bridges {
            if let Bridge::Inbound(inbound) = bridge {
                if matches_filter(topic, inbound.source()) {
                    delivered = true;
                    if let Err(e) = inbound.handle_broker_message(payload).await {
                        warn!(
                            "Bridge {} -> {}: message dropped: {}",
                            inbound.source(),
                            inbound.destination(),
                            e
                        );
                    }
                }
            }
        }

        if !delivered {
            trace!("No bridge for broker topic '{}'", topic);
        }
    }

    /// Spawn one pump task per outbound bridge, forwarding its bus
    /// subscription into the bridge. Returns the number of tasks spawned.
    /// Each pump handles its messages in order, one at a time.
    pub fn spawn_outbound(&self, bus: Arc<dyn MessageBus>) -> usize {
        let mut spawned = 0;

        for bridge in &self.bridges {
            if let Bridge::Outbound(outbound) = bridge {
                let outbound = Arc::clone(outbound);
                let mut subscription = bus.subscribe(outbound.source());
                tokio::spawn(async move {
                    while let Some(message) = subscription.recv().await {
                        if let Err(e) = outbound.handle_bus_message(&message).await {
                            warn!(
                                "Bridge {} -> {}: message dropped: {}",
                                outbound.source(),
                                outbound.destination(),
                                e
                            );
                        }
                    }
                    debug!("Bus subscription '{}' closed", outbound.source());
                });
                spawned += 1;
            }
        }

        spawned
    }
}
