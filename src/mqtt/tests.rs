//! Connection manager tests
//!
//! Drive the state machine with a scripted client: the script supplies
//! poll events, the client records every request call.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::bridge::{BridgeContext, BridgeRegistry};
use crate::bus::{InProcessBus, MessageBus};
use crate::codec::CodecRef;
use crate::config::{BridgeFactory, BridgeMapping};
use crate::shutdown::ShutdownSignal;

use super::testing::ScriptedClient;
use super::*;

fn mapping(factory: BridgeFactory, from: &str, to: &str) -> BridgeMapping {
    BridgeMapping {
        factory,
        topic_from: from.to_string(),
        topic_to: to.to_string(),
        frequency: None,
        serializer: None,
        deserializer: None,
    }
}

struct Fixture {
    client: Arc<ScriptedClient>,
    script: tokio::sync::mpsc::UnboundedSender<Result<ClientEvent, ConnectionError>>,
    bus: Arc<InProcessBus>,
    manager: Arc<ConnectionManager>,
    shutdown: ShutdownSignal,
}

fn fixture(mappings: &[BridgeMapping], private_path: &str) -> Fixture {
    let (client, script) = ScriptedClient::new();
    let bus = Arc::new(InProcessBus::new());
    let ctx = BridgeContext {
        serializer: CodecRef::from("json"),
        deserializer: CodecRef::from("json"),
        private_path: private_path.to_string(),
        bus: bus.clone(),
        broker: client.clone(),
    };
    let registry = Arc::new(BridgeRegistry::build(mappings, &ctx).unwrap());
    let shutdown = ShutdownSignal::new();
    let manager = Arc::new(ConnectionManager::new(
        client.clone(),
        registry,
        shutdown.clone(),
    ));
    Fixture {
        client,
        script,
        bus,
        manager,
        shutdown,
    }
}

/// Poll a condition until it holds or a second passes.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 1s");
}

#[tokio::test]
async fn test_connect_installs_subscription_set() {
    let fx = fixture(
        &[
            mapping(BridgeFactory::MqttToBus, "~/sensor", "/bus/sensor"),
            mapping(BridgeFactory::MqttToBus, "cloud/cmd", "/bus/cmd"),
            mapping(BridgeFactory::BusToMqtt, "/bus/state", "~/state"),
        ],
        "device/01",
    );

    let manager = fx.manager.clone();
    let handle = tokio::spawn(async move { manager.run().await });

    fx.script.send(Ok(ClientEvent::Connected)).unwrap();
    let client = fx.client.clone();
    wait_for(move || client.subscribes.lock().len() == 2).await;

    // BTreeSet order; the outbound bridge's source never appears
    assert_eq!(
        *fx.client.subscribes.lock(),
        vec!["cloud/cmd".to_string(), "device/01/sensor".to_string()]
    );
    assert_eq!(fx.manager.state(), ConnectionState::Connected);

    fx.shutdown.trigger("test done");
    handle.await.unwrap();
    assert_eq!(*fx.client.disconnects.lock(), 1);
    assert_eq!(fx.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_resubscribes_same_set() {
    let fx = fixture(
        &[
            mapping(BridgeFactory::MqttToBus, "~/a", "/bus/a"),
            mapping(BridgeFactory::MqttToBus, "~/b", "/bus/b"),
        ],
        "p",
    );

    let manager = fx.manager.clone();
    let handle = tokio::spawn(async move { manager.run().await });

    fx.script.send(Ok(ClientEvent::Connected)).unwrap();
    fx.script
        .send(Ok(ClientEvent::Disconnected {
            reason: "broker restart".to_string(),
        }))
        .unwrap();
    fx.script.send(Ok(ClientEvent::Connected)).unwrap();

    let client = fx.client.clone();
    wait_for(move || client.subscribes.lock().len() == 4).await;

    // The exact same fixed set on each connect, nothing lost or duplicated
    assert_eq!(
        *fx.client.subscribes.lock(),
        vec![
            "p/a".to_string(),
            "p/b".to_string(),
            "p/a".to_string(),
            "p/b".to_string(),
        ]
    );

    fx.shutdown.trigger("test done");
    handle.await.unwrap();
}

#[tokio::test]
async fn test_inbound_message_reaches_bus() {
    let fx = fixture(
        &[mapping(BridgeFactory::MqttToBus, "~/sensor", "/bus/sensor")],
        "device/01",
    );
    let mut sub = fx.bus.subscribe("/bus/sensor");

    let manager = fx.manager.clone();
    let handle = tokio::spawn(async move { manager.run().await });

    fx.script.send(Ok(ClientEvent::Connected)).unwrap();
    fx.script
        .send(Ok(ClientEvent::Message {
            topic: "device/01/sensor".to_string(),
            payload: serde_json::to_vec(&json!({"c": 20.0})).unwrap().into(),
        }))
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, json!({"c": 20.0}));

    fx.shutdown.trigger("test done");
    handle.await.unwrap();
}

#[tokio::test]
async fn test_fatal_error_triggers_shutdown() {
    let fx = fixture(&[], "");

    let manager = fx.manager.clone();
    let handle = tokio::spawn(async move { manager.run().await });

    fx.script
        .send(Err(ConnectionError::Refused("bad credentials".to_string())))
        .unwrap();

    handle.await.unwrap();
    assert_eq!(fx.manager.state(), ConnectionState::Failed);
    assert!(fx.shutdown.is_triggered());
    let reason = fx.shutdown.reason().unwrap();
    assert!(reason.contains("bad credentials"), "reason: {}", reason);
}

#[tokio::test]
async fn test_shutdown_stops_idle_loop() {
    let fx = fixture(&[], "");

    let manager = fx.manager.clone();
    let handle = tokio::spawn(async move { manager.run().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    fx.shutdown.trigger("operator stop");
    handle.await.unwrap();
    assert_eq!(*fx.client.disconnects.lock(), 1);
    assert_eq!(fx.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unmatched_topic_is_ignored() {
    let fx = fixture(
        &[mapping(BridgeFactory::MqttToBus, "~/sensor", "/bus/sensor")],
        "device/01",
    );
    let mut sub = fx.bus.subscribe("/bus/sensor");

    let manager = fx.manager.clone();
    let handle = tokio::spawn(async move { manager.run().await });

    fx.script.send(Ok(ClientEvent::Connected)).unwrap();
    fx.script
        .send(Ok(ClientEvent::Message {
            topic: "other/topic".to_string(),
            payload: b"{}".as_ref().into(),
        }))
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
    assert!(nothing.is_err(), "unmatched topic must not reach the bus");

    fx.shutdown.trigger("test done");
    handle.await.unwrap();
}
