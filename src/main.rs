//! mqbridge - bridge a robotics middleware bus to an MQTT broker
//!
//! Usage:
//!   mqbridge [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path (default: mqbridge.toml)
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mqbridge::bridge::{BridgeContext, BridgeRegistry};
use mqbridge::bus::{InProcessBus, MessageBus};
use mqbridge::codec::CodecRef;
use mqbridge::config::Config;
use mqbridge::mqtt::{BrokerClient, ConnectionManager, RumqttClient};
use mqbridge::shutdown::ShutdownSignal;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// mqbridge - MQTT bridge for robotics middleware buses
#[derive(Parser, Debug)]
#[command(name = "mqbridge")]
#[command(version = "0.1.0")]
#[command(about = "Configuration-driven bridge between a middleware bus and an MQTT broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, default_value = "mqbridge.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load and validate configuration; a missing connection section or an
    // unresolvable mapping aborts before anything is wired up
    let config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config file: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging - CLI overrides config, config overrides default (info)
    let log_level = args.log_level.unwrap_or_else(|| {
        match config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mqbridge");
    info!("  Config: {:?}", args.config);

    let connection = config.connection()?.clone();
    info!("  Broker: {}:{}", connection.host, connection.port);
    if !config.mqtt.private_path.is_empty() {
        info!("  Private path: {}", config.mqtt.private_path);
    }

    let shutdown = ShutdownSignal::new();
    let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
    let client: Arc<dyn BrokerClient> = Arc::new(RumqttClient::new(&connection));

    // Build every bridge up front; any resolution failure aborts startup
    // before a single subscription exists
    let ctx = BridgeContext {
        serializer: CodecRef::from(config.serializer.as_str()),
        deserializer: CodecRef::from(config.deserializer.as_str()),
        private_path: config.mqtt.private_path.clone(),
        bus: bus.clone(),
        broker: client.clone(),
    };
    let registry = match BridgeRegistry::build(&config.bridge, &ctx) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Error building bridges: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "  Bridges: {} configured ({} inbound, {} outbound)",
        registry.len(),
        registry.inbound_count(),
        registry.outbound_count()
    );
    for bridge in registry.bridges() {
        info!("    {} -> {}", bridge.source(), bridge.destination());
    }

    let pumps = registry.spawn_outbound(bus.clone());
    info!("  Bus pumps: {}", pumps);

    // The broker network loop runs on its own task for the process lifetime
    let manager = Arc::new(ConnectionManager::new(
        client,
        registry,
        shutdown.clone(),
    ));
    let loop_handle = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            shutdown.trigger("signal received");
        }
        _ = shutdown.wait() => {}
    }

    // Let the manager disconnect and drain its loop
    let _ = loop_handle.await;

    if let Some(reason) = shutdown.reason() {
        info!("mqbridge stopped: {}", reason);
    }

    Ok(())
}
