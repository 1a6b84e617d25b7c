//! Sensor Telemetry Publisher
//!
//! Generates a simulated temperature reading on a fixed period and publishes
//! it into a durable NATS JetStream log, waiting for each acknowledgment.
//!
//! ## Features
//!
//! - Lookup-or-create of the durable log at startup
//! - Acknowledged publishes with log sequence numbers
//! - Failed publishes are logged and skipped; the loop keeps running
//! - Graceful shutdown on Ctrl+C, waiting for in-flight publishes
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `SENSOR_TELEMETRY_NATS_URL`: NATS server URL (default: tls://connect.ngs.global)
//! - `SENSOR_TELEMETRY_CREDS_PATH`: Credentials file (default: ../credentials/NGS-Premium-CLI.creds)
//! - `SENSOR_TELEMETRY_BROKER`: `jetstream` or `memory` (default: jetstream)
//! - `SENSOR_TELEMETRY_STREAM_NAME`: Durable log name (default: Temperatures)
//! - `SENSOR_TELEMETRY_SUBJECT`: Publish subject (default: telemetry.sensors.temperature)
//! - `SENSOR_TELEMETRY_PUBLISH_INTERVAL_SECS`: Seconds between readings (default: 3)
//! - `SENSOR_TELEMETRY_ACK_TIMEOUT_SECS`: Acknowledgment timeout (default: 5)
//! - `SENSOR_TELEMETRY_TEMPERATURE_MODEL`: `buckets` or `baseline` (default: buckets)
//! - `SENSOR_TELEMETRY_SEED`: Fixed generator seed (default: random)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sensor_telemetry::config::Config;
use sensor_telemetry::gateway::PublishGateway;
use sensor_telemetry::logging::init_tracing;
use sensor_telemetry::publish_loop::PublishLoop;
use sensor_telemetry::startup::{self, StartupError};

/// Upper bound on waiting for in-flight publishes at shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    info!("Starting sensor telemetry publisher...");

    if let Err(e) = run().await {
        error!(error = %e, "Publisher failed to start");
        std::process::exit(1);
    }

    info!("Sensor telemetry publisher stopped");
}

async fn run() -> Result<(), StartupError> {
    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        nats_url = %config.nats_url,
        broker = ?config.broker,
        log = %config.log.name,
        subject = %config.subject,
        publish_interval_secs = config.publish_interval.as_secs(),
        "Configuration loaded"
    );

    let broker = startup::connect_broker(&config).await?;

    let provisioned = startup::provision(broker.clone(), &config).await?;
    info!(
        log = %provisioned.descriptor.name,
        outcome = ?provisioned.outcome,
        messages = provisioned.state.messages,
        bytes = provisioned.state.bytes,
        "Log ready"
    );
    if !provisioned.descriptor.accepts(&config.subject) {
        warn!(
            log = %provisioned.descriptor.name,
            subjects = ?provisioned.descriptor.subjects,
            subject = %config.subject,
            "Log does not accept the publish subject; every publish will fail"
        );
    }

    let generator = Arc::new(startup::build_generator(&config.generator));
    info!(sensors = generator.catalog().len(), "Reading generator initialized");

    let publish_loop = PublishLoop::new(
        generator,
        PublishGateway::new(broker),
        provisioned.descriptor,
        config.subject.clone(),
        config.publish_interval,
    );

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(publish_loop.run(cancel.clone()));

    // Wait for shutdown signal
    info!("Publisher running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    cancel.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, loop_handle).await {
        Ok(Ok(stats)) => {
            info!(
                ticks = stats.ticks,
                published = stats.published,
                failed = stats.failed,
                "Publish loop shut down gracefully"
            );
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Publish loop panicked during shutdown");
        }
        Err(_) => {
            warn!("Publish loop shutdown timed out after {:?}", SHUTDOWN_TIMEOUT);
        }
    }

    Ok(())
}
