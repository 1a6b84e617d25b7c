//! Sensor Telemetry Temperature Analyzer
//!
//! NATS request/reply service that classifies the reading carried by a
//! change-stream event as cold, warm, or hot.
//!
//! ## Configuration
//!
//! - `SENSOR_TELEMETRY_ANALYZER_NATS_URL`: NATS server URL (default: nats://localhost:4222)
//! - `SENSOR_TELEMETRY_ANALYZER_CREDS_PATH`: Credentials file (default: none)
//! - `SENSOR_TELEMETRY_ANALYZER_SUBJECT`: Request subject (default: temperature.analyze)
//! - `RUST_LOG`: Logging level filter (default: info)

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sensor_telemetry::analyzer::{self, SERVICE_NAME};
use sensor_telemetry::broker::connect_client;
use sensor_telemetry::config::AnalyzerConfig;
use sensor_telemetry::logging::init_tracing;
use sensor_telemetry::startup::check_credentials;

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting temperature analyzer...");

    let config = match AnalyzerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Some(path) = &config.creds_path {
        if let Err(e) = check_credentials(path) {
            error!(error = %e, "Cannot start without credentials");
            std::process::exit(1);
        }
        info!(path = %path.display(), "Using NATS credentials");
    }

    let client = match connect_client(&config.nats_url, config.creds_path.as_deref(), SERVICE_NAME).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, url = %config.nats_url, "Failed to connect to NATS");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down service..."),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    if let Err(e) = analyzer::serve(client, &config.subject, cancel).await {
        error!(error = %e, subject = %config.subject, "Temperature analyzer failed");
        std::process::exit(1);
    }

    info!("Temperature analyzer stopped");
}
