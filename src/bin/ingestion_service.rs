//! Sensor Telemetry Ingestion Service
//!
//! HTTP service that hands out generated readings and accepts readings
//! posted by clients.
//!
//! ## Endpoints
//!
//! - `GET /`: Welcome message with server time and request path
//! - `GET /temperature`: One generated reading
//! - `POST /temperature`: Accept a reading and echo it with a classification
//!
//! ## Configuration
//!
//! - `SENSOR_TELEMETRY_HTTP_ADDR`: Bind address (default: 0.0.0.0:8080)
//! - `SENSOR_TELEMETRY_HTTP_GENERATE`: Serve `GET /temperature` (default: true)
//! - `SENSOR_TELEMETRY_TEMPERATURE_MODEL`: `buckets` or `baseline` (default: buckets)
//! - `SENSOR_TELEMETRY_SEED`: Fixed generator seed (default: random)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use sensor_telemetry::config::HttpConfig;
use sensor_telemetry::logging::init_tracing;
use sensor_telemetry::service::{router, AppState};
use sensor_telemetry::startup::build_generator;

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting sensor telemetry ingestion service...");

    let config = match HttpConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let generator = Arc::new(build_generator(&config.generator));
    let app = router(AppState::new(generator, config.generate));

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.addr, "Failed to bind HTTP listener");
            std::process::exit(1);
        }
    };

    info!(addr = %config.addr, "Ingestion service listening");
    info!("  GET  /             - welcome message");
    if config.generate {
        info!("  GET  /temperature  - generated reading");
    }
    info!("  POST /temperature  - submit a reading");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = result {
        error!(error = %e, "HTTP server failed");
        std::process::exit(1);
    }

    info!("Ingestion service stopped");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping..."),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
