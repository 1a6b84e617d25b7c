//! Sensor Telemetry Library
//!
//! This library provides components for publishing simulated temperature
//! readings into a durable, acknowledged log:
//!
//! - **generator**: Simulated sensor readings from a catalog and temperature model
//! - **subject**: Subject validation and wildcard matching
//! - **broker**: Durable log transport (NATS JetStream or in-memory)
//! - **provisioner**: Lookup-or-create of the durable log
//! - **gateway**: Acknowledged publish of a single reading
//! - **publish_loop**: Timed generate-then-publish driver
//! - **service**: HTTP surface serving and accepting readings
//! - **analyzer**: NATS request/reply classification of stored readings
//! - **startup**: Publisher preconditions and broker connection
//! - **config**: Environment-based configuration
//! - **logging**: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sensor_telemetry::broker::{InMemoryBroker, LogDescriptor, StreamBroker, DEFAULT_SUBJECT};
//! use sensor_telemetry::gateway::PublishGateway;
//! use sensor_telemetry::generator::ReadingGenerator;
//! use sensor_telemetry::provisioner::StreamProvisioner;
//! use sensor_telemetry::publish_loop::PublishLoop;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker: Arc<dyn StreamBroker> = Arc::new(InMemoryBroker::new());
//!
//!     // Make sure the log exists before publishing
//!     let provisioned = StreamProvisioner::new(broker.clone())
//!         .ensure_log(&LogDescriptor::default())
//!         .await
//!         .expect("Failed to provision log");
//!
//!     let publish_loop = PublishLoop::new(
//!         Arc::new(ReadingGenerator::with_defaults()),
//!         PublishGateway::new(broker),
//!         provisioned.descriptor,
//!         DEFAULT_SUBJECT,
//!         Duration::from_secs(3),
//!     );
//!
//!     let cancel = CancellationToken::new();
//!     let stats = publish_loop.run(cancel).await;
//!     println!("published {} readings", stats.published);
//! }
//! ```

// Module declarations
pub mod analyzer;
pub mod broker;
pub mod config;
pub mod gateway;
pub mod generator;
pub mod logging;
pub mod provisioner;
pub mod publish_loop;
pub mod service;
pub mod startup;
pub mod subject;

// Re-export commonly used types at crate root for convenience
pub use analyzer::{Analysis, AnalysisError};
pub use broker::{BrokerError, InMemoryBroker, JetStreamBroker, LogDescriptor, PublishAcknowledgment, StreamBroker};
pub use config::{AnalyzerConfig, BrokerKind, Config, ConfigError, GeneratorSettings, HttpConfig, ModelKind};
pub use gateway::{DeliveryError, PublishError, PublishGateway};
pub use generator::{
    CatalogError, GeneratorCatalog, ReadingGenerator, SensorReading, TemperatureBand, TemperatureDistribution,
    TemperatureModel,
};
pub use provisioner::{ProvisionError, ProvisionOutcome, Provisioned, StreamProvisioner};
pub use publish_loop::{LoopStats, PublishLoop};
pub use service::{router, AppState};
pub use startup::StartupError;
