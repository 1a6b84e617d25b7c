//! Publisher startup: preconditions, broker connection, and provisioning.
//!
//! Every error here is fatal. The binary logs it and exits with status 1.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::broker::{BrokerError, InMemoryBroker, JetStreamBroker, StreamBroker};
use crate::config::{BrokerKind, Config, ConfigError, GeneratorSettings, ModelKind};
use crate::generator::{GeneratorCatalog, ReadingGenerator, TemperatureModel};
use crate::provisioner::{ProvisionError, Provisioned, StreamProvisioner};

/// Errors that stop the publisher before its first tick.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("credentials file not found: {}", .0.display())]
    MissingCredentials(PathBuf),

    #[error("failed to connect to {url}: {source}")]
    Connect { url: String, source: BrokerError },

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Fail unless the credentials file exists.
pub fn check_credentials(path: &Path) -> Result<(), StartupError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StartupError::MissingCredentials(path.to_path_buf()))
    }
}

/// Connect to the configured broker.
///
/// For JetStream the credentials file is checked before any network activity.
pub async fn connect_broker(config: &Config) -> Result<Arc<dyn StreamBroker>, StartupError> {
    match config.broker {
        BrokerKind::JetStream => {
            check_credentials(&config.creds_path)?;
            let broker = JetStreamBroker::connect(&config.nats_url, Some(&config.creds_path), config.ack_timeout)
                .await
                .map_err(|source| StartupError::Connect {
                    url: config.nats_url.clone(),
                    source,
                })?;
            Ok(Arc::new(broker))
        }
        BrokerKind::Memory => {
            info!("Using in-memory broker; records are not persisted");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

/// Ensure the configured log exists.
pub async fn provision(broker: Arc<dyn StreamBroker>, config: &Config) -> Result<Provisioned, StartupError> {
    Ok(StreamProvisioner::new(broker).ensure_log(&config.log).await?)
}

/// Build the reading generator selected by configuration.
pub fn build_generator(settings: &GeneratorSettings) -> ReadingGenerator {
    let model = match settings.model {
        ModelKind::Buckets => TemperatureModel::default(),
        ModelKind::Baseline => TemperatureModel::LocationBaseline,
    };
    let rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    ReadingGenerator::new(GeneratorCatalog::default(), model, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::ProvisionOutcome;

    fn memory_config() -> Config {
        Config {
            broker: BrokerKind::Memory,
            ..Config::default()
        }
    }

    #[test]
    fn test_missing_credentials() {
        let path = Path::new("/nonexistent/credentials/NGS-Premium-CLI.creds");

        let err = check_credentials(path).unwrap_err();
        assert!(matches!(err, StartupError::MissingCredentials(ref p) if p == path));
        assert!(err.to_string().contains("NGS-Premium-CLI.creds"));
    }

    #[test]
    fn test_credentials_present() {
        let path = std::env::temp_dir().join(format!("sensor-telemetry-{}.creds", std::process::id()));
        std::fs::write(&path, "-----BEGIN NATS USER JWT-----").unwrap();

        let result = check_credentials(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_jetstream_without_credentials_fails_before_connecting() {
        let config = Config {
            creds_path: PathBuf::from("/nonexistent/creds"),
            ..Config::default()
        };

        let result = connect_broker(&config).await;
        assert!(matches!(result, Err(StartupError::MissingCredentials(_))));
    }

    #[tokio::test]
    async fn test_memory_broker_provisions_log() {
        let config = memory_config();
        let broker = connect_broker(&config).await.unwrap();

        let first = provision(broker.clone(), &config).await.unwrap();
        let second = provision(broker, &config).await.unwrap();

        assert_eq!(first.outcome, ProvisionOutcome::Created);
        assert_eq!(second.outcome, ProvisionOutcome::Existing);
        assert_eq!(first.descriptor.name, "Temperatures");
    }

    #[test]
    fn test_seeded_generators_agree() {
        let settings = GeneratorSettings {
            seed: Some(99),
            ..GeneratorSettings::default()
        };

        let a = build_generator(&settings).generate_batch(20);
        let b = build_generator(&settings).generate_batch(20);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.sensor_id, y.sensor_id);
            assert_eq!(x.temperature, y.temperature);
        }
    }

    #[test]
    fn test_baseline_model_selected() {
        let settings = GeneratorSettings {
            model: ModelKind::Baseline,
            seed: None,
        };

        let generator = build_generator(&settings);
        assert!(matches!(generator.model(), TemperatureModel::LocationBaseline));
    }
}
