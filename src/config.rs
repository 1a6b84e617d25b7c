//! Configuration module for the sensor telemetry services.
//!
//! This module provides environment-based configuration. Each binary loads
//! only its own settings, so a bad publisher variable never stops the HTTP
//! service or the analyzer from starting:
//!
//! - [`Config`]: the publisher (broker connection, log policy, publish cadence)
//! - [`HttpConfig`]: the ingestion service
//! - [`AnalyzerConfig`]: the temperature analyzer
//!
//! Publisher and ingestion service share [`GeneratorSettings`].

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::broker::{LogDescriptor, DEFAULT_LOG_NAME, DEFAULT_SUBJECT, DEFAULT_SUBJECT_FILTER};

/// Prefix shared by every environment variable
const ENV_PREFIX: &str = "SENSOR_TELEMETRY_";

/// Default NATS server URL
const DEFAULT_NATS_URL: &str = "tls://connect.ngs.global";

/// Default credentials file location
const DEFAULT_CREDS_PATH: &str = "../credentials/NGS-Premium-CLI.creds";

/// Default seconds between published readings
const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 3;

/// Minimum publish interval
const MIN_PUBLISH_INTERVAL_SECS: u64 = 1;

/// Maximum publish interval
const MAX_PUBLISH_INTERVAL_SECS: u64 = 300;

/// Default seconds to wait for a publish acknowledgment
const DEFAULT_ACK_TIMEOUT_SECS: u64 = 5;

/// Default HTTP port for the ingestion service, bound on all interfaces
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default NATS server URL for the analyzer
const DEFAULT_ANALYZER_NATS_URL: &str = "nats://localhost:4222";

/// Default subject the analyzer answers requests on
const DEFAULT_ANALYZER_SUBJECT: &str = "temperature.analyze";

/// Which broker implementation to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// NATS JetStream over the network
    JetStream,
    /// In-process broker, for local runs without a NATS server
    Memory,
}

/// Which temperature model the generator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Weighted cold/nominal/hot buckets
    Buckets,
    /// Per-location baseline with small variation
    Baseline,
}

/// Generator settings shared by the publisher and the ingestion service.
///
/// - `SENSOR_TELEMETRY_TEMPERATURE_MODEL`: `buckets` or `baseline` (default: buckets)
/// - `SENSOR_TELEMETRY_SEED`: fixed generator seed (default: random)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub model: ModelKind,

    /// Generator seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

/// Configuration for the publisher.
///
/// All settings can be configured via environment variables:
/// - `SENSOR_TELEMETRY_NATS_URL`: NATS server URL (default: tls://connect.ngs.global)
/// - `SENSOR_TELEMETRY_CREDS_PATH`: credentials file (default: ../credentials/NGS-Premium-CLI.creds)
/// - `SENSOR_TELEMETRY_BROKER`: `jetstream` or `memory` (default: jetstream)
/// - `SENSOR_TELEMETRY_STREAM_NAME`: durable log name (default: Temperatures)
/// - `SENSOR_TELEMETRY_SUBJECT`: publish subject (default: telemetry.sensors.temperature)
/// - `SENSOR_TELEMETRY_PUBLISH_INTERVAL_SECS`: seconds between ticks (default: 3)
/// - `SENSOR_TELEMETRY_ACK_TIMEOUT_SECS`: acknowledgment timeout (default: 5)
/// - plus the [`GeneratorSettings`] variables
#[derive(Debug, Clone)]
pub struct Config {
    pub nats_url: String,

    /// Credentials file handed to the NATS connection
    pub creds_path: PathBuf,

    pub broker: BrokerKind,

    /// Policy used when the log has to be created
    pub log: LogDescriptor,

    /// Subject readings are published on
    pub subject: String,

    /// Period between publish ticks
    pub publish_interval: Duration,

    /// Upper bound on waiting for an acknowledgment
    pub ack_timeout: Duration,

    pub generator: GeneratorSettings,
}

/// Configuration for the ingestion service.
///
/// - `SENSOR_TELEMETRY_HTTP_ADDR`: bind address (default: 0.0.0.0:8080)
/// - `SENSOR_TELEMETRY_HTTP_GENERATE`: serve `GET /temperature` (default: true)
/// - plus the [`GeneratorSettings`] variables
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub addr: SocketAddr,

    /// Whether `GET /temperature` generates readings
    pub generate: bool,

    pub generator: GeneratorSettings,
}

/// Configuration for the temperature analyzer.
///
/// - `SENSOR_TELEMETRY_ANALYZER_NATS_URL`: NATS server URL (default: nats://localhost:4222)
/// - `SENSOR_TELEMETRY_ANALYZER_CREDS_PATH`: credentials file (default: none)
/// - `SENSOR_TELEMETRY_ANALYZER_SUBJECT`: request subject (default: temperature.analyze)
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub nats_url: String,

    /// Credentials file; plain connection when unset
    pub creds_path: Option<PathBuf>,

    pub subject: String,
}

/// Error type for configuration loading failures
#[derive(Debug, thiserror::Error)]
#[error("Configuration error{}: {message}", .env_var.as_ref().map(|v| format!(" for {}", v)).unwrap_or_default())]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    fn for_var(var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(var.to_string()),
        }
    }
}

fn var_name(suffix: &str) -> String {
    format!("{}{}", ENV_PREFIX, suffix)
}

fn read_var(suffix: &str) -> Option<(String, String)> {
    let name = var_name(suffix);
    env::var(&name).ok().map(|value| (name, value))
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed or out of range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_telemetry::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("NATS URL: {}", config.nats_url);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let nats_url = read_var("NATS_URL")
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or(defaults.nats_url);

        let creds_path = read_var("CREDS_PATH")
            .map(|(_, v)| PathBuf::from(v))
            .unwrap_or(defaults.creds_path);

        let broker = match read_var("BROKER") {
            Some((name, value)) => match value.trim().to_ascii_lowercase().as_str() {
                "jetstream" | "nats" => BrokerKind::JetStream,
                "memory" => BrokerKind::Memory,
                other => return Err(ConfigError::for_var(&name, format!("unknown broker '{}'", other))),
            },
            None => defaults.broker,
        };

        let stream_name = read_var("STREAM_NAME")
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_LOG_NAME.to_string());
        if stream_name.is_empty() {
            return Err(ConfigError::for_var(&var_name("STREAM_NAME"), "stream name must not be empty"));
        }

        let subject = match read_var("SUBJECT") {
            Some((name, value)) => {
                let value = value.trim().to_string();
                crate::subject::validate_subject(&value).map_err(|e| ConfigError::for_var(&name, e.to_string()))?;
                value
            }
            None => defaults.subject,
        };

        let publish_interval = Duration::from_secs(Self::parse_publish_interval()?);

        let ack_timeout = match read_var("ACK_TIMEOUT_SECS") {
            Some((name, value)) => {
                let secs = parse_number::<u64>(&name, &value)?;
                if secs == 0 {
                    return Err(ConfigError::for_var(&name, "ack timeout must be greater than 0"));
                }
                Duration::from_secs(secs)
            }
            None => defaults.ack_timeout,
        };

        let generator = GeneratorSettings::from_env()?;

        Ok(Self {
            nats_url,
            creds_path,
            broker,
            log: LogDescriptor::new(stream_name, DEFAULT_SUBJECT_FILTER),
            subject,
            publish_interval,
            ack_timeout,
            generator,
        })
    }

    /// Parse the publish interval from the environment with validation.
    fn parse_publish_interval() -> Result<u64, ConfigError> {
        match read_var("PUBLISH_INTERVAL_SECS") {
            Some((name, value)) => {
                let interval = parse_number::<u64>(&name, &value)?;

                if interval < MIN_PUBLISH_INTERVAL_SECS {
                    return Err(ConfigError::for_var(
                        &name,
                        format!(
                            "publish interval {} is below minimum ({}s)",
                            interval, MIN_PUBLISH_INTERVAL_SECS
                        ),
                    ));
                }

                if interval > MAX_PUBLISH_INTERVAL_SECS {
                    return Err(ConfigError::for_var(
                        &name,
                        format!(
                            "publish interval {} exceeds maximum ({}s)",
                            interval, MAX_PUBLISH_INTERVAL_SECS
                        ),
                    ));
                }

                Ok(interval)
            }
            None => Ok(DEFAULT_PUBLISH_INTERVAL_SECS),
        }
    }
}

impl GeneratorSettings {
    /// Load the temperature model and seed from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let model = match read_var("TEMPERATURE_MODEL") {
            Some((name, value)) => match value.trim().to_ascii_lowercase().as_str() {
                "buckets" => ModelKind::Buckets,
                "baseline" => ModelKind::Baseline,
                other => return Err(ConfigError::for_var(&name, format!("unknown temperature model '{}'", other))),
            },
            None => ModelKind::Buckets,
        };

        let seed = match read_var("SEED") {
            Some((name, value)) => Some(parse_number::<u64>(&name, &value)?),
            None => None,
        };

        Ok(Self { model, seed })
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model: ModelKind::Buckets,
            seed: None,
        }
    }
}

impl HttpConfig {
    /// Load ingestion service settings; publisher variables are not read.
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = match read_var("HTTP_ADDR") {
            Some((name, value)) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::for_var(&name, format!("'{}' is not a valid socket address", value)))?,
            None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
        };

        let generate = match read_var("HTTP_GENERATE") {
            Some((name, value)) => parse_bool(&name, &value)?,
            None => true,
        };

        Ok(Self {
            addr,
            generate,
            generator: GeneratorSettings::from_env()?,
        })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            generate: true,
            generator: GeneratorSettings::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load analyzer settings; publisher variables are not read.
    pub fn from_env() -> Result<Self, ConfigError> {
        let nats_url = read_var("ANALYZER_NATS_URL")
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ANALYZER_NATS_URL.to_string());

        let creds_path = read_var("ANALYZER_CREDS_PATH")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let subject = match read_var("ANALYZER_SUBJECT") {
            Some((name, value)) => {
                let value = value.trim().to_string();
                crate::subject::validate_subject(&value).map_err(|e| ConfigError::for_var(&name, e.to_string()))?;
                value
            }
            None => DEFAULT_ANALYZER_SUBJECT.to_string(),
        };

        Ok(Self {
            nats_url,
            creds_path,
            subject,
        })
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_ANALYZER_NATS_URL.to_string(),
            creds_path: None,
            subject: DEFAULT_ANALYZER_SUBJECT.to_string(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::for_var(name, format!("'{}' is not a valid number", value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::for_var(name, format!("'{}' is not a valid boolean", value))),
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            creds_path: PathBuf::from(DEFAULT_CREDS_PATH),
            broker: BrokerKind::JetStream,
            log: LogDescriptor::default(),
            subject: DEFAULT_SUBJECT.to_string(),
            publish_interval: Duration::from_secs(DEFAULT_PUBLISH_INTERVAL_SECS),
            ack_timeout: Duration::from_secs(DEFAULT_ACK_TIMEOUT_SECS),
            generator: GeneratorSettings::default(),
        }
    }
}
