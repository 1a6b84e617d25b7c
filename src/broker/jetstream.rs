//! NATS JetStream transport.

use std::path::Path;
use std::time::Duration;

use async_nats::jetstream::context::{CreateStreamErrorKind, GetStreamErrorKind, PublishErrorKind};
use async_nats::jetstream::{self, stream, ErrorCode};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use super::{
    BrokerError, LogDescriptor, LogInfo, LogState, PublishAcknowledgment, RetentionPolicy, StorageClass,
    StreamBroker,
};

/// Connection name reported to the NATS server.
pub const CONNECTION_NAME: &str = "Temperature Sensor JetStream Publisher";

/// Broker backed by a JetStream context over a single NATS connection.
///
/// The context is cheap to share: concurrent publishes are multiplexed over
/// the same connection.
#[derive(Clone)]
pub struct JetStreamBroker {
    context: jetstream::Context,
}

impl JetStreamBroker {
    /// Connect to `url`, authenticating with the credentials file if given.
    ///
    /// `ack_timeout` bounds every JetStream request, including publish acknowledgments.
    pub async fn connect(url: &str, credentials: Option<&Path>, ack_timeout: Duration) -> Result<Self, BrokerError> {
        let client = connect_client(url, credentials, CONNECTION_NAME).await?;

        let mut context = jetstream::new(client);
        context.set_timeout(ack_timeout);

        Ok(Self { context })
    }
}

/// Open a named NATS connection, authenticating with the credentials file if given.
pub async fn connect_client(
    url: &str,
    credentials: Option<&Path>,
    name: &str,
) -> Result<async_nats::Client, BrokerError> {
    let options = match credentials {
        Some(path) => async_nats::ConnectOptions::with_credentials_file(path.to_path_buf())
            .await
            .map_err(|e| BrokerError::Transport(format!("cannot load credentials {}: {}", path.display(), e)))?,
        None => async_nats::ConnectOptions::new(),
    };

    let client = options
        .name(name)
        .connect(url)
        .await
        .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

    info!(url = %url, connection = %name, "Connected to NATS");
    Ok(client)
}

#[async_trait]
impl StreamBroker for JetStreamBroker {
    async fn stream_info(&self, name: &str) -> Result<Option<LogInfo>, BrokerError> {
        match self.context.get_stream(name).await {
            Ok(stream) => {
                let info = stream.cached_info();
                Ok(Some(LogInfo {
                    descriptor: descriptor_from_config(&info.config),
                    state: LogState {
                        messages: info.state.messages,
                        bytes: info.state.bytes,
                        last_sequence: info.state.last_sequence,
                    },
                }))
            }
            Err(err) => match err.kind() {
                GetStreamErrorKind::JetStream(js) if js.error_code() == ErrorCode::STREAM_NOT_FOUND => Ok(None),
                _ => Err(BrokerError::Transport(err.to_string())),
            },
        }
    }

    async fn create_stream(&self, descriptor: &LogDescriptor) -> Result<LogDescriptor, BrokerError> {
        debug!(log = %descriptor.name, subjects = ?descriptor.subjects, "Creating JetStream stream");

        match self.context.create_stream(config_from_descriptor(descriptor)).await {
            Ok(stream) => Ok(descriptor_from_config(&stream.cached_info().config)),
            Err(err) => match err.kind() {
                CreateStreamErrorKind::JetStream(js) if js.error_code() == ErrorCode::STREAM_NAME_EXIST => {
                    Err(BrokerError::AlreadyExists(descriptor.name.clone()))
                }
                CreateStreamErrorKind::JetStream(js) => Err(BrokerError::Rejected(js.to_string())),
                _ => Err(BrokerError::Transport(err.to_string())),
            },
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishAcknowledgment, BrokerError> {
        let pending = self
            .context
            .publish(subject.to_string(), payload)
            .await
            .map_err(map_publish_error)?;

        let ack = pending.await.map_err(map_publish_error)?;

        Ok(PublishAcknowledgment {
            log_name: ack.stream,
            sequence_number: ack.sequence,
            duplicate: ack.duplicate,
        })
    }
}

fn map_publish_error(err: jetstream::context::PublishError) -> BrokerError {
    match err.kind() {
        PublishErrorKind::TimedOut => BrokerError::Timeout,
        PublishErrorKind::StreamNotFound => BrokerError::NoStreamForSubject(err.to_string()),
        PublishErrorKind::BrokenPipe => BrokerError::Unavailable(err.to_string()),
        _ => BrokerError::Transport(err.to_string()),
    }
}

fn config_from_descriptor(descriptor: &LogDescriptor) -> stream::Config {
    stream::Config {
        name: descriptor.name.clone(),
        subjects: descriptor.subjects.clone(),
        retention: match descriptor.retention {
            RetentionPolicy::Limits => stream::RetentionPolicy::Limits,
            RetentionPolicy::Interest => stream::RetentionPolicy::Interest,
            RetentionPolicy::WorkQueue => stream::RetentionPolicy::WorkQueue,
        },
        max_age: descriptor.max_age,
        storage: match descriptor.storage {
            StorageClass::File => stream::StorageType::File,
            StorageClass::Memory => stream::StorageType::Memory,
        },
        num_replicas: descriptor.replicas,
        max_bytes: descriptor.max_bytes,
        ..Default::default()
    }
}

fn descriptor_from_config(config: &stream::Config) -> LogDescriptor {
    LogDescriptor {
        name: config.name.clone(),
        subjects: config.subjects.clone(),
        retention: match config.retention {
            stream::RetentionPolicy::Limits => RetentionPolicy::Limits,
            stream::RetentionPolicy::Interest => RetentionPolicy::Interest,
            stream::RetentionPolicy::WorkQueue => RetentionPolicy::WorkQueue,
        },
        max_age: config.max_age,
        storage: match config.storage {
            stream::StorageType::File => StorageClass::File,
            stream::StorageType::Memory => StorageClass::Memory,
        },
        replicas: config.num_replicas,
        max_bytes: config.max_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_carries_policy() {
        let config = config_from_descriptor(&LogDescriptor::default());

        assert_eq!(config.name, "Temperatures");
        assert_eq!(config.subjects, vec!["telemetry.sensors.>".to_string()]);
        assert_eq!(config.retention, stream::RetentionPolicy::Limits);
        assert_eq!(config.storage, stream::StorageType::File);
        assert_eq!(config.max_age, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.num_replicas, 1);
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_descriptor_survives_config_conversion() {
        let mut descriptor = LogDescriptor::new("Alerts", "alerts.>");
        descriptor.storage = StorageClass::Memory;
        descriptor.retention = RetentionPolicy::WorkQueue;

        assert_eq!(descriptor_from_config(&config_from_descriptor(&descriptor)), descriptor);
    }
}
