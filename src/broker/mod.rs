//! Durable log transport.
//!
//! [`StreamBroker`] is the seam between the publish/provision protocol and the
//! broker that actually stores records. The broker owns log identity, name
//! uniqueness, and sequence assignment; callers only hold descriptors.

mod jetstream;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use jetstream::{connect_client, JetStreamBroker};
pub use memory::{InMemoryBroker, StoredRecord};

/// Default durable log name.
pub const DEFAULT_LOG_NAME: &str = "Temperatures";

/// Default subject filter accepted by the log.
pub const DEFAULT_SUBJECT_FILTER: &str = "telemetry.sensors.>";

/// Default subject temperature readings are published on.
pub const DEFAULT_SUBJECT: &str = "telemetry.sensors.temperature";

/// Default retention age (7 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default size limit (10 MiB).
pub const DEFAULT_MAX_BYTES: i64 = 10 * 1024 * 1024;

/// How records are discarded from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Bounded by size and age limits
    Limits,
    /// Kept while consumers are interested
    Interest,
    /// Removed once acknowledged by a consumer
    WorkQueue,
}

/// Where the log keeps its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// Durable on disk
    File,
    /// Memory only, lost on broker restart
    Memory,
}

/// Identity and policy of a durable log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDescriptor {
    /// Unique log name
    pub name: String,

    /// Subject filters routed into the log
    pub subjects: Vec<String>,

    pub retention: RetentionPolicy,

    /// Records older than this are discarded
    pub max_age: Duration,

    pub storage: StorageClass,

    pub replicas: usize,

    /// Size limit of the whole log in bytes
    pub max_bytes: i64,
}

impl LogDescriptor {
    /// A size/age-bounded, disk-backed, single replica log.
    pub fn new(name: impl Into<String>, subject_filter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subjects: vec![subject_filter.into()],
            retention: RetentionPolicy::Limits,
            max_age: DEFAULT_MAX_AGE,
            storage: StorageClass::File,
            replicas: 1,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Whether a publish on `subject` is routed into this log.
    pub fn accepts(&self, subject: &str) -> bool {
        crate::subject::matches_any(&self.subjects, subject)
    }
}

impl Default for LogDescriptor {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_NAME, DEFAULT_SUBJECT_FILTER)
    }
}

/// Point-in-time counters of a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogState {
    pub messages: u64,
    pub bytes: u64,
    pub last_sequence: u64,
}

/// A log as returned by a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LogInfo {
    pub descriptor: LogDescriptor,
    pub state: LogState,
}

/// Broker confirmation that a record was durably stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAcknowledgment {
    /// Log that stored the record
    pub log_name: String,

    /// Sequence assigned by the log
    pub sequence_number: u64,

    /// The broker recognised the record as a duplicate
    pub duplicate: bool,
}

/// Errors reported by a broker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("log '{0}' not found")]
    NotFound(String),

    #[error("log '{0}' already exists")]
    AlreadyExists(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for acknowledgment")]
    Timeout,

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("no log accepts subject '{0}'")]
    NoStreamForSubject(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Transport to a broker that manages durable, ordered logs.
///
/// Implementations must allow many concurrent in-flight publishes through a
/// shared reference.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Look up a log by name. `Ok(None)` means the log does not exist.
    async fn stream_info(&self, name: &str) -> Result<Option<LogInfo>, BrokerError>;

    /// Create a log. Fails with [`BrokerError::AlreadyExists`] if the name is taken.
    async fn create_stream(&self, descriptor: &LogDescriptor) -> Result<LogDescriptor, BrokerError>;

    /// Publish a payload and wait until the broker confirms it is stored.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishAcknowledgment, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptor() {
        let descriptor = LogDescriptor::default();
        assert_eq!(descriptor.name, "Temperatures");
        assert_eq!(descriptor.subjects, vec!["telemetry.sensors.>".to_string()]);
        assert_eq!(descriptor.retention, RetentionPolicy::Limits);
        assert_eq!(descriptor.max_age, Duration::from_secs(604_800));
        assert_eq!(descriptor.storage, StorageClass::File);
        assert_eq!(descriptor.replicas, 1);
        assert_eq!(descriptor.max_bytes, 10_485_760);
    }

    #[test]
    fn test_descriptor_accepts_subject() {
        let descriptor = LogDescriptor::default();
        assert!(descriptor.accepts(DEFAULT_SUBJECT));
        assert!(!descriptor.accepts("billing.invoices.created"));
    }

    #[test]
    fn test_broker_error_display() {
        assert_eq!(
            format!("{}", BrokerError::AlreadyExists("Temperatures".to_string())),
            "log 'Temperatures' already exists"
        );
        assert_eq!(format!("{}", BrokerError::Timeout), "timed out waiting for acknowledgment");
    }
}
