//! Acknowledged publish of a single reading.
//!
//! The gateway holds nothing but a shared broker handle. Each call encodes
//! the reading, submits it, and waits for the broker to confirm durable
//! storage. Failures are reported to the caller; nothing is retried here.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::broker::{BrokerError, LogDescriptor, PublishAcknowledgment, StreamBroker};
use crate::generator::SensorReading;

/// Errors that can occur while publishing a reading.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The reading could not be encoded; nothing was submitted
    #[error("failed to serialize reading: {0}")]
    Serialization(String),

    /// The record was not acknowledged by the log
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Why a submitted record was not acknowledged.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("subject '{subject}' is not covered by log '{log}'")]
    SubjectNotCovered { subject: String, log: String },

    #[error("acknowledged by log '{actual}', expected '{expected}'")]
    WrongLog { expected: String, actual: String },
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        PublishError::Delivery(DeliveryError::Broker(err))
    }
}

/// Encodes readings as JSON and publishes them with acknowledgment.
///
/// Cloning is cheap; clones share the broker connection.
#[derive(Clone)]
pub struct PublishGateway {
    broker: Arc<dyn StreamBroker>,
}

impl PublishGateway {
    pub fn new(broker: Arc<dyn StreamBroker>) -> Self {
        Self { broker }
    }

    /// Publish `reading` on `subject` into `log`.
    ///
    /// Returns only after the broker confirmed the record is stored.
    pub async fn publish(
        &self,
        log: &LogDescriptor,
        subject: &str,
        reading: &SensorReading,
    ) -> Result<PublishAcknowledgment, PublishError> {
        let payload = encode(reading)?;

        if !log.accepts(subject) {
            return Err(DeliveryError::SubjectNotCovered {
                subject: subject.to_string(),
                log: log.name.clone(),
            }
            .into());
        }

        debug!(
            subject = %subject,
            sensor_id = %reading.sensor_id,
            bytes = payload.len(),
            "Submitting reading"
        );

        let ack = self.broker.publish(subject, payload).await?;

        if ack.log_name != log.name {
            return Err(DeliveryError::WrongLog {
                expected: log.name.clone(),
                actual: ack.log_name,
            }
            .into());
        }

        Ok(ack)
    }
}

/// Encode a reading in its wire form.
///
/// JSON has no representation for NaN or infinities, so those are rejected.
pub fn encode(reading: &SensorReading) -> Result<Bytes, PublishError> {
    if !reading.temperature.is_finite() {
        return Err(PublishError::Serialization(format!(
            "temperature {} is not a finite number",
            reading.temperature
        )));
    }

    serde_json::to_vec(reading)
        .map(Bytes::from)
        .map_err(|e| PublishError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, DEFAULT_SUBJECT};

    fn gateway(broker: &Arc<InMemoryBroker>) -> PublishGateway {
        PublishGateway::new(broker.clone())
    }

    fn reading(temperature: f64) -> SensorReading {
        SensorReading::new("TEMP-001", "Server Room", temperature)
    }

    #[tokio::test]
    async fn test_publish_to_existing_log_continues_sequence() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 41));

        let ack = gateway(&broker)
            .publish(&log, DEFAULT_SUBJECT, &reading(99.9))
            .await
            .unwrap();

        assert_eq!(ack.log_name, "Temperatures");
        assert_eq!(ack.sequence_number, 42);
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_monotonic() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 0));
        let gateway = gateway(&broker);

        let mut last = 0;
        for i in 0..50 {
            let ack = gateway
                .publish(&log, DEFAULT_SUBJECT, &reading(i as f64))
                .await
                .unwrap();
            assert!(ack.sequence_number > last);
            last = ack.sequence_number;
        }
    }

    #[tokio::test]
    async fn test_stored_payload_is_wire_json() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 0));
        let original = reading(21.5);

        gateway(&broker).publish(&log, DEFAULT_SUBJECT, &original).await.unwrap();

        let records = broker.records("Temperatures");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, DEFAULT_SUBJECT);

        let value: serde_json::Value = serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(value["sensor_id"], "TEMP-001");
        assert_eq!(value["temperature"], 21.5);
        assert_eq!(value["unit"], "celsius");
        assert_eq!(value["location"], "Server Room");
        assert!(value["timestamp"].is_string());

        let decoded: SensorReading = serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn test_non_finite_temperature_is_not_submitted() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 0));

        let result = gateway(&broker).publish(&log, DEFAULT_SUBJECT, &reading(f64::NAN)).await;

        assert!(matches!(result, Err(PublishError::Serialization(_))));
        assert!(broker.records("Temperatures").is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_delivery_error() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 0));
        broker.fail_next_publishes(1);

        let result = gateway(&broker).publish(&log, DEFAULT_SUBJECT, &reading(20.0)).await;
        assert!(matches!(
            result,
            Err(PublishError::Delivery(DeliveryError::Broker(BrokerError::Transport(_))))
        ));

        // The next publish is unaffected and gets the first sequence
        let ack = gateway(&broker).publish(&log, DEFAULT_SUBJECT, &reading(20.0)).await.unwrap();
        assert_eq!(ack.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_subject_outside_log_filter() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 0));

        let result = gateway(&broker).publish(&log, "billing.invoices", &reading(20.0)).await;
        assert!(matches!(
            result,
            Err(PublishError::Delivery(DeliveryError::SubjectNotCovered { .. }))
        ));
    }

    #[tokio::test]
    async fn test_ack_from_other_log_is_rejected() {
        let expected = LogDescriptor::new("Temperatures", "telemetry.sensors.>");
        // Broker routes the subject into a different log
        let broker = Arc::new(InMemoryBroker::new().with_log(LogDescriptor::new("Everything", "telemetry.>"), 0));

        let result = gateway(&broker).publish(&expected, DEFAULT_SUBJECT, &reading(20.0)).await;
        assert!(matches!(
            result,
            Err(PublishError::Delivery(DeliveryError::WrongLog { .. }))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_publishes_share_gateway() {
        let log = LogDescriptor::default();
        let broker = Arc::new(InMemoryBroker::new().with_log(log.clone(), 0));
        let gateway = gateway(&broker);

        let mut handles = Vec::new();
        for i in 0..20 {
            let gateway = gateway.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                gateway.publish(&log, DEFAULT_SUBJECT, &reading(i as f64)).await
            }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap().unwrap().sequence_number);
        }
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
    }

    #[test]
    fn test_error_display() {
        let err = PublishError::from(BrokerError::Timeout);
        assert_eq!(format!("{}", err), "delivery failed: timed out waiting for acknowledgment");

        let err = PublishError::Serialization("bad".to_string());
        assert_eq!(format!("{}", err), "failed to serialize reading: bad");
    }
}
