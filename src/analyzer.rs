//! Request/reply temperature analysis.
//!
//! Requests carry a change-stream event whose `fullDocument` is a stored
//! reading. The reply classifies its temperature. Failures are answered with
//! an empty body and the NATS service error headers, so callers see a code
//! and a description instead of a timeout.

use async_nats::{Client, HeaderMap, Message};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::BrokerError;
use crate::generator::TemperatureBand;

/// Name the analyzer reports to NATS.
pub const SERVICE_NAME: &str = "temperature-analyzer";

pub const SERVICE_VERSION: &str = "1.0.0";

/// Queue group shared by analyzer instances; each request is handled once.
pub const QUEUE_GROUP: &str = "q";

const ERROR_HEADER: &str = "Nats-Service-Error";
const ERROR_CODE_HEADER: &str = "Nats-Service-Error-Code";

/// Why a request could not be analyzed.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Expected MongoDB change stream event")]
    NotChangeEvent,

    #[error("Missing temperature field in document")]
    MissingTemperature,

    /// The event decoded but its document is unusable; the detail is logged only
    #[error("Internal error")]
    Internal(String),
}

impl AnalysisError {
    /// Status code sent in the error header.
    pub fn code(&self) -> u16 {
        match self {
            AnalysisError::Internal(_) => 500,
            _ => 400,
        }
    }
}

/// Classification sent back to the requester.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub status: TemperatureBand,
    pub temperature: f64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A classified change event.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedEvent {
    /// The event's `operationType`, e.g. "insert"
    pub operation: String,
    pub analysis: Analysis,
}

/// Decode a change event and classify the reading it carries.
pub fn analyze(payload: &[u8]) -> Result<AnalyzedEvent, AnalysisError> {
    let event: Value = serde_json::from_slice(payload).map_err(AnalysisError::InvalidJson)?;

    let (operation, document) = match (event.get("operationType"), event.get("fullDocument")) {
        (Some(operation), Some(document)) => (operation, document),
        _ => return Err(AnalysisError::NotChangeEvent),
    };

    let document = document
        .as_object()
        .ok_or_else(|| AnalysisError::Internal(format!("fullDocument is not an object: {}", document)))?;

    let temperature = match document.get("temperature") {
        None | Some(Value::Null) => return Err(AnalysisError::MissingTemperature),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| AnalysisError::Internal(format!("temperature {} is not a number", value)))?,
    };

    let text_field = |name: &str| {
        document
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(AnalyzedEvent {
        operation: operation.as_str().map(str::to_string).unwrap_or_else(|| operation.to_string()),
        analysis: Analysis {
            status: TemperatureBand::classify(temperature),
            temperature,
            description: TemperatureBand::describe(temperature),
            sensor_id: text_field("sensor_id"),
            location: text_field("location"),
        },
    })
}

/// A reply ready to publish.
#[derive(Debug)]
pub struct Reply {
    /// Present only for error replies
    pub headers: Option<HeaderMap>,
    pub payload: Bytes,
}

/// Build the reply for a request payload.
pub fn reply_for(payload: &[u8]) -> Reply {
    let result = analyze(payload).and_then(|event| {
        let body = serde_json::to_vec(&event.analysis)
            .map_err(|e| AnalysisError::Internal(format!("cannot encode reply: {}", e)))?;
        Ok((event, body))
    });

    match result {
        Ok((event, body)) => {
            info!(
                operation = %event.operation,
                temperature = format_args!("{:.1}", event.analysis.temperature),
                status = %event.analysis.status,
                sensor_id = event.analysis.sensor_id.as_deref().unwrap_or("N/A"),
                "Processed change stream event"
            );
            Reply {
                headers: None,
                payload: Bytes::from(body),
            }
        }
        Err(e) => {
            match &e {
                AnalysisError::InvalidJson(source) => warn!(error = %source, "Error parsing JSON"),
                AnalysisError::Internal(detail) => warn!(error = %detail, "Error processing request"),
                _ => warn!(error = %e, "Rejected request"),
            }
            Reply {
                headers: Some(error_headers(&e)),
                payload: Bytes::new(),
            }
        }
    }
}

fn error_headers(err: &AnalysisError) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ERROR_HEADER, err.to_string().as_str());
    headers.insert(ERROR_CODE_HEADER, err.code().to_string().as_str());
    headers
}

/// Answer requests on `subject` until `cancel` fires.
///
/// Returns the number of requests handled.
pub async fn serve(client: Client, subject: &str, cancel: CancellationToken) -> Result<u64, BrokerError> {
    let mut requests = client
        .queue_subscribe(subject.to_string(), QUEUE_GROUP.to_string())
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?;

    info!(
        subject = %subject,
        service = SERVICE_NAME,
        version = SERVICE_VERSION,
        "Temperature analysis service started, ready to process requests"
    );

    let mut handled = 0;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            next = requests.next() => match next {
                Some(message) => {
                    respond(&client, message).await;
                    handled += 1;
                }
                None => {
                    warn!(subject = %subject, "Request subscription closed");
                    break;
                }
            },
        }
    }

    if let Err(e) = requests.unsubscribe().await {
        debug!(error = %e, "Unsubscribe failed");
    }
    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush pending replies");
    }

    info!(handled, "Temperature analysis service stopped");
    Ok(handled)
}

async fn respond(client: &Client, message: Message) {
    let Some(reply_to) = message.reply else {
        debug!(subject = %message.subject, "Ignoring request without a reply subject");
        return;
    };

    let reply = reply_for(&message.payload);
    let sent = match reply.headers {
        Some(headers) => client.publish_with_headers(reply_to, headers, reply.payload).await,
        None => client.publish(reply_to, reply.payload).await,
    };

    if let Err(e) = sent {
        warn!(error = %e, "Failed to send reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(reply: &'a Reply, name: &str) -> Option<&'a str> {
        reply.headers.as_ref()?.get(name).map(|v| v.as_str())
    }

    #[test]
    fn test_insert_event_is_classified() {
        let payload = br#"{
            "operationType": "insert",
            "fullDocument": {
                "sensor_id": "TEMP-003",
                "temperature": 7.25,
                "location": "Warehouse"
            }
        }"#;

        let event = analyze(payload).unwrap();
        assert_eq!(event.operation, "insert");
        assert_eq!(event.analysis.status, TemperatureBand::Cold);
        assert_eq!(event.analysis.temperature, 7.25);
        assert_eq!(event.analysis.sensor_id.as_deref(), Some("TEMP-003"));
        assert_eq!(event.analysis.location.as_deref(), Some("Warehouse"));
    }

    #[test]
    fn test_reply_body() {
        let reply = reply_for(br#"{"operationType": "update", "fullDocument": {"temperature": 25, "sensor_id": "TEMP-001"}}"#);

        assert!(reply.headers.is_none());
        let body: Value = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(body["status"], "warm");
        assert_eq!(body["temperature"], 25.0);
        assert_eq!(body["description"], "25.0C is warm");
        assert_eq!(body["sensor_id"], "TEMP-001");
        // Absent optional fields are left out, not null
        assert!(body.get("location").is_none());
    }

    #[test]
    fn test_empty_identifiers_are_omitted() {
        let event = analyze(br#"{"operationType": "insert", "fullDocument": {"temperature": 30.5, "sensor_id": "", "location": null}}"#)
            .unwrap();

        assert_eq!(event.analysis.status, TemperatureBand::Hot);
        assert!(event.analysis.sensor_id.is_none());
        assert!(event.analysis.location.is_none());
    }

    #[test]
    fn test_missing_envelope() {
        let payloads: [&[u8]; 4] = [
            br#"{"temperature": 21.0}"#,
            br#"{"operationType": "insert"}"#,
            br#"{"fullDocument": {"temperature": 21.0}}"#,
            br#"[1, 2, 3]"#,
        ];
        for payload in payloads {
            let reply = reply_for(payload);
            assert!(reply.payload.is_empty());
            assert_eq!(header(&reply, ERROR_CODE_HEADER), Some("400"));
            assert_eq!(header(&reply, ERROR_HEADER), Some("Expected MongoDB change stream event"));
        }
    }

    #[test]
    fn test_missing_temperature() {
        let payloads: [&[u8]; 2] = [
            br#"{"operationType": "insert", "fullDocument": {"sensor_id": "TEMP-001"}}"#,
            br#"{"operationType": "insert", "fullDocument": {"temperature": null}}"#,
        ];
        for payload in payloads {
            let reply = reply_for(payload);
            assert_eq!(header(&reply, ERROR_CODE_HEADER), Some("400"));
            assert_eq!(header(&reply, ERROR_HEADER), Some("Missing temperature field in document"));
        }
    }

    #[test]
    fn test_invalid_json() {
        let reply = reply_for(b"{operationType: insert");

        assert!(reply.payload.is_empty());
        assert_eq!(header(&reply, ERROR_CODE_HEADER), Some("400"));
        assert_eq!(header(&reply, ERROR_HEADER), Some("Invalid JSON"));
    }

    #[test]
    fn test_unusable_document_is_internal_error() {
        let payloads: [&[u8]; 2] = [
            br#"{"operationType": "insert", "fullDocument": {"temperature": "hot"}}"#,
            br#"{"operationType": "delete", "fullDocument": null}"#,
        ];
        for payload in payloads {
            let err = analyze(payload).unwrap_err();
            assert!(matches!(err, AnalysisError::Internal(_)));
            assert_eq!(err.code(), 500);

            let reply = reply_for(payload);
            assert_eq!(header(&reply, ERROR_CODE_HEADER), Some("500"));
            assert_eq!(header(&reply, ERROR_HEADER), Some("Internal error"));
        }
    }
}
