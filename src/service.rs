//! HTTP surface for readings.
//!
//! Serves generated readings and accepts readings posted by clients. The
//! service only echoes what it receives; it never writes to the durable log.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::generator::{ReadingGenerator, SensorReading, TemperatureBand, CELSIUS};

const WELCOME_MESSAGE: &str = "Welcome to the sensor telemetry ingestion service!";

/// Seconds from the Unix epoch to 0001-01-01T00:00:00Z, the zero instant.
const ZERO_INSTANT_SECS: i64 = -62_135_596_800;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    generator: Arc<ReadingGenerator>,
    allow_generate: bool,
}

impl AppState {
    /// `allow_generate` controls whether `GET /temperature` serves readings.
    pub fn new(generator: Arc<ReadingGenerator>, allow_generate: bool) -> Self {
        Self {
            generator,
            allow_generate,
        }
    }
}

/// Build the service router.
///
/// Every path other than `/temperature` gets the welcome body, echoing the
/// requested path.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/temperature",
            get(handle_generate)
                .post(handle_ingest)
                .fallback(handle_method_not_allowed),
        )
        .fallback(handle_root)
        .with_state(state)
}

/// A client request could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum RequestValidationError {
    #[error("Invalid JSON payload")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl RequestValidationError {
    fn status(&self) -> StatusCode {
        match self {
            RequestValidationError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            RequestValidationError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for RequestValidationError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct WelcomeBody {
    message: &'static str,
    timestamp: DateTime<Utc>,
    path: String,
}

/// Reading as accepted from clients.
///
/// Every field may be left out; missing fields take their zero value and the
/// unit defaults to celsius. Fields of the wrong type are rejected.
#[derive(Deserialize)]
struct IncomingReading {
    #[serde(default)]
    sensor_id: String,
    #[serde(default)]
    temperature: f64,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    location: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct Classification {
    band: TemperatureBand,
    description: String,
}

#[derive(Serialize)]
struct IngestBody {
    status: &'static str,
    message: &'static str,
    data: SensorReading,
    classification: Classification,
}

async fn handle_root(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    Json(WelcomeBody {
        message: WELCOME_MESSAGE,
        timestamp: Utc::now(),
        path: uri.path().to_string(),
    })
}

async fn handle_generate(State(state): State<AppState>) -> Result<Json<SensorReading>, RequestValidationError> {
    if !state.allow_generate {
        return Err(RequestValidationError::MethodNotAllowed);
    }

    let reading = state.generator.generate();
    debug!(
        sensor_id = %reading.sensor_id,
        temperature = format_args!("{:.1}", reading.temperature),
        "Served generated reading"
    );
    Ok(Json(reading))
}

async fn handle_ingest(body: Bytes) -> Result<Json<IngestBody>, RequestValidationError> {
    let incoming: IncomingReading = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Rejected reading payload");
        RequestValidationError::InvalidJson(e)
    })?;

    let reading = SensorReading {
        sensor_id: incoming.sensor_id,
        temperature: incoming.temperature,
        unit: incoming.unit.unwrap_or_else(|| CELSIUS.to_string()),
        location: incoming.location,
        timestamp: received_at(incoming.timestamp, Utc::now()),
    };

    info!(
        sensor_id = %reading.sensor_id,
        location = %reading.location,
        temperature = format_args!("{:.1}", reading.temperature),
        "Received reading"
    );

    let classification = Classification {
        band: reading.band(),
        description: TemperatureBand::describe(reading.temperature),
    };

    Ok(Json(IngestBody {
        status: "success",
        message: "Temperature data received",
        data: reading,
        classification,
    }))
}

async fn handle_method_not_allowed() -> RequestValidationError {
    RequestValidationError::MethodNotAllowed
}

/// Missing timestamps and the zero instant are replaced by the receipt time.
fn received_at(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match timestamp {
        Some(ts) if !is_zero_instant(&ts) => ts,
        _ => now,
    }
}

fn is_zero_instant(ts: &DateTime<Utc>) -> bool {
    ts.timestamp() == ZERO_INSTANT_SECS && ts.timestamp_subsec_nanos() == 0
}
