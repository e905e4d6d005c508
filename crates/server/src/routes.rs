//! HTTP surface: `GET /health` and `POST /scan`.

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use labelscan_ocr::{FailureKind, OcrBackend, ScanPipeline, ScanResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Multipart field carrying the label photo.
pub const IMAGE_FIELD: &str = "image";
pub const NO_IMAGE: &str = "No image provided";
pub const UPLOAD_TOO_LARGE: &str = "Upload exceeds the size limit";

pub type SharedPipeline = Arc<ScanPipeline<Box<dyn OcrBackend>>>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SharedPipeline,
}

impl AppState {
    pub fn new(pipeline: ScanPipeline<Box<dyn OcrBackend>>) -> Self {
        Self { pipeline: Arc::new(pipeline) }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/scan", post(scan))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "OCR Scanner",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// JSON body plus the status code matching the failure kind.
pub struct ScanResponse(pub ScanResult);

impl IntoResponse for ScanResponse {
    fn into_response(self) -> Response {
        let status = match self.0.failure_kind() {
            None => StatusCode::OK,
            Some(kind) if kind.is_client_error() => StatusCode::BAD_REQUEST,
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0)).into_response()
    }
}

async fn scan(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("scan", %request_id);

    async move {
        let started = Instant::now();

        let bytes = match read_image_field(multipart).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("rejected: {NO_IMAGE}");
                return ScanResponse(ScanResult::failure(FailureKind::Input, NO_IMAGE)).into_response();
            }
            Err(UploadError::TooLarge) => {
                info!("rejected: {UPLOAD_TOO_LARGE}");
                let body = ScanResult::failure(FailureKind::Input, UPLOAD_TOO_LARGE);
                return (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response();
            }
            Err(UploadError::Unreadable(message)) => {
                info!(%message, "rejected: unreadable upload");
                return ScanResponse(ScanResult::failure(FailureKind::Input, message)).into_response();
            }
        };
        debug!(bytes = bytes.len(), "received image");

        // Decoding, filtering and OCR are CPU-bound; keep them off the async workers.
        let pipeline = state.pipeline.clone();
        let result = tokio::task::spawn_blocking(move || pipeline.scan(&bytes))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "scan task failed");
                ScanResult::failure(FailureKind::Unexpected, "Internal error while scanning image")
            });

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            ScanResult::Success(report) => info!(
                elapsed_ms,
                device_fields = !report.device.is_empty(),
                shipping_fields = !report.shipping.is_empty(),
                "scan completed"
            ),
            ScanResult::Failure { kind: FailureKind::Input, error } => {
                info!(elapsed_ms, %error, "rejected: invalid image")
            }
            ScanResult::Failure { kind, error } => {
                error!(elapsed_ms, ?kind, %error, "scan failed")
            }
        }

        ScanResponse(result).into_response()
    }
    .instrument(span)
    .await
}

enum UploadError {
    /// The body went past the configured limit while being read.
    TooLarge,
    Unreadable(String),
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge
        } else {
            UploadError::Unreadable(format!("Invalid upload: {}", e.body_text()))
        }
    }
}

/// Bytes of the `image` field, `None` when the request has no such field or is
/// not multipart at all.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<Bytes>, UploadError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            debug!(%rejection, "not a multipart request");
            return Ok(None);
        }
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return Ok(Some(field.bytes().await?));
        }
    }
    Ok(None)
}
