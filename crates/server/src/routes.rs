use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use expiry_ocr::{ExpiryPipeline, OcrBackend, PipelineError};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub type SharedPipeline = Arc<ExpiryPipeline<Box<dyn OcrBackend>>>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SharedPipeline,
}

impl AppState {
    pub fn new(pipeline: ExpiryPipeline<Box<dyn OcrBackend>>) -> Self {
        Self { pipeline: Arc::new(pipeline) }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(upload))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Response bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ExpiryResponse {
    pub expiry_date: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NoFileUploaded,
    NoSelectedFile,
    UnreadableUpload(String),
    UndecodableImage(String),
    NoExpiryDate,
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        if e.is_client_error() {
            ApiError::UndecodableImage(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoFileUploaded => (StatusCode::BAD_REQUEST, "No file uploaded"),
            ApiError::NoSelectedFile => (StatusCode::BAD_REQUEST, "No selected file"),
            ApiError::UnreadableUpload(detail) => {
                tracing::warn!("Failed to read upload: {detail}");
                (StatusCode::BAD_REQUEST, "Failed to read upload")
            }
            ApiError::UndecodableImage(detail) => {
                tracing::warn!("Failed to decode image: {detail}");
                (StatusCode::BAD_REQUEST, "Failed to process image")
            }
            ApiError::NoExpiryDate => (StatusCode::NOT_FOUND, "No expiry date found"),
            ApiError::Internal(detail) => {
                tracing::error!("Error processing image: {detail}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(ErrorResponse { error: message.to_string() })).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExpiryResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Upload is not multipart: {e}");
        ApiError::NoFileUploaded
    })?;

    let (filename, data) = read_file_field(&mut multipart).await?;
    tracing::info!(%filename, size = data.len(), "Received file");

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.process_bytes(&data))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let expiry = result.expiry.ok_or(ApiError::NoExpiryDate)?;
    Ok(Json(ExpiryResponse { expiry_date: expiry.into_string() }))
}

/// Pull the `file` field out of the form.
///
/// A part without a `filename` attribute is not a file upload; an empty one
/// means the browser's picker was left blank.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::UnreadableUpload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = match field.file_name() {
            None => return Err(ApiError::NoFileUploaded),
            Some("") => return Err(ApiError::NoSelectedFile),
            Some(name) => name.to_string(),
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::UnreadableUpload(e.to_string()))?;
        return Ok((filename, data));
    }
    Err(ApiError::NoFileUploaded)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use expiry_ocr::{MockRecognizer, OcrConfig, OcrError};
    use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-LABEL-BOUNDARY";

    struct BrokenEngine;

    impl OcrBackend for BrokenEngine {
        fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
            Err(OcrError::NotAvailable { command: "tesseract".into() })
        }
    }

    fn app_with(backend: Box<dyn OcrBackend>) -> Router {
        let config = OcrConfig::default().without_debug_image();
        router(AppState::new(ExpiryPipeline::new(backend, config)), 1024 * 1024)
    }

    fn app(ocr_text: &str) -> Router {
        app_with(Box::new(MockRecognizer::new(ocr_text)))
    }

    fn label_png() -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_fn(16, 8, |x, _| {
            if x % 4 == 0 { Rgb([10, 10, 10]) } else { Rgb([240, 240, 240]) }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_text_field(field: &str, value: &str) -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
        )
        .into_bytes()
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn upload_returns_expiry_date() {
        let req = upload_request(multipart_body("file", "label.png", &label_png()));
        let (status, json) = send(app("Batch 221 E:15/08/26 Lot9"), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["expiry_date"], "15/08/26");
    }

    #[tokio::test]
    async fn upload_without_date_is_not_found() {
        let req = upload_request(multipart_body("file", "label.png", &label_png()));
        let (status, json) = send(app("Made in Country 123456"), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "No expiry date found");
    }

    #[tokio::test]
    async fn undecodable_upload_is_bad_request() {
        let req = upload_request(multipart_body("file", "label.png", b"not an image"));
        let (status, json) = send(app("EXP 1-9-2026"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Failed to process image");
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let req = upload_request(multipart_body("photo", "label.png", &label_png()));
        let (status, json) = send(app("EXP 1-9-2026"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn non_multipart_body_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, json) = send(app("EXP 1-9-2026"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn blank_filename_is_bad_request() {
        let req = upload_request(multipart_body("file", "", &label_png()));
        let (status, json) = send(app("EXP 1-9-2026"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No selected file");
    }

    #[tokio::test]
    async fn file_part_without_filename_is_no_file_uploaded() {
        let req = upload_request(multipart_text_field("file", "EXP 1-9-2026"));
        let (status, json) = send(app("EXP 1-9-2026"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn engine_failure_is_internal_error() {
        let req = upload_request(multipart_body("file", "label.png", &label_png()));
        let (status, json) = send(app_with(Box::new(BrokenEngine)), req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn bare_options_is_answered_by_cors_layer() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let resp = app("").oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/upload")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app("").oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, json) = send(app(""), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
