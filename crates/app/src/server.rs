//! Actix Web server exposing the live stream and detection APIs.
//!
//! Routes:
//! - `GET /` informational pointer at the stream.
//! - `GET /video?width=&height=` live multipart MJPEG stream.
//! - `GET /detections` snapshot of every label seen since startup.
//! - `POST /upload` single-shot detection on a binary image body.
//! - `GET /metrics` Prometheus exposition.

use actix_web::{http::header, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::data::{
    AppState, DetectionsResponse, ErrorResponse, MessageResponse, UploadResponse,
};
use crate::session::{StreamQuery, StreamSession};
use crate::telemetry;
use crate::upload::{detect_labels, UploadError};

/// Upload bodies larger than this are rejected by the extractor.
const UPLOAD_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Register every route. Shared between `run` and the integration tests so
/// both drive the same router.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(UPLOAD_LIMIT_BYTES))
        .route("/", web::get().to(index_handler))
        .route("/video", web::get().to(video_handler))
        .route("/detections", web::get().to(detections_handler))
        .route("/upload", web::post().to(upload_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Run the HTTP server until shutdown.
///
/// Blocks the calling thread. Actix handles SIGINT itself; once the server
/// future resolves the caller drops the shared state and the capture device
/// is released with it.
pub fn run(config: &AppConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.bind_addr, config.port);
    actix_web::rt::System::new().block_on(async move {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure)
        })
        .bind(addr.clone())
        .with_context(|| format!("failed to bind {addr}"))?;

        info!("listening on http://{addr}");
        server.run().await.context("HTTP server failed")
    })
}

async fn index_handler() -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse {
        message: "Go to /video?width=640&height=480 for stream",
    })
}

/// Open a live stream session for this connection.
async fn video_handler(query: web::Query<StreamQuery>, state: web::Data<AppState>) -> HttpResponse {
    let session = StreamSession::new(state.get_ref(), &query);
    let (width, height) = session.dimensions();
    debug!("stream session opened at {width}x{height}");
    metrics::counter!("stream_sessions_total").increment(1);

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(session.into_stream())
}

/// Return the accumulated label set as JSON.
async fn detections_handler(state: web::Data<AppState>) -> HttpResponse {
    let detected_objects: Vec<String> = state.log.snapshot().into_iter().collect();
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .json(DetectionsResponse { detected_objects })
}

/// Run detection once on an uploaded image.
async fn upload_handler(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    metrics::counter!("upload_requests_total").increment(1);
    let detector = state.detector.clone();
    let log = state.log.clone();

    match web::block(move || detect_labels(detector.as_ref(), &log, &body)).await {
        Ok(Ok(labels)) => HttpResponse::Ok()
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .json(UploadResponse {
                detected: labels.into_iter().collect(),
            }),
        Ok(Err(UploadError::InvalidImage)) => HttpResponse::BadRequest()
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .json(ErrorResponse {
                error: "Invalid image".to_string(),
            }),
        Ok(Err(UploadError::Detection(err))) => {
            error!("upload detection failed: {err:?}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "detection failed".to_string(),
            })
        }
        Err(err) => {
            error!("upload worker pool unavailable: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Render the Prometheus registry.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().finish(),
    }
}
