use std::sync::Arc;

use detect_core::Detector;
use serde::Serialize;
use video_capture::CaptureSource;

use crate::detection_log::DetectionLog;

/// Shared state backing HTTP handlers.
///
/// Built once by the composition root and cloned into every worker; all
/// fields are cheap handles onto process-wide resources.
#[derive(Clone)]
pub struct AppState {
    pub capture: Arc<CaptureSource>,
    pub detector: Arc<dyn Detector>,
    pub log: DetectionLog,
    pub jpeg_quality: u8,
}

#[derive(Serialize)]
pub struct DetectionsResponse {
    pub detected_objects: Vec<String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub detected: Vec<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
