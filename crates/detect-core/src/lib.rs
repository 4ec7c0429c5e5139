//! Detection types and model backends for the lookout service.
//!
//! The service treats the model as an opaque capability: hand it an RGB
//! image, get back a list of boxed, labelled, scored detections. The
//! [`Detector`] trait is that seam; [`OnnxDetector`] is the production
//! backend and tests substitute stubs.

pub mod labels;
pub mod onnx;

use anyhow::Result;
use image::RgbImage;

pub use onnx::OnnxDetector;

/// Single detection returned by a detector.
///
/// `bbox` is `[x1, y1, x2, y2]` in the pixel coordinates of the image the
/// detector was given. Detections are produced fresh per inference call and
/// never persisted.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub label: String,
    pub confidence: f32,
}

/// Object-detection capability.
pub trait Detector: Send + Sync {
    /// Run inference on one RGB frame.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}
