//! Single-shot detection for uploaded images.

use std::collections::HashSet;

use detect_core::Detector;
use thiserror::Error;
use tracing::debug;

use crate::detection_log::DetectionLog;

#[derive(Debug, Error)]
pub enum UploadError {
    /// The uploaded bytes do not decode as an image. Mapped to a client
    /// error, never a server error, and never retried.
    #[error("invalid image")]
    InvalidImage,
    #[error("detector failure: {0}")]
    Detection(#[source] anyhow::Error),
}

/// Decode `bytes`, run the detector once, merge the distinct labels into the
/// shared log, and return the labels seen in this image alone.
///
/// Decoding is rejected at the boundary: undecodable input never reaches the
/// detector and never touches the log.
pub fn detect_labels(
    detector: &dyn Detector,
    log: &DetectionLog,
    bytes: &[u8],
) -> Result<HashSet<String>, UploadError> {
    let image = image::load_from_memory(bytes)
        .map_err(|_| UploadError::InvalidImage)?
        .to_rgb8();

    let detections = detector.detect(&image).map_err(UploadError::Detection)?;
    let labels: HashSet<String> = detections
        .into_iter()
        .map(|detection| detection.label)
        .collect();

    debug!(
        "upload: {}x{} image, {} distinct label(s)",
        image.width(),
        image.height(),
        labels.len()
    );
    log.add_labels(labels.iter().cloned());
    Ok(labels)
}
