use anyhow::Error;
use image::RgbImage;
use thiserror::Error;

/// Raw RGB frame captured from a video source.
///
/// Pixel data is packed RGB8, row-major. Each frame is owned by whichever
/// pipeline stage currently holds it; stages hand frames on by value.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
}

impl Frame {
    /// Reinterpret the raw buffer as an [`RgbImage`].
    ///
    /// Returns `None` when the buffer length does not match the stated
    /// dimensions.
    pub fn into_image(self) -> Option<RgbImage> {
        RgbImage::from_vec(self.width, self.height, self.data)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    /// Transient miss: the device produced no usable frame this attempt.
    /// Callers back off briefly and retry; the session is not terminated.
    #[error("no frame available from the capture device")]
    Unavailable,
    #[error(transparent)]
    Other(#[from] Error),
}
