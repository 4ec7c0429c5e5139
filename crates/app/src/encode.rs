//! JPEG encode stage.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("refusing to encode a zero-sized frame")]
    EmptyFrame,
    #[error("jpeg encode failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Compress an annotated frame into a JPEG buffer.
///
/// Quality is clamped to 1..=100. Failures are non-retryable: the stream
/// session treats them as fatal for the session, never for the process.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EncodeError::EmptyFrame);
    }

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_jpeg_with_the_expected_magic() {
        let image = RgbImage::from_pixel(32, 24, image::Rgb([40, 80, 120]));
        let jpeg = encode_jpeg(&image, 85).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn zero_sized_frames_are_a_typed_error() {
        let image = RgbImage::new(0, 0);
        assert!(matches!(
            encode_jpeg(&image, 85),
            Err(EncodeError::EmptyFrame)
        ));
    }

    #[test]
    fn out_of_range_quality_is_clamped_not_rejected() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        assert!(encode_jpeg(&image, 0).is_ok());
        assert!(encode_jpeg(&image, 255).is_ok());
    }
}
