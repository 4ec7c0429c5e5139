//! Per-connection streaming pipeline.
//!
//! A [`StreamSession`] is created for each `/video` request and turned into
//! the multipart response body. The generator performs one full pipeline
//! iteration per chunk and suspends at the yield point, so a slow consumer
//! throttles the producer instead of growing a buffer. Dropping the stream
//! (client disconnect) ends the session; the shared capture source stays
//! open for everyone else.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::{self, Bytes};
use async_stream::stream;
use detect_core::Detector;
use futures_core::Stream;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use video_capture::{CaptureError, CaptureSource, Frame};

use crate::annotate::annotate_frame;
use crate::data::AppState;
use crate::detection_log::DetectionLog;
use crate::encode::{encode_jpeg, EncodeError};

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Bounds on client-requested output dimensions. Requests outside the range
/// are clamped rather than rejected.
const MIN_DIMENSION: u32 = 16;
const MAX_WIDTH: u32 = 1920;
const MAX_HEIGHT: u32 = 1080;

/// Pause before retrying after a transient capture miss.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Untrusted stream parameters. Kept as raw strings so an unparsable value
/// falls back to the default instead of failing the whole request.
#[derive(Deserialize)]
pub struct StreamQuery {
    width: Option<String>,
    height: Option<String>,
}

/// Processing failures that end the session. Unlike a capture miss these are
/// never retried: the iteration is abandoned and the stream closed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("frame buffer does not match its dimensions")]
    BadFrame,
    #[error("detector failure: {0}")]
    Detection(#[source] anyhow::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One live-video connection: the requested output size plus handles onto
/// the shared pipeline resources.
pub struct StreamSession {
    width: u32,
    height: u32,
    jpeg_quality: u8,
    capture: Arc<CaptureSource>,
    detector: Arc<dyn Detector>,
    log: DetectionLog,
}

impl StreamSession {
    pub fn new(state: &AppState, query: &StreamQuery) -> Self {
        Self {
            width: parse_dimension(query.width.as_deref(), DEFAULT_WIDTH, MAX_WIDTH),
            height: parse_dimension(query.height.as_deref(), DEFAULT_HEIGHT, MAX_HEIGHT),
            jpeg_quality: state.jpeg_quality,
            capture: state.capture.clone(),
            detector: state.detector.clone(),
            log: state.log.clone(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Turn the session into the multipart body stream.
    ///
    /// Chunks are emitted in acquisition order; frames are only skipped when
    /// a capture attempt came back empty. Labels reach the shared log before
    /// the chunk is yielded, so the log is updated even when the client goes
    /// away mid-write.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
        stream! {
            let mut chunks: u64 = 0;
            loop {
                let capture = self.capture.clone();
                let acquired = match web::block(move || capture.acquire_frame()).await {
                    Ok(result) => result,
                    Err(err) => {
                        error!("capture worker pool unavailable: {err}");
                        break;
                    }
                };
                let frame = match acquired {
                    Ok(frame) => frame,
                    Err(CaptureError::Unavailable) => {
                        metrics::counter!("stream_capture_retries_total").increment(1);
                        actix_web::rt::time::sleep(CAPTURE_RETRY_DELAY).await;
                        continue;
                    }
                    Err(err) => {
                        error!("capture failed, closing stream: {err}");
                        break;
                    }
                };

                let detector = self.detector.clone();
                let (width, height, quality) = (self.width, self.height, self.jpeg_quality);
                let processed = match web::block(move || {
                    process_frame(frame, width, height, quality, detector.as_ref())
                })
                .await
                {
                    Ok(result) => result,
                    Err(err) => {
                        error!("processing worker pool unavailable: {err}");
                        break;
                    }
                };

                match processed {
                    Ok((jpeg, labels)) => {
                        self.log.add_labels(labels);
                        chunks = chunks.wrapping_add(1);
                        metrics::counter!("stream_chunks_total").increment(1);
                        if chunks % 30 == 0 {
                            debug!("stream heartbeat: chunk #{chunks} at {width}x{height}");
                        }
                        yield Ok::<Bytes, actix_web::Error>(multipart_chunk(&jpeg));
                    }
                    Err(err) => {
                        metrics::counter!("stream_processing_errors_total").increment(1);
                        error!("frame processing failed, closing stream: {err}");
                        break;
                    }
                }
            }
        }
    }
}

/// Parse one untrusted dimension parameter, falling back and clamping.
fn parse_dimension(raw: Option<&str>, fallback: u32, max: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|&value| value > 0)
        .map(|value| value.clamp(MIN_DIMENSION, max))
        .unwrap_or(fallback)
}

/// One full pipeline iteration, run on the blocking pool: resize to the
/// session's dimensions, detect, annotate, encode.
fn process_frame(
    frame: Frame,
    width: u32,
    height: u32,
    quality: u8,
    detector: &dyn Detector,
) -> Result<(Vec<u8>, HashSet<String>), ProcessError> {
    let image = frame.into_image().ok_or(ProcessError::BadFrame)?;
    let image = if image.dimensions() == (width, height) {
        image
    } else {
        image::imageops::resize(&image, width, height, image::imageops::FilterType::Triangle)
    };

    let detections = detector.detect(&image).map_err(ProcessError::Detection)?;
    let (annotated, labels) = annotate_frame(&image, &detections);
    let jpeg = encode_jpeg(&annotated, quality)?;
    Ok((jpeg, labels))
}

/// Frame one encoded image as a `multipart/x-mixed-replace` part.
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 48);
    payload.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}
