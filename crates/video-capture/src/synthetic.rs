//! Deterministic frame generator backing `stub://` capture URIs.

use chrono::Utc;

use crate::types::{CaptureError, Frame};

/// How often the `stub://flaky` variant reports a transient miss.
const FLAKY_PERIOD: u64 = 3;

/// In-process frame source. Every byte of a frame is a pure function of the
/// frame counter, so tests can verify that a frame was produced by exactly
/// one read (no interleaving of two generations).
pub(crate) struct SyntheticSource {
    width: u32,
    height: u32,
    frames: u64,
    fail_every: Option<u64>,
}

impl SyntheticSource {
    pub(crate) fn new(uri: &str, target_size: (u32, u32)) -> Self {
        let fail_every = uri.contains("flaky").then_some(FLAKY_PERIOD);
        Self {
            width: target_size.0,
            height: target_size.1,
            frames: 0,
            fail_every,
        }
    }

    pub(crate) fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.frames += 1;
        if let Some(period) = self.fail_every {
            if self.frames % period == 0 {
                return Err(CaptureError::Unavailable);
            }
        }

        Ok(Frame {
            data: generate_pixels(self.width, self.height, self.frames),
            width: self.width,
            height: self.height,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
    }
}

/// Fill an RGB buffer with a gradient shifted by the frame counter.
///
/// `data[i] == (i + shift) % 256` where `shift = data[0]`, which lets a test
/// recompute the whole frame from its first byte.
pub(crate) fn generate_pixels(width: u32, height: u32, frame_counter: u64) -> Vec<u8> {
    let len = width as usize * height as usize * 3;
    let shift = frame_counter.wrapping_mul(31);
    (0..len)
        .map(|i| ((i as u64).wrapping_add(shift) % 256) as u8)
        .collect()
}
