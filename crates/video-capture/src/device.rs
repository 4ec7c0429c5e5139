//! V4L2 device backend.
//!
//! The device handle and its mmap buffer stream live in one self-referencing
//! struct so both are released together when the source is dropped. The
//! stream is created once at open time; a failed read of a single frame is
//! reported as [`CaptureError::Unavailable`] and never tears the stream down.

use chrono::Utc;
use ouroboros::self_referencing;
use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::convert::yuyv_to_rgb;
use crate::types::{CaptureError, Frame};

/// Pixel formats the backend can hand out as RGB8, in preference order.
const FOURCC_CANDIDATES: [&[u8; 4]; 3] = [b"MJPG", b"YUYV", b"RGB3"];

const STREAM_BUFFERS: u32 = 4;

pub(crate) struct DeviceSource {
    uri: String,
    state: DeviceState,
    fourcc: FourCC,
    width: u32,
    height: u32,
    frames: u64,
}

#[self_referencing]
struct DeviceState {
    device: Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, Device>,
}

impl DeviceSource {
    /// Open `uri` (a `/dev/videoN` path or a bare index) and negotiate a
    /// pixel format the conversion layer understands.
    pub(crate) fn open(uri: &str, target_size: (u32, u32)) -> Result<Self, CaptureError> {
        let device = open_device(uri)?;
        let format = negotiate_format(&device, uri, target_size)?;

        let fourcc = format.fourcc;
        let (width, height) = (format.width, format.height);
        debug!(
            "capture device {} negotiated {} at {}x{}",
            uri, fourcc, width, height
        );

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
            },
        }
        .try_build()
        .map_err(|err| {
            warn!("failed to map capture buffers on {uri}: {err}");
            CaptureError::Open {
                uri: uri.to_string(),
            }
        })?;

        Ok(Self {
            uri: uri.to_string(),
            state,
            fourcc,
            width,
            height,
            frames: 0,
        })
    }

    /// Read one frame from the device and convert it to packed RGB8.
    pub(crate) fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let uri = self.uri.clone();
        let fourcc = self.fourcc;
        let (width, height) = (self.width, self.height);

        let converted = self.state.with_stream_mut(|stream| {
            let (buf, _meta) = stream.next().map_err(|err| {
                warn!("frame read failed on {uri}: {err}");
                CaptureError::Unavailable
            })?;
            convert_buffer(buf, fourcc, width, height)
        })?;

        self.frames += 1;
        if self.frames % 100 == 0 {
            debug!("{}: {} frames captured", self.uri, self.frames);
        }
        let (data, width, height) = converted;
        Ok(Frame {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
    }
}

/// Decode one device buffer into `(rgb_data, width, height)`.
///
/// Single-frame decode failures are transient: the device keeps running and
/// the caller retries on the next iteration.
fn convert_buffer(
    buf: &[u8],
    fourcc: FourCC,
    width: u32,
    height: u32,
) -> Result<(Vec<u8>, u32, u32), CaptureError> {
    match &fourcc.repr {
        b"MJPG" => {
            let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                .map_err(|err| {
                    warn!("corrupt MJPG frame: {err}");
                    CaptureError::Unavailable
                })?
                .to_rgb8();
            let (w, h) = decoded.dimensions();
            Ok((decoded.into_raw(), w, h))
        }
        b"YUYV" => {
            let rgb = yuyv_to_rgb(buf, width, height).ok_or_else(|| {
                warn!("short YUYV frame ({} bytes for {width}x{height})", buf.len());
                CaptureError::Unavailable
            })?;
            Ok((rgb, width, height))
        }
        b"RGB3" => {
            let expected = width as usize * height as usize * 3;
            if buf.len() < expected {
                warn!("short RGB3 frame ({} bytes for {width}x{height})", buf.len());
                return Err(CaptureError::Unavailable);
            }
            Ok((buf[..expected].to_vec(), width, height))
        }
        other => Err(CaptureError::Other(anyhow::anyhow!(
            "unsupported pixel format {:?}",
            FourCC { repr: *other }
        ))),
    }
}

/// Open a camera input either by index or by device path.
fn open_device(uri: &str) -> Result<Device, CaptureError> {
    let result = match parse_device_index(uri) {
        Some(index) => Device::new(index),
        None => Device::with_path(uri),
    };
    result.map_err(|err| {
        warn!("failed to open {uri}: {err}");
        CaptureError::Open {
            uri: uri.to_string(),
        }
    })
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
fn parse_device_index(uri: &str) -> Option<usize> {
    if let Ok(index) = uri.parse::<usize>() {
        return Some(index);
    }
    uri.strip_prefix("/dev/video")
        .filter(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse::<usize>().ok())
}

/// Ask the device for each candidate pixel format in turn; fall back to the
/// device's current format if it is one the conversion layer supports.
fn negotiate_format(
    device: &Device,
    uri: &str,
    target_size: (u32, u32),
) -> Result<Format, CaptureError> {
    for candidate in FOURCC_CANDIDATES {
        let requested = Format::new(target_size.0, target_size.1, FourCC::new(candidate));
        match device.set_format(&requested) {
            Ok(accepted) if accepted.fourcc == FourCC::new(candidate) => return Ok(accepted),
            Ok(_) => continue,
            Err(err) => {
                debug!(
                    "device {} rejected {}: {err}",
                    uri,
                    FourCC::new(candidate)
                );
            }
        }
    }

    let current = device.format().map_err(|err| {
        warn!("failed to read format from {uri}: {err}");
        CaptureError::Open {
            uri: uri.to_string(),
        }
    })?;
    if FOURCC_CANDIDATES.contains(&&current.fourcc.repr) {
        return Ok(current);
    }

    warn!("device {} offers no supported pixel format", uri);
    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_parses_bare_numbers_and_dev_paths() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video2x"), None);
        assert_eq!(parse_device_index("rtsp://host/stream"), None);
    }

    #[test]
    fn short_rgb3_buffers_are_transient() {
        let result = convert_buffer(&[0u8; 8], FourCC::new(b"RGB3"), 4, 4);
        assert!(matches!(result, Err(CaptureError::Unavailable)));
    }

    #[test]
    fn rgb3_buffers_pass_through() {
        let buf = vec![7u8; 4 * 4 * 3];
        let (data, w, h) = convert_buffer(&buf, FourCC::new(b"RGB3"), 4, 4).unwrap();
        assert_eq!((w, h), (4, 4));
        assert_eq!(data, buf);
    }
}
