//! Shared capture handle with serialized device access.

use std::sync::Mutex;

use anyhow::anyhow;
use tracing::info;

use crate::synthetic::SyntheticSource;
use crate::types::{CaptureError, Frame};

#[cfg(feature = "v4l2")]
use crate::device::DeviceSource;

/// Exclusive-access wrapper around one video device.
///
/// The process opens exactly one `CaptureSource` and shares it behind an
/// `Arc`; the inner mutex guarantees at most one physical read is in flight
/// at any instant, no matter how many stream sessions are pulling frames.
pub struct CaptureSource {
    uri: String,
    inner: Mutex<Backend>,
}

enum Backend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "v4l2")]
    Device(DeviceSource),
}

impl CaptureSource {
    /// Open the source named by `uri`.
    ///
    /// `stub://` URIs select the synthetic backend; anything else is treated
    /// as a V4L2 device path or index. `target_size` is the capture
    /// resolution requested from the device (the device may adjust it).
    pub fn open(uri: &str, target_size: (u32, u32)) -> Result<Self, CaptureError> {
        let backend = if uri.starts_with("stub://") {
            Backend::Synthetic(SyntheticSource::new(uri, target_size))
        } else {
            #[cfg(feature = "v4l2")]
            {
                Backend::Device(DeviceSource::open(uri, target_size)?)
            }
            #[cfg(not(feature = "v4l2"))]
            {
                return Err(CaptureError::Open {
                    uri: uri.to_string(),
                });
            }
        };

        info!("capture source opened: {uri}");
        Ok(Self {
            uri: uri.to_string(),
            inner: Mutex::new(backend),
        })
    }

    /// Acquire the next frame.
    ///
    /// Concurrent callers block until the in-flight read completes. A
    /// [`CaptureError::Unavailable`] result is a transient miss the caller
    /// should retry after a short pause.
    pub fn acquire_frame(&self) -> Result<Frame, CaptureError> {
        let mut backend = self
            .inner
            .lock()
            .map_err(|_| CaptureError::Other(anyhow!("capture mutex poisoned")))?;
        match &mut *backend {
            Backend::Synthetic(source) => source.read_frame(),
            #[cfg(feature = "v4l2")]
            Backend::Device(source) => source.read_frame(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}
