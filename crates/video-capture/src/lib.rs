//! Capture-source crate for the lookout service.
//!
//! Wraps a single video device behind a serialized handle so any number of
//! concurrent consumers can pull frames without racing the hardware. Backends:
//! - `v4l2` (default feature): local V4L2 devices such as `/dev/video0`.
//! - synthetic: deterministic in-process frames for `stub://` URIs, used by
//!   tests and hardware-free demos.

mod convert;
mod source;
mod synthetic;
mod types;

#[cfg(feature = "v4l2")]
mod device;

pub use source::CaptureSource;
pub use types::{CaptureError, Frame};
