//! Live object-detection service: capture, detect, annotate, stream.
//!
//! The crate is split into focused modules:
//! - `config`: CLI configuration parsing.
//! - `server`: Actix Web routes and the serving loop.
//! - `session`: per-connection capture → detect → annotate → encode pipeline.
//! - `annotate`: drawing primitives for boxes and captions.
//! - `encode`: JPEG encode handling.
//! - `detection_log`: process-wide accumulator of observed labels.
//! - `upload`: single-shot detection for uploaded images.
//! - `telemetry`: tracing and Prometheus metrics plumbing.
//! - `data`: shared state and wire types passed between handlers.

pub mod annotate;
pub mod config;
pub mod data;
pub mod detection_log;
pub mod encode;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod upload;
