use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use detect_core::{Detector, OnnxDetector};
use tracing::info;
use video_capture::CaptureSource;

use lookout::config::AppConfig;
use lookout::data::AppState;
use lookout::detection_log::DetectionLog;
use lookout::{server, telemetry};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::from_args(&args)?;
    telemetry::init_tracing(config.verbose);
    let _ = telemetry::init_metrics_recorder();

    let capture = Arc::new(
        CaptureSource::open(&config.device, (config.width, config.height))
            .with_context(|| format!("failed to open capture source {}", config.device))?,
    );

    let detector = OnnxDetector::load(
        &config.model_path,
        (config.detector_size, config.detector_size),
    )
    .context("failed to load detection model")?
    .with_confidence_threshold(config.confidence);
    warm_up(&detector)?;

    let state = AppState {
        capture,
        detector: Arc::new(detector) as Arc<dyn Detector>,
        log: DetectionLog::new(),
        jpeg_quality: config.jpeg_quality,
    };

    server::run(&config, state)
}

/// Run one inference on a blank frame so the first request does not pay the
/// graph initialisation cost.
fn warm_up(detector: &OnnxDetector) -> Result<()> {
    let started = Instant::now();
    let (width, height) = detector.input_size();
    let blank = image::RgbImage::new(width, height);
    detector.detect(&blank).context("model warm-up failed")?;
    info!("model warm-up completed in {:?}", started.elapsed());
    Ok(())
}
