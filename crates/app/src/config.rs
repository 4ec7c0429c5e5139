use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

const USAGE: &str = "Usage: lookout --model <path> [--device <uri>] [--bind <addr>] \
[--port <n>] [--width <px>] [--height <px>] [--detector-size <px>] \
[--jpeg-quality <1-100>] [--confidence <0.0-1.0>] [--verbose]\n\n\
The device URI is a V4L2 path (/dev/video0), a bare index (0), or stub:// for \
the synthetic source.";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub device: String,
    pub model_path: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub width: u32,
    pub height: u32,
    pub detector_size: u32,
    pub jpeg_quality: u8,
    pub confidence: f32,
    pub verbose: bool,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut device: Option<String> = None;
        let mut model_path: Option<PathBuf> = None;
        let mut bind_addr: Option<String> = None;
        let mut port: Option<u16> = None;
        let mut width: Option<u32> = None;
        let mut height: Option<u32> = None;
        let mut detector_size: Option<u32> = None;
        let mut jpeg_quality: Option<u8> = None;
        let mut confidence: Option<f32> = None;
        let mut verbose = false;

        let mut idx = 1;
        while idx < args.len() {
            match args[idx].as_str() {
                "--device" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--device requires a value"))?
                        .clone();
                    device = Some(value);
                    idx += 1;
                }
                "--model" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--model requires a value"))?
                        .clone();
                    model_path = Some(PathBuf::from(value));
                    idx += 1;
                }
                "--bind" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--bind requires a value"))?
                        .clone();
                    bind_addr = Some(value);
                    idx += 1;
                }
                "--port" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--port requires a value"))?
                        .parse::<u16>()
                        .with_context(|| "--port must be an integer".to_string())?;
                    port = Some(value);
                    idx += 1;
                }
                "--width" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--width requires a value"))?
                        .parse::<u32>()
                        .with_context(|| "--width must be a positive integer".to_string())?;
                    if value == 0 {
                        bail!("--width must be a positive integer");
                    }
                    width = Some(value);
                    idx += 1;
                }
                "--height" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--height requires a value"))?
                        .parse::<u32>()
                        .with_context(|| "--height must be a positive integer".to_string())?;
                    if value == 0 {
                        bail!("--height must be a positive integer");
                    }
                    height = Some(value);
                    idx += 1;
                }
                "--detector-size" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--detector-size requires a value"))?
                        .parse::<u32>()
                        .with_context(|| "--detector-size must be a positive integer".to_string())?;
                    if value == 0 {
                        bail!("--detector-size must be a positive integer");
                    }
                    detector_size = Some(value);
                    idx += 1;
                }
                "--jpeg-quality" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--jpeg-quality requires a value"))?
                        .parse::<u8>()
                        .with_context(|| {
                            "--jpeg-quality must be an integer between 1 and 100".to_string()
                        })?;
                    if !(1..=100).contains(&value) {
                        bail!("--jpeg-quality must be an integer between 1 and 100");
                    }
                    jpeg_quality = Some(value);
                    idx += 1;
                }
                "--confidence" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--confidence requires a value"))?
                        .parse::<f32>()
                        .with_context(|| "--confidence must be a number".to_string())?;
                    if !(0.0..=1.0).contains(&value) {
                        bail!("--confidence must be between 0.0 and 1.0");
                    }
                    confidence = Some(value);
                    idx += 1;
                }
                "--verbose" => {
                    verbose = true;
                    idx += 1;
                }
                "--help" | "-h" => {
                    bail!(USAGE);
                }
                arg => {
                    bail!("Unrecognised argument: {arg}\n\n{USAGE}");
                }
            }
        }

        let model_path =
            model_path.ok_or_else(|| anyhow!("Missing model path. Provide --model <path>.\n\n{USAGE}"))?;

        Ok(Self {
            device: device.unwrap_or_else(|| "/dev/video0".to_string()),
            model_path,
            bind_addr: bind_addr.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: port.unwrap_or(8000),
            width: width.unwrap_or(640),
            height: height.unwrap_or(480),
            detector_size: detector_size.unwrap_or(640),
            jpeg_quality: jpeg_quality.unwrap_or(85),
            confidence: confidence.unwrap_or(0.25),
            verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lookout")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn model_is_required() {
        assert!(AppConfig::from_args(&args(&[])).is_err());
    }

    #[test]
    fn defaults_match_the_service_contract() {
        let config = AppConfig::from_args(&args(&["--model", "yolov8n.onnx"])).unwrap();
        assert_eq!(config.device, "/dev/video0");
        assert_eq!(config.port, 8000);
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.detector_size, 640);
        assert_eq!(config.jpeg_quality, 85);
        assert!(!config.verbose);
    }

    #[test]
    fn flags_override_defaults() {
        let config = AppConfig::from_args(&args(&[
            "--model",
            "model.onnx",
            "--device",
            "stub://camera",
            "--port",
            "9000",
            "--jpeg-quality",
            "70",
            "--verbose",
        ]))
        .unwrap();
        assert_eq!(config.device, "stub://camera");
        assert_eq!(config.port, 9000);
        assert_eq!(config.jpeg_quality, 70);
        assert!(config.verbose);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(AppConfig::from_args(&args(&["--model", "m.onnx", "--jpeg-quality", "0"])).is_err());
        assert!(AppConfig::from_args(&args(&["--model", "m.onnx", "--confidence", "1.5"])).is_err());
        assert!(AppConfig::from_args(&args(&["--model", "m.onnx", "--width", "0"])).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(AppConfig::from_args(&args(&["--model", "m.onnx", "--nope"])).is_err());
    }
}
