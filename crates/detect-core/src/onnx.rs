//! Tract-based ONNX detection backend.
//!
//! Loads a YOLO-family model exported to ONNX and runs it on the CPU. Frames
//! are resized to the model's input resolution before inference; boxes are
//! scaled back to the caller's frame coordinates on the way out.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::labels::COCO_LABELS;
use crate::{Detection, Detector};

type OnnxModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Hard cap on detections decoded from one inference call.
const MAX_DETECTIONS: usize = 512;

pub struct OnnxDetector {
    model: OnnxModel,
    input_size: (u32, u32),
    labels: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl OnnxDetector {
    /// Load an ONNX model from disk and prepare it for inference at the
    /// given input resolution.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: (u32, u32)) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (width, height) = input_size;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            labels: COCO_LABELS.iter().map(|name| name.to_string()).collect(),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the confidence threshold used for filtering detections.
    pub fn with_confidence_threshold(mut self, confidence: f32) -> Self {
        self.confidence_threshold = confidence;
        self
    }

    /// Replace the built-in COCO class names.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (frame_w, frame_h) = image.dimensions();
        if frame_w == 0 || frame_h == 0 {
            bail!("cannot run inference on an empty frame");
        }

        let (in_w, in_h) = self.input_size;
        let resized;
        let input_image = if (frame_w, frame_h) == (in_w, in_h) {
            image
        } else {
            resized = image::imageops::resize(image, in_w, in_h, FilterType::Triangle);
            &resized
        };

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, in_h as usize, in_w as usize),
            |(_, channel, y, x)| input_image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        let outputs = self
            .model
            .run(tvec!(Tensor::from(input).into()))
            .context("detector inference failed")?;
        let view = outputs[0]
            .to_array_view::<f32>()
            .context("detector output is not f32")?;

        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            bail!("unexpected detector output shape: {shape:?}");
        }

        let preds = view
            .index_axis(tract_ndarray::Axis(0), 0)
            .into_dimensionality::<tract_ndarray::Ix2>()
            .context("detector output is not two-dimensional per frame")?;
        // Accept both [channels, anchors] and the transposed layout.
        let preds = if preds.shape()[0] <= preds.shape()[1] {
            preds
        } else {
            preds.reversed_axes()
        };
        if preds.shape()[0] < 5 {
            bail!(
                "detector output requires at least 5 channels (x,y,w,h,score), got {}",
                preds.shape()[0]
            );
        }

        let scale = (frame_w as f32 / in_w as f32, frame_h as f32 / in_h as f32);
        let detections = decode_predictions(
            preds,
            scale,
            (frame_w, frame_h),
            &self.labels,
            self.confidence_threshold,
        );
        Ok(non_max_suppression(detections, self.iou_threshold))
    }
}

/// Decode a `[4 + classes, anchors]` prediction grid into detections.
///
/// Anchors are `(cx, cy, w, h)` in model-input coordinates followed by one
/// score per class; `scale` maps boxes back into the caller's frame and
/// `bounds` clamps them inside it.
fn decode_predictions(
    preds: tract_ndarray::ArrayView2<f32>,
    scale: (f32, f32),
    bounds: (u32, u32),
    labels: &[String],
    confidence_threshold: f32,
) -> Vec<Detection> {
    let (scale_x, scale_y) = scale;
    let max_x = (bounds.0.saturating_sub(1)) as f32;
    let max_y = (bounds.1.saturating_sub(1)) as f32;
    let classes = preds.shape()[0] - 4;
    let anchors = preds.shape()[1];

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = 0f32;
        for class in 0..classes {
            let score = preds[[4 + class, anchor]];
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score < confidence_threshold {
            continue;
        }

        let cx = preds[[0, anchor]];
        let cy = preds[[1, anchor]];
        let half_w = preds[[2, anchor]] / 2.0;
        let half_h = preds[[3, anchor]] / 2.0;
        let bbox = [
            ((cx - half_w) * scale_x).clamp(0.0, max_x),
            ((cy - half_h) * scale_y).clamp(0.0, max_y),
            ((cx + half_w) * scale_x).clamp(0.0, max_x),
            ((cy + half_h) * scale_y).clamp(0.0, max_y),
        ];

        let label = labels
            .get(best_class)
            .cloned()
            .unwrap_or_else(|| "object".to_string());
        detections.push(Detection {
            bbox,
            label,
            confidence: best_score,
        });
        if detections.len() >= MAX_DETECTIONS {
            break;
        }
    }

    detections
}

/// Greedy per-class suppression of overlapping boxes, strongest first.
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    'candidates: for detection in detections {
        for winner in &kept {
            if winner.label == detection.label
                && iou(&winner.bbox, &detection.bbox) > iou_threshold
            {
                continue 'candidates;
            }
        }
        kept.push(detection);
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let left = a[0].max(b[0]);
    let top = a[1].max(b[1]);
    let right = a[2].min(b[2]);
    let bottom = a[3].min(b[3]);

    let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], label: &str, confidence: f32) -> Detection {
        Detection {
            bbox,
            label: label.to_string(),
            confidence,
        }
    }

    #[test]
    fn decode_scales_and_filters_anchors() {
        let labels = vec!["cat".to_string(), "dog".to_string()];
        // Two anchors, channels are [cx, cy, w, h, cat, dog].
        let grid = tract_ndarray::arr2(&[
            [30.0, 50.0],
            [30.0, 50.0],
            [40.0, 10.0],
            [40.0, 10.0],
            [0.9, 0.1],
            [0.2, 0.05],
        ]);

        let decoded = decode_predictions(grid.view(), (2.0, 2.0), (200, 200), &labels, 0.25);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].label, "cat");
        assert!((decoded[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(decoded[0].bbox, [20.0, 20.0, 100.0, 100.0]);
    }

    #[test]
    fn decode_clamps_boxes_into_the_frame() {
        let labels = vec!["cat".to_string()];
        let grid = tract_ndarray::arr2(&[[5.0], [5.0], [40.0], [40.0], [0.9]]);

        let decoded = decode_predictions(grid.view(), (1.0, 1.0), (100, 100), &labels, 0.25);
        assert_eq!(decoded[0].bbox[0], 0.0);
        assert_eq!(decoded[0].bbox[1], 0.0);
    }

    #[test]
    fn nms_keeps_the_strongest_of_overlapping_same_class_boxes() {
        let detections = vec![
            det([10.0, 10.0, 50.0, 50.0], "cat", 0.8),
            det([12.0, 12.0, 52.0, 52.0], "cat", 0.9),
        ];
        let kept = non_max_suppression(detections, 0.45);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn nms_never_suppresses_across_classes() {
        let detections = vec![
            det([10.0, 10.0, 50.0, 50.0], "cat", 0.9),
            det([10.0, 10.0, 50.0, 50.0], "dog", 0.8),
        ];
        let kept = non_max_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(
            iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }
}
