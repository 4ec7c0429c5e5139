//! Drawing primitives for detection overlays.
//!
//! Annotation is a pure transform: it draws onto a private copy and leaves
//! the input frame untouched, since the caller may still need the original
//! within the same iteration.

use std::collections::HashSet;

use detect_core::Detection;
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CAPTION_BG: Rgb<u8> = Rgb([0, 0, 0]);
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 8;

/// Draw every detection's box and caption onto a copy of `image`.
///
/// Returns the annotated copy together with the distinct labels present.
/// The caption reads `"{label} {confidence:.2}"` and sits just above the box.
pub fn annotate_frame(image: &RgbImage, detections: &[Detection]) -> (RgbImage, HashSet<String>) {
    let mut annotated = image.clone();
    let width = annotated.width() as i32;

    for detection in detections {
        let [left, top, right, bottom] = clamped_box(&annotated, &detection.bbox);
        draw_rectangle(&mut annotated, left, top, right, bottom, BOX_COLOR);
    }

    for detection in detections {
        let [left, top, ..] = clamped_box(&annotated, &detection.bbox);
        let caption = format!("{} {:.2}", detection.label, detection.confidence);
        let caption_x = left;
        let caption_y = (top - GLYPH_HEIGHT - 4).max(0);
        let caption_width = (caption.chars().count() as i32 * GLYPH_ADVANCE).min(width);
        fill_rect(
            &mut annotated,
            caption_x,
            caption_y,
            caption_x + caption_width,
            caption_y + GLYPH_HEIGHT,
            CAPTION_BG,
        );
        draw_label(&mut annotated, caption_x + 1, caption_y, &caption, BOX_COLOR);
    }

    let labels = detections
        .iter()
        .map(|detection| detection.label.clone())
        .collect();
    (annotated, labels)
}

fn clamped_box(image: &RgbImage, bbox: &[f32; 4]) -> [i32; 4] {
    let max_x = (image.width().saturating_sub(1)) as f32;
    let max_y = (image.height().saturating_sub(1)) as f32;
    [
        bbox[0].clamp(0.0, max_x).round() as i32,
        bbox[1].clamp(0.0, max_y).round() as i32,
        bbox[2].clamp(0.0, max_x).round() as i32,
        bbox[3].clamp(0.0, max_y).round() as i32,
    ]
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        *image.get_pixel_mut(x as u32, top as u32) = color;
        *image.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *image.get_pixel_mut(left as u32, y as u32) = color;
        *image.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

/// Render `text` with the built-in 5x7 raster font, uppercased.
fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'B' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110,
        ]),
        'C' => Some([
            0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'G' => Some([
            0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111,
        ]),
        'H' => Some([
            0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'I' => Some([
            0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        'J' => Some([
            0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100,
        ]),
        'K' => Some([
            0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'Q' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        'T' => Some([
            0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        'U' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'V' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100,
        ]),
        'W' => Some([
            0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010,
        ]),
        'X' => Some([
            0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001,
        ]),
        'Y' => Some([
            0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        'Z' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn detection(bbox: [f32; 4], label: &str, confidence: f32) -> Detection {
        Detection {
            bbox,
            label: label.to_string(),
            confidence,
        }
    }

    #[test]
    fn output_keeps_input_dimensions_and_input_stays_untouched() {
        let image = gradient_image(120, 90);
        let before = image.clone();
        let detections = vec![detection([20.0, 30.0, 80.0, 70.0], "cat", 0.9)];

        let (annotated, _) = annotate_frame(&image, &detections);

        assert_eq!(annotated.dimensions(), image.dimensions());
        assert_eq!(image.as_raw(), before.as_raw());
    }

    #[test]
    fn boxes_are_drawn_on_the_copy() {
        let image = gradient_image(120, 90);
        let detections = vec![detection([20.0, 30.0, 80.0, 70.0], "cat", 0.9)];

        let (annotated, _) = annotate_frame(&image, &detections);

        assert_eq!(*annotated.get_pixel(20, 30), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(80, 70), BOX_COLOR);
    }

    #[test]
    fn labels_are_deduplicated() {
        let image = gradient_image(64, 64);
        let detections = vec![
            detection([1.0, 10.0, 20.0, 30.0], "cat", 0.9),
            detection([30.0, 10.0, 50.0, 30.0], "cat", 0.7),
            detection([10.0, 40.0, 40.0, 60.0], "dog", 0.8),
        ];

        let (_, labels) = annotate_frame(&image, &detections);
        assert_eq!(labels.len(), 2);
        assert!(labels.contains("cat"));
        assert!(labels.contains("dog"));
    }

    #[test]
    fn boxes_outside_the_frame_are_clamped_without_panicking() {
        let image = gradient_image(32, 32);
        let detections = vec![detection([-50.0, -50.0, 500.0, 500.0], "cat", 0.9)];

        let (annotated, _) = annotate_frame(&image, &detections);
        assert_eq!(annotated.dimensions(), (32, 32));
    }

    #[test]
    fn no_detections_means_an_unchanged_copy_and_empty_labels() {
        let image = gradient_image(48, 48);
        let (annotated, labels) = annotate_frame(&image, &[]);
        assert_eq!(annotated.as_raw(), image.as_raw());
        assert!(labels.is_empty());
    }
}
