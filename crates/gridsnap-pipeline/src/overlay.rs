//! Detection overlay for visual inspection.

use image::Rgba;
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

use crate::types::{Dimensions, Quad, RgbaImage};

/// Outline color of the detected quadrilateral.
pub const OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Corner marker color.
pub const MARKER: Rgba<u8> = Rgba([0, 160, 255, 255]);

/// Draw `corners` onto a copy of `image`: the quadrilateral outline plus
/// a ring around each corner. Stroke width grows with image size.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub fn draw_detection(image: &RgbaImage, corners: &Quad) -> RgbaImage {
    let mut canvas = image.clone();
    let longest = Dimensions::of(image).longest_side();
    let stroke = (longest / 400).max(1);
    let radius = (longest / 60).max(4);

    let points = corners.to_array();
    for (i, from) in points.iter().enumerate() {
        let to = points[(i + 1) % points.len()];
        for offset in 0..stroke {
            let d = offset as f32;
            draw_line_segment_mut(
                &mut canvas,
                (from.x as f32 + d, from.y as f32),
                (to.x as f32 + d, to.y as f32),
                OUTLINE,
            );
            draw_line_segment_mut(
                &mut canvas,
                (from.x as f32, from.y as f32 + d),
                (to.x as f32, to.y as f32 + d),
                OUTLINE,
            );
        }
    }

    for p in points {
        let center = (p.x.round() as i32, p.y.round() as i32);
        for r in radius..radius + stroke {
            draw_hollow_circle_mut(&mut canvas, center, r as i32, MARKER);
        }
    }
    canvas
}
