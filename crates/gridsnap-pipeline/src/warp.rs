//! Perspective correction into the canonical square.
//!
//! The canvas is `max_dimension` on a side and filled with a mode-dependent
//! background. The active square inside the border margin is filled by
//! inverse mapping: every destination pixel is pushed through the
//! homography from the canonical square to the detected quadrilateral and
//! the source is sampled bilinearly at that fractional position.

use image::Rgba;

use crate::homography::Homography;
use crate::types::{NormalizeConfig, PipelineError, Point, ProcessingMode, Quad, RgbaImage};

/// Canvas fill for the given mode.
///
/// Light-background photographs get a white border, dark-background ones
/// a black border, so the padding matches the photographed background.
#[must_use]
pub const fn background_fill(mode: ProcessingMode) -> Rgba<u8> {
    match mode {
        ProcessingMode::LightBackground => Rgba([255, 255, 255, 255]),
        ProcessingMode::DarkBackground => Rgba([0, 0, 0, 255]),
    }
}

/// Corners of the canonical destination square, clockwise from the origin.
///
/// The far corner sits on the last active pixel, so the first and last
/// active rows and columns sample exactly along the detected edges.
#[must_use]
pub fn canonical_corners(active_size: u32) -> [Point; 4] {
    let a = f64::from(active_size.saturating_sub(1));
    [
        Point::new(0.0, 0.0),
        Point::new(a, 0.0),
        Point::new(a, a),
        Point::new(0.0, a),
    ]
}

/// Bilinear sample of all four channels at a fractional position.
///
/// The caller guarantees a non-empty image, `0 <= x <= w-1` and
/// `0 <= y <= h-1`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    let x0 = (x.floor() as u32).min(w - 1);
    let y0 = (y.floor() as u32).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - f64::from(x0);
    let fy = y - f64::from(y0);

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for (c, value) in out.iter_mut().enumerate() {
        let top = fx.mul_add(f64::from(p10[c]) - f64::from(p00[c]), f64::from(p00[c]));
        let bottom = fx.mul_add(f64::from(p11[c]) - f64::from(p01[c]), f64::from(p01[c]));
        *value = fy.mul_add(bottom - top, top).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Resample `source` so that `corners` become the canonical square.
///
/// Returns the canvas and the number of active pixels whose source
/// position fell outside `source` and were left as background.
///
/// # Errors
///
/// Returns [`PipelineError::DegenerateTransform`] when the corners do not
/// define a projective transform.
pub fn warp_to_square(
    source: &RgbaImage,
    corners: &Quad,
    mode: ProcessingMode,
    config: &NormalizeConfig,
) -> Result<(RgbaImage, u64), PipelineError> {
    let active = config.active_size();
    let margin = config.border_margin;
    let transform =
        Homography::from_correspondences(&canonical_corners(active), &corners.to_array())
            .ok_or(PipelineError::DegenerateTransform { mode })?;

    let mut canvas = RgbaImage::from_pixel(
        config.max_dimension,
        config.max_dimension,
        background_fill(mode),
    );
    let (w, h) = source.dimensions();
    if w == 0 || h == 0 {
        return Ok((canvas, u64::from(active) * u64::from(active)));
    }
    let max_x = f64::from(w - 1);
    let max_y = f64::from(h - 1);

    let mut outside = 0u64;
    for v in 0..active {
        for u in 0..active {
            let inside = transform
                .apply(Point::new(f64::from(u), f64::from(v)))
                .filter(|p| (0.0..=max_x).contains(&p.x) && (0.0..=max_y).contains(&p.y));
            match inside {
                Some(p) => canvas.put_pixel(u + margin, v + margin, sample_bilinear(source, p.x, p.y)),
                None => outside += 1,
            }
        }
    }

    log::debug!("warped {active}x{active} active square, {outside} pixels outside source");
    Ok((canvas, outside))
}
