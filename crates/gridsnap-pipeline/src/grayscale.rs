//! Luminance helpers shared by mode detection and binarization.
//!
//! Uses the standard weighting `0.299*R + 0.587*G + 0.114*B`. Alpha is
//! ignored.

use image::Rgba;

use crate::types::RgbaImage;

/// Luminance of one pixel on the 0..=255 scale.
#[must_use]
pub fn luminance(pixel: Rgba<u8>) -> f64 {
    let [r, g, b, _] = pixel.0;
    0.114f64.mul_add(
        f64::from(b),
        0.299f64.mul_add(f64::from(r), 0.587 * f64::from(g)),
    )
}

/// Luminance rounded to the nearest byte, for histogram binning.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn luminance_u8(pixel: Rgba<u8>) -> u8 {
    luminance(pixel).round().clamp(0.0, 255.0) as u8
}

/// Mean luminance over every pixel. Returns `0.0` for an empty image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_luminance(image: &RgbaImage) -> f64 {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = image.pixels().map(|p| luminance(*p)).sum();
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_extremes() {
        assert!((luminance(Rgba([255, 255, 255, 255])) - 255.0).abs() < 1e-9);
        assert!(luminance(Rgba([0, 0, 0, 255])).abs() < 1e-9);
    }

    #[test]
    fn green_outweighs_red_outweighs_blue() {
        let r = luminance(Rgba([255, 0, 0, 255]));
        let g = luminance(Rgba([0, 255, 0, 255]));
        let b = luminance(Rgba([0, 0, 255, 255]));
        assert!(g > r && r > b, "R={r} G={g} B={b}");
    }

    #[test]
    fn alpha_does_not_affect_luminance() {
        assert_eq!(
            luminance_u8(Rgba([10, 20, 30, 0])),
            luminance_u8(Rgba([10, 20, 30, 255]))
        );
    }

    #[test]
    fn mean_of_half_black_half_white() {
        let img = RgbaImage::from_fn(10, 4, |x, _| {
            if x < 5 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        assert!((mean_luminance(&img) - 127.5).abs() < 1e-9);
    }

    #[test]
    fn mean_of_empty_image_is_zero() {
        assert!(mean_luminance(&RgbaImage::new(0, 0)).abs() < f64::EPSILON);
    }
}
