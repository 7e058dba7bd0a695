//! Image similarity used by the stability check.

use crate::types::RgbaImage;

/// Root-mean-square difference over the RGB channels, scaled to `0.0..=1.0`.
///
/// Pixels are compared in buffer order. Returns `None` when the two
/// images hold a different number of pixels. Two empty images are
/// identical.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rmse(a: &RgbaImage, b: &RgbaImage) -> Option<f64> {
    let count = u64::from(a.width()) * u64::from(a.height());
    if count != u64::from(b.width()) * u64::from(b.height()) {
        return None;
    }
    if count == 0 {
        return Some(0.0);
    }
    let sum: f64 = a
        .pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| (0..3).map(move |c| f64::from(p.0[c]) - f64::from(q.0[c])))
        .map(|d| d * d)
        .sum();
    Some((sum / (count * 3) as f64).sqrt() / 255.0)
}

/// `true` when `a` and `b` have the same pixel count and their
/// [`rmse`] is below `threshold`.
#[must_use]
pub fn compare_images(a: &RgbaImage, b: &RgbaImage, threshold: f64) -> bool {
    rmse(a, b).is_some_and(|e| e < threshold)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn identical_images_are_similar_at_any_threshold() {
        let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 8, y as u8 * 8, 7, 255]));
        assert_eq!(rmse(&img, &img), Some(0.0));
        assert!(compare_images(&img, &img, 1e-9));
        assert!(compare_images(&img, &img, 0.5));
    }

    #[test]
    fn black_and_white_are_maximally_different() {
        let black = solid(10, 10, 0);
        let white = solid(10, 10, 255);
        let e = rmse(&black, &white).unwrap_or_default();
        assert!((e - 1.0).abs() < 1e-12);
        assert!(!compare_images(&black, &white, 0.2));
    }

    #[test]
    fn alpha_is_ignored() {
        let a = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0]));
        let b = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        assert_eq!(rmse(&a, &b), Some(0.0));
    }

    #[test]
    fn pixel_count_mismatch_is_not_similar() {
        let a = solid(10, 10, 0);
        let b = solid(10, 11, 0);
        assert_eq!(rmse(&a, &b), None);
        assert!(!compare_images(&a, &b, 1.0));
    }

    #[test]
    fn same_pixel_count_different_shape_still_compares() {
        assert_eq!(rmse(&solid(4, 9, 3), &solid(6, 6, 3)), Some(0.0));
    }
}
