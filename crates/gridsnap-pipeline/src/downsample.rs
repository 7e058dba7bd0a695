//! Working-copy downscaling.
//!
//! Photographs straight off a phone are several thousand pixels on a
//! side. Every pass detects and resamples on a working copy whose longest
//! axis is at most `working_resolution`; smaller inputs pass through
//! unchanged.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::RgbaImage;

/// Resampling filter used when downscaling.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality,
/// with a `Disabled` variant to skip downscaling entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Skip downscaling regardless of image size.
    Disabled,
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl DownsampleFilter {
    const fn to_image_filter(self) -> Option<FilterType> {
        match self {
            Self::Disabled => None,
            Self::Nearest => Some(FilterType::Nearest),
            Self::Triangle => Some(FilterType::Triangle),
            Self::CatmullRom => Some(FilterType::CatmullRom),
            Self::Gaussian => Some(FilterType::Gaussian),
            Self::Lanczos3 => Some(FilterType::Lanczos3),
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Nearest => f.write_str("nearest"),
            Self::Triangle => f.write_str("triangle"),
            Self::CatmullRom => f.write_str("catmull-rom"),
            Self::Gaussian => f.write_str("gaussian"),
            Self::Lanczos3 => f.write_str("lanczos3"),
        }
    }
}

/// Downscale `image` so its longest axis is at most `max_dimension`,
/// preserving aspect ratio.
///
/// Returns the (possibly unchanged) image and whether downscaling was
/// actually applied.
#[must_use]
pub fn downsample(
    image: &RgbaImage,
    max_dimension: u32,
    filter: DownsampleFilter,
) -> (RgbaImage, bool) {
    let Some(image_filter) = filter.to_image_filter() else {
        return (image.clone(), false);
    };

    let (w, h) = image.dimensions();
    let long_axis = w.max(h);
    if long_axis <= max_dimension || max_dimension == 0 {
        return (image.clone(), false);
    }

    let (nw, nh) = scaled_dimensions(w, h, max_dimension);
    let resized = image::imageops::resize(image, nw, nh, image_filter);
    (resized, true)
}

/// Target size for a `w`x`h` image whose long axis becomes `max_dimension`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled_dimensions(w: u32, h: u32, max_dimension: u32) -> (u32, u32) {
    let scale = f64::from(max_dimension) / f64::from(w.max(h));
    let nw = (f64::from(w) * scale).round().max(1.0) as u32;
    let nh = (f64::from(h) * scale).round().max(1.0) as u32;
    (nw.min(max_dimension), nh.min(max_dimension))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(DownsampleFilter::default(), DownsampleFilter::Triangle);
    }

    #[test]
    fn display_matches_cli_value_names() {
        assert_eq!(DownsampleFilter::CatmullRom.to_string(), "catmull-rom");
        assert_eq!(DownsampleFilter::Disabled.to_string(), "disabled");
    }

    #[test]
    fn no_downsample_when_already_small() {
        let (result, applied) = downsample(&test_image(100, 80), 1000, DownsampleFilter::Triangle);
        assert!(!applied);
        assert_eq!(result.dimensions(), (100, 80));
    }

    #[test]
    fn no_downsample_when_exact_match() {
        let (result, applied) = downsample(&test_image(1000, 640), 1000, DownsampleFilter::Triangle);
        assert!(!applied);
        assert_eq!(result.dimensions(), (1000, 640));
    }

    #[test]
    fn downsample_landscape() {
        let (result, applied) = downsample(&test_image(1024, 768), 256, DownsampleFilter::Triangle);
        assert!(applied);
        assert_eq!(result.dimensions(), (256, 192));
    }

    #[test]
    fn downsample_portrait() {
        let (result, applied) = downsample(&test_image(600, 1200), 256, DownsampleFilter::Triangle);
        assert!(applied);
        assert_eq!(result.dimensions(), (128, 256));
    }

    #[test]
    fn extreme_aspect_ratio_keeps_at_least_one_pixel() {
        let (result, applied) = downsample(&test_image(4000, 1), 100, DownsampleFilter::Nearest);
        assert!(applied);
        assert_eq!(result.dimensions(), (100, 1));
    }

    #[test]
    fn disabled_filter_skips_even_large_image() {
        let (result, applied) = downsample(&test_image(2048, 1536), 1000, DownsampleFilter::Disabled);
        assert!(!applied);
        assert_eq!(result.dimensions(), (2048, 1536));
    }
}
