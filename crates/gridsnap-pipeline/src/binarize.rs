//! Mode detection and histogram-driven binarization.
//!
//! The photograph is first standardized so grid features are brighter
//! than their surroundings: light-background photos are inverted,
//! dark-background photos are left alone. A luminance histogram of the
//! standardized image yields a peak gray level in `[15, 150)`; a linear
//! contrast stretch anchored at that peak, followed by a fixed cutoff,
//! splits every pixel into foreground (written black) and background
//! (written white).
//!
//! Binarization never fails. A poor threshold surfaces later as a shape
//! detection or stability failure.

use std::ops::Range;

use image::Rgba;

use crate::grayscale::{luminance, luminance_u8, mean_luminance};
use crate::types::{ProcessingMode, RgbaImage};

/// Mean luminance above which a photograph is treated as light-background.
pub const LIGHT_BACKGROUND_THRESHOLD: f64 = 128.0;

/// Histogram bins searched for the peak gray level.
pub const PEAK_SEARCH_RANGE: Range<usize> = 15..150;

/// Peak used when no pixel falls inside [`PEAK_SEARCH_RANGE`].
pub const DEFAULT_PEAK: u8 = 50;

/// Stretched luminance at or above which a pixel is foreground.
pub const FOREGROUND_CUTOFF: f64 = 64.0;

/// Channel value below which a pixel counts as dark.
pub const DARK_CHANNEL_LIMIT: u8 = 128;

/// Pure black, used for foreground pixels.
pub const FOREGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Pure white, used for background pixels.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// `true` when all three color channels are below [`DARK_CHANNEL_LIMIT`].
#[must_use]
pub const fn is_dark(pixel: Rgba<u8>) -> bool {
    let [r, g, b, _] = pixel.0;
    r < DARK_CHANNEL_LIMIT && g < DARK_CHANNEL_LIMIT && b < DARK_CHANNEL_LIMIT
}

/// Pick the processing mode from mean luminance.
#[must_use]
pub fn detect_mode(image: &RgbaImage) -> ProcessingMode {
    if mean_luminance(image) > LIGHT_BACKGROUND_THRESHOLD {
        ProcessingMode::LightBackground
    } else {
        ProcessingMode::DarkBackground
    }
}

/// Linear brightness/contrast adjustment derived from the histogram peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastAdjustment {
    /// Offset added before scaling; moves the peak to zero.
    pub brightness: f64,
    /// Gain applied after the offset; moves 255 back to 255.
    pub contrast: f64,
}

impl ContrastAdjustment {
    /// Adjustment that maps `peak` to 0 and 255 to 255.
    #[must_use]
    pub fn from_peak(peak: u8) -> Self {
        let peak = f64::from(peak);
        Self {
            brightness: -peak,
            contrast: 255.0 / (255.0 - peak),
        }
    }

    /// Apply to a luminance value, clamped to `0.0..=255.0`.
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        ((value + self.brightness) * self.contrast).clamp(0.0, 255.0)
    }
}

/// Outcome of [`binarize`].
#[derive(Debug, Clone)]
pub struct Binarization {
    /// The pure black/white image; black is foreground.
    pub image: RgbaImage,
    /// Mode actually used.
    pub mode: ProcessingMode,
    /// Histogram peak the threshold was derived from.
    pub peak: u8,
    /// Number of foreground pixels written.
    pub foreground_pixels: u64,
}

/// 256-bin luminance histogram.
#[must_use]
pub fn luminance_histogram(image: &RgbaImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for pixel in image.pixels() {
        hist[usize::from(luminance_u8(*pixel))] += 1;
    }
    hist
}

/// Most populated bin inside [`PEAK_SEARCH_RANGE`], or [`DEFAULT_PEAK`]
/// when that range is empty. Ties keep the lowest bin.
#[must_use]
pub fn find_peak(histogram: &[u64; 256]) -> u8 {
    let mut best: Option<(usize, u64)> = None;
    for bin in PEAK_SEARCH_RANGE {
        let count = histogram[bin];
        if count > 0 && best.is_none_or(|(_, c)| count > c) {
            best = Some((bin, count));
        }
    }
    best.and_then(|(bin, _)| u8::try_from(bin).ok())
        .unwrap_or(DEFAULT_PEAK)
}

/// Binarize `image` in place, auto-detecting the mode unless `forced`.
#[must_use]
pub fn binarize(mut image: RgbaImage, forced: Option<ProcessingMode>) -> Binarization {
    let mode = forced.unwrap_or_else(|| detect_mode(&image));

    if mode == ProcessingMode::LightBackground {
        for pixel in image.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            *pixel = Rgba([255 - r, 255 - g, 255 - b, a]);
        }
    }

    let peak = find_peak(&luminance_histogram(&image));
    let adjustment = ContrastAdjustment::from_peak(peak);

    let mut foreground_pixels = 0u64;
    for pixel in image.pixels_mut() {
        if adjustment.apply(luminance(*pixel)) >= FOREGROUND_CUTOFF {
            *pixel = FOREGROUND;
            foreground_pixels += 1;
        } else {
            *pixel = BACKGROUND;
        }
    }

    log::debug!("binarized in {mode} mode: peak={peak} foreground={foreground_pixels}");

    Binarization {
        image,
        mode,
        peak,
        foreground_pixels,
    }
}
