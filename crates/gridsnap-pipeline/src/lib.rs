//! gridsnap-pipeline: photo-to-canonical-grid normalization (sans-IO).
//!
//! Takes a photograph of a square puzzle grid and produces a clean,
//! axis-aligned square image of it:
//! mode detection + binarization -> border noise removal -> edge
//! sampling -> robust line fitting -> corner solving -> perspective warp,
//! repeated three times for a convergence check with one opposite-mode
//! retry on failure.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers (or encoded bytes) and returns structured data. Reading
//! and writing files lives in `gridsnap-bench`.

pub mod binarize;
pub mod border;
pub mod codec;
pub mod compare;
pub mod corners;
pub mod diagnostics;
pub mod downsample;
pub mod fit;
pub mod grayscale;
pub mod homography;
pub mod overlay;
pub mod pipeline;
pub mod progress;
pub mod sample;
pub mod stability;
pub mod types;
pub mod warp;

pub use compare::{compare_images, rmse};
pub use diagnostics::{Clock, NoClock, NormalizeDiagnostics};
pub use downsample::DownsampleFilter;
pub use progress::{ProgressFn, ProgressSink};
pub use stability::StabilityController;
pub use types::{
    Corner, Dimensions, EdgePoint, FittedLine, LineOrientation, NormalizeConfig, NormalizeResult,
    PassResult, PerSide, PipelineError, Point, ProcessingMode, Quad, RgbaImage, Side,
};

/// Normalize a decoded photograph.
///
/// Runs three passes for a convergence check and at most one
/// opposite-mode recovery pass. Progress messages go to `progress` in
/// order.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation, and [`PipelineError::Fatal`] if neither the primary
/// attempt nor the recovery produced a result.
pub fn normalize(
    image: &RgbaImage,
    config: &NormalizeConfig,
    progress: &mut dyn ProgressSink,
) -> Result<NormalizeResult, PipelineError> {
    normalize_with_diagnostics(image, config, progress, &NoClock).0
}

/// Decode `bytes` (PNG, JPEG, BMP, WebP) and [`normalize`] the result.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
/// when decoding fails, otherwise as [`normalize`].
pub fn normalize_bytes(
    bytes: &[u8],
    config: &NormalizeConfig,
    progress: &mut dyn ProgressSink,
) -> Result<NormalizeResult, PipelineError> {
    let image = codec::decode_rgba(bytes)?;
    normalize(&image, config, progress)
}

/// [`normalize`] while recording per-pass, per-stage diagnostics.
///
/// Diagnostics are returned alongside the outcome so a failed
/// normalization can still be inspected. An invalid config yields empty
/// diagnostics.
pub fn normalize_with_diagnostics<C: Clock>(
    image: &RgbaImage,
    config: &NormalizeConfig,
    progress: &mut dyn ProgressSink,
    clock: &C,
) -> (Result<NormalizeResult, PipelineError>, NormalizeDiagnostics) {
    if let Err(e) = config.validate() {
        return (Err(e), NormalizeDiagnostics::default());
    }
    StabilityController::new(config, clock, progress).run(image)
}
