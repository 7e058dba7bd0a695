//! One detection-and-warp pass as a chain of typed stages.
//!
//! ```rust
//! # use gridsnap_pipeline::{NormalizeConfig, PipelineError, RgbaImage};
//! # use gridsnap_pipeline::pipeline::Pass;
//! # use rand::SeedableRng;
//! # fn run(photo: RgbaImage) -> Result<(), PipelineError> {
//! let config = NormalizeConfig::default();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
//! let result = Pass::new(photo, None, &config)
//!     .prepare()
//!     .binarize()
//!     .clean_border()
//!     .sample_edges()
//!     .fit_lines(&mut rng)?
//!     .solve_corners()?
//!     .warp()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next stage (or a
//! `Result` for the stages that can fail), carrying the working copy of
//! the photograph forward because the final warp resamples it. A failure
//! aborts the pass; there is no partial result.
//!
//! [`run_pass`] drives the whole chain while timing every stage and
//! reporting it to a [`ProgressSink`].

use std::time::Duration;

use rand::Rng;

use crate::diagnostics::{Clock, PassDiagnostics, PassRole, StageDiagnostics, StageMetrics};
use crate::fit::{LineFitter, remove_outliers};
use crate::progress::{ProgressSink, emit};
use crate::types::{
    Dimensions, EdgePoint, FittedLine, NormalizeConfig, PassResult, PerSide, PipelineError,
    ProcessingMode, Quad, RgbaImage,
};

/// Pipeline state shared by every stage after [`Pending`].
struct Working<'c> {
    config: &'c NormalizeConfig,
    /// Color working copy, sampled by the final warp.
    image: RgbaImage,
    /// Pass input dimensions.
    source: Dimensions,
    /// Pass input size divided by working copy size.
    scale: f64,
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Entry point of the stage chain.
pub struct Pass;

impl Pass {
    /// Start a pass over `input`, optionally forcing the processing mode.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(
        input: RgbaImage,
        forced: Option<ProcessingMode>,
        config: &NormalizeConfig,
    ) -> Pending<'_> {
        Pending {
            config,
            input,
            forced,
        }
    }
}

/// Pass state holding the untouched input.
#[must_use = "pipeline stages are consumed by advancing -- call .prepare() to continue"]
pub struct Pending<'c> {
    config: &'c NormalizeConfig,
    input: RgbaImage,
    forced: Option<ProcessingMode>,
}

impl<'c> Pending<'c> {
    /// The pass input.
    #[must_use]
    pub const fn input(&self) -> &RgbaImage {
        &self.input
    }

    /// Downscale to the working resolution and advance.
    pub fn prepare(self) -> Prepared<'c> {
        let source = Dimensions::of(&self.input);
        let (image, downsampled) = crate::downsample::downsample(
            &self.input,
            self.config.working_resolution,
            self.config.downsample_filter,
        );
        let working = Dimensions::of(&image);
        let scale = if downsampled && working.longest_side() > 0 {
            f64::from(source.longest_side()) / f64::from(working.longest_side())
        } else {
            1.0
        };
        if downsampled {
            log::debug!(
                "working copy {}x{} -> {}x{} ({})",
                source.width,
                source.height,
                working.width,
                working.height,
                self.config.downsample_filter,
            );
        }
        Prepared {
            working: Working {
                config: self.config,
                image,
                source,
                scale,
            },
            forced: self.forced,
            downsampled,
        }
    }
}

// ───────────────────────── Stage 1: Prepared ─────────────────────────

/// Pass state after preparing the working copy.
#[must_use = "pipeline stages are consumed by advancing -- call .binarize() to continue"]
pub struct Prepared<'c> {
    working: Working<'c>,
    forced: Option<ProcessingMode>,
    downsampled: bool,
}

impl<'c> Prepared<'c> {
    /// The color working copy.
    #[must_use]
    pub const fn working_image(&self) -> &RgbaImage {
        &self.working.image
    }

    /// Detect the mode (unless forced), binarize, and advance.
    pub fn binarize(self) -> Binarized<'c> {
        let result = crate::binarize::binarize(self.working.image.clone(), self.forced);
        Binarized {
            working: self.working,
            binary: result.image,
            mode: result.mode,
            forced: self.forced.is_some(),
            peak: result.peak,
            foreground_pixels: result.foreground_pixels,
        }
    }
}

// ───────────────────────── Stage 2: Binarized ────────────────────────

/// Pass state after binarization.
#[must_use = "pipeline stages are consumed by advancing -- call .clean_border() to continue"]
pub struct Binarized<'c> {
    working: Working<'c>,
    binary: RgbaImage,
    mode: ProcessingMode,
    forced: bool,
    peak: u8,
    foreground_pixels: u64,
}

impl<'c> Binarized<'c> {
    /// The black/white image.
    #[must_use]
    pub const fn binary(&self) -> &RgbaImage {
        &self.binary
    }

    /// Mode in use for the rest of the pass.
    #[must_use]
    pub const fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Clear boundary-connected noise and advance.
    pub fn clean_border(mut self) -> Cleaned<'c> {
        let cleared_pixels = crate::border::clear_border_noise(&mut self.binary);
        Cleaned {
            working: self.working,
            binary: self.binary,
            mode: self.mode,
            cleared_pixels,
            remaining_foreground: self.foreground_pixels.saturating_sub(cleared_pixels),
        }
    }
}

// ───────────────────────── Stage 3: Cleaned ──────────────────────────

/// Pass state after border noise removal.
#[must_use = "pipeline stages are consumed by advancing -- call .sample_edges() to continue"]
pub struct Cleaned<'c> {
    working: Working<'c>,
    binary: RgbaImage,
    mode: ProcessingMode,
    cleared_pixels: u64,
    remaining_foreground: u64,
}

impl<'c> Cleaned<'c> {
    /// The cleaned black/white image.
    #[must_use]
    pub const fn binary(&self) -> &RgbaImage {
        &self.binary
    }

    /// Scan each side for edge points and advance.
    pub fn sample_edges(self) -> Sampled<'c> {
        let samples = crate::sample::sample_edges(&self.binary, self.working.config.scan_lines);
        Sampled {
            working: self.working,
            binary: self.binary,
            mode: self.mode,
            samples,
        }
    }
}

// ───────────────────────── Stage 4: Sampled ──────────────────────────

/// Pass state after edge sampling.
#[must_use = "pipeline stages are consumed by advancing -- call .fit_lines() to continue"]
pub struct Sampled<'c> {
    working: Working<'c>,
    binary: RgbaImage,
    mode: ProcessingMode,
    samples: PerSide<Vec<EdgePoint>>,
}

impl<'c> Sampled<'c> {
    /// Raw edge points per side.
    #[must_use]
    pub const fn samples(&self) -> &PerSide<Vec<EdgePoint>> {
        &self.samples
    }

    /// Filter outliers and fit one line per side.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeDetection`] for the first side with
    /// fewer than two points left after outlier removal, and
    /// [`PipelineError::LineFitting`] for the first side the fitter
    /// cannot fit.
    pub fn fit_lines(self, rng: &mut impl Rng) -> Result<LinesFitted<'c>, PipelineError> {
        let mode = self.mode;
        let fitter = LineFitter::from_config(self.working.config);
        let fits = PerSide::try_from_fn(|side| {
            let kept = remove_outliers(self.samples.get(side));
            if kept.len() < 2 {
                return Err(PipelineError::ShapeDetection {
                    mode,
                    side,
                    found: kept.len(),
                });
            }
            let fit = fitter
                .fit(&kept, side.orientation(), rng)
                .ok_or(PipelineError::LineFitting { mode, side })?;
            Ok((fit.line, kept.len(), fit.inlier_count))
        })?;
        Ok(LinesFitted {
            working: self.working,
            binary: self.binary,
            mode,
            lines: fits.map(|f| f.0),
            kept: fits.map(|f| f.1),
            inliers: fits.map(|f| f.2),
        })
    }
}

// ───────────────────────── Stage 5: LinesFitted ──────────────────────

/// Pass state after line fitting.
#[must_use = "pipeline stages are consumed by advancing -- call .solve_corners() to continue"]
pub struct LinesFitted<'c> {
    working: Working<'c>,
    binary: RgbaImage,
    mode: ProcessingMode,
    lines: PerSide<FittedLine>,
    kept: PerSide<usize>,
    inliers: PerSide<usize>,
}

impl<'c> LinesFitted<'c> {
    /// Fitted line per side.
    #[must_use]
    pub const fn lines(&self) -> &PerSide<FittedLine> {
        &self.lines
    }

    /// Intersect adjacent lines and advance.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Intersection`] when two adjacent lines are
    /// parallel.
    pub fn solve_corners(self) -> Result<CornersSolved<'c>, PipelineError> {
        let corners = crate::corners::solve_corners(&self.lines, self.mode)?;
        Ok(CornersSolved {
            working: self.working,
            binary: self.binary,
            mode: self.mode,
            lines: self.lines,
            corners,
        })
    }
}

// ───────────────────────── Stage 6: CornersSolved ────────────────────

/// Pass state after corner solving.
#[must_use = "pipeline stages are consumed by advancing -- call .warp() to continue"]
pub struct CornersSolved<'c> {
    working: Working<'c>,
    binary: RgbaImage,
    mode: ProcessingMode,
    lines: PerSide<FittedLine>,
    corners: Quad,
}

impl<'c> CornersSolved<'c> {
    /// Corners in working-image coordinates.
    #[must_use]
    pub const fn corners(&self) -> &Quad {
        &self.corners
    }

    /// Resample the working copy into the canonical square.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateTransform`] when the corners do
    /// not define a projective transform.
    pub fn warp(self) -> Result<Warped, PipelineError> {
        let config = self.working.config;
        let (canvas, outside_pixels) =
            crate::warp::warp_to_square(&self.working.image, &self.corners, self.mode, config)?;
        Ok(Warped {
            result: PassResult {
                result_image: canvas,
                processed_binary_image: self.binary,
                mode_used: self.mode,
                lines: self.lines,
                corners: self.corners,
                working_scale: self.working.scale,
            },
            active_size: config.active_size(),
            outside_pixels,
        })
    }
}

// ───────────────────────── Stage 7: Warped ───────────────────────────

/// Final pass state.
#[must_use = "call .into_result() to take the pass output"]
pub struct Warped {
    result: PassResult,
    active_size: u32,
    outside_pixels: u64,
}

impl Warped {
    /// The canonical square.
    #[must_use]
    pub const fn result_image(&self) -> &RgbaImage {
        &self.result.result_image
    }

    /// Take the pass output.
    #[must_use]
    pub fn into_result(self) -> PassResult {
        self.result
    }
}

// ──────────────────────────── PipelineStage ──────────────────────────

/// Common interface of every stage type.
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage.
    const NAME: &'static str;

    /// Zero-based index of this stage (`0` for [`Pending`] through `7`
    /// for [`Warped`]).
    const INDEX: usize;

    /// Metrics describing the work done to reach this stage, or `None`
    /// for [`Pending`].
    fn metrics(&self) -> Option<StageMetrics>;

    /// Processing mode, once decided.
    fn mode(&self) -> Option<ProcessingMode> {
        None
    }
}

impl PipelineStage for Pending<'_> {
    const NAME: &'static str = "source";
    const INDEX: usize = 0;

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }
}

impl PipelineStage for Prepared<'_> {
    const NAME: &'static str = "prepare";
    const INDEX: usize = 1;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Prepare {
            source_width: self.working.source.width,
            source_height: self.working.source.height,
            working_width: self.working.image.width(),
            working_height: self.working.image.height(),
            downsampled: self.downsampled,
        })
    }
}

impl PipelineStage for Binarized<'_> {
    const NAME: &'static str = "binarize";
    const INDEX: usize = 2;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Binarize {
            mode: self.mode,
            forced: self.forced,
            peak: self.peak,
            foreground_pixels: self.foreground_pixels,
            total_pixels: Dimensions::of(&self.binary).pixel_count(),
        })
    }

    fn mode(&self) -> Option<ProcessingMode> {
        Some(self.mode)
    }
}

impl PipelineStage for Cleaned<'_> {
    const NAME: &'static str = "border";
    const INDEX: usize = 3;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::BorderClean {
            cleared_pixels: self.cleared_pixels,
            remaining_foreground: self.remaining_foreground,
        })
    }

    fn mode(&self) -> Option<ProcessingMode> {
        Some(self.mode)
    }
}

impl PipelineStage for Sampled<'_> {
    const NAME: &'static str = "sample";
    const INDEX: usize = 4;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::EdgeSampling {
            scan_lines: self.working.config.scan_lines,
            points: self.samples.map(Vec::len),
        })
    }

    fn mode(&self) -> Option<ProcessingMode> {
        Some(self.mode)
    }
}

impl PipelineStage for LinesFitted<'_> {
    const NAME: &'static str = "fit";
    const INDEX: usize = 5;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::LineFitting {
            kept: self.kept.clone(),
            inliers: self.inliers.clone(),
        })
    }

    fn mode(&self) -> Option<ProcessingMode> {
        Some(self.mode)
    }
}

impl PipelineStage for CornersSolved<'_> {
    const NAME: &'static str = "corners";
    const INDEX: usize = 6;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::CornerSolving {
            corners: self.corners,
        })
    }

    fn mode(&self) -> Option<ProcessingMode> {
        Some(self.mode)
    }
}

impl PipelineStage for Warped {
    const NAME: &'static str = "warp";
    const INDEX: usize = 7;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Warp {
            output_size: self.result.result_image.width(),
            active_size: self.active_size,
            outside_pixels: self.outside_pixels,
        })
    }

    fn mode(&self) -> Option<ProcessingMode> {
        Some(self.result.mode_used)
    }
}

// ───────────────────────────── run_pass ──────────────────────────────

/// Times stage transitions and reports them.
struct Recorder<'a, C: Clock> {
    clock: &'a C,
    progress: &'a mut dyn ProgressSink,
    role: PassRole,
    mode: Option<ProcessingMode>,
    stages: Vec<StageDiagnostics>,
    total: Duration,
}

impl<C: Clock> Recorder<'_, C> {
    fn advance<S: PipelineStage>(
        &mut self,
        step: impl FnOnce() -> Result<S, PipelineError>,
    ) -> Result<S, PipelineError> {
        let start = self.clock.now();
        let outcome = step();
        let duration = self.clock.elapsed(&start);
        self.total += duration;
        let stage = outcome?;

        if let Some(mode) = stage.mode() {
            self.mode = Some(mode);
        }
        if let Some(metrics) = stage.metrics() {
            self.stages.push(StageDiagnostics {
                stage: S::NAME.to_string(),
                duration,
                metrics,
            });
        }
        emit(
            self.progress,
            &format!("{}: {} ({}/7)", self.role, S::NAME, S::INDEX),
        );
        Ok(stage)
    }

    fn run(
        &mut self,
        input: RgbaImage,
        forced: Option<ProcessingMode>,
        config: &NormalizeConfig,
        rng: &mut impl Rng,
    ) -> Result<PassResult, PipelineError> {
        let pending = Pass::new(input, forced, config);
        let prepared = self.advance(|| Ok(pending.prepare()))?;
        let binarized = self.advance(|| Ok(prepared.binarize()))?;
        let cleaned = self.advance(|| Ok(binarized.clean_border()))?;
        let sampled = self.advance(|| Ok(cleaned.sample_edges()))?;
        let fitted = self.advance(|| sampled.fit_lines(rng))?;
        let solved = self.advance(|| fitted.solve_corners())?;
        let warped = self.advance(|| solved.warp())?;
        Ok(warped.into_result())
    }
}

/// Run a full pass over `input`, timing every stage.
///
/// Returns the pass outcome together with its diagnostics. The
/// diagnostics are recorded whether or not the pass succeeds.
pub fn run_pass<C: Clock>(
    input: RgbaImage,
    forced: Option<ProcessingMode>,
    config: &NormalizeConfig,
    rng: &mut impl Rng,
    role: PassRole,
    clock: &C,
    progress: &mut dyn ProgressSink,
) -> (Result<PassResult, PipelineError>, PassDiagnostics) {
    let mut recorder = Recorder {
        clock,
        progress,
        role,
        mode: forced,
        stages: Vec::new(),
        total: Duration::ZERO,
    };

    let outcome = recorder.run(input, forced, config, rng);

    let diagnostics = PassDiagnostics {
        role,
        mode: outcome
            .as_ref()
            .map(|r| r.mode_used)
            .ok()
            .or(recorder.mode),
        stages: recorder.stages,
        duration: recorder.total,
        error: outcome.as_ref().err().map(ToString::to_string),
    };
    (outcome, diagnostics)
}
