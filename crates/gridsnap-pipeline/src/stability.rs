//! Multi-pass convergence check and opposite-mode recovery.
//!
//! A primary attempt runs three passes, each on the previous pass's
//! output: the original photograph, then pass 1's square, then pass 2's.
//! Passes 2 and 3 should agree once the grid has been found; if their
//! outputs are within the similarity threshold the attempt has converged
//! and pass 1's output is returned. Passes 2 and 3 only validate, they
//! never replace the result.
//!
//! When the primary attempt fails (a stage error in any pass, or a
//! divergence between passes 2 and 3), exactly one recovery pass runs on
//! the original photograph with the mode forced to the opposite of the
//! failing pass's mode. If that fails too, the two failures are combined
//! into [`PipelineError::Fatal`].

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::binarize::detect_mode;
use crate::compare::rmse;
use crate::diagnostics::{Clock, NormalizeDiagnostics, PassRole};
use crate::pipeline::run_pass;
use crate::progress::{ProgressSink, emit};
use crate::types::{
    NormalizeConfig, NormalizeResult, PassResult, PipelineError, ProcessingMode, RgbaImage,
};

/// Number of passes in a primary attempt.
pub const PRIMARY_PASSES: u8 = 3;

/// Drives the passes of one normalization.
///
/// Owns the invocation's random generator, seeded from the config, so
/// concurrent normalizations never share state and identical inputs give
/// identical results.
pub struct StabilityController<'a, C: Clock> {
    config: &'a NormalizeConfig,
    clock: &'a C,
    progress: &'a mut dyn ProgressSink,
    rng: StdRng,
    diagnostics: NormalizeDiagnostics,
}

impl<'a, C: Clock> StabilityController<'a, C> {
    /// Controller for one invocation.
    pub fn new(config: &'a NormalizeConfig, clock: &'a C, progress: &'a mut dyn ProgressSink) -> Self {
        Self {
            config,
            clock,
            progress,
            rng: StdRng::seed_from_u64(config.seed),
            diagnostics: NormalizeDiagnostics::default(),
        }
    }

    /// Normalize `original`, consuming the controller.
    ///
    /// Returns the outcome and the diagnostics of every pass that ran.
    pub fn run(mut self, original: &RgbaImage) -> (Result<NormalizeResult, PipelineError>, NormalizeDiagnostics) {
        let start = self.clock.now();
        let outcome = self.attempt(original);
        self.diagnostics.total_duration = self.clock.elapsed(&start);
        (outcome, self.diagnostics)
    }

    fn attempt(&mut self, original: &RgbaImage) -> Result<NormalizeResult, PipelineError> {
        let primary = match self.primary(original) {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => e,
        };

        let mode = primary
            .mode()
            .unwrap_or_else(|| detect_mode(original))
            .opposite();
        log::warn!("primary attempt failed ({primary}); retrying in {mode} mode");
        emit(self.progress, &format!("retrying in {mode} mode"));

        match self.pass(original.clone(), Some(mode), PassRole::Recovery) {
            Ok(pass) => {
                log::info!("recovered in {mode} mode");
                emit(self.progress, "recovered");
                self.diagnostics.recovered = true;
                Ok(finish(pass, true))
            }
            Err(recovery) => {
                log::warn!("recovery failed: {recovery}");
                emit(self.progress, "normalization failed");
                Err(PipelineError::Fatal {
                    primary: Box::new(primary),
                    recovery: Box::new(recovery),
                })
            }
        }
    }

    fn primary(&mut self, original: &RgbaImage) -> Result<NormalizeResult, PipelineError> {
        let pass1 = self.pass(original.clone(), None, PassRole::Primary(1))?;
        let pass2 = self.pass(pass1.result_image.clone(), None, PassRole::Primary(2))?;
        let pass3 = self.pass(pass2.result_image.clone(), None, PassRole::Primary(PRIMARY_PASSES))?;

        // Canvases always share a size; a mismatch counts as maximal error.
        let error = rmse(&pass2.result_image, &pass3.result_image).unwrap_or(1.0);
        self.diagnostics.similarity_rmse = Some(error);

        if error < self.config.similarity_threshold {
            log::info!(
                "converged in {} mode (pass 2/3 rmse {error:.4})",
                pass1.mode_used
            );
            emit(self.progress, "converged");
            self.diagnostics.converged = true;
            Ok(finish(pass1, false))
        } else {
            log::info!(
                "passes diverged (rmse {error:.4} >= {})",
                self.config.similarity_threshold
            );
            Err(PipelineError::Stability {
                mode: pass1.mode_used,
                rmse: error,
            })
        }
    }

    fn pass(
        &mut self,
        input: RgbaImage,
        forced: Option<ProcessingMode>,
        role: PassRole,
    ) -> Result<PassResult, PipelineError> {
        let label = forced.map_or_else(|| "auto".to_string(), |m| m.to_string());
        emit(self.progress, &format!("{role}: starting ({label} mode)"));
        let (outcome, diagnostics) = run_pass(
            input,
            forced,
            self.config,
            &mut self.rng,
            role,
            self.clock,
            &mut *self.progress,
        );
        if let Err(e) = &outcome {
            log::debug!("{role} failed: {e}");
        }
        self.diagnostics.passes.push(diagnostics);
        outcome
    }
}

fn finish(pass: PassResult, recovered: bool) -> NormalizeResult {
    let corners = pass.source_corners();
    NormalizeResult {
        final_image: pass.result_image,
        processed_binary_image: pass.processed_binary_image,
        mode: pass.mode_used,
        corners,
        recovered,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::diagnostics::NoClock;

    fn framed_page(size: u32, lo: u32, hi: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            let inside = (lo..=hi).contains(&x) && (lo..=hi).contains(&y);
            let on_frame = x < lo + 3 || x > hi - 3 || y < lo + 3 || y > hi - 3;
            if inside && on_frame {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    fn config() -> NormalizeConfig {
        NormalizeConfig {
            max_dimension: 120,
            border_margin: 6,
            ..NormalizeConfig::default()
        }
    }

    #[test]
    fn clean_frame_converges_without_recovery() {
        let config = config();
        let mut messages: Vec<String> = Vec::new();
        let (outcome, diag) =
            StabilityController::new(&config, &NoClock, &mut messages).run(&framed_page(200, 30, 170));
        let result = outcome.unwrap();
        assert!(!result.recovered);
        assert_eq!(result.final_image.dimensions(), (120, 120));
        assert_eq!(diag.passes.len(), 3);
        assert!(diag.converged);
        assert!(diag.similarity_rmse.unwrap() < config.similarity_threshold);
        assert!(messages.iter().any(|m| m == "converged"));
    }

    #[test]
    fn blank_photo_is_fatal_after_one_recovery() {
        let config = config();
        let blank = RgbaImage::from_pixel(80, 80, Rgba([255, 255, 255, 255]));
        let (outcome, diag) = StabilityController::new(&config, &NoClock, &mut ()).run(&blank);
        let err = outcome.unwrap_err();
        let PipelineError::Fatal { primary, recovery } = err else {
            unreachable!("expected Fatal, got {err:?}");
        };
        assert_eq!(primary.mode(), Some(ProcessingMode::LightBackground));
        assert!(matches!(*primary, PipelineError::ShapeDetection { .. }));
        assert_eq!(recovery.mode(), Some(ProcessingMode::DarkBackground));
        assert_eq!(diag.passes.len(), 2);
        assert_eq!(diag.passes[1].role, PassRole::Recovery);
        assert!(!diag.recovered);
    }

    #[test]
    fn empty_image_fails_in_both_modes() {
        let config = config();
        let (outcome, diag) =
            StabilityController::new(&config, &NoClock, &mut ()).run(&RgbaImage::new(0, 0));
        assert!(matches!(outcome, Err(PipelineError::Fatal { .. })));
        assert_eq!(diag.passes.len(), 2);
    }
}
