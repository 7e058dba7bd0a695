//! Normalization diagnostics: per-pass, per-stage timing and metrics.
//!
//! Every call to [`normalize_with_diagnostics`](crate::normalize_with_diagnostics)
//! records one [`PassDiagnostics`] per pipeline pass it ran, in order,
//! including the failing pass and the recovery pass when those happen.
//!
//! Timing goes through the [`Clock`] trait so the library never touches a
//! platform clock itself. [`NoClock`] records zero durations.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{PerSide, ProcessingMode, Quad};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of elapsed time for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Working-copy preparation.
    Prepare {
        /// Pass input width.
        source_width: u32,
        /// Pass input height.
        source_height: u32,
        /// Working copy width.
        working_width: u32,
        /// Working copy height.
        working_height: u32,
        /// Whether the working copy was downscaled.
        downsampled: bool,
    },
    /// Mode detection and binarization.
    Binarize {
        /// Mode used.
        mode: ProcessingMode,
        /// Whether the mode was forced rather than detected.
        forced: bool,
        /// Histogram peak the threshold came from.
        peak: u8,
        /// Foreground pixels written.
        foreground_pixels: u64,
        /// Total pixels in the working copy.
        total_pixels: u64,
    },
    /// Boundary-connected noise removal.
    BorderClean {
        /// Pixels cleared to background.
        cleared_pixels: u64,
        /// Foreground pixels left afterwards.
        remaining_foreground: u64,
    },
    /// Scan-line edge sampling.
    EdgeSampling {
        /// Scan lines per side.
        scan_lines: u32,
        /// Points found per side.
        points: PerSide<usize>,
    },
    /// Outlier removal and consensus fitting.
    LineFitting {
        /// Points left per side after outlier removal.
        kept: PerSide<usize>,
        /// Consensus inliers per side.
        inliers: PerSide<usize>,
    },
    /// Line intersection.
    CornerSolving {
        /// Corners in working-image coordinates.
        corners: Quad,
    },
    /// Perspective resampling.
    Warp {
        /// Canvas side length.
        output_size: u32,
        /// Active square side length.
        active_size: u32,
        /// Active pixels whose source fell outside the image.
        outside_pixels: u64,
    },
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name.
    pub stage: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Which attempt a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassRole {
    /// One of the three primary passes, numbered from one.
    Primary(u8),
    /// The single opposite-mode retry on the original photograph.
    Recovery,
}

impl fmt::Display for PassRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary(n) => write!(f, "pass {n}"),
            Self::Recovery => f.write_str("recovery"),
        }
    }
}

/// Diagnostics for one full detection-and-warp pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassDiagnostics {
    /// Which attempt this was.
    pub role: PassRole,
    /// Mode in use, once known.
    pub mode: Option<ProcessingMode>,
    /// Stages that completed, in order.
    pub stages: Vec<StageDiagnostics>,
    /// Total duration of the pass (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Error message when the pass failed.
    pub error: Option<String>,
}

/// Diagnostics collected from a single normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeDiagnostics {
    /// Every pass run, in order.
    pub passes: Vec<PassDiagnostics>,
    /// RMSE between the pass 2 and pass 3 outputs, when both ran.
    pub similarity_rmse: Option<f64>,
    /// Whether passes 2 and 3 agreed.
    pub converged: bool,
    /// Whether the result came from the recovery pass.
    pub recovered: bool,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl NormalizeDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Normalization Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        let similarity = self
            .similarity_rmse
            .map_or_else(|| "n/a".to_string(), |e| format!("{e:.4}"));
        lines.push(format!(
            "Pass 2/3 rmse: {similarity}  |  converged: {}  |  recovered: {}",
            self.converged, self.recovered,
        ));

        let total_ms = duration_ms(self.total_duration);
        for pass in &self.passes {
            lines.push(String::new());
            let mode = pass.mode.map_or_else(|| "?".to_string(), |m| m.to_string());
            lines.push(format!(
                "{} [{mode}] {:.3}ms",
                pass.role,
                duration_ms(pass.duration),
            ));
            lines.push(format!(
                "{:<24} {:>10} {:>10}  {}",
                "Stage", "Duration", "% Total", "Details"
            ));
            lines.push("-".repeat(80));
            for stage in &pass.stages {
                let ms = duration_ms(stage.duration);
                let pct = if total_ms > 0.0 {
                    ms / total_ms * 100.0
                } else {
                    0.0
                };
                let details = format_metrics(&stage.metrics);
                lines.push(format!("{:<24} {ms:>8.3}ms {pct:>9.1}%  {details}", stage.stage));
            }
            if let Some(error) = &pass.error {
                lines.push(format!("FAILED: {error}"));
            }
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn per_side(values: &PerSide<usize>) -> String {
    format!(
        "t={} b={} l={} r={}",
        values.top, values.bottom, values.left, values.right
    )
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Prepare {
            source_width,
            source_height,
            working_width,
            working_height,
            downsampled,
        } => {
            let note = if *downsampled { "" } else { " (unchanged)" };
            format!("{source_width}x{source_height} -> {working_width}x{working_height}{note}")
        }
        StageMetrics::Binarize {
            mode,
            forced,
            peak,
            foreground_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *foreground_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            let how = if *forced { "forced" } else { "auto" };
            format!("{mode} ({how}) peak={peak} fg={foreground_pixels} ({density:.1}%)")
        }
        StageMetrics::BorderClean {
            cleared_pixels,
            remaining_foreground,
        } => format!("cleared={cleared_pixels} remaining={remaining_foreground}"),
        StageMetrics::EdgeSampling { scan_lines, points } => {
            format!("{scan_lines} lines/side, points {}", per_side(points))
        }
        StageMetrics::LineFitting { kept, inliers } => {
            format!("kept {}, inliers {}", per_side(kept), per_side(inliers))
        }
        StageMetrics::CornerSolving { corners } => {
            let [a, b, c, d] = corners.to_array();
            format!(
                "({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1})",
                a.x, a.y, b.x, b.y, c.x, c.y, d.x, d.y
            )
        }
        StageMetrics::Warp {
            output_size,
            active_size,
            outside_pixels,
        } => format!("{output_size}px canvas, {active_size}px active, {outside_pixels} outside"),
    }
}
