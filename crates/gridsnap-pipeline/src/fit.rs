//! Robust line fitting for one side of the grid.
//!
//! Two stages: a Tukey fence on each coordinate drops gross outliers,
//! then a seeded consensus search picks the two-point line with the
//! largest inlier band and a least-squares regression over that band
//! produces the final line.

use rand::Rng;

use crate::types::{EdgePoint, FittedLine, LineOrientation, NormalizeConfig, Point};

/// Point sets of this size or smaller skip outlier removal.
pub const MIN_POINTS_FOR_OUTLIER_REMOVAL: usize = 10;

/// Multiplier applied to the interquartile range for the fence.
pub const IQR_FENCE: f64 = 1.5;

/// Determinants and pivots below this are treated as zero.
const SINGULAR_EPSILON: f64 = 1e-9;

/// Tukey fence `[q1 - k*iqr, q3 + k*iqr]` over one coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fence {
    low: f64,
    high: f64,
}

impl Fence {
    fn from_values(mut values: Vec<u32>) -> Self {
        values.sort_unstable();
        let n = values.len();
        let q1 = f64::from(values[n / 4]);
        let q3 = f64::from(values[3 * n / 4]);
        let iqr = q3 - q1;
        Self {
            low: IQR_FENCE.mul_add(-iqr, q1),
            high: IQR_FENCE.mul_add(iqr, q3),
        }
    }

    fn contains(self, value: u32) -> bool {
        let v = f64::from(value);
        v >= self.low && v <= self.high
    }
}

/// Drop points whose x or y lies outside the 1.5×IQR fence for that
/// coordinate.
///
/// Sets of [`MIN_POINTS_FOR_OUTLIER_REMOVAL`] points or fewer are
/// returned unchanged.
#[must_use]
pub fn remove_outliers(points: &[EdgePoint]) -> Vec<EdgePoint> {
    if points.len() <= MIN_POINTS_FOR_OUTLIER_REMOVAL {
        return points.to_vec();
    }
    let fx = Fence::from_values(points.iter().map(|p| p.x).collect());
    let fy = Fence::from_values(points.iter().map(|p| p.y).collect());
    points
        .iter()
        .copied()
        .filter(|p| fx.contains(p.x) && fy.contains(p.y))
        .collect()
}

/// Result of a successful [`LineFitter::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct LineFit {
    /// Least-squares line over the consensus inliers.
    pub line: FittedLine,
    /// Size of the best consensus set.
    pub inlier_count: usize,
    /// Best inlier count after each iteration.
    pub history: Vec<usize>,
}

/// Consensus line fitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFitter {
    /// Number of two-point samples drawn.
    pub iterations: u32,
    /// Maximum perpendicular distance for an inlier, in pixels.
    pub inlier_threshold: f64,
}

impl LineFitter {
    /// Fitter using the iteration count and inlier band from `config`.
    #[must_use]
    pub const fn from_config(config: &NormalizeConfig) -> Self {
        Self {
            iterations: config.ransac_iterations,
            inlier_threshold: config.inlier_threshold,
        }
    }

    /// Fit a line of the given orientation to `points`.
    ///
    /// Every iteration draws two distinct points from `rng`, so the same
    /// generator state and input always produce the same line. Ties keep
    /// the earlier candidate. Returns `None` when fewer than two points
    /// are given, when no candidate gathers two inliers, or when the
    /// inliers cannot be regressed (all share one independent coordinate).
    pub fn fit(
        &self,
        points: &[EdgePoint],
        orientation: LineOrientation,
        rng: &mut impl Rng,
    ) -> Option<LineFit> {
        let n = points.len();
        if n < 2 {
            return None;
        }
        let pts: Vec<Point> = points.iter().map(|p| p.to_point()).collect();

        let mut best: Option<Vec<Point>> = None;
        let mut best_inlier_count = 0usize;
        let mut history = Vec::with_capacity(self.iterations as usize);

        for _ in 0..self.iterations {
            let i = rng.gen_range(0..n);
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }

            if let Some(candidate) = line_through(pts[i], pts[j], orientation) {
                let inliers: Vec<Point> = pts
                    .iter()
                    .copied()
                    .filter(|&p| candidate.distance(p) <= self.inlier_threshold)
                    .collect();
                if inliers.len() > best_inlier_count {
                    best_inlier_count = inliers.len();
                    best = Some(inliers);
                }
            }
            history.push(best_inlier_count);
        }

        let inliers = best?;
        if inliers.len() < 2 {
            return None;
        }
        let line = least_squares(&inliers, orientation)?;
        log::debug!(
            "line fit ({orientation:?}): {best_inlier_count}/{n} inliers, slope={:.4} intercept={:.2}",
            line.slope,
            line.intercept,
        );
        Some(LineFit {
            line,
            inlier_count: best_inlier_count,
            history,
        })
    }
}

/// Line through two points, or `None` when they share the independent
/// coordinate.
fn line_through(a: Point, b: Point, orientation: LineOrientation) -> Option<FittedLine> {
    let (ta, sa) = FittedLine::axes(orientation, a);
    let (tb, sb) = FittedLine::axes(orientation, b);
    let dt = tb - ta;
    if dt.abs() < SINGULAR_EPSILON {
        return None;
    }
    let slope = (sb - sa) / dt;
    Some(FittedLine {
        slope,
        intercept: slope.mul_add(-ta, sa),
        orientation,
    })
}

/// Ordinary least squares of the dependent coordinate on the independent
/// one.
#[allow(clippy::cast_precision_loss)]
fn least_squares(points: &[Point], orientation: LineOrientation) -> Option<FittedLine> {
    let n = points.len() as f64;
    let (mut st, mut ss, mut stt, mut sts) = (0.0, 0.0, 0.0, 0.0);
    for &p in points {
        let (t, s) = FittedLine::axes(orientation, p);
        st += t;
        ss += s;
        stt += t * t;
        sts += t * s;
    }
    let denom = n.mul_add(stt, -(st * st));
    if denom.abs() < SINGULAR_EPSILON {
        return None;
    }
    let slope = n.mul_add(sts, -(st * ss)) / denom;
    let intercept = slope.mul_add(-st, ss) / n;
    Some(FittedLine {
        slope,
        intercept,
        orientation,
    })
}
