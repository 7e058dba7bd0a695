//! Four-point projective transform.
//!
//! The transform is stored as the eight free coefficients of a 3×3 matrix
//! whose bottom-right entry is fixed to one:
//!
//! ```text
//! x = (h0*u + h1*v + h2) / (h6*u + h7*v + 1)
//! y = (h3*u + h4*v + h5) / (h6*u + h7*v + 1)
//! ```
//!
//! Solving from four correspondences is an 8×8 linear system, reduced by
//! Gaussian elimination with partial pivoting.

use crate::types::Point;

/// Pivots below this make the system unsolvable.
const PIVOT_EPSILON: f64 = 1e-12;

/// Eight-parameter projective transform from `(u, v)` to `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    /// Row-major coefficients `h0..h7`; `h8` is one.
    pub h: [f64; 8],
}

impl Homography {
    /// Transform mapping each `from[i]` onto `to[i]`.
    ///
    /// Returns `None` when the correspondences are degenerate (three or
    /// more collinear points, repeated points) and the system has a zero
    /// pivot.
    #[must_use]
    pub fn from_correspondences(from: &[Point; 4], to: &[Point; 4]) -> Option<Self> {
        let mut a = [[0.0f64; 9]; 8];
        for (k, (src, dst)) in from.iter().zip(to).enumerate() {
            let (u, v) = (src.x, src.y);
            let (x, y) = (dst.x, dst.y);
            a[2 * k] = [u, v, 1.0, 0.0, 0.0, 0.0, -u * x, -v * x, x];
            a[2 * k + 1] = [0.0, 0.0, 0.0, u, v, 1.0, -u * y, -v * y, y];
        }
        solve_augmented(&mut a).map(|h| Self { h })
    }

    /// Map `p` through the transform, or `None` when it lands at infinity.
    #[must_use]
    pub fn apply(&self, p: Point) -> Option<Point> {
        let h = &self.h;
        let w = h[6].mul_add(p.x, h[7].mul_add(p.y, 1.0));
        if w.abs() < PIVOT_EPSILON {
            return None;
        }
        let x = h[0].mul_add(p.x, h[1].mul_add(p.y, h[2]));
        let y = h[3].mul_add(p.x, h[4].mul_add(p.y, h[5]));
        Some(Point::new(x / w, y / w))
    }
}

/// Solve an 8×8 system given as an augmented 8×9 matrix.
fn solve_augmented(a: &mut [[f64; 9]; 8]) -> Option<[f64; 8]> {
    const N: usize = 8;

    for col in 0..N {
        let pivot_row = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() < PIVOT_EPSILON {
            return None;
        }
        a.swap(col, pivot_row);

        let pivot = a[col];
        for row in &mut a[col + 1..] {
            let factor = row[col] / pivot[col];
            for (value, p) in row[col..].iter_mut().zip(&pivot[col..]) {
                *value = factor.mul_add(-p, *value);
            }
        }
    }

    let mut x = [0.0f64; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (a[row][N] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn square(side: f64) -> [Point; 4] {
        [
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ]
    }

    fn assert_close(a: Point, b: Point) {
        let scale = b.x.abs().max(b.y.abs()).max(1.0);
        assert!(
            a.distance(b) / scale <= 1e-6,
            "expected ({}, {}), got ({}, {})",
            b.x,
            b.y,
            a.x,
            a.y
        );
    }

    #[test]
    fn maps_destination_corners_onto_source_corners() {
        let dst = square(279.0);
        let src = [
            Point::new(61.5, 40.2),
            Point::new(355.0, 58.9),
            Point::new(340.7, 371.3),
            Point::new(38.0, 349.6),
        ];
        let h = Homography::from_correspondences(&dst, &src).unwrap();
        for (d, s) in dst.iter().zip(&src) {
            assert_close(h.apply(*d).unwrap(), *s);
        }
    }

    /// Jitter each corner of a `side` square by up to a quarter of the
    /// side, which keeps the quad convex.
    fn jittered_square(rng: &mut StdRng, side: f64, origin: Point) -> [Point; 4] {
        let j = side / 4.0;
        square(side).map(|p| {
            Point::new(
                origin.x + p.x + rng.gen_range(-j..j),
                origin.y + p.y + rng.gen_range(-j..j),
            )
        })
    }

    #[test]
    fn round_trip_holds_for_random_quads() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let dst = jittered_square(&mut rng, 279.0, Point::new(0.0, 0.0));
            let side = rng.gen_range(50.0..900.0);
            let src = jittered_square(&mut rng, side, Point::new(40.0, 25.0));
            let h = Homography::from_correspondences(&dst, &src).unwrap();
            for (d, s) in dst.iter().zip(&src) {
                assert_close(h.apply(*d).unwrap(), *s);
            }
        }
    }

    #[test]
    fn identity_for_equal_quads() {
        let q = square(100.0);
        let h = Homography::from_correspondences(&q, &q).unwrap();
        assert_close(h.apply(Point::new(37.0, 81.0)).unwrap(), Point::new(37.0, 81.0));
    }

    #[test]
    fn pure_scale_and_translation() {
        let from = square(10.0);
        let to = from.map(|p| Point::new(p.x.mul_add(3.0, 5.0), p.y.mul_add(3.0, 7.0)));
        let h = Homography::from_correspondences(&from, &to).unwrap();
        assert_close(h.apply(Point::new(5.0, 5.0)).unwrap(), Point::new(20.0, 22.0));
        assert!(h.h[6].abs() < 1e-12 && h.h[7].abs() < 1e-12);
    }

    #[test]
    fn collinear_source_is_degenerate() {
        let dst = square(100.0);
        let line = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ];
        assert!(Homography::from_correspondences(&line, &dst).is_none());
    }
}
