//! Corner solving by intersecting adjacent side lines.

use crate::types::{Corner, FittedLine, PerSide, PipelineError, Point, ProcessingMode, Quad};

/// Determinants below this are treated as parallel lines.
const PARALLEL_EPSILON: f64 = 1e-9;

/// Intersection of two fitted lines, or `None` when they are parallel.
#[must_use]
pub fn intersect(a: &FittedLine, b: &FittedLine) -> Option<Point> {
    let (a1, b1, c1) = a.implicit();
    let (a2, b2, c2) = b.implicit();
    let det = a1.mul_add(b2, -(a2 * b1));
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }
    Some(Point::new(
        c1.mul_add(b2, -(c2 * b1)) / det,
        a1.mul_add(c2, -(a2 * c1)) / det,
    ))
}

/// Solve the four grid corners from the fitted side lines.
///
/// # Errors
///
/// Returns [`PipelineError::Intersection`] naming the first corner whose
/// two lines are parallel.
pub fn solve_corners(lines: &PerSide<FittedLine>, mode: ProcessingMode) -> Result<Quad, PipelineError> {
    let solve = |corner: Corner, h: &FittedLine, v: &FittedLine| {
        intersect(h, v).ok_or(PipelineError::Intersection { mode, corner })
    };
    let quad = Quad {
        top_left: solve(Corner::TopLeft, &lines.top, &lines.left)?,
        top_right: solve(Corner::TopRight, &lines.top, &lines.right)?,
        bottom_right: solve(Corner::BottomRight, &lines.bottom, &lines.right)?,
        bottom_left: solve(Corner::BottomLeft, &lines.bottom, &lines.left)?,
    };
    log::debug!(
        "corners: tl=({:.1}, {:.1}) tr=({:.1}, {:.1}) br=({:.1}, {:.1}) bl=({:.1}, {:.1})",
        quad.top_left.x,
        quad.top_left.y,
        quad.top_right.x,
        quad.top_right.y,
        quad.bottom_right.x,
        quad.bottom_right.y,
        quad.bottom_left.x,
        quad.bottom_left.y,
    );
    Ok(quad)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::LineOrientation;

    const fn horizontal(slope: f64, intercept: f64) -> FittedLine {
        FittedLine {
            slope,
            intercept,
            orientation: LineOrientation::Horizontal,
        }
    }

    const fn vertical(slope: f64, intercept: f64) -> FittedLine {
        FittedLine {
            slope,
            intercept,
            orientation: LineOrientation::Vertical,
        }
    }

    #[test]
    fn axis_aligned_lines_meet_at_expected_point() {
        let p = intersect(&horizontal(0.0, 50.0), &vertical(0.0, 350.0)).unwrap();
        assert!((p.x - 350.0).abs() < 1e-9);
        assert!((p.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn skewed_lines_intersection_lies_on_both() {
        let h = horizontal(0.1, 20.0);
        let v = vertical(-0.2, 300.0);
        let p = intersect(&h, &v).unwrap();
        assert!(h.distance(p) < 1e-9);
        assert!(v.distance(p) < 1e-9);
    }

    #[test]
    fn parallel_lines_do_not_intersect() {
        // y = x + 1 and x = y + 3 are both slope one.
        assert!(intersect(&horizontal(1.0, 1.0), &vertical(1.0, 3.0)).is_none());
    }

    #[test]
    fn square_corners() {
        let lines = PerSide {
            top: horizontal(0.0, 50.0),
            bottom: horizontal(0.0, 350.0),
            left: vertical(0.0, 50.0),
            right: vertical(0.0, 350.0),
        };
        let quad = solve_corners(&lines, ProcessingMode::LightBackground).unwrap();
        assert_eq!(quad.top_left, Point::new(50.0, 50.0));
        assert_eq!(quad.top_right, Point::new(350.0, 50.0));
        assert_eq!(quad.bottom_right, Point::new(350.0, 350.0));
        assert_eq!(quad.bottom_left, Point::new(50.0, 350.0));
    }

    #[test]
    fn parallel_corner_reports_which_corner() {
        let lines = PerSide {
            top: horizontal(0.0, 50.0),
            bottom: horizontal(1.0, 0.0),
            left: vertical(0.0, 50.0),
            right: vertical(1.0, 0.0),
        };
        let err = solve_corners(&lines, ProcessingMode::DarkBackground).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Intersection {
                mode: ProcessingMode::DarkBackground,
                corner: Corner::BottomRight,
            }
        ));
    }
}
