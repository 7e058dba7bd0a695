//! Edge sampling along parallel scan lines.
//!
//! For each side, a fixed number of scan lines is spread evenly across
//! the image. Each line is walked pixel by pixel from that side's edge
//! to the middle of the image, and the first dark pixel it meets becomes
//! an [`EdgePoint`]. Lines that never meet a dark pixel contribute
//! nothing.

use crate::binarize::is_dark;
use crate::types::{EdgePoint, PerSide, RgbaImage, Side};

/// Offsets of `count` scan lines spread evenly over `0..extent`,
/// first and last pixel included.
#[must_use]
pub fn scan_positions(extent: u32, count: u32) -> Vec<u32> {
    if extent == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![extent / 2];
    }
    let last = u64::from(extent - 1);
    let steps = u64::from(count - 1);
    (0..u64::from(count))
        .filter_map(|i| u32::try_from(i * last / steps).ok())
        .collect()
}

/// First dark pixel along `coords`, in iteration order.
fn first_dark(image: &RgbaImage, mut coords: impl Iterator<Item = (u32, u32)>) -> Option<EdgePoint> {
    coords
        .find(|&(x, y)| is_dark(*image.get_pixel(x, y)))
        .map(|(x, y)| EdgePoint::new(x, y))
}

/// Collect the first dark pixel along each scan line entering from `side`.
///
/// A scan line stops at the middle of the image, so a side with no
/// boundary of its own yields no points instead of the opposite side's.
#[must_use]
pub fn sample_side(image: &RgbaImage, side: Side, scan_lines: u32) -> Vec<EdgePoint> {
    let (w, h) = image.dimensions();
    let (half_w, half_h) = (w.div_ceil(2), h.div_ceil(2));

    match side {
        Side::Top => scan_positions(w, scan_lines)
            .into_iter()
            .filter_map(|x| first_dark(image, (0..half_h).map(|y| (x, y))))
            .collect(),
        Side::Bottom => scan_positions(w, scan_lines)
            .into_iter()
            .filter_map(|x| first_dark(image, (h / 2..h).rev().map(|y| (x, y))))
            .collect(),
        Side::Left => scan_positions(h, scan_lines)
            .into_iter()
            .filter_map(|y| first_dark(image, (0..half_w).map(|x| (x, y))))
            .collect(),
        Side::Right => scan_positions(h, scan_lines)
            .into_iter()
            .filter_map(|y| first_dark(image, (w / 2..w).rev().map(|x| (x, y))))
            .collect(),
    }
}

/// Sample all four sides.
#[must_use]
pub fn sample_edges(image: &RgbaImage, scan_lines: u32) -> PerSide<Vec<EdgePoint>> {
    let samples = PerSide::from_fn(|side| sample_side(image, side, scan_lines));
    log::debug!(
        "edge samples: top={} bottom={} left={} right={}",
        samples.top.len(),
        samples.bottom.len(),
        samples.left.len(),
        samples.right.len(),
    );
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::{BACKGROUND, FOREGROUND};

    /// 100x100 white image with a 2px black frame spanning 20..=80.
    fn framed() -> RgbaImage {
        RgbaImage::from_fn(100, 100, |x, y| {
            let inside = (20..=80).contains(&x) && (20..=80).contains(&y);
            let on_frame = x <= 21 || x >= 79 || y <= 21 || y >= 79;
            if inside && on_frame { FOREGROUND } else { BACKGROUND }
        })
    }

    #[test]
    fn positions_span_the_full_extent() {
        let p = scan_positions(400, 51);
        assert_eq!(p.len(), 51);
        assert_eq!(p[0], 0);
        assert_eq!(p[50], 399);
        assert!(p.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn positions_degenerate_inputs() {
        assert!(scan_positions(0, 51).is_empty());
        assert_eq!(scan_positions(10, 1), vec![5]);
    }

    #[test]
    fn top_side_hits_upper_frame_edge() {
        let points = sample_side(&framed(), Side::Top, 51);
        assert!(!points.is_empty());
        assert!(points.iter().all(|p| p.y == 20));
        assert!(points.iter().all(|p| (20..=80).contains(&p.x)));
    }

    #[test]
    fn bottom_side_walks_upward() {
        let points = sample_side(&framed(), Side::Bottom, 51);
        assert!(points.iter().all(|p| p.y == 80));
    }

    #[test]
    fn left_and_right_sides() {
        let img = framed();
        assert!(sample_side(&img, Side::Left, 51).iter().all(|p| p.x == 20));
        assert!(sample_side(&img, Side::Right, 51).iter().all(|p| p.x == 80));
    }

    #[test]
    fn blank_image_yields_no_points() {
        let img = RgbaImage::from_pixel(50, 50, BACKGROUND);
        let samples = sample_edges(&img, 51);
        assert!(samples.top.is_empty());
        assert!(samples.bottom.is_empty());
        assert!(samples.left.is_empty());
        assert!(samples.right.is_empty());
    }

    #[test]
    fn open_side_does_not_reach_the_opposite_edge() {
        // Frame without its bottom bar.
        let img = RgbaImage::from_fn(100, 100, |x, y| {
            let inside = (20..=80).contains(&x) && (20..=80).contains(&y);
            let on_frame = x <= 21 || x >= 79 || y <= 21;
            if inside && on_frame { FOREGROUND } else { BACKGROUND }
        });
        let samples = sample_edges(&img, 51);
        assert!(samples.bottom.iter().all(|p| p.x <= 21 || p.x >= 79));
        assert!(samples.bottom.len() <= 2);
        assert!(samples.top.iter().all(|p| p.y == 20));
    }

    #[test]
    fn scan_count_bounds_point_count() {
        let points = sample_side(&RgbaImage::from_pixel(200, 200, FOREGROUND), Side::Left, 11);
        assert_eq!(points.len(), 11);
        assert!(points.iter().all(|p| p.x == 0));
    }
}
