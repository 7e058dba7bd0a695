//! Shared types for the gridsnap normalization pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleFilter;

/// Re-export `RgbaImage` so downstream crates can hand pixel buffers to
/// the pipeline without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Multiply both coordinates by `factor`.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing image.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Length of the longer side.
    #[must_use]
    pub fn longest_side(self) -> u32 {
        self.width.max(self.height)
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Whether the photographed grid is dark-on-light or light-on-dark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Dark grid lines on a light background (paper, whiteboard).
    LightBackground,
    /// Light grid lines on a dark background (screen, chalkboard).
    DarkBackground,
}

impl ProcessingMode {
    /// The other mode.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::LightBackground => Self::DarkBackground,
            Self::DarkBackground => Self::LightBackground,
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LightBackground => f.write_str("light-background"),
            Self::DarkBackground => f.write_str("dark-background"),
        }
    }
}

/// One of the four logical sides of the grid quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Upper edge, found by scanning columns downward.
    Top,
    /// Lower edge, found by scanning columns upward.
    Bottom,
    /// Left edge, found by scanning rows rightward.
    Left,
    /// Right edge, found by scanning rows leftward.
    Right,
}

impl Side {
    /// All sides in processing order.
    pub const ALL: [Self; 4] = [Self::Top, Self::Bottom, Self::Left, Self::Right];

    /// Orientation of the line this side is fitted with.
    #[must_use]
    pub const fn orientation(self) -> LineOrientation {
        match self {
            Self::Top | Self::Bottom => LineOrientation::Horizontal,
            Self::Left | Self::Right => LineOrientation::Vertical,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("top"),
            Self::Bottom => f.write_str("bottom"),
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// One value per grid side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSide<T> {
    /// Value for [`Side::Top`].
    pub top: T,
    /// Value for [`Side::Bottom`].
    pub bottom: T,
    /// Value for [`Side::Left`].
    pub left: T,
    /// Value for [`Side::Right`].
    pub right: T,
}

impl<T> PerSide<T> {
    /// Build by evaluating `f` once per side, in [`Side::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(Side) -> T) -> Self {
        Self {
            top: f(Side::Top),
            bottom: f(Side::Bottom),
            left: f(Side::Left),
            right: f(Side::Right),
        }
    }

    /// Fallible variant of [`from_fn`](Self::from_fn); stops at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_from_fn<E>(mut f: impl FnMut(Side) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            top: f(Side::Top)?,
            bottom: f(Side::Bottom)?,
            left: f(Side::Left)?,
            right: f(Side::Right)?,
        })
    }

    /// Borrow the value for `side`.
    #[must_use]
    pub const fn get(&self, side: Side) -> &T {
        match side {
            Side::Top => &self.top,
            Side::Bottom => &self.bottom,
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Map every value through `f`.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerSide<U> {
        PerSide {
            top: f(&self.top),
            bottom: f(&self.bottom),
            left: f(&self.left),
            right: f(&self.right),
        }
    }
}

/// A boundary-crossing pixel found while scanning in from one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePoint {
    /// Column of the first dark pixel.
    pub x: u32,
    /// Row of the first dark pixel.
    pub y: u32,
}

impl EdgePoint {
    /// Create a new edge point.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Convert to floating-point coordinates.
    #[must_use]
    pub fn to_point(self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// Which axis a [`FittedLine`] treats as independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineOrientation {
    /// `y = slope * x + intercept` (top and bottom sides).
    Horizontal,
    /// `x = slope * y + intercept` (left and right sides).
    Vertical,
}

/// A straight line fitted to one side of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedLine {
    /// Change of the dependent coordinate per unit of the independent one.
    pub slope: f64,
    /// Dependent coordinate where the independent one is zero.
    pub intercept: f64,
    /// Which axis is independent.
    pub orientation: LineOrientation,
}

impl FittedLine {
    /// Split a point into `(independent, dependent)` coordinates for this
    /// line's orientation.
    #[must_use]
    pub const fn axes(orientation: LineOrientation, p: Point) -> (f64, f64) {
        match orientation {
            LineOrientation::Horizontal => (p.x, p.y),
            LineOrientation::Vertical => (p.y, p.x),
        }
    }

    /// Perpendicular distance from `p` to the line.
    #[must_use]
    pub fn distance(&self, p: Point) -> f64 {
        let (t, s) = Self::axes(self.orientation, p);
        self.slope.mul_add(t, self.intercept - s).abs() / self.slope.hypot(1.0)
    }

    /// Coefficients `(a, b, c)` of the implicit form `a*x + b*y = c`.
    #[must_use]
    pub const fn implicit(&self) -> (f64, f64, f64) {
        match self.orientation {
            LineOrientation::Horizontal => (-self.slope, 1.0, self.intercept),
            LineOrientation::Vertical => (1.0, -self.slope, self.intercept),
        }
    }
}

/// The four corners of the detected grid quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    /// Intersection of the top and left lines.
    pub top_left: Point,
    /// Intersection of the top and right lines.
    pub top_right: Point,
    /// Intersection of the bottom and right lines.
    pub bottom_right: Point,
    /// Intersection of the bottom and left lines.
    pub bottom_left: Point,
}

impl Quad {
    /// Corners in clockwise order starting at the top-left.
    #[must_use]
    pub const fn to_array(self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Scale every corner by `factor`.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            top_left: self.top_left.scaled(factor),
            top_right: self.top_right.scaled(factor),
            bottom_right: self.bottom_right.scaled(factor),
            bottom_left: self.bottom_left.scaled(factor),
        }
    }
}

/// Corner identifiers, used to report which intersection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Corner {
    /// Top and left lines.
    TopLeft,
    /// Top and right lines.
    TopRight,
    /// Bottom and right lines.
    BottomRight,
    /// Bottom and left lines.
    BottomLeft,
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLeft => f.write_str("top-left"),
            Self::TopRight => f.write_str("top-right"),
            Self::BottomRight => f.write_str("bottom-right"),
            Self::BottomLeft => f.write_str("bottom-left"),
        }
    }
}

/// Configuration for the normalization pipeline.
///
/// All parameters have defaults that reproduce the reference behavior:
/// 51 scan lines, 50 seeded consensus iterations with a 3 pixel inlier
/// band, a 1000 pixel working resolution and a 0.1 similarity bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Side length of the square output canvas, border included.
    pub max_dimension: u32,

    /// Margin in pixels between the canvas edge and the warped grid.
    pub border_margin: u32,

    /// Longest side of the working copy of the photograph. Larger
    /// photographs are downscaled before detection and resampling.
    pub working_resolution: u32,

    /// Resampling filter used for the working copy.
    pub downsample_filter: DownsampleFilter,

    /// Number of parallel scan lines per side.
    pub scan_lines: u32,

    /// Number of consensus iterations per side.
    pub ransac_iterations: u32,

    /// Maximum perpendicular distance, in pixels, for a consensus inlier.
    pub inlier_threshold: f64,

    /// Seed for the per-invocation pseudo-random generator.
    pub seed: u64,

    /// Largest RMSE (as a fraction of 255) at which two pass outputs
    /// still count as converged.
    pub similarity_threshold: f64,
}

impl NormalizeConfig {
    /// Default canonical output size.
    pub const DEFAULT_MAX_DIMENSION: u32 = 800;
    /// Default border margin.
    pub const DEFAULT_BORDER_MARGIN: u32 = 10;
    /// Default working resolution.
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 1000;
    /// Default downsample filter.
    pub const DEFAULT_DOWNSAMPLE_FILTER: DownsampleFilter = DownsampleFilter::Triangle;
    /// Default number of scan lines per side.
    pub const DEFAULT_SCAN_LINES: u32 = 51;
    /// Default number of consensus iterations.
    pub const DEFAULT_RANSAC_ITERATIONS: u32 = 50;
    /// Default inlier distance in pixels.
    pub const DEFAULT_INLIER_THRESHOLD: f64 = 3.0;
    /// Default generator seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Default convergence bound.
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.1;

    /// Side length of the warped square inside the border.
    #[must_use]
    pub const fn active_size(&self) -> u32 {
        self.max_dimension.saturating_sub(2 * self.border_margin)
    }

    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_dimension <= 2 * self.border_margin + 1 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_dimension ({}) must exceed twice the border margin ({}) plus one",
                self.max_dimension, self.border_margin,
            )));
        }
        if self.working_resolution == 0 {
            return Err(PipelineError::InvalidConfig(
                "working_resolution must be positive".to_string(),
            ));
        }
        if self.scan_lines < 2 {
            return Err(PipelineError::InvalidConfig(
                "scan_lines must be at least 2".to_string(),
            ));
        }
        if self.ransac_iterations == 0 {
            return Err(PipelineError::InvalidConfig(
                "ransac_iterations must be positive".to_string(),
            ));
        }
        if !(self.inlier_threshold.is_finite() && self.inlier_threshold > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "inlier_threshold must be finite and positive, got {}",
                self.inlier_threshold,
            )));
        }
        if !(self.similarity_threshold.is_finite() && self.similarity_threshold > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "similarity_threshold must be finite and positive, got {}",
                self.similarity_threshold,
            )));
        }
        Ok(())
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
            border_margin: Self::DEFAULT_BORDER_MARGIN,
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
            scan_lines: Self::DEFAULT_SCAN_LINES,
            ransac_iterations: Self::DEFAULT_RANSAC_ITERATIONS,
            inlier_threshold: Self::DEFAULT_INLIER_THRESHOLD,
            seed: Self::DEFAULT_SEED,
            similarity_threshold: Self::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Output of one full detection-and-warp pass.
#[derive(Debug, Clone)]
pub struct PassResult {
    /// The canonical square, `max_dimension` on each side.
    pub result_image: RgbaImage,
    /// The binarized, border-cleaned working image the corners were
    /// detected on.
    pub processed_binary_image: RgbaImage,
    /// Mode the pass ran in.
    pub mode_used: ProcessingMode,
    /// Lines fitted to each side, in working-image coordinates.
    pub lines: PerSide<FittedLine>,
    /// Detected corners, in working-image coordinates.
    pub corners: Quad,
    /// Ratio of source to working-image size (`1.0` when no downscale).
    pub working_scale: f64,
}

impl PassResult {
    /// Detected corners mapped back to the pass input's coordinates.
    #[must_use]
    pub fn source_corners(&self) -> Quad {
        self.corners.scaled(self.working_scale)
    }
}

/// Final output of [`crate::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeResult {
    /// The normalized square image for downstream symbol detection.
    pub final_image: RgbaImage,
    /// The binary image the accepted pass detected the grid on.
    pub processed_binary_image: RgbaImage,
    /// Mode of the accepted pass.
    pub mode: ProcessingMode,
    /// Detected corners in the original photograph's coordinates.
    pub corners: Quad,
    /// `true` when the result came from the opposite-mode recovery pass.
    pub recovered: bool,
}

/// Errors that can occur during normalization.
///
/// Stage failures carry the [`ProcessingMode`] that was active so the
/// stability controller knows which mode to flip to. Input errors
/// ([`EmptyInput`](Self::EmptyInput), [`ImageDecode`](Self::ImageDecode),
/// [`ImageEncode`](Self::ImageEncode), [`InvalidConfig`](Self::InvalidConfig))
/// are never retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode an output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Too few edge points survived outlier removal on one side.
    #[error("shape detection failed on the {side} side ({found} usable points, {mode})")]
    ShapeDetection {
        /// Mode in use.
        mode: ProcessingMode,
        /// Side with too few points.
        side: Side,
        /// Points left after outlier removal.
        found: usize,
    },

    /// Consensus fitting and refinement produced no line for a side.
    #[error("line fitting failed on the {side} side ({mode})")]
    LineFitting {
        /// Mode in use.
        mode: ProcessingMode,
        /// Side that could not be fitted.
        side: Side,
    },

    /// Two lines meeting at a corner are parallel.
    #[error("{corner} corner lines do not intersect ({mode})")]
    Intersection {
        /// Mode in use.
        mode: ProcessingMode,
        /// Corner that could not be resolved.
        corner: Corner,
    },

    /// The projective system for the detected corners is singular.
    #[error("perspective transform is degenerate ({mode})")]
    DegenerateTransform {
        /// Mode in use.
        mode: ProcessingMode,
    },

    /// Passes 2 and 3 did not agree.
    #[error("passes diverged (rmse {rmse:.4}, pass 1 ran in {mode})")]
    Stability {
        /// Mode pass 1 ran in.
        mode: ProcessingMode,
        /// Normalized RMSE between pass 2 and pass 3, or `1.0` when
        /// their sizes differ.
        rmse: f64,
    },

    /// Both the primary attempt and the opposite-mode recovery failed.
    #[error("photograph could not be normalized: {primary}; recovery: {recovery}")]
    Fatal {
        /// Failure of the primary attempt.
        primary: Box<PipelineError>,
        /// Failure of the recovery attempt.
        recovery: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Mode in use when the error occurred, if the error is tied to one.
    #[must_use]
    pub const fn mode(&self) -> Option<ProcessingMode> {
        match self {
            Self::ShapeDetection { mode, .. }
            | Self::LineFitting { mode, .. }
            | Self::Intersection { mode, .. }
            | Self::DegenerateTransform { mode }
            | Self::Stability { mode, .. } => Some(*mode),
            Self::ImageDecode(_)
            | Self::ImageEncode(_)
            | Self::EmptyInput
            | Self::InvalidConfig(_)
            | Self::Fatal { .. } => None,
        }
    }

    /// Whether the stability controller may retry after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ShapeDetection { .. }
                | Self::LineFitting { .. }
                | Self::Intersection { .. }
                | Self::DegenerateTransform { .. }
                | Self::Stability { .. }
        )
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    ImageEncode(String),
    EmptyInput,
    InvalidConfig(String),
    ShapeDetection {
        mode: ProcessingMode,
        side: Side,
        found: usize,
    },
    LineFitting {
        mode: ProcessingMode,
        side: Side,
    },
    Intersection {
        mode: ProcessingMode,
        corner: Corner,
    },
    DegenerateTransform {
        mode: ProcessingMode,
    },
    Stability {
        mode: ProcessingMode,
        rmse: f64,
    },
    Fatal {
        primary: Box<PipelineErrorProxy>,
        recovery: Box<PipelineErrorProxy>,
    },
}

impl From<&PipelineError> for PipelineErrorProxy {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::ImageDecode(e) => Self::ImageDecode(e.to_string()),
            PipelineError::ImageEncode(s) => Self::ImageEncode(s.clone()),
            PipelineError::EmptyInput => Self::EmptyInput,
            PipelineError::InvalidConfig(s) => Self::InvalidConfig(s.clone()),
            PipelineError::ShapeDetection { mode, side, found } => Self::ShapeDetection {
                mode: *mode,
                side: *side,
                found: *found,
            },
            PipelineError::LineFitting { mode, side } => Self::LineFitting {
                mode: *mode,
                side: *side,
            },
            PipelineError::Intersection { mode, corner } => Self::Intersection {
                mode: *mode,
                corner: *corner,
            },
            PipelineError::DegenerateTransform { mode } => {
                Self::DegenerateTransform { mode: *mode }
            }
            PipelineError::Stability { mode, rmse } => Self::Stability {
                mode: *mode,
                rmse: *rmse,
            },
            PipelineError::Fatal { primary, recovery } => Self::Fatal {
                primary: Box::new(primary.as_ref().into()),
                recovery: Box::new(recovery.as_ref().into()),
            },
        }
    }
}

impl From<PipelineErrorProxy> for PipelineError {
    fn from(proxy: PipelineErrorProxy) -> Self {
        match proxy {
            // The typed `image::ImageError` cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::ImageEncode(s) => Self::ImageEncode(s),
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::ShapeDetection { mode, side, found } => {
                Self::ShapeDetection { mode, side, found }
            }
            PipelineErrorProxy::LineFitting { mode, side } => Self::LineFitting { mode, side },
            PipelineErrorProxy::Intersection { mode, corner } => {
                Self::Intersection { mode, corner }
            }
            PipelineErrorProxy::DegenerateTransform { mode } => {
                Self::DegenerateTransform { mode }
            }
            PipelineErrorProxy::Stability { mode, rmse } => Self::Stability { mode, rmse },
            PipelineErrorProxy::Fatal { primary, recovery } => Self::Fatal {
                primary: Box::new((*primary).into()),
                recovery: Box::new((*recovery).into()),
            },
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PipelineErrorProxy::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PipelineErrorProxy::deserialize(deserializer).map(Into::into)
    }
}
