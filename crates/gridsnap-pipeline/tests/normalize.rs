//! Integration test: synthetic grid photographs through the full
//! normalization, including convergence, recovery and failure paths.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use gridsnap_pipeline::{
    NoClock, NormalizeConfig, PipelineError, Point, ProcessingMode, RgbaImage, Side, normalize,
    normalize_with_diagnostics,
};
use image::Rgba;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use imageproc::rect::Rect;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// 400x400 page with a 4px frame whose outer edge spans 50..=350.
fn framed_page(ink: Rgba<u8>, paper: Rgba<u8>) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(400, 400, paper);
    draw_filled_rect_mut(&mut img, Rect::at(50, 50).of_size(301, 301), ink);
    draw_filled_rect_mut(&mut img, Rect::at(54, 54).of_size(293, 293), paper);
    img
}

fn config() -> NormalizeConfig {
    NormalizeConfig {
        max_dimension: 300,
        ..NormalizeConfig::default()
    }
}

fn assert_near(actual: Point, expected: (f64, f64), tolerance: f64) {
    let expected = Point::new(expected.0, expected.1);
    assert!(
        actual.distance(expected) <= tolerance,
        "corner {actual:?} is not within {tolerance}px of {expected:?}"
    );
}

/// Mean absolute RGB difference, normalized to [0, 1].
#[allow(clippy::cast_precision_loss)]
fn mean_abs_error(a: &RgbaImage, b: &RgbaImage) -> f64 {
    assert_eq!(a.dimensions(), b.dimensions());
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| (0..3).map(move |c| u64::from(p.0[c].abs_diff(q.0[c]))))
        .sum();
    let samples = u64::from(a.width()) * u64::from(a.height()) * 3;
    total as f64 / samples as f64 / 255.0
}

#[test]
fn clean_frame_is_located_and_squared() {
    let page = framed_page(BLACK, WHITE);
    let mut messages: Vec<String> = Vec::new();
    let result = normalize(&page, &config(), &mut messages).expect("clean frame should normalize");

    assert_eq!(result.final_image.dimensions(), (300, 300));
    assert_eq!(result.processed_binary_image.dimensions(), (400, 400));
    assert_eq!(result.mode, ProcessingMode::LightBackground);
    assert!(!result.recovered);

    assert_near(result.corners.top_left, (50.0, 50.0), 2.0);
    assert_near(result.corners.top_right, (350.0, 50.0), 2.0);
    assert_near(result.corners.bottom_right, (350.0, 350.0), 2.0);
    assert_near(result.corners.bottom_left, (50.0, 350.0), 2.0);

    // The frame lands on the margin boundary; the margin is paper.
    assert_eq!(*result.final_image.get_pixel(3, 150), WHITE);
    assert_eq!(*result.final_image.get_pixel(11, 150), BLACK);
    assert_eq!(*result.final_image.get_pixel(150, 150), WHITE);

    assert_eq!(messages.first().map(String::as_str), Some("pass 1: starting (auto mode)"));
    assert_eq!(messages.last().map(String::as_str), Some("converged"));
}

#[test]
fn perspective_distortion_is_undone() {
    let page = framed_page(BLACK, WHITE);
    let reference = normalize(&page, &config(), &mut ()).unwrap();

    let projection = Projection::from_control_points(
        [(0.0, 0.0), (399.0, 0.0), (399.0, 399.0), (0.0, 399.0)],
        [(20.0, 10.0), (385.0, 25.0), (395.0, 380.0), (8.0, 390.0)],
    )
    .expect("control points are in general position");
    let photo = warp(&page, &projection, Interpolation::Bilinear, WHITE);

    let mut messages: Vec<String> = Vec::new();
    let result = normalize(&photo, &config(), &mut messages).expect("distorted frame should normalize");
    eprintln!("progress: {messages:?}");

    assert!(!result.recovered);
    assert_eq!(result.mode, ProcessingMode::LightBackground);
    let error = mean_abs_error(&result.final_image, &reference.final_image);
    assert!(error < 0.05, "normalized photo differs from the clean frame by {error:.4}");
}

#[test]
fn dark_background_is_detected_without_recovery() {
    let page = framed_page(WHITE, BLACK);
    let result = normalize(&page, &config(), &mut ()).unwrap();

    assert_eq!(result.mode, ProcessingMode::DarkBackground);
    assert!(!result.recovered);
    assert_near(result.corners.top_left, (50.0, 50.0), 2.0);
    assert_near(result.corners.bottom_right, (350.0, 350.0), 2.0);
    // Dark-mode margins are filled with black.
    assert_eq!(*result.final_image.get_pixel(3, 150), BLACK);
}

#[test]
fn three_sided_outline_is_fatal() {
    // Top, left and right bars of a 50..=350 frame; the bottom is missing.
    let mut photo = RgbaImage::from_pixel(400, 400, WHITE);
    draw_filled_rect_mut(&mut photo, Rect::at(50, 50).of_size(301, 4), BLACK);
    draw_filled_rect_mut(&mut photo, Rect::at(50, 50).of_size(4, 301), BLACK);
    draw_filled_rect_mut(&mut photo, Rect::at(347, 50).of_size(4, 301), BLACK);

    let mut messages: Vec<String> = Vec::new();
    let (outcome, diagnostics) = normalize_with_diagnostics(&photo, &config(), &mut messages, &NoClock);
    let err = outcome.expect_err("an open outline must not produce an image");
    let PipelineError::Fatal { primary, recovery } = err else {
        panic!("expected a fatal failure, got {err:?}");
    };

    assert!(
        matches!(
            *primary,
            PipelineError::ShapeDetection {
                mode: ProcessingMode::LightBackground,
                side: Side::Bottom,
                found: 0,
            }
        ),
        "unexpected primary failure: {primary:?}"
    );
    assert!(
        matches!(
            *recovery,
            PipelineError::ShapeDetection {
                mode: ProcessingMode::DarkBackground,
                ..
            }
        ),
        "unexpected recovery failure: {recovery:?}"
    );
    assert_eq!(diagnostics.passes.len(), 2);
    assert!(!diagnostics.recovered);
    assert_eq!(messages.last().map(String::as_str), Some("normalization failed"));
}

#[test]
fn grid_running_off_the_photo_is_fatal() {
    // Top, left and right sides only; the sides continue past the bottom
    // edge of the photograph, so the whole outline touches the border.
    let mut photo = RgbaImage::from_pixel(400, 400, WHITE);
    draw_filled_rect_mut(&mut photo, Rect::at(50, 50).of_size(301, 4), BLACK);
    draw_filled_rect_mut(&mut photo, Rect::at(50, 50).of_size(4, 350), BLACK);
    draw_filled_rect_mut(&mut photo, Rect::at(347, 50).of_size(4, 350), BLACK);

    let mut messages: Vec<String> = Vec::new();
    let err = normalize(&photo, &config(), &mut messages).unwrap_err();
    let PipelineError::Fatal { primary, recovery } = err else {
        panic!("expected a fatal failure, got {err:?}");
    };

    assert!(
        matches!(
            *primary,
            PipelineError::ShapeDetection {
                mode: ProcessingMode::LightBackground,
                side: Side::Top,
                found: 0,
            }
        ),
        "unexpected primary failure: {primary:?}"
    );
    assert!(
        matches!(
            *recovery,
            PipelineError::ShapeDetection {
                mode: ProcessingMode::DarkBackground,
                ..
            }
        ),
        "unexpected recovery failure: {recovery:?}"
    );
    assert!(messages.iter().any(|m| m == "retrying in dark-background mode"));
    assert_eq!(messages.last().map(String::as_str), Some("normalization failed"));
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let projection = Projection::from_control_points(
        [(0.0, 0.0), (399.0, 0.0), (399.0, 399.0), (0.0, 399.0)],
        [(5.0, 15.0), (390.0, 4.0), (380.0, 396.0), (12.0, 385.0)],
    )
    .unwrap();
    let photo = warp(&framed_page(BLACK, WHITE), &projection, Interpolation::Bilinear, WHITE);

    let first = normalize(&photo, &config(), &mut ()).unwrap();
    let second = normalize(&photo, &config(), &mut ()).unwrap();

    assert_eq!(first.final_image.as_raw(), second.final_image.as_raw());
    assert_eq!(first.corners, second.corners);
    assert_eq!(first.mode, second.mode);
}
