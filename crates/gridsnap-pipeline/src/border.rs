//! Border noise removal.
//!
//! Shadows, table edges and the paper's own outline show up as dark
//! regions touching the frame of the photograph. Every dark pixel that is
//! 4-connected to the image boundary through other dark pixels is
//! cleared to white, leaving only interior structure dark.
//!
//! The fill uses an explicit stack and a visited bitmap so each pixel is
//! pushed at most once and call depth stays constant on large images.

use crate::binarize::{BACKGROUND, is_dark};
use crate::types::RgbaImage;

/// Clear every dark region connected to the image boundary, in place.
///
/// Returns the number of pixels cleared.
pub fn clear_border_noise(image: &mut RgbaImage) -> u64 {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }

    let width = w as usize;
    let mut visited = vec![false; width * h as usize];
    let mut stack: Vec<(u32, u32)> = Vec::new();

    let seed = |x: u32, y: u32, visited: &mut [bool], stack: &mut Vec<(u32, u32)>| {
        let idx = y as usize * width + x as usize;
        if !visited[idx] && is_dark(*image.get_pixel(x, y)) {
            visited[idx] = true;
            stack.push((x, y));
        }
    };

    for x in 0..w {
        seed(x, 0, &mut visited, &mut stack);
        seed(x, h - 1, &mut visited, &mut stack);
    }
    for y in 0..h {
        seed(0, y, &mut visited, &mut stack);
        seed(w - 1, y, &mut visited, &mut stack);
    }

    let mut cleared = 0u64;
    while let Some((x, y)) = stack.pop() {
        image.put_pixel(x, y, BACKGROUND);
        cleared += 1;

        let neighbors = [
            (x.checked_sub(1), Some(y)),
            ((x + 1 < w).then_some(x + 1), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), (y + 1 < h).then_some(y + 1)),
        ];
        for (nx, ny) in neighbors {
            let (Some(nx), Some(ny)) = (nx, ny) else {
                continue;
            };
            let idx = ny as usize * width + nx as usize;
            if !visited[idx] && is_dark(*image.get_pixel(nx, ny)) {
                visited[idx] = true;
                stack.push((nx, ny));
            }
        }
    }

    log::debug!("border noise: cleared {cleared} pixels");
    cleared
}
