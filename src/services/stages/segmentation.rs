use image::{DynamicImage, Rgba, RgbaImage};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{GenerationError, Segmenter};

/// Segmentation implementation selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    #[default]
    Passthrough,
    BackgroundKey,
}

pub fn from_mode(mode: SegmentationMode, tolerance: u8) -> Arc<dyn Segmenter> {
    match mode {
        SegmentationMode::Passthrough => Arc::new(PassthroughSegmenter),
        SegmentationMode::BackgroundKey => Arc::new(BackgroundKeySegmenter::new(tolerance)),
    }
}

/// Returns the image unchanged.
pub struct PassthroughSegmenter;

impl Segmenter for PassthroughSegmenter {
    fn segment(&self, image: DynamicImage) -> Result<DynamicImage, GenerationError> {
        Ok(image)
    }
}

/// Removes a roughly uniform background connected to the image border.
///
/// The background colour is the per-channel median of the border pixels.
/// Every pixel reachable from the border through pixels within `tolerance`
/// of that colour (max channel difference) becomes fully transparent.
pub struct BackgroundKeySegmenter {
    tolerance: u8,
}

impl BackgroundKeySegmenter {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }
}

impl Segmenter for BackgroundKeySegmenter {
    fn segment(&self, image: DynamicImage) -> Result<DynamicImage, GenerationError> {
        let mut rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Ok(DynamicImage::ImageRgba8(rgba));
        }

        let background = border_median(&rgba);
        let mask = flood_from_border(&rgba, background, self.tolerance);
        let removed = mask.iter().filter(|&&m| m).count();

        // Nothing distinguishable from the background: keep the photo as-is.
        if removed == mask.len() {
            tracing::debug!("Background key matched the whole image, skipping");
            return Ok(DynamicImage::ImageRgba8(rgba));
        }

        for (i, pixel) in rgba.pixels_mut().enumerate() {
            if mask[i] {
                pixel.0[3] = 0;
            }
        }

        tracing::debug!(removed, total = mask.len(), "Background removed");
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

fn border_median(image: &RgbaImage) -> [u8; 3] {
    let (width, height) = image.dimensions();
    let mut channels: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut push = |p: &Rgba<u8>| {
        for (c, values) in channels.iter_mut().enumerate() {
            values.push(p.0[c]);
        }
    };

    for x in 0..width {
        push(image.get_pixel(x, 0));
        if height > 1 {
            push(image.get_pixel(x, height - 1));
        }
    }
    for y in 1..height.saturating_sub(1) {
        push(image.get_pixel(0, y));
        if width > 1 {
            push(image.get_pixel(width - 1, y));
        }
    }

    let mut median = [0u8; 3];
    for (c, values) in channels.iter_mut().enumerate() {
        values.sort_unstable();
        median[c] = values[values.len() / 2];
    }
    median
}

fn flood_from_border(image: &RgbaImage, background: [u8; 3], tolerance: u8) -> Vec<bool> {
    let (width, height) = image.dimensions();
    let index = |x: u32, y: u32| (y * width + x) as usize;
    let is_background = |x: u32, y: u32| {
        let p = image.get_pixel(x, y).0;
        (0..3).all(|c| p[c].abs_diff(background[c]) <= tolerance)
    };

    let mut visited = vec![false; (width * height) as usize];
    let mut queue = VecDeque::new();

    let seed = |x: u32, y: u32, visited: &mut Vec<bool>, queue: &mut VecDeque<(u32, u32)>| {
        let i = index(x, y);
        if !visited[i] && is_background(x, y) {
            visited[i] = true;
            queue.push_back((x, y));
        }
    };

    for x in 0..width {
        seed(x, 0, &mut visited, &mut queue);
        seed(x, height - 1, &mut visited, &mut queue);
    }
    for y in 0..height {
        seed(0, y, &mut visited, &mut queue);
        seed(width - 1, y, &mut visited, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        let neighbours = [
            (x.checked_sub(1), Some(y)),
            (Some(x + 1).filter(|&nx| nx < width), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), Some(y + 1).filter(|&ny| ny < height)),
        ];
        for (nx, ny) in neighbours {
            if let (Some(nx), Some(ny)) = (nx, ny) {
                seed(nx, ny, &mut visited, &mut queue);
            }
        }
    }

    visited
}
