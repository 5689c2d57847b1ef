use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;

use super::font::BitmapFont;
use super::{GenerationError, Watermarker};

const MARGIN: u32 = 20;
const PAD_X: u32 = 10;
const PAD_Y: u32 = 5;
const BOX_COLOR: Rgba<u8> = Rgba([0, 0, 0, 128]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 200]);

/// Image rows per step of the label scale factor.
const ROWS_PER_SCALE_STEP: u32 = 180;

/// Text label in the bottom-right corner on a semi-opaque box.
pub struct TextWatermark {
    text: String,
    font: BitmapFont,
}

impl TextWatermark {
    pub fn new(text: impl Into<String>, font: BitmapFont) -> Self {
        Self {
            text: text.into(),
            font,
        }
    }

    pub fn with_builtin_font(text: impl Into<String>) -> Self {
        Self::new(text, BitmapFont::builtin())
    }

    /// Use the atlas at `font_atlas` when it loads; never fails.
    pub fn load(text: &str, font_atlas: Option<&Path>) -> Self {
        Self::new(text, BitmapFont::load_or_builtin(font_atlas))
    }

    fn scale_for(&self, height: u32) -> u32 {
        let base = (height / ROWS_PER_SCALE_STEP).max(1);
        // Atlas glyphs are usually drawn larger than 7 rows; keep the label near the same size.
        (base * 7 / self.font.glyph_height()).max(1)
    }
}

impl Watermarker for TextWatermark {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, GenerationError> {
        let mut canvas = image.to_rgba8();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 || self.text.is_empty() {
            return Ok(DynamicImage::ImageRgba8(canvas));
        }

        let scale = self.scale_for(height);
        let (text_w, text_h) = self.font.measure(&self.text);
        let (text_w, text_h) = (text_w * scale, text_h * scale);

        // Anchor at the bottom-right; on images smaller than the label it
        // clips at the left/top edge instead of wrapping.
        let x = width as i64 - text_w as i64 - (MARGIN * scale) as i64;
        let y = height as i64 - text_h as i64 - (MARGIN * scale) as i64;

        fill_rect(
            &mut canvas,
            x - (PAD_X * scale) as i64,
            y - (PAD_Y * scale) as i64,
            x + (text_w + PAD_X * scale) as i64,
            y + (text_h + PAD_Y * scale) as i64,
            BOX_COLOR,
        );
        self.draw_text(&mut canvas, x, y, scale);

        tracing::debug!(text = %self.text, scale, "Applied watermark");
        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

impl TextWatermark {
    fn draw_text(&self, canvas: &mut RgbaImage, x: i64, y: i64, scale: u32) {
        let advance = (self.font.glyph_width() + 1) * scale;
        for (i, c) in self.text.chars().enumerate() {
            let gx = x + (i as u32 * advance) as i64;
            for row in 0..self.font.glyph_height() {
                for col in 0..self.font.glyph_width() {
                    if !self.font.ink(c, col, row) {
                        continue;
                    }
                    let px = gx + (col * scale) as i64;
                    let py = y + (row * scale) as i64;
                    fill_rect(
                        canvas,
                        px,
                        py,
                        px + scale as i64,
                        py + scale as i64,
                        TEXT_COLOR,
                    );
                }
            }
        }
    }
}

/// Alpha-blend `color` over the half-open rectangle, clipped to the canvas.
fn fill_rect(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    let x0 = x0.clamp(0, width as i64) as u32;
    let y0 = y0.clamp(0, height as i64) as u32;
    let x1 = x1.clamp(0, width as i64) as u32;
    let y1 = y1.clamp(0, height as i64) as u32;

    for y in y0..y1 {
        for x in x0..x1 {
            let pixel = canvas.get_pixel_mut(x, y);
            *pixel = blend(*pixel, color);
        }
    }
}

fn blend(under: Rgba<u8>, over: Rgba<u8>) -> Rgba<u8> {
    let a = over.0[3] as u32;
    let mix = |u: u8, o: u8| ((o as u32 * a + u as u32 * (255 - a)) / 255) as u8;
    Rgba([
        mix(under.0[0], over.0[0]),
        mix(under.0[1], over.0[1]),
        mix(under.0[2], over.0[2]),
        under.0[3].max(over.0[3]),
    ])
}
