//! Bitmap fonts for the watermark label.

use image::GrayImage;
use std::path::Path;

const ATLAS_COLUMNS: u32 = 16;
const ATLAS_ROWS: u32 = 6;
const FIRST_CHAR: u32 = 0x20;

const BUILTIN_WIDTH: u32 = 5;
const BUILTIN_HEIGHT: u32 = 7;

/// A monospace bitmap font.
#[derive(Debug, Clone)]
pub struct BitmapFont {
    glyph_width: u32,
    glyph_height: u32,
    source: GlyphSource,
}

#[derive(Debug, Clone)]
enum GlyphSource {
    Builtin,
    Atlas(GrayImage),
}

impl BitmapFont {
    /// The 5x7 font compiled into the binary. Lower-case letters render as upper-case.
    pub fn builtin() -> Self {
        Self {
            glyph_width: BUILTIN_WIDTH,
            glyph_height: BUILTIN_HEIGHT,
            source: GlyphSource::Builtin,
        }
    }

    /// Load a glyph atlas: a 16x6 grid of cells covering ASCII 0x20..=0x7F.
    /// Bright pixels are ink.
    pub fn from_atlas(path: &Path) -> Result<Self, FontError> {
        let atlas = image::open(path)?.to_luma8();
        let (width, height) = atlas.dimensions();
        if width == 0
            || height == 0
            || width % ATLAS_COLUMNS != 0
            || height % ATLAS_ROWS != 0
        {
            return Err(FontError::Layout { width, height });
        }

        Ok(Self {
            glyph_width: width / ATLAS_COLUMNS,
            glyph_height: height / ATLAS_ROWS,
            source: GlyphSource::Atlas(atlas),
        })
    }

    /// Configured atlas if it loads, otherwise the built-in font.
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };
        match Self::from_atlas(path) {
            Ok(font) => font,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Watermark font unavailable, using built-in font"
                );
                Self::builtin()
            }
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.source, GlyphSource::Builtin)
    }

    pub fn glyph_width(&self) -> u32 {
        self.glyph_width
    }

    pub fn glyph_height(&self) -> u32 {
        self.glyph_height
    }

    /// Unscaled size of `text` including one column of spacing between glyphs.
    pub fn measure(&self, text: &str) -> (u32, u32) {
        let count = text.chars().count() as u32;
        if count == 0 {
            return (0, 0);
        }
        (count * (self.glyph_width + 1) - 1, self.glyph_height)
    }

    /// Whether the glyph for `c` has ink at (`x`, `y`) in glyph coordinates.
    pub fn ink(&self, c: char, x: u32, y: u32) -> bool {
        if x >= self.glyph_width || y >= self.glyph_height {
            return false;
        }
        match &self.source {
            GlyphSource::Builtin => {
                let row = builtin_glyph(c)[y as usize];
                row & (1 << (BUILTIN_WIDTH - 1 - x)) != 0
            }
            GlyphSource::Atlas(atlas) => {
                let code = c as u32;
                let index = if (FIRST_CHAR..FIRST_CHAR + ATLAS_COLUMNS * ATLAS_ROWS).contains(&code) {
                    code - FIRST_CHAR
                } else {
                    '?' as u32 - FIRST_CHAR
                };
                let cell_x = (index % ATLAS_COLUMNS) * self.glyph_width;
                let cell_y = (index / ATLAS_COLUMNS) * self.glyph_height;
                atlas.get_pixel(cell_x + x, cell_y + y).0[0] > 127
            }
        }
    }
}

fn builtin_glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '@' => [0x0E, 0x11, 0x17, 0x15, 0x17, 0x10, 0x0E],
        // Unknown characters render as '?'
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Failed to read font atlas: {0}")]
    Image(#[from] image::ImageError),

    #[error("Font atlas {width}x{height} is not a 16x6 glyph grid")]
    Layout { width: u32, height: u32 },
}
