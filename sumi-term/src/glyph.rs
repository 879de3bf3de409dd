//! Glyph rendering for monospace cells
//!
//! The renderer consumes glyphs as immutable 8-bit alpha masks with origin
//! offsets inside their cell. `TtfGlyphProvider` rasterizes them from a
//! TrueType font and caches the results; monochrome (thresholded)
//! rendering is first-class because e-paper panels complete 1-bit updates
//! much faster than anti-aliased grayscale.
//!
//! All sizes in this interface are pixels; the configured point size is
//! converted with the display DPI before it reaches the provider
//! (`FontConfig::pixel_size`).

use std::collections::HashMap;
use std::path::Path;

use fontdue::{Font, FontSettings};
use thiserror::Error;

/// Errors while loading a font
#[derive(Error, Debug)]
pub enum GlyphError {
    #[error("Failed to read font file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse font: {0}")]
    Parse(String),
}

/// Cell metrics of a font treated as monospace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonospaceMetrics {
    /// Width of one cell in pixels
    pub cell_width: i32,
    /// Height of one cell in pixels
    pub cell_height: i32,
    /// Baseline position from the cell top in pixels
    pub origin_y: i32,
}

/// A rendered glyph: an alpha mask plus its placement inside the cell
#[derive(Debug, Clone)]
pub struct GlyphBitmap {
    /// Offset of the bitmap from the left cell edge
    pub x: i32,
    /// Offset of the bitmap from the top cell edge
    pub y: i32,
    /// Bitmap width in pixels
    pub width: usize,
    /// Bitmap height in pixels
    pub height: usize,
    /// Width of one bitmap row in bytes
    pub stride: usize,
    data: Vec<u8>,
}

impl GlyphBitmap {
    /// Create a bitmap from raw coverage data
    pub fn new(x: i32, y: i32, width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            x,
            y,
            width,
            height,
            stride: width,
            data,
        }
    }

    /// The 8-bit alpha mask, `height` rows of `stride` bytes
    pub fn buf(&self) -> &[u8] {
        &self.data
    }

    /// Rotate the bitmap 90 degrees clockwise inside a cell of the given
    /// size, adjusting the cell offsets accordingly. Returns the rotated
    /// bitmap; the cell itself becomes `cell_h` x `cell_w`.
    fn rotated_90(&self, cell_h: i32) -> GlyphBitmap {
        let (w, h) = (self.width, self.height);
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                // (x, y) -> (h - 1 - y, x)
                data[x * h + (h - 1 - y)] = self.data[y * w + x];
            }
        }
        GlyphBitmap::new(cell_h - self.y - h as i32, self.x, h, w, data)
    }
}

/// Source of glyph bitmaps and font metrics
///
/// `render` may return `None` for glyphs the font cannot produce; the
/// caller then draws the cell background only. Returned references remain
/// valid until the next call that mutates the provider.
pub trait GlyphProvider {
    /// Monospace cell metrics for a font size in pixels
    fn metrics(&mut self, size: f32) -> MonospaceMetrics;

    /// Render a codepoint
    ///
    /// `monochrome` thresholds the coverage to pure on/off pixels;
    /// `orientation` rotates the glyph in 90-degree steps counterclockwise
    /// to match a rotated display.
    fn render(
        &mut self,
        codepoint: u32,
        size: f32,
        monochrome: bool,
        orientation: u32,
    ) -> Option<&GlyphBitmap>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GlyphKey {
    codepoint: u32,
    size_bits: u32,
    monochrome: bool,
    orientation: u32,
}

/// TrueType glyph provider with a render cache
pub struct TtfGlyphProvider {
    font: Font,
    /// Line height multiplier applied to the font size
    line_height: f32,
    cache: HashMap<GlyphKey, Option<GlyphBitmap>>,
}

impl TtfGlyphProvider {
    /// Load a font from a file
    pub fn from_file(path: &Path) -> Result<Self, GlyphError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Load a font from raw TTF data
    pub fn from_bytes(data: &[u8]) -> Result<Self, GlyphError> {
        let font = Font::from_bytes(data, FontSettings::default()).map_err(|e| {
            GlyphError::Parse(e.to_string())
        })?;
        Ok(Self {
            font,
            line_height: 1.25,
            cache: HashMap::new(),
        })
    }

    /// Drop all cached glyphs
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn rasterize(&self, key: GlyphKey) -> Option<GlyphBitmap> {
        let c = char::from_u32(key.codepoint)?;
        if self.font.lookup_glyph_index(c) == 0 {
            return None;
        }

        let size = f32::from_bits(key.size_bits);
        let m = self.metrics_for(size);
        let (metrics, mut bitmap) = self.font.rasterize(c, size);
        if metrics.width == 0 || metrics.height == 0 {
            return None;
        }

        if key.monochrome {
            for a in bitmap.iter_mut() {
                *a = if *a >= 128 { 0xFF } else { 0 };
            }
        }

        // Place the bitmap relative to the cell origin: fontdue reports
        // offsets relative to the baseline.
        let x = metrics.xmin;
        let y = m.origin_y - metrics.ymin - metrics.height as i32;
        let mut glyph = GlyphBitmap::new(x, y, metrics.width, metrics.height, bitmap);

        // Rotate in 90-degree steps; the cell box swaps dimensions on
        // every step.
        let (mut cw, mut ch) = (m.cell_width, m.cell_height);
        for _ in 0..(key.orientation % 4) {
            glyph = glyph.rotated_90(ch);
            std::mem::swap(&mut cw, &mut ch);
        }
        Some(glyph)
    }

    fn metrics_for(&self, size: f32) -> MonospaceMetrics {
        let m = self.font.metrics('M', size);
        MonospaceMetrics {
            cell_width: m.advance_width.ceil().max(1.0) as i32,
            cell_height: (size * self.line_height).ceil().max(1.0) as i32,
            origin_y: size.ceil() as i32,
        }
    }
}

impl GlyphProvider for TtfGlyphProvider {
    fn metrics(&mut self, size: f32) -> MonospaceMetrics {
        self.metrics_for(size)
    }

    fn render(
        &mut self,
        codepoint: u32,
        size: f32,
        monochrome: bool,
        orientation: u32,
    ) -> Option<&GlyphBitmap> {
        let key = GlyphKey {
            codepoint,
            size_bits: size.to_bits(),
            monochrome,
            orientation: orientation % 4,
        };
        if !self.cache.contains_key(&key) {
            let glyph = self.rasterize(key);
            self.cache.insert(key, glyph);
        }
        self.cache.get(&key).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_geometry() {
        // A 2x3 glyph at (1, 2) in a 8x10 cell
        let g = GlyphBitmap::new(1, 2, 2, 3, vec![1, 2, 3, 4, 5, 6]);

        // 90 degrees: the cell becomes 10x8, dimensions swap
        let r = g.rotated_90(10);
        assert_eq!((r.width, r.height), (3, 2));
        assert_eq!((r.x, r.y), (10 - 2 - 3, 1));

        // The first output row is the first input column, bottom-up
        assert_eq!(r.buf(), &[5, 3, 1, 6, 4, 2]);
    }

    #[test]
    fn test_four_rotations_restore_bitmap() {
        let g = GlyphBitmap::new(1, 2, 2, 3, vec![1, 2, 3, 4, 5, 6]);
        let r = g
            .rotated_90(10)
            .rotated_90(8)
            .rotated_90(10)
            .rotated_90(8);
        assert_eq!(r.buf(), g.buf());
        assert_eq!((r.x, r.y), (g.x, g.y));
        assert_eq!((r.width, r.height), (g.width, g.height));
    }
}
