//! Color representation and conversion
//!
//! Supports:
//! - 32-bit RGBA with premultiplied-alpha helpers
//! - Indexed colors resolved through a palette (16-color and xterm 256)
//! - Packed pixel layouts for memory framebuffers

use serde::{Deserialize, Serialize};

/// A 32-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 0xFF);
    pub const WHITE: Rgba = Rgba::new(0xFF, 0xFF, 0xFF, 0xFF);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    /// Create a new RGBA color
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color from a 0xRRGGBB hex code
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
            a: 0xFF,
        }
    }

    /// Parse an opaque color from a `#rrggbb` string
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Self::from_hex)
    }

    /// Scale the color channels by the alpha channel
    ///
    /// Compositing premultiplied pixels needs one multiply less per channel.
    pub fn premultiply_alpha(self) -> Self {
        let a = u16::from(self.a);
        Self {
            r: (u16::from(self.r) * a / 255) as u8,
            g: (u16::from(self.g) * a / 255) as u8,
            b: (u16::from(self.b) * a / 255) as u8,
            a: self.a,
        }
    }
}

impl std::ops::Not for Rgba {
    type Output = Rgba;

    /// Invert the color channels, keeping alpha
    fn not(self) -> Rgba {
        Rgba::new(!self.r, !self.g, !self.b, self.a)
    }
}

/// A terminal color: palette index or direct RGB value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    /// Indexed color (0-255), resolved through a palette
    Indexed(u8),
    /// Direct 24-bit color
    Rgb(Rgba),
}

impl Color {
    /// Resolve to RGBA, looking indexed colors up in the palette
    pub fn rgba(&self, palette: &Palette) -> Rgba {
        match *self {
            Color::Indexed(idx) => palette.get(usize::from(idx)),
            Color::Rgb(rgba) => rgba,
        }
    }

    /// True if this is an indexed color
    pub fn is_indexed(&self) -> bool {
        matches!(self, Color::Indexed(_))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::Indexed(7)
    }
}

/// A dense palette of up to 256 RGBA entries
///
/// Out-of-range reads yield black rather than panicking; a stray index from
/// an escape sequence must never take the terminal down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    entries: Vec<Rgba>,
}

impl Palette {
    /// Create a palette from explicit entries (at most 256 are kept)
    pub fn from_entries(entries: &[Rgba]) -> Self {
        Self {
            entries: entries[..entries.len().min(256)].to_vec(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the palette has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry; out-of-range indices yield black
    pub fn get(&self, idx: usize) -> Rgba {
        self.entries.get(idx).copied().unwrap_or(Rgba::BLACK)
    }

    /// Replace an entry; out-of-range indices are ignored
    pub fn set(&mut self, idx: usize, color: Rgba) {
        if let Some(slot) = self.entries.get_mut(idx) {
            *slot = color;
        }
    }

    /// The default 16-color palette
    pub fn default_16() -> Self {
        Self::from_entries(&DEFAULT_16)
    }

    /// The Tango 16-color palette
    pub fn tango_16() -> Self {
        Self::from_entries(&TANGO_16)
    }

    /// The xterm 256-color palette: 16 base colors, a 6x6x6 color cube and
    /// a 24-step grayscale ramp
    pub fn default_256() -> Self {
        let mut entries = DEFAULT_16.to_vec();
        for idx in 16u32..=231 {
            let idx = idx - 16;
            let cube = |v: u32| if v == 0 { 0 } else { (55 + v * 40) as u8 };
            entries.push(Rgba::new(
                cube(idx / 36),
                cube((idx % 36) / 6),
                cube(idx % 6),
                0xFF,
            ));
        }
        for step in 0u32..24 {
            let gray = (8 + step * 10) as u8;
            entries.push(Rgba::new(gray, gray, gray, 0xFF));
        }
        Self { entries }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::default_256()
    }
}

const DEFAULT_16: [Rgba; 16] = [
    Rgba::from_hex(0x000000), // Black
    Rgba::from_hex(0xCD0000), // Red
    Rgba::from_hex(0x00CD00), // Green
    Rgba::from_hex(0xCDCD00), // Yellow
    Rgba::from_hex(0x0000EE), // Blue
    Rgba::from_hex(0xCD00CD), // Magenta
    Rgba::from_hex(0x00CDCD), // Cyan
    Rgba::from_hex(0xE5E5E5), // White
    Rgba::from_hex(0x7F7F7F), // Bright black (gray)
    Rgba::from_hex(0xFF0000), // Bright red
    Rgba::from_hex(0x00FF00), // Bright green
    Rgba::from_hex(0xFFFF00), // Bright yellow
    Rgba::from_hex(0x5C5CFF), // Bright blue
    Rgba::from_hex(0xFF00FF), // Bright magenta
    Rgba::from_hex(0x00FFFF), // Bright cyan
    Rgba::from_hex(0xFFFFFF), // Bright white
];

const TANGO_16: [Rgba; 16] = [
    Rgba::from_hex(0x000000),
    Rgba::from_hex(0xCC0000),
    Rgba::from_hex(0x4E9A06),
    Rgba::from_hex(0xC4A000),
    Rgba::from_hex(0x3465A4),
    Rgba::from_hex(0x75507B),
    Rgba::from_hex(0x06989A),
    Rgba::from_hex(0xD3D7CF),
    Rgba::from_hex(0x555753),
    Rgba::from_hex(0xEF2929),
    Rgba::from_hex(0x8AE234),
    Rgba::from_hex(0xFCE94F),
    Rgba::from_hex(0x729FCF),
    Rgba::from_hex(0xAD7FA8),
    Rgba::from_hex(0x34E2E2),
    Rgba::from_hex(0xEEEEEC),
];

/// Describes how a backend packs pixels in memory
///
/// Each channel is reduced from 8 bits by a right shift and placed at its
/// bit offset, which covers the usual 16/24/32 bpp RGB framebuffer formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorLayout {
    /// Bits per pixel
    pub bpp: u8,
    /// Right shift applied to the 8-bit red channel
    pub rr: u8,
    /// Bit offset of the red channel
    pub rl: u8,
    pub gr: u8,
    pub gl: u8,
    pub br: u8,
    pub bl: u8,
}

impl ColorLayout {
    /// 32 bpp RGBA with 8 bits per channel in byte order B, G, R
    pub const RGB32: ColorLayout = ColorLayout {
        bpp: 32,
        rr: 0,
        rl: 16,
        gr: 0,
        gl: 8,
        br: 0,
        bl: 0,
    };

    /// 16 bpp RGB565
    pub const RGB565: ColorLayout = ColorLayout {
        bpp: 16,
        rr: 3,
        rl: 11,
        gr: 2,
        gl: 5,
        br: 3,
        bl: 0,
    };

    /// Bytes per pixel
    pub const fn bytes_per_pixel(&self) -> usize {
        ((self.bpp as usize) + 7) / 8
    }

    /// Pack a color into the layout's pixel representation
    pub fn pack(&self, c: Rgba) -> u32 {
        ((u32::from(c.r) >> self.rr) << self.rl)
            | ((u32::from(c.g) >> self.gr) << self.gl)
            | ((u32::from(c.b) >> self.br) << self.bl)
    }

    /// Unpack a pixel back into an opaque RGBA color
    ///
    /// Reduced channels are widened by replicating their high bits so that
    /// full-scale values map back to 255.
    pub fn unpack(&self, v: u32) -> Rgba {
        let widen = |v: u32, shift: u8| -> u8 {
            let bits = 8 - shift;
            let mask = (1u32 << bits) - 1;
            let raw = (v & mask) << shift;
            (raw | (raw >> bits)) as u8
        };
        Rgba::new(
            widen(v >> self.rl, self.rr),
            widen(v >> self.gl, self.gr),
            widen(v >> self.bl, self.br),
            0xFF,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premultiply_alpha() {
        let c = Rgba::new(200, 100, 50, 127);
        let p = c.premultiply_alpha();
        assert_eq!(p, Rgba::new(99, 49, 24, 127));

        assert_eq!(Rgba::WHITE.premultiply_alpha(), Rgba::WHITE);
        assert_eq!(
            Rgba::new(200, 100, 50, 0).premultiply_alpha(),
            Rgba::new(0, 0, 0, 0)
        );
    }

    #[test]
    fn test_not_inverts_channels() {
        assert_eq!(!Rgba::BLACK, Rgba::WHITE);
        assert_eq!(!Rgba::new(1, 2, 3, 9), Rgba::new(254, 253, 252, 9));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(Rgba::parse_hex("#f7f7f7"), Some(Rgba::from_hex(0xF7F7F7)));
        assert_eq!(Rgba::parse_hex("#000000"), Some(Rgba::BLACK));
        assert_eq!(Rgba::parse_hex("f7f7f7"), None);
        assert_eq!(Rgba::parse_hex("#f7f7"), None);
        assert_eq!(Rgba::parse_hex("#zzzzzz"), None);
    }

    #[test]
    fn test_palette_out_of_range_is_black() {
        let p = Palette::default_16();
        assert_eq!(p.len(), 16);
        assert_eq!(p.get(200), Rgba::BLACK);
    }

    #[test]
    fn test_palette_256_cube_and_gray() {
        let p = Palette::default_256();
        assert_eq!(p.len(), 256);
        assert_eq!(p.get(16), Rgba::BLACK);
        assert_eq!(p.get(196), Rgba::new(255, 0, 0, 255)); // pure red in cube
        assert_eq!(p.get(232), Rgba::new(8, 8, 8, 255));
        assert_eq!(p.get(255), Rgba::new(238, 238, 238, 255));
    }

    #[test]
    fn test_color_resolve() {
        let p = Palette::default_16();
        assert_eq!(Color::Indexed(15).rgba(&p), Rgba::WHITE);
        let direct = Rgba::new(1, 2, 3, 255);
        assert_eq!(Color::Rgb(direct).rgba(&p), direct);
    }

    #[test]
    fn test_layout_rgb32_roundtrip() {
        let l = ColorLayout::RGB32;
        let c = Rgba::new(0x12, 0x34, 0x56, 0xFF);
        assert_eq!(l.bytes_per_pixel(), 4);
        assert_eq!(l.unpack(l.pack(c)), c);
    }

    #[test]
    fn test_layout_rgb565_endpoints() {
        let l = ColorLayout::RGB565;
        assert_eq!(l.bytes_per_pixel(), 2);
        assert_eq!(l.unpack(l.pack(Rgba::WHITE)), Rgba::WHITE);
        assert_eq!(l.unpack(l.pack(Rgba::BLACK)), Rgba::BLACK);
    }
}
