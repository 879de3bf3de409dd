//! Text style attached to every matrix cell

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Underline variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Underline {
    #[default]
    None,
    Single,
    Double,
}

/// The text style of a cell
///
/// `default_fg`/`default_bg` mean "use the configured default color"; when
/// set, the corresponding `fg`/`bg` field is ignored by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Foreground color
    pub fg: Color,
    /// Background color
    pub bg: Color,
    /// Use the configured default foreground, ignoring `fg`
    pub default_fg: bool,
    /// Use the configured default background, ignoring `bg`
    pub default_bg: bool,
    /// Bold text
    pub bold: bool,
    /// Italic text
    pub italic: bool,
    /// Underline (none, single or double)
    pub underline: Underline,
    /// Strikethrough text
    pub strikethrough: bool,
    /// Swap foreground and background
    pub inverse: bool,
    /// Foreground is not rendered
    pub concealed: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fg: Color::Indexed(7),
            bg: Color::Indexed(0),
            default_fg: true,
            default_bg: true,
            bold: false,
            italic: false,
            underline: Underline::None,
            strikethrough: false,
            inverse: false,
            concealed: false,
        }
    }
}

impl Style {
    /// Create a style with explicit colors and no attributes
    pub fn with_colors(fg: Color, bg: Color) -> Self {
        Self {
            fg,
            bg,
            default_fg: false,
            default_bg: false,
            ..Self::default()
        }
    }
}
