//! A single cell of the terminal matrix
//!
//! Besides glyph and style, each cell carries a cursor flag and a dirty
//! bit. The `needs_update` predicate decides whether a committed change is
//! worth a display update at all; refreshes of an e-paper panel are
//! expensive enough that visually equivalent changes (e.g. recoloring the
//! foreground of blank cells) must be filtered out here.

use serde::{Deserialize, Serialize};

use crate::style::{Style, Underline};

/// One character position in the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Unicode scalar shown in this cell; zero means empty
    pub glyph: u32,
    /// Text style
    pub style: Style,
    /// True if the cursor currently sits on this cell
    pub cursor: bool,
    /// True if the cell has been touched since the last commit
    pub dirty: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: 0,
            style: Style::default(),
            cursor: false,
            dirty: true,
        }
    }
}

impl Cell {
    /// Create a blank cell with the given style
    pub fn blank(style: Style) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// True if the cell foreground draws no pixels
    pub fn invisible(&self) -> bool {
        if self.style.concealed {
            return true;
        }
        if self.style.strikethrough || self.style.underline != Underline::None {
            return false;
        }
        self.glyph == 0 || self.glyph == u32::from(' ')
    }

    /// Whether the transition from `old` to this cell changes anything
    /// drawing-relevant.
    pub fn needs_update(&self, old: &Cell) -> bool {
        if !self.dirty {
            return false;
        }

        // The cursor is drawn by inverting the cell, so only the combined
        // flag matters.
        let inverse = self.cursor ^ self.style.inverse;
        let inverse_old = old.cursor ^ old.style.inverse;
        if inverse != inverse_old {
            return true;
        }

        // Effective color of one side of a cell; the default flag is part
        // of the identity since the configured default need not match the
        // palette entry.
        let fg_of = |c: &Cell| (c.style.default_fg, c.style.fg);
        let bg_of = |c: &Cell| (c.style.default_bg, c.style.bg);

        // Skip the foreground comparison when it is invisible on both sides
        if !(self.invisible() && old.invisible()) {
            if self.glyph != old.glyph {
                return true;
            }
            let (fg, fg_old) = if inverse {
                (bg_of(self), bg_of(old))
            } else {
                (fg_of(self), fg_of(old))
            };
            if fg != fg_old {
                return true;
            }
            if self.style.bold != old.style.bold
                || self.style.italic != old.style.italic
                || self.style.strikethrough != old.style.strikethrough
                || self.style.underline != old.style.underline
            {
                return true;
            }
        }

        // The background is always visible
        let (bg, bg_old) = if inverse {
            (fg_of(self), fg_of(old))
        } else {
            (bg_of(self), bg_of(old))
        };
        bg != bg_old
    }
}
