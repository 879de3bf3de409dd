//! The terminal cell matrix
//!
//! The matrix is the logical character grid the escape-sequence layer
//! writes into. It keeps three cell buffers: the current content, the
//! content as of the last commit, and an alternate buffer that full-screen
//! applications swap in. All mutations are tracked through per-cell dirty
//! bits and a bounding rectangle; `commit` reduces them to the minimal list
//! of cells whose on-screen appearance actually changed.
//!
//! External addressing is 1-based with `(col, row) = (1, 1)` at the upper
//! left, matching the conventions of the escape-sequence layer.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::geometry::{Point, Rect};
use crate::style::Style;

/// A reported change of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    /// 1-based cell position
    pub pos: Point,
    /// Content after the commit
    pub current: Cell,
    /// Content as of the previous commit
    pub old: Cell,
}

/// The dirty-tracked terminal cell grid
#[derive(Debug, Clone)]
pub struct Matrix {
    cells: Vec<Vec<Cell>>,
    cells_alt: Vec<Vec<Cell>>,
    cells_old: Vec<Vec<Cell>>,
    /// Grid size: `x` is the number of columns, `y` the number of rows
    size: Point,
    /// Cursor position, 1-based
    pos: Point,
    /// Position of the last `write`, for combining-character replacement
    pos_last: Point,
    /// Cursor position as of the last commit
    pos_old: Point,
    cursor_visible: bool,
    cursor_visible_old: bool,
    alternative_buffer_active: bool,
    /// A `write` at the last column defers the line wrap until the next one
    wrap_pending: bool,
    /// Touched region since the last commit, in 1-based cell coordinates
    update_bounds: Rect,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new(40, 80)
    }
}

impl Matrix {
    /// Create a matrix with the given size
    pub fn new(rows: i32, cols: i32) -> Self {
        let mut m = Self {
            cells: Vec::new(),
            cells_alt: Vec::new(),
            cells_old: Vec::new(),
            size: Point::new(cols.max(0), rows.max(0)),
            pos: Point::new(1, 1),
            pos_last: Point::new(1, 1),
            pos_old: Point::new(1, 1),
            cursor_visible: true,
            cursor_visible_old: false,
            alternative_buffer_active: false,
            wrap_pending: false,
            update_bounds: Rect::default(),
        };
        m.reset();
        m
    }

    /// Number of columns
    pub fn cols(&self) -> i32 {
        self.size.x
    }

    /// Number of rows
    pub fn rows(&self) -> i32 {
        self.size.y
    }

    /// Grid size as a point (`x` = columns, `y` = rows)
    pub fn size(&self) -> Point {
        self.size
    }

    /// Current cursor position, 1-based
    pub fn pos(&self) -> Point {
        self.pos
    }

    /// Current cursor row
    pub fn row(&self) -> i32 {
        self.pos.y
    }

    /// Current cursor column
    pub fn col(&self) -> i32 {
        self.pos.x
    }

    /// Show or hide the cursor
    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor_visible = visible;
    }

    /// True if the cursor is shown
    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    /// True if the alternate buffer is active
    pub fn alternative_buffer_active(&self) -> bool {
        self.alternative_buffer_active
    }

    /// Read a cell; out-of-range positions yield a blank default cell
    pub fn cell(&self, pos: Point) -> Cell {
        if !self.valid(pos) {
            return Cell::default();
        }
        self.cells[(pos.y - 1) as usize][(pos.x - 1) as usize]
    }

    fn valid(&self, p: Point) -> bool {
        p.x >= 1 && p.y >= 1 && p.x <= self.size.x && p.y <= self.size.y
    }

    fn screen_bounds(&self) -> Rect {
        Rect::new(1, 1, self.size.x + 1, self.size.y + 1)
    }

    fn extend_update_bounds(&mut self, p: Point) {
        self.update_bounds = self.update_bounds.grow_point(p);
    }

    /// Clear both buffers to blank default cells and home the cursor
    pub fn reset(&mut self) {
        self.pos = Point::new(1, 1);
        self.pos_last = Point::new(1, 1);
        self.cursor_visible = true;
        self.wrap_pending = false;

        let rows = self.size.y.max(0) as usize;
        let cols = self.size.x.max(0) as usize;
        for buffer in [&mut self.cells, &mut self.cells_alt, &mut self.cells_old] {
            buffer.resize_with(rows, Vec::new);
            for row in buffer.iter_mut() {
                row.resize_with(cols, Cell::default);
            }
        }
        for row in &mut self.cells_alt {
            row.fill(Cell::default());
        }

        // Route the clear of the active buffer through set() so dirty bits
        // and update bounds stay consistent.
        for y in 1..=self.size.y {
            for x in 1..=self.size.x {
                self.set(0, Style::default(), Point::new(x, y));
            }
        }
    }

    /// Resize the grid; never shrinks the backing allocation
    pub fn resize(&mut self, rows: i32, cols: i32) {
        let rows = rows.max(0);
        let cols = cols.max(0);
        self.size = Point::new(cols, rows);

        for buffer in [&mut self.cells, &mut self.cells_alt, &mut self.cells_old] {
            if buffer.len() < rows as usize {
                buffer.resize_with(rows as usize, Vec::new);
            }
            for row in buffer.iter_mut().take(rows as usize) {
                if row.len() < cols as usize {
                    row.resize_with(cols as usize, Cell::default);
                }
            }
        }

        // Keep the dirty region inside the new geometry
        self.update_bounds.x1 = self.update_bounds.x1.min(cols + 1);
        self.update_bounds.y1 = self.update_bounds.y1.min(rows + 1);
    }

    /// Move the cursor to an absolute 1-based position, clipped to the grid
    pub fn move_abs(&mut self, row: i32, col: i32) {
        self.wrap_pending = false;
        if self.screen_bounds().valid() {
            self.pos = self.screen_bounds().clip_point(Point::new(col, row));
        }
    }

    /// Move the cursor relative to its current position
    ///
    /// Without `wrap` the target is clipped to the grid. With `wrap` a
    /// column overflow continues on the next row, and a row overflow
    /// scrolls the view up before clamping.
    pub fn move_rel(&mut self, dy: i32, dx: i32, wrap: bool) {
        self.wrap_pending = false;
        let mut p = self.pos + Point::new(dx, dy);
        if wrap {
            if p.x > self.size.x {
                p.x = 1;
                p.y += 1;
            }
            if p.y > self.size.y {
                let lines = p.y - self.size.y;
                self.scroll(0, Style::default(), self.screen_bounds(), lines, 0);
                p.y = self.size.y;
            }
        }
        if self.screen_bounds().valid() {
            self.pos = self.screen_bounds().clip_point(p);
        }
    }

    /// Set a single cell; out-of-range positions are ignored
    pub fn set(&mut self, glyph: u32, style: Style, pos: Point) {
        if !self.valid(pos) {
            return;
        }
        let c = &mut self.cells[(pos.y - 1) as usize][(pos.x - 1) as usize];
        if glyph != c.glyph || style != c.style {
            c.glyph = glyph;
            c.style = style;
            c.dirty = true;
            self.extend_update_bounds(pos);
        }
    }

    /// Write a glyph at the cursor and advance it
    ///
    /// With `replaces_last` the cursor first jumps back to the previous
    /// write position, which is how combining characters replace the glyph
    /// they attach to. A write into the last column defers the wrap until
    /// the next write; only then does the view scroll if the cursor ran off
    /// the bottom.
    pub fn write(&mut self, glyph: u32, style: Style, replaces_last: bool) {
        if replaces_last {
            self.pos = self.pos_last;
            self.wrap_pending = false;
        }
        if self.wrap_pending {
            self.wrap_pending = false;
            self.pos.x = 1;
            if self.pos.y >= self.size.y {
                self.scroll(0, style, self.screen_bounds(), 1, 0);
            } else {
                self.pos.y += 1;
            }
        }

        self.set(glyph, style, self.pos);
        self.pos_last = self.pos;

        if self.pos.x >= self.size.x {
            self.wrap_pending = true;
        } else {
            self.pos.x += 1;
        }
    }

    /// Fill all cells between two cursor locations in reading order
    pub fn fill(&mut self, glyph: u32, style: Style, from: Point, to: Point) {
        for row in from.y..=to.y {
            let col0 = if row == from.y { from.x } else { 1 };
            let col1 = if row == to.y { to.x } else { self.size.x };
            for col in col0..=col1 {
                self.set(glyph, style, Point::new(col, row));
            }
        }
    }

    /// Shift the contents of `r` by `(-rightward, -downward)` cells
    ///
    /// Cells whose source falls outside `r` are replaced with
    /// `(glyph, style)`. The whole screen is considered touched afterwards;
    /// the commit diff sorts out what actually changed.
    pub fn scroll(&mut self, glyph: u32, style: Style, r: Rect, downward: i32, rightward: i32) {
        if (downward == 0 && rightward == 0) || !r.valid() {
            return;
        }
        let r = r.clip(self.screen_bounds());
        if !r.valid() {
            return;
        }

        let blank = Cell {
            glyph,
            style,
            cursor: false,
            dirty: true,
        };

        // Iterate towards the copy direction so in-place copies never read
        // a cell that was already overwritten.
        let ys: Vec<i32> = if downward >= 0 {
            (r.y0..r.y1).collect()
        } else {
            (r.y0..r.y1).rev().collect()
        };
        let xs: Vec<i32> = if rightward >= 0 {
            (r.x0..r.x1).collect()
        } else {
            (r.x0..r.x1).rev().collect()
        };

        for &y_tar in &ys {
            let y_src = y_tar + downward;
            if y_src < r.y0 || y_src >= r.y1 {
                for x_tar in r.x0..r.x1 {
                    self.cells[(y_tar - 1) as usize][(x_tar - 1) as usize] = blank;
                }
                continue;
            }
            for &x_tar in &xs {
                let x_src = x_tar + rightward;
                let tar = ((y_tar - 1) as usize, (x_tar - 1) as usize);
                if x_src < r.x0 || x_src >= r.x1 {
                    self.cells[tar.0][tar.1] = blank;
                } else {
                    let mut c = self.cells[(y_src - 1) as usize][(x_src - 1) as usize];
                    c.dirty = true;
                    c.cursor = false;
                    self.cells[tar.0][tar.1] = c;
                }
            }
        }

        // The committed cursor cell moved along with the content
        self.pos_old -= Point::new(rightward, downward);
        self.update_bounds = self.screen_bounds();
    }

    /// Switch between the primary and the alternate buffer
    ///
    /// A switch swaps the buffers and marks every cell dirty; the commit
    /// diff then reports exactly the net difference between the two.
    pub fn set_alternative_buffer_active(&mut self, active: bool) {
        if active == self.alternative_buffer_active {
            return;
        }
        self.alternative_buffer_active = active;
        std::mem::swap(&mut self.cells, &mut self.cells_alt);
        for row in &mut self.cells {
            for c in row.iter_mut() {
                c.dirty = true;
            }
        }
        self.update_bounds = self.screen_bounds();
    }

    /// Materialize all pending changes
    ///
    /// Appends one `CellUpdate` for every cell whose appearance changed
    /// since the previous commit, copies current to old, and clears the
    /// dirty state. Repeated writes to one cell collapse into a single
    /// update; writes that restore the committed content produce none.
    pub fn commit(&mut self, updates: &mut Vec<CellUpdate>) {
        // Transfer the cursor flag from the previously committed position
        // to the current one.
        if self.cursor_visible_old && self.valid(self.pos_old) {
            let p = self.pos_old;
            let c = &mut self.cells[(p.y - 1) as usize][(p.x - 1) as usize];
            c.cursor = false;
            c.dirty = true;
            self.extend_update_bounds(p);
        }
        if self.cursor_visible && self.valid(self.pos) {
            let p = self.pos;
            let c = &mut self.cells[(p.y - 1) as usize][(p.x - 1) as usize];
            c.cursor = true;
            c.dirty = true;
            self.extend_update_bounds(p);
        }

        let scan = self.update_bounds.clip(self.screen_bounds());
        if scan.valid() {
            for y in scan.y0..scan.y1 {
                for x in scan.x0..scan.x1 {
                    let cell = &mut self.cells[(y - 1) as usize][(x - 1) as usize];
                    let old = &mut self.cells_old[(y - 1) as usize][(x - 1) as usize];
                    if cell.needs_update(old) {
                        updates.push(CellUpdate {
                            pos: Point::new(x, y),
                            current: *cell,
                            old: *old,
                        });
                    }
                    cell.dirty = false;
                    *old = *cell;
                }
            }
        }

        self.pos_old = self.pos;
        self.cursor_visible_old = self.cursor_visible;
        self.update_bounds = Rect::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn committed(m: &mut Matrix) -> Vec<CellUpdate> {
        let mut updates = Vec::new();
        m.commit(&mut updates);
        updates
    }

    fn glyph_at(m: &Matrix, col: i32, row: i32) -> char {
        char::from_u32(m.cell(Point::new(col, row)).glyph).unwrap_or('\0')
    }

    #[test]
    fn test_empty_frame() {
        let mut m = Matrix::new(2, 4);
        // The first commit materializes the cursor at (1, 1); no content
        // cell is reported for a blank screen.
        let first = committed(&mut m);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].pos, Point::new(1, 1));
        assert!(first[0].current.cursor);
        assert_eq!(first[0].current.glyph, 0);

        // A commit without changes reports nothing
        let second = committed(&mut m);
        assert!(second.is_empty());
    }

    #[test]
    fn test_single_character() {
        let mut m = Matrix::new(2, 4);
        committed(&mut m);

        m.write(u32::from('A'), Style::default(), false);
        let updates = committed(&mut m);

        // 'A' appears at (1, 1), the cursor moved from (1, 1) to (2, 1)
        assert_eq!(updates.len(), 2);
        assert!(updates
            .iter()
            .any(|u| u.pos == Point::new(1, 1) && u.current.glyph == u32::from('A')));
        assert!(updates
            .iter()
            .any(|u| u.pos == Point::new(2, 1) && u.current.cursor));

        assert!(committed(&mut m).is_empty());
    }

    #[test]
    fn test_set_same_value_no_update() {
        let mut m = Matrix::new(2, 4);
        m.set(u32::from('X'), Style::default(), Point::new(2, 2));
        committed(&mut m);

        m.set(u32::from('X'), Style::default(), Point::new(2, 2));
        let updates = committed(&mut m);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_whitespace_fg_change_no_update() {
        let mut m = Matrix::new(2, 4);
        m.set_cursor_visible(false);
        committed(&mut m);

        let recolored = Style {
            fg: Color::Indexed(3),
            default_fg: false,
            ..Style::default()
        };
        m.set(u32::from(' '), recolored, Point::new(1, 1));
        let updates = committed(&mut m);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_cursor_move_reports_both_cells() {
        let mut m = Matrix::new(2, 4);
        committed(&mut m);

        m.move_abs(2, 3);
        let updates = committed(&mut m);
        assert_eq!(updates.len(), 2);
        assert!(updates
            .iter()
            .any(|u| u.pos == Point::new(1, 1) && !u.current.cursor && u.old.cursor));
        assert!(updates
            .iter()
            .any(|u| u.pos == Point::new(3, 2) && u.current.cursor && !u.old.cursor));
    }

    #[test]
    fn test_move_abs_clips() {
        let mut m = Matrix::new(2, 4);
        m.move_abs(99, -3);
        assert_eq!(m.pos(), Point::new(1, 2));
    }

    #[test]
    fn test_line_wrap() {
        let mut m = Matrix::new(4, 3);
        for c in ['A', 'B', 'C', 'D'] {
            m.write(u32::from(c), Style::default(), false);
            committed(&mut m);
        }

        assert_eq!(m.pos(), Point::new(2, 2));
        assert_eq!(glyph_at(&m, 1, 1), 'A');
        assert_eq!(glyph_at(&m, 2, 1), 'B');
        assert_eq!(glyph_at(&m, 3, 1), 'C');
        assert_eq!(glyph_at(&m, 1, 2), 'D');
    }

    #[test]
    fn test_scroll_up_on_overflow() {
        let mut m = Matrix::new(2, 2);
        committed(&mut m);

        let mut last = Vec::new();
        for c in ['1', '2', '3', '4', '5', '6'] {
            m.write(u32::from(c), Style::default(), false);
            last.clear();
            m.commit(&mut last);
        }

        assert_eq!(glyph_at(&m, 1, 1), '3');
        assert_eq!(glyph_at(&m, 2, 1), '4');
        assert_eq!(glyph_at(&m, 1, 2), '5');
        assert_eq!(glyph_at(&m, 2, 2), '6');
        assert_eq!(m.row(), 2);

        // The scroll before '5' marked the whole screen; the '5' commit
        // therefore reports every visibly changed cell.
        let mut m2 = Matrix::new(2, 2);
        committed(&mut m2);
        for c in ['1', '2', '3', '4'] {
            m2.write(u32::from(c), Style::default(), false);
        }
        committed(&mut m2);
        m2.write(u32::from('5'), Style::default(), false);
        let mut updates = Vec::new();
        m2.commit(&mut updates);
        // Rows shifted: (1,1) 1->3, (2,1) 2->4, (1,2) 3->5, (2,2) 4->blank
        assert_eq!(updates.len(), 4);
    }

    #[test]
    fn test_write_replaces_last() {
        let mut m = Matrix::new(2, 4);
        m.write(u32::from('a'), Style::default(), false);
        m.write(u32::from('à'), Style::default(), true);
        assert_eq!(glyph_at(&m, 1, 1), 'à');
        assert_eq!(m.pos(), Point::new(2, 1));
    }

    #[test]
    fn test_fill_reading_order() {
        let mut m = Matrix::new(3, 4);
        m.fill(u32::from('#'), Style::default(), Point::new(3, 1), Point::new(2, 3));

        assert_eq!(glyph_at(&m, 2, 1), '\0');
        assert_eq!(glyph_at(&m, 3, 1), '#');
        assert_eq!(glyph_at(&m, 4, 1), '#');
        for x in 1..=4 {
            assert_eq!(glyph_at(&m, x, 2), '#');
        }
        assert_eq!(glyph_at(&m, 2, 3), '#');
        assert_eq!(glyph_at(&m, 3, 3), '\0');
    }

    #[test]
    fn test_scroll_zero_is_noop() {
        let mut m = Matrix::new(3, 3);
        m.set(u32::from('Q'), Style::default(), Point::new(2, 2));
        committed(&mut m);

        let r = Rect::new(1, 1, 4, 4);
        m.scroll(0, Style::default(), r, 0, 0);
        let updates = committed(&mut m);
        assert!(updates.is_empty());
        assert_eq!(glyph_at(&m, 2, 2), 'Q');
    }

    #[test]
    fn test_scroll_round_trip_restores_intersection() {
        let mut m = Matrix::new(3, 3);
        m.set_cursor_visible(false);
        for y in 1..=3 {
            for x in 1..=3 {
                m.set(u32::from('a') + (3 * (y - 1) + x - 1) as u32, Style::default(), Point::new(x, y));
            }
        }
        committed(&mut m);

        let r = Rect::new(1, 1, 4, 4);
        m.scroll(0, Style::default(), r, 1, 0);
        // Top row now holds the former middle row; the bottom is blank
        assert_eq!(glyph_at(&m, 1, 1), 'd');
        assert_eq!(glyph_at(&m, 1, 3), '\0');

        m.scroll(0, Style::default(), r, -1, 0);
        // Rows inside the doubly-shifted intersection are restored; the
        // top row, whose source was blanked, ends up blank.
        assert_eq!(glyph_at(&m, 1, 1), '\0');
        assert_eq!(glyph_at(&m, 1, 2), 'd');
        assert_eq!(glyph_at(&m, 2, 2), 'e');
        assert_eq!(glyph_at(&m, 3, 2), 'f');
        assert_eq!(glyph_at(&m, 1, 3), 'g');
        assert_eq!(glyph_at(&m, 3, 3), 'i');
    }

    #[test]
    fn test_scroll_horizontal() {
        let mut m = Matrix::new(1, 3);
        for (i, c) in ['x', 'y', 'z'].iter().enumerate() {
            m.set(u32::from(*c), Style::default(), Point::new(i as i32 + 1, 1));
        }
        let r = Rect::new(1, 1, 4, 2);
        m.scroll(0, Style::default(), r, 0, 1);
        assert_eq!(glyph_at(&m, 1, 1), 'y');
        assert_eq!(glyph_at(&m, 2, 1), 'z');
        assert_eq!(glyph_at(&m, 3, 1), '\0');
    }

    #[test]
    fn test_alternate_buffer_swap_reports_net_difference() {
        let mut m = Matrix::new(2, 2);
        m.set_cursor_visible(false);
        m.set(u32::from('P'), Style::default(), Point::new(1, 1));
        committed(&mut m);

        m.set_alternative_buffer_active(true);
        let updates = committed(&mut m);
        // Only (1, 1) differs between the blank alternate screen and the
        // committed primary content.
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].pos, Point::new(1, 1));
        assert_eq!(updates[0].current.glyph, 0);

        m.set_alternative_buffer_active(false);
        let updates = committed(&mut m);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].current.glyph, u32::from('P'));

        // Swapping back and forth without edits nets out to nothing
        m.set_alternative_buffer_active(true);
        m.set_alternative_buffer_active(false);
        let updates = committed(&mut m);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_resize_preserves_content() {
        let mut m = Matrix::new(2, 2);
        m.set(u32::from('K'), Style::default(), Point::new(2, 2));
        m.resize(4, 4);
        assert_eq!(m.cols(), 4);
        assert_eq!(m.rows(), 4);
        assert_eq!(glyph_at(&m, 2, 2), 'K');

        m.resize(1, 1);
        assert_eq!(m.cell(Point::new(2, 2)).glyph, 0); // out of range reads blank
        m.resize(4, 4);
        assert_eq!(glyph_at(&m, 2, 2), 'K'); // allocation was kept
    }

    #[test]
    fn test_out_of_range_set_ignored() {
        let mut m = Matrix::new(2, 2);
        committed(&mut m);
        m.set(u32::from('X'), Style::default(), Point::new(0, 1));
        m.set(u32::from('X'), Style::default(), Point::new(3, 1));
        m.set(u32::from('X'), Style::default(), Point::new(1, -5));
        let updates = committed(&mut m);
        assert!(updates.is_empty());
    }
}
