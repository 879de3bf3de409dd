//! Matrix renderer: translates cell diffs into e-paper display updates
//!
//! The renderer owns per-cell display metadata and runs two passes per
//! frame. Pass A immediately redraws every dirty cell in a cheap dithered
//! monochrome mode so keystrokes become visible within one frame; pass B
//! later promotes cells to full quality once they are overdue, either
//! because they sat in draft quality past a timeout or because enough
//! updates happened elsewhere on the panel that their content has started
//! to ghost.

use log::{debug, trace};
use sumi_core::{Cell, Color, Matrix, Palette, Point, Rect, RectangleMerger, Rgba};

use crate::display::{DisplayBackend, DrawMode, Layer, MemoryDisplay, UpdateMode};
use crate::epaper;
use crate::glyph::GlyphProvider;

/// Milliseconds a draft-quality cell may age before promotion
const REDRAW_TIMEOUT_HIGH: u32 = 1000;
/// Tightened timeout once any cell has aged past the high threshold
const REDRAW_TIMEOUT_LOW: u32 = 250;
/// Panel operations a cell may witness before it is refreshed
const COUNTER_THRESHOLD_HIGH: u32 = 2000;
/// Tightened counter threshold once any cell crossed the high one
const COUNTER_THRESHOLD_LOW: u32 = 1000;

/// Color configuration of the renderer
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub palette: Palette,
    pub default_fg: Rgba,
    pub default_bg: Rgba,
    /// Render bold text in the bright half of the 16-color palette
    pub bright_on_bold: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            palette: Palette::default_256(),
            default_fg: Rgba::from_hex(0xF7F7F7),
            default_bg: Rgba::from_hex(0x000000),
            bright_on_bold: true,
        }
    }
}

/// Display state of one cell
#[derive(Debug, Clone, Copy)]
struct RenderCell {
    /// Cell content as it is currently on the display
    cell: Cell,
    /// Milliseconds since this cell was last drawn
    last_update: u32,
    /// Panel operations since this cell was last drawn
    operation_counter: u32,
    low_quality: bool,
    high_quality: bool,
    overdue: bool,
    dirty: bool,
}

impl Default for RenderCell {
    fn default() -> Self {
        Self {
            cell: Cell {
                dirty: false,
                ..Cell::default()
            },
            last_update: 0,
            operation_counter: 0,
            low_quality: false,
            high_quality: true,
            // Fresh metadata is overdue so new geometry gets painted in
            // full quality on the first draw.
            overdue: true,
            dirty: false,
        }
    }
}

/// Renders a `Matrix` onto a `MemoryDisplay` with e-paper update policy
pub struct MatrixRenderer {
    cells: Vec<Vec<RenderCell>>,
    /// Touched region in 0-based cell coordinates
    update_bounds: Rect,
    options: RenderOptions,
    font_size: f32,
    orientation: u32,
    cols: usize,
    rows: usize,
    /// Display bounds in display coordinates
    bounds: Rect,
    pad_x: i32,
    pad_y: i32,
    cell_w: i32,
    cell_h: i32,
    needs_geometry_update: bool,
    merger: RectangleMerger,
    updates: Vec<sumi_core::CellUpdate>,
}

impl MatrixRenderer {
    /// Create a renderer for the given display
    ///
    /// The display is locked once to learn the surface bounds; the cell
    /// geometry is computed lazily on the first draw.
    pub fn new<B: DisplayBackend>(
        options: RenderOptions,
        merger: RectangleMerger,
        display: &mut MemoryDisplay<B>,
        font_size: f32,
        orientation: u32,
    ) -> Self {
        let bounds = display.lock();
        display.unlock();

        Self {
            cells: Vec::new(),
            update_bounds: Rect::default(),
            options,
            font_size,
            orientation: orientation % 4,
            cols: 0,
            rows: 0,
            bounds,
            pad_x: 0,
            pad_y: 0,
            cell_w: 0,
            cell_h: 0,
            needs_geometry_update: true,
            merger,
            updates: Vec::new(),
        }
    }

    /// Number of cell columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of cell rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Current font size in pixels
    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Change the font size; takes effect on the next draw
    pub fn set_font_size(&mut self, font_size: f32) {
        if font_size != self.font_size {
            self.font_size = font_size;
            self.needs_geometry_update = true;
        }
    }

    /// Current orientation in 90-degree steps
    pub fn orientation(&self) -> u32 {
        self.orientation
    }

    /// Rotate the output in 90-degree steps
    ///
    /// A change clears both layers so no stale pixels survive outside the
    /// new cell grid, and recomputes the geometry on the next draw.
    pub fn set_orientation<B: DisplayBackend>(
        &mut self,
        display: &mut MemoryDisplay<B>,
        orientation: u32,
    ) {
        let orientation = orientation % 4;
        if orientation == self.orientation {
            return;
        }
        display.lock();
        display.fill(Layer::Background, Rgba::BLACK, self.bounds);
        display.fill(Layer::Presentation, Rgba::TRANSPARENT, self.bounds);
        display.unlock();
        self.orientation = orientation;
        self.needs_geometry_update = true;
    }

    /// Force a geometry recomputation on the next draw, e.g. after the
    /// backend reported a resize
    pub fn invalidate_geometry(&mut self) {
        self.needs_geometry_update = true;
    }

    /// True while any cell still awaits a draft redraw or its promotion to
    /// full quality; the event loop keeps scheduling frames until this
    /// settles.
    pub fn needs_refresh(&self) -> bool {
        self.needs_geometry_update
            || self
                .cells
                .iter()
                .flatten()
                .any(|c| c.dirty || c.overdue || c.low_quality)
    }

    /// Recompute cell counts and padding from the display bounds and font
    /// metrics, reset all cell metadata and resize the matrix.
    fn update_geometry<B, G>(
        &mut self,
        matrix: &mut Matrix,
        display: &mut MemoryDisplay<B>,
        glyphs: &mut G,
    ) where
        B: DisplayBackend,
        G: GlyphProvider + ?Sized,
    {
        self.bounds = display.lock();
        display.unlock();

        let m = glyphs.metrics(self.font_size);
        self.cell_w = m.cell_width.max(1);
        self.cell_h = m.cell_height.max(1);

        // For odd orientations the cell grid lives in the rotated frame
        let (bw, bh) = if self.bounds.valid() {
            (self.bounds.width(), self.bounds.height())
        } else {
            (0, 0)
        };
        let (w, h) = if self.orientation & 1 == 1 {
            (bh, bw)
        } else {
            (bw, bh)
        };

        self.cols = (w / self.cell_w).max(0) as usize;
        self.rows = (h / self.cell_h).max(0) as usize;
        self.pad_x = (w - self.cell_w * self.cols as i32) / 2;
        self.pad_y = (h - self.cell_h * self.rows as i32) / 2;

        self.cells = vec![vec![RenderCell::default(); self.cols]; self.rows];
        matrix.resize(self.rows as i32, self.cols as i32);

        debug!(
            "renderer geometry: {}x{} cells of {}x{} px, pad {}x{}, orientation {}",
            self.cols, self.rows, self.cell_w, self.cell_h, self.pad_x, self.pad_y,
            self.orientation
        );
        // Keep retrying while the backend has no surface yet
        self.needs_geometry_update = !self.bounds.valid();
    }

    /// Pixel rectangle of a cell in display coordinates
    fn cell_rect(&self, row: usize, col: usize) -> Rect {
        let x0 = col as i32 * self.cell_w;
        let x1 = x0 + self.cell_w;
        let y0 = row as i32 * self.cell_h;
        let y1 = y0 + self.cell_h;

        let b = self.bounds;
        match self.orientation {
            1 => Rect::new(
                b.x0 + self.pad_y + y0,
                b.y1 - self.pad_x - x1,
                b.x0 + self.pad_y + y1,
                b.y1 - self.pad_x - x0,
            ),
            2 => Rect::new(
                b.x1 - self.pad_x - x1,
                b.y1 - self.pad_y - y1,
                b.x1 - self.pad_x - x0,
                b.y1 - self.pad_y - y0,
            ),
            3 => Rect::new(
                b.x1 - self.pad_y - y1,
                b.y0 + self.pad_x + x0,
                b.x1 - self.pad_y - y0,
                b.y0 + self.pad_x + x1,
            ),
            _ => Rect::new(
                b.x0 + self.pad_x + x0,
                b.y0 + self.pad_y + y0,
                b.x0 + self.pad_x + x1,
                b.y0 + self.pad_y + y1,
            ),
        }
    }

    /// Resolve the effective foreground and background colors of a cell
    fn resolve_colors(&self, cell: &Cell) -> (Rgba, Rgba) {
        let mut cfg = cell.style.fg;
        if self.options.bright_on_bold && cell.style.bold {
            if let Color::Indexed(idx) = cell.style.fg {
                if idx < 8 {
                    cfg = Color::Indexed(idx + 8);
                }
            }
        }

        let mut fg = if cell.style.default_fg {
            self.options.default_fg
        } else {
            cfg.rgba(&self.options.palette)
        };
        let mut bg = if cell.style.default_bg {
            self.options.default_bg
        } else {
            cell.style.bg.rgba(&self.options.palette)
        };
        if cell.cursor ^ cell.style.inverse {
            std::mem::swap(&mut fg, &mut bg);
        }
        (fg, bg)
    }

    /// Draw (or erase) one cell; returns the pixel region touched
    ///
    /// Low quality fills the background with an ordered dither pattern and
    /// blits a monochrome glyph snapped to pure black or white; on
    /// mid-tone backgrounds an inverse-color shadow is added one pixel
    /// down-right so the glyph stays legible on the dither pattern. High
    /// quality uses solid fills and anti-aliased glyphs.
    fn draw_cell<B, G>(
        &self,
        display: &mut MemoryDisplay<B>,
        glyphs: &mut G,
        row: usize,
        col: usize,
        cell: &Cell,
        erase: bool,
        low_quality: bool,
    ) -> Rect
    where
        B: DisplayBackend,
        G: GlyphProvider + ?Sized,
    {
        let (mut fg, bg) = self.resolve_colors(cell);

        let mut r = self.cell_rect(row, col);
        let cell_origin = Point::new(r.x0, r.y0);
        let mut glyph = None;

        if low_quality {
            let g_fg = epaper::rgba_to_grayscale(fg);
            let g_bg = epaper::rgba_to_grayscale(bg);
            if !erase {
                display.fill_dither(Layer::Background, g_bg, r);
            }
            if fg != bg {
                glyph = glyphs.render(cell.glyph, self.font_size, true, self.orientation);
            }
            // Snap the foreground to whichever extreme contrasts with the
            // background pattern.
            fg = if g_fg >= g_bg { Rgba::WHITE } else { Rgba::BLACK };
        } else {
            if !erase {
                display.fill(Layer::Background, bg, r);
            }
            glyph = glyphs.render(cell.glyph, self.font_size, false, self.orientation);
        }

        let mode = if erase { DrawMode::Erase } else { DrawMode::Write };
        let mut touched = r;
        if let Some(g) = glyph {
            let gr = Rect::sized(
                cell_origin.x + g.x,
                cell_origin.y + g.y,
                g.width as i32,
                g.height as i32,
            );
            if low_quality && bg != Rgba::WHITE && bg != Rgba::BLACK {
                let shadow = gr + Point::new(1, 1);
                display.blit(Layer::Presentation, !fg, g.buf(), g.stride, shadow, mode);
                r = r.grow(shadow);
            }
            display.blit(Layer::Presentation, fg, g.buf(), g.stride, gr, mode);
            touched = r.grow(gr);
        }
        touched
    }

    /// Run one draw pass over the matrix
    ///
    /// `redraw` repaints everything from scratch; `dt_ms` is the time since
    /// the previous call and ages the per-cell refresh timers.
    pub fn draw<B, G>(
        &mut self,
        matrix: &mut Matrix,
        display: &mut MemoryDisplay<B>,
        glyphs: &mut G,
        redraw: bool,
        dt_ms: u32,
    ) where
        B: DisplayBackend,
        G: GlyphProvider + ?Sized,
    {
        if self.needs_geometry_update {
            self.update_geometry(matrix, display, glyphs);
        }

        if redraw {
            for y in 0..self.rows {
                for x in 0..self.cols {
                    self.cells[y][x] = RenderCell::default();
                    self.update_bounds = self.update_bounds.grow_point(Point::new(x as i32, y as i32));
                }
            }
        }

        for row in &mut self.cells {
            for c in row.iter_mut() {
                c.last_update = c.last_update.saturating_add(dt_ms);
            }
        }

        // Ingest the matrix diff
        self.updates.clear();
        matrix.commit(&mut self.updates);
        for i in 0..self.updates.len() {
            let p = self.updates[i].pos;
            if p.x >= 1 && p.y >= 1 && (p.x as usize) <= self.cols && (p.y as usize) <= self.rows {
                self.cells[(p.y - 1) as usize][(p.x - 1) as usize].dirty = true;
                self.update_bounds = self.update_bounds.grow_point(Point::new(p.x - 1, p.y - 1));
            }
        }

        // Tighten the global thresholds when any cell has fallen far
        // behind; this batches promotions instead of trickling them.
        let mut counter_threshold = COUNTER_THRESHOLD_HIGH;
        let mut redraw_timeout = REDRAW_TIMEOUT_HIGH;
        'scan: for row in &self.cells {
            for c in row {
                if c.operation_counter > COUNTER_THRESHOLD_HIGH {
                    counter_threshold = COUNTER_THRESHOLD_LOW;
                }
                if c.low_quality && c.last_update > REDRAW_TIMEOUT_HIGH {
                    redraw_timeout = REDRAW_TIMEOUT_LOW;
                    if counter_threshold == COUNTER_THRESHOLD_LOW {
                        break 'scan;
                    }
                }
            }
        }
        for y in 0..self.rows {
            for x in 0..self.cols {
                let c = &mut self.cells[y][x];
                let rule_counter = c.operation_counter >= counter_threshold;
                let rule_timeout = c.low_quality && c.last_update >= redraw_timeout;
                if rule_counter || rule_timeout {
                    c.overdue = true;
                    self.update_bounds = self.update_bounds.grow_point(Point::new(x as i32, y as i32));
                }
            }
        }

        if !self.update_bounds.valid() {
            return;
        }

        // Something will be drawn: every cell on the panel witnesses it
        for row in &mut self.cells {
            for c in row.iter_mut() {
                c.operation_counter += 1;
            }
        }

        let scan = self
            .update_bounds
            .clip(Rect::new(0, 0, self.cols as i32, self.rows as i32));

        display.lock();

        // Pass A: dirty cells become visible immediately in draft quality
        self.merger.reset();
        if scan.valid() {
            for y in scan.y0..scan.y1 {
                for x in scan.x0..scan.x1 {
                    let meta = self.cells[y as usize][x as usize];
                    if !meta.dirty {
                        continue;
                    }
                    let current = matrix.cell(Point::new(x + 1, y + 1));

                    let r1 = self.draw_cell(
                        display,
                        glyphs,
                        y as usize,
                        x as usize,
                        &meta.cell,
                        true,
                        meta.low_quality,
                    );
                    let r2 =
                        self.draw_cell(display, glyphs, y as usize, x as usize, &current, false, true);
                    self.merger.insert(r1.grow(r2));

                    self.cells[y as usize][x as usize] = RenderCell {
                        cell: current,
                        last_update: 0,
                        operation_counter: 0,
                        low_quality: true,
                        high_quality: false,
                        overdue: false,
                        dirty: false,
                    };
                }
            }
        }
        self.merger.merge();
        let mut drafts = 0;
        for r in &self.merger {
            display.commit(*r, UpdateMode::DRAFT);
            drafts += 1;
        }

        // Pass B: overdue cells are promoted to full quality
        self.merger.reset();
        if scan.valid() {
            for y in scan.y0..scan.y1 {
                for x in scan.x0..scan.x1 {
                    let meta = self.cells[y as usize][x as usize];
                    if !meta.overdue {
                        continue;
                    }
                    let current = matrix.cell(Point::new(x + 1, y + 1));

                    let r1 = self.draw_cell(
                        display,
                        glyphs,
                        y as usize,
                        x as usize,
                        &meta.cell,
                        true,
                        meta.low_quality,
                    );
                    let r2 = self.draw_cell(
                        display,
                        glyphs,
                        y as usize,
                        x as usize,
                        &current,
                        false,
                        false,
                    );
                    self.merger.insert(r1.grow(r2));

                    self.cells[y as usize][x as usize] = RenderCell {
                        cell: current,
                        last_update: 0,
                        operation_counter: 0,
                        low_quality: false,
                        high_quality: true,
                        overdue: false,
                        dirty: false,
                    };
                }
            }
        }
        self.merger.merge();
        let mut promotions = 0;
        for r in &self.merger {
            display.commit(*r, UpdateMode::PARTIAL);
            promotions += 1;
        }

        display.unlock();
        trace!("draw: {} draft region(s), {} promotion region(s)", drafts, promotions);

        self.update_bounds = Rect::default();
    }
}
