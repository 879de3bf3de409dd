//! Main application loop
//!
//! Waits on all event sources with a frame-pacing timeout: while output is
//! pending the wait is bounded so a draw happens on the next 60 Hz frame
//! boundary, otherwise it blocks until input arrives. Drawing never
//! happens more than once per frame interval and never when nothing
//! changed.

use std::time::Instant;

use log::{debug, info};
use sumi_core::{Matrix, Style};

use crate::display::{DisplayBackend, MemoryDisplay};
use crate::event::{self, Event, EventSource, Key};
use crate::glyph::GlyphProvider;
use crate::renderer::MatrixRenderer;

/// Target frame interval in microseconds (60 Hz)
const FRAME_INTERVAL_US: i64 = 16_667;

/// The terminal application
pub struct App<B: DisplayBackend, G: GlyphProvider> {
    matrix: Matrix,
    renderer: MatrixRenderer,
    display: MemoryDisplay<B>,
    glyphs: G,
    style: Style,
    pending_redraw: bool,
    done: bool,
}

impl<B: DisplayBackend, G: GlyphProvider> App<B, G> {
    pub fn new(renderer: MatrixRenderer, display: MemoryDisplay<B>, glyphs: G) -> Self {
        Self {
            matrix: Matrix::new(0, 0),
            renderer,
            display,
            glyphs,
            style: Style::default(),
            pending_redraw: true,
            done: false,
        }
    }

    /// The cell matrix, e.g. for a driver layer to write into
    pub fn matrix_mut(&mut self) -> &mut Matrix {
        self.pending_redraw = true;
        &mut self.matrix
    }

    /// Feed UTF-8 bytes into the matrix at the cursor
    ///
    /// This is the input path of the demo shell: printable characters are
    /// stamped with the current style; carriage return and line feed move
    /// the cursor.
    pub fn write_text(&mut self, bytes: &[u8]) {
        for c in String::from_utf8_lossy(bytes).chars() {
            match c {
                '\r' => {
                    let row = self.matrix.row();
                    self.matrix.move_abs(row, 1);
                }
                '\n' => self.matrix.move_rel(1, 0, true),
                c if !c.is_control() => {
                    self.matrix.write(u32::from(c), self.style, false);
                }
                _ => {}
            }
        }
        self.pending_redraw = true;
    }

    fn handle_key(&mut self, key: Key) {
        match key {
            Key::Enter => {
                let col = self.matrix.col();
                self.matrix.move_rel(1, 1 - col, true);
            }
            Key::Backspace => {
                self.matrix.move_rel(0, -1, false);
                self.matrix.set(0, self.style, self.matrix.pos());
            }
            Key::Left => self.matrix.move_rel(0, -1, false),
            Key::Right => self.matrix.move_rel(0, 1, false),
            Key::Up => self.matrix.move_rel(-1, 0, false),
            Key::Down => self.matrix.move_rel(1, 0, false),
            Key::Home => {
                let row = self.matrix.row();
                self.matrix.move_abs(row, 1);
            }
            Key::End => {
                let (row, cols) = (self.matrix.row(), self.matrix.cols());
                self.matrix.move_abs(row, cols);
            }
            _ => return,
        }
        self.pending_redraw = true;
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Text { bytes, .. } | Event::ChildOutput(bytes) => self.write_text(&bytes),
            Event::Key { key, .. } => self.handle_key(key),
            Event::Resize => {
                self.renderer.invalidate_geometry();
                self.pending_redraw = true;
            }
            Event::Quit => {
                info!("quit requested");
                self.done = true;
            }
        }
    }

    /// Run until a `Quit` event arrives
    pub fn run(&mut self, sources: &mut [&mut dyn EventSource]) {
        // First frame: paint the whole screen
        self.renderer
            .draw(&mut self.matrix, &mut self.display, &mut self.glyphs, true, 0);
        self.pending_redraw = false;

        let mut last_draw = Instant::now();
        let mut last_source = None;

        while !self.done {
            let timeout = if self.pending_redraw {
                let elapsed = last_draw.elapsed().as_micros() as i64;
                (((FRAME_INTERVAL_US - elapsed) / 1000).max(0)) as i32
            } else {
                -1
            };

            if let Some((idx, event)) = event::wait(sources, last_source, timeout) {
                last_source = Some(idx);
                self.handle_event(event);
            }

            let elapsed = last_draw.elapsed();
            if self.pending_redraw && elapsed.as_micros() as i64 >= FRAME_INTERVAL_US {
                let dt = elapsed.as_millis() as u32;
                debug!("frame: dt {} ms", dt);
                self.renderer
                    .draw(&mut self.matrix, &mut self.display, &mut self.glyphs, false, dt);
                last_draw = Instant::now();
                // Keep the frame clock running while draft cells await
                // their promotion pass.
                self.pending_redraw = self.renderer.needs_refresh();
            }
        }
    }
}
