//! In-memory e-paper panel
//!
//! Applies the full update semantics (output op, mask op, 16-level
//! grayscale) to a packed pixel buffer, producing exactly what a panel
//! would show. Development builds render against this backend; the
//! integration tests read the panel back to verify the pipeline.

use log::trace;
use sumi_core::{ColorLayout, Rect, Rgba};

use crate::display::{CommitRequest, DisplayBackend, UpdateMode};
use crate::epaper;

/// Emulated electrophoretic panel
pub struct EpaperEmulation {
    width: usize,
    height: usize,
    layout: ColorLayout,
    panel: Vec<u8>,
    /// Every update region driven so far, oldest first
    updates: Vec<(Rect, UpdateMode)>,
}

impl EpaperEmulation {
    /// Create a panel of the given size, cleared to white like a real
    /// panel at rest
    pub fn new(width: usize, height: usize) -> Self {
        let layout = ColorLayout::RGB32;
        let mut panel = vec![0u8; width * height * layout.bytes_per_pixel()];
        let white = layout.pack(Rgba::WHITE);
        for px in panel.chunks_exact_mut(layout.bytes_per_pixel()) {
            for (k, byte) in px.iter_mut().enumerate() {
                *byte = ((white >> (8 * k)) & 0xFF) as u8;
            }
        }
        Self {
            width,
            height,
            layout,
            panel,
            updates: Vec::new(),
        }
    }

    /// Panel width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Panel height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw packed panel memory
    pub fn panel(&self) -> &[u8] {
        &self.panel
    }

    /// The grayscale value currently shown at a pixel
    pub fn grayscale_at(&self, x: usize, y: usize) -> u8 {
        let bypp = self.layout.bytes_per_pixel();
        let offset = (y * self.width + x) * bypp;
        let mut packed: u32 = 0;
        for k in 0..bypp {
            packed |= u32::from(self.panel[offset + k]) << (8 * k);
        }
        epaper::rgba_to_grayscale(self.layout.unpack(packed))
    }

    /// All update regions driven since the last `clear_updates`
    pub fn updates(&self) -> &[(Rect, UpdateMode)] {
        &self.updates
    }

    pub fn clear_updates(&mut self) {
        self.updates.clear();
    }
}

impl DisplayBackend for EpaperEmulation {
    fn do_lock(&mut self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    fn do_unlock(&mut self, requests: &[CommitRequest], composite: &[Rgba], stride: usize) {
        let bypp = self.layout.bytes_per_pixel();
        for req in requests {
            trace!("panel update {:?} mode {:?}", req.rect, req.mode);
            epaper::update(
                &mut self.panel,
                self.width * bypp,
                &self.layout,
                composite,
                stride,
                req.rect,
                req.mode,
            );
            self.updates.push((req.rect, req.mode));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Layer, MaskOp, MemoryDisplay, OutputOp};

    #[test]
    fn test_panel_starts_white() {
        let panel = EpaperEmulation::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(panel.grayscale_at(x, y), 15);
            }
        }
    }

    #[test]
    fn test_commit_drives_panel() {
        let mut d = MemoryDisplay::new(EpaperEmulation::new(4, 2));
        d.lock();
        d.fill(Layer::Background, Rgba::BLACK, Rect::new(0, 0, 2, 2));
        d.fill(Layer::Background, Rgba::WHITE, Rect::new(2, 0, 4, 2));
        d.commit(Rect::default(), UpdateMode::PARTIAL);
        d.unlock();

        let panel = d.backend();
        assert_eq!(panel.grayscale_at(0, 0), 0);
        assert_eq!(panel.grayscale_at(1, 1), 0);
        assert_eq!(panel.grayscale_at(2, 0), 15);
        assert_eq!(panel.updates().len(), 1);
    }

    #[test]
    fn test_source_mono_mask_skips_midtones() {
        let mut d = MemoryDisplay::new(EpaperEmulation::new(2, 1));
        d.lock();
        d.fill(Layer::Background, Rgba::new(136, 136, 136, 255), Rect::new(0, 0, 1, 1));
        d.fill(Layer::Background, Rgba::BLACK, Rect::new(1, 0, 2, 1));
        d.commit(
            Rect::default(),
            UpdateMode::new(OutputOp::IDENTITY, MaskOp::SOURCE_MONO),
        );
        d.unlock();

        // The mid-gray pixel was masked out and stays white
        assert_eq!(d.backend().grayscale_at(0, 0), 15);
        assert_eq!(d.backend().grayscale_at(1, 0), 0);
    }
}
