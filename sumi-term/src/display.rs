//! Layered in-memory display with deferred batched commits
//!
//! Drawing happens on two RGBA layers: an opaque Background and a
//! Presentation layer holding premultiplied-alpha glyphs. All operations
//! require the display to be locked; committed regions are composed and
//! handed to the backend in one batch when the outermost lock is released.
//! This keeps the expensive backend round trip (and on real hardware the
//! e-paper driver wait) out of the per-cell drawing path.

use bitflags::bitflags;
use log::warn;
use sumi_core::{Point, Rect, Rgba};

use crate::dither;

bitflags! {
    /// Transformation applied to source pixels before they are written
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutputOp: u8 {
        const INVERT = 1 << 0;
        const FORCE_MONO = 1 << 1;
        const WHITE = 1 << 2;
    }
}

impl OutputOp {
    /// Leave source pixels unchanged
    pub const IDENTITY: OutputOp = OutputOp::empty();
}

bitflags! {
    /// Selects which pixels of a commit region the panel actually rewrites
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MaskOp: u8 {
        /// Skip pixels whose source is a mid-tone (not pure black/white)
        const SOURCE_MONO = 1 << 0;
        /// Skip pixels whose current panel content is a mid-tone
        const TARGET_MONO = 1 << 1;
        /// Skip pixels whose source equals the panel content
        const PARTIAL = 1 << 2;
    }
}

impl MaskOp {
    /// Rewrite every pixel in the region
    pub const FULL: MaskOp = MaskOp::empty();
    pub const SOURCE_AND_TARGET_MONO: MaskOp =
        MaskOp::SOURCE_MONO.union(MaskOp::TARGET_MONO);
}

/// How a committed region is driven to the e-paper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateMode {
    pub output: OutputOp,
    pub mask: MaskOp,
}

impl UpdateMode {
    pub const fn new(output: OutputOp, mask: MaskOp) -> Self {
        Self { output, mask }
    }

    /// Fast monochrome draft update
    pub const DRAFT: UpdateMode = UpdateMode::new(OutputOp::IDENTITY, MaskOp::SOURCE_MONO);

    /// Grayscale update of the pixels that changed
    pub const PARTIAL: UpdateMode = UpdateMode::new(OutputOp::IDENTITY, MaskOp::PARTIAL);
}

/// A queued region waiting to be driven to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRequest {
    pub rect: Rect,
    pub mode: UpdateMode,
}

/// The drawing layers of the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Opaque bottom layer holding cell backgrounds
    Background,
    /// Premultiplied-alpha layer holding glyphs, blended over the background
    Presentation,
}

/// Blit modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    /// Store the premultiplied color where the mask is non-zero
    Write,
    /// Clear pixels where the mask is non-zero
    Erase,
}

/// Connects the memory display to a physical surface
pub trait DisplayBackend {
    /// Called on the outermost `lock`; returns the physical display
    /// rectangle in display coordinates, or an invalid rectangle if no
    /// surface is available (the frame then degrades to a no-op).
    fn do_lock(&mut self) -> Rect;

    /// Called on the outermost `unlock` with all queued requests (in
    /// display coordinates), the composed RGBA buffer and its row stride
    /// in pixels. Blocks until the regions have been driven out.
    fn do_unlock(&mut self, requests: &[CommitRequest], composite: &[Rgba], stride: usize);
}

impl<T: DisplayBackend + ?Sized> DisplayBackend for Box<T> {
    fn do_lock(&mut self) -> Rect {
        (**self).do_lock()
    }

    fn do_unlock(&mut self, requests: &[CommitRequest], composite: &[Rgba], stride: usize) {
        (**self).do_unlock(requests, composite, stride)
    }
}

/// Layered 32-bpp compositor in front of a display backend
///
/// Exclusive access is enforced by `&mut` ownership; the explicit lock
/// depth only tracks reentrancy so the backend hooks fire exactly once per
/// outermost lock/unlock cycle.
pub struct MemoryDisplay<B: DisplayBackend> {
    backend: B,
    depth: u32,
    width: usize,
    height: usize,
    /// Row stride in pixels; rows are padded to 16-byte boundaries
    stride: usize,
    display_rect: Rect,
    surf_rect: Rect,
    requests: Vec<CommitRequest>,
    composite: Vec<Rgba>,
    layer_bg: Vec<Rgba>,
    layer_pr: Vec<Rgba>,
}

impl<B: DisplayBackend> MemoryDisplay<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            depth: 0,
            width: 0,
            height: 0,
            stride: 0,
            display_rect: Rect::default(),
            surf_rect: Rect::default(),
            requests: Vec::new(),
            composite: Vec::new(),
            layer_bg: Vec::new(),
            layer_pr: Vec::new(),
        }
    }

    /// Access the backend, e.g. to inspect an emulated panel
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Lock the surface for drawing
    ///
    /// The outermost lock queries the backend for the current display
    /// rectangle and reallocates the layers if the geometry changed.
    /// Returns the drawable surface in local (0-based) coordinates; the
    /// result is invalid when the backend has no surface.
    pub fn lock(&mut self) -> Rect {
        if self.depth == 0 {
            let r = self.backend.do_lock();
            if r.valid() {
                self.resize(r.width() as usize, r.height() as usize);
                self.display_rect = r;
                self.surf_rect = Rect::new(0, 0, self.width as i32, self.height as i32);
            }
        }
        self.depth += 1;
        self.surf_rect
    }

    /// Release the surface
    ///
    /// The outermost unlock composes every committed region and hands the
    /// whole batch to the backend.
    pub fn unlock(&mut self) {
        if self.depth == 0 {
            warn!("unlock without matching lock");
            return;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return;
        }

        let origin = Point::new(self.display_rect.x0, self.display_rect.y0);
        for i in 0..self.requests.len() {
            let r = self.requests[i].rect;
            self.compose(r);
            self.requests[i].rect = r + origin;
        }
        self.backend
            .do_unlock(&self.requests, &self.composite, self.stride);
        self.requests.clear();
    }

    /// Queue a region for the backend; only valid while locked
    ///
    /// The rectangle is clipped to the surface; an invalid rectangle
    /// selects the whole surface.
    pub fn commit(&mut self, r: Rect, mode: UpdateMode) {
        if self.depth == 0 {
            warn!("commit on unlocked display");
            return;
        }
        let rect = if r.valid() {
            self.surf_rect.clip(r)
        } else {
            self.surf_rect
        };
        if rect.valid() {
            self.requests.push(CommitRequest { rect, mode });
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut [Rgba] {
        match layer {
            Layer::Background => &mut self.layer_bg,
            Layer::Presentation => &mut self.layer_pr,
        }
    }

    /// Clip a drawing rectangle; returns an invalid rect when unlocked
    fn clip_op(&self, r: Rect) -> Rect {
        if self.depth == 0 {
            return Rect::default();
        }
        self.surf_rect.clip(r)
    }

    /// Fill a rectangle of a layer with a solid color
    pub fn fill(&mut self, layer: Layer, c: Rgba, r: Rect) {
        let r = self.clip_op(r);
        if !r.valid() {
            return;
        }
        let stride = self.stride;
        let f = c.premultiply_alpha();
        let buf = self.layer_mut(layer);
        for y in r.y0..r.y1 {
            let row = y as usize * stride;
            buf[row + r.x0 as usize..row + r.x1 as usize].fill(f);
        }
    }

    /// Fill a rectangle of a layer with an ordered dither pattern for the
    /// 4-bit grayscale value `g`
    pub fn fill_dither(&mut self, layer: Layer, g: u8, r: Rect) {
        let r = self.clip_op(r);
        if !r.valid() {
            return;
        }
        let stride = self.stride;
        dither::ordered_binary_4bit_grayscale(g, self.layer_mut(layer), stride, r);
    }

    /// Blit an 8-bit alpha mask with the given color
    ///
    /// In `Write` mode covered pixels receive the premultiplied color; in
    /// `Erase` mode they are cleared to transparent. `mask_stride` is the
    /// width of one mask row in bytes.
    pub fn blit(
        &mut self,
        layer: Layer,
        c: Rgba,
        mask: &[u8],
        mask_stride: usize,
        r: Rect,
        mode: DrawMode,
    ) {
        let rc = self.clip_op(r);
        if !rc.valid() {
            return;
        }
        let stride = self.stride;
        let buf = self.layer_mut(layer);
        for y in rc.y0..rc.y1 {
            let row = y as usize * stride;
            let mask_row = (y - r.y0) as usize * mask_stride;
            for x in rc.x0..rc.x1 {
                let a = u16::from(mask[mask_row + (x - r.x0) as usize]);
                if a == 0 {
                    continue;
                }
                buf[row + x as usize] = match mode {
                    DrawMode::Write => Rgba::new(
                        (u16::from(c.r) * a / 255) as u8,
                        (u16::from(c.g) * a / 255) as u8,
                        (u16::from(c.b) * a / 255) as u8,
                        a as u8,
                    ),
                    DrawMode::Erase => Rgba::TRANSPARENT,
                };
            }
        }
    }

    /// Reallocate the layer buffers for a new surface size
    fn resize(&mut self, w: usize, h: usize) {
        if w == self.width && h == self.height {
            return;
        }
        // Pad rows to a 16-byte boundary (4 pixels)
        self.stride = (w + 3) & !3;
        self.width = w;
        self.height = h;

        let size = h * self.stride;
        for buf in [&mut self.composite, &mut self.layer_bg, &mut self.layer_pr] {
            buf.clear();
            buf.resize(size, Rgba::TRANSPARENT);
        }
    }

    /// Blend the presentation layer over the opaque background into the
    /// composite buffer for one region
    fn compose(&mut self, r: Rect) {
        for y in r.y0..r.y1 {
            let row = y as usize * self.stride;
            for x in r.x0..r.x1 {
                let i = row + x as usize;
                let bg = self.layer_bg[i];
                let pr = self.layer_pr[i];
                let ia = 255 - u16::from(pr.a);
                self.composite[i] = Rgba::new(
                    (u16::from(bg.r) * ia / 255 + u16::from(pr.r)).min(255) as u8,
                    (u16::from(bg.g) * ia / 255 + u16::from(pr.g)).min(255) as u8,
                    (u16::from(bg.b) * ia / 255 + u16::from(pr.b)).min(255) as u8,
                    0xFF,
                );
            }
        }
    }
}
