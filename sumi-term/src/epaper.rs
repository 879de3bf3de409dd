//! E-paper update semantics
//!
//! An electrophoretic panel does not simply copy pixels: the driver
//! transforms the source (output op) and skips pixels the selected waveform
//! cannot or need not drive (mask op). This module implements that pixel
//! pipeline over 4-bit grayscale. The emulation backend uses it directly to
//! produce the exact on-screen result; the hardware backend delegates the
//! same semantics to the panel controller.

use sumi_core::{ColorLayout, Rect, Rgba};

use crate::display::{MaskOp, OutputOp, UpdateMode};

/// Convert a color to 4-bit grayscale using integer luminance weights
pub fn rgba_to_grayscale(c: Rgba) -> u8 {
    let luma = 77 * u32::from(c.r) + 151 * u32::from(c.g) + 28 * u32::from(c.b);
    (luma >> 12) as u8
}

/// Convert a 4-bit grayscale value to an opaque color on a 16-step ramp
pub fn grayscale_to_rgba(g: u8) -> Rgba {
    let x = 17 * (g & 0x0F);
    Rgba::new(x, x, x, 0xFF)
}

/// Apply the output op of `mode` to a source grayscale value
///
/// `White` is handled separately by `update` because it applies after the
/// mask has been computed.
fn apply_output_op(mode: UpdateMode, mut g_src: u8) -> u8 {
    if mode.output.contains(OutputOp::INVERT) {
        g_src = 15 - g_src;
    }
    if mode.output.contains(OutputOp::FORCE_MONO) {
        g_src = if g_src > 7 { 15 } else { 0 };
    }
    g_src
}

/// Whether a pixel with the given grayscale values is skipped by the mask
fn masked(mode: UpdateMode, g_src: u8, g_tar: u8) -> bool {
    if mode.mask.contains(MaskOp::SOURCE_MONO) && g_src != 0 && g_src != 15 {
        return true;
    }
    if mode.mask.contains(MaskOp::TARGET_MONO) && g_tar != 0 && g_tar != 15 {
        return true;
    }
    if mode.mask.contains(MaskOp::PARTIAL) && g_tar == g_src {
        return true;
    }
    false
}

/// The resulting grayscale of one pixel update
///
/// This is the reference semantics of a panel update; `update` applies it
/// over a buffer.
pub fn update_pixel(mode: UpdateMode, g_src: u8, g_tar: u8) -> u8 {
    let g_out = apply_output_op(mode, g_src);
    let is_masked = masked(mode, g_out, g_tar);
    let g_out = if mode.output.contains(OutputOp::WHITE) {
        15
    } else {
        g_out
    };
    if is_masked {
        g_tar
    } else {
        g_out
    }
}

/// Drive a region of a packed target buffer from an RGBA source
///
/// `target`/`target_stride` (bytes) describe the panel memory with pixels
/// packed per `layout`; `src`/`src_stride` (pixels) the composed RGBA
/// frame. Both are indexed with the same rectangle coordinates.
pub fn update(
    target: &mut [u8],
    target_stride: usize,
    layout: &ColorLayout,
    src: &[Rgba],
    src_stride: usize,
    r: Rect,
    mode: UpdateMode,
) {
    if !r.valid() {
        return;
    }
    let bypp = layout.bytes_per_pixel();
    for y in r.y0..r.y1 {
        let mut t = y as usize * target_stride + r.x0 as usize * bypp;
        let src_row = y as usize * src_stride;
        for x in r.x0..r.x1 {
            // Read the current panel pixel and the source pixel
            let mut packed: u32 = 0;
            for k in 0..bypp {
                packed |= u32::from(target[t + k]) << (8 * k);
            }
            let g_tar = rgba_to_grayscale(layout.unpack(packed));
            let g_src = rgba_to_grayscale(src[src_row + x as usize]);

            let g_out = update_pixel(mode, g_src, g_tar);
            let out = layout.pack(grayscale_to_rgba(g_out));
            for k in 0..bypp {
                target[t + k] = ((out >> (8 * k)) & 0xFF) as u8;
            }
            t += bypp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_ramp() {
        assert_eq!(grayscale_to_rgba(0), Rgba::new(0, 0, 0, 255));
        assert_eq!(grayscale_to_rgba(15), Rgba::WHITE);
        assert_eq!(grayscale_to_rgba(8), Rgba::new(136, 136, 136, 255));
        // Values wrap at 4 bits
        assert_eq!(grayscale_to_rgba(16), grayscale_to_rgba(0));
    }

    #[test]
    fn test_grayscale_roundtrip_on_ramp() {
        for g in 0..=15u8 {
            assert_eq!(rgba_to_grayscale(grayscale_to_rgba(g)), g);
        }
    }

    #[test]
    fn test_rgba_to_grayscale_extremes() {
        assert_eq!(rgba_to_grayscale(Rgba::BLACK), 0);
        assert_eq!(rgba_to_grayscale(Rgba::WHITE), 15);
    }

    #[test]
    fn test_output_ops() {
        let invert = UpdateMode::new(OutputOp::INVERT, MaskOp::FULL);
        assert_eq!(update_pixel(invert, 0, 7), 15);
        assert_eq!(update_pixel(invert, 15, 7), 0);

        let mono = UpdateMode::new(OutputOp::FORCE_MONO, MaskOp::FULL);
        assert_eq!(update_pixel(mono, 7, 3), 0);
        assert_eq!(update_pixel(mono, 8, 3), 15);

        let both = UpdateMode::new(
            OutputOp::INVERT.union(OutputOp::FORCE_MONO),
            MaskOp::FULL,
        );
        assert_eq!(update_pixel(both, 3, 0), 15); // 3 -> 12 -> 15

        let white = UpdateMode::new(OutputOp::WHITE, MaskOp::FULL);
        assert_eq!(update_pixel(white, 3, 0), 15);
    }

    #[test]
    fn test_mask_table() {
        // Exhaustive check of the mask rules over all grayscale pairs
        for g_src in 0..=15u8 {
            for g_tar in 0..=15u8 {
                let src_mono = g_src == 0 || g_src == 15;
                let tar_mono = g_tar == 0 || g_tar == 15;

                let full = UpdateMode::new(OutputOp::IDENTITY, MaskOp::FULL);
                assert_eq!(update_pixel(full, g_src, g_tar), g_src);

                let sm = UpdateMode::new(OutputOp::IDENTITY, MaskOp::SOURCE_MONO);
                let want = if src_mono { g_src } else { g_tar };
                assert_eq!(update_pixel(sm, g_src, g_tar), want);

                let tm = UpdateMode::new(OutputOp::IDENTITY, MaskOp::TARGET_MONO);
                let want = if tar_mono { g_src } else { g_tar };
                assert_eq!(update_pixel(tm, g_src, g_tar), want);

                let stm = UpdateMode::new(OutputOp::IDENTITY, MaskOp::SOURCE_AND_TARGET_MONO);
                let want = if src_mono && tar_mono { g_src } else { g_tar };
                assert_eq!(update_pixel(stm, g_src, g_tar), want);

                let partial = UpdateMode::new(OutputOp::IDENTITY, MaskOp::PARTIAL);
                assert_eq!(update_pixel(partial, g_src, g_tar), g_src);
            }
        }
    }

    #[test]
    fn test_mask_applies_after_output_op() {
        // A mid-tone source forced to mono passes the source-mono mask
        let mode = UpdateMode::new(OutputOp::FORCE_MONO, MaskOp::SOURCE_MONO);
        assert_eq!(update_pixel(mode, 7, 9), 0);
        assert_eq!(update_pixel(mode, 9, 3), 15);
    }

    #[test]
    fn test_update_buffer() {
        let layout = ColorLayout::RGB32;
        let w = 4usize;
        let stride = w * 4;
        let mut target = vec![0u8; stride * 2];
        // Panel starts all white
        let white = layout.pack(Rgba::WHITE);
        for px in 0..(w * 2) {
            for k in 0..4 {
                target[px * 4 + k] = ((white >> (8 * k)) & 0xFF) as u8;
            }
        }

        // Source: black left half, mid-gray right half
        let mut src = vec![Rgba::WHITE; w * 2];
        src[0] = Rgba::BLACK;
        src[1] = Rgba::BLACK;
        src[2] = grayscale_to_rgba(8);
        src[3] = grayscale_to_rgba(8);

        update(
            &mut target,
            stride,
            &layout,
            &src,
            w,
            Rect::new(0, 0, w as i32, 1),
            UpdateMode::DRAFT,
        );

        let read = |x: usize| {
            let mut v: u32 = 0;
            for k in 0..4 {
                v |= u32::from(target[x * 4 + k]) << (8 * k);
            }
            rgba_to_grayscale(layout.unpack(v))
        };
        // Black pixels were driven; the mid-gray ones were masked out
        assert_eq!(read(0), 0);
        assert_eq!(read(1), 0);
        assert_eq!(read(2), 15);
        assert_eq!(read(3), 15);
        // The second row was outside the rectangle
        assert_eq!(read(w), 15);
    }
}
