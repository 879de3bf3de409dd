//! Linux framebuffer backend for EPDC e-paper panels
//!
//! Maps the framebuffer device into memory and drives committed regions
//! through the i.MX EPDC update ioctls. Each update carries a waveform
//! hint derived from the commit's `UpdateMode` and a marker; the previous
//! marker is waited for before the next update is issued so overlapping
//! updates never race on the panel.

use std::fs::File;
use std::num::NonZeroUsize;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use std::ptr::NonNull;

use libc::{c_ulong, c_void};
use log::{debug, info};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use sumi_core::{ColorLayout, Rect, Rgba};
use thiserror::Error;

use crate::display::{CommitRequest, DisplayBackend, MaskOp, OutputOp};

/// Framebuffer backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to open framebuffer: {0}")]
    Io(#[from] std::io::Error),

    #[error("Framebuffer ioctl failed: {0}")]
    Nix(#[from] nix::Error),

    #[error("Unsupported pixel format: {0} bpp")]
    UnsupportedFormat(u32),
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: c_ulong,
    smem_len: u32,
    fb_type: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

impl Default for FbFixScreeninfo {
    fn default() -> Self {
        // Safe: the struct is plain old data read back by the kernel
        unsafe { std::mem::zeroed() }
    }
}

const FBIOGET_VSCREENINFO: c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: c_ulong = 0x4602;

nix::ioctl_read_bad!(fb_get_vscreeninfo, FBIOGET_VSCREENINFO, FbVarScreeninfo);
nix::ioctl_read_bad!(fb_get_fscreeninfo, FBIOGET_FSCREENINFO, FbFixScreeninfo);

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct MxcfbRect {
    top: u32,
    left: u32,
    width: u32,
    height: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct MxcfbAltBufferData {
    phys_addr: u32,
    width: u32,
    height: u32,
    alt_update_region: MxcfbRect,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct MxcfbUpdateData {
    update_region: MxcfbRect,
    waveform_mode: u32,
    update_mode: u32,
    update_marker: u32,
    temp: i32,
    flags: u32,
    alt_buffer_data: MxcfbAltBufferData,
}

// EPDC waveform modes
const WAVEFORM_MODE_A2: u32 = 4;
const WAVEFORM_MODE_AUTO: u32 = 257;

const UPDATE_MODE_PARTIAL: u32 = 0;

const TEMP_USE_AMBIENT: i32 = 0x1000;

const EPDC_FLAG_ENABLE_INVERSION: u32 = 0x01;
const EPDC_FLAG_FORCE_MONOCHROME: u32 = 0x02;

nix::ioctl_write_ptr!(mxcfb_send_update, b'F', 0x2E, MxcfbUpdateData);
nix::ioctl_write_int_bad!(
    mxcfb_wait_for_update_complete,
    nix::request_code_write!(b'F', 0x2F, std::mem::size_of::<u32>())
);

/// Framebuffer display driving an EPDC panel
pub struct FbDevDisplay {
    file: File,
    map: NonNull<c_void>,
    map_len: usize,
    /// Offset of the visible area inside the mapping, in bytes
    buf_offset: usize,
    /// Length of one framebuffer row in bytes
    stride: usize,
    width: i32,
    height: i32,
    layout: ColorLayout,
    /// Marker of the most recent update still possibly in flight
    prev_marker: Option<u32>,
    next_marker: u32,
}

impl FbDevDisplay {
    /// Open and map a framebuffer device
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let file = File::options().read(true).write(true).open(path)?;

        let mut vinfo = FbVarScreeninfo::default();
        let mut finfo = FbFixScreeninfo::default();
        unsafe {
            fb_get_vscreeninfo(file.as_raw_fd(), &mut vinfo)?;
            fb_get_fscreeninfo(file.as_raw_fd(), &mut finfo)?;
        }

        if vinfo.bits_per_pixel > 32 || vinfo.bits_per_pixel < 8 {
            return Err(BackendError::UnsupportedFormat(vinfo.bits_per_pixel));
        }

        let layout = ColorLayout {
            bpp: vinfo.bits_per_pixel as u8,
            rr: (8 - vinfo.red.length.min(8)) as u8,
            rl: vinfo.red.offset as u8,
            gr: (8 - vinfo.green.length.min(8)) as u8,
            gl: vinfo.green.offset as u8,
            br: (8 - vinfo.blue.length.min(8)) as u8,
            bl: vinfo.blue.offset as u8,
        };

        let id_len = finfo.id.iter().position(|&b| b == 0).unwrap_or(16);
        info!(
            "Opened {:?}: \"{}\" ({}x{}@{})",
            path,
            String::from_utf8_lossy(&finfo.id[..id_len]),
            vinfo.xres,
            vinfo.yres,
            vinfo.bits_per_pixel
        );

        let stride = finfo.line_length as usize;
        let map_len = stride * vinfo.yres_virtual.max(vinfo.yres) as usize;
        let map = unsafe {
            mmap(
                None,
                NonZeroUsize::new(map_len).ok_or(BackendError::UnsupportedFormat(0))?,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file.as_fd(),
                0,
            )?
        };

        let bypp = layout.bytes_per_pixel();
        let buf_offset = vinfo.xoffset as usize * bypp + vinfo.yoffset as usize * stride;

        Ok(Self {
            file,
            map,
            map_len,
            buf_offset,
            stride,
            width: vinfo.xres as i32,
            height: vinfo.yres as i32,
            layout,
            prev_marker: None,
            next_marker: 1,
        })
    }

    /// Copy one committed region from the composite into the framebuffer,
    /// packing pixels into the device layout
    fn write_region(&mut self, r: Rect, composite: &[Rgba], stride: usize) {
        let bypp = self.layout.bytes_per_pixel();
        let base = self.map.as_ptr() as *mut u8;
        for y in r.y0..r.y1 {
            let row_offset = self.buf_offset + y as usize * self.stride + r.x0 as usize * bypp;
            debug_assert!(row_offset + r.width() as usize * bypp <= self.map_len);
            let row = unsafe {
                std::slice::from_raw_parts_mut(
                    base.add(row_offset),
                    r.width() as usize * bypp,
                )
            };
            let src_row = &composite[y as usize * stride + r.x0 as usize..];
            for (x, px) in row.chunks_exact_mut(bypp).enumerate() {
                let packed = self.layout.pack(src_row[x]);
                for (k, byte) in px.iter_mut().enumerate() {
                    *byte = ((packed >> (8 * k)) & 0xFF) as u8;
                }
            }
        }
    }

    /// Issue an EPDC update for a region and remember its marker
    fn send_update(&mut self, r: Rect, req: &CommitRequest) {
        // The panel cannot take overlapping in-flight updates; wait for
        // the previous one first.
        if let Some(marker) = self.prev_marker.take() {
            let _ = unsafe {
                mxcfb_wait_for_update_complete(self.file.as_raw_fd(), marker as i32)
            };
        }

        let mut flags = 0;
        let waveform = if req.mode.mask.contains(MaskOp::SOURCE_MONO) {
            // Draft commits map to the fast black-and-white waveform
            flags |= EPDC_FLAG_FORCE_MONOCHROME;
            WAVEFORM_MODE_A2
        } else {
            WAVEFORM_MODE_AUTO
        };
        if req.mode.output.contains(OutputOp::INVERT) {
            flags |= EPDC_FLAG_ENABLE_INVERSION;
        }

        let marker = self.next_marker;
        self.next_marker = if self.next_marker >= 1024 {
            1
        } else {
            self.next_marker + 1
        };

        let data = MxcfbUpdateData {
            update_region: MxcfbRect {
                top: r.y0 as u32,
                left: r.x0 as u32,
                width: r.width() as u32,
                height: r.height() as u32,
            },
            waveform_mode: waveform,
            update_mode: UPDATE_MODE_PARTIAL,
            update_marker: marker,
            temp: TEMP_USE_AMBIENT,
            flags,
            alt_buffer_data: MxcfbAltBufferData::default(),
        };
        debug!(
            "epdc update {:?} waveform {} flags {:#x} marker {}",
            r, waveform, flags, marker
        );
        if unsafe { mxcfb_send_update(self.file.as_raw_fd(), &data) }.is_ok() {
            self.prev_marker = Some(marker);
        }
    }
}

impl Drop for FbDevDisplay {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.map, self.map_len);
        }
    }
}

impl DisplayBackend for FbDevDisplay {
    fn do_lock(&mut self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn do_unlock(&mut self, requests: &[CommitRequest], composite: &[Rgba], stride: usize) {
        for req in requests {
            let r = req.rect.clip(Rect::new(0, 0, self.width, self.height));
            if !r.valid() {
                continue;
            }
            self.write_region(r, composite, stride);
            self.send_update(r, req);
        }
    }
}
