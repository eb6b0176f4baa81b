//! Linux linear-framebuffer backend (`/dev/fb0`).
//!
//! The device is queried with the classic fbdev ioctls and mapped with
//! `mmap`. Only 32 bpp layouts are supported; the compositor's BGRA
//! ordering matches the common XRGB little-endian framebuffer layout.

use std::ffi::CString;

use core_geometry::Rect;
use core_pixels::Surface;

use crate::{DisplayBackend, DisplayError};

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
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
#[derive(Clone, Copy)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    kind: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

impl Default for FbFixScreeninfo {
    fn default() -> Self {
        // SAFETY: all-zero is a valid value for this plain-data struct.
        unsafe { std::mem::zeroed() }
    }
}

pub struct FramebufferBackend {
    path: String,
    fd: libc::c_int,
    map: *mut u8,
    map_len: usize,
    line_length: u32,
    back: Surface,
}

// Single-threaded server; the raw mapping never crosses threads but the
// owning struct may be moved into the runtime's root future.
unsafe impl Send for FramebufferBackend {}

impl FramebufferBackend {
    pub fn open(path: &str) -> Result<Self, DisplayError> {
        let cpath = CString::new(path).map_err(|_| DisplayError::Open {
            path: path.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        })?;
        // SAFETY: cpath is valid; fd checked below.
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(DisplayError::Open {
                path: path.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }

        let mut backend = FramebufferBackend {
            path: path.to_string(),
            fd,
            map: std::ptr::null_mut(),
            map_len: 0,
            line_length: 0,
            back: Surface::new(0, 0),
        };
        backend.query_and_map()?;
        tracing::info!(
            target: "display",
            path,
            width = backend.back.width(),
            height = backend.back.height(),
            "framebuffer opened"
        );
        Ok(backend)
    }

    fn query_and_map(&mut self) -> Result<(), DisplayError> {
        let mut var = FbVarScreeninfo::default();
        let mut fix = FbFixScreeninfo::default();
        // SAFETY: fd is open; the structs match the kernel ABI.
        let rc = unsafe { libc::ioctl(self.fd, FBIOGET_VSCREENINFO, &mut var) };
        if rc != 0 {
            return Err(DisplayError::Geometry(std::io::Error::last_os_error()));
        }
        let rc = unsafe { libc::ioctl(self.fd, FBIOGET_FSCREENINFO, &mut fix) };
        if rc != 0 {
            return Err(DisplayError::Geometry(std::io::Error::last_os_error()));
        }
        if var.bits_per_pixel != 32 {
            return Err(DisplayError::UnsupportedDepth(var.bits_per_pixel));
        }

        let map_len = fix.smem_len as usize;
        // SAFETY: mapping the device fd read-write, checked below.
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(DisplayError::Map(std::io::Error::last_os_error()));
        }

        self.unmap();
        self.map = map as *mut u8;
        self.map_len = map_len;
        self.line_length = fix.line_length;
        self.back.resize(var.xres, var.yres);
        Ok(())
    }

    fn unmap(&mut self) {
        if !self.map.is_null() {
            // SAFETY: map/map_len describe a live mapping.
            unsafe {
                libc::munmap(self.map as *mut libc::c_void, self.map_len);
            }
            self.map = std::ptr::null_mut();
            self.map_len = 0;
        }
    }
}

impl Drop for FramebufferBackend {
    fn drop(&mut self) {
        self.unmap();
        // SAFETY: fd came from open.
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl DisplayBackend for FramebufferBackend {
    fn width(&self) -> u32 {
        self.back.width()
    }

    fn height(&self) -> u32 {
        self.back.height()
    }

    fn backbuffer(&mut self) -> &mut Surface {
        &mut self.back
    }

    fn present(&mut self, damage: &[Rect]) {
        if self.map.is_null() {
            return;
        }
        let stride = self.line_length as usize;
        for rect in damage {
            let area = rect.clip_to_screen(self.back.width(), self.back.height());
            if area.is_empty() {
                continue;
            }
            for y in area.y..area.bottom() {
                let row_off = y as usize * stride + area.x as usize * 4;
                let count = area.width as usize * 4;
                if row_off + count > self.map_len {
                    break;
                }
                let src_start = (y as u32 * self.back.width() + area.x as u32) as usize;
                let src = &self.back.pixels()[src_start..src_start + area.width as usize];
                // SAFETY: bounds checked against map_len above.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        src.as_ptr() as *const u8,
                        self.map.add(row_off),
                        count,
                    );
                }
            }
        }
    }

    fn reinit(&mut self) -> Result<(), DisplayError> {
        let previous = (self.back.width(), self.back.height());
        match self.query_and_map() {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    target: "display",
                    path = %self.path,
                    error = %e,
                    ?previous,
                    "framebuffer reinit failed, keeping previous mode"
                );
                Err(e)
            }
        }
    }
}
