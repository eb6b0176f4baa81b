//! Display output backends.
//!
//! The compositor draws every frame into a backend-owned backbuffer and
//! presents damaged rectangles. Three backends exist: the Linux linear
//! framebuffer (direct mode), an in-memory double buffer (tests, and the
//! drawing target for nested mode, whose frames are shipped to the host
//! compositor by the binary), and whatever implements the trait next.
//!
//! Failure policy: `reinit` errors leave the previous configuration
//! intact; the caller keeps compositing at the old size.

use core_geometry::Rect;
use core_pixels::Surface;
use thiserror::Error;

#[cfg(target_os = "linux")]
mod fbdev;
#[cfg(target_os = "linux")]
pub use fbdev::FramebufferBackend;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("opening {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("querying display geometry: {0}")]
    Geometry(std::io::Error),
    #[error("mapping framebuffer: {0}")]
    Map(std::io::Error),
    #[error("unsupported pixel layout: {0} bpp")]
    UnsupportedDepth(u32),
}

pub trait DisplayBackend {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn backbuffer(&mut self) -> &mut Surface;
    /// Copy the damaged backbuffer regions to the visible surface.
    fn present(&mut self, damage: &[Rect]);
    /// Re-query display geometry (after a host resize). On error the
    /// previous geometry stays valid.
    fn reinit(&mut self) -> Result<(), DisplayError>;
    /// Hint the geometry the next `reinit` should adopt. Hardware
    /// backends ignore this (their mode comes from the device); virtual
    /// backends use it to follow a host resize.
    fn request_mode(&mut self, _width: u32, _height: u32) {}
}

/// Double-buffered in-memory backend.
pub struct MemoryBackend {
    back: Surface,
    front: Surface,
    /// Geometry adopted by the next `reinit`, mimicking a host resize.
    pending_resize: Option<(u32, u32)>,
}

impl MemoryBackend {
    pub fn new(width: u32, height: u32) -> Self {
        MemoryBackend {
            back: Surface::new(width, height),
            front: Surface::new(width, height),
            pending_resize: None,
        }
    }

    pub fn front(&self) -> &Surface {
        &self.front
    }

    /// Stage a resize to be applied at the next `reinit`.
    pub fn stage_resize(&mut self, width: u32, height: u32) {
        self.pending_resize = Some((width, height));
    }
}

impl DisplayBackend for MemoryBackend {
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
        for rect in damage {
            let area = rect.clip_to_screen(self.back.width(), self.back.height());
            for y in area.y..area.bottom() {
                for x in area.x..area.right() {
                    if let Some(px) = self.back.get(x, y) {
                        self.front.put(x, y, px);
                    }
                }
            }
        }
    }

    fn reinit(&mut self) -> Result<(), DisplayError> {
        if let Some((w, h)) = self.pending_resize.take() {
            self.back.resize(w, h);
            self.front.resize(w, h);
            tracing::info!(target: "display", width = w, height = h, "memory backend resized");
        }
        Ok(())
    }

    fn request_mode(&mut self, width: u32, height: u32) {
        self.stage_resize(width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn present_copies_only_damage() {
        let mut be = MemoryBackend::new(16, 16);
        be.backbuffer().fill(0xFF112233);
        be.present(&[Rect::new(0, 0, 4, 4)]);
        assert_eq!(be.front().get(2, 2), Some(0xFF112233));
        assert_eq!(be.front().get(8, 8), Some(0));
    }

    #[test]
    fn staged_resize_applies_on_reinit() {
        let mut be = MemoryBackend::new(16, 16);
        be.stage_resize(32, 8);
        be.reinit().unwrap();
        assert_eq!(be.width(), 32);
        assert_eq!(be.height(), 8);
    }

    #[test]
    fn reinit_without_stage_is_noop() {
        let mut be = MemoryBackend::new(16, 16);
        be.backbuffer().fill(0xFFFFFFFF);
        be.reinit().unwrap();
        assert_eq!(be.width(), 16);
        assert_eq!(be.backbuffer().get(0, 0), Some(0xFFFFFFFF));
    }
}
