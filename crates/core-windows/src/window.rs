//! The server-side window record.

use core_geometry::{rotated_bounds, Rect};
use core_pixels::{alpha_of, as_pixels};
use core_protocol::{BufId, CursorHint, Wid, WindowFlags, ZBand};
use core_shm::SharedRegion;

use crate::Animation;

/// Client identity owning a window (the transport endpoint id).
pub type OwnerId = u64;

/// Saved geometry for restoring a tiled window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRestore {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One window as the server tracks it.
pub struct ServerWindow {
    pub wid: Wid,
    pub owner: OwnerId,

    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Rotation in whole degrees about the window center.
    pub rotation: i32,

    /// Band membership. `None` after being evicted from a singleton band,
    /// until the client re-stacks the window.
    pub band: Option<ZBand>,

    pub bufid: BufId,
    pub buffer: Option<SharedRegion>,
    /// Pending buffer minted at resize-accept; promoted at resize-done.
    pub newbufid: BufId,
    pub new_buffer: Option<SharedRegion>,

    pub flags: WindowFlags,
    pub opacity: u8,
    /// Set until the first flip; hidden windows never render or take
    /// input.
    pub hidden: bool,
    /// Set when the window has been marked for close; rendering continues
    /// until the closing animation expires.
    pub closing: bool,
    pub tiled: Option<TileRestore>,
    pub anim: Option<Animation>,

    /// Minimum pixel alpha accepted by hit testing; `>= 256` makes the
    /// window click-through.
    pub alpha_threshold: u32,

    /// Cursor shown while this window is under the pointer.
    pub cursor_hint: CursorHint,
    /// Sticky default restored by a cursor reset.
    pub default_cursor: CursorHint,

    // Client-published metadata for advertisement.
    pub client_flags: u32,
    pub client_icon: u32,
    pub client_strings: Vec<u8>,
}

impl ServerWindow {
    pub(crate) fn new(wid: Wid, owner: OwnerId, width: u32, height: u32, flags: WindowFlags) -> Self {
        ServerWindow {
            wid,
            owner,
            x: 0,
            y: 0,
            width,
            height,
            rotation: 0,
            band: Some(ZBand::Mid),
            bufid: 0,
            buffer: None,
            newbufid: 0,
            new_buffer: None,
            flags,
            opacity: 255,
            hidden: true,
            closing: false,
            tiled: None,
            anim: None,
            alpha_threshold: 0,
            cursor_hint: CursorHint::Default,
            default_cursor: CursorHint::Default,
            client_flags: 0,
            client_icon: 0,
            client_strings: Vec::new(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Screen-space damage footprint: the rotated bounding box of the
    /// whole window.
    pub fn damage_bounds(&self) -> Rect {
        rotated_bounds(
            (self.x, self.y),
            (self.width, self.height),
            self.rotation,
            Rect::new(0, 0, self.width, self.height),
        )
    }

    /// Damage footprint of a window-local region.
    pub fn damage_bounds_relative(&self, local: Rect) -> Rect {
        rotated_bounds(
            (self.x, self.y),
            (self.width, self.height),
            self.rotation,
            local,
        )
    }

    pub fn is_singleton_band(&self) -> bool {
        self.band.is_some_and(ZBand::is_singleton)
    }

    /// Read a pixel from the current buffer in window-local coordinates.
    pub fn pixel_at(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let region = self.buffer.as_ref()?;
        let pixels = as_pixels(region.as_slice());
        pixels.get((y as u32 * self.width + x as u32) as usize).copied()
    }

    /// Whether a window-local point accepts input per the hit-test
    /// threshold. A threshold above 255 can never be met.
    pub fn accepts_input_at(&self, x: i32, y: i32) -> bool {
        if self.alpha_threshold > u8::MAX as u32 {
            return false;
        }
        match self.pixel_at(x, y) {
            Some(px) => alpha_of(px) as u32 >= self.alpha_threshold,
            None => false,
        }
    }
}

impl std::fmt::Debug for ServerWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerWindow")
            .field("wid", &self.wid)
            .field("owner", &self.owner)
            .field("rect", &self.rect())
            .field("band", &self.band)
            .field("bufid", &self.bufid)
            .field("newbufid", &self.newbufid)
            .field("hidden", &self.hidden)
            .field("closing", &self.closing)
            .finish()
    }
}
