//! The window registry: wid-keyed ownership, five-band z-order, focus,
//! hit testing, lifecycle, and the resize buffer hand-off.
//!
//! Registry methods mutate state and return structured outcomes
//! (`FocusChange`, `ClosedWindow`) describing the notifications the
//! caller owes clients; the registry itself never performs IO beyond
//! shared-memory management.

use ahash::AHashMap;
use tracing::{debug, trace, warn};

use core_geometry::{screen_to_window, Rect};
use core_protocol::{BufId, Wid, WindowFlags, ZBand};
use core_shm::{buffer_name, RegionAllocator, ShmError};

use crate::window::{OwnerId, ServerWindow};
use crate::{Animation, AnimationMode, MIN_WINDOW_DIM};

/// Focus bookkeeping produced by a focus mutation. `lost` and `gained`
/// name the windows that must receive focus-change messages; `changed`
/// is false for no-op transitions (and nothing should be sent).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FocusChange {
    pub lost: Option<Wid>,
    pub gained: Option<Wid>,
    pub changed: bool,
}

/// What `mark_for_close` decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The window was hidden (never flipped); it was finalized
    /// immediately and the embedded record describes the teardown.
    Immediate,
    /// A closing animation is running; the post-render sweep will
    /// finalize it.
    Animating,
    /// Unknown wid or already closing; nothing to do.
    Ignored,
}

/// A fully torn-down window, reported so the caller can damage the
/// region it covered and notify clients.
#[derive(Debug)]
pub struct ClosedWindow {
    pub wid: Wid,
    pub owner: OwnerId,
    pub damage: Rect,
    pub focus: FocusChange,
}

pub struct WindowRegistry {
    windows: AHashMap<Wid, ServerWindow>,
    bottom: Option<Wid>,
    top: Option<Wid>,
    mid: Vec<Wid>,
    overlay: Vec<Wid>,
    menu: Vec<Wid>,
    /// Stored focus. Never the BOTTOM window: background focus is
    /// represented as `None` and resolved through `effective_focus`.
    focused: Option<Wid>,
    next_wid: Wid,
    next_bufid: BufId,
    ident: String,
}

impl WindowRegistry {
    pub fn new(ident: impl Into<String>) -> Self {
        WindowRegistry {
            windows: AHashMap::new(),
            bottom: None,
            top: None,
            mid: Vec::new(),
            overlay: Vec::new(),
            menu: Vec::new(),
            focused: None,
            next_wid: 1,
            next_bufid: 1,
            ident: ident.into(),
        }
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&self, wid: Wid) -> Option<&ServerWindow> {
        self.windows.get(&wid)
    }

    pub fn get_mut(&mut self, wid: Wid) -> Option<&mut ServerWindow> {
        self.windows.get_mut(&wid)
    }

    pub fn bottom(&self) -> Option<Wid> {
        self.bottom
    }

    pub fn top(&self) -> Option<Wid> {
        self.top
    }

    pub fn wids(&self) -> impl Iterator<Item = Wid> + '_ {
        self.windows.keys().copied()
    }

    pub fn windows_of(&self, owner: OwnerId) -> Vec<Wid> {
        self.windows
            .values()
            .filter(|w| w.owner == owner)
            .map(|w| w.wid)
            .collect()
    }

    // ---------------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------------

    /// Create a window and its first shared buffer. The window lands at
    /// the back (topmost) of the MID band, hidden until its first flip.
    pub fn create(
        &mut self,
        width: u32,
        height: u32,
        owner: OwnerId,
        flags: WindowFlags,
        shm: &mut dyn RegionAllocator,
    ) -> Result<Wid, ShmError> {
        let width = width.max(MIN_WINDOW_DIM);
        let height = height.max(MIN_WINDOW_DIM);

        let wid = self.next_wid;
        let bufid = self.next_bufid;
        let name = buffer_name(&self.ident, bufid);
        let mut region = shm.obtain(&name, (width * height * 4) as usize)?;
        region.as_mut_slice().fill(0);

        self.next_wid += 1;
        self.next_bufid += 1;

        let mut win = ServerWindow::new(wid, owner, width, height, flags);
        win.bufid = bufid;
        win.buffer = Some(region);
        self.windows.insert(wid, win);
        self.mid.push(wid);

        debug!(target: "window.registry", wid, owner, width, height, ?flags, "created window");
        Ok(wid)
    }

    // ---------------------------------------------------------------------
    // Z-order
    // ---------------------------------------------------------------------

    /// Remove a window from whatever band list holds it.
    fn unorder(&mut self, wid: Wid) {
        let Some(win) = self.windows.get_mut(&wid) else {
            return;
        };
        let band = win.band.take();
        match band {
            Some(ZBand::Bottom) => {
                if self.bottom == Some(wid) {
                    self.bottom = None;
                }
            }
            Some(ZBand::Top) => {
                if self.top == Some(wid) {
                    self.top = None;
                }
            }
            Some(ZBand::Mid) => self.mid.retain(|w| *w != wid),
            Some(ZBand::Overlay) => self.overlay.retain(|w| *w != wid),
            Some(ZBand::Menu) => self.menu.retain(|w| *w != wid),
            None => {}
        }
    }

    /// Move a window to a new band. Installing a singleton evicts the
    /// previous occupant, which becomes unbanded until re-stacked.
    pub fn reorder(&mut self, wid: Wid, band: ZBand) {
        if !self.windows.contains_key(&wid) {
            return;
        }
        self.unorder(wid);
        match band {
            ZBand::Bottom => {
                if let Some(old) = self.bottom.take() {
                    if let Some(w) = self.windows.get_mut(&old) {
                        w.band = None;
                    }
                }
                self.bottom = Some(wid);
                // A background window can not keep focus.
                if self.focused == Some(wid) {
                    self.focused = None;
                }
            }
            ZBand::Top => {
                if let Some(old) = self.top.take() {
                    if let Some(w) = self.windows.get_mut(&old) {
                        w.band = None;
                    }
                }
                self.top = Some(wid);
            }
            ZBand::Mid => self.mid.push(wid),
            ZBand::Overlay => self.overlay.push(wid),
            ZBand::Menu => self.menu.push(wid),
        }
        if let Some(w) = self.windows.get_mut(&wid) {
            w.band = Some(band);
        }
        trace!(target: "window.registry", wid, ?band, "restacked window");
    }

    /// Raise a window to the top of its ordered band. Singleton bands and
    /// unbanded windows are left alone.
    pub fn make_top(&mut self, wid: Wid) {
        let Some(band) = self.windows.get(&wid).and_then(|w| w.band) else {
            return;
        };
        let list = match band {
            ZBand::Mid => &mut self.mid,
            ZBand::Overlay => &mut self.overlay,
            ZBand::Menu => &mut self.menu,
            ZBand::Bottom | ZBand::Top => return,
        };
        if let Some(pos) = list.iter().position(|w| *w == wid) {
            let w = list.remove(pos);
            list.push(w);
        }
    }

    /// Wids back-to-front: BOTTOM, MID (oldest→newest), OVERLAY, MENU,
    /// TOP; this is the compositing order.
    pub fn back_to_front(&self) -> Vec<Wid> {
        let mut out = Vec::with_capacity(self.windows.len());
        out.extend(self.bottom);
        out.extend(self.mid.iter().copied());
        out.extend(self.overlay.iter().copied());
        out.extend(self.menu.iter().copied());
        out.extend(self.top);
        out
    }

    pub fn front_to_back(&self) -> Vec<Wid> {
        let mut out = self.back_to_front();
        out.reverse();
        out
    }

    // ---------------------------------------------------------------------
    // Focus
    // ---------------------------------------------------------------------

    /// The window input is routed to: the focused window, else BOTTOM.
    pub fn effective_focus(&self) -> Option<Wid> {
        self.focused.or(self.bottom)
    }

    /// Stored (non-background) focus.
    pub fn focused(&self) -> Option<Wid> {
        self.focused
    }

    /// Change focus. Focusing the BOTTOM window stores `None` (background
    /// focus) while still reporting the gain so the owner hears about it.
    /// Focusing the already-focused window is a no-op.
    pub fn set_focus(&mut self, target: Option<Wid>) -> FocusChange {
        let target = target.filter(|wid| self.windows.contains_key(wid));

        let is_bottom = target.is_some() && target == self.bottom;
        let stored = if is_bottom { None } else { target };

        if stored == self.focused {
            // Same effective focus, including repeat background clicks.
            return FocusChange::default();
        }

        let lost = self.focused;
        self.focused = stored;
        if let Some(wid) = stored {
            self.make_top(wid);
        }
        debug!(target: "window.registry", ?lost, gained = ?target, "focus changed");
        FocusChange {
            lost,
            gained: target,
            changed: true,
        }
    }

    // ---------------------------------------------------------------------
    // Geometry
    // ---------------------------------------------------------------------

    /// Move a window, returning the damage footprints before and after.
    pub fn move_window(&mut self, wid: Wid, x: i32, y: i32) -> Option<(Rect, Rect)> {
        let win = self.windows.get_mut(&wid)?;
        let before = win.damage_bounds();
        win.x = x;
        win.y = y;
        let after = win.damage_bounds();
        Some((before, after))
    }

    /// Clamp a wheel-driven opacity adjustment.
    pub fn adjust_opacity(&mut self, wid: Wid, delta: i32) -> Option<Rect> {
        let win = self.windows.get_mut(&wid)?;
        win.opacity = (win.opacity as i32 + delta).clamp(0, 255) as u8;
        Some(win.damage_bounds())
    }

    // ---------------------------------------------------------------------
    // Hit testing
    // ---------------------------------------------------------------------

    /// Topmost window accepting input at a screen coordinate. Walks
    /// front-to-back, transforms into each candidate's local frame, and
    /// applies the per-window alpha threshold.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<Wid> {
        for wid in self.front_to_back() {
            let Some(win) = self.windows.get(&wid) else {
                continue;
            };
            if win.hidden {
                continue;
            }
            let (lx, ly) = screen_to_window(
                (win.x, win.y),
                (win.width, win.height),
                win.rotation,
                x,
                y,
            );
            if win.accepts_input_at(lx, ly) {
                return Some(wid);
            }
        }
        None
    }

    // ---------------------------------------------------------------------
    // Reveal / close lifecycle
    // ---------------------------------------------------------------------

    /// First flip: unhide and start the opening animation.
    pub fn reveal(&mut self, wid: Wid, now_ms: u64) {
        let Some(win) = self.windows.get_mut(&wid) else {
            return;
        };
        if !win.hidden {
            return;
        }
        win.hidden = false;
        win.anim = AnimationMode::pick(win.flags, false).map(|m| Animation::new(m, now_ms));
    }

    pub fn hide(&mut self, wid: Wid) -> Option<Rect> {
        let win = self.windows.get_mut(&wid)?;
        win.hidden = true;
        Some(win.damage_bounds())
    }

    /// Mark a window closed. Hidden windows tear down immediately; the
    /// rest start their closing animation and stay rendered until the
    /// sweep reaps them.
    pub fn mark_for_close(
        &mut self,
        wid: Wid,
        now_ms: u64,
        shm: &mut dyn RegionAllocator,
    ) -> (CloseOutcome, Option<ClosedWindow>) {
        let Some(win) = self.windows.get_mut(&wid) else {
            return (CloseOutcome::Ignored, None);
        };
        if win.closing {
            return (CloseOutcome::Ignored, None);
        }
        if win.hidden {
            let closed = self.finalize(wid, shm);
            return (CloseOutcome::Immediate, closed);
        }
        win.closing = true;
        win.anim = AnimationMode::pick(win.flags, true).map(|m| Animation::new(m, now_ms));
        if win.anim.is_none() {
            // No closing animation available at all: reap on next sweep.
            win.anim = Some(Animation::new(AnimationMode::Disappear, now_ms));
        }
        (CloseOutcome::Animating, None)
    }

    /// Reap every closing window whose animation has expired. Called
    /// after each frame render.
    pub fn sweep_expired(
        &mut self,
        now_ms: u64,
        shm: &mut dyn RegionAllocator,
    ) -> Vec<ClosedWindow> {
        let expired: Vec<Wid> = self
            .windows
            .values()
            .filter(|w| {
                w.closing
                    && w.anim
                        .map(|a| a.expired(now_ms))
                        .unwrap_or(true)
            })
            .map(|w| w.wid)
            .collect();
        expired
            .into_iter()
            .filter_map(|wid| self.finalize(wid, shm))
            .collect()
    }

    /// Remove the window from every index and release its shared buffers
    /// (current, and pending if a resize was in flight). Reassigns focus
    /// to the topmost MENU window, then the topmost MID, else none.
    fn finalize(&mut self, wid: Wid, shm: &mut dyn RegionAllocator) -> Option<ClosedWindow> {
        self.unorder(wid);
        let win = self.windows.remove(&wid)?;
        let damage = win.damage_bounds();

        shm.release(&buffer_name(&self.ident, win.bufid));
        if win.newbufid != 0 {
            shm.release(&buffer_name(&self.ident, win.newbufid));
        }

        let focus = if self.focused == Some(wid) {
            self.focused = None;
            let next = self
                .menu
                .last()
                .or(self.mid.last())
                .copied();
            self.set_focus(next)
        } else {
            FocusChange::default()
        };

        debug!(target: "window.registry", wid, owner = win.owner, "window torn down");
        Some(ClosedWindow {
            wid,
            owner: win.owner,
            damage,
            focus,
        })
    }

    // ---------------------------------------------------------------------
    // Resize hand-off
    // ---------------------------------------------------------------------

    /// Client accepted an offer: mint the pending buffer. Idempotent: a
    /// second accept while one is pending returns the existing bufid.
    pub fn resize_begin(
        &mut self,
        wid: Wid,
        width: u32,
        height: u32,
        shm: &mut dyn RegionAllocator,
    ) -> Result<BufId, ShmError> {
        let next_bufid = self.next_bufid;
        let ident = self.ident.clone();
        let Some(win) = self.windows.get_mut(&wid) else {
            return Ok(0);
        };
        if win.newbufid != 0 {
            return Ok(win.newbufid);
        }
        let width = width.max(MIN_WINDOW_DIM);
        let height = height.max(MIN_WINDOW_DIM);
        let name = buffer_name(&ident, next_bufid);
        let region = match shm.obtain(&name, (width * height * 4) as usize) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "window.registry", wid, %e, "pending buffer allocation failed");
                return Err(e);
            }
        };
        win.newbufid = next_bufid;
        win.new_buffer = Some(region);
        self.next_bufid += 1;
        Ok(self.next_bufid - 1)
    }

    /// Client finished painting the pending buffer: swap it in, adopt the
    /// new geometry, and release the old region. Returns false when no
    /// resize was pending.
    pub fn resize_finish(
        &mut self,
        wid: Wid,
        width: u32,
        height: u32,
        shm: &mut dyn RegionAllocator,
    ) -> bool {
        let ident = self.ident.clone();
        let Some(win) = self.windows.get_mut(&wid) else {
            return false;
        };
        if win.newbufid == 0 {
            return false;
        }
        let old_bufid = win.bufid;
        win.bufid = win.newbufid;
        win.buffer = win.new_buffer.take();
        win.newbufid = 0;
        win.width = width.max(MIN_WINDOW_DIM);
        win.height = height.max(MIN_WINDOW_DIM);

        shm.release(&buffer_name(&ident, old_bufid));
        debug!(target: "window.registry", wid, width, height, bufid = win.bufid, "resize finished");
        true
    }
}
