//! The pointer state machine.
//!
//! Pointer position is tracked in 10×-scaled integer coordinates so
//! relative devices can accumulate sub-pixel motion; absolute devices
//! write whole-pixel coordinates at scale. All screen-space decisions
//! divide by [`POINTER_SCALE`] first.
//!
//! States: NORMAL (hover + delivery), MOVING (alt-drag reposition, edge
//! tiling), DRAGGING (button held inside a client window), RESIZING
//! (interactive nine-direction resize with a scaled preview), ROTATING
//! (alt-right-drag rotation about the window center).

use tracing::{debug, trace};

use core_events::PointerPacket;
use core_geometry::{screen_to_window, window_to_screen, Rect};
use core_protocol::{
    CursorHint, Message, ModMask, MouseButtons, MouseCommand, PointerKind, ResizeDirection,
    TileEdges, Wid,
};
use core_windows::{compute_tile, TileRestore, WindowRegistry};

use crate::outbox::Outbox;

/// Pointer coordinates are tracked at ten times screen resolution.
pub const POINTER_SCALE: i32 = 10;

/// Scaled units added per relative-device count: 0.3 px of motion per
/// count, smoothing slow movements.
const INCOMING_SCALE: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerState {
    Normal,
    Moving,
    Dragging,
    Resizing,
    Rotating,
}

/// Interaction tunables, plumbed from configuration.
#[derive(Clone, Copy, Debug)]
pub struct PointerConfig {
    pub edge_snap_px: i32,
    pub untile_sensitivity: i32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        PointerConfig {
            edge_snap_px: 10,
            untile_sensitivity: 40,
        }
    }
}

/// The in-progress interactive resize, rendered as a scaled preview of
/// the old buffer until the client completes the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizePreview {
    pub wid: Wid,
    pub direction: ResizeDirection,
    pub init_w: u32,
    pub init_h: u32,
    pub w: u32,
    pub h: u32,
    pub offset_x: i32,
    pub offset_y: i32,
}

struct ResizeGrab {
    preview: ResizePreview,
    button: MouseButtons,
    offer_sent: bool,
}

/// Which sprite the cursor overlay should draw, and the rotation (in
/// degrees) inherited from the window under the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorChoice {
    pub kind: CursorKind,
    pub rotation: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorKind {
    Arrow,
    Drag,
    ResizeV,
    ResizeH,
    ResizeUlDr,
    ResizeDlUr,
    Point,
    Ibeam,
    Hidden,
}

pub struct PointerDispatcher {
    state: PointerState,
    /// Scaled position.
    x: i32,
    y: i32,
    /// Scaled position at grab time.
    init_x: i32,
    init_y: i32,
    /// Window origin at grab time.
    win_x: i32,
    win_y: i32,
    /// Window under an active grab.
    grab: Option<Wid>,
    /// Window under the cursor during NORMAL hover.
    hover: Option<Wid>,
    /// Last delivered local drag position, plus the original click.
    click_x: i32,
    click_y: i32,
    click_orig_x: i32,
    click_orig_y: i32,
    drag_button: MouseButtons,
    moved: bool,
    rotate_offset: i32,
    resize: Option<ResizeGrab>,
    resize_release_ms: Option<u64>,
    last_buttons: MouseButtons,
    modifiers: ModMask,
    config: PointerConfig,
}

impl PointerDispatcher {
    pub fn new(config: PointerConfig) -> Self {
        PointerDispatcher {
            state: PointerState::Normal,
            x: 0,
            y: 0,
            init_x: 0,
            init_y: 0,
            win_x: 0,
            win_y: 0,
            grab: None,
            hover: None,
            click_x: 0,
            click_y: 0,
            click_orig_x: 0,
            click_orig_y: 0,
            drag_button: MouseButtons::empty(),
            moved: false,
            rotate_offset: 0,
            resize: None,
            resize_release_ms: None,
            last_buttons: MouseButtons::empty(),
            modifiers: ModMask::empty(),
            config,
        }
    }

    pub fn state(&self) -> PointerState {
        self.state
    }

    /// Screen-space pointer position.
    pub fn position(&self) -> (i32, i32) {
        (self.x / POINTER_SCALE, self.y / POINTER_SCALE)
    }

    pub fn buttons(&self) -> MouseButtons {
        self.last_buttons
    }

    /// Keyboard routing keeps the dispatcher informed of the live
    /// modifier mask.
    pub fn set_modifiers(&mut self, modifiers: ModMask) {
        self.modifiers = modifiers;
    }

    pub fn resize_preview(&self) -> Option<&ResizePreview> {
        self.resize.as_ref().map(|g| &g.preview)
    }

    // ---------------------------------------------------------------------
    // Packet entry point
    // ---------------------------------------------------------------------

    pub fn handle_packet(
        &mut self,
        pkt: PointerPacket,
        reg: &mut WindowRegistry,
        screen: (u32, u32),
        now_ms: u64,
        out: &mut Outbox,
    ) {
        match pkt.kind {
            PointerKind::Relative => {
                self.x += pkt.x * INCOMING_SCALE;
                self.y += pkt.y * INCOMING_SCALE;
            }
            PointerKind::Absolute => {
                self.x = pkt.x * POINTER_SCALE;
                self.y = pkt.y * POINTER_SCALE;
            }
        }
        self.x = self.x.clamp(0, screen.0 as i32 * POINTER_SCALE);
        self.y = self.y.clamp(0, screen.1 as i32 * POINTER_SCALE);

        let buttons = pkt.buttons;
        match self.state {
            PointerState::Normal => self.normal_state(buttons, reg, out),
            PointerState::Moving => self.moving_state(buttons, reg, screen, out),
            PointerState::Dragging => self.dragging_state(buttons, reg, out),
            PointerState::Resizing => self.resizing_state(buttons, reg, now_ms, out),
            PointerState::Rotating => self.rotating_state(buttons, reg, out),
        }
        self.last_buttons = buttons;
    }

    // ---------------------------------------------------------------------
    // NORMAL
    // ---------------------------------------------------------------------

    fn normal_state(&mut self, buttons: MouseButtons, reg: &mut WindowRegistry, out: &mut Outbox) {
        let alt = self.modifiers.contains(ModMask::ALT);
        let (px, py) = self.position();

        if buttons.contains(MouseButtons::LEFT) && alt {
            self.start_move(None, reg, out);
        } else if buttons.contains(MouseButtons::SCROLL_UP) && alt {
            self.adjust_opacity(8, reg, out);
        } else if buttons.contains(MouseButtons::SCROLL_DOWN) && alt {
            self.adjust_opacity(-8, reg, out);
        } else if buttons.contains(MouseButtons::RIGHT) && alt {
            self.start_rotate(reg, out);
        } else if buttons.contains(MouseButtons::MIDDLE) && alt {
            self.start_resize(ResizeDirection::Auto, None, MouseButtons::MIDDLE, reg, out);
        } else if buttons.contains(MouseButtons::LEFT) && !alt {
            // Plain click: focus what's under the cursor and begin a
            // client-side drag.
            self.state = PointerState::Dragging;
            let change = reg.set_focus(reg.hit_test(px, py));
            out.apply_focus_change(change, reg);
            self.grab = reg.effective_focus();
            self.moved = false;
            self.drag_button = MouseButtons::LEFT;
            if let Some(wid) = self.grab {
                if let Some(win) = reg.get(wid) {
                    let (lx, ly) = screen_to_window(
                        (win.x, win.y),
                        (win.width, win.height),
                        win.rotation,
                        px,
                        py,
                    );
                    self.click_x = lx;
                    self.click_y = ly;
                    self.click_orig_x = lx;
                    self.click_orig_y = ly;
                    out.send(
                        win.owner,
                        Message::WindowMouseEvent {
                            wid,
                            x: lx,
                            y: ly,
                            old_x: -1,
                            old_y: -1,
                            buttons,
                            command: MouseCommand::Down,
                            modifiers: self.modifiers,
                        },
                    );
                }
            }
        } else {
            self.hover_deliveries(buttons, reg, out);
        }
    }

    /// Plain motion: deliver moves to the focused window and the window
    /// under the cursor, and enter/leave on hover changes.
    fn hover_deliveries(
        &mut self,
        buttons: MouseButtons,
        reg: &mut WindowRegistry,
        out: &mut Outbox,
    ) {
        let (px, py) = self.position();
        let focused = reg.effective_focus();
        let top = reg.hit_test(px, py);

        if let Some(wid) = focused {
            if !buttons.contains(MouseButtons::RIGHT) {
                self.send_local_mouse(wid, MouseCommand::Move, buttons, reg, out);
            }
        }

        if let Some(top_wid) = top {
            if Some(top_wid) != self.hover {
                self.send_local_mouse(top_wid, MouseCommand::Enter, buttons, reg, out);
                if let Some(old) = self.hover {
                    self.send_local_mouse(old, MouseCommand::Leave, buttons, reg, out);
                }
                self.hover = Some(top_wid);
            }
            if Some(top_wid) != focused || buttons.contains(MouseButtons::RIGHT) {
                self.send_local_mouse(top_wid, MouseCommand::Move, buttons, reg, out);
            }
        }
    }

    fn send_local_mouse(
        &self,
        wid: Wid,
        command: MouseCommand,
        buttons: MouseButtons,
        reg: &WindowRegistry,
        out: &mut Outbox,
    ) {
        let (px, py) = self.position();
        if let Some(win) = reg.get(wid) {
            let (lx, ly) = screen_to_window(
                (win.x, win.y),
                (win.width, win.height),
                win.rotation,
                px,
                py,
            );
            out.send(
                win.owner,
                Message::WindowMouseEvent {
                    wid,
                    x: lx,
                    y: ly,
                    old_x: -1,
                    old_y: -1,
                    buttons,
                    command,
                    modifiers: self.modifiers,
                },
            );
        }
    }

    fn adjust_opacity(&self, delta: i32, reg: &mut WindowRegistry, out: &mut Outbox) {
        let (px, py) = self.position();
        if let Some(wid) = reg.hit_test(px, py) {
            if reg.bottom() == Some(wid) {
                return;
            }
            if let Some(damage) = reg.adjust_opacity(wid, delta) {
                out.damage(damage);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Grab initiations
    // ---------------------------------------------------------------------

    /// Begin an alt-drag move (or a client-requested drag when `target`
    /// names a window). Refused while resizing or rotating, for singleton
    /// bands, and for DISALLOW_DRAG windows.
    pub fn start_move(
        &mut self,
        target: Option<Wid>,
        reg: &mut WindowRegistry,
        out: &mut Outbox,
    ) {
        if matches!(self.state, PointerState::Resizing | PointerState::Rotating) {
            return;
        }
        let (px, py) = self.position();
        let change = reg.set_focus(reg.hit_test(px, py));
        out.apply_focus_change(change, reg);
        let wid = target.or_else(|| reg.effective_focus());
        let Some(wid) = wid else { return };
        let Some(win) = reg.get(wid) else { return };

        if win.is_singleton_band()
            || win
                .flags
                .contains(core_protocol::WindowFlags::DISALLOW_DRAG)
        {
            self.state = PointerState::Normal;
            self.grab = None;
            return;
        }

        self.state = PointerState::Moving;
        self.grab = Some(wid);
        self.init_x = self.x;
        self.init_y = self.y;
        self.win_x = win.x;
        self.win_y = win.y;
        self.drag_button = self.last_buttons;
        reg.make_top(wid);
        out.damage(self.cursor_rect());
        debug!(target: "input.pointer", wid, "drag-move started");
    }

    fn start_rotate(&mut self, reg: &mut WindowRegistry, out: &mut Outbox) {
        let (px, py) = self.position();
        let change = reg.set_focus(reg.hit_test(px, py));
        out.apply_focus_change(change, reg);
        let Some(wid) = reg.effective_focus() else {
            return;
        };
        let Some(win) = reg.get(wid) else { return };
        if win.is_singleton_band() {
            self.state = PointerState::Normal;
            self.grab = None;
            return;
        }
        self.state = PointerState::Rotating;
        self.grab = Some(wid);
        self.init_x = self.x;
        self.init_y = self.y;
        self.rotate_offset = win.rotation - self.angle_about(win);
        reg.make_top(wid);
        debug!(target: "input.pointer", wid, "rotate started");
    }

    /// Angle (degrees) of the pointer about a window's center, matching
    /// the rotation convention: 0° pointing up, increasing clockwise.
    fn angle_about(&self, win: &core_windows::ServerWindow) -> i32 {
        let (px, py) = self.position();
        let dx = (px - (win.x + win.width as i32 / 2)) as f64;
        let dy = (py - (win.y + win.height as i32 / 2)) as f64;
        (dx.atan2(dy) * 180.0 / -std::f64::consts::PI) as i32
    }

    /// Begin an interactive resize. `target` pins the window (client
    /// request path); otherwise the window under the cursor is used.
    pub fn start_resize(
        &mut self,
        direction: ResizeDirection,
        target: Option<Wid>,
        button: MouseButtons,
        reg: &mut WindowRegistry,
        out: &mut Outbox,
    ) {
        let (px, py) = self.position();
        let change = reg.set_focus(reg.hit_test(px, py));
        out.apply_focus_change(change, reg);
        let wid = target.or_else(|| reg.effective_focus());
        let Some(wid) = wid else { return };
        let Some(win) = reg.get(wid) else { return };
        if win.is_singleton_band()
            || win
                .flags
                .contains(core_protocol::WindowFlags::DISALLOW_RESIZE)
        {
            self.state = PointerState::Normal;
            self.grab = None;
            self.resize = None;
            return;
        }

        let direction = if direction == ResizeDirection::Auto {
            let (lx, ly) = screen_to_window(
                (win.x, win.y),
                (win.width, win.height),
                win.rotation,
                px,
                py,
            );
            resolve_auto_direction(lx, ly, win.width, win.height)
        } else {
            direction
        };

        self.state = PointerState::Resizing;
        self.grab = Some(wid);
        self.init_x = self.x;
        self.init_y = self.y;
        self.win_x = win.x;
        self.win_y = win.y;
        self.resize = Some(ResizeGrab {
            preview: ResizePreview {
                wid,
                direction,
                init_w: win.width,
                init_h: win.height,
                w: win.width,
                h: win.height,
                offset_x: 0,
                offset_y: 0,
            },
            button,
            offer_sent: false,
        });
        self.resize_release_ms = None;
        reg.make_top(wid);
        out.damage(reg.get(wid).map(|w| w.damage_bounds()).unwrap_or(Rect::empty()));
        debug!(target: "input.pointer", wid, ?direction, "interactive resize started");
    }

    /// Abandon a MOVING drag without committing any motion (Escape).
    pub fn cancel_drag(&mut self, out: &mut Outbox) {
        if self.state != PointerState::Moving {
            return;
        }
        self.state = PointerState::Normal;
        self.grab = None;
        out.damage(self.cursor_rect());
        debug!(target: "input.pointer", "drag cancelled");
    }

    fn cursor_rect(&self) -> Rect {
        let (px, py) = self.position();
        Rect::new(px - CURSOR_HOT, py - CURSOR_HOT, CURSOR_FOOTPRINT, CURSOR_FOOTPRINT)
    }

    // ---------------------------------------------------------------------
    // MOVING
    // ---------------------------------------------------------------------

    fn moving_state(
        &mut self,
        buttons: MouseButtons,
        reg: &mut WindowRegistry,
        screen: (u32, u32),
        out: &mut Outbox,
    ) {
        let button_down = !(buttons & self.drag_button).is_empty();
        let drag_stop = if self.drag_button.is_empty() {
            buttons.contains(MouseButtons::LEFT)
        } else {
            !button_down
        };
        if drag_stop {
            self.state = PointerState::Normal;
            self.grab = None;
            out.damage(self.cursor_rect());
            return;
        }

        let Some(wid) = self.grab else { return };
        let (px, py) = self.position();
        let snap = self.config.edge_snap_px;

        let tiled = reg.get(wid).map(|w| w.tiled.is_some()).unwrap_or(false);

        // Edge snapping: top takes the whole screen, left/right halves.
        if py < snap {
            if !tiled {
                tile_window(reg, wid, 1, 1, 0, 0, screen, out);
            }
            return;
        }
        if px < snap {
            if !tiled {
                tile_window(reg, wid, 2, 1, 0, 0, screen, out);
            }
            return;
        } else if px >= screen.0 as i32 - snap {
            if !tiled {
                tile_window(reg, wid, 2, 1, 1, 0, screen, out);
            }
            return;
        }

        if tiled {
            let past = (self.x - self.init_x).abs() > self.config.untile_sensitivity
                || (self.y - self.init_y).abs() > self.config.untile_sensitivity;
            if past {
                // Pop out of the tile, keeping the grab point at the same
                // proportional position inside the restored geometry.
                let Some(win) = reg.get(wid) else { return };
                let percent_x = (px - win.x) as f32 / win.width as f32;
                let percent_y = (py - win.y) as f32 / win.height as f32;
                let restore = untile_window(reg, wid, out);
                if let Some(r) = restore {
                    let nx = px - (r.width as f32 * percent_x) as i32;
                    let ny = py - (r.height as f32 * percent_y) as i32;
                    move_window(reg, wid, nx, ny, out);
                    self.init_x = self.x;
                    self.init_y = self.y;
                    if let Some(win) = reg.get(wid) {
                        self.win_x = win.x;
                        self.win_y = win.y;
                    }
                }
            }
        } else {
            let nx = self.win_x + (self.x - self.init_x) / POINTER_SCALE;
            let ny = self.win_y + (self.y - self.init_y) / POINTER_SCALE;
            move_window(reg, wid, nx, ny, out);
        }
    }

    // ---------------------------------------------------------------------
    // DRAGGING
    // ---------------------------------------------------------------------

    fn dragging_state(
        &mut self,
        buttons: MouseButtons,
        reg: &mut WindowRegistry,
        out: &mut Outbox,
    ) {
        let (px, py) = self.position();
        if (buttons & self.drag_button).is_empty() {
            // Release: a motionless press is a click, otherwise a raise.
            self.state = PointerState::Normal;
            let old_x = self.click_orig_x;
            let old_y = self.click_orig_y;
            if let Some(wid) = self.grab {
                if let Some(win) = reg.get(wid) {
                    let (lx, ly) = screen_to_window(
                        (win.x, win.y),
                        (win.width, win.height),
                        win.rotation,
                        px,
                        py,
                    );
                    let (command, ox, oy) = if self.moved {
                        (MouseCommand::Raise, old_x, old_y)
                    } else {
                        (MouseCommand::Click, -1, -1)
                    };
                    out.send(
                        win.owner,
                        Message::WindowMouseEvent {
                            wid,
                            x: lx,
                            y: ly,
                            old_x: ox,
                            old_y: oy,
                            buttons,
                            command,
                            modifiers: self.modifiers,
                        },
                    );
                }
            }
            return;
        }

        self.moved = true;
        let old_x = self.click_x;
        let old_y = self.click_y;
        if let Some(wid) = self.grab {
            if let Some(win) = reg.get(wid) {
                let (lx, ly) = screen_to_window(
                    (win.x, win.y),
                    (win.width, win.height),
                    win.rotation,
                    px,
                    py,
                );
                if lx != old_x || ly != old_y {
                    self.click_x = lx;
                    self.click_y = ly;
                    out.send(
                        win.owner,
                        Message::WindowMouseEvent {
                            wid,
                            x: lx,
                            y: ly,
                            old_x,
                            old_y,
                            buttons,
                            command: MouseCommand::Drag,
                            modifiers: self.modifiers,
                        },
                    );
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // ROTATING
    // ---------------------------------------------------------------------

    fn rotating_state(
        &mut self,
        buttons: MouseButtons,
        reg: &mut WindowRegistry,
        out: &mut Outbox,
    ) {
        if !buttons.contains(MouseButtons::RIGHT) {
            self.state = PointerState::Normal;
            self.grab = None;
            out.damage(self.cursor_rect());
            return;
        }
        if let Some(wid) = self.grab {
            if let Some(win) = reg.get(wid) {
                let angle = self.angle_about(win);
                let before = win.damage_bounds();
                if let Some(win) = reg.get_mut(wid) {
                    win.rotation = angle + self.rotate_offset;
                }
                out.damage(before);
                if let Some(win) = reg.get(wid) {
                    out.damage(win.damage_bounds());
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // RESIZING
    // ---------------------------------------------------------------------

    fn resizing_state(
        &mut self,
        buttons: MouseButtons,
        reg: &mut WindowRegistry,
        now_ms: u64,
        out: &mut Outbox,
    ) {
        let Some(grab) = self.resize.as_mut() else {
            self.state = PointerState::Normal;
            return;
        };
        let preview = &mut grab.preview;
        let Some(win) = reg.get(preview.wid) else {
            self.resize = None;
            self.state = PointerState::Normal;
            return;
        };

        out.damage(win.damage_bounds());

        // Motion is evaluated in the window's unrotated initial frame so
        // diagonal handles track the pointer under rotation.
        let frame_origin = (win.x, win.y);
        let frame_size = (preview.init_w, preview.init_h);
        let (rix, riy) = screen_to_window(
            frame_origin,
            frame_size,
            win.rotation,
            self.init_x / POINTER_SCALE,
            self.init_y / POINTER_SCALE,
        );
        let (rx, ry) = screen_to_window(
            frame_origin,
            frame_size,
            win.rotation,
            self.x / POINTER_SCALE,
            self.y / POINTER_SCALE,
        );

        let mut width_diff = rx - rix;
        let mut height_diff = ry - riy;
        let dir = preview.direction;

        if dir.vertical_only() {
            width_diff = 0;
            preview.offset_x = 0;
        }
        if dir.horizontal_only() {
            height_diff = 0;
            preview.offset_y = 0;
        }
        if dir.grows_left() {
            preview.offset_x = width_diff;
            width_diff = -width_diff;
        } else if !dir.vertical_only() {
            preview.offset_x = 0;
        }
        if dir.grows_up() {
            preview.offset_y = height_diff;
            height_diff = -height_diff;
        } else if !dir.horizontal_only() {
            preview.offset_y = 0;
        }

        preview.w = (preview.init_w as i32 + width_diff).max(1) as u32;
        preview.h = (preview.init_h as i32 + height_diff).max(1) as u32;
        preview.offset_x = preview.offset_x.min(preview.init_w as i32);
        preview.offset_y = preview.offset_y.min(preview.init_h as i32);

        out.damage(preview_bounds(win, preview));

        let released = (buttons & grab.button).is_empty();
        if !grab.offer_sent || released {
            grab.offer_sent = true;
            let tile = if win.tiled.is_some() {
                TileEdges::tiled()
            } else {
                TileEdges::empty()
            };
            out.send(
                win.owner,
                Message::ResizeOffer {
                    wid: preview.wid,
                    width: preview.w,
                    height: preview.h,
                    tile,
                },
            );
        }
        if released {
            self.resize_release_ms = Some(now_ms);
            self.state = PointerState::Normal;
            trace!(target: "input.pointer", wid = preview.wid, "resize released, grace running");
        }
    }

    /// Step 2 of the frame loop: discard a resize preview whose grace
    /// period expired without a completed handshake. Returns the damage
    /// to queue when the preview was dropped.
    pub fn expire_resize(
        &mut self,
        now_ms: u64,
        grace_ms: u64,
        reg: &WindowRegistry,
    ) -> Option<Rect> {
        if self.state != PointerState::Normal {
            return None;
        }
        let released = self.resize_release_ms?;
        if now_ms.saturating_sub(released) < grace_ms {
            return None;
        }
        let grab = self.resize.take()?;
        self.resize_release_ms = None;
        self.grab = None;
        let damage = reg
            .get(grab.preview.wid)
            .map(|w| preview_bounds(w, &grab.preview).union(&w.damage_bounds()));
        debug!(target: "input.pointer", wid = grab.preview.wid, "resize grace expired, preview dropped");
        damage
    }

    /// The resize handshake completed: commit the preview's placement
    /// offset as a window move and drop the preview.
    pub fn on_resize_done(&mut self, wid: Wid, reg: &mut WindowRegistry, out: &mut Outbox) {
        if self.resize.as_ref().map(|g| g.preview.wid) != Some(wid) {
            return;
        }
        if self.state == PointerState::Resizing {
            // Still dragging: the client repainted mid-gesture. Keep the
            // grab; only the geometry baseline changes.
            let size = reg.get(wid).map(|w| (w.width, w.height));
            if let (Some((w, h)), Some(grab)) = (size, self.resize.as_mut()) {
                grab.preview.init_w = w;
                grab.preview.init_h = h;
            }
            return;
        }

        let Some(grab) = self.resize.take() else { return };
        self.resize_release_ms = None;
        self.grab = None;
        let preview = grab.preview;
        if let Some(win) = reg.get(wid) {
            let (nx, ny) = if win.rotation != 0 {
                // The stored origin is for the unrotated frame; move the
                // center to where the preview's center landed.
                let (cx, cy) = window_to_screen(
                    (win.x, win.y),
                    (preview.init_w, preview.init_h),
                    win.rotation,
                    preview.offset_x + preview.w as i32 / 2,
                    preview.offset_y + preview.h as i32 / 2,
                );
                (cx - preview.w as i32 / 2, cy - preview.h as i32 / 2)
            } else {
                (win.x + preview.offset_x, win.y + preview.offset_y)
            };
            move_window(reg, wid, nx, ny, out);
        }
    }

    // ---------------------------------------------------------------------
    // Cursor
    // ---------------------------------------------------------------------

    /// Sprite priority: active resize direction, then drag-move, then the
    /// hovered window's hint, then the plain arrow.
    pub fn current_cursor(&self, reg: &WindowRegistry) -> CursorChoice {
        if let Some(grab) = &self.resize {
            let kind = match grab.preview.direction {
                ResizeDirection::Up | ResizeDirection::Down => CursorKind::ResizeV,
                ResizeDirection::Left | ResizeDirection::Right => CursorKind::ResizeH,
                ResizeDirection::DownRight | ResizeDirection::UpLeft => CursorKind::ResizeUlDr,
                ResizeDirection::DownLeft | ResizeDirection::UpRight => CursorKind::ResizeDlUr,
                ResizeDirection::Auto => CursorKind::Arrow,
            };
            return CursorChoice { kind, rotation: 0 };
        }
        if self.state == PointerState::Moving {
            return CursorChoice {
                kind: CursorKind::Drag,
                rotation: 0,
            };
        }
        let (px, py) = self.position();
        if let Some(win) = reg.hit_test(px, py).and_then(|wid| reg.get(wid)) {
            let kind = match win.cursor_hint {
                CursorHint::Default => CursorKind::Arrow,
                CursorHint::Hidden => CursorKind::Hidden,
                CursorHint::Point => CursorKind::Point,
                CursorHint::Ibeam => CursorKind::Ibeam,
                CursorHint::Drag => CursorKind::Drag,
                CursorHint::ResizeV => CursorKind::ResizeV,
                CursorHint::ResizeH => CursorKind::ResizeH,
                CursorHint::ResizeUlDr => CursorKind::ResizeUlDr,
                CursorHint::ResizeDlUr => CursorKind::ResizeDlUr,
            };
            return CursorChoice {
                kind,
                rotation: win.rotation,
            };
        }
        CursorChoice {
            kind: CursorKind::Arrow,
            rotation: 0,
        }
    }

    /// Client-requested pointer warp to a window-local coordinate. Only
    /// honored for the focused window; re-runs the current state with an
    /// absolute packet so deliveries happen as for real motion.
    pub fn warp(
        &mut self,
        wid: Wid,
        local_x: i32,
        local_y: i32,
        reg: &mut WindowRegistry,
        screen: (u32, u32),
        now_ms: u64,
        out: &mut Outbox,
    ) {
        if reg.effective_focus() != Some(wid) {
            return;
        }
        let Some(win) = reg.get(wid) else { return };
        let (sx, sy) = window_to_screen(
            (win.x, win.y),
            (win.width, win.height),
            win.rotation,
            local_x,
            local_y,
        );
        let pkt = PointerPacket {
            x: sx,
            y: sy,
            buttons: self.last_buttons,
            kind: PointerKind::Absolute,
        };
        self.handle_packet(pkt, reg, screen, now_ms, out);
    }
}

/// Screen bounds of a resize preview (the scaled old buffer), padded a
/// pixel for the integer math.
fn preview_bounds(win: &core_windows::ServerWindow, preview: &ResizePreview) -> Rect {
    Rect::new(
        win.x + preview.offset_x - 1,
        win.y + preview.offset_y - 1,
        preview.w + 2,
        preview.h + 2,
    )
}

/// Nine-cell AUTO resolution: thirds of the window pick the direction,
/// with a central click falling back to DOWN_RIGHT.
fn resolve_auto_direction(x: i32, y: i32, width: u32, height: u32) -> ResizeDirection {
    let w = width as i32;
    let h = height as i32;
    let h_d = if x <= w / 3 {
        -1
    } else if x >= w * 2 / 3 {
        1
    } else {
        0
    };
    let v_d = if y <= h / 3 {
        -1
    } else if y >= h * 2 / 3 {
        1
    } else {
        0
    };
    match (h_d, v_d) {
        (1, -1) => ResizeDirection::UpRight,
        (-1, 1) => ResizeDirection::DownLeft,
        (-1, -1) => ResizeDirection::UpLeft,
        (1, 0) => ResizeDirection::Right,
        (-1, 0) => ResizeDirection::Left,
        (0, 1) => ResizeDirection::Down,
        (0, -1) => ResizeDirection::Up,
        // Central and down-right cells both grow toward the bottom-right.
        _ => ResizeDirection::DownRight,
    }
}

/// Height of the strip the TOP window (panel) occupies, for tiling.
pub fn panel_height(reg: &WindowRegistry) -> u32 {
    let Some(panel) = reg.top().and_then(|wid| reg.get(wid)) else {
        return 0;
    };
    // A panel scrolled partly off the top edge reserves less.
    (panel.height as i32 + panel.y.min(0)).max(0) as u32
}

/// Move a window and echo the placement to its owner.
pub fn move_window(reg: &mut WindowRegistry, wid: Wid, x: i32, y: i32, out: &mut Outbox) {
    if let Some((before, after)) = reg.move_window(wid, x, y) {
        out.damage(before);
        out.damage(after);
        if let Some(win) = reg.get(wid) {
            out.send(win.owner, Message::WindowMove { wid, x, y });
        }
    }
}

/// Fit a window to a tiling cell: save restore geometry on first tile,
/// move into place, and offer the cell size to the client.
pub fn tile_window(
    reg: &mut WindowRegistry,
    wid: Wid,
    w_div: u32,
    h_div: u32,
    cell_x: u32,
    cell_y: u32,
    screen: (u32, u32),
    out: &mut Outbox,
) {
    let panel_h = panel_height(reg);
    let placement = compute_tile(screen.0, screen.1, panel_h, w_div, h_div, cell_x, cell_y);

    let Some(win) = reg.get_mut(wid) else { return };
    if win.tiled.is_none() {
        win.tiled = Some(TileRestore {
            x: win.x,
            y: win.y,
            width: win.width,
            height: win.height,
        });
    }
    move_window(reg, wid, placement.x, placement.y, out);
    if let Some(win) = reg.get(wid) {
        out.send(
            win.owner,
            Message::ResizeOffer {
                wid,
                width: placement.width,
                height: placement.height,
                tile: placement.edges,
            },
        );
    }
}

/// Restore a tiled window's saved geometry via a resize offer. Returns
/// the restore record so callers can reposition.
pub fn untile_window(
    reg: &mut WindowRegistry,
    wid: Wid,
    out: &mut Outbox,
) -> Option<TileRestore> {
    let win = reg.get_mut(wid)?;
    let restore = win.tiled.take()?;
    out.send(
        win.owner,
        Message::ResizeOffer {
            wid,
            width: restore.width,
            height: restore.height,
            tile: TileEdges::empty(),
        },
    );
    Some(restore)
}

// Cursor footprint, kept in sync with the sprite dimensions so damage
// from cursor-shape changes covers the drawn area.
const CURSOR_HOT: i32 = 4;
const CURSOR_FOOTPRINT: u32 = 24;

#[cfg(test)]
mod tests {
    use super::*;
    use core_protocol::WindowFlags;
    use core_shm::MemoryShm;
    use core_windows::WindowRegistry;
    use pretty_assertions::assert_eq;

    const SCREEN: (u32, u32) = (1024, 768);

    fn setup() -> (WindowRegistry, MemoryShm, PointerDispatcher, Outbox) {
        (
            WindowRegistry::new("test"),
            MemoryShm::new(),
            PointerDispatcher::new(PointerConfig::default()),
            Outbox::new(),
        )
    }

    fn opaque_window(
        reg: &mut WindowRegistry,
        shm: &mut MemoryShm,
        owner: u64,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
    ) -> Wid {
        let wid = reg.create(w, h, owner, WindowFlags::empty(), shm).unwrap();
        reg.reveal(wid, 0);
        reg.get_mut(wid)
            .unwrap()
            .buffer
            .as_mut()
            .unwrap()
            .as_mut_slice()
            .fill(0xFF);
        let (before, after) = reg.move_window(wid, x, y).unwrap();
        let _ = (before, after);
        wid
    }

    fn abs_packet(x: i32, y: i32, buttons: MouseButtons) -> PointerPacket {
        PointerPacket {
            x,
            y,
            buttons,
            kind: PointerKind::Absolute,
        }
    }

    fn sent_commands(out: &Outbox) -> Vec<MouseCommand> {
        out.messages
            .iter()
            .filter_map(|(_, m)| match m {
                Message::WindowMouseEvent { command, .. } => Some(*command),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn click_drag_release_sequence() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 0, 0, 300, 200);

        // Press at (50, 50): focus + DOWN with local coordinates.
        ptr.handle_packet(
            abs_packet(50, 50, MouseButtons::LEFT),
            &mut reg,
            SCREEN,
            0,
            &mut out,
        );
        assert_eq!(ptr.state(), PointerState::Dragging);
        let down = out
            .messages
            .iter()
            .find_map(|(_, m)| match m {
                Message::WindowMouseEvent {
                    wid: w,
                    x,
                    y,
                    command: MouseCommand::Down,
                    ..
                } => Some((*w, *x, *y)),
                _ => None,
            })
            .expect("expected a DOWN event");
        assert_eq!(down, (wid, 50, 50));

        // Motion to (70, 60): DRAG carrying old and new local coords.
        let mut out = Outbox::new();
        ptr.handle_packet(
            abs_packet(70, 60, MouseButtons::LEFT),
            &mut reg,
            SCREEN,
            5,
            &mut out,
        );
        let drag = out
            .messages
            .iter()
            .find_map(|(_, m)| match m {
                Message::WindowMouseEvent {
                    x,
                    y,
                    old_x,
                    old_y,
                    command: MouseCommand::Drag,
                    ..
                } => Some((*x, *y, *old_x, *old_y)),
                _ => None,
            })
            .expect("expected a DRAG event");
        assert_eq!(drag, (70, 60, 50, 50));

        // Release: RAISE (motion occurred), never CLICK.
        let mut out = Outbox::new();
        ptr.handle_packet(
            abs_packet(70, 60, MouseButtons::empty()),
            &mut reg,
            SCREEN,
            10,
            &mut out,
        );
        assert_eq!(ptr.state(), PointerState::Normal);
        let cmds = sent_commands(&out);
        assert!(cmds.contains(&MouseCommand::Raise));
        assert!(!cmds.contains(&MouseCommand::Click));
    }

    #[test]
    fn motionless_click_is_click() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        opaque_window(&mut reg, &mut shm, 1, 0, 0, 300, 200);
        ptr.handle_packet(abs_packet(10, 10, MouseButtons::LEFT), &mut reg, SCREEN, 0, &mut out);
        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(10, 10, MouseButtons::empty()), &mut reg, SCREEN, 1, &mut out);
        let cmds = sent_commands(&out);
        assert!(cmds.contains(&MouseCommand::Click));
        assert!(!cmds.contains(&MouseCommand::Raise));
    }

    #[test]
    fn alt_drag_moves_window() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 100, 100, 300, 200);

        ptr.set_modifiers(ModMask::ALT);
        ptr.handle_packet(abs_packet(150, 150, MouseButtons::LEFT), &mut reg, SCREEN, 0, &mut out);
        assert_eq!(ptr.state(), PointerState::Moving);

        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(250, 180, MouseButtons::LEFT), &mut reg, SCREEN, 5, &mut out);
        let win = reg.get(wid).unwrap();
        assert_eq!((win.x, win.y), (200, 130));

        // Release returns to normal.
        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(250, 180, MouseButtons::empty()), &mut reg, SCREEN, 6, &mut out);
        assert_eq!(ptr.state(), PointerState::Normal);
    }

    #[test]
    fn drag_refused_for_disallow_drag() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = reg
            .create(300, 200, 1, WindowFlags::DISALLOW_DRAG, &mut shm)
            .unwrap();
        reg.reveal(wid, 0);
        reg.get_mut(wid)
            .unwrap()
            .buffer
            .as_mut()
            .unwrap()
            .as_mut_slice()
            .fill(0xFF);

        ptr.set_modifiers(ModMask::ALT);
        ptr.handle_packet(abs_packet(50, 50, MouseButtons::LEFT), &mut reg, SCREEN, 0, &mut out);
        assert_eq!(ptr.state(), PointerState::Normal);
    }

    #[test]
    fn edge_drag_tiles_left_half() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 100, 100, 300, 200);

        ptr.set_modifiers(ModMask::ALT);
        ptr.handle_packet(abs_packet(150, 150, MouseButtons::LEFT), &mut reg, SCREEN, 0, &mut out);

        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(5, 150, MouseButtons::LEFT), &mut reg, SCREEN, 5, &mut out);

        let offer = out
            .messages
            .iter()
            .find_map(|(_, m)| match m {
                Message::ResizeOffer {
                    width,
                    height,
                    tile,
                    ..
                } => Some((*width, *height, *tile)),
                _ => None,
            })
            .expect("expected a tiling resize offer");
        assert_eq!(offer.0, 512);
        assert_eq!(offer.1, 768);
        assert!(offer.2.contains(TileEdges::LEFT));
        assert!(!offer.2.contains(TileEdges::RIGHT));
        assert!(reg.get(wid).unwrap().tiled.is_some());
    }

    #[test]
    fn wheel_with_alt_adjusts_opacity() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 0, 0, 300, 200);
        ptr.set_modifiers(ModMask::ALT);
        ptr.handle_packet(
            abs_packet(50, 50, MouseButtons::SCROLL_DOWN),
            &mut reg,
            SCREEN,
            0,
            &mut out,
        );
        assert_eq!(reg.get(wid).unwrap().opacity, 247);
        // Scrolling up claws it back, clamped at 255.
        for t in 0..40 {
            ptr.handle_packet(
                abs_packet(50, 50, MouseButtons::SCROLL_UP),
                &mut reg,
                SCREEN,
                t,
                &mut out,
            );
        }
        assert_eq!(reg.get(wid).unwrap().opacity, 255);
    }

    #[test]
    fn auto_direction_cells() {
        assert_eq!(resolve_auto_direction(5, 5, 300, 300), ResizeDirection::UpLeft);
        assert_eq!(
            resolve_auto_direction(150, 5, 300, 300),
            ResizeDirection::Up
        );
        assert_eq!(
            resolve_auto_direction(295, 295, 300, 300),
            ResizeDirection::DownRight
        );
        // Central cell falls back to down-right.
        assert_eq!(
            resolve_auto_direction(150, 150, 300, 300),
            ResizeDirection::DownRight
        );
    }

    #[test]
    fn interactive_resize_offer_on_release() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 100, 100, 300, 200);

        ptr.set_modifiers(ModMask::ALT);
        // Grab near the bottom-right corner: AUTO resolves down-right.
        ptr.handle_packet(
            abs_packet(390, 290, MouseButtons::MIDDLE),
            &mut reg,
            SCREEN,
            0,
            &mut out,
        );
        assert_eq!(ptr.state(), PointerState::Resizing);

        let mut out = Outbox::new();
        ptr.handle_packet(
            abs_packet(440, 340, MouseButtons::MIDDLE),
            &mut reg,
            SCREEN,
            5,
            &mut out,
        );
        let preview = ptr.resize_preview().unwrap();
        assert_eq!(preview.w, 350);
        assert_eq!(preview.h, 250);

        // Release: offer carries the final preview size.
        let mut out = Outbox::new();
        ptr.handle_packet(
            abs_packet(440, 340, MouseButtons::empty()),
            &mut reg,
            SCREEN,
            10,
            &mut out,
        );
        assert_eq!(ptr.state(), PointerState::Normal);
        let offered = out
            .messages
            .iter()
            .find_map(|(_, m)| match m {
                Message::ResizeOffer { width, height, .. } => Some((*width, *height)),
                _ => None,
            })
            .unwrap();
        assert_eq!(offered, (350, 250));
        // Preview persists through the grace period.
        assert!(ptr.resize_preview().is_some());
        assert!(ptr.expire_resize(200, 500, &reg).is_none());
        assert!(ptr.expire_resize(511, 500, &reg).is_some());
        assert!(ptr.resize_preview().is_none());
        let _ = wid;
    }

    #[test]
    fn left_direction_tracks_offset() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 100, 100, 300, 200);
        ptr.handle_packet(abs_packet(105, 200, MouseButtons::empty()), &mut reg, SCREEN, 0, &mut out);
        ptr.start_resize(
            ResizeDirection::Auto,
            Some(wid),
            MouseButtons::LEFT,
            &mut reg,
            &mut out,
        );
        // Click in the left third, vertical middle: LEFT.
        assert_eq!(
            ptr.resize_preview().unwrap().direction,
            ResizeDirection::Left
        );
        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(85, 200, MouseButtons::LEFT), &mut reg, SCREEN, 1, &mut out);
        let p = ptr.resize_preview().unwrap();
        assert_eq!(p.w, 320);
        assert_eq!(p.offset_x, -20);
        assert_eq!(p.h, 200);
    }

    #[test]
    fn rotate_follows_pointer() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 100, 100, 200, 200);
        ptr.set_modifiers(ModMask::ALT);
        // Start with the pointer below the center: angle baseline.
        ptr.handle_packet(abs_packet(200, 260, MouseButtons::RIGHT), &mut reg, SCREEN, 0, &mut out);
        assert_eq!(ptr.state(), PointerState::Rotating);
        // Move to the right of center: roughly a quarter turn.
        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(260, 200, MouseButtons::RIGHT), &mut reg, SCREEN, 1, &mut out);
        let rot = reg.get(wid).unwrap().rotation;
        assert!((rot - (-90)).abs() <= 2 || (rot - 270).abs() <= 2, "rotation {rot}");
        // Release restores normal state.
        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(260, 200, MouseButtons::empty()), &mut reg, SCREEN, 2, &mut out);
        assert_eq!(ptr.state(), PointerState::Normal);
    }

    #[test]
    fn hover_enter_leave() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let left = opaque_window(&mut reg, &mut shm, 1, 0, 0, 100, 100);
        let right = opaque_window(&mut reg, &mut shm, 2, 200, 0, 100, 100);

        ptr.handle_packet(abs_packet(50, 50, MouseButtons::empty()), &mut reg, SCREEN, 0, &mut out);
        let mut out2 = Outbox::new();
        ptr.handle_packet(abs_packet(250, 50, MouseButtons::empty()), &mut reg, SCREEN, 1, &mut out2);

        let events: Vec<(Wid, MouseCommand)> = out2
            .messages
            .iter()
            .filter_map(|(_, m)| match m {
                Message::WindowMouseEvent { wid, command, .. } => Some((*wid, *command)),
                _ => None,
            })
            .collect();
        assert!(events.contains(&(right, MouseCommand::Enter)));
        assert!(events.contains(&(left, MouseCommand::Leave)));
    }

    #[test]
    fn pointer_clamps_to_display() {
        let (mut reg, _shm, mut ptr, mut out) = setup();
        ptr.handle_packet(
            PointerPacket {
                x: -500,
                y: -500,
                buttons: MouseButtons::empty(),
                kind: PointerKind::Relative,
            },
            &mut reg,
            SCREEN,
            0,
            &mut out,
        );
        assert_eq!(ptr.position(), (0, 0));
        ptr.handle_packet(
            abs_packet(5000, 5000, MouseButtons::empty()),
            &mut reg,
            SCREEN,
            1,
            &mut out,
        );
        assert_eq!(ptr.position(), (1024, 768));
    }

    #[test]
    fn escape_cancels_move() {
        let (mut reg, mut shm, mut ptr, mut out) = setup();
        let wid = opaque_window(&mut reg, &mut shm, 1, 100, 100, 300, 200);
        ptr.set_modifiers(ModMask::ALT);
        ptr.handle_packet(abs_packet(150, 150, MouseButtons::LEFT), &mut reg, SCREEN, 0, &mut out);
        assert_eq!(ptr.state(), PointerState::Moving);
        ptr.cancel_drag(&mut out);
        assert_eq!(ptr.state(), PointerState::Normal);
        // Further motion with the button held no longer moves the window.
        let before = (reg.get(wid).unwrap().x, reg.get(wid).unwrap().y);
        let mut out = Outbox::new();
        ptr.handle_packet(abs_packet(400, 150, MouseButtons::LEFT), &mut reg, SCREEN, 1, &mut out);
        // The held button re-grabs from the new position, so no motion is
        // committed by the cancelled drag.
        assert_eq!((reg.get(wid).unwrap().x, reg.get(wid).unwrap().y), before);
    }
}
