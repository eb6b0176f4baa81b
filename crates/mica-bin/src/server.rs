//! The server state and message dispatch.
//!
//! One `ServerState` is threaded through every handler; there are no
//! globals. Handlers are synchronous and non-blocking: outbound frames
//! go through per-client unbounded queues, so a slow client can never
//! wedge the loop. A failed send is swallowed; the client is reaped when
//! the transport reports its endpoint closed.
//!
//! Ownership policy: every mutating window operation verifies the
//! sender's endpoint against the window's owner and ignores mismatches
//! silently. Window ids from other clients are accepted only for query,
//! subscribe, and the special requests third parties legitimately issue
//! (panel-driven maximize and please-close).

use std::time::Instant;

use ahash::AHashMap;
use tracing::{debug, info, trace, warn};

use core_display::DisplayBackend;
use core_events::{ClientTx, EndpointId, Event, KeyPacket, PointerPacket};
use core_geometry::{window_to_screen, Rect};
use core_input::{
    move_window, route_key, tile_window, untile_window, Outbox, PointerDispatcher,
};
use core_keymap::KeyBindTable;
use core_protocol::{
    CursorHint, Message, ProtocolError, SpecialRequestKind, Wid,
};
use core_render::FrameRenderer;
use core_session::SessionManager;
use core_shm::RegionAllocator;
use core_windows::{CloseOutcome, ClosedWindow, WindowRegistry};

/// Endpoint id reserved for the nested-mode host connection.
pub const HOST_ENDPOINT: EndpointId = EndpointId::MAX;

/// Minimum interval between rendered frames.
pub const FRAME_MIN_MS: u64 = 15;

/// Runtime tunables the server needs at dispatch time.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub resize_grace_ms: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            resize_grace_ms: 500,
        }
    }
}

pub struct ServerState {
    pub reg: WindowRegistry,
    pub sessions: SessionManager,
    pub binds: KeyBindTable,
    pub pointer: PointerDispatcher,
    pub renderer: FrameRenderer,
    pub backend: Box<dyn DisplayBackend>,
    pub shm: Box<dyn RegionAllocator>,
    clients: AHashMap<EndpointId, ClientTx>,
    options: ServerOptions,
    /// Set by a display-reconfigure signal; consumed at the next frame.
    display_resize_pending: bool,
    last_render_ms: u64,
    any_client_ever: bool,
    /// Exit code once the loop should stop.
    pub exit_code: Option<i32>,
    pub started: Instant,
    /// Frames destined for the nested host (drained by the host writer).
    pub host_outbound: Vec<Vec<u8>>,
}

impl ServerState {
    pub fn new(
        ident: &str,
        backend: Box<dyn DisplayBackend>,
        shm: Box<dyn RegionAllocator>,
        renderer: FrameRenderer,
        pointer: PointerDispatcher,
        options: ServerOptions,
    ) -> Self {
        ServerState {
            reg: WindowRegistry::new(ident),
            sessions: SessionManager::new(),
            binds: KeyBindTable::new(),
            pointer,
            renderer,
            backend,
            shm,
            clients: AHashMap::new(),
            options,
            display_resize_pending: false,
            last_render_ms: 0,
            any_client_ever: false,
            exit_code: None,
            started: Instant::now(),
            host_outbound: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn screen(&self) -> (u32, u32) {
        (self.backend.width(), self.backend.height())
    }

    pub fn request_display_resize(&mut self) {
        self.display_resize_pending = true;
    }

    // ---------------------------------------------------------------------
    // Outbound plumbing
    // ---------------------------------------------------------------------

    /// Queue a frame for one endpoint. Dead or unknown endpoints drop the
    /// frame silently.
    pub fn send(&mut self, endpoint: EndpointId, msg: &Message) {
        let frame = msg.encode();
        if endpoint == HOST_ENDPOINT {
            self.host_outbound.push(frame);
            return;
        }
        if let Some(tx) = self.clients.get(&endpoint) {
            if tx.send(frame).is_err() {
                trace!(target: "session", endpoint, "send to closed endpoint dropped");
            }
        }
    }

    pub fn broadcast(&mut self, msg: &Message) {
        let frame = msg.encode();
        for (endpoint, tx) in &self.clients {
            if tx.send(frame.clone()).is_err() {
                trace!(target: "session", endpoint, "broadcast to closed endpoint dropped");
            }
        }
    }

    fn notify_subscribers(&mut self) {
        let subscribers = self.sessions.subscribers_for_notify();
        for endpoint in subscribers {
            self.send(endpoint, &Message::Notify);
        }
    }

    /// Drain an outbox: deliver its messages, queue its damage, fire one
    /// subscriber notify if requested.
    fn flush(&mut self, out: Outbox) {
        for (owner, msg) in out.messages {
            self.send(owner, &msg);
        }
        for rect in out.damage {
            self.renderer.damage().mark(rect);
        }
        if out.notify_subscribers {
            self.notify_subscribers();
        }
    }

    fn finish_closed(&mut self, closed: &[ClosedWindow]) {
        if closed.is_empty() {
            return;
        }
        let mut out = Outbox::new();
        for c in closed {
            self.sessions.remove_window(c.owner, c.wid);
            self.renderer.damage().mark(c.damage);
            out.apply_focus_change(c.focus, &self.reg);
        }
        out.notify_subscribers = true;
        self.flush(out);
    }

    // ---------------------------------------------------------------------
    // Event entry
    // ---------------------------------------------------------------------

    pub fn handle_event(&mut self, event: Event, now_ms: u64) {
        match event {
            Event::Pointer(pkt) => self.handle_pointer(pkt, now_ms),
            Event::Key(pkt) => self.handle_key(pkt, now_ms),
            Event::ClientConnected { endpoint, tx } => {
                self.clients.insert(endpoint, tx);
                debug!(target: "session", endpoint, "transport connected");
            }
            Event::ClientFrame { endpoint, frame } => match Message::decode(&frame) {
                Ok(msg) => self.dispatch(endpoint, msg, now_ms),
                Err(e) => self.log_protocol_error(endpoint, e),
            },
            Event::ClientClosed { endpoint } => self.handle_disconnect(endpoint, now_ms),
            Event::FrameTick => {
                self.frame_tick(now_ms);
            }
            Event::DisplayReconfigure => self.request_display_resize(),
            Event::Shutdown => {
                self.broadcast(&Message::SessionEnd);
                self.exit_code = Some(0);
            }
        }
    }

    fn log_protocol_error(&self, endpoint: EndpointId, e: ProtocolError) {
        // Malformed and unknown messages are dropped; repeated offenses
        // do not close the connection.
        warn!(target: "protocol.codec", endpoint, error = %e, "dropping client message");
    }

    pub fn handle_pointer(&mut self, pkt: PointerPacket, now_ms: u64) {
        let screen = self.screen();
        let mut out = Outbox::new();
        self.pointer
            .handle_packet(pkt, &mut self.reg, screen, now_ms, &mut out);
        self.flush(out);
    }

    pub fn handle_key(&mut self, pkt: KeyPacket, _now_ms: u64) {
        let screen = self.screen();
        let mut out = Outbox::new();
        let outcome = route_key(
            pkt,
            &self.binds,
            &mut self.reg,
            &mut self.pointer,
            screen,
            &mut out,
        );
        self.flush(out);
        if let Some(kind) = outcome.screenshot {
            self.renderer.request_screenshot(kind);
        }
    }

    fn handle_disconnect(&mut self, endpoint: EndpointId, now_ms: u64) {
        self.clients.remove(&endpoint);
        self.binds.remove_owner(endpoint);
        self.sessions.unsubscribe(endpoint);
        let orphaned = self.sessions.remove(endpoint);
        for wid in orphaned {
            let (outcome, closed) = self.reg.mark_for_close(wid, now_ms, self.shm.as_mut());
            if let Some(win) = self.reg.get(wid) {
                self.renderer.damage().mark(win.damage_bounds());
            }
            if outcome == CloseOutcome::Immediate {
                if let Some(c) = closed {
                    self.finish_closed(std::slice::from_ref(&c));
                }
            }
        }
        self.notify_subscribers();

        if self.any_client_ever && self.sessions.session_count() == 0 {
            info!(target: "runtime", "last client disconnected, shutting down");
            self.broadcast(&Message::SessionEnd);
            self.exit_code = Some(0);
        }
    }

    // ---------------------------------------------------------------------
    // Frame pacing
    // ---------------------------------------------------------------------

    /// Render gate: runs at most once per [`FRAME_MIN_MS`]. Returns true
    /// when a frame was actually composited (nested mode forwards it to
    /// the host).
    pub fn frame_tick(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_render_ms) < FRAME_MIN_MS {
            return false;
        }
        self.last_render_ms = now_ms;

        if self.display_resize_pending {
            self.display_resize_pending = false;
            match self.backend.reinit() {
                Ok(()) => {
                    let (w, h) = self.screen();
                    self.renderer.on_display_resized(w, h);
                    self.broadcast(&Message::Welcome {
                        width: w,
                        height: h,
                    });
                    info!(target: "display", width = w, height = h, "display reconfigured");
                }
                Err(e) => {
                    // Keep compositing at the previous geometry.
                    warn!(target: "display", error = %e, "display reinit failed");
                }
            }
        }

        if let Some(damage) =
            self.pointer
                .expire_resize(now_ms, self.options.resize_grace_ms, &self.reg)
        {
            self.renderer.damage().mark(damage);
        }

        let outcome = self.renderer.render(
            self.backend.as_mut(),
            &mut self.reg,
            &self.pointer,
            self.shm.as_mut(),
            now_ms,
        );
        self.finish_closed(&outcome.closed);
        if let Some(path) = outcome.screenshot {
            // Surface the capture to interested clients (panels show the
            // toast) and the log.
            info!(target: "compositor.render", path = %path.display(), "screenshot saved");
            self.notify_subscribers();
        }
        outcome.rendered
    }

    // ---------------------------------------------------------------------
    // Message dispatch
    // ---------------------------------------------------------------------

    /// True when `endpoint` owns `wid`. Missing windows and foreign
    /// owners are both ignored silently per the error policy.
    fn owns(&self, endpoint: EndpointId, wid: Wid) -> bool {
        self.reg
            .get(wid)
            .map(|w| w.owner == endpoint)
            .unwrap_or(false)
    }

    pub fn dispatch(&mut self, endpoint: EndpointId, msg: Message, now_ms: u64) {
        match msg {
            Message::Hello => {
                self.any_client_ever = true;
                self.sessions.hello(endpoint);
                let (w, h) = self.screen();
                self.send(
                    endpoint,
                    &Message::Welcome {
                        width: w,
                        height: h,
                    },
                );
            }
            Message::WindowNew {
                width,
                height,
                flags,
            } => {
                if !self.sessions.is_known(endpoint) {
                    debug!(target: "session", endpoint, "window-new before hello ignored");
                    return;
                }
                match self
                    .reg
                    .create(width, height, endpoint, flags, self.shm.as_mut())
                {
                    Ok(wid) => {
                        self.sessions.add_window(endpoint, wid);
                        let Some(win) = self.reg.get(wid) else { return };
                        let reply = Message::WindowInit {
                            wid,
                            width: win.width,
                            height: win.height,
                            bufid: win.bufid,
                        };
                        self.send(endpoint, &reply);
                        if !flags.contains(core_protocol::WindowFlags::NO_STEAL_FOCUS) {
                            let change = self.reg.set_focus(Some(wid));
                            let mut out = Outbox::new();
                            out.apply_focus_change(change, &self.reg);
                            self.flush(out);
                        }
                        self.notify_subscribers();
                    }
                    Err(e) => {
                        warn!(target: "window.registry", endpoint, error = %e, "window create failed");
                    }
                }
            }
            Message::Flip { wid } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                self.reg.reveal(wid, now_ms);
                if let Some(win) = self.reg.get(wid) {
                    self.renderer.damage().mark(win.damage_bounds());
                }
            }
            Message::FlipRegion {
                wid,
                x,
                y,
                width,
                height,
            } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                self.reg.reveal(wid, now_ms);
                if let Some(win) = self.reg.get(wid) {
                    let local = Rect::new(x, y, width, height);
                    self.renderer
                        .damage()
                        .mark(win.damage_bounds_relative(local));
                }
            }
            Message::WindowMove { wid, x, y } => {
                let (w, h) = self.screen();
                let (w, h) = (w as i32, h as i32);
                if x > w + 100 || x < -w || y > h + 100 || y < -h {
                    warn!(target: "window.registry", endpoint, wid, x, y, "refusing out-of-range move");
                    return;
                }
                if !self.owns(endpoint, wid) {
                    return;
                }
                let mut out = Outbox::new();
                move_window(&mut self.reg, wid, x, y, &mut out);
                self.flush(out);
            }
            Message::WindowMoveRelative {
                wid_to_move,
                wid_base,
                x,
                y,
            } => {
                if !self.owns(endpoint, wid_to_move) {
                    return;
                }
                let Some(base) = self.reg.get(wid_base) else { return };
                let Some(movee) = self.reg.get(wid_to_move) else {
                    return;
                };
                let (half_w, half_h) = (movee.width as i32 / 2, movee.height as i32 / 2);
                let (nx, ny) = window_to_screen(
                    (base.x, base.y),
                    (base.width, base.height),
                    base.rotation,
                    x + half_w,
                    y + half_h,
                );
                let rotation = base.rotation;
                let mut out = Outbox::new();
                move_window(&mut self.reg, wid_to_move, nx - half_w, ny - half_h, &mut out);
                if let Some(win) = self.reg.get_mut(wid_to_move) {
                    win.rotation = rotation;
                }
                self.flush(out);
            }
            Message::WindowStack { wid, z } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                self.reg.reorder(wid, z);
                if let Some(win) = self.reg.get(wid) {
                    self.renderer.damage().mark(win.damage_bounds());
                }
            }
            Message::WindowClose { wid } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                self.close_window(wid, now_ms);
            }
            Message::ResizeRequest { wid, width, height }
            | Message::ResizeOffer {
                wid,
                width,
                height,
                ..
            } => {
                // A client-initiated resize is echoed back as an offer
                // with the requested dimensions.
                if !self.owns(endpoint, wid) {
                    return;
                }
                let tile = self
                    .reg
                    .get(wid)
                    .and_then(|w| w.tiled.map(|_| core_protocol::TileEdges::tiled()))
                    .unwrap_or(core_protocol::TileEdges::empty());
                self.send(
                    endpoint,
                    &Message::ResizeOffer {
                        wid,
                        width,
                        height,
                        tile,
                    },
                );
            }
            Message::ResizeAccept { wid, width, height } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                match self
                    .reg
                    .resize_begin(wid, width, height, self.shm.as_mut())
                {
                    Ok(0) => {}
                    Ok(bufid) => {
                        self.send(
                            endpoint,
                            &Message::ResizeBufid {
                                wid,
                                width,
                                height,
                                bufid,
                            },
                        );
                    }
                    Err(e) => {
                        // The window keeps its current size.
                        warn!(target: "window.registry", wid, error = %e, "resize allocation failed");
                    }
                }
            }
            Message::ResizeDone { wid, width, height } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                if self
                    .reg
                    .resize_finish(wid, width, height, self.shm.as_mut())
                {
                    let mut out = Outbox::new();
                    self.pointer.on_resize_done(wid, &mut self.reg, &mut out);
                    if let Some(win) = self.reg.get(wid) {
                        out.damage(win.damage_bounds());
                    }
                    out.notify_subscribers = true;
                    self.flush(out);
                }
            }
            Message::KeyEvent {
                keycode,
                modifiers,
                pressed,
                ..
            } => {
                // Injected input (nested host, virtual devices).
                self.handle_key(
                    KeyPacket {
                        keycode,
                        modifiers,
                        pressed,
                    },
                    now_ms,
                );
            }
            Message::MouseEvent {
                x, y, buttons, kind, ..
            } => {
                self.handle_pointer(
                    PointerPacket {
                        x,
                        y,
                        buttons,
                        kind,
                    },
                    now_ms,
                );
            }
            Message::WindowFocus { wid } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                let change = self.reg.set_focus(Some(wid));
                let mut out = Outbox::new();
                out.apply_focus_change(change, &self.reg);
                self.flush(out);
            }
            Message::WindowShow { wid } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                self.reg.reveal(wid, now_ms);
                if let Some(win) = self.reg.get(wid) {
                    self.renderer.damage().mark(win.damage_bounds());
                }
            }
            Message::WindowHide { wid } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                if let Some(damage) = self.reg.hide(wid) {
                    self.renderer.damage().mark(damage);
                }
            }
            Message::Subscribe => self.sessions.subscribe(endpoint),
            Message::Unsubscribe => self.sessions.unsubscribe(endpoint),
            Message::QueryWindows => self.query_windows(endpoint),
            Message::WindowAdvertise {
                wid,
                flags,
                icon,
                strings,
                ..
            } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                if let Some(win) = self.reg.get_mut(wid) {
                    win.client_flags = flags;
                    win.client_icon = icon;
                    win.client_strings = strings;
                }
                self.notify_subscribers();
            }
            Message::WindowUpdateShape { wid, threshold } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                if let Some(win) = self.reg.get_mut(wid) {
                    win.alpha_threshold = threshold;
                }
            }
            Message::WindowShowMouse { wid, mode } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                if let Some(win) = self.reg.get_mut(wid) {
                    if mode == CursorHint::RESET {
                        win.cursor_hint = win.default_cursor;
                    } else if let Ok(hint) = CursorHint::from_wire(mode) {
                        // The plain default/hidden pair also updates the
                        // sticky default; richer hints are transient.
                        if matches!(hint, CursorHint::Default | CursorHint::Hidden) {
                            win.default_cursor = hint;
                        }
                        win.cursor_hint = hint;
                    }
                }
            }
            Message::WindowWarpMouse { wid, x, y } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                let screen = self.screen();
                let mut out = Outbox::new();
                self.pointer
                    .warp(wid, x, y, &mut self.reg, screen, now_ms, &mut out);
                self.flush(out);
            }
            Message::WindowDragStart { wid } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                let mut out = Outbox::new();
                self.pointer.start_move(Some(wid), &mut self.reg, &mut out);
                self.flush(out);
            }
            Message::WindowResizeStart { wid, direction } => {
                if !self.owns(endpoint, wid) {
                    return;
                }
                if self.reg.effective_focus() == Some(wid) && self.pointer.resize_preview().is_none()
                {
                    let mut out = Outbox::new();
                    self.pointer.start_resize(
                        direction,
                        Some(wid),
                        core_protocol::MouseButtons::LEFT,
                        &mut self.reg,
                        &mut out,
                    );
                    self.flush(out);
                }
            }
            Message::KeyBind {
                keycode,
                modifiers,
                response,
            } => {
                self.binds.bind(modifiers, keycode, endpoint, response);
            }
            Message::SpecialRequest { wid, request } => {
                self.special_request(endpoint, wid, request)
            }
            Message::Clipboard { content } => {
                let ident = self.reg.ident().to_string();
                self.sessions
                    .store_clipboard(&content, &ident, self.shm.as_mut());
            }
            Message::SessionEnd => {
                self.broadcast(&Message::SessionEnd);
            }
            // Server-to-client shapes arriving inbound are dropped like
            // any other unexpected message.
            Message::Welcome { .. }
            | Message::WindowInit { .. }
            | Message::ResizeBufid { .. }
            | Message::WindowMouseEvent { .. }
            | Message::WindowFocusChange { .. }
            | Message::Notify => {
                trace!(target: "protocol.codec", endpoint, "ignoring server-bound message shape");
            }
        }
    }

    /// Close a window on request: start its closing animation and detach
    /// it from its session immediately.
    fn close_window(&mut self, wid: Wid, now_ms: u64) {
        let owner = self.reg.get(wid).map(|w| w.owner);
        if let Some(win) = self.reg.get(wid) {
            self.renderer.damage().mark(win.damage_bounds());
        }
        let (outcome, closed) = self.reg.mark_for_close(wid, now_ms, self.shm.as_mut());
        if let Some(owner) = owner {
            self.sessions.remove_window(owner, wid);
        }
        match outcome {
            CloseOutcome::Immediate => {
                if let Some(c) = closed {
                    self.finish_closed(std::slice::from_ref(&c));
                }
            }
            CloseOutcome::Animating => {
                self.notify_subscribers();
            }
            CloseOutcome::Ignored => {}
        }
    }

    /// Advertise BOTTOM, the MID stack, and TOP to one client, then the
    /// all-zero terminator record.
    fn query_windows(&mut self, endpoint: EndpointId) {
        let mut order: Vec<Wid> = Vec::new();
        order.extend(self.reg.bottom());
        for wid in self.reg.back_to_front() {
            let Some(win) = self.reg.get(wid) else { continue };
            if win.band == Some(core_protocol::ZBand::Mid) {
                order.push(wid);
            }
        }
        order.extend(self.reg.top());

        let focused = self.reg.focused();
        let mut replies = Vec::new();
        for wid in order {
            let Some(win) = self.reg.get(wid) else { continue };
            if win.client_strings.is_empty() {
                continue;
            }
            let mut flags = win.client_flags;
            if focused == Some(wid) {
                flags |= 1;
            }
            replies.push(Message::WindowAdvertise {
                wid,
                flags,
                icon: win.client_icon,
                bufid: win.bufid,
                width: win.width,
                height: win.height,
                strings: win.client_strings.clone(),
            });
        }
        for reply in replies {
            self.send(endpoint, &reply);
        }
        self.send(
            endpoint,
            &Message::WindowAdvertise {
                wid: 0,
                flags: 0,
                icon: 0,
                bufid: 0,
                width: 0,
                height: 0,
                strings: Vec::new(),
            },
        );
    }

    fn special_request(
        &mut self,
        endpoint: EndpointId,
        wid: Wid,
        request: SpecialRequestKind,
    ) {
        match request {
            // Maximize and please-close are how panels manage other
            // clients' windows, so no ownership check applies.
            SpecialRequestKind::Maximize => {
                let screen = self.screen();
                let Some(win) = self.reg.get(wid) else { return };
                let mut out = Outbox::new();
                if win.tiled.is_some() {
                    if let Some(restore) = untile_window(&mut self.reg, wid, &mut out) {
                        move_window(&mut self.reg, wid, restore.x, restore.y, &mut out);
                    }
                } else {
                    tile_window(&mut self.reg, wid, 1, 1, 0, 0, screen, &mut out);
                }
                self.flush(out);
            }
            SpecialRequestKind::PleaseClose => {
                if let Some(owner) = self.reg.get(wid).map(|w| w.owner) {
                    self.send(owner, &Message::WindowClose { wid });
                }
            }
            SpecialRequestKind::ClipboardRead => {
                let content = self.sessions.clipboard().to_vec();
                self.send(endpoint, &Message::Clipboard { content });
            }
        }
    }
}
