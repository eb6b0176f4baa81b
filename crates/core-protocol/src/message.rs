//! The message vocabulary and its binary form.

use crate::types::{
    CursorHint, KeyBindResponse, ModMask, MouseButtons, MouseCommand, PointerKind,
    ResizeDirection, SpecialRequestKind, TileEdges, WindowFlags, ZBand,
};
use crate::wire::{ProtocolError, Reader, Writer};
use crate::{BufId, Wid, HEADER_LEN, MAGIC, MAX_FRAME_LEN};

mod ty {
    pub const HELLO: u32 = 0x01;
    pub const WELCOME: u32 = 0x02;
    pub const WINDOW_NEW: u32 = 0x03;
    pub const WINDOW_INIT: u32 = 0x04;
    pub const FLIP: u32 = 0x05;
    pub const FLIP_REGION: u32 = 0x06;
    pub const WINDOW_MOVE: u32 = 0x07;
    pub const WINDOW_MOVE_RELATIVE: u32 = 0x08;
    pub const WINDOW_STACK: u32 = 0x09;
    pub const WINDOW_CLOSE: u32 = 0x0A;
    pub const RESIZE_REQUEST: u32 = 0x0B;
    pub const RESIZE_OFFER: u32 = 0x0C;
    pub const RESIZE_ACCEPT: u32 = 0x0D;
    pub const RESIZE_BUFID: u32 = 0x0E;
    pub const RESIZE_DONE: u32 = 0x0F;
    pub const KEY_EVENT: u32 = 0x10;
    pub const MOUSE_EVENT: u32 = 0x11;
    pub const WINDOW_MOUSE_EVENT: u32 = 0x12;
    pub const WINDOW_FOCUS_CHANGE: u32 = 0x13;
    pub const WINDOW_FOCUS: u32 = 0x14;
    pub const WINDOW_SHOW: u32 = 0x15;
    pub const WINDOW_HIDE: u32 = 0x16;
    pub const SUBSCRIBE: u32 = 0x17;
    pub const UNSUBSCRIBE: u32 = 0x18;
    pub const NOTIFY: u32 = 0x19;
    pub const QUERY_WINDOWS: u32 = 0x1A;
    pub const WINDOW_ADVERTISE: u32 = 0x1B;
    pub const WINDOW_UPDATE_SHAPE: u32 = 0x1C;
    pub const WINDOW_SHOW_MOUSE: u32 = 0x1D;
    pub const WINDOW_WARP_MOUSE: u32 = 0x1E;
    pub const WINDOW_DRAG_START: u32 = 0x1F;
    pub const WINDOW_RESIZE_START: u32 = 0x20;
    pub const KEY_BIND: u32 = 0x21;
    pub const SPECIAL_REQUEST: u32 = 0x22;
    pub const CLIPBOARD: u32 = 0x23;
    pub const SESSION_END: u32 = 0x24;
}

/// One protocol message, either direction.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Hello,
    Welcome {
        width: u32,
        height: u32,
    },
    WindowNew {
        width: u32,
        height: u32,
        flags: WindowFlags,
    },
    WindowInit {
        wid: Wid,
        width: u32,
        height: u32,
        bufid: BufId,
    },
    Flip {
        wid: Wid,
    },
    FlipRegion {
        wid: Wid,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    WindowMove {
        wid: Wid,
        x: i32,
        y: i32,
    },
    WindowMoveRelative {
        wid_to_move: Wid,
        wid_base: Wid,
        x: i32,
        y: i32,
    },
    WindowStack {
        wid: Wid,
        z: ZBand,
    },
    WindowClose {
        wid: Wid,
    },
    ResizeRequest {
        wid: Wid,
        width: u32,
        height: u32,
    },
    ResizeOffer {
        wid: Wid,
        width: u32,
        height: u32,
        tile: TileEdges,
    },
    ResizeAccept {
        wid: Wid,
        width: u32,
        height: u32,
    },
    ResizeBufid {
        wid: Wid,
        width: u32,
        height: u32,
        bufid: BufId,
    },
    ResizeDone {
        wid: Wid,
        width: u32,
        height: u32,
    },
    KeyEvent {
        wid: Wid,
        keycode: u32,
        modifiers: ModMask,
        pressed: bool,
    },
    MouseEvent {
        wid: Wid,
        x: i32,
        y: i32,
        buttons: MouseButtons,
        kind: PointerKind,
    },
    WindowMouseEvent {
        wid: Wid,
        x: i32,
        y: i32,
        old_x: i32,
        old_y: i32,
        buttons: MouseButtons,
        command: MouseCommand,
        modifiers: ModMask,
    },
    WindowFocusChange {
        wid: Wid,
        focused: bool,
    },
    WindowFocus {
        wid: Wid,
    },
    WindowShow {
        wid: Wid,
    },
    WindowHide {
        wid: Wid,
    },
    Subscribe,
    Unsubscribe,
    Notify,
    QueryWindows,
    WindowAdvertise {
        wid: Wid,
        flags: u32,
        icon: u32,
        bufid: BufId,
        width: u32,
        height: u32,
        strings: Vec<u8>,
    },
    WindowUpdateShape {
        wid: Wid,
        threshold: u32,
    },
    WindowShowMouse {
        wid: Wid,
        mode: u32,
    },
    WindowWarpMouse {
        wid: Wid,
        x: i32,
        y: i32,
    },
    WindowDragStart {
        wid: Wid,
    },
    WindowResizeStart {
        wid: Wid,
        direction: ResizeDirection,
    },
    KeyBind {
        keycode: u32,
        modifiers: ModMask,
        response: KeyBindResponse,
    },
    SpecialRequest {
        wid: Wid,
        request: SpecialRequestKind,
    },
    Clipboard {
        content: Vec<u8>,
    },
    SessionEnd,
}

impl Message {
    pub fn msg_type(&self) -> u32 {
        match self {
            Message::Hello => ty::HELLO,
            Message::Welcome { .. } => ty::WELCOME,
            Message::WindowNew { .. } => ty::WINDOW_NEW,
            Message::WindowInit { .. } => ty::WINDOW_INIT,
            Message::Flip { .. } => ty::FLIP,
            Message::FlipRegion { .. } => ty::FLIP_REGION,
            Message::WindowMove { .. } => ty::WINDOW_MOVE,
            Message::WindowMoveRelative { .. } => ty::WINDOW_MOVE_RELATIVE,
            Message::WindowStack { .. } => ty::WINDOW_STACK,
            Message::WindowClose { .. } => ty::WINDOW_CLOSE,
            Message::ResizeRequest { .. } => ty::RESIZE_REQUEST,
            Message::ResizeOffer { .. } => ty::RESIZE_OFFER,
            Message::ResizeAccept { .. } => ty::RESIZE_ACCEPT,
            Message::ResizeBufid { .. } => ty::RESIZE_BUFID,
            Message::ResizeDone { .. } => ty::RESIZE_DONE,
            Message::KeyEvent { .. } => ty::KEY_EVENT,
            Message::MouseEvent { .. } => ty::MOUSE_EVENT,
            Message::WindowMouseEvent { .. } => ty::WINDOW_MOUSE_EVENT,
            Message::WindowFocusChange { .. } => ty::WINDOW_FOCUS_CHANGE,
            Message::WindowFocus { .. } => ty::WINDOW_FOCUS,
            Message::WindowShow { .. } => ty::WINDOW_SHOW,
            Message::WindowHide { .. } => ty::WINDOW_HIDE,
            Message::Subscribe => ty::SUBSCRIBE,
            Message::Unsubscribe => ty::UNSUBSCRIBE,
            Message::Notify => ty::NOTIFY,
            Message::QueryWindows => ty::QUERY_WINDOWS,
            Message::WindowAdvertise { .. } => ty::WINDOW_ADVERTISE,
            Message::WindowUpdateShape { .. } => ty::WINDOW_UPDATE_SHAPE,
            Message::WindowShowMouse { .. } => ty::WINDOW_SHOW_MOUSE,
            Message::WindowWarpMouse { .. } => ty::WINDOW_WARP_MOUSE,
            Message::WindowDragStart { .. } => ty::WINDOW_DRAG_START,
            Message::WindowResizeStart { .. } => ty::WINDOW_RESIZE_START,
            Message::KeyBind { .. } => ty::KEY_BIND,
            Message::SpecialRequest { .. } => ty::SPECIAL_REQUEST,
            Message::Clipboard { .. } => ty::CLIPBOARD,
            Message::SessionEnd => ty::SESSION_END,
        }
    }

    /// Encode into a complete frame, header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(MAGIC, self.msg_type());
        match self {
            Message::Hello
            | Message::Subscribe
            | Message::Unsubscribe
            | Message::Notify
            | Message::QueryWindows
            | Message::SessionEnd => {}
            Message::Welcome { width, height } => {
                w.u32(*width);
                w.u32(*height);
            }
            Message::WindowNew {
                width,
                height,
                flags,
            } => {
                w.u32(*width);
                w.u32(*height);
                w.u32(flags.bits());
            }
            Message::WindowInit {
                wid,
                width,
                height,
                bufid,
            } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
                w.u32(*bufid);
            }
            Message::Flip { wid }
            | Message::WindowClose { wid }
            | Message::WindowFocus { wid }
            | Message::WindowShow { wid }
            | Message::WindowHide { wid }
            | Message::WindowDragStart { wid } => {
                w.u32(*wid);
            }
            Message::FlipRegion {
                wid,
                x,
                y,
                width,
                height,
            } => {
                w.u32(*wid);
                w.i32(*x);
                w.i32(*y);
                w.u32(*width);
                w.u32(*height);
            }
            Message::WindowMove { wid, x, y } | Message::WindowWarpMouse { wid, x, y } => {
                w.u32(*wid);
                w.i32(*x);
                w.i32(*y);
            }
            Message::WindowMoveRelative {
                wid_to_move,
                wid_base,
                x,
                y,
            } => {
                w.u32(*wid_to_move);
                w.u32(*wid_base);
                w.i32(*x);
                w.i32(*y);
            }
            Message::WindowStack { wid, z } => {
                w.u32(*wid);
                w.u32(z.to_wire());
            }
            Message::ResizeRequest { wid, width, height }
            | Message::ResizeAccept { wid, width, height }
            | Message::ResizeDone { wid, width, height } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
            }
            Message::ResizeOffer {
                wid,
                width,
                height,
                tile,
            } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
                w.u32(tile.bits());
            }
            Message::ResizeBufid {
                wid,
                width,
                height,
                bufid,
            } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
                w.u32(*bufid);
            }
            Message::KeyEvent {
                wid,
                keycode,
                modifiers,
                pressed,
            } => {
                w.u32(*wid);
                w.u32(*keycode);
                w.u32(modifiers.bits());
                w.u8(u8::from(*pressed));
            }
            Message::MouseEvent {
                wid,
                x,
                y,
                buttons,
                kind,
            } => {
                w.u32(*wid);
                w.i32(*x);
                w.i32(*y);
                w.u8(buttons.bits());
                w.u32(kind.to_wire());
            }
            Message::WindowMouseEvent {
                wid,
                x,
                y,
                old_x,
                old_y,
                buttons,
                command,
                modifiers,
            } => {
                w.u32(*wid);
                w.i32(*x);
                w.i32(*y);
                w.i32(*old_x);
                w.i32(*old_y);
                w.u8(buttons.bits());
                w.u32(command.to_wire());
                w.u32(modifiers.bits());
            }
            Message::WindowFocusChange { wid, focused } => {
                w.u32(*wid);
                w.u8(u8::from(*focused));
            }
            Message::WindowAdvertise {
                wid,
                flags,
                icon,
                bufid,
                width,
                height,
                strings,
            } => {
                w.u32(*wid);
                w.u32(*flags);
                w.u32(*icon);
                w.u32(*bufid);
                w.u32(*width);
                w.u32(*height);
                w.blob(strings);
            }
            Message::WindowUpdateShape { wid, threshold } => {
                w.u32(*wid);
                w.u32(*threshold);
            }
            Message::WindowShowMouse { wid, mode } => {
                w.u32(*wid);
                w.u32(*mode);
            }
            Message::WindowResizeStart { wid, direction } => {
                w.u32(*wid);
                w.u32(direction.to_wire());
            }
            Message::KeyBind {
                keycode,
                modifiers,
                response,
            } => {
                w.u32(*keycode);
                w.u32(modifiers.bits());
                w.u32(response.to_wire());
            }
            Message::SpecialRequest { wid, request } => {
                w.u32(*wid);
                w.u32(request.to_wire());
            }
            Message::Clipboard { content } => {
                w.blob(content);
            }
        }
        w.finish()
    }

    /// Decode a complete frame (header included). The frame length must
    /// match the declared size exactly; the transport guarantees this by
    /// reading size-delimited frames.
    pub fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
        if frame.len() < HEADER_LEN {
            return Err(ProtocolError::ShortHeader { found: frame.len() });
        }
        let magic = u32::from_le_bytes(frame[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic { found: magic });
        }
        let msg_type = u32::from_le_bytes(frame[4..8].try_into().unwrap());
        let size = u32::from_le_bytes(frame[8..12].try_into().unwrap()) as usize;
        if size > MAX_FRAME_LEN {
            return Err(ProtocolError::Oversized {
                declared: size,
                max: MAX_FRAME_LEN,
            });
        }
        if size != frame.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: size,
                found: frame.len(),
            });
        }

        let mut r = Reader::new(&frame[HEADER_LEN..]);
        let msg = match msg_type {
            ty::HELLO => Message::Hello,
            ty::SUBSCRIBE => Message::Subscribe,
            ty::UNSUBSCRIBE => Message::Unsubscribe,
            ty::NOTIFY => Message::Notify,
            ty::QUERY_WINDOWS => Message::QueryWindows,
            ty::SESSION_END => Message::SessionEnd,
            ty::WELCOME => Message::Welcome {
                width: r.u32("width")?,
                height: r.u32("height")?,
            },
            ty::WINDOW_NEW => Message::WindowNew {
                width: r.u32("width")?,
                height: r.u32("height")?,
                flags: WindowFlags::from_bits_truncate(r.u32("flags")?),
            },
            ty::WINDOW_INIT => Message::WindowInit {
                wid: r.u32("wid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
                bufid: r.u32("bufid")?,
            },
            ty::FLIP => Message::Flip { wid: r.u32("wid")? },
            ty::FLIP_REGION => Message::FlipRegion {
                wid: r.u32("wid")?,
                x: r.i32("x")?,
                y: r.i32("y")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
            },
            ty::WINDOW_MOVE => Message::WindowMove {
                wid: r.u32("wid")?,
                x: r.i32("x")?,
                y: r.i32("y")?,
            },
            ty::WINDOW_MOVE_RELATIVE => Message::WindowMoveRelative {
                wid_to_move: r.u32("wid_to_move")?,
                wid_base: r.u32("wid_base")?,
                x: r.i32("x")?,
                y: r.i32("y")?,
            },
            ty::WINDOW_STACK => Message::WindowStack {
                wid: r.u32("wid")?,
                z: ZBand::from_wire(r.u32("z")?)?,
            },
            ty::WINDOW_CLOSE => Message::WindowClose { wid: r.u32("wid")? },
            ty::RESIZE_REQUEST => Message::ResizeRequest {
                wid: r.u32("wid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
            },
            ty::RESIZE_OFFER => Message::ResizeOffer {
                wid: r.u32("wid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
                tile: TileEdges::from_bits_truncate(r.u32("tile")?),
            },
            ty::RESIZE_ACCEPT => Message::ResizeAccept {
                wid: r.u32("wid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
            },
            ty::RESIZE_BUFID => Message::ResizeBufid {
                wid: r.u32("wid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
                bufid: r.u32("bufid")?,
            },
            ty::RESIZE_DONE => Message::ResizeDone {
                wid: r.u32("wid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
            },
            ty::KEY_EVENT => Message::KeyEvent {
                wid: r.u32("wid")?,
                keycode: r.u32("keycode")?,
                modifiers: ModMask::from_bits_truncate(r.u32("modifiers")?),
                pressed: r.u8("pressed")? != 0,
            },
            ty::MOUSE_EVENT => Message::MouseEvent {
                wid: r.u32("wid")?,
                x: r.i32("x")?,
                y: r.i32("y")?,
                buttons: MouseButtons::from_bits_truncate(r.u8("buttons")?),
                kind: PointerKind::from_wire(r.u32("kind")?)?,
            },
            ty::WINDOW_MOUSE_EVENT => Message::WindowMouseEvent {
                wid: r.u32("wid")?,
                x: r.i32("x")?,
                y: r.i32("y")?,
                old_x: r.i32("old_x")?,
                old_y: r.i32("old_y")?,
                buttons: MouseButtons::from_bits_truncate(r.u8("buttons")?),
                command: MouseCommand::from_wire(r.u32("command")?)?,
                modifiers: ModMask::from_bits_truncate(r.u32("modifiers")?),
            },
            ty::WINDOW_FOCUS_CHANGE => Message::WindowFocusChange {
                wid: r.u32("wid")?,
                focused: r.u8("focused")? != 0,
            },
            ty::WINDOW_FOCUS => Message::WindowFocus { wid: r.u32("wid")? },
            ty::WINDOW_SHOW => Message::WindowShow { wid: r.u32("wid")? },
            ty::WINDOW_HIDE => Message::WindowHide { wid: r.u32("wid")? },
            ty::WINDOW_ADVERTISE => Message::WindowAdvertise {
                wid: r.u32("wid")?,
                flags: r.u32("flags")?,
                icon: r.u32("icon")?,
                bufid: r.u32("bufid")?,
                width: r.u32("width")?,
                height: r.u32("height")?,
                strings: r.blob("strings")?,
            },
            ty::WINDOW_UPDATE_SHAPE => Message::WindowUpdateShape {
                wid: r.u32("wid")?,
                threshold: r.u32("threshold")?,
            },
            ty::WINDOW_SHOW_MOUSE => Message::WindowShowMouse {
                wid: r.u32("wid")?,
                mode: r.u32("mode")?,
            },
            ty::WINDOW_WARP_MOUSE => Message::WindowWarpMouse {
                wid: r.u32("wid")?,
                x: r.i32("x")?,
                y: r.i32("y")?,
            },
            ty::WINDOW_DRAG_START => Message::WindowDragStart { wid: r.u32("wid")? },
            ty::WINDOW_RESIZE_START => Message::WindowResizeStart {
                wid: r.u32("wid")?,
                direction: ResizeDirection::from_wire(r.u32("direction")?)?,
            },
            ty::KEY_BIND => Message::KeyBind {
                keycode: r.u32("keycode")?,
                modifiers: ModMask::from_bits_truncate(r.u32("modifiers")?),
                response: KeyBindResponse::from_wire(r.u32("response")?)?,
            },
            ty::SPECIAL_REQUEST => Message::SpecialRequest {
                wid: r.u32("wid")?,
                request: SpecialRequestKind::from_wire(r.u32("request")?)?,
            },
            ty::CLIPBOARD => Message::Clipboard {
                content: r.blob("content")?,
            },
            other => return Err(ProtocolError::UnknownType { ty: other }),
        };

        if r.remaining() > 0 {
            tracing::trace!(
                target: "protocol.codec",
                msg_type,
                trailing = r.remaining(),
                "ignoring trailing bytes in frame"
            );
        }
        Ok(msg)
    }

    /// Helper used to restore a window's default cursor via
    /// `WindowShowMouse`.
    pub fn show_mouse_reset(wid: Wid) -> Message {
        Message::WindowShowMouse {
            wid,
            mode: CursorHint::RESET,
        }
    }
}
