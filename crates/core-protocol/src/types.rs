//! Protocol-level value types shared by the codec, the window registry,
//! and the input dispatcher.

use crate::wire::ProtocolError;

bitflags::bitflags! {
    /// Client-declared window behavior flags, set at creation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct WindowFlags: u32 {
        const NO_STEAL_FOCUS   = 1 << 0;
        const DISALLOW_DRAG    = 1 << 1;
        const DISALLOW_RESIZE  = 1 << 2;
        const ALT_ANIMATION    = 1 << 3;
        const DIALOG_ANIMATION = 1 << 4;
        const NO_ANIMATION     = 1 << 5;
        const BLUR_BEHIND      = 1 << 6;
    }
}

bitflags::bitflags! {
    /// Keyboard modifier mask as carried in key events and bindings.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ModMask: u32 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const SUPER = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Pointer button state. Scroll notches are reported as transient
    /// button bits, matching how wheel hardware surfaces in packets.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u8 {
        const LEFT        = 0x01;
        const RIGHT       = 0x02;
        const MIDDLE      = 0x04;
        const SCROLL_UP   = 0x10;
        const SCROLL_DOWN = 0x20;
    }
}

bitflags::bitflags! {
    /// Which screen edges a tiled cell touches. All four set = 1×1 tile.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TileEdges: u32 {
        const LEFT  = 1 << 0;
        const RIGHT = 1 << 1;
        const UP    = 1 << 2;
        const DOWN  = 1 << 3;
    }
}

impl TileEdges {
    pub fn tiled() -> Self {
        TileEdges::all()
    }
}

/// The five z-bands, bottom to top.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZBand {
    Bottom,
    Mid,
    Overlay,
    Menu,
    Top,
}

impl ZBand {
    pub fn to_wire(self) -> u32 {
        match self {
            ZBand::Bottom => 0,
            ZBand::Mid => 1,
            ZBand::Overlay => 2,
            ZBand::Menu => 3,
            ZBand::Top => 4,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            0 => ZBand::Bottom,
            1 => ZBand::Mid,
            2 => ZBand::Overlay,
            3 => ZBand::Menu,
            4 => ZBand::Top,
            _ => return Err(ProtocolError::BadValue { field: "z", value: v }),
        })
    }

    /// The singleton bands hold one window each and refuse user-driven
    /// drag, resize, and rotation.
    pub fn is_singleton(self) -> bool {
        matches!(self, ZBand::Bottom | ZBand::Top)
    }
}

/// Delivery command inside a `WindowMouseEvent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseCommand {
    Click,
    Drag,
    Raise,
    Down,
    Up,
    Move,
    Leave,
    Enter,
}

impl MouseCommand {
    pub fn to_wire(self) -> u32 {
        match self {
            MouseCommand::Click => 0,
            MouseCommand::Drag => 1,
            MouseCommand::Raise => 2,
            MouseCommand::Down => 3,
            MouseCommand::Up => 4,
            MouseCommand::Move => 5,
            MouseCommand::Leave => 6,
            MouseCommand::Enter => 7,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            0 => MouseCommand::Click,
            1 => MouseCommand::Drag,
            2 => MouseCommand::Raise,
            3 => MouseCommand::Down,
            4 => MouseCommand::Up,
            5 => MouseCommand::Move,
            6 => MouseCommand::Leave,
            7 => MouseCommand::Enter,
            _ => {
                return Err(ProtocolError::BadValue {
                    field: "command",
                    value: v,
                })
            }
        })
    }
}

/// Raw pointer packet kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Relative,
    Absolute,
}

impl PointerKind {
    pub fn to_wire(self) -> u32 {
        match self {
            PointerKind::Relative => 0,
            PointerKind::Absolute => 1,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            0 => PointerKind::Relative,
            1 => PointerKind::Absolute,
            _ => {
                return Err(ProtocolError::BadValue {
                    field: "kind",
                    value: v,
                })
            }
        })
    }
}

/// Nine-cell resize direction. `Auto` is resolved server-side from the
/// click position inside the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeDirection {
    Auto,
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl ResizeDirection {
    pub fn to_wire(self) -> u32 {
        match self {
            ResizeDirection::Auto => 0,
            ResizeDirection::Up => 1,
            ResizeDirection::Down => 2,
            ResizeDirection::Left => 3,
            ResizeDirection::Right => 4,
            ResizeDirection::UpLeft => 5,
            ResizeDirection::UpRight => 6,
            ResizeDirection::DownLeft => 7,
            ResizeDirection::DownRight => 8,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            0 => ResizeDirection::Auto,
            1 => ResizeDirection::Up,
            2 => ResizeDirection::Down,
            3 => ResizeDirection::Left,
            4 => ResizeDirection::Right,
            5 => ResizeDirection::UpLeft,
            6 => ResizeDirection::UpRight,
            7 => ResizeDirection::DownLeft,
            8 => ResizeDirection::DownRight,
            _ => {
                return Err(ProtocolError::BadValue {
                    field: "direction",
                    value: v,
                })
            }
        })
    }

    pub fn grows_left(self) -> bool {
        matches!(
            self,
            ResizeDirection::Left | ResizeDirection::UpLeft | ResizeDirection::DownLeft
        )
    }

    pub fn grows_up(self) -> bool {
        matches!(
            self,
            ResizeDirection::Up | ResizeDirection::UpLeft | ResizeDirection::UpRight
        )
    }

    pub fn horizontal_only(self) -> bool {
        matches!(self, ResizeDirection::Left | ResizeDirection::Right)
    }

    pub fn vertical_only(self) -> bool {
        matches!(self, ResizeDirection::Up | ResizeDirection::Down)
    }
}

/// Per-window cursor presentation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorHint {
    #[default]
    Default,
    Hidden,
    Point,
    Ibeam,
    Drag,
    ResizeV,
    ResizeH,
    ResizeUlDr,
    ResizeDlUr,
}

impl CursorHint {
    /// Wire value restoring the window's sticky default.
    pub const RESET: u32 = 0xFFFF_FFFF;

    pub fn to_wire(self) -> u32 {
        match self {
            CursorHint::Default => 0,
            CursorHint::Hidden => 1,
            CursorHint::Point => 2,
            CursorHint::Ibeam => 3,
            CursorHint::Drag => 4,
            CursorHint::ResizeV => 5,
            CursorHint::ResizeH => 6,
            CursorHint::ResizeUlDr => 7,
            CursorHint::ResizeDlUr => 8,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            0 => CursorHint::Default,
            1 => CursorHint::Hidden,
            2 => CursorHint::Point,
            3 => CursorHint::Ibeam,
            4 => CursorHint::Drag,
            5 => CursorHint::ResizeV,
            6 => CursorHint::ResizeH,
            7 => CursorHint::ResizeUlDr,
            8 => CursorHint::ResizeDlUr,
            _ => {
                return Err(ProtocolError::BadValue {
                    field: "mode",
                    value: v,
                })
            }
        })
    }
}

/// How a key binding interacts with normal focus routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyBindResponse {
    /// Deliver to the binding owner and continue routing to focus.
    Notify,
    /// Deliver to the binding owner only.
    Steal,
}

impl KeyBindResponse {
    pub fn to_wire(self) -> u32 {
        match self {
            KeyBindResponse::Notify => 1,
            KeyBindResponse::Steal => 2,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            1 => KeyBindResponse::Notify,
            2 => KeyBindResponse::Steal,
            _ => {
                return Err(ProtocolError::BadValue {
                    field: "response",
                    value: v,
                })
            }
        })
    }
}

/// Out-of-band requests carried by `SpecialRequest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialRequestKind {
    Maximize,
    PleaseClose,
    ClipboardRead,
}

impl SpecialRequestKind {
    pub fn to_wire(self) -> u32 {
        match self {
            SpecialRequestKind::Maximize => 1,
            SpecialRequestKind::PleaseClose => 2,
            SpecialRequestKind::ClipboardRead => 3,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        Ok(match v {
            1 => SpecialRequestKind::Maximize,
            2 => SpecialRequestKind::PleaseClose,
            3 => SpecialRequestKind::ClipboardRead,
            _ => {
                return Err(ProtocolError::BadValue {
                    field: "request",
                    value: v,
                })
            }
        })
    }
}
