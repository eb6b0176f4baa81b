//! Logical keycode constants.
//!
//! Printable keys use their lowercase ASCII value; named keys live above
//! the ASCII range. Device readers normalize scancodes into these values
//! before events enter the runtime channel.

pub const ESCAPE: u32 = 27;

pub const F1: u32 = 0x1001;
pub const F2: u32 = 0x1002;
pub const F3: u32 = 0x1003;
pub const F4: u32 = 0x1004;
pub const F5: u32 = 0x1005;
pub const F6: u32 = 0x1006;
pub const F7: u32 = 0x1007;
pub const F8: u32 = 0x1008;
pub const F9: u32 = 0x1009;
pub const F10: u32 = 0x100A;
pub const F11: u32 = 0x100B;
pub const F12: u32 = 0x100C;

pub const ARROW_UP: u32 = 0x1101;
pub const ARROW_DOWN: u32 = 0x1102;
pub const ARROW_LEFT: u32 = 0x1103;
pub const ARROW_RIGHT: u32 = 0x1104;

pub const HOME: u32 = 0x1110;
pub const END: u32 = 0x1111;
pub const PAGE_UP: u32 = 0x1112;
pub const PAGE_DOWN: u32 = 0x1113;
pub const INSERT: u32 = 0x1114;
pub const DELETE: u32 = 0x1115;

pub const PRINT_SCREEN: u32 = 0x1120;
