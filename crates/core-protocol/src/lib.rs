//! Wire protocol between the mica server and its clients.
//!
//! Every message is a 16-byte header (`magic`, `type`, `size`,
//! `reserved`, all little-endian `u32`) followed by a type-specific body.
//! `size` counts the header. String and blob fields are length-prefixed,
//! never NUL-terminated. The transport is a reliable, in-order byte
//! stream; frames are delimited by the header's `size` field.
//!
//! Decoding is strict: a wrong magic, a size below the header length, or a
//! body shorter than its type requires produces a [`ProtocolError`]. The
//! server's policy (it logs and drops, it does not disconnect) lives with
//! the caller; this crate only classifies.

mod message;
mod types;
mod wire;

pub use message::Message;
pub use types::{
    CursorHint, KeyBindResponse, ModMask, MouseButtons, MouseCommand, PointerKind,
    ResizeDirection, SpecialRequestKind, TileEdges, WindowFlags, ZBand,
};
pub use wire::{ProtocolError, Reader, Writer};

/// Protocol magic: ASCII `MICA`, transmitted little-endian.
pub const MAGIC: u32 = 0x4D49_4341;

/// Bytes in the fixed message header.
pub const HEADER_LEN: usize = 16;

/// Upper bound on a single frame; anything larger is rejected before
/// allocation. Advertise strings and clipboard bodies stay far below this.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Server-side window identifier. Monotonic, never reused within a server
/// lifetime; zero is never a valid window.
pub type Wid = u32;

/// Shared-buffer identifier; zero means "no buffer".
pub type BufId = u32;

/// The wid used for key events delivered to key-bind owners when no
/// window has focus.
pub const WID_NONE: Wid = u32::MAX;

/// Inline clipboard cap. Longer contents are staged in shared memory and
/// announced with [`CLIPBOARD_SENTINEL`] followed by the ASCII decimal
/// byte length.
pub const CLIPBOARD_INLINE_MAX: usize = 511;
pub const CLIPBOARD_SENTINEL: u8 = 0x02;
