//! Input dispatch: the pointer state machine, keyboard routing, hover
//! tracking, cursor selection, and the device readers that feed the
//! runtime channel.
//!
//! The dispatcher mutates the window registry directly and accumulates
//! outbound messages in an [`Outbox`]; it performs no IO itself, which
//! keeps the whole state machine unit-testable against the in-process
//! shared-memory allocator.

mod devices;
mod keyboard;
mod outbox;
mod pointer;

pub use devices::{KeyboardDeviceSource, PointerDeviceSource};
pub use keyboard::{route_key, KeyOutcome, ScreenshotKind};
pub use outbox::Outbox;
pub use pointer::{
    move_window, panel_height, tile_window, untile_window, CursorChoice, CursorKind,
    PointerConfig, PointerDispatcher, PointerState, ResizePreview, POINTER_SCALE,
};
