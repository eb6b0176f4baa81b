//! Server-side window state: records, the registry, z-stacks, focus,
//! animations, tiling, hit testing, and the resize buffer hand-off.
//!
//! Ownership model: the registry owns every window, keyed by wid. Band
//! lists, the focused-window slot, and client session sets all store bare
//! wids and resolve through the registry on use, so destroying a window
//! mid-operation can never leave a dangling reference, only a lookup
//! miss, which every caller treats as "window is gone".

mod animation;
mod registry;
mod tiling;
mod window;

pub use animation::{Animation, AnimationMode};
pub use registry::{CloseOutcome, ClosedWindow, FocusChange, WindowRegistry};
pub use tiling::{compute_tile, TilePlacement};
pub use window::{OwnerId, ServerWindow, TileRestore};

/// Minimum window extent after any clamping.
pub const MIN_WINDOW_DIM: u32 = 1;
