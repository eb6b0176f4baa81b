//! Integer rectangles and affine transforms for the compositor.
//!
//! Everything in here is pure math with no allocation beyond what the
//! caller hands in. Screen space is y-down with integer pixel coordinates;
//! window rotation is expressed in whole degrees about the window center.
//!
//! Invariants:
//! * `Rect` stores a signed origin and unsigned extent; an extent of zero
//!   in either axis is the canonical empty rectangle.
//! * `Matrix` rows map `(x, y, 1)` column vectors; the linear part is the
//!   leading 2×2 block.

mod matrix;
mod rect;
mod transform;

pub use matrix::Matrix;
pub use rect::Rect;
pub use transform::{rotated_bounds, screen_to_window, window_to_screen};
