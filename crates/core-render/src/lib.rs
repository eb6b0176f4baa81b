//! The compositor's frame engine: damage accumulation, back-to-front
//! compositing with transforms and blur-behind, the cursor overlay,
//! closing-window teardown, and screenshots.
//!
//! The engine renders only when damage exists. Producers append
//! screen-space rectangles to the damage queue as state changes; each
//! frame drains the queue into a clip list, composites every window that
//! intersects it, overlays the cursor, and presents exactly the damaged
//! rectangles.

mod damage;
mod frame;
mod screenshot;

pub use damage::DamageQueue;
pub use frame::{FrameRenderer, RenderOutcome};
pub use screenshot::write_screenshot;
