//! Per-frame damage accumulation.
//!
//! An append-only list of screen-space rectangles, consumed once per
//! rendered frame. No merging is attempted at mark time; the blitters
//! intersect against the raw list, and duplicate coverage only costs
//! redundant pixel writes within one frame.
//!
//! Invariants:
//! * `take` returns every rectangle marked since the previous `take` and
//!   leaves the queue empty (one-shot consumption).
//! * Empty rectangles are dropped at mark time.

use core_geometry::Rect;

#[derive(Debug, Default)]
pub struct DamageQueue {
    rects: Vec<Rect>,
}

impl DamageQueue {
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    pub fn mark(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.rects.push(rect);
        }
    }

    pub fn mark_all(&mut self, rects: impl IntoIterator<Item = Rect>) {
        for r in rects {
            self.mark(r);
        }
    }

    /// Mark the full screen damaged (display reinit, first frame).
    pub fn mark_screen(&mut self, width: u32, height: u32) {
        self.mark(Rect::new(0, 0, width, height));
    }

    /// Consume all pending damage.
    pub fn take(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.rects)
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}
