//! Blitting primitives.
//!
//! Every drawing call is restricted to a caller-supplied clip list: a set
//! of screen-space rectangles that together form the damaged region for
//! the frame. An empty clip list means "draw nothing"; the renderer only
//! composites when damage exists.

use core_geometry::{Matrix, Rect};

use crate::blend_premul;
use crate::surface::{PixelView, Surface};

/// Straight blit of `src` at `(x, y)` with embedded per-pixel alpha.
pub fn blit(dst: &mut Surface, src: PixelView<'_>, x: i32, y: i32, clips: &[Rect]) {
    blit_alpha(dst, src, x, y, 255, clips);
}

/// Blit with embedded alpha scaled by a whole-window opacity.
pub fn blit_alpha(
    dst: &mut Surface,
    src: PixelView<'_>,
    x: i32,
    y: i32,
    opacity: u8,
    clips: &[Rect],
) {
    let bounds = Rect::new(x, y, src.width, src.height)
        .clip_to_screen(dst.width(), dst.height());
    if bounds.is_empty() {
        return;
    }
    for clip in clips {
        let Some(area) = bounds.intersect(clip) else {
            continue;
        };
        for dy in area.y..area.bottom() {
            let sy = dy - y;
            for dx in area.x..area.right() {
                let sx = dx - x;
                let Some(sp) = src.get(sx, sy) else { continue };
                let dp = dst.get(dx, dy).unwrap_or(0);
                dst.put(dx, dy, blend_premul(dp, sp, opacity));
            }
        }
    }
}

/// Matrix blit: maps destination pixels back through the inverse of `m`
/// and samples `src` nearest-neighbor. Callers should detect pure
/// translations with [`Matrix::is_translation`] and use [`blit_alpha`]
/// instead; this routine pays the per-pixel inverse mapping.
pub fn blit_transform(
    dst: &mut Surface,
    src: PixelView<'_>,
    m: &Matrix,
    opacity: u8,
    clips: &[Rect],
) {
    let Some(inv) = m.inverse() else {
        tracing::warn!(target: "compositor.render", "singular transform, skipping blit");
        return;
    };
    let bounds = transform_bounds(src, m).clip_to_screen(dst.width(), dst.height());
    if bounds.is_empty() {
        return;
    }
    for clip in clips {
        let Some(area) = bounds.intersect(clip) else {
            continue;
        };
        for dy in area.y..area.bottom() {
            for dx in area.x..area.right() {
                let (sx, sy) = inv.apply(dx as f64 + 0.5, dy as f64 + 0.5);
                let Some(sp) = src.get(sx.floor() as i32, sy.floor() as i32) else {
                    continue;
                };
                let dp = dst.get(dx, dy).unwrap_or(0);
                dst.put(dx, dy, blend_premul(dp, sp, opacity));
            }
        }
    }
}

/// Matrix blit over a blurred backdrop. The destination pixels covered by
/// the sprite (at or above `threshold` alpha) are first replaced with the
/// corresponding pixels of `blurred`, a pre-blurred copy of the
/// backbuffer, and the sprite is then composited on top.
pub fn blit_transform_blur(
    dst: &mut Surface,
    blurred: &Surface,
    src: PixelView<'_>,
    m: &Matrix,
    opacity: u8,
    threshold: u32,
    clips: &[Rect],
) {
    let Some(inv) = m.inverse() else {
        tracing::warn!(target: "compositor.render", "singular transform, skipping blur blit");
        return;
    };
    let bounds = transform_bounds(src, m).clip_to_screen(dst.width(), dst.height());
    if bounds.is_empty() {
        return;
    }
    for clip in clips {
        let Some(area) = bounds.intersect(clip) else {
            continue;
        };
        for dy in area.y..area.bottom() {
            for dx in area.x..area.right() {
                let (sx, sy) = inv.apply(dx as f64 + 0.5, dy as f64 + 0.5);
                let Some(sp) = src.get(sx.floor() as i32, sy.floor() as i32) else {
                    continue;
                };
                let under = if crate::alpha_of(sp) as u32 >= threshold {
                    blurred.get(dx, dy).unwrap_or(0)
                } else {
                    dst.get(dx, dy).unwrap_or(0)
                };
                dst.put(dx, dy, blend_premul(under, sp, opacity));
            }
        }
    }
}

/// Fill a rectangle with a premultiplied color, clipped.
pub fn fill_rect(dst: &mut Surface, rect: Rect, color: u32, clips: &[Rect]) {
    let bounds = rect.clip_to_screen(dst.width(), dst.height());
    for clip in clips {
        let Some(area) = bounds.intersect(clip) else {
            continue;
        };
        for dy in area.y..area.bottom() {
            for dx in area.x..area.right() {
                dst.put(dx, dy, color);
            }
        }
    }
}

/// Bresenham line, unclipped endpoints, writes clipped to the surface.
pub fn draw_line(dst: &mut Surface, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        dst.put(x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = err * 2;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Screen-space bounding box of a transformed sprite.
fn transform_bounds(src: PixelView<'_>, m: &Matrix) -> Rect {
    let corners = [
        m.apply(0.0, 0.0),
        m.apply(src.width as f64, 0.0),
        m.apply(0.0, src.height as f64),
        m.apply(src.width as f64, src.height as f64),
    ];
    let left = corners.iter().map(|c| c.0.floor() as i32).min().unwrap();
    let top = corners.iter().map(|c| c.1.floor() as i32).min().unwrap();
    let right = corners.iter().map(|c| c.0.ceil() as i32 + 1).max().unwrap();
    let bottom = corners.iter().map(|c| c.1.ceil() as i32 + 1).max().unwrap();
    Rect::new(left, top, (right - left) as u32, (bottom - top) as u32)
}
