//! Built-in cursor sprites.
//!
//! Sprites are generated procedurally at startup rather than loaded from
//! image assets, which keeps the pixel pipeline self-contained. Each
//! sprite is a small premultiplied-BGRA surface sharing one hotspot
//! convention.

use crate::blit::draw_line;
use crate::surface::Surface;

pub const CURSOR_SIZE: u32 = 24;
pub const CURSOR_HOT_X: i32 = 4;
pub const CURSOR_HOT_Y: i32 = 4;

const OUTLINE: u32 = 0xFF000000;
const BODY: u32 = 0xFFFFFFFF;

/// One cursor image. The hotspot is the pixel that tracks the pointer.
#[derive(Clone, Debug)]
pub struct CursorSprite {
    pub surface: Surface,
}

impl CursorSprite {
    fn blank() -> Self {
        CursorSprite {
            surface: Surface::new(CURSOR_SIZE, CURSOR_SIZE),
        }
    }
}

/// The full set of sprites the compositor can display.
#[derive(Clone, Debug)]
pub struct CursorSpriteSet {
    pub arrow: CursorSprite,
    pub drag: CursorSprite,
    pub resize_v: CursorSprite,
    pub resize_h: CursorSprite,
    pub resize_uldr: CursorSprite,
    pub resize_dlur: CursorSprite,
    pub point: CursorSprite,
    pub ibeam: CursorSprite,
}

impl CursorSpriteSet {
    pub fn build() -> Self {
        CursorSpriteSet {
            arrow: arrow(),
            drag: drag(),
            resize_v: resize(90),
            resize_h: resize(0),
            resize_uldr: resize(135),
            resize_dlur: resize(45),
            point: point(),
            ibeam: ibeam(),
        }
    }
}

fn thick_line(s: &mut Surface, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    draw_line(s, x0, y0, x1, y1, color);
    draw_line(s, x0 + 1, y0, x1 + 1, y1, color);
    draw_line(s, x0, y0 + 1, x1, y1 + 1, color);
}

fn arrow() -> CursorSprite {
    let mut c = CursorSprite::blank();
    let s = &mut c.surface;
    // Left edge, diagonal edge, and the notch back to the shaft.
    for i in 0..14 {
        draw_line(s, 4, 4 + i, 4 + i / 2 + 2, 4 + i, BODY);
    }
    draw_line(s, 4, 4, 4, 18, OUTLINE);
    draw_line(s, 4, 4, 13, 13, OUTLINE);
    draw_line(s, 4, 18, 8, 15, OUTLINE);
    draw_line(s, 13, 13, 8, 15, OUTLINE);
    thick_line(s, 9, 14, 13, 20, OUTLINE);
    c
}

fn drag() -> CursorSprite {
    let mut c = CursorSprite::blank();
    let s = &mut c.surface;
    // Open-hand stand-in: a rounded box with finger notches.
    for y in 8..18 {
        draw_line(s, 6, y, 18, y, BODY);
    }
    draw_line(s, 6, 8, 18, 8, OUTLINE);
    draw_line(s, 6, 18, 18, 18, OUTLINE);
    draw_line(s, 6, 8, 6, 18, OUTLINE);
    draw_line(s, 18, 8, 18, 18, OUTLINE);
    for i in 0..4 {
        draw_line(s, 8 + i * 3, 5, 8 + i * 3, 8, OUTLINE);
    }
    c
}

/// Double-headed resize arrow at the given angle (degrees, screen space).
fn resize(angle: i32) -> CursorSprite {
    let mut c = CursorSprite::blank();
    let s = &mut c.surface;
    let r = (angle as f64).to_radians();
    let (sin, cos) = r.sin_cos();
    let cx = 12.0;
    let cy = 12.0;
    let dx = cos * 8.0;
    let dy = sin * 8.0;
    let (x0, y0) = ((cx - dx) as i32, (cy - dy) as i32);
    let (x1, y1) = ((cx + dx) as i32, (cy + dy) as i32);
    thick_line(s, x0, y0, x1, y1, BODY);
    // Arrowheads: two short strokes per end, rotated ±135° off the shaft.
    for &(ex, ey, sign) in &[(x0, y0, 1.0), (x1, y1, -1.0)] {
        for head in &[2.5, -2.5] {
            let ha = r + sign * (std::f64::consts::PI - head / 4.0);
            let hx = (ex as f64 + ha.cos() * 5.0) as i32;
            let hy = (ey as f64 + ha.sin() * 5.0) as i32;
            thick_line(s, ex, ey, hx, hy, BODY);
        }
    }
    c
}

fn point() -> CursorSprite {
    let mut c = CursorSprite::blank();
    let s = &mut c.surface;
    // Pointing finger: vertical digit above a knuckle box.
    for y in 4..12 {
        draw_line(s, 10, y, 13, y, BODY);
    }
    for y in 12..19 {
        draw_line(s, 7, y, 16, y, BODY);
    }
    draw_line(s, 10, 4, 13, 4, OUTLINE);
    draw_line(s, 7, 12, 7, 19, OUTLINE);
    draw_line(s, 16, 12, 16, 19, OUTLINE);
    draw_line(s, 7, 19, 16, 19, OUTLINE);
    c
}

fn ibeam() -> CursorSprite {
    let mut c = CursorSprite::blank();
    let s = &mut c.surface;
    thick_line(s, 11, 5, 11, 19, BODY);
    draw_line(s, 8, 4, 15, 4, BODY);
    draw_line(s, 8, 20, 15, 20, BODY);
    c
}
