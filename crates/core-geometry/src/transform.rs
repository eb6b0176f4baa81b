//! Coordinate mapping between screen space and a window's local frame.
//!
//! Rotation is about the window center. The screen→window direction is
//! used by hit testing and pointer event delivery; the window→screen
//! direction by damage computation and warp requests.

use crate::Rect;

/// Map a screen-space point into a window's local frame, undoing the
/// window's rotation about its center.
pub fn screen_to_window(
    (win_x, win_y): (i32, i32),
    (width, height): (u32, u32),
    rotation: i32,
    x: i32,
    y: i32,
) -> (i32, i32) {
    let local_x = x - win_x;
    let local_y = y - win_y;
    if rotation == 0 {
        return (local_x, local_y);
    }

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let t_x = local_x as f64 - cx;
    let t_y = local_y as f64 - cy;

    let r = -(rotation as f64).to_radians();
    let (s, c) = r.sin_cos();

    let n_x = t_x * c - t_y * s;
    let n_y = t_x * s + t_y * c;

    ((n_x + cx) as i32, (n_y + cy) as i32)
}

/// Map a window-local point out to screen space, applying the window's
/// rotation about its center.
pub fn window_to_screen(
    (win_x, win_y): (i32, i32),
    (width, height): (u32, u32),
    rotation: i32,
    x: i32,
    y: i32,
) -> (i32, i32) {
    if rotation == 0 {
        return (win_x + x, win_y + y);
    }

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let t_x = x as f64 - cx;
    let t_y = y as f64 - cy;

    let r = (rotation as f64).to_radians();
    let (s, c) = r.sin_cos();

    let n_x = t_x * c - t_y * s;
    let n_y = t_x * s + t_y * c;

    (
        (n_x + cx + win_x as f64) as i32,
        (n_y + cy + win_y as f64) as i32,
    )
}

/// Screen-space bounding box of a window-local rectangle under rotation:
/// the axis-aligned hull of the four transformed corners, padded by one
/// pixel to absorb the integer truncation of the corner mapping.
pub fn rotated_bounds(
    origin: (i32, i32),
    size: (u32, u32),
    rotation: i32,
    local: Rect,
) -> Rect {
    if rotation == 0 {
        return Rect::new(
            origin.0 + local.x,
            origin.1 + local.y,
            local.width,
            local.height,
        );
    }

    let corners = [
        window_to_screen(origin, size, rotation, local.x, local.y),
        window_to_screen(origin, size, rotation, local.right(), local.y),
        window_to_screen(origin, size, rotation, local.x, local.bottom()),
        window_to_screen(origin, size, rotation, local.right(), local.bottom()),
    ];

    let left = corners.iter().map(|c| c.0).min().unwrap_or(0);
    let top = corners.iter().map(|c| c.1).min().unwrap_or(0);
    let right = corners.iter().map(|c| c.0 + 1).max().unwrap_or(0);
    let bottom = corners.iter().map(|c| c.1 + 1).max().unwrap_or(0);

    Rect::new(left, top, (right - left) as u32, (bottom - top) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unrotated_is_simple_offset() {
        assert_eq!(
            screen_to_window((100, 50), (300, 200), 0, 150, 70),
            (50, 20)
        );
        assert_eq!(window_to_screen((100, 50), (300, 200), 0, 50, 20), (150, 70));
    }

    #[test]
    fn rotation_round_trip_center() {
        // The center is the fixed point of the rotation.
        let p = screen_to_window((0, 0), (100, 100), 37, 50, 50);
        assert_eq!(p, (50, 50));
        assert_eq!(window_to_screen((0, 0), (100, 100), 37, 50, 50), (50, 50));
    }

    #[test]
    fn quarter_turn_maps_edges() {
        // 90° about the center of a square maps the top-left corner region
        // to the top-right.
        let (x, y) = window_to_screen((0, 0), (100, 100), 90, 0, 0);
        assert!((x - 100).abs() <= 1 && y.abs() <= 1, "got ({x}, {y})");
    }

    #[test]
    fn bounds_without_rotation_match_exactly() {
        let r = rotated_bounds((10, 20), (300, 200), 0, Rect::new(0, 0, 300, 200));
        assert_eq!(r, Rect::new(10, 20, 300, 200));
    }

    #[test]
    fn bounds_cover_rotated_window() {
        let bounds = rotated_bounds((0, 0), (200, 100), 45, Rect::new(0, 0, 200, 100));
        // Every corner of the rotated window must land inside the hull.
        for &(lx, ly) in &[(0, 0), (200, 0), (0, 100), (200, 100)] {
            let (sx, sy) = window_to_screen((0, 0), (200, 100), 45, lx, ly);
            assert!(bounds.contains(sx, sy), "corner ({sx}, {sy}) outside {bounds:?}");
        }
    }
}
