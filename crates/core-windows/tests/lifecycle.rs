//! Cross-module lifecycle tests: registry, animations, tiling, and the
//! shared-memory hand-off working together.

use core_protocol::{WindowFlags, ZBand};
use core_shm::MemoryShm;
use core_windows::{compute_tile, AnimationMode, CloseOutcome, WindowRegistry};
use pretty_assertions::assert_eq;

fn fill_opaque(reg: &mut WindowRegistry, wid: u32) {
    let win = reg.get_mut(wid).unwrap();
    win.buffer
        .as_mut()
        .unwrap()
        .as_mut_slice()
        .fill(0xFF);
}

#[test]
fn full_window_lifetime_releases_exactly_one_region_per_buffer() {
    let mut reg = WindowRegistry::new("lifecycle");
    let mut shm = MemoryShm::new();

    let wid = reg.create(320, 240, 7, WindowFlags::empty(), &mut shm).unwrap();
    assert_eq!(shm.live_regions(), 1);
    reg.reveal(wid, 0);

    // One full resize handshake: the pending buffer coexists with the
    // current one, then replaces it.
    let pending = reg.resize_begin(wid, 640, 480, &mut shm).unwrap();
    assert_eq!(shm.live_regions(), 2);
    {
        let win = reg.get(wid).unwrap();
        assert_ne!(win.bufid, pending);
        assert_eq!(win.newbufid, pending);
    }
    assert!(reg.resize_finish(wid, 640, 480, &mut shm));
    assert_eq!(shm.live_regions(), 1);

    // Closing runs the fade-out to completion before the region goes.
    let (outcome, _) = reg.mark_for_close(wid, 10_000, &mut shm);
    assert_eq!(outcome, CloseOutcome::Animating);
    let duration = AnimationMode::FadeOut.duration_ms();
    assert!(reg.sweep_expired(10_000 + duration - 1, &mut shm).is_empty());
    assert_eq!(shm.live_regions(), 1);
    let closed = reg.sweep_expired(10_000 + duration, &mut shm);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].owner, 7);
    assert_eq!(shm.live_regions(), 0);
    assert!(reg.is_empty());
}

#[test]
fn stacking_focus_and_hit_testing_agree() {
    let mut reg = WindowRegistry::new("lifecycle");
    let mut shm = MemoryShm::new();

    let wallpaper = reg.create(640, 480, 1, WindowFlags::empty(), &mut shm).unwrap();
    let app = reg.create(200, 200, 2, WindowFlags::empty(), &mut shm).unwrap();
    let panel = reg.create(640, 24, 3, WindowFlags::empty(), &mut shm).unwrap();
    for wid in [wallpaper, app, panel] {
        reg.reveal(wid, 0);
        fill_opaque(&mut reg, wid);
    }
    reg.reorder(wallpaper, ZBand::Bottom);
    reg.reorder(panel, ZBand::Top);

    // The panel wins the point it covers, the app the point it covers,
    // and the wallpaper everything else.
    assert_eq!(reg.hit_test(10, 10), Some(panel));
    assert_eq!(reg.hit_test(100, 100), Some(app));
    assert_eq!(reg.hit_test(500, 400), Some(wallpaper));

    // Focusing the wallpaper is background focus: input still routes to
    // it, but the stored focus slot stays clear.
    reg.set_focus(Some(app));
    let change = reg.set_focus(Some(wallpaper));
    assert!(change.changed);
    assert_eq!(reg.focused(), None);
    assert_eq!(reg.effective_focus(), Some(wallpaper));
}

#[test]
fn tile_cells_cover_the_usable_area_exactly() {
    // Two columns over an odd width with a panel strip: every pixel of
    // the usable area is covered and seams overlap by one pixel.
    let (w, h, panel) = (1365u32, 768u32, 24u32);
    let left = compute_tile(w, h, panel, 2, 1, 0, 0);
    let right = compute_tile(w, h, panel, 2, 1, 1, 0);
    assert_eq!(left.x, 0);
    assert_eq!(left.y, panel as i32);
    assert_eq!(right.x + right.width as i32, w as i32);
    assert_eq!(left.height, h - panel);
    // One-pixel overlap at the shared seam.
    assert_eq!(left.x + left.width as i32, right.x + 1);
}
