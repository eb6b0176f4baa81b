//! Frame rendering: one pass over the damaged region.

use std::path::PathBuf;

use smallvec::SmallVec;
use tracing::{debug, trace};

use core_display::DisplayBackend;
use core_geometry::{Matrix, Rect};
use core_input::{CursorKind, PointerDispatcher, ResizePreview, ScreenshotKind};
use core_pixels::{
    as_pixels, blit, blit_alpha, blit_transform, blit_transform_blur, box_blur_region, fill_rect,
    CursorSprite, CursorSpriteSet, PixelView, Surface, CURSOR_HOT_X, CURSOR_HOT_Y, CURSOR_SIZE,
};
use core_protocol::WindowFlags;
use core_shm::RegionAllocator;
use core_windows::{AnimationMode, ClosedWindow, ServerWindow, WindowRegistry};

use crate::damage::DamageQueue;
use crate::screenshot::write_screenshot;

/// Background fill where no BOTTOM window covers the screen.
const CLEAR_COLOR: u32 = 0xFF000000;

type ClipList = SmallVec<[Rect; 16]>;

/// What one call to [`FrameRenderer::render`] did.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    /// Whether any pixels were composited (damage existed).
    pub rendered: bool,
    /// Windows reaped by the closing sweep; the caller owes session
    /// cleanup and subscriber notifies.
    pub closed: Vec<ClosedWindow>,
    /// Path of a screenshot taken this frame.
    pub screenshot: Option<PathBuf>,
}

pub struct FrameRenderer {
    sprites: CursorSpriteSet,
    blur_scratch: Surface,
    blur_kernel: u32,
    screenshot_dir: PathBuf,
    screenshot_request: Option<ScreenshotKind>,
    damage: DamageQueue,
    last_cursor: (i32, i32),
    last_cursor_kind: CursorKind,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32, blur_kernel: u32, screenshot_dir: PathBuf) -> Self {
        let mut damage = DamageQueue::new();
        damage.mark_screen(width, height);
        FrameRenderer {
            sprites: CursorSpriteSet::build(),
            blur_scratch: Surface::new(width, height),
            blur_kernel,
            screenshot_dir,
            screenshot_request: None,
            damage,
            last_cursor: (0, 0),
            last_cursor_kind: CursorKind::Arrow,
        }
    }

    pub fn damage(&mut self) -> &mut DamageQueue {
        &mut self.damage
    }

    pub fn request_screenshot(&mut self, kind: ScreenshotKind) {
        self.screenshot_request = Some(kind);
    }

    /// Display geometry changed: grow the blur scratch and repaint
    /// everything.
    pub fn on_display_resized(&mut self, width: u32, height: u32) {
        self.blur_scratch.resize(width, height);
        self.damage.mark_screen(width, height);
    }

    /// Produce one frame. Gathers damage (cursor motion, pending queue,
    /// animations), composites back-to-front, overlays the cursor,
    /// presents the damaged rectangles, then sweeps expired closing
    /// windows and serves any screenshot request.
    pub fn render(
        &mut self,
        backend: &mut dyn DisplayBackend,
        reg: &mut WindowRegistry,
        pointer: &PointerDispatcher,
        shm: &mut dyn RegionAllocator,
        now_ms: u64,
    ) -> RenderOutcome {
        let screen_w = backend.width();
        let screen_h = backend.height();
        let mut outcome = RenderOutcome::default();

        // Cursor motion counts as two damage rectangles: where it was and
        // where it is. A sprite change redraws in place.
        let cursor = pointer.position();
        let choice = pointer.current_cursor(reg);
        if cursor != self.last_cursor || choice.kind != self.last_cursor_kind {
            self.damage.mark(cursor_rect(self.last_cursor));
            self.damage.mark(cursor_rect(cursor));
            self.last_cursor = cursor;
            self.last_cursor_kind = choice.kind;
        }

        // Animated windows repaint their full footprint every frame;
        // expired opening animations are cleared here.
        for wid in reg.back_to_front() {
            let Some(win) = reg.get(wid) else { continue };
            if let Some(anim) = win.anim {
                self.damage.mark(win.damage_bounds());
                if anim.expired(now_ms) && !win.closing {
                    if let Some(win) = reg.get_mut(wid) {
                        win.anim = None;
                    }
                }
            }
        }

        let clips: ClipList = self
            .damage
            .take()
            .into_iter()
            .map(|r| r.clip_to_screen(screen_w, screen_h))
            .filter(|r| !r.is_empty())
            .collect();

        if !clips.is_empty() {
            // Blur-behind windows need content slightly outside the
            // damaged region so their kernel sees fresh neighbors.
            let any_blur = reg.back_to_front().iter().any(|wid| {
                reg.get(*wid)
                    .map(|w| !w.hidden && w.flags.contains(WindowFlags::BLUR_BEHIND))
                    .unwrap_or(false)
            });
            let blit_clips: ClipList = if any_blur {
                clips
                    .iter()
                    .map(|r| {
                        r.expand(2 * self.blur_kernel as i32)
                            .clip_to_screen(screen_w, screen_h)
                    })
                    .collect()
            } else {
                clips.clone()
            };

            let needs_clear = reg
                .bottom()
                .and_then(|wid| reg.get(wid))
                .map(|w| w.hidden || w.anim.is_some())
                .unwrap_or(true);
            if needs_clear {
                fill_rect(
                    backend.backbuffer(),
                    Rect::new(0, 0, screen_w, screen_h),
                    CLEAR_COLOR,
                    &blit_clips,
                );
            }

            for wid in reg.back_to_front() {
                let Some(win) = reg.get(wid) else { continue };
                let preview = pointer.resize_preview().filter(|p| p.wid == wid);
                blit_window(
                    backend.backbuffer(),
                    &mut self.blur_scratch,
                    win,
                    preview,
                    now_ms,
                    &blit_clips,
                    self.blur_kernel,
                );
            }

            self.draw_cursor(backend.backbuffer(), cursor, choice.kind, choice.rotation, &clips);
            backend.present(&clips);
            outcome.rendered = true;
            trace!(target: "compositor.render", clip_count = clips.len(), "frame presented");
        }

        if let Some(kind) = self.screenshot_request.take() {
            outcome.screenshot = self.take_screenshot(kind, backend, reg);
        }

        outcome.closed = reg.sweep_expired(now_ms, shm);
        for closed in &outcome.closed {
            self.damage.mark(closed.damage);
        }
        outcome
    }

    fn draw_cursor(
        &self,
        backbuffer: &mut Surface,
        pos: (i32, i32),
        kind: CursorKind,
        rotation: i32,
        clips: &[Rect],
    ) {
        let sprite = match kind {
            CursorKind::Hidden => return,
            CursorKind::Arrow => &self.sprites.arrow,
            CursorKind::Drag => &self.sprites.drag,
            CursorKind::ResizeV => &self.sprites.resize_v,
            CursorKind::ResizeH => &self.sprites.resize_h,
            CursorKind::ResizeUlDr => &self.sprites.resize_uldr,
            CursorKind::ResizeDlUr => &self.sprites.resize_dlur,
            CursorKind::Point => &self.sprites.point,
            CursorKind::Ibeam => &self.sprites.ibeam,
        };
        let x = pos.0 - CURSOR_HOT_X;
        let y = pos.1 - CURSOR_HOT_Y;
        if rotation != 0 {
            let mut m = Matrix::identity();
            m.translate(x as f64, y as f64);
            let half = CURSOR_SIZE as f64 / 2.0;
            m.translate(half, half);
            m.rotate((rotation as f64).to_radians());
            m.translate(-half, -half);
            blit_transform(backbuffer, sprite_view(sprite), &m, 255, clips);
        } else {
            blit(backbuffer, sprite_view(sprite), x, y, clips);
        }
    }

    fn take_screenshot(
        &mut self,
        kind: ScreenshotKind,
        backend: &mut dyn DisplayBackend,
        reg: &WindowRegistry,
    ) -> Option<PathBuf> {
        let result = match kind {
            ScreenshotKind::Full => {
                let back = backend.backbuffer();
                let view = PixelView::new(back.pixels(), back.width(), back.height());
                write_screenshot(&self.screenshot_dir, view, false)
            }
            ScreenshotKind::Window => {
                let wid = reg.effective_focus()?;
                let win = reg.get(wid)?;
                let region = win.buffer.as_ref()?;
                let view = PixelView::new(as_pixels(region.as_slice()), win.width, win.height);
                write_screenshot(&self.screenshot_dir, view, true)
            }
        };
        match result {
            Ok(path) => Some(path),
            Err(e) => {
                debug!(target: "compositor.render", error = %e, "screenshot failed");
                None
            }
        }
    }
}

fn cursor_rect(pos: (i32, i32)) -> Rect {
    Rect::new(
        pos.0 - CURSOR_HOT_X,
        pos.1 - CURSOR_HOT_Y,
        CURSOR_SIZE,
        CURSOR_SIZE,
    )
}

fn sprite_view(sprite: &CursorSprite) -> PixelView<'_> {
    sprite.surface.view()
}

/// Composite one window into the backbuffer.
///
/// Fast paths first: an untransformed, unanimated, opaque window is a
/// straight embedded-alpha blit; per-window opacity alone stays on the
/// alpha blit path. Rotation, resize previews, animations, and
/// blur-behind build a 2×3 matrix and pay the transform blit, except
/// that a matrix which degenerates to a pure translation is routed back
/// to the cheap path.
fn blit_window(
    backbuffer: &mut Surface,
    blur_scratch: &mut Surface,
    win: &ServerWindow,
    preview: Option<&ResizePreview>,
    now_ms: u64,
    clips: &[Rect],
    blur_kernel: u32,
) {
    if win.hidden {
        return;
    }
    let Some(region) = win.buffer.as_ref() else {
        return;
    };
    let view = PixelView::new(as_pixels(region.as_slice()), win.width, win.height);
    let blur = win.flags.contains(WindowFlags::BLUR_BEHIND);

    let mut opacity_f = win.opacity as f64 / 255.0;

    if win.rotation == 0 && win.anim.is_none() && preview.is_none() && !blur {
        if win.opacity == 255 {
            blit(backbuffer, view, win.x, win.y, clips);
        } else {
            blit_alpha(backbuffer, view, win.x, win.y, win.opacity, clips);
        }
        return;
    }

    let mut m = Matrix::identity();
    m.translate(win.x as f64, win.y as f64);

    if let Some(p) = preview {
        if win.rotation != 0 {
            let cx = p.init_w as f64 / 2.0;
            let cy = p.init_h as f64 / 2.0;
            m.translate(cx, cy);
            m.rotate((win.rotation as f64).to_radians());
            m.translate(-cx, -cy);
        }
        let sx = (p.w as f64 / win.width as f64).max(1e-5);
        let sy = (p.h as f64 / win.height as f64).max(1e-5);
        m.translate(p.offset_x as f64, p.offset_y as f64);
        m.scale(sx, sy);
    } else if win.rotation != 0 {
        let cx = win.width as f64 / 2.0;
        let cy = win.height as f64 / 2.0;
        m.translate(cx, cy);
        m.rotate((win.rotation as f64).to_radians());
        m.translate(-cx, -cy);
    }

    if let Some(anim) = win.anim {
        if anim.expired(now_ms) {
            if win.closing {
                // Hold the last animation frame invisible; the sweep
                // reaps the window after this render.
                return;
            }
        } else {
            let phase = anim.phase(now_ms);
            match anim.mode {
                AnimationMode::SqueezeIn | AnimationMode::SqueezeOut => {
                    let ph = phase.max(1e-5);
                    let t_y = win.height as f64 * (1.0 - ph) / 2.0;
                    m.translate(0.0, t_y);
                    m.scale(1.0, ph);
                }
                AnimationMode::FadeIn | AnimationMode::FadeOut => {
                    opacity_f *= phase;
                    if !win.flags.contains(WindowFlags::ALT_ANIMATION) {
                        let s = 0.75 + phase * 0.25;
                        m.translate(
                            win.width as f64 * (1.0 - s) / 2.0,
                            win.height as f64 * (1.0 - s) / 2.0,
                        );
                        m.scale(s, s);
                    }
                }
                AnimationMode::Disappear => {}
            }
        }
    }

    let opacity = (opacity_f * 255.0).round().clamp(0.0, 255.0) as u8;

    if blur {
        // Blur what's behind the window and composite above the blurred
        // copy wherever the window's own alpha clears the threshold.
        let bounds = win
            .damage_bounds()
            .expand(blur_kernel as i32)
            .clip_to_screen(backbuffer.width(), backbuffer.height());
        box_blur_region(backbuffer, blur_scratch, bounds, blur_kernel);
        blit_transform_blur(
            backbuffer,
            blur_scratch,
            view,
            &m,
            opacity,
            win.alpha_threshold,
            clips,
        );
    } else if m.is_translation() {
        blit_alpha(backbuffer, view, m.0[0][2] as i32, m.0[1][2] as i32, opacity, clips);
    } else {
        blit_transform(backbuffer, view, &m, opacity, clips);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_display::MemoryBackend;
    use core_input::{PointerDispatcher, PointerConfig};
    use core_protocol::WindowFlags;
    use core_shm::{MemoryShm, RegionAllocator};
    use core_windows::WindowRegistry;
    use pretty_assertions::assert_eq;

    fn harness() -> (
        MemoryBackend,
        WindowRegistry,
        PointerDispatcher,
        MemoryShm,
        FrameRenderer,
    ) {
        let dir = std::env::temp_dir();
        (
            MemoryBackend::new(1024, 768),
            WindowRegistry::new("test"),
            PointerDispatcher::new(PointerConfig::default()),
            MemoryShm::new(),
            FrameRenderer::new(1024, 768, 10, dir),
        )
    }

    fn solid_window(
        reg: &mut WindowRegistry,
        shm: &mut MemoryShm,
        w: u32,
        h: u32,
        color: u32,
    ) -> u32 {
        let wid = reg.create(w, h, 1, WindowFlags::NO_ANIMATION, shm).unwrap();
        reg.reveal(wid, 0);
        let win = reg.get_mut(wid).unwrap();
        let bytes = win.buffer.as_mut().unwrap().as_mut_slice();
        for px in core_pixels::as_pixels_mut(bytes) {
            *px = color;
        }
        wid
    }

    #[test]
    fn flipped_window_lands_on_screen() {
        let (mut be, mut reg, ptr, mut shm, mut fr) = harness();
        let wid = solid_window(&mut reg, &mut shm, 300, 200, 0xFFAA0000);
        fr.damage().mark(reg.get(wid).unwrap().damage_bounds());
        let out = fr.render(&mut be, &mut reg, &ptr, &mut shm, 100);
        assert!(out.rendered);
        // Sample away from the cursor overlay in the top-left corner.
        assert_eq!(be.front().get(50, 50), Some(0xFFAA0000));
        assert_eq!(be.front().get(299, 199), Some(0xFFAA0000));
        // Outside the window the cleared background shows.
        assert_eq!(be.front().get(400, 400), Some(CLEAR_COLOR));
    }

    #[test]
    fn no_damage_no_render() {
        let (mut be, mut reg, ptr, mut shm, mut fr) = harness();
        // First render consumes the initial full-screen damage.
        fr.render(&mut be, &mut reg, &ptr, &mut shm, 0);
        let out = fr.render(&mut be, &mut reg, &ptr, &mut shm, 16);
        assert!(!out.rendered);
    }

    #[test]
    fn closing_window_renders_until_duration() {
        let (mut be, mut reg, ptr, mut shm, mut fr) = harness();
        let wid = reg.create(100, 100, 1, WindowFlags::empty(), &mut shm).unwrap();
        reg.reveal(wid, 0);
        {
            let win = reg.get_mut(wid).unwrap();
            let bytes = win.buffer.as_mut().unwrap().as_mut_slice();
            for px in core_pixels::as_pixels_mut(bytes) {
                *px = 0xFF00FF00;
            }
        }
        // Let the opening fade finish, then close at t=1000.
        fr.render(&mut be, &mut reg, &ptr, &mut shm, 500);
        reg.mark_for_close(wid, 1000, &mut shm);

        let out = fr.render(&mut be, &mut reg, &ptr, &mut shm, 1100);
        assert!(out.closed.is_empty());
        assert!(reg.get(wid).is_some());

        // At the animation duration the window is reaped post-render.
        let out = fr.render(&mut be, &mut reg, &ptr, &mut shm, 1000 + 256);
        assert_eq!(out.closed.len(), 1);
        assert!(reg.get(wid).is_none());
        assert_eq!(shm.live_regions(), 0);
    }

    #[test]
    fn cursor_motion_damages_two_spots() {
        let (mut be, mut reg, mut ptr, mut shm, mut fr) = harness();
        fr.render(&mut be, &mut reg, &ptr, &mut shm, 0);
        assert!(fr.damage().is_empty());
        // Move the pointer; the next render repaints both footprints.
        let pkt = core_events::PointerPacket {
            x: 500,
            y: 300,
            buttons: core_protocol::MouseButtons::empty(),
            kind: core_protocol::PointerKind::Absolute,
        };
        let mut out = core_input::Outbox::new();
        ptr.handle_packet(pkt, &mut reg, (1024, 768), 10, &mut out);
        let rendered = fr.render(&mut be, &mut reg, &ptr, &mut shm, 20);
        assert!(rendered.rendered);
        // The arrow sprite's white body is drawn near the new position.
        let lit = (496..520)
            .flat_map(|x| (296..320).map(move |y| (x, y)))
            .filter(|&(x, y)| be.front().get(x, y) == Some(0xFFFFFFFF))
            .count();
        assert!(lit > 0, "cursor sprite not visible");
    }

    #[test]
    fn window_screenshot_preserves_alpha() {
        let (mut be, mut reg, ptr, mut shm, mut fr) = harness();
        let dir = tempfile::tempdir().unwrap();
        fr.screenshot_dir = dir.path().to_path_buf();
        let wid = solid_window(&mut reg, &mut shm, 4, 4, 0x80402010);
        reg.set_focus(Some(wid));
        fr.request_screenshot(ScreenshotKind::Window);
        let out = fr.render(&mut be, &mut reg, &ptr, &mut shm, 50);
        let path = out.screenshot.expect("screenshot path");
        let data = std::fs::read(path).unwrap();
        assert_eq!(data[16], 32);
        assert_eq!(data.len(), 18 + 16 * 4);
    }
}
