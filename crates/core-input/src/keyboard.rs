//! Keyboard routing.
//!
//! Order of precedence for each key event: compositor chords (consumed
//! without delivery), then client-registered bindings (a Steal match
//! stops routing, a Notify match continues), then the focused window.
//! Screenshot chords are the exception: they trigger the capture and
//! still let the key travel to bindings and focus.

use tracing::trace;

use core_events::KeyPacket;
use core_keymap::{recognize_chord, Chord, KeyBindTable};
use core_protocol::{KeyBindResponse, Message, WindowFlags, WID_NONE};
use core_windows::WindowRegistry;

use crate::outbox::Outbox;
use crate::pointer::{tile_window, untile_window, move_window, PointerDispatcher, PointerState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenshotKind {
    Full,
    Window,
}

/// What the frame loop must pick up after a key event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    pub screenshot: Option<ScreenshotKind>,
}

pub fn route_key(
    pkt: KeyPacket,
    binds: &KeyBindTable,
    reg: &mut WindowRegistry,
    pointer: &mut PointerDispatcher,
    screen: (u32, u32),
    out: &mut Outbox,
) -> KeyOutcome {
    pointer.set_modifiers(pkt.modifiers);
    let mut outcome = KeyOutcome::default();
    let focused = reg.effective_focus();

    if focused.is_some() {
        if let Some(chord) = recognize_chord(pkt.keycode, pkt.modifiers, pkt.pressed) {
            trace!(target: "input.keys", ?chord, "compositor chord");
            if apply_chord(chord, reg, pointer, screen, out, &mut outcome) {
                return outcome;
            }
        }
    }

    // Client-registered global bindings.
    if let Some(bind) = binds.resolve(pkt.modifiers, pkt.keycode) {
        out.send(
            bind.owner,
            Message::KeyEvent {
                wid: focused.unwrap_or(WID_NONE),
                keycode: pkt.keycode,
                modifiers: pkt.modifiers,
                pressed: pkt.pressed,
            },
        );
        if bind.response == KeyBindResponse::Steal {
            return outcome;
        }
    }

    // Finally, the focused client.
    if let Some(wid) = focused {
        if let Some(win) = reg.get(wid) {
            out.send(
                win.owner,
                Message::KeyEvent {
                    wid,
                    keycode: pkt.keycode,
                    modifiers: pkt.modifiers,
                    pressed: pkt.pressed,
                },
            );
        }
    }
    outcome
}

/// Execute a chord. Returns true when the key was consumed (no further
/// routing); chords that miss their preconditions fall through.
fn apply_chord(
    chord: Chord,
    reg: &mut WindowRegistry,
    pointer: &mut PointerDispatcher,
    screen: (u32, u32),
    out: &mut Outbox,
    outcome: &mut KeyOutcome,
) -> bool {
    let Some(focused) = reg.effective_focus() else {
        return false;
    };
    let movable = reg
        .get(focused)
        .map(|w| !w.is_singleton_band())
        .unwrap_or(false);

    match chord {
        Chord::RotateBy(delta) => {
            if let Some(win) = reg.get(focused) {
                out.damage(win.damage_bounds());
            }
            if let Some(win) = reg.get_mut(focused) {
                win.rotation += delta;
            }
            if let Some(win) = reg.get(focused) {
                out.damage(win.damage_bounds());
            }
            true
        }
        Chord::RotateReset => {
            if let Some(win) = reg.get(focused) {
                out.damage(win.damage_bounds());
            }
            if let Some(win) = reg.get_mut(focused) {
                win.rotation = 0;
            }
            true
        }
        Chord::ToggleBlur => {
            if movable {
                if let Some(win) = reg.get_mut(focused) {
                    win.flags.toggle(WindowFlags::BLUR_BEHIND);
                }
                if let Some(win) = reg.get(focused) {
                    out.damage(win.damage_bounds());
                }
            }
            true
        }
        Chord::ToggleTileFull => {
            if !movable {
                return false;
            }
            let tiled = reg.get(focused).map(|w| w.tiled.is_some()).unwrap_or(false);
            if tiled {
                if let Some(restore) = untile_window(reg, focused, out) {
                    move_window(reg, focused, restore.x, restore.y, out);
                }
            } else {
                tile_window(reg, focused, 1, 1, 0, 0, screen, out);
            }
            true
        }
        Chord::CloseFocused => {
            if !movable {
                return false;
            }
            if let Some(win) = reg.get(focused) {
                out.send(win.owner, Message::WindowClose { wid: focused });
            }
            true
        }
        Chord::Tile { w_div, h_div, x, y } => {
            if !movable {
                return false;
            }
            tile_window(reg, focused, w_div, h_div, x, y, screen, out);
            true
        }
        Chord::Screenshot { window } => {
            outcome.screenshot = Some(if window {
                ScreenshotKind::Window
            } else {
                ScreenshotKind::Full
            });
            // Screenshots do not consume the key.
            false
        }
        Chord::CancelDrag => {
            if pointer.state() == PointerState::Moving {
                pointer.cancel_drag(out);
                true
            } else {
                false
            }
        }
    }
}
