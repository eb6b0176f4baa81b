//! Key routing tables: client-registered bindings and the compositor's
//! own chords.
//!
//! Resolution is pure and deterministic: it depends only on the table
//! and the incoming `(modifiers, keycode)` pair. Side effects (message
//! delivery, geometry changes) belong to the dispatcher; logging here is
//! debug/trace only.
//!
//! Routing order for a key event, as the dispatcher applies it:
//! 1. Client bindings: a `Steal` match delivers to its owner and stops;
//!    a `Notify` match delivers and continues.
//! 2. The focused window.
//! 3. Compositor chords, which consume the event without delivery.

use ahash::AHashMap;
use tracing::debug;

use core_events::keycodes;
use core_protocol::{KeyBindResponse, ModMask};

/// Owner identity for a binding (transport endpoint id).
pub type BindOwner = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    pub owner: BindOwner,
    pub response: KeyBindResponse,
}

/// Client-registered global key bindings. Re-binding an existing chord
/// replaces the previous owner (last registration wins).
#[derive(Default)]
pub struct KeyBindTable {
    binds: AHashMap<(u32, u32), KeyBinding>,
}

impl KeyBindTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        modifiers: ModMask,
        keycode: u32,
        owner: BindOwner,
        response: KeyBindResponse,
    ) {
        debug!(
            target: "input.keys",
            ?modifiers,
            keycode,
            owner,
            ?response,
            "key binding registered"
        );
        self.binds
            .insert((modifiers.bits(), keycode), KeyBinding { owner, response });
    }

    pub fn resolve(&self, modifiers: ModMask, keycode: u32) -> Option<KeyBinding> {
        self.binds.get(&(modifiers.bits(), keycode)).copied()
    }

    /// Drop every binding owned by a disconnected client.
    pub fn remove_owner(&mut self, owner: BindOwner) {
        self.binds.retain(|_, b| b.owner != owner);
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }
}

/// A chord the compositor consumes itself, without delivering the key to
/// any client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chord {
    /// Ask the focused window to close (Alt-F4).
    CloseFocused,
    /// Toggle the focused window between a 1×1 tile and its restored
    /// geometry (Alt-F10).
    ToggleTileFull,
    /// Rotate the focused window by a degree delta.
    RotateBy(i32),
    RotateReset,
    ToggleBlur,
    /// Tile the focused window to a grid cell.
    Tile {
        w_div: u32,
        h_div: u32,
        x: u32,
        y: u32,
    },
    Screenshot {
        window: bool,
    },
    /// Escape: abandon an in-progress drag-move.
    CancelDrag,
}

/// Recognize a compositor chord on a key press. Release events never
/// match. The ladder mirrors its historical ordering: rotation and blur
/// debug chords, window management, screenshots, then the tiling grid.
pub fn recognize_chord(keycode: u32, modifiers: ModMask, pressed: bool) -> Option<Chord> {
    if !pressed {
        return None;
    }
    let sup = modifiers.contains(ModMask::SUPER);
    let shift = modifiers.contains(ModMask::SHIFT);
    let ctrl = modifiers.contains(ModMask::CTRL);
    let alt = modifiers.contains(ModMask::ALT);

    if sup && shift {
        match keycode {
            k if k == b'z' as u32 => return Some(Chord::RotateBy(-5)),
            k if k == b'x' as u32 => return Some(Chord::RotateBy(5)),
            k if k == b'c' as u32 => return Some(Chord::RotateReset),
            k if k == b'v' as u32 => return Some(Chord::ToggleBlur),
            _ => {}
        }
    }

    if alt && keycode == keycodes::F10 {
        return Some(Chord::ToggleTileFull);
    }
    if alt && keycode == keycodes::F4 {
        return Some(Chord::CloseFocused);
    }

    if keycode == keycodes::PRINT_SCREEN {
        return Some(Chord::Screenshot { window: shift });
    }

    if keycode == keycodes::ESCAPE && modifiers.is_empty() {
        return Some(Chord::CancelDrag);
    }

    // Tiling grid chords. Shift selects the top quadrants, Ctrl the
    // bottom ones, bare Super the halves.
    if sup {
        let cell = match (shift, ctrl, keycode) {
            (true, _, keycodes::ARROW_LEFT) => Some((2, 2, 0, 0)),
            (true, _, keycodes::ARROW_RIGHT) => Some((2, 2, 1, 0)),
            (false, true, keycodes::ARROW_LEFT) => Some((2, 2, 0, 1)),
            (false, true, keycodes::ARROW_RIGHT) => Some((2, 2, 1, 1)),
            (false, false, keycodes::ARROW_LEFT) => Some((2, 1, 0, 0)),
            (false, false, keycodes::ARROW_RIGHT) => Some((2, 1, 1, 0)),
            (false, false, keycodes::ARROW_UP) => Some((1, 2, 0, 0)),
            (false, false, keycodes::ARROW_DOWN) => Some((1, 2, 0, 1)),
            _ => None,
        };
        if let Some((w_div, h_div, x, y)) = cell {
            return Some(Chord::Tile { w_div, h_div, x, y });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bind_and_resolve() {
        let mut table = KeyBindTable::new();
        let mods = ModMask::CTRL | ModMask::ALT;
        table.bind(mods, b'a' as u32, 7, KeyBindResponse::Steal);
        let bind = table.resolve(mods, b'a' as u32).unwrap();
        assert_eq!(bind.owner, 7);
        assert_eq!(bind.response, KeyBindResponse::Steal);
        // Different modifier set does not match.
        assert!(table.resolve(ModMask::CTRL, b'a' as u32).is_none());
    }

    #[test]
    fn rebind_replaces_owner() {
        let mut table = KeyBindTable::new();
        table.bind(ModMask::ALT, b'q' as u32, 1, KeyBindResponse::Notify);
        table.bind(ModMask::ALT, b'q' as u32, 2, KeyBindResponse::Steal);
        assert_eq!(table.resolve(ModMask::ALT, b'q' as u32).unwrap().owner, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_owner_prunes_only_theirs() {
        let mut table = KeyBindTable::new();
        table.bind(ModMask::ALT, b'q' as u32, 1, KeyBindResponse::Notify);
        table.bind(ModMask::ALT, b'w' as u32, 2, KeyBindResponse::Notify);
        table.remove_owner(1);
        assert!(table.resolve(ModMask::ALT, b'q' as u32).is_none());
        assert!(table.resolve(ModMask::ALT, b'w' as u32).is_some());
    }

    #[test]
    fn chords_require_press() {
        assert_eq!(
            recognize_chord(keycodes::F4, ModMask::ALT, false),
            None
        );
        assert_eq!(
            recognize_chord(keycodes::F4, ModMask::ALT, true),
            Some(Chord::CloseFocused)
        );
    }

    #[test]
    fn rotation_and_blur_chords() {
        let mods = ModMask::SUPER | ModMask::SHIFT;
        assert_eq!(
            recognize_chord(b'z' as u32, mods, true),
            Some(Chord::RotateBy(-5))
        );
        assert_eq!(
            recognize_chord(b'x' as u32, mods, true),
            Some(Chord::RotateBy(5))
        );
        assert_eq!(
            recognize_chord(b'c' as u32, mods, true),
            Some(Chord::RotateReset)
        );
        assert_eq!(
            recognize_chord(b'v' as u32, mods, true),
            Some(Chord::ToggleBlur)
        );
    }

    #[test]
    fn tiling_grid_chords() {
        assert_eq!(
            recognize_chord(keycodes::ARROW_LEFT, ModMask::SUPER, true),
            Some(Chord::Tile {
                w_div: 2,
                h_div: 1,
                x: 0,
                y: 0
            })
        );
        assert_eq!(
            recognize_chord(keycodes::ARROW_RIGHT, ModMask::SUPER | ModMask::SHIFT, true),
            Some(Chord::Tile {
                w_div: 2,
                h_div: 2,
                x: 1,
                y: 0
            })
        );
        assert_eq!(
            recognize_chord(keycodes::ARROW_LEFT, ModMask::SUPER | ModMask::CTRL, true),
            Some(Chord::Tile {
                w_div: 2,
                h_div: 2,
                x: 0,
                y: 1
            })
        );
        assert_eq!(
            recognize_chord(keycodes::ARROW_DOWN, ModMask::SUPER, true),
            Some(Chord::Tile {
                w_div: 1,
                h_div: 2,
                x: 0,
                y: 1
            })
        );
    }

    #[test]
    fn screenshots_and_escape() {
        assert_eq!(
            recognize_chord(keycodes::PRINT_SCREEN, ModMask::empty(), true),
            Some(Chord::Screenshot { window: false })
        );
        assert_eq!(
            recognize_chord(keycodes::PRINT_SCREEN, ModMask::SHIFT, true),
            Some(Chord::Screenshot { window: true })
        );
        assert_eq!(
            recognize_chord(keycodes::ESCAPE, ModMask::empty(), true),
            Some(Chord::CancelDrag)
        );
    }

    #[test]
    fn plain_keys_do_not_match() {
        assert_eq!(recognize_chord(b'a' as u32, ModMask::empty(), true), None);
        assert_eq!(
            recognize_chord(keycodes::ARROW_LEFT, ModMask::empty(), true),
            None
        );
    }
}
