//! End-to-end server scenarios over the in-memory display and
//! shared-memory backends: each test drives the dispatcher exactly the
//! way the transport would and asserts on the frames that come back.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use core_display::{DisplayBackend, MemoryBackend};
use core_events::{Event, KeyPacket, PointerPacket};
use core_input::{PointerConfig, PointerDispatcher};
use core_protocol::{
    KeyBindResponse, Message, ModMask, MouseButtons, MouseCommand, PointerKind, TileEdges,
    WindowFlags, WID_NONE,
};
use core_render::FrameRenderer;
use core_shm::MemoryShm;
use mica::server::{ServerOptions, ServerState};

const W: u32 = 1024;
const H: u32 = 768;

struct TestClient {
    endpoint: u64,
    rx: UnboundedReceiver<Vec<u8>>,
}

impl TestClient {
    fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            out.push(Message::decode(&frame).expect("server sent a valid frame"));
        }
        out
    }
}

fn server() -> ServerState {
    let backend = Box::new(MemoryBackend::new(W, H));
    let shm = Box::new(MemoryShm::new());
    let renderer = FrameRenderer::new(W, H, 10, PathBuf::from("/tmp"));
    let pointer = PointerDispatcher::new(PointerConfig::default());
    ServerState::new(
        "test",
        backend,
        shm,
        renderer,
        pointer,
        ServerOptions::default(),
    )
}

fn connect(state: &mut ServerState, endpoint: u64) -> TestClient {
    let (tx, rx) = mpsc::unbounded_channel();
    state.handle_event(Event::ClientConnected { endpoint, tx }, 0);
    state.handle_event(
        Event::ClientFrame {
            endpoint,
            frame: Message::Hello.encode(),
        },
        0,
    );
    TestClient { endpoint, rx }
}

fn send(state: &mut ServerState, client: &TestClient, msg: Message, now: u64) {
    state.handle_event(
        Event::ClientFrame {
            endpoint: client.endpoint,
            frame: msg.encode(),
        },
        now,
    );
}

/// Paint the window's shared buffer a solid color through the server's
/// own mapping (tests stand in for the client side of the region).
fn paint(state: &mut ServerState, wid: u32, color: u32) {
    let win = state.reg.get_mut(wid).expect("window exists");
    let bytes = win.buffer.as_mut().expect("buffer mapped").as_mut_slice();
    for px in core_pixels::as_pixels_mut(bytes) {
        *px = color;
    }
}

#[test]
fn create_flip_focus() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    let hello = c.drain();
    assert_eq!(
        hello,
        vec![Message::Welcome {
            width: 1024,
            height: 768
        }]
    );

    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 300,
            height: 200,
            flags: WindowFlags::empty(),
        },
        0,
    );
    let replies = c.drain();
    assert!(replies.contains(&Message::WindowInit {
        wid: 1,
        width: 300,
        height: 200,
        bufid: 1
    }));
    // A fresh window without NO_STEAL_FOCUS takes focus immediately.
    assert!(replies.contains(&Message::WindowFocusChange {
        wid: 1,
        focused: true
    }));

    paint(&mut state, 1, 0xFFAA5500);
    send(&mut state, &c, Message::Flip { wid: 1 }, 0);

    // The window opened with a fade-in; past its duration the frame must
    // contain the window's pixels at (0,0)..(300,200).
    state.frame_tick(1000);
    let back = state.backend.backbuffer();
    assert_eq!(back.get(50, 50), Some(0xFFAA5500));
    assert_eq!(back.get(299, 199), Some(0xFFAA5500));
    assert_ne!(back.get(301, 201), Some(0xFFAA5500));
}

#[test]
fn three_way_resize() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 300,
            height: 200,
            flags: WindowFlags::empty(),
        },
        0,
    );
    c.drain();

    // Client-initiated: the request is echoed back as an offer.
    send(
        &mut state,
        &c,
        Message::ResizeRequest {
            wid: 1,
            width: 400,
            height: 300,
        },
        10,
    );
    assert_eq!(
        c.drain(),
        vec![Message::ResizeOffer {
            wid: 1,
            width: 400,
            height: 300,
            tile: TileEdges::empty()
        }]
    );

    send(
        &mut state,
        &c,
        Message::ResizeAccept {
            wid: 1,
            width: 400,
            height: 300,
        },
        20,
    );
    assert_eq!(
        c.drain(),
        vec![Message::ResizeBufid {
            wid: 1,
            width: 400,
            height: 300,
            bufid: 2
        }]
    );

    // A duplicate accept returns the same pending bufid.
    send(
        &mut state,
        &c,
        Message::ResizeAccept {
            wid: 1,
            width: 400,
            height: 300,
        },
        25,
    );
    assert_eq!(
        c.drain(),
        vec![Message::ResizeBufid {
            wid: 1,
            width: 400,
            height: 300,
            bufid: 2
        }]
    );

    send(
        &mut state,
        &c,
        Message::ResizeDone {
            wid: 1,
            width: 400,
            height: 300,
        },
        30,
    );
    let win = state.reg.get(1).unwrap();
    assert_eq!((win.width, win.height), (400, 300));
    assert_eq!(win.bufid, 2);
    assert_eq!(win.newbufid, 0);
    assert!(win.new_buffer.is_none());
}

#[test]
fn drag_produces_down_drag_raise() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 300,
            height: 200,
            flags: WindowFlags::empty(),
        },
        0,
    );
    paint(&mut state, 1, 0xFFFFFFFF);
    send(&mut state, &c, Message::Flip { wid: 1 }, 0);
    c.drain();

    let press = PointerPacket {
        x: 50,
        y: 50,
        buttons: MouseButtons::LEFT,
        kind: PointerKind::Absolute,
    };
    state.handle_event(Event::Pointer(press), 100);
    let move_pkt = PointerPacket {
        x: 70,
        y: 60,
        buttons: MouseButtons::LEFT,
        kind: PointerKind::Absolute,
    };
    state.handle_event(Event::Pointer(move_pkt), 110);
    let release = PointerPacket {
        x: 70,
        y: 60,
        buttons: MouseButtons::empty(),
        kind: PointerKind::Absolute,
    };
    state.handle_event(Event::Pointer(release), 120);

    let events: Vec<(MouseCommand, i32, i32, i32, i32)> = c
        .drain()
        .into_iter()
        .filter_map(|m| match m {
            Message::WindowMouseEvent {
                command,
                x,
                y,
                old_x,
                old_y,
                ..
            } => Some((command, x, y, old_x, old_y)),
            _ => None,
        })
        .collect();

    assert_eq!(events[0], (MouseCommand::Down, 50, 50, -1, -1));
    assert!(events.contains(&(MouseCommand::Drag, 70, 60, 50, 50)));
    assert!(events.contains(&(MouseCommand::Raise, 70, 60, 50, 50)));
    assert!(!events.iter().any(|e| e.0 == MouseCommand::Click));
}

#[test]
fn edge_drag_tiles_left() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 300,
            height: 200,
            flags: WindowFlags::empty(),
        },
        0,
    );
    paint(&mut state, 1, 0xFFFFFFFF);
    send(&mut state, &c, Message::Flip { wid: 1 }, 0);
    send(&mut state, &c, Message::WindowMove { wid: 1, x: 100, y: 100 }, 0);
    c.drain();

    // Hold ALT and press inside the window, then drag to the left edge.
    state.handle_event(
        Event::Key(KeyPacket {
            keycode: 0,
            modifiers: ModMask::ALT,
            pressed: true,
        }),
        50,
    );
    state.handle_event(
        Event::Pointer(PointerPacket {
            x: 150,
            y: 150,
            buttons: MouseButtons::LEFT,
            kind: PointerKind::Absolute,
        }),
        60,
    );
    state.handle_event(
        Event::Pointer(PointerPacket {
            x: 5,
            y: 150,
            buttons: MouseButtons::LEFT,
            kind: PointerKind::Absolute,
        }),
        70,
    );

    let offer = c
        .drain()
        .into_iter()
        .find_map(|m| match m {
            Message::ResizeOffer {
                width,
                height,
                tile,
                ..
            } => Some((width, height, tile)),
            _ => None,
        })
        .expect("tiling resize offer");
    assert_eq!(offer.0, 512);
    assert_eq!(offer.1, 768);
    assert!(offer.2.contains(TileEdges::LEFT | TileEdges::UP | TileEdges::DOWN));
    assert!(!offer.2.contains(TileEdges::RIGHT));
}

#[test]
fn key_bind_steal_bypasses_focus() {
    let mut state = server();
    let mut focused_client = connect(&mut state, 1);
    let mut binder = connect(&mut state, 2);
    send(
        &mut state,
        &focused_client,
        Message::WindowNew {
            width: 100,
            height: 100,
            flags: WindowFlags::empty(),
        },
        0,
    );
    focused_client.drain();

    send(
        &mut state,
        &binder,
        Message::KeyBind {
            keycode: b'a' as u32,
            modifiers: ModMask::CTRL | ModMask::ALT,
            response: KeyBindResponse::Steal,
        },
        0,
    );
    binder.drain();

    state.handle_event(
        Event::Key(KeyPacket {
            keycode: b'a' as u32,
            modifiers: ModMask::CTRL | ModMask::ALT,
            pressed: true,
        }),
        100,
    );

    let to_binder = binder.drain();
    assert_eq!(to_binder.len(), 1);
    match &to_binder[0] {
        Message::KeyEvent { wid, keycode, .. } => {
            assert_eq!(*keycode, b'a' as u32);
            // The focused wid rides along so the binder knows context.
            assert_eq!(*wid, 1);
        }
        other => panic!("unexpected message {other:?}"),
    }
    // The focused client hears nothing.
    assert!(focused_client
        .drain()
        .iter()
        .all(|m| !matches!(m, Message::KeyEvent { .. })));
}

#[test]
fn bound_key_without_focus_uses_sentinel_wid() {
    let mut state = server();
    let mut binder = connect(&mut state, 2);
    send(
        &mut state,
        &binder,
        Message::KeyBind {
            keycode: b'k' as u32,
            modifiers: ModMask::SUPER,
            response: KeyBindResponse::Steal,
        },
        0,
    );
    binder.drain();

    state.handle_event(
        Event::Key(KeyPacket {
            keycode: b'k' as u32,
            modifiers: ModMask::SUPER,
            pressed: true,
        }),
        10,
    );
    let msgs = binder.drain();
    assert!(matches!(
        msgs[0],
        Message::KeyEvent { wid, .. } if wid == WID_NONE
    ));
}

#[test]
fn closing_animation_reaps_and_notifies() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    let mut observer = connect(&mut state, 2);
    send(&mut state, &observer, Message::Subscribe, 0);

    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 100,
            height: 100,
            flags: WindowFlags::empty(),
        },
        0,
    );
    paint(&mut state, 1, 0xFF00AA00);
    send(&mut state, &c, Message::Flip { wid: 1 }, 0);
    state.frame_tick(500);
    c.drain();
    observer.drain();

    // Close at t=1000: the fade-out runs 256 ms.
    send(&mut state, &c, Message::WindowClose { wid: 1 }, 1000);
    state.frame_tick(1100);
    assert!(state.reg.get(1).is_some(), "window renders through its fade-out");

    state.frame_tick(1000 + 256);
    assert!(state.reg.get(1).is_none(), "window reaped at duration");

    let notifies = observer
        .drain()
        .into_iter()
        .filter(|m| matches!(m, Message::Notify))
        .count();
    assert!(notifies >= 1, "subscriber notified of the closure");
}

#[test]
fn owner_mismatch_is_ignored() {
    let mut state = server();
    let mut owner = connect(&mut state, 1);
    let mut intruder = connect(&mut state, 2);
    send(
        &mut state,
        &owner,
        Message::WindowNew {
            width: 100,
            height: 100,
            flags: WindowFlags::empty(),
        },
        0,
    );
    owner.drain();

    send(&mut state, &intruder, Message::WindowMove { wid: 1, x: 50, y: 50 }, 10);
    send(&mut state, &intruder, Message::WindowClose { wid: 1 }, 10);
    intruder.drain();

    let win = state.reg.get(1).expect("window untouched");
    assert_eq!((win.x, win.y), (0, 0));
    assert!(!win.closing);
}

#[test]
fn out_of_range_move_is_refused() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 100,
            height: 100,
            flags: WindowFlags::empty(),
        },
        0,
    );
    c.drain();

    send(
        &mut state,
        &c,
        Message::WindowMove {
            wid: 1,
            x: 3000,
            y: 0,
        },
        10,
    );
    assert_eq!((state.reg.get(1).unwrap().x, state.reg.get(1).unwrap().y), (0, 0));

    // A merely generous move within one display is allowed.
    send(
        &mut state,
        &c,
        Message::WindowMove {
            wid: 1,
            x: 1100,
            y: 100,
        },
        20,
    );
    assert_eq!(state.reg.get(1).unwrap().x, 1100);
}

#[test]
fn last_disconnect_ends_session() {
    let mut state = server();
    let mut a = connect(&mut state, 1);
    let _b = connect(&mut state, 2);
    send(
        &mut state,
        &a,
        Message::WindowNew {
            width: 10,
            height: 10,
            flags: WindowFlags::empty(),
        },
        0,
    );
    a.drain();

    state.handle_event(Event::ClientClosed { endpoint: 1 }, 100);
    assert!(state.exit_code.is_none(), "one client remains");

    state.handle_event(Event::ClientClosed { endpoint: 2 }, 200);
    assert_eq!(state.exit_code, Some(0));
}

#[test]
fn clipboard_round_trip() {
    let mut state = server();
    let mut writer = connect(&mut state, 1);
    let mut reader = connect(&mut state, 2);
    send(
        &mut state,
        &writer,
        Message::Clipboard {
            content: b"copy me".to_vec(),
        },
        0,
    );
    writer.drain();
    reader.drain();

    send(
        &mut state,
        &reader,
        Message::SpecialRequest {
            wid: 0,
            request: core_protocol::SpecialRequestKind::ClipboardRead,
        },
        10,
    );
    let msgs = reader.drain();
    assert_eq!(
        msgs,
        vec![Message::Clipboard {
            content: b"copy me".to_vec()
        }]
    );
}

#[test]
fn tile_toggle_restores_pretile_geometry() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 300,
            height: 200,
            flags: WindowFlags::empty(),
        },
        0,
    );
    send(&mut state, &c, Message::WindowMove { wid: 1, x: 120, y: 80 }, 0);
    c.drain();

    // Alt-F10 tiles to the full usable area.
    state.handle_event(
        Event::Key(KeyPacket {
            keycode: core_events::keycodes::F10,
            modifiers: ModMask::ALT,
            pressed: true,
        }),
        10,
    );
    let offer = c
        .drain()
        .into_iter()
        .find_map(|m| match m {
            Message::ResizeOffer { width, height, .. } => Some((width, height)),
            _ => None,
        })
        .expect("tile offer");
    assert_eq!(offer, (1024, 768));
    assert_eq!((state.reg.get(1).unwrap().x, state.reg.get(1).unwrap().y), (0, 0));

    // A second Alt-F10 restores the saved geometry: position directly,
    // size via an offer for the pre-tile dimensions.
    state.handle_event(
        Event::Key(KeyPacket {
            keycode: core_events::keycodes::F10,
            modifiers: ModMask::ALT,
            pressed: true,
        }),
        20,
    );
    let offer = c
        .drain()
        .into_iter()
        .find_map(|m| match m {
            Message::ResizeOffer { width, height, tile, .. } => Some((width, height, tile)),
            _ => None,
        })
        .expect("untile offer");
    assert_eq!((offer.0, offer.1), (300, 200));
    assert_eq!(offer.2, TileEdges::empty());
    let win = state.reg.get(1).unwrap();
    assert_eq!((win.x, win.y), (120, 80));
    assert!(win.tiled.is_none());
}

#[test]
fn registry_and_session_indices_stay_consistent() {
    let mut state = server();
    let mut a = connect(&mut state, 1);
    let mut b = connect(&mut state, 2);
    for _ in 0..3 {
        send(
            &mut state,
            &a,
            Message::WindowNew {
                width: 50,
                height: 50,
                flags: WindowFlags::empty(),
            },
            0,
        );
    }
    send(
        &mut state,
        &b,
        Message::WindowNew {
            width: 50,
            height: 50,
            flags: WindowFlags::NO_ANIMATION,
        },
        0,
    );
    send(&mut state, &b, Message::WindowStack { wid: 4, z: core_protocol::ZBand::Menu }, 0);
    send(&mut state, &a, Message::WindowStack { wid: 1, z: core_protocol::ZBand::Bottom }, 0);
    send(&mut state, &a, Message::WindowClose { wid: 2 }, 0);
    a.drain();
    b.drain();
    state.frame_tick(5_000);

    // Every window sits in exactly one band position and the stacking
    // order never duplicates a wid.
    let order = state.reg.back_to_front();
    let mut dedup = order.clone();
    dedup.sort_unstable();
    dedup.dedup();
    assert_eq!(order.len(), dedup.len());

    // The closed window is gone from the registry and the focus target
    // is a live window.
    assert!(state.reg.get(2).is_none());
    if let Some(focused) = state.reg.focused() {
        assert!(state.reg.get(focused).is_some());
        assert_ne!(Some(focused), state.reg.bottom());
    }
}

#[test]
fn query_windows_lists_advertised_and_terminates() {
    let mut state = server();
    let mut c = connect(&mut state, 1);
    send(
        &mut state,
        &c,
        Message::WindowNew {
            width: 100,
            height: 100,
            flags: WindowFlags::empty(),
        },
        0,
    );
    send(
        &mut state,
        &c,
        Message::WindowAdvertise {
            wid: 1,
            flags: 0,
            icon: 7,
            bufid: 0,
            width: 0,
            height: 0,
            strings: b"App\0app".to_vec(),
        },
        0,
    );
    c.drain();

    send(&mut state, &c, Message::QueryWindows, 10);
    let ads: Vec<Message> = c
        .drain()
        .into_iter()
        .filter(|m| matches!(m, Message::WindowAdvertise { .. }))
        .collect();
    assert_eq!(ads.len(), 2, "one advertisement plus the terminator");
    match &ads[0] {
        Message::WindowAdvertise {
            wid,
            flags,
            icon,
            strings,
            ..
        } => {
            assert_eq!(*wid, 1);
            // Bit 0 marks the focused window.
            assert_eq!(*flags & 1, 1);
            assert_eq!(*icon, 7);
            assert_eq!(strings, b"App\0app");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        ads[1],
        Message::WindowAdvertise {
            wid: 0,
            flags: 0,
            icon: 0,
            bufid: 0,
            width: 0,
            height: 0,
            strings: Vec::new()
        }
    );
}
