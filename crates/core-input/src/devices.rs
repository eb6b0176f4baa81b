//! Input device readers.
//!
//! Each device file yields fixed-size little-endian records which the
//! readers normalize into runtime events. A missing or failing device
//! logs and ends its task; the compositor keeps running with whatever
//! devices it has (nested mode injects input over the wire instead).
//!
//! Record layouts:
//! * pointer: `dx: i16, dy: i16, buttons: u8, _pad: [u8; 3]` (absolute
//!   devices carry coordinates in the same fields at 1× scale);
//! * keyboard: `keycode: u32, modifiers: u32, pressed: u8, _pad: [u8; 3]`.

use std::sync::atomic::Ordering::Relaxed;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use core_events::{Event, EventSource, KeyPacket, PointerPacket, KEY_PACKETS, POINTER_PACKETS};
use core_protocol::{ModMask, MouseButtons, PointerKind};

const POINTER_RECORD: usize = 8;
const KEY_RECORD: usize = 12;

pub struct PointerDeviceSource {
    path: String,
    kind: PointerKind,
}

impl PointerDeviceSource {
    pub fn new(path: impl Into<String>, kind: PointerKind) -> Self {
        PointerDeviceSource {
            path: path.into(),
            kind,
        }
    }
}

impl EventSource for PointerDeviceSource {
    fn name(&self) -> &'static str {
        "pointer-device"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut file = match tokio::fs::File::open(&self.path).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(target: "input.pointer", path = %self.path, error = %e, "pointer device unavailable");
                    return;
                }
            };
            info!(target: "input.pointer", path = %self.path, kind = ?self.kind, "pointer device opened");
            let mut buf = [0u8; POINTER_RECORD];
            loop {
                if let Err(e) = file.read_exact(&mut buf).await {
                    warn!(target: "input.pointer", path = %self.path, error = %e, "pointer device closed");
                    return;
                }
                let packet = PointerPacket {
                    x: i16::from_le_bytes([buf[0], buf[1]]) as i32,
                    y: i16::from_le_bytes([buf[2], buf[3]]) as i32,
                    buttons: MouseButtons::from_bits_truncate(buf[4]),
                    kind: self.kind,
                };
                POINTER_PACKETS.fetch_add(1, Relaxed);
                if tx.send(Event::Pointer(packet)).await.is_err() {
                    return;
                }
            }
        })
    }
}

pub struct KeyboardDeviceSource {
    path: String,
}

impl KeyboardDeviceSource {
    pub fn new(path: impl Into<String>) -> Self {
        KeyboardDeviceSource { path: path.into() }
    }
}

impl EventSource for KeyboardDeviceSource {
    fn name(&self) -> &'static str {
        "keyboard-device"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut file = match tokio::fs::File::open(&self.path).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(target: "input.keys", path = %self.path, error = %e, "keyboard device unavailable");
                    return;
                }
            };
            info!(target: "input.keys", path = %self.path, "keyboard device opened");
            let mut buf = [0u8; KEY_RECORD];
            loop {
                if let Err(e) = file.read_exact(&mut buf).await {
                    warn!(target: "input.keys", path = %self.path, error = %e, "keyboard device closed");
                    return;
                }
                let packet = KeyPacket {
                    keycode: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
                    modifiers: ModMask::from_bits_truncate(u32::from_le_bytes([
                        buf[4], buf[5], buf[6], buf[7],
                    ])),
                    pressed: buf[8] != 0,
                };
                KEY_PACKETS.fetch_add(1, Relaxed);
                if tx.send(Event::Key(packet)).await.is_err() {
                    return;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::EventSourceRegistry;
    use std::io::Write;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn pointer_records_parse() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        // dx=3, dy=-2, left button.
        f.write_all(&3i16.to_le_bytes()).unwrap();
        f.write_all(&(-2i16).to_le_bytes()).unwrap();
        f.write_all(&[0x01, 0, 0, 0]).unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(PointerDeviceSource::new(
            f.path().to_string_lossy().to_string(),
            PointerKind::Relative,
        ));
        let _handles = reg.spawn_all(&tx);

        let ev = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        match ev {
            Event::Pointer(p) => {
                assert_eq!(p.x, 3);
                assert_eq!(p.y, -2);
                assert_eq!(p.buttons, MouseButtons::LEFT);
                assert_eq!(p.kind, PointerKind::Relative);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn keyboard_records_parse() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&(b'a' as u32).to_le_bytes()).unwrap();
        f.write_all(&ModMask::CTRL.bits().to_le_bytes()).unwrap();
        f.write_all(&[1, 0, 0, 0]).unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(KeyboardDeviceSource::new(
            f.path().to_string_lossy().to_string(),
        ));
        let _handles = reg.spawn_all(&tx);

        let ev = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        match ev {
            Event::Key(k) => {
                assert_eq!(k.keycode, b'a' as u32);
                assert_eq!(k.modifiers, ModMask::CTRL);
                assert!(k.pressed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_device_is_nonfatal() {
        let (tx, _rx) = mpsc::channel(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(PointerDeviceSource::new(
            "/nonexistent/pointer",
            PointerKind::Relative,
        ));
        for handle in reg.spawn_all(&tx) {
            tokio::time::timeout(Duration::from_millis(200), handle)
                .await
                .expect("task should exit promptly")
                .expect("task should not panic");
        }
    }
}
