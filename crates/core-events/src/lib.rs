//! Core event types and channel helpers for the compositor runtime.
//!
//! The event loop uses a bounded mpsc channel sized by
//! `EVENT_CHANNEL_CAP` to provide memory safety and natural producer
//! backpressure. Producers (device readers, the socket listener, the
//! frame timer) use `send().await`, which parks the producing task until
//! space is available rather than dropping events. With a single consumer
//! and a handful of producers, latency stays low and motion fidelity is
//! preserved over lossy drop strategies. Telemetry counters record send
//! failures (closed channel) for inspection in tests and periodic logs.

use std::sync::atomic::AtomicU64;

use tokio::sync::mpsc::{Sender, UnboundedSender};
use tokio::task::JoinHandle;

use core_protocol::{ModMask, MouseButtons, PointerKind};

pub mod keycodes;

pub const EVENT_CHANNEL_CAP: usize = 8192;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Simple atomic counters (no locking, fetch_add relaxed). Intentionally
// minimal; they can be inspected in unit tests or periodically logged.
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static POINTER_PACKETS: AtomicU64 = AtomicU64::new(0);
pub static KEY_PACKETS: AtomicU64 = AtomicU64::new(0);
pub static CLIENT_FRAMES: AtomicU64 = AtomicU64::new(0);

/// Opaque transport endpoint identity. The transport allocates these
/// monotonically; the compositor never interprets the value.
pub type EndpointId = u64;

/// Bytes-out handle for one client connection. Pre-encoded frames are
/// queued without blocking the event loop; a closed receiver simply drops
/// the frame (the client is reaped when the transport reports closure).
pub type ClientTx = UnboundedSender<Vec<u8>>;

/// A raw pointer-device report, already normalized by the device reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerPacket {
    /// Relative: signed deltas in device units. Absolute: coordinates at
    /// display scale.
    pub x: i32,
    pub y: i32,
    pub buttons: MouseButtons,
    pub kind: PointerKind,
}

/// A raw keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPacket {
    pub keycode: u32,
    pub modifiers: ModMask,
    pub pressed: bool,
}

/// Top-level event enum consumed by the central event loop.
#[derive(Debug)]
pub enum Event {
    /// Pointer device report (relative or absolute).
    Pointer(PointerPacket),
    /// Keyboard device report.
    Key(KeyPacket),
    /// A new client connection; `tx` is the write half for outbound
    /// frames.
    ClientConnected { endpoint: EndpointId, tx: ClientTx },
    /// One complete inbound frame from a connected client.
    ClientFrame { endpoint: EndpointId, frame: Vec<u8> },
    /// The transport observed the client's endpoint close.
    ClientClosed { endpoint: EndpointId },
    /// Periodic frame-pacing tick; rendering is gated on elapsed time, not
    /// on tick arrival.
    FrameTick,
    /// The display layer asked for a reconfigure (host resize or signal);
    /// handled at the top of the next frame.
    DisplayReconfigure,
    Shutdown,
}

/// Trait implemented by any async event producer. Implementors usually
/// hold configuration and spawn one background task that pushes `Event`s
/// into the shared channel. On channel send failure (consumer dropped)
/// the task must terminate promptly; it should avoid busy loops by
/// awaiting timers or IO futures.
pub trait EventSource: Send + 'static {
    /// Stable identifier used for logging and diagnostics.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources: collects boxed sources and spawns them all
/// once the runtime channel exists.
#[derive(Default)]
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn EventSource>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: EventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn all registered sources, returning their JoinHandles. Call
    /// after constructing the primary runtime channel and before the
    /// event loop begins consuming. During shutdown the caller should
    /// drop its final `Sender` clone before awaiting the handles so the
    /// sources observe the closed channel and exit cooperatively.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Built-in frame-pacing source: emits `Event::FrameTick` on a fixed
/// interval. The render gate (≥15 ms since the previous frame) lives in
/// the consumer, so jitter here only affects wake-up latency.
pub struct FrameTickSource {
    interval: std::time::Duration,
}

impl FrameTickSource {
    pub fn new(interval: std::time::Duration) -> Self {
        Self { interval }
    }
}

impl EventSource for FrameTickSource {
    fn name(&self) -> &'static str {
        "frame-tick"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(Event::FrameTick).await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct MockOnceSource;

    impl EventSource for MockOnceSource {
        fn name(&self) -> &'static str {
            "mock_once"
        }
        fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
            tokio::spawn(async move {
                let _ = tx.send(Event::DisplayReconfigure).await;
            })
        }
    }

    #[tokio::test]
    async fn registry_spawns_and_emits() {
        let (tx, mut rx) = mpsc::channel::<Event>(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(MockOnceSource);
        reg.register(FrameTickSource::new(Duration::from_millis(5)));
        let handles = reg.spawn_all(&tx);

        let mut got_reconfigure = false;
        let mut got_tick = false;
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(200) && (!got_reconfigure || !got_tick) {
            if let Ok(Some(ev)) = tokio::time::timeout(Duration::from_millis(10), rx.recv()).await
            {
                match ev {
                    Event::DisplayReconfigure => got_reconfigure = true,
                    Event::FrameTick => got_tick = true,
                    _ => {}
                }
            }
        }
        assert!(got_reconfigure, "expected mock source to emit");
        assert!(got_tick, "expected frame tick source to emit");

        drop(tx);
        drop(rx);
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_millis(50), handle).await;
        }
    }

    struct MockCloseSource {
        flag: Arc<AtomicBool>,
    }

    impl EventSource for MockCloseSource {
        fn name(&self) -> &'static str {
            "mock_close"
        }
        fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
            let flag = self.flag;
            tokio::spawn(async move {
                tx.closed().await;
                flag.store(true, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn sources_exit_on_channel_drop() {
        let (tx, rx) = mpsc::channel::<Event>(8);
        let mut reg = EventSourceRegistry::new();
        let flag = Arc::new(AtomicBool::new(false));
        reg.register(MockCloseSource { flag: flag.clone() });
        let handles = reg.spawn_all(&tx);

        drop(tx);
        drop(rx);

        for handle in handles {
            match tokio::time::timeout(Duration::from_millis(100), handle).await {
                Ok(join_res) => join_res.expect("source task should exit cleanly"),
                Err(_) => panic!("source task did not observe channel closure"),
            }
        }
        assert!(flag.load(Ordering::SeqCst));
    }
}
