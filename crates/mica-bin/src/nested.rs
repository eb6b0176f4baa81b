//! Nested mode: run the whole compositor as a client of a host
//! compositor.
//!
//! The server composites into an in-memory backend; after each rendered
//! frame the backbuffer is copied into a window on the host and flipped.
//! Host input events are injected into the normal dispatch path, so the
//! nested instance behaves exactly like a direct one from its own
//! clients' perspective. A host resize offer is accepted immediately and
//! applied through the display-reconfigure path.

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, Sender, UnboundedSender};
use tracing::{debug, info, warn};

use core_display::DisplayBackend;
use core_events::{Event, KeyPacket, PointerPacket};
use core_protocol::{BufId, Message, PointerKind, Wid};
use core_shm::{buffer_name, PosixShm, RegionAllocator, SharedRegion};

use crate::server::{ServerState, HOST_ENDPOINT};
use crate::{socket_path, transport};

pub struct NestedHost {
    host_ident: String,
    conn_tx: UnboundedSender<Vec<u8>>,
    host_shm: PosixShm,
    wid: Option<Wid>,
    bufid: BufId,
    region: Option<SharedRegion>,
    width: u32,
    height: u32,
}

impl NestedHost {
    /// Connect to the host named by `host_ident` (the inherited DISPLAY
    /// value), create our output window, and start pumping host frames
    /// into the runtime channel as `HOST_ENDPOINT` client frames.
    pub async fn connect(
        host_ident: &str,
        width: u32,
        height: u32,
        events: Sender<Event>,
    ) -> Result<Self> {
        let path = socket_path(host_ident);
        let stream = UnixStream::connect(&path)
            .await
            .with_context(|| format!("connecting to host compositor at {}", path.display()))?;
        info!(target: "runtime", host = host_ident, "connected to host compositor");

        let (mut read_half, mut write_half) = stream.into_split();
        let (conn_tx, mut conn_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(async move {
            while let Some(frame) = conn_rx.recv().await {
                if write_half.write_all(&frame).await.is_err() {
                    return;
                }
            }
        });

        tokio::spawn(async move {
            loop {
                match transport::read_frame(&mut read_half).await {
                    Ok(Some(frame)) => {
                        if events
                            .send(Event::ClientFrame {
                                endpoint: HOST_ENDPOINT,
                                frame,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) | Err(_) => {
                        // Host went away: treat as session end.
                        let _ = events.send(Event::Shutdown).await;
                        return;
                    }
                }
            }
        });

        let host = NestedHost {
            host_ident: host_ident.to_string(),
            conn_tx,
            host_shm: PosixShm::new(),
            wid: None,
            bufid: 0,
            region: None,
            width,
            height,
        };
        host.send(&Message::Hello);
        host.send(&Message::WindowNew {
            width,
            height,
            flags: core_protocol::WindowFlags::empty(),
        });
        Ok(host)
    }

    fn send(&self, msg: &Message) {
        if self.conn_tx.send(msg.encode()).is_err() {
            warn!(target: "runtime", "host connection writer gone");
        }
    }

    fn map_buffer(&mut self, bufid: BufId, width: u32, height: u32) {
        let name = buffer_name(&self.host_ident, bufid);
        match self.host_shm.obtain(&name, (width * height * 4) as usize) {
            Ok(region) => {
                self.bufid = bufid;
                self.region = Some(region);
                self.width = width;
                self.height = height;
            }
            Err(e) => {
                warn!(target: "shm", error = %e, "mapping host window buffer failed");
            }
        }
    }

    /// Handle one message from the host compositor. Host input is
    /// injected into the ordinary dispatch path; everything else drives
    /// our client-side half of the host protocol.
    pub fn handle_host_message(&mut self, msg: Message, state: &mut ServerState, now_ms: u64) {
        match msg {
            Message::Welcome { .. } => {}
            Message::WindowInit {
                wid,
                width,
                height,
                bufid,
            } => {
                debug!(target: "runtime", wid, width, height, bufid, "host window ready");
                self.wid = Some(wid);
                self.map_buffer(bufid, width, height);
            }
            Message::KeyEvent {
                keycode,
                modifiers,
                pressed,
                ..
            } => {
                state.handle_key(
                    KeyPacket {
                        keycode,
                        modifiers,
                        pressed,
                    },
                    now_ms,
                );
            }
            Message::WindowMouseEvent { x, y, buttons, .. } => {
                state.handle_pointer(
                    PointerPacket {
                        x,
                        y,
                        buttons,
                        kind: PointerKind::Absolute,
                    },
                    now_ms,
                );
            }
            Message::MouseEvent {
                x, y, buttons, kind, ..
            } => {
                state.handle_pointer(
                    PointerPacket {
                        x,
                        y,
                        buttons,
                        kind,
                    },
                    now_ms,
                );
            }
            Message::ResizeOffer { wid, width, height, .. } => {
                debug!(target: "runtime", width, height, "host resize offer");
                self.send(&Message::ResizeAccept { wid, width, height });
            }
            Message::ResizeBufid {
                wid,
                width,
                height,
                bufid,
            } => {
                self.map_buffer(bufid, width, height);
                self.send(&Message::ResizeDone { wid, width, height });
                state.backend.request_mode(width, height);
                state.request_display_resize();
            }
            Message::WindowClose { .. } | Message::SessionEnd => {
                info!(target: "runtime", "host session ended");
                state.broadcast(&Message::SessionEnd);
                state.exit_code = Some(0);
            }
            other => {
                debug!(target: "runtime", msg_type = other.msg_type(), "unhandled host message");
            }
        }
    }

    /// Copy the composited frame into the host window and flip it. Also
    /// drains any frames the server queued for the host endpoint.
    pub fn present(&mut self, state: &mut ServerState) {
        for frame in state.host_outbound.drain(..) {
            if self.conn_tx.send(frame).is_err() {
                return;
            }
        }
        let Some(wid) = self.wid else { return };
        let Some(region) = self.region.as_mut() else {
            return;
        };

        let back = state.backend.backbuffer();
        let copy_w = back.width().min(self.width);
        let copy_h = back.height().min(self.height);
        let dst = core_pixels::as_pixels_mut(region.as_mut_slice());
        for row in 0..copy_h {
            let src_start = (row * back.width()) as usize;
            let dst_start = (row * self.width) as usize;
            dst[dst_start..dst_start + copy_w as usize]
                .copy_from_slice(&back.pixels()[src_start..src_start + copy_w as usize]);
        }
        self.send(&Message::Flip { wid });
    }
}
