//! Unix-socket transport: size-delimited frames over `SOCK_STREAM`.
//!
//! The listener source accepts connections and gives each one a
//! monotonically allocated endpoint id, a reader task (frames in), and a
//! writer task (frames out through an unbounded queue). A short read is
//! a protocol error and closes the connection; the event loop hears
//! about it as `ClientClosed`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{self, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use core_events::{Event, EventSource, CLIENT_FRAMES};
use core_protocol::{HEADER_LEN, MAX_FRAME_LEN};

static NEXT_ENDPOINT: AtomicU64 = AtomicU64::new(1);

/// Read one complete frame: the 16-byte header, then the remainder
/// announced by its size field. Returns `Ok(None)` on clean EOF at a
/// frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let size = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
    if !(HEADER_LEN..=MAX_FRAME_LEN).contains(&size) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame size {size} outside protocol bounds"),
        ));
    }
    let mut frame = vec![0u8; size];
    frame[..HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Some(frame))
}

/// Accepts client connections on the server socket.
pub struct SocketListenerSource {
    listener: UnixListener,
}

impl SocketListenerSource {
    /// Bind the server socket, replacing a stale file from a previous
    /// run.
    pub fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("binding socket {}", path.display()))?;
        info!(target: "session", path = %path.display(), "listening");
        Ok(SocketListenerSource { listener })
    }
}

impl EventSource for SocketListenerSource {
    fn name(&self) -> &'static str {
        "socket-listener"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    accepted = self.listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(target: "session", error = %e, "accept failed");
                            continue;
                        }
                    },
                    _ = tx.closed() => return,
                };
                let endpoint = NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed);
                spawn_connection(stream, endpoint, tx.clone());
            }
        })
    }
}

/// Start the reader and writer tasks for one accepted connection.
fn spawn_connection(stream: UnixStream, endpoint: u64, tx: Sender<Event>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    // Writer: drain the outbound queue until the server drops its sender
    // or the peer goes away.
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                // Reader side will surface the closure.
                return;
            }
        }
    });

    tokio::spawn(async move {
        if tx
            .send(Event::ClientConnected {
                endpoint,
                tx: out_tx,
            })
            .await
            .is_err()
        {
            return;
        }
        debug!(target: "session", endpoint, "connection established");
        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(frame)) => {
                    CLIENT_FRAMES.fetch_add(1, Ordering::Relaxed);
                    if tx
                        .send(Event::ClientFrame { endpoint, frame })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(target: "session", endpoint, error = %e, "connection error");
                    break;
                }
            }
        }
        let _ = tx.send(Event::ClientClosed { endpoint }).await;
    });
}
