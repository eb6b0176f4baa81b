//! mica entrypoint.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use core_config::Config;
use core_display::{DisplayBackend, MemoryBackend};
use core_events::{
    Event, EventSource, EventSourceRegistry, FrameTickSource, EVENT_CHANNEL_CAP,
};
use core_input::{KeyboardDeviceSource, PointerDeviceSource, PointerDispatcher};
use core_protocol::{Message, PointerKind};
use core_render::FrameRenderer;
use core_shm::{PosixShm, RegionAllocator};

use mica::fonts::load_fonts;
use mica::nested::NestedHost;
use mica::server::{ServerOptions, ServerState, HOST_ENDPOINT};
use mica::transport::SocketListenerSource;
use mica::{socket_path, DEFAULT_IDENT};

const DEFAULT_NEST_W: u32 = 640;
const DEFAULT_NEST_H: u32 = 480;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "mica", version, about = "mica compositor")]
struct Args {
    /// Run nested inside a host compositor.
    #[arg(short = 'n', long = "nested")]
    nested: bool,
    /// Nested framebuffer dimensions as WxH (implies --nested sizing).
    #[arg(short = 'g', long = "geometry")]
    geometry: Option<String>,
    /// Configuration file path (overrides discovery of `mica.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn parse_geometry(spec: &str) -> Option<(u32, u32)> {
    let (w, h) = spec.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = std::path::Path::new(".");
    let log_path = log_dir.join("mica.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, "mica.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => {
            // A global subscriber is already installed; drop the guard so
            // the writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(target: "runtime", info = %panic_info, "panic");
        default_hook(panic_info);
    }));
}

/// Display-reconfigure signal: sets the resize flag for the next frame.
#[cfg(unix)]
struct ReconfigureSignalSource;

#[cfg(unix)]
impl EventSource for ReconfigureSignalSource {
    fn name(&self) -> &'static str {
        "sigwinch"
    }
    fn spawn(self: Box<Self>, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Ok(mut signal) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
            else {
                return;
            };
            while signal.recv().await.is_some() {
                if tx.send(Event::DisplayReconfigure).await.is_err() {
                    return;
                }
            }
        })
    }
}

struct ShutdownSignalSource;

impl EventSource for ShutdownSignalSource {
    fn name(&self) -> &'static str {
        "shutdown-signal"
    }
    fn spawn(self: Box<Self>, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(Event::Shutdown).await;
            }
        })
    }
}

fn open_direct_backend() -> Result<Box<dyn DisplayBackend>> {
    #[cfg(target_os = "linux")]
    {
        return Ok(Box::new(core_display::FramebufferBackend::open("/dev/fb0")?));
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("direct framebuffer output requires Linux; use --nested");
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", nested = args.nested, "startup");

    let host_display = std::env::var("DISPLAY").ok().filter(|d| !d.is_empty());
    if !args.nested && host_display.is_some() {
        eprintln!("DISPLAY is already set but not running nested. This is probably wrong.");
        return ExitCode::from(1);
    }

    let config = match core_config::load_from(args.config.clone()) {
        Ok(c) => c,
        Err(e) => {
            warn!(target: "config", error = %e, "configuration load failed, using defaults");
            Config::default()
        }
    };

    let geometry = args
        .geometry
        .as_deref()
        .and_then(parse_geometry)
        .unwrap_or((DEFAULT_NEST_W, DEFAULT_NEST_H));

    let ident = if args.nested {
        format!("{DEFAULT_IDENT}-nest-{}", std::process::id())
    } else {
        DEFAULT_IDENT.to_string()
    };

    let backend: Box<dyn DisplayBackend> = if args.nested {
        Box::new(MemoryBackend::new(geometry.0, geometry.1))
    } else {
        match open_direct_backend() {
            Ok(backend) => backend,
            Err(e) => {
                error!(target: "display", error = %e, "cannot initialize framebuffer");
                eprintln!("mica: cannot initialize framebuffer: {e}");
                return ExitCode::from(1);
            }
        }
    };

    // Children find us through DISPLAY, exactly like our clients do.
    // SAFETY: single-threaded at this point; the runtime starts below.
    unsafe {
        std::env::set_var("DISPLAY", &ident);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(target: "runtime", error = %e, "runtime construction failed");
            return ExitCode::from(1);
        }
    };

    let code = runtime.block_on(run(args, config, ident, backend, host_display));
    match code {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(target: "runtime", error = %e, "fatal");
            eprintln!("mica: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(
    args: Args,
    config: Config,
    ident: String,
    backend: Box<dyn DisplayBackend>,
    host_display: Option<String>,
) -> Result<u8> {
    let (width, height) = (backend.width(), backend.height());
    let mut shm: Box<dyn RegionAllocator> = Box::new(PosixShm::new());

    let loaded = load_fonts(&config.file.fonts, &ident, shm.as_mut());
    info!(target: "runtime", fonts = loaded, "font provisioning complete");

    let renderer = FrameRenderer::new(
        width,
        height,
        config.file.compositor.blur_kernel,
        config.file.compositor.screenshot_dir.clone(),
    );
    let pointer = PointerDispatcher::new(core_input::PointerConfig {
        edge_snap_px: config.file.compositor.edge_snap_px,
        untile_sensitivity: config.file.compositor.untile_sensitivity,
    });
    let options = ServerOptions {
        resize_grace_ms: config.file.compositor.resize_grace_ms,
    };
    let mut state = ServerState::new(&ident, backend, shm, renderer, pointer, options);

    let (tx, mut rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let mut sources = EventSourceRegistry::new();

    let socket = socket_path(&ident);
    sources.register(SocketListenerSource::bind(&socket)?);
    sources.register(FrameTickSource::new(Duration::from_millis(
        config.file.compositor.frame_interval_ms,
    )));
    sources.register(ShutdownSignalSource);
    #[cfg(unix)]
    sources.register(ReconfigureSignalSource);

    if !args.nested {
        if !config.file.devices.pointer.is_empty() {
            sources.register(PointerDeviceSource::new(
                config.file.devices.pointer.clone(),
                PointerKind::Relative,
            ));
        }
        if !config.file.devices.absolute_pointer.is_empty() {
            sources.register(PointerDeviceSource::new(
                config.file.devices.absolute_pointer.clone(),
                PointerKind::Absolute,
            ));
        }
        if !config.file.devices.keyboard.is_empty() {
            sources.register(KeyboardDeviceSource::new(
                config.file.devices.keyboard.clone(),
            ));
        }
    }

    let source_handles = sources.spawn_all(&tx);

    let mut nested_host = if args.nested {
        let host = host_display.context("nested mode requires DISPLAY from the host")?;
        Some(NestedHost::connect(&host, width, height, tx.clone()).await?)
    } else {
        None
    };

    info!(target: "runtime", ident = ident.as_str(), width, height, "compositor ready");

    let exit_code = loop {
        let Some(event) = rx.recv().await else {
            break 0;
        };
        let now = state.now_ms();
        match event {
            Event::ClientFrame {
                endpoint: HOST_ENDPOINT,
                frame,
            } if nested_host.is_some() => match Message::decode(&frame) {
                Ok(msg) => {
                    if let Some(host) = nested_host.as_mut() {
                        host.handle_host_message(msg, &mut state, now);
                    }
                }
                Err(e) => {
                    warn!(target: "protocol.codec", error = %e, "bad frame from host");
                }
            },
            Event::FrameTick => {
                if state.frame_tick(now) {
                    if let Some(host) = nested_host.as_mut() {
                        host.present(&mut state);
                    }
                }
            }
            other => state.handle_event(other, now),
        }
        if let Some(code) = state.exit_code {
            break code;
        }
    };

    drop(tx);
    for handle in source_handles {
        handle.abort();
    }
    let _ = std::fs::remove_file(&socket);
    info!(target: "runtime", exit_code, "shutdown complete");
    Ok(exit_code.clamp(0, 255) as u8)
}
