//! Configuration loading and parsing.
//!
//! Parses `mica.toml` (or an override path provided by the binary). Every
//! field is defaulted, so an absent or unparsable file yields a fully
//! working compositor; a parse error falls back to defaults rather than
//! refusing to start. Unknown fields are ignored (TOML deserialization
//! tolerance) to allow forward evolution without immediate warnings.

use std::path::PathBuf;
use std::{collections::BTreeMap, fs};

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

/// Timing and interaction tunables.
#[derive(Debug, Deserialize, Clone)]
pub struct CompositorConfig {
    /// Frame timer period in milliseconds. Rendering is additionally
    /// gated on 15 ms having elapsed since the previous frame.
    #[serde(default = "CompositorConfig::default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Box blur kernel radius for blur-behind windows.
    #[serde(default = "CompositorConfig::default_blur_kernel")]
    pub blur_kernel: u32,
    /// Distance (pixels) from a screen edge that triggers tiling during a
    /// drag-move.
    #[serde(default = "CompositorConfig::default_edge_snap_px")]
    pub edge_snap_px: i32,
    /// Drag distance (in 10×-scaled pointer units) past which a tiled
    /// window pops out of its tile.
    #[serde(default = "CompositorConfig::default_untile_sensitivity")]
    pub untile_sensitivity: i32,
    /// Grace period (ms) after an interactive resize release in which the
    /// client may still deliver its finished buffer.
    #[serde(default = "CompositorConfig::default_resize_grace_ms")]
    pub resize_grace_ms: u64,
    /// Directory screenshots are written into.
    #[serde(default = "CompositorConfig::default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

impl CompositorConfig {
    const fn default_frame_interval_ms() -> u64 {
        16
    }
    const fn default_blur_kernel() -> u32 {
        10
    }
    const fn default_edge_snap_px() -> i32 {
        10
    }
    const fn default_untile_sensitivity() -> i32 {
        40
    }
    const fn default_resize_grace_ms() -> u64 {
        500
    }
    fn default_screenshot_dir() -> PathBuf {
        PathBuf::from("/tmp")
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: Self::default_frame_interval_ms(),
            blur_kernel: Self::default_blur_kernel(),
            edge_snap_px: Self::default_edge_snap_px(),
            untile_sensitivity: Self::default_untile_sensitivity(),
            resize_grace_ms: Self::default_resize_grace_ms(),
            screenshot_dir: Self::default_screenshot_dir(),
        }
    }
}

/// Input device paths. Empty strings disable a device.
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "DeviceConfig::default_pointer")]
    pub pointer: String,
    #[serde(default = "DeviceConfig::default_keyboard")]
    pub keyboard: String,
    /// Optional absolute-coordinate pointer (tablets, virtualized mice).
    #[serde(default)]
    pub absolute_pointer: String,
}

impl DeviceConfig {
    fn default_pointer() -> String {
        "/dev/input/mice".into()
    }
    fn default_keyboard() -> String {
        "/dev/input/kbd".into()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            pointer: Self::default_pointer(),
            keyboard: Self::default_keyboard(),
            absolute_pointer: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub compositor: CompositorConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    /// Font face identifier → file path, preloaded into shared memory at
    /// startup so clients can map them by conventional name.
    #[serde(default = "default_fonts")]
    pub fonts: BTreeMap<String, PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile {
            compositor: CompositorConfig::default(),
            devices: DeviceConfig::default(),
            fonts: default_fonts(),
        }
    }
}

fn default_fonts() -> BTreeMap<String, PathBuf> {
    const FONT_DIR: &str = "/usr/share/fonts/truetype/dejavu";
    [
        ("sans-serif", "DejaVuSans.ttf"),
        ("sans-serif.bold", "DejaVuSans-Bold.ttf"),
        ("sans-serif.italic", "DejaVuSans-Oblique.ttf"),
        ("sans-serif.bolditalic", "DejaVuSans-BoldOblique.ttf"),
        ("monospace", "DejaVuSansMono.ttf"),
        ("monospace.bold", "DejaVuSansMono-Bold.ttf"),
        ("monospace.italic", "DejaVuSansMono-Oblique.ttf"),
        ("monospace.bolditalic", "DejaVuSansMono-BoldOblique.ttf"),
    ]
    .into_iter()
    .map(|(id, file)| (id.to_string(), PathBuf::from(FONT_DIR).join(file)))
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
    /// Path the config was loaded from, when one existed.
    pub source: Option<PathBuf>,
}

/// Best-effort config path following platform conventions: prefer a local
/// working-directory `mica.toml`, then the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("mica.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("mica").join("mica.toml");
    }
    PathBuf::from("mica.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "loaded configuration");
                Ok(Config {
                    file,
                    source: Some(path),
                })
            }
            Err(e) => {
                warn!(
                    target: "config",
                    path = %path.display(),
                    error = %e,
                    "config parse failed, using defaults"
                );
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}
