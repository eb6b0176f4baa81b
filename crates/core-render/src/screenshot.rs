//! Screenshot capture to uncompressed TGA.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use core_pixels::{encode_tga, PixelView};
use tracing::info;

/// Write `view` to `<dir>/screenshot_<timestamp>.tga`. Full-screen
/// captures drop alpha (24 bpp); window captures keep it (32 bpp).
pub fn write_screenshot(dir: &Path, view: PixelView<'_>, with_alpha: bool) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H_%M_%S");
    let path = dir.join(format!("screenshot_{stamp}.tga"));
    let encoded = encode_tga(view, with_alpha);
    std::fs::write(&path, &encoded)
        .with_context(|| format!("writing screenshot to {}", path.display()))?;
    info!(
        target: "compositor.render",
        path = %path.display(),
        bytes = encoded.len(),
        with_alpha,
        "screenshot taken"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_tga_file() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = vec![0xFF804020u32; 4];
        let path = write_screenshot(dir.path(), PixelView::new(&pixels, 2, 2), false).unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 18 + 4 * 3);
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("screenshot_"));
        assert!(path.extension().unwrap() == "tga");
    }
}
