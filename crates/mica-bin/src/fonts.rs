//! Font provisioning: copy configured font files into well-known shared
//! regions so clients can map faces read-only by conventional name.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use core_shm::{font_name, RegionAllocator};

/// Load every configured face into `<ident>.fonts.<face>`. Missing or
/// unreadable files are logged and skipped; the regions outlive this
/// call because the allocator keeps the names linked for clients.
pub fn load_fonts(
    fonts: &BTreeMap<String, PathBuf>,
    ident: &str,
    shm: &mut dyn RegionAllocator,
) -> usize {
    let mut loaded = 0;
    for (face, path) in fonts {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(target: "runtime", face, path = %path.display(), error = %e, "font unavailable");
                continue;
            }
        };
        let name = font_name(ident, face);
        match shm.obtain(&name, bytes.len()) {
            Ok(mut region) => {
                region.as_mut_slice()[..bytes.len()].copy_from_slice(&bytes);
                info!(target: "runtime", face, region = name.as_str(), bytes = bytes.len(), "font preloaded");
                loaded += 1;
            }
            Err(e) => {
                warn!(target: "runtime", face, error = %e, "font region allocation failed");
            }
        }
    }
    loaded
}
