//! Named shared-memory regions.
//!
//! Window pixel buffers, preloaded fonts, and the staged clipboard all
//! live in named regions jointly mapped by the server and its clients.
//! The server is the allocator: it creates a region on window creation
//! and on each accepted resize, and releases each region exactly once:
//! on resize completion (old buffer) or final window teardown (current
//! buffer).
//!
//! Region contents are shared with untrusted processes and may change
//! under the server at any time. The accessors hand out plain slices; the
//! server's contract is that it only interprets pixels after the owning
//! client signaled completion (flip / resize-done), so a torn write costs
//! at worst one stale frame.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

#[cfg(unix)]
mod posix;
#[cfg(unix)]
pub use posix::PosixShm;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("region name {0:?} is not representable")]
    BadName(String),
    #[error("creating region {name}: {source}")]
    Create {
        name: String,
        source: std::io::Error,
    },
    #[error("sizing region {name} to {size} bytes: {source}")]
    Size {
        name: String,
        size: usize,
        source: std::io::Error,
    },
    #[error("mapping region {name}: {source}")]
    Map {
        name: String,
        source: std::io::Error,
    },
}

/// `<ident>.buf.<bufid>`: a window pixel buffer.
pub fn buffer_name(ident: &str, bufid: u32) -> String {
    format!("{ident}.buf.{bufid}")
}

/// `<ident>.fonts.<face>`: a preloaded font face.
pub fn font_name(ident: &str, face: &str) -> String {
    format!("{ident}.fonts.{face}")
}

/// `<ident>.clipboard`: staging region for oversized clipboard reads.
pub fn clipboard_name(ident: &str) -> String {
    format!("{ident}.clipboard")
}

/// A mapped region. Dropping the handle unmaps (or drops the in-process
/// backing); it does not unlink the name; that is the allocator's
/// release step.
pub struct SharedRegion {
    name: String,
    ptr: *mut u8,
    len: usize,
    // Keeps in-process backings alive for the lifetime of the mapping.
    _keepalive: Option<Arc<MemBacking>>,
    #[cfg(unix)]
    mapped: bool,
}

// The server is single-threaded, but regions are created on the event
// loop and may be dropped from spawned cleanup paths.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live mapping for the life of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; exclusive &mut self prevents aliased slices
        // on this side of the process boundary.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(unix)]
impl Drop for SharedRegion {
    fn drop(&mut self) {
        if self.mapped {
            // SAFETY: ptr/len came from a successful mmap.
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
            }
        }
    }
}

/// Region provisioning interface: create-or-open by name, unlink by name.
pub trait RegionAllocator {
    fn obtain(&mut self, name: &str, size: usize) -> Result<SharedRegion, ShmError>;
    /// Unlink the name. Safe to call for names that no longer exist.
    fn release(&mut self, name: &str);
}

// -------------------------------------------------------------------------------------------------
// In-process allocator
// -------------------------------------------------------------------------------------------------

/// Heap storage standing in for a kernel shm object. Contents are
/// externally mutable by contract, exactly like a region another
/// process maps, so the bytes live behind an `UnsafeCell`.
struct MemBacking {
    buf: std::cell::UnsafeCell<Box<[u8]>>,
}

unsafe impl Send for MemBacking {}
unsafe impl Sync for MemBacking {}

impl MemBacking {
    fn len(&self) -> usize {
        // SAFETY: the length of the allocation never changes.
        unsafe { (&*self.buf.get()).len() }
    }

    fn ptr(&self) -> *mut u8 {
        // SAFETY: the allocation is stable for the backing's lifetime.
        unsafe { (*self.buf.get()).as_mut_ptr() }
    }
}

/// Heap-backed allocator with shm naming semantics: obtaining an existing
/// name maps the same storage. Used by tests and by nested rendering
/// targets where no second process is involved.
#[derive(Default)]
pub struct MemoryShm {
    regions: HashMap<String, Arc<MemBacking>>,
}

impl MemoryShm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (not yet released) names, for leak assertions.
    pub fn live_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }
}

impl RegionAllocator for MemoryShm {
    fn obtain(&mut self, name: &str, size: usize) -> Result<SharedRegion, ShmError> {
        let backing = self
            .regions
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemBacking {
                    buf: std::cell::UnsafeCell::new(vec![0u8; size].into_boxed_slice()),
                })
            })
            .clone();
        if backing.len() < size {
            return Err(ShmError::Size {
                name: name.to_string(),
                size,
                source: std::io::Error::new(
                    std::io::ErrorKind::OutOfMemory,
                    "existing region is smaller than requested",
                ),
            });
        }
        let ptr = backing.ptr();
        let len = backing.len();
        tracing::trace!(target: "shm", name, len, "obtained in-process region");
        Ok(SharedRegion {
            name: name.to_string(),
            ptr,
            len,
            _keepalive: Some(backing),
            #[cfg(unix)]
            mapped: false,
        })
    }

    fn release(&mut self, name: &str) {
        if self.regions.remove(name).is_some() {
            tracing::trace!(target: "shm", name, "released in-process region");
        }
    }
}
