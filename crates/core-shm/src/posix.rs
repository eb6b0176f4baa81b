//! POSIX shared-memory allocator: `shm_open` + `ftruncate` + `mmap`.

use std::ffi::CString;

use crate::{RegionAllocator, SharedRegion, ShmError};

/// Allocator over the system shm namespace. Region names are prefixed
/// with `/` as `shm_open` requires; dots in the conventional names are
/// preserved.
#[derive(Default)]
pub struct PosixShm;

impl PosixShm {
    pub fn new() -> Self {
        PosixShm
    }

    fn cname(name: &str) -> Result<CString, ShmError> {
        CString::new(format!("/{name}")).map_err(|_| ShmError::BadName(name.to_string()))
    }
}

impl RegionAllocator for PosixShm {
    fn obtain(&mut self, name: &str, size: usize) -> Result<SharedRegion, ShmError> {
        let cname = Self::cname(name)?;

        // SAFETY: cname is a valid NUL-terminated string; the fd is
        // checked before use and closed after mapping.
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(ShmError::Create {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }

        let rc = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if rc != 0 {
            let source = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(ShmError::Size {
                name: name.to_string(),
                size,
                source,
            });
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if ptr == libc::MAP_FAILED {
            return Err(ShmError::Map {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }

        tracing::debug!(target: "shm", name, size, "mapped shared region");
        Ok(SharedRegion {
            name: name.to_string(),
            ptr: ptr as *mut u8,
            len: size,
            _keepalive: None,
            mapped: true,
        })
    }

    fn release(&mut self, name: &str) {
        if let Ok(cname) = Self::cname(name) {
            // Unlink failures are expected when the name is already gone.
            let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
            if rc == 0 {
                tracing::debug!(target: "shm", name, "unlinked shared region");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obtain_write_reopen_read() {
        let name = format!("mica-test-{}", std::process::id());
        let mut shm = PosixShm::new();
        {
            let mut region = shm.obtain(&name, 64).unwrap();
            region.as_mut_slice()[10] = 0x5A;
        }
        let region = shm.obtain(&name, 64).unwrap();
        assert_eq!(region.as_slice()[10], 0x5A);
        shm.release(&name);
    }
}
