//! Mapping the shared motion ring.
//!
//! Two backings: the reserved physical window via `/dev/mem` (the real
//! board), or a plain file (software-in-the-loop rigs, where brain and
//! muscle daemons share a page in /dev/shm).

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

use anyhow::{bail, Context, Result};
use log::info;

use s13_ring::{MotionRing, RING_BYTES};

const MAP_LEN: usize = 4096;

pub struct MappedRing {
    ptr: *mut MotionRing,
}

// The pointer is to a shared mapping that lives until drop; the ring
// itself is all atomics.
unsafe impl Send for MappedRing {}
unsafe impl Sync for MappedRing {}

impl MappedRing {
    /// Map the reserved physical window through `/dev/mem`.
    pub fn map_phys(phys_base: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/mem")
            .context("open /dev/mem (are you root?)")?;
        let mapped = Self::mmap(file.as_raw_fd(), phys_base as libc::off_t)?;
        info!("motion ring mapped at phys {:#x}", phys_base);
        Ok(mapped)
    }

    /// Map (and size) a regular file, e.g. `/dev/shm/s13-ring`.
    pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("open ring file {}", path.as_ref().display()))?;
        file.set_len(MAP_LEN as u64)
            .context("size ring file")?;
        let mapped = Self::mmap(file.as_raw_fd(), 0)?;
        info!("motion ring mapped from {}", path.as_ref().display());
        Ok(mapped)
    }

    fn mmap(fd: libc::c_int, offset: libc::off_t) -> Result<Self> {
        const _: () = assert!(RING_BYTES <= MAP_LEN);

        // SAFETY: MAP_LEN is page-sized and validated against the ring
        // layout above; the fd stays open only for the call (the mapping
        // survives close).
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                MAP_LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            bail!("mmap failed: {}", std::io::Error::last_os_error());
        }
        Ok(Self {
            ptr: ptr.cast::<MotionRing>(),
        })
    }

    /// The typed view. The reference is valid for the life of the
    /// mapping; daemons that hand it to threads leak the `MappedRing`
    /// once at startup to make it `'static`.
    pub fn ring(&self) -> &MotionRing {
        // SAFETY: the mapping is MAP_SHARED, page-aligned and at least
        // RING_BYTES long; MotionRing is repr(C) atomics only.
        unsafe { &*self.ptr }
    }
}

impl Drop for MappedRing {
    fn drop(&mut self) {
        // SAFETY: ptr came from our own mmap of MAP_LEN bytes.
        unsafe {
            libc::munmap(self.ptr.cast(), MAP_LEN);
        }
    }
}
