//! # Anonymous Virtual-Memory Reservation
//!
//! One contiguous anonymous mapping backs the whole page pool. The mapping
//! reserves address space up front; physical memory is committed lazily by
//! the OS on first touch and handed back with `madvise(MADV_DONTNEED)` when
//! an arena is decommitted. After a decommit the kernel guarantees
//! zero-fill-on-demand for the next touch.
//!
//! The span hands out raw pointers because block images must stay readable
//! while other threads mutate allocator bookkeeping. Aliasing discipline is
//! enforced one level up: the pool only allows `&[u8]` views of a block
//! after its state transition to `ready`, and only writes through the
//! pointer while the block is in `loading` state with no readers.

use eyre::{ensure, Result, WrapErr};
use memmap2::{MmapMut, MmapOptions};

use crate::config::ARENA_SIZE;

pub struct VmSpan {
    map: MmapMut,
    len: usize,
}

impl VmSpan {
    /// Reserves `len` bytes of address space. `len` must be a whole number
    /// of arenas.
    pub fn reserve(len: usize) -> Result<Self> {
        ensure!(len > 0, "cannot reserve an empty span");
        ensure!(
            len % ARENA_SIZE == 0,
            "reservation {} is not a multiple of the arena size {}",
            len,
            ARENA_SIZE
        );

        let map = MmapOptions::new()
            .len(len)
            .map_anon()
            .wrap_err_with(|| format!("failed to reserve {} bytes of address space", len))?;

        Ok(Self { map, len })
    }

    pub fn base(&self) -> *mut u8 {
        self.map.as_ptr() as *mut u8
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the physical pages of `[offset, offset + size)` to the OS.
    /// The range stays reserved and reads as zero after the next touch.
    pub fn decommit(&self, offset: usize, size: usize) {
        debug_assert!(offset % ARENA_SIZE == 0);
        debug_assert!(offset + size <= self.len);

        #[cfg(unix)]
        // SAFETY: the range is inside the live mapping (asserted above) and
        // MADV_DONTNEED on an anonymous private mapping cannot fault; it
        // only drops the backing pages.
        unsafe {
            libc::madvise(
                self.base().add(offset) as *mut libc::c_void,
                size,
                libc::MADV_DONTNEED,
            );
        }
    }

    /// Hints the kernel that `[offset, offset + size)` will be touched soon.
    pub fn will_need(&self, offset: usize, size: usize) {
        debug_assert!(offset + size <= self.len);

        #[cfg(unix)]
        // SAFETY: the range is inside the live mapping; MADV_WILLNEED is
        // advisory and has no failure mode we act on.
        unsafe {
            libc::madvise(
                self.base().add(offset) as *mut libc::c_void,
                size,
                libc::MADV_WILLNEED,
            );
        }
    }
}

impl std::fmt::Debug for VmSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmSpan").field("len", &self.len).finish()
    }
}
