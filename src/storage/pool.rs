//! # Buffered Page Pool
//!
//! Demand-paged cache over one database file. Pages live in 64KB blocks
//! (one block = one disk extent = eight pages) carved out of the arena
//! allocator's reservation, so a single extent-aligned read fills a whole
//! block and neighboring pages come along for free.
//!
//! ## Block states
//!
//! ```text
//!            alloc              read done            evict pick
//!  empty ──────────> loading ─────────────> ready ──────────────> evicting
//!    ^                  │ read failed          │                      │
//!    └──────────────────┴──────────────────────┴──────────────────────┘
//!                                   release
//! ```
//!
//! The extent map and the arena allocator share one mutex; block state
//! flags are atomics so a ready block is recognized without re-checking the
//! map, and the `loading -> ready` transition is a release-store paired
//! with acquire-loads on readers. Concurrent loaders of the same extent
//! rendezvous on a condvar: the first one reads the file, the rest wait for
//! readiness.
//!
//! ## Pinning
//!
//! [`PageRef`] pins its block for its lifetime; eviction only considers
//! unpinned ready blocks and picks the oldest access stamp. Pins are
//! acquired under the map lock (so eviction's pins==0 check cannot race a
//! new pin) and dropped lock-free.
//!
//! Block metadata lives in a flat side table indexed by block id; the map
//! stores indices, never pointers, so the map/block cycle is index-based.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::config::{BLOCK_SIZE, EXTENT_PAGES, PAGE_SIZE, PoolConfig};
use crate::error::EngineError;
use crate::memory::{ArenaAllocator, VmSpan};
use crate::storage::file::DataFile;
use crate::storage::page::{verify_self_id, PageLocator, PageView};

const STATE_EMPTY: u8 = 0;
const STATE_LOADING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_EVICTING: u8 = 3;

/// Counters the pool reports to its stats sink. Never process-global: the
/// caller owns the sink and threads it in explicitly.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub page_loads: AtomicU64,
    pub extent_reads: AtomicU64,
    pub bytes_read: AtomicU64,
    pub evictions: AtomicU64,
    pub load_waits: AtomicU64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            page_loads: self.page_loads.load(Ordering::Relaxed),
            extent_reads: self.extent_reads.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            load_waits: self.load_waits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub page_loads: u64,
    pub extent_reads: u64,
    pub bytes_read: u64,
    pub evictions: u64,
    pub load_waits: u64,
}

#[derive(Debug)]
struct BlockMeta {
    state: AtomicU8,
    stamp: AtomicU32,
    pins: AtomicU32,
}

impl BlockMeta {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_EMPTY),
            stamp: AtomicU32::new(0),
            pins: AtomicU32::new(0),
        }
    }
}

#[derive(Debug)]
struct PoolShared {
    arena: ArenaAllocator,
    map: HashMap<u32, u32>,
}

pub struct PagePool {
    file: DataFile,
    config: PoolConfig,
    stats: Arc<PoolStats>,
    shared: Mutex<PoolShared>,
    loaded: Condvar,
    blocks: Box<[BlockMeta]>,
    base_addr: usize,
    clock: AtomicU32,
    pinned_blocks: AtomicUsize,
}

impl PagePool {
    pub fn open(file: DataFile, config: PoolConfig) -> Result<Self> {
        Self::with_stats(file, config, Arc::new(PoolStats::default()))
    }

    pub fn with_stats(file: DataFile, config: PoolConfig, stats: Arc<PoolStats>) -> Result<Self> {
        config.validate()?;
        let vm = VmSpan::reserve(config.reserve_bytes)?;
        let base_addr = vm.base() as usize;
        let arena = ArenaAllocator::new(vm);
        let block_capacity = arena.block_capacity();
        let blocks: Box<[BlockMeta]> = (0..block_capacity).map(|_| BlockMeta::new()).collect();

        let pool = Self {
            file,
            config,
            stats,
            shared: Mutex::new(PoolShared {
                arena,
                map: HashMap::new(),
            }),
            loaded: Condvar::new(),
            blocks,
            base_addr,
            clock: AtomicU32::new(0),
            pinned_blocks: AtomicUsize::new(0),
        };

        if pool.config.warm_all {
            pool.warm_all();
        }
        Ok(pool)
    }

    pub fn file(&self) -> &DataFile {
        &self.file
    }

    pub fn page_count(&self) -> u32 {
        self.file.page_count()
    }

    pub fn stats(&self) -> &Arc<PoolStats> {
        &self.stats
    }

    /// Number of extents currently resident.
    pub fn loaded_extents(&self) -> usize {
        self.shared.lock().map.len()
    }

    /// Loads (or finds) the page with the given index and pins it.
    ///
    /// Fatal conditions: out-of-range indices, read failures, and a page
    /// whose self-recorded id disagrees with the request.
    pub fn load(&self, page: u32) -> Result<PageRef<'_>> {
        if page >= self.file.page_count() {
            eyre::bail!(EngineError::corruption(
                PageLocator::new(page, 1),
                format!("page index beyond the file ({} pages)", self.file.page_count())
            ));
        }
        self.stats.page_loads.fetch_add(1, Ordering::Relaxed);

        let extent = page / EXTENT_PAGES as u32;
        let block = self.ensure_extent(extent, true)?;

        // Speculative over-read of following extents, never pinned and
        // never fatal: a miss amortizes seek cost, nothing more.
        for ahead in 1..self.config.readahead_extents as u32 {
            let next = extent + ahead;
            if next >= self.file.extent_count() {
                break;
            }
            if self.ensure_extent(next, false).is_err() {
                break;
            }
        }

        let page_ref = PageRef {
            pool: self,
            block,
            page,
        };
        verify_self_id(page_ref.data(), PageLocator::new(page, 1)).inspect_err(|_| {
            debug!(page, "self-id verification failed");
        })?;
        Ok(page_ref)
    }

    /// Loads the page a locator names. The null locator is rejected.
    pub fn load_locator(&self, loc: PageLocator) -> Result<PageRef<'_>> {
        if loc.is_null() {
            eyre::bail!(EngineError::corruption(
                loc,
                "attempt to load the null locator".to_string()
            ));
        }
        self.load(loc.page)
    }

    fn block_ptr(&self, block: u32) -> *mut u8 {
        (self.base_addr + block as usize * BLOCK_SIZE) as *mut u8
    }

    fn ensure_extent(&self, extent: u32, pin: bool) -> Result<u32> {
        let mut shared = self.shared.lock();
        loop {
            if let Some(&block) = shared.map.get(&extent) {
                let meta = &self.blocks[block as usize];
                match meta.state.load(Ordering::Acquire) {
                    STATE_READY => {
                        if pin {
                            self.pin_block(block)?;
                        }
                        meta.stamp
                            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
                        return Ok(block);
                    }
                    _ => {
                        // A concurrent loader or evictor owns the block;
                        // rendezvous and re-check the map.
                        self.stats.load_waits.fetch_add(1, Ordering::Relaxed);
                        self.loaded.wait(&mut shared);
                        continue;
                    }
                }
            }

            let block = match shared.arena.alloc_block() {
                Ok(block) => block,
                Err(err) => match self.evict_one(&mut shared) {
                    Some(_) => shared.arena.alloc_block()?,
                    None => return Err(err),
                },
            };

            let meta = &self.blocks[block as usize];
            meta.state.store(STATE_LOADING, Ordering::Release);
            shared.map.insert(extent, block);
            drop(shared);

            trace!(extent, block, "reading extent from file");
            let read = {
                // SAFETY: the block was just allocated and is in `loading`
                // state, so this thread is its only accessor until the
                // release-store below publishes it.
                let buf = unsafe {
                    std::slice::from_raw_parts_mut(self.block_ptr(block), BLOCK_SIZE)
                };
                self.file.read_extent(extent, buf)
            };

            shared = self.shared.lock();
            match read {
                Ok(len) => {
                    self.stats.extent_reads.fetch_add(1, Ordering::Relaxed);
                    self.stats.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
                    meta.stamp
                        .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
                    meta.state.store(STATE_READY, Ordering::Release);
                    // Wake waiters before the pin-limit check can bail.
                    self.loaded.notify_all();
                    if pin {
                        self.pin_block(block)?;
                    }
                    return Ok(block);
                }
                Err(err) => {
                    shared.map.remove(&extent);
                    meta.state.store(STATE_EMPTY, Ordering::Release);
                    shared.arena.release(block);
                    self.loaded.notify_all();
                    return Err(err);
                }
            }
        }
    }

    /// Picks the oldest-stamped unpinned ready block, detaches it from the
    /// map and returns it to the arena. Caller holds the lock.
    fn evict_one(&self, shared: &mut PoolShared) -> Option<u32> {
        let victim = shared
            .map
            .iter()
            .filter_map(|(&extent, &block)| {
                let meta = &self.blocks[block as usize];
                if meta.state.load(Ordering::Acquire) == STATE_READY
                    && meta.pins.load(Ordering::Acquire) == 0
                {
                    Some((meta.stamp.load(Ordering::Relaxed), extent, block))
                } else {
                    None
                }
            })
            .min_by_key(|&(stamp, _, _)| stamp);

        let (_, extent, block) = victim?;
        let meta = &self.blocks[block as usize];
        meta.state.store(STATE_EVICTING, Ordering::Release);
        shared.map.remove(&extent);
        shared.arena.release(block);
        meta.state.store(STATE_EMPTY, Ordering::Release);
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(extent, block, "evicted extent");
        Some(block)
    }

    fn pin_block(&self, block: u32) -> Result<()> {
        let meta = &self.blocks[block as usize];
        let prev = meta.pins.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            let pinned = self.pinned_blocks.fetch_add(1, Ordering::AcqRel) + 1;
            if pinned > self.config.max_pinned_blocks {
                meta.pins.fetch_sub(1, Ordering::AcqRel);
                self.pinned_blocks.fetch_sub(1, Ordering::AcqRel);
                eyre::bail!(EngineError::BadAlloc {
                    requested: BLOCK_SIZE,
                    reserved: self.config.max_pinned_blocks * BLOCK_SIZE,
                });
            }
        }
        Ok(())
    }

    fn unpin_block(&self, block: u32) {
        let meta = &self.blocks[block as usize];
        let prev = meta.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin of unpinned block {}", block);
        if prev == 1 {
            self.pinned_blocks.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn warm_all(&self) {
        debug!(extents = self.file.extent_count(), "warming the pool");
        for extent in 0..self.file.extent_count() {
            {
                let shared = self.shared.lock();
                if shared.arena.allocated_blocks() >= shared.arena.block_capacity() {
                    break;
                }
            }
            if self.ensure_extent(extent, false).is_err() {
                break;
            }
        }
    }
}

// SAFETY: the raw base address is derived from the VmSpan owned (through
// the arena) by this pool and is valid for the pool's lifetime. All shared
// mutation goes through the mutex or the per-block atomics.
unsafe impl Send for PagePool {}
unsafe impl Sync for PagePool {}

impl std::fmt::Debug for PagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePool")
            .field("file", &self.file.path())
            .field("pages", &self.file.page_count())
            .finish()
    }
}

/// Pinned, immutable page image. Dropping the last reference to a block
/// makes it evictable again.
pub struct PageRef<'a> {
    pool: &'a PagePool,
    block: u32,
    page: u32,
}

impl<'a> PageRef<'a> {
    pub fn page_index(&self) -> u32 {
        self.page
    }

    pub fn locator(&self) -> PageLocator {
        PageLocator::new(self.page, 1)
    }

    pub fn data(&self) -> &[u8] {
        let offset = (self.page as usize % EXTENT_PAGES) * PAGE_SIZE;
        // SAFETY: the block is pinned and ready while this ref lives, and
        // ready blocks are never written; the returned slice cannot outlive
        // the pin because it borrows `self`. The offset stays inside the
        // block (page % EXTENT_PAGES < EXTENT_PAGES).
        unsafe {
            std::slice::from_raw_parts(self.pool.block_ptr(self.block).add(offset), PAGE_SIZE)
        }
    }

    pub fn view(&self) -> PageView<'_> {
        PageView::new(self.data()).expect("pool pages are page-sized")
    }
}

impl Clone for PageRef<'_> {
    fn clone(&self) -> Self {
        // The block already carries this ref's pin, so the count cannot be
        // zero and the pin limit cannot be newly exceeded.
        self.pool.blocks[self.block as usize]
            .pins
            .fetch_add(1, Ordering::AcqRel);
        Self {
            pool: self.pool,
            block: self.block,
            page: self.page,
        }
    }
}

impl Drop for PageRef<'_> {
    fn drop(&mut self) {
        self.pool.unpin_block(self.block);
    }
}

impl std::fmt::Debug for PageRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRef").field("page", &self.page).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ARENA_SIZE;
    use crate::storage::page::test_page::PageBuilder;
    use crate::storage::page::PageType;
    use std::io::Write;

    /// Writes a file of `pages` data pages with correct self-ids.
    fn build_file(dir: &tempfile::TempDir, pages: u32) -> DataFile {
        let path = dir.path().join("pool.mdf");
        let mut f = std::fs::File::create(&path).unwrap();
        for p in 0..pages {
            let mut page = PageBuilder::new(PageType::Data, PageLocator::new(p, 1)).build();
            page[PAGE_SIZE - 1] = (p & 0xFF) as u8; // distinct tail byte
            f.write_all(&page).unwrap();
        }
        f.flush().unwrap();
        DataFile::open(path).unwrap()
    }

    fn small_pool(pages: u32, reserve: usize) -> (tempfile::TempDir, PagePool) {
        let dir = tempfile::tempdir().unwrap();
        let file = build_file(&dir, pages);
        let config = PoolConfig {
            reserve_bytes: reserve,
            ..PoolConfig::default()
        };
        let pool = PagePool::open(file, config).unwrap();
        (dir, pool)
    }

    #[test]
    fn load_returns_the_requested_page() {
        let (_dir, pool) = small_pool(16, ARENA_SIZE);
        let page = pool.load(9).unwrap();
        assert_eq!(page.view().header().unwrap().page_id(), PageLocator::new(9, 1));
        assert_eq!(page.data()[PAGE_SIZE - 1], 9);
    }

    #[test]
    fn last_page_of_a_short_extent_loads() {
        let (_dir, pool) = small_pool(10, ARENA_SIZE);
        let page = pool.load(9).unwrap();
        assert_eq!(page.data()[PAGE_SIZE - 1], 9);
    }

    #[test]
    fn out_of_range_page_is_fatal() {
        let (_dir, pool) = small_pool(8, ARENA_SIZE);
        let err = pool.load(8).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Corruption { .. })
        ));
    }

    #[test]
    fn self_id_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mdf");
        let mut f = std::fs::File::create(&path).unwrap();
        for _ in 0..8 {
            // Every page claims to be page 0.
            let page = PageBuilder::new(PageType::Data, PageLocator::new(0, 1)).build();
            f.write_all(&page).unwrap();
        }
        drop(f);
        let pool = PagePool::open(DataFile::open(path).unwrap(), PoolConfig {
            reserve_bytes: ARENA_SIZE,
            ..PoolConfig::default()
        })
        .unwrap();
        assert!(pool.load(0).is_ok());
        assert!(pool.load(3).is_err());
    }

    #[test]
    fn second_load_hits_the_cache() {
        let (_dir, pool) = small_pool(16, ARENA_SIZE);
        let a = pool.load(1).unwrap();
        drop(a);
        let before = pool.stats().snapshot().extent_reads;
        let b = pool.load(2).unwrap(); // same extent
        drop(b);
        assert_eq!(pool.stats().snapshot().extent_reads, before);
    }

    #[test]
    fn eviction_reclaims_the_oldest_unpinned_block() {
        // One arena: 16 blocks. 17 extents force one eviction.
        let (_dir, pool) = small_pool(17 * EXTENT_PAGES as u32, ARENA_SIZE);
        for e in 0..17u32 {
            let page = pool.load(e * EXTENT_PAGES as u32).unwrap();
            drop(page);
        }
        assert_eq!(pool.stats().snapshot().evictions, 1);
        assert_eq!(pool.loaded_extents(), 16);
    }

    #[test]
    fn pinned_blocks_are_not_evicted() {
        let (_dir, pool) = small_pool(17 * EXTENT_PAGES as u32, ARENA_SIZE);
        let pinned: Vec<_> = (0..16u32)
            .map(|e| pool.load(e * EXTENT_PAGES as u32).unwrap())
            .collect();
        // Every block is pinned: the 17th extent cannot be placed.
        let err = pool.load(16 * EXTENT_PAGES as u32).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::BadAlloc { .. })
        ));
        drop(pinned);
        assert!(pool.load(16 * EXTENT_PAGES as u32).is_ok());
    }

    #[test]
    fn pin_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_file(&dir, 16);
        let pool = PagePool::open(file, PoolConfig {
            reserve_bytes: ARENA_SIZE,
            max_pinned_blocks: 1,
            ..PoolConfig::default()
        })
        .unwrap();
        let first = pool.load(0).unwrap();
        let err = pool.load(8).unwrap_err(); // second extent, second pin
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::BadAlloc { .. })
        ));
        drop(first);
        assert!(pool.load(8).is_ok());
    }

    #[test]
    fn warm_all_prereads_up_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_file(&dir, 4 * EXTENT_PAGES as u32);
        let pool = PagePool::open(file, PoolConfig {
            reserve_bytes: ARENA_SIZE,
            warm_all: true,
            ..PoolConfig::default()
        })
        .unwrap();
        assert_eq!(pool.loaded_extents(), 4);
        let before = pool.stats().snapshot().extent_reads;
        pool.load(0).unwrap();
        assert_eq!(pool.stats().snapshot().extent_reads, before);
    }

    #[test]
    fn readahead_populates_following_extents() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_file(&dir, 4 * EXTENT_PAGES as u32);
        let pool = PagePool::open(file, PoolConfig {
            reserve_bytes: ARENA_SIZE,
            readahead_extents: 2,
            ..PoolConfig::default()
        })
        .unwrap();
        pool.load(0).unwrap();
        assert_eq!(pool.loaded_extents(), 2);
    }

    #[test]
    fn concurrent_loads_see_identical_memory() {
        let (_dir, pool) = small_pool(64, 4 * ARENA_SIZE);
        let pool = std::sync::Arc::new(pool);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = std::sync::Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                let mut addrs = Vec::new();
                for round in 0..4 {
                    for p in 0..64u32 {
                        let page = pool.load(p).unwrap();
                        assert_eq!(page.data()[PAGE_SIZE - 1], (p & 0xFF) as u8);
                        if round == 0 {
                            addrs.push(page.data().as_ptr() as usize);
                        } else {
                            assert_eq!(addrs[p as usize], page.data().as_ptr() as usize);
                        }
                    }
                }
                addrs
            }));
        }
        let results: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
    }
}
