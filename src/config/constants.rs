//! # Engine Geometry Constants
//!
//! This module centralizes the on-disk and in-memory geometry of the engine.
//! The values are dictated by the MDF file format on one side and by the
//! arena allocator layout on the other; constants that depend on each other
//! are co-located and cross-checked at compile time.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (8192 bytes, fixed by the file format)
//!       │
//!       ├─> PAGE_HEADER_SIZE (96 bytes, fixed by the file format)
//!       │
//!       ├─> PAGE_USABLE_SIZE (derived)
//!       │
//!       └─> EXTENT_PAGES (8) ──> EXTENT_SIZE (64KB, the natural I/O unit)
//!                                      │
//!                                      └─> BLOCK_SIZE == EXTENT_SIZE
//!                                            │
//!                                            └─> ARENA_BLOCKS (16)
//!                                                  │
//!                                                  └─> ARENA_SIZE (1MB)
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `BLOCK_SIZE == EXTENT_SIZE` — one pool block caches exactly one disk
//!    extent, so a single aligned read fills a block.
//! 2. `ARENA_SIZE == ARENA_BLOCKS * BLOCK_SIZE` — the 16-bit per-arena
//!    allocation mask has exactly one bit per block.

/// Size of each database page in bytes (8KB).
/// This is the fundamental on-disk unit; it is fixed by the file format.
pub const PAGE_SIZE: usize = 8192;

/// Size of the page header in bytes. Rows grow upward from this offset.
pub const PAGE_HEADER_SIZE: usize = 96;

/// Usable space in a page after the header.
pub const PAGE_USABLE_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Trailing reserved span of the page header. The pool does not use it;
/// block bookkeeping lives in a side table instead (see `storage::pool`).
pub const PAGE_RESERVED_SIZE: usize = 32;

/// Pages per extent. Extents are the allocation and I/O granule of the
/// host file format.
pub const EXTENT_PAGES: usize = 8;

/// Size of one extent in bytes (64KB).
pub const EXTENT_SIZE: usize = PAGE_SIZE * EXTENT_PAGES;

/// Size of one pool block. A block caches one extent.
pub const BLOCK_SIZE: usize = EXTENT_SIZE;

/// Blocks per arena; one bit of the arena allocation mask each.
pub const ARENA_BLOCKS: usize = 16;

/// Size of one virtual-memory arena (1MB).
pub const ARENA_SIZE: usize = ARENA_BLOCKS * BLOCK_SIZE;

/// Default virtual reservation for the page pool (256MB).
pub const DEFAULT_RESERVE_BYTES: usize = 256 * 1024 * 1024;

/// Default number of extents to read ahead on a pool miss.
pub const DEFAULT_READAHEAD_EXTENTS: usize = 1;

/// Default upper bound on simultaneously pinned blocks.
pub const DEFAULT_MAX_PINNED_BLOCKS: usize = 1024;

const _: () = assert!(
    BLOCK_SIZE == EXTENT_SIZE,
    "pool blocks must cache exactly one extent"
);

const _: () = assert!(
    ARENA_SIZE == ARENA_BLOCKS * BLOCK_SIZE,
    "ARENA_SIZE derivation mismatch"
);

const _: () = assert!(ARENA_BLOCKS <= 16, "arena allocation mask is 16 bits");

const _: () = assert!(
    DEFAULT_RESERVE_BYTES % ARENA_SIZE == 0,
    "reservation must be a whole number of arenas"
);
