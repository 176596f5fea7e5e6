//! # Virtual-Memory Layer
//!
//! The pool's memory comes from one anonymous reservation ([`vm::VmSpan`])
//! carved into 1MB arenas of sixteen 64KB blocks by [`arena::ArenaAllocator`].
//! Blocks are the caching unit: one block holds one disk extent (eight 8KB
//! pages).
//!
//! The allocator is not internally synchronized; the page pool guards it
//! with a single mutex alongside its page map.

mod arena;
mod vm;

pub use arena::ArenaAllocator;
pub use vm::VmSpan;
