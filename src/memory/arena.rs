//! # Arena Block Allocator
//!
//! Sub-allocates 64KB blocks out of 1MB arenas carved from one virtual
//! reservation. Arena records live in a flat array indexed by arena number;
//! list membership is expressed with packed integer links rather than
//! pointers, so the free and mixed lists are plain singly-linked lists over
//! indices.
//!
//! ## Allocation policy
//!
//! Tried in order:
//!
//! 1. Head of the *mixed* list (partially allocated arenas): take the lowest
//!    unset mask bit; unlink the arena when it becomes full.
//! 2. Head of the *free* list (fully decommitted arenas): commit it, take
//!    block 0, move it to the mixed list.
//! 3. The high-water mark: if an arena beyond every arena ever touched
//!    remains inside the reservation, bring it up and take block 0.
//!
//! Release clears the mask bit; an arena that becomes empty is decommitted
//! and moved to the free list, and an arena that was full rejoins the mixed
//! list.
//!
//! `find_arena` is plain offset division: every arena lives inside the one
//! contiguous reservation, so block address to arena number is exact
//! arithmetic, no address index needed.
//!
//! Defragmentation (compacting partially-used arenas) is intentionally not
//! implemented; under heavy eviction arenas can linger on the mixed list
//! with a single live block each.

use eyre::{bail, Result};

use crate::config::{ARENA_BLOCKS, ARENA_SIZE, BLOCK_SIZE};
use crate::error::EngineError;
use crate::memory::vm::VmSpan;

const MASK_FULL: u16 = u16::MAX;

/// Packed arena link: `{ index : 31, valid : 1 }` with the valid flag in the
/// top bit. The niche keeps the arena record at eight bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArenaLink(u32);

impl ArenaLink {
    const NONE: ArenaLink = ArenaLink(0);
    const VALID: u32 = 1 << 31;

    fn some(index: u32) -> Self {
        debug_assert!(index < Self::VALID);
        ArenaLink(index | Self::VALID)
    }

    fn get(self) -> Option<u32> {
        if self.0 & Self::VALID != 0 {
            Some(self.0 & !Self::VALID)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Arena {
    mask: u16,
    committed: bool,
    next: ArenaLink,
}

impl Arena {
    const EMPTY: Arena = Arena {
        mask: 0,
        committed: false,
        next: ArenaLink::NONE,
    };
}

#[derive(Debug)]
pub struct ArenaAllocator {
    vm: VmSpan,
    arenas: Box<[Arena]>,
    free_head: ArenaLink,
    mixed_head: ArenaLink,
    /// Arenas ever committed; everything at or beyond this index is
    /// untouched address space.
    high_water: u32,
    alloc_blocks: usize,
}

impl ArenaAllocator {
    pub fn new(vm: VmSpan) -> Self {
        let arena_count = vm.len() / ARENA_SIZE;
        Self {
            vm,
            arenas: vec![Arena::EMPTY; arena_count].into_boxed_slice(),
            free_head: ArenaLink::NONE,
            mixed_head: ArenaLink::NONE,
            high_water: 0,
            alloc_blocks: 0,
        }
    }

    pub fn block_capacity(&self) -> usize {
        self.arenas.len() * ARENA_BLOCKS
    }

    pub fn allocated_blocks(&self) -> usize {
        self.alloc_blocks
    }

    /// Base address of a block by global block id.
    pub fn block_ptr(&self, block: u32) -> *mut u8 {
        debug_assert!((block as usize) < self.block_capacity());
        // SAFETY: block ids are bounded by the reservation (asserted above).
        unsafe { self.vm.base().add(block as usize * BLOCK_SIZE) }
    }

    /// Arena number owning a block. Exact because the reservation is one
    /// contiguous span.
    pub fn find_arena(&self, block: u32) -> u32 {
        block / ARENA_BLOCKS as u32
    }

    /// Allocates one zeroed block, growing committed memory as needed.
    pub fn alloc_block(&mut self) -> Result<u32> {
        if let Some(arena_ix) = self.mixed_head.get() {
            let arena = &mut self.arenas[arena_ix as usize];
            debug_assert!(arena.committed && arena.mask != MASK_FULL);
            let bit = (!arena.mask).trailing_zeros();
            arena.mask |= 1 << bit;
            if arena.mask == MASK_FULL {
                self.mixed_head = arena.next;
                arena.next = ArenaLink::NONE;
            }
            self.alloc_blocks += 1;
            let block = arena_ix * ARENA_BLOCKS as u32 + bit;
            self.zero_block(block);
            return Ok(block);
        }

        if let Some(arena_ix) = self.free_head.get() {
            let arena = &mut self.arenas[arena_ix as usize];
            debug_assert!(!arena.committed && arena.mask == 0);
            self.free_head = arena.next;
            arena.committed = true;
            arena.mask = 1;
            arena.next = self.mixed_head;
            self.mixed_head = ArenaLink::some(arena_ix);
            self.alloc_blocks += 1;
            // Freshly recommitted memory is zero-fill-on-demand.
            return Ok(arena_ix * ARENA_BLOCKS as u32);
        }

        if (self.high_water as usize) < self.arenas.len() {
            let arena_ix = self.high_water;
            self.high_water += 1;
            let arena = &mut self.arenas[arena_ix as usize];
            arena.committed = true;
            arena.mask = 1;
            arena.next = self.mixed_head;
            self.mixed_head = ArenaLink::some(arena_ix);
            self.alloc_blocks += 1;
            return Ok(arena_ix * ARENA_BLOCKS as u32);
        }

        bail!(EngineError::BadAlloc {
            requested: BLOCK_SIZE,
            reserved: self.vm.len(),
        });
    }

    /// Returns a block to the allocator. Empties decommit their arena.
    pub fn release(&mut self, block: u32) {
        let arena_ix = self.find_arena(block);
        let bit = block % ARENA_BLOCKS as u32;
        let was_full;
        {
            let arena = &mut self.arenas[arena_ix as usize];
            debug_assert!(arena.committed);
            debug_assert!(arena.mask & (1 << bit) != 0, "double release of block {}", block);
            was_full = arena.mask == MASK_FULL;
            arena.mask &= !(1 << bit);
        }
        self.alloc_blocks -= 1;

        let mask = self.arenas[arena_ix as usize].mask;
        if mask == 0 {
            if !was_full {
                self.unlink_mixed(arena_ix);
            }
            let arena = &mut self.arenas[arena_ix as usize];
            arena.committed = false;
            arena.next = self.free_head;
            self.free_head = ArenaLink::some(arena_ix);
            self.vm.decommit(arena_ix as usize * ARENA_SIZE, ARENA_SIZE);
        } else if was_full {
            let arena = &mut self.arenas[arena_ix as usize];
            arena.next = self.mixed_head;
            self.mixed_head = ArenaLink::some(arena_ix);
        }
    }

    fn unlink_mixed(&mut self, arena_ix: u32) {
        if self.mixed_head == ArenaLink::some(arena_ix) {
            self.mixed_head = self.arenas[arena_ix as usize].next;
            self.arenas[arena_ix as usize].next = ArenaLink::NONE;
            return;
        }
        let mut cursor = self.mixed_head;
        while let Some(ix) = cursor.get() {
            let next = self.arenas[ix as usize].next;
            if next == ArenaLink::some(arena_ix) {
                self.arenas[ix as usize].next = self.arenas[arena_ix as usize].next;
                self.arenas[arena_ix as usize].next = ArenaLink::NONE;
                return;
            }
            cursor = next;
        }
        debug_assert!(false, "arena {} not on the mixed list", arena_ix);
    }

    fn zero_block(&self, block: u32) {
        // SAFETY: the block was just taken out of the free mask, so no
        // reader can observe it; the range is inside the reservation.
        unsafe {
            std::ptr::write_bytes(self.block_ptr(block), 0, BLOCK_SIZE);
        }
    }

    /// Cross-checks list membership against the masks. Debug aid for the
    /// bitmask invariant; cheap enough to run in tests after every step.
    pub fn assert_consistency(&self) {
        let mut on_free = vec![false; self.arenas.len()];
        let mut cursor = self.free_head;
        while let Some(ix) = cursor.get() {
            assert!(!on_free[ix as usize], "free list cycle at arena {}", ix);
            on_free[ix as usize] = true;
            let arena = &self.arenas[ix as usize];
            assert_eq!(arena.mask, 0, "free arena {} has live blocks", ix);
            assert!(!arena.committed, "free arena {} still committed", ix);
            cursor = arena.next;
        }

        let mut on_mixed = vec![false; self.arenas.len()];
        cursor = self.mixed_head;
        while let Some(ix) = cursor.get() {
            assert!(!on_mixed[ix as usize], "mixed list cycle at arena {}", ix);
            on_mixed[ix as usize] = true;
            let arena = &self.arenas[ix as usize];
            assert!(arena.committed, "mixed arena {} not committed", ix);
            assert!(
                arena.mask != 0 && arena.mask != MASK_FULL,
                "mixed arena {} has mask {:#06x}",
                ix,
                arena.mask
            );
            cursor = arena.next;
        }

        let mut counted = 0;
        for (ix, arena) in self.arenas.iter().enumerate() {
            counted += arena.mask.count_ones() as usize;
            if ix as u32 >= self.high_water {
                assert!(!arena.committed && arena.mask == 0);
            }
            if arena.committed && arena.mask != MASK_FULL && arena.mask != 0 {
                assert!(on_mixed[ix], "partial arena {} missing from mixed list", ix);
            }
        }
        assert_eq!(counted, self.alloc_blocks, "allocated block count drift");
    }
}
