//! Configuration constants and pool options.

mod constants;

pub use constants::*;

use eyre::{ensure, Result};

/// Options recognized by the page pool.
///
/// `reserve_bytes` is the size of the virtual address reservation and must
/// be a whole number of arenas. The reservation is address space, not
/// memory; arenas are committed on demand.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Size of the virtual reservation (multiple of 1MB).
    pub reserve_bytes: usize,
    /// Pre-read the whole file sequentially at open.
    pub warm_all: bool,
    /// How many extents to over-read on a miss (at least 1).
    pub readahead_extents: usize,
    /// Upper bound on simultaneously pinned blocks.
    pub max_pinned_blocks: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reserve_bytes: DEFAULT_RESERVE_BYTES,
            warm_all: false,
            readahead_extents: DEFAULT_READAHEAD_EXTENTS,
            max_pinned_blocks: DEFAULT_MAX_PINNED_BLOCKS,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.reserve_bytes >= ARENA_SIZE,
            "reservation {} smaller than one arena ({})",
            self.reserve_bytes,
            ARENA_SIZE
        );
        ensure!(
            self.reserve_bytes % ARENA_SIZE == 0,
            "reservation {} is not a multiple of the arena size {}",
            self.reserve_bytes,
            ARENA_SIZE
        );
        ensure!(self.readahead_extents >= 1, "readahead must be at least 1 extent");
        ensure!(self.max_pinned_blocks >= 1, "pinned-block limit must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PoolConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_unaligned_reservation() {
        let cfg = PoolConfig {
            reserve_bytes: ARENA_SIZE + 1,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_readahead() {
        let cfg = PoolConfig {
            readahead_extents: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
