//! # Storage Layer
//!
//! Turns raw 8KB disk pages into navigable records:
//!
//! - `file`: validated read-only positional I/O (extent granularity)
//! - `page`: the 96-byte page header, locators, slot array
//! - `pool`: demand-paged, pin-counted extent cache over the arena
//!   allocator
//! - `record`: zero-copy row decoding against a table schema
//!
//! The walkers in `index` and `spatial` sit on top of this module and never
//! touch the file directly.

mod file;
pub mod page;
mod pool;
pub mod record;

pub use file::DataFile;
pub use page::{PageHeader, PageLocator, PageType, PageView, RecordId};
pub use pool::{PagePool, PageRef, PoolStats, PoolStatsSnapshot};
pub use record::{ColumnValue, OverflowChain, OverflowKind, RecordView};

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Parses a zerocopy struct from the front of a byte slice with size
/// validation.
#[inline]
pub fn parse_zerocopy<'a, T: FromBytes + KnownLayout + Immutable + zerocopy::Unaligned>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}
