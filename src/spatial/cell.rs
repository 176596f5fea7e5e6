//! # Spatial Cell Identifiers
//!
//! A cell is five bytes on disk: four 8-bit Hilbert indices (one per grid
//! level) and a depth in `1..=4`. Two cells intersect when they agree on
//! the leading `min(depth)` indices; ordering is lexicographic over that
//! shared prefix, with the shallower cell first on a tie.
//!
//! Bytes beyond the depth do not participate in equality or ordering.

use eyre::{ensure, Result};

/// Cells subdivide each level into a 16x16 grid.
pub const GRID: usize = 16;

/// Maximum (and usual) cell depth.
pub const MAX_DEPTH: u8 = 4;

/// Grid resolution at depth 4 along one axis.
pub const GRID_HIGH: i32 = (GRID * GRID * GRID * GRID) as i32;

#[derive(Debug, Clone, Copy)]
pub struct SpatialCell {
    pub id: [u8; MAX_DEPTH as usize],
    pub depth: u8,
}

impl SpatialCell {
    pub fn new(id: [u8; 4], depth: u8) -> Self {
        debug_assert!(depth >= 1 && depth <= MAX_DEPTH);
        Self { id, depth }
    }

    /// Smallest depth-4 cell.
    pub fn min() -> Self {
        Self {
            id: [0; 4],
            depth: MAX_DEPTH,
        }
    }

    /// Largest depth-4 cell.
    pub fn max() -> Self {
        Self {
            id: [u8::MAX; 4],
            depth: MAX_DEPTH,
        }
    }

    /// Decodes the 5-byte on-disk form: four level indices then the depth.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= 5, "cell needs 5 bytes, got {}", bytes.len());
        let depth = bytes[4];
        ensure!(
            (1..=MAX_DEPTH).contains(&depth),
            "cell depth {} outside 1..=4",
            depth
        );
        Ok(Self {
            id: [bytes[0], bytes[1], bytes[2], bytes[3]],
            depth,
        })
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        [self.id[0], self.id[1], self.id[2], self.id[3], self.depth]
    }

    /// Parses the hexadecimal dump form, e.g. `"6ca5f92a04"`.
    pub fn parse_hex(text: &str) -> Result<Self> {
        let raw = u64::from_str_radix(text, 16)
            .map_err(|e| eyre::eyre!("'{}' is not a hex cell: {}", text, e))?;
        let bytes = raw.to_be_bytes();
        Self::from_bytes(&bytes[3..8])
    }

    /// The same cell truncated to `depth` levels.
    pub fn prefix(&self, depth: u8) -> Self {
        debug_assert!(depth >= 1 && depth <= self.depth);
        let mut id = [0u8; 4];
        id[..depth as usize].copy_from_slice(&self.id[..depth as usize]);
        Self { id, depth }
    }

    /// Whether the identifier bytes beyond the depth are all zero.
    pub fn zero_tail(&self) -> bool {
        self.id[self.depth as usize..].iter().all(|&b| b == 0)
    }

    /// Prefix intersection: equality over the shared `min(depth)` bytes.
    pub fn intersects(&self, other: &SpatialCell) -> bool {
        let d = self.depth.min(other.depth) as usize;
        self.id[..d] == other.id[..d]
    }
}

impl PartialEq for SpatialCell {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth
            && self.id[..self.depth as usize] == other.id[..other.depth as usize]
    }
}

impl Eq for SpatialCell {}

impl Ord for SpatialCell {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let d = self.depth.min(other.depth) as usize;
        self.id[..d]
            .cmp(&other.id[..d])
            .then(self.depth.cmp(&other.depth))
    }
}

impl PartialOrd for SpatialCell {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// `Display` writes the dump form `157-178-149-55-4`.
impl std::fmt::Display for SpatialCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.id[0], self.id[1], self.id[2], self.id[3], self.depth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_right_aligns_the_bytes() {
        let cell = SpatialCell::parse_hex("6ca5f92a04").unwrap();
        assert_eq!(cell.id, [0x6C, 0xA5, 0xF9, 0x2A]);
        assert_eq!(cell.depth, 4);
        assert_eq!(cell.to_string(), "108-165-249-42-4");
    }

    #[test]
    fn five_byte_round_trip() {
        let cell = SpatialCell::new([1, 2, 3, 4], 3);
        let bytes = cell.to_bytes();
        assert_eq!(bytes, [1, 2, 3, 4, 3]);
        assert_eq!(SpatialCell::from_bytes(&bytes).unwrap(), cell);
    }

    #[test]
    fn depth_zero_and_five_are_rejected() {
        assert!(SpatialCell::from_bytes(&[0, 0, 0, 0, 0]).is_err());
        assert!(SpatialCell::from_bytes(&[0, 0, 0, 0, 5]).is_err());
    }

    #[test]
    fn intersection_is_shared_prefix_equality() {
        // Prefix disagreement at the shallower depth: the third byte
        // differs inside the shared 3-byte prefix.
        let a = SpatialCell::new([0x6C, 0xA5, 0xF9, 0x2A], 4);
        let b = SpatialCell::new([0x6C, 0xA5, 0xF8, 0x00], 3);
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
        let c = SpatialCell::new([0x6C, 0xA5, 0xF9, 0x00], 2);
        assert!(a.intersects(&c));
        assert!(c.intersects(&a));
    }

    #[test]
    fn ordering_compares_prefix_then_depth() {
        let deep = SpatialCell::new([5, 5, 5, 5], 4);
        let shallow = SpatialCell::new([5, 0, 0, 0], 1);
        assert!(shallow < deep);
        assert!(deep.intersects(&shallow));

        let other = SpatialCell::new([5, 6, 0, 0], 2);
        assert!(deep < other);
    }

    #[test]
    fn equality_ignores_bytes_beyond_depth() {
        let a = SpatialCell::new([9, 1, 2, 3], 1);
        let b = SpatialCell::new([9, 7, 8, 9], 1);
        assert_eq!(a, b);
        assert!(!a.zero_tail());
        assert!(a.prefix(1).zero_tail());
    }

    #[test]
    fn min_and_max_bound_every_cell() {
        let cell = SpatialCell::new([10, 20, 30, 40], 4);
        assert!(SpatialCell::min() <= cell);
        assert!(cell <= SpatialCell::max());
        assert!(!SpatialCell::min().intersects(&SpatialCell::max()));
    }
}
