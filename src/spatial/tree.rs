//! # Spatial-Cell Tree Walker
//!
//! A B-tree variant over `{ cell, primary key }` keys. Internal rows are
//! `{ status(1), cell(5), pk(8), child locator(6) }`; leaf rows carry the
//! cell, the primary key and the geometry's cell attributes.
//!
//! Because several consecutive leaf cells can intersect one query cell,
//! point lookups are replaced by `find_cell` (first leaf position at or
//! after a cell) plus a forward walk while the intersection holds; and
//! because an indexed geometry spans several cells, `for_range`/`for_rect`
//! thread one sparse primary-key set through every cell of a query so each
//! row surfaces once.
//!
//! The leftmost page of each level carries a placeholder first key, the
//! same rule as the clustered-index walker.

use std::ops::ControlFlow;

use eyre::Result;
use tracing::{debug, trace};
use zerocopy::little_endian::{I64, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{CancelToken, EngineError};
use crate::spatial::cell::SpatialCell;
use crate::spatial::sparse_set::SparseSet;
use crate::spatial::transform::{self, CellSet, RadiusModel, SpatialPoint, SpatialRect};
use crate::storage::page::{PageHeader, PageLocator, RawPageLocator, RecordId};
use crate::storage::record::row_flags;
use crate::storage::{parse_zerocopy, PagePool, PageView};

/// On-disk internal row of the spatial tree.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawSpatialIndexRow {
    status: u8,
    cell: [u8; 5],
    pk0: I64,
    page: RawPageLocator,
}

/// On-disk leaf row prefix of the spatial tree (the fixed span; trailing
/// record bookkeeping is not read here).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawSpatialLeafRow {
    status: U16,
    fixed_end: U16,
    cell: [u8; 5],
    pk0: I64,
    cell_attr: U32,
    srid: U32,
}

pub const SPATIAL_INDEX_ROW_LEN: usize = std::mem::size_of::<RawSpatialIndexRow>();
pub const SPATIAL_LEAF_ROW_LEN: usize = std::mem::size_of::<RawSpatialLeafRow>();

const _: () = assert!(SPATIAL_INDEX_ROW_LEN == 20);
const _: () = assert!(SPATIAL_LEAF_ROW_LEN == 25);

/// Decoded spatial leaf row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialRow {
    pub cell: SpatialCell,
    pub pk0: i64,
    pub cell_attr: u32,
    pub srid: u32,
    ghost: bool,
}

impl SpatialRow {
    pub fn is_ghost(&self) -> bool {
        self.ghost
    }
}

pub struct SpatialTree<'p> {
    pool: &'p PagePool,
    root: PageLocator,
    min_page: PageLocator,
    max_page: PageLocator,
}

impl<'p> SpatialTree<'p> {
    /// Binds a walker to an index root and resolves the leaf extremes.
    pub fn new(pool: &'p PagePool, root: PageLocator) -> Result<Self> {
        eyre::ensure!(!root.is_null(), "spatial index root is the null locator");
        let mut tree = Self {
            pool,
            root,
            min_page: PageLocator::NULL,
            max_page: PageLocator::NULL,
        };
        {
            let page = pool.load_locator(root)?;
            tree.check_index_page(page.view().header()?)?;
        }
        tree.min_page = tree.load_leaf_page(true)?;
        tree.max_page = tree.load_leaf_page(false)?;
        debug!(root = %root, min = %tree.min_page, max = %tree.max_page, "spatial tree bound");
        Ok(tree)
    }

    pub fn root(&self) -> PageLocator {
        self.root
    }

    pub fn min_page(&self) -> PageLocator {
        self.min_page
    }

    pub fn max_page(&self) -> PageLocator {
        self.max_page
    }

    /// Smallest cell in the tree.
    pub fn min_cell(&self) -> Result<SpatialCell> {
        let page = self.pool.load_locator(self.min_page)?;
        let view = page.view();
        self.leaf_row(&view, view.header()?, 0).map(|r| r.cell)
    }

    /// Largest cell in the tree.
    pub fn max_cell(&self) -> Result<SpatialCell> {
        let page = self.pool.load_locator(self.max_page)?;
        let view = page.view();
        let header = view.header()?;
        self.leaf_row(&view, header, header.slot_count() as usize - 1)
            .map(|r| r.cell)
    }

    fn check_index_page(&self, header: &PageHeader) -> Result<()> {
        if !header.is_index()
            || header.pminlen() as usize != SPATIAL_INDEX_ROW_LEN
            || header.slot_count() == 0
        {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                "not a spatial index page".to_string()
            ));
        }
        Ok(())
    }

    fn check_leaf_page(&self, header: &PageHeader) -> Result<()> {
        if !header.is_data() || header.pminlen() as usize != SPATIAL_LEAF_ROW_LEN {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                "not a spatial data page".to_string()
            ));
        }
        Ok(())
    }

    fn index_row(
        &self,
        view: &PageView<'_>,
        slot: usize,
    ) -> Result<(SpatialCell, i64, PageLocator)> {
        let row: &RawSpatialIndexRow = parse_zerocopy(view.row_bytes(slot)?, "spatial index row")?;
        let cell = SpatialCell::from_bytes(&row.cell)?;
        Ok((cell, row.pk0.get(), row.page.get()))
    }

    fn leaf_row(
        &self,
        view: &PageView<'_>,
        header: &PageHeader,
        slot: usize,
    ) -> Result<SpatialRow> {
        let row: &RawSpatialLeafRow = parse_zerocopy(view.row_bytes(slot)?, "spatial leaf row")?;
        let cell = SpatialCell::from_bytes(&row.cell).map_err(|_| {
            EngineError::corruption(
                header.page_id(),
                format!("leaf row {} carries an invalid cell", slot),
            )
        })?;
        Ok(SpatialRow {
            cell,
            pk0: row.pk0.get(),
            cell_attr: row.cell_attr.get(),
            srid: row.srid.get(),
            ghost: row.status.get() & row_flags::GHOST != 0,
        })
    }

    /// Walks the first (or last) child pointers down to the leaf level.
    fn load_leaf_page(&self, begin: bool) -> Result<PageLocator> {
        let mut loc = self.root;
        loop {
            let page = self.pool.load_locator(loc)?;
            let view = page.view();
            let header = view.header()?;
            if header.is_data() {
                self.check_leaf_page(header)?;
                return Ok(loc);
            }
            self.check_index_page(header)?;
            let slot = if begin {
                0
            } else {
                header.slot_count() as usize - 1
            };
            let (_, _, child) = self.index_row(&view, slot)?;
            if child.is_null() {
                eyre::bail!(EngineError::corruption(
                    loc,
                    format!("index row {} points at the null locator", slot)
                ));
            }
            loc = child;
        }
    }

    /// Child slot for `cell` on an index page, placeholder-first-row rule
    /// included.
    fn find_slot(&self, view: &PageView<'_>, header: &PageHeader, cell: &SpatialCell) -> Result<usize> {
        let count = header.slot_count() as usize;
        let placeholder_first = header.prev_page().is_null();

        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let before = if mid == 0 && placeholder_first {
                true
            } else {
                let (row_cell, _, _) = self.index_row(view, mid)?;
                row_cell < *cell
            };
            if before {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo < count {
            if lo > 0 {
                let (row_cell, _, _) = self.index_row(view, lo)?;
                if *cell < row_cell {
                    lo -= 1;
                }
            }
            Ok(lo)
        } else {
            Ok(count - 1)
        }
    }

    /// Descends to the leaf page that owns `cell`.
    pub fn find_page(&self, cell: &SpatialCell) -> Result<PageLocator> {
        let mut loc = self.root;
        loop {
            let page = self.pool.load_locator(loc)?;
            let view = page.view();
            let header = view.header()?;
            if header.is_data() {
                self.check_leaf_page(header)?;
                return Ok(loc);
            }
            self.check_index_page(header)?;
            let slot = self.find_slot(&view, header, cell)?;
            let (_, _, child) = self.index_row(&view, slot)?;
            if child.is_null() {
                eyre::bail!(EngineError::corruption(
                    loc,
                    format!("index row {} points at the null locator", slot)
                ));
            }
            trace!(page = %loc, slot, child = %child, "spatial descent");
            loc = child;
        }
    }

    /// `find_page`, then walk back while the previous page still holds
    /// intersecting cells; cells intersecting the query can start before
    /// the descent's landing page.
    fn page_lower_bound(&self, cell: &SpatialCell) -> Result<PageLocator> {
        let mut loc = self.find_page(cell)?;
        loop {
            let page = self.pool.load_locator(loc)?;
            let view = page.view();
            let header = view.header()?;
            if header.slot_count() == 0 {
                return Ok(loc);
            }
            if !self.leaf_row(&view, header, 0)?.cell.intersects(cell) {
                return Ok(loc);
            }
            let prev = header.prev_page();
            if prev.is_null() {
                return Ok(loc);
            }
            let prev_page = self.pool.load_locator(prev)?;
            let prev_view = prev_page.view();
            let prev_header = prev_view.header()?;
            self.check_leaf_page(prev_header)?;
            let count = prev_header.slot_count() as usize;
            if count == 0
                || !self
                    .leaf_row(&prev_view, prev_header, count - 1)?
                    .cell
                    .intersects(cell)
            {
                return Ok(loc);
            }
            loc = prev;
        }
    }

    /// First leaf position whose cell is at or intersecting `cell`, or
    /// `None` when every cell in the tree orders before it.
    pub fn find_cell(&self, cell: &SpatialCell) -> Result<Option<RecordId>> {
        let loc = self.page_lower_bound(cell)?;
        let page = self.pool.load_locator(loc)?;
        let view = page.view();
        let header = view.header()?;
        let count = header.slot_count() as usize;

        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let row = self.leaf_row(&view, header, mid)?;
            if row.cell < *cell && !row.cell.intersects(cell) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == count {
            return Ok(None);
        }
        Ok(Some(RecordId::new(loc, lo as u16)))
    }

    fn row_at(&self, rid: RecordId) -> Result<SpatialRow> {
        let page = self.pool.load_locator(rid.page)?;
        let view = page.view();
        let header = view.header()?;
        self.check_leaf_page(header)?;
        self.leaf_row(&view, header, rid.slot as usize)
    }

    /// Position after `rid` in leaf order, following the `next` chain.
    fn next_record(&self, rid: RecordId) -> Result<Option<RecordId>> {
        let page = self.pool.load_locator(rid.page)?;
        let view = page.view();
        let header = view.header()?;
        if (rid.slot as usize + 1) < header.slot_count() as usize {
            return Ok(Some(RecordId::new(rid.page, rid.slot + 1)));
        }
        let next = header.next_page();
        if next.is_null() {
            return Ok(None);
        }
        let next_page = self.pool.load_locator(next)?;
        self.check_leaf_page(next_page.view().header()?)?;
        Ok(Some(RecordId::new(next, 0)))
    }

    /// Emits every leaf row whose cell intersects `cell`, in cell order.
    ///
    /// Enumerates the query's prefixes at depths 1..=depth; each prefix
    /// lands on the first intersecting position and walks forward while
    /// the intersection holds. The last-emitted position guards against a
    /// shallower prefix replaying rows a deeper one already produced.
    pub fn for_cell(
        &self,
        cell: &SpatialCell,
        fun: &mut impl FnMut(&SpatialRow) -> ControlFlow<()>,
    ) -> Result<ControlFlow<()>> {
        let mut last: Option<(RecordId, SpatialCell)> = None;
        for depth in 1..=cell.depth {
            let prefix = cell.prefix(depth);
            let Some(mut it) = self.find_cell(&prefix)? else {
                continue;
            };
            let mut row = self.row_at(it)?;
            if let Some((last_rid, last_cell)) = &last {
                if *last_rid == it || !(*last_cell < row.cell) {
                    continue;
                }
            }
            while row.cell.intersects(cell) {
                if !row.is_ghost() && fun(&row).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
                last = Some((it, row.cell));
                match self.next_record(it)? {
                    Some(next) => {
                        it = next;
                        row = self.row_at(it)?;
                    }
                    None => break,
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Rows intersecting any cell of a disk query, deduplicated by
    /// primary key across all cells.
    pub fn for_range(
        &self,
        center: SpatialPoint,
        radius_m: f64,
        model: RadiusModel,
        cancel: &CancelToken,
        fun: &mut impl FnMut(&SpatialRow) -> ControlFlow<()>,
    ) -> Result<ControlFlow<()>> {
        let mut cells = CellSet::new();
        transform::cell_range(center, radius_m, model, &mut cells);
        debug!(cells = cells.len(), radius_m, "for_range");
        self.for_cell_set(&cells, cancel, fun)
    }

    /// Rows intersecting any cell of a rectangle query, deduplicated by
    /// primary key.
    pub fn for_rect(
        &self,
        rect: &SpatialRect,
        cancel: &CancelToken,
        fun: &mut impl FnMut(&SpatialRow) -> ControlFlow<()>,
    ) -> Result<ControlFlow<()>> {
        let mut cells = CellSet::new();
        transform::cell_rect(rect, &mut cells);
        debug!(cells = cells.len(), "for_rect");
        self.for_cell_set(&cells, cancel, fun)
    }

    fn for_cell_set(
        &self,
        cells: &CellSet,
        cancel: &CancelToken,
        fun: &mut impl FnMut(&SpatialRow) -> ControlFlow<()>,
    ) -> Result<ControlFlow<()>> {
        let mut seen = SparseSet::new();
        for cell in cells.iter() {
            cancel.check()?;
            let flow = self.for_cell(&cell, &mut |row| {
                if seen.insert(row.pk0) {
                    fun(row)
                } else {
                    ControlFlow::Continue(())
                }
            })?;
            if flow.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Every leaf row in cell order, start to end of the leaf chain.
    pub fn full_globe(
        &self,
        cancel: &CancelToken,
        fun: &mut impl FnMut(&SpatialRow) -> ControlFlow<()>,
    ) -> Result<ControlFlow<()>> {
        let mut loc = self.min_page;
        while !loc.is_null() {
            cancel.check()?;
            let page = self.pool.load_locator(loc)?;
            let view = page.view();
            let header = view.header()?;
            self.check_leaf_page(header)?;
            for slot in 0..header.slot_count() as usize {
                let row = self.leaf_row(&view, header, slot)?;
                if !row.is_ghost() && fun(&row).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            loc = header.next_page();
        }
        Ok(ControlFlow::Continue(()))
    }
}

impl std::fmt::Debug for SpatialTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialTree")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_tree {
    //! Builders for synthetic spatial tree files.

    use super::*;
    use crate::storage::page::test_page::PageBuilder;
    use crate::storage::PageType;
    use zerocopy::IntoBytes;

    pub fn index_row(cell: SpatialCell, pk0: i64, page: PageLocator) -> Vec<u8> {
        RawSpatialIndexRow {
            status: 0,
            cell: cell.to_bytes(),
            pk0: I64::new(pk0),
            page: RawPageLocator::set(page),
        }
        .as_bytes()
        .to_vec()
    }

    pub fn leaf_row(cell: SpatialCell, pk0: i64) -> Vec<u8> {
        leaf_row_status(cell, pk0, row_flags::HAS_NULL_BITMAP)
    }

    pub fn leaf_row_status(cell: SpatialCell, pk0: i64, status: u16) -> Vec<u8> {
        let mut bytes = RawSpatialLeafRow {
            status: U16::new(status),
            fixed_end: U16::new(SPATIAL_LEAF_ROW_LEN as u16),
            cell: cell.to_bytes(),
            pk0: I64::new(pk0),
            cell_attr: U32::new(1),
            srid: U32::new(4326),
        }
        .as_bytes()
        .to_vec();
        // Trailing column count and null bitmap, as data rows carry.
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.push(0);
        bytes
    }

    pub fn index_page(
        id: PageLocator,
        level: u8,
        rows: Vec<Vec<u8>>,
        prev: PageLocator,
        next: PageLocator,
    ) -> Vec<u8> {
        let mut b = PageBuilder::new(PageType::Index, id)
            .pminlen(SPATIAL_INDEX_ROW_LEN as u16)
            .level(level)
            .prev(prev)
            .next(next);
        for row in rows {
            b = b.row(row);
        }
        b.build()
    }

    pub fn leaf_page(
        id: PageLocator,
        rows: Vec<Vec<u8>>,
        prev: PageLocator,
        next: PageLocator,
    ) -> Vec<u8> {
        let mut b = PageBuilder::new(PageType::Data, id)
            .pminlen(SPATIAL_LEAF_ROW_LEN as u16)
            .prev(prev)
            .next(next);
        for row in rows {
            b = b.row(row);
        }
        b.build()
    }
}

#[cfg(test)]
mod tests {
    use super::test_tree::*;
    use super::*;
    use crate::config::{PoolConfig, ARENA_SIZE};
    use crate::storage::page::test_page::PageBuilder;
    use crate::storage::{DataFile, PageType};
    use std::io::Write;

    fn cell(id: [u8; 4]) -> SpatialCell {
        SpatialCell::new(id, 4)
    }

    fn loc(page: u32) -> PageLocator {
        PageLocator::new(page, 1)
    }

    /// Two leaves under one root:
    ///   leaf 1: (1,0,0,0) pk1, (1,1,0,0) pk2
    ///   leaf 2: (1,2,0,0) pk3, (2,0,0,0) pk4
    fn build_tree() -> (tempfile::TempDir, PagePool) {
        let root = index_page(
            loc(0),
            1,
            vec![
                index_row(cell([0, 0, 0, 0]), 0, loc(1)), // placeholder
                index_row(cell([1, 2, 0, 0]), 3, loc(2)),
            ],
            PageLocator::NULL,
            PageLocator::NULL,
        );
        let leaf1 = leaf_page(
            loc(1),
            vec![
                leaf_row(cell([1, 0, 0, 0]), 1),
                leaf_row(cell([1, 1, 0, 0]), 2),
            ],
            PageLocator::NULL,
            loc(2),
        );
        let leaf2 = leaf_page(
            loc(2),
            vec![
                leaf_row(cell([1, 2, 0, 0]), 3),
                leaf_row(cell([2, 0, 0, 0]), 4),
            ],
            loc(1),
            PageLocator::NULL,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spatial.mdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&root).unwrap();
        f.write_all(&leaf1).unwrap();
        f.write_all(&leaf2).unwrap();
        for p in 3..8u32 {
            f.write_all(&PageBuilder::new(PageType::Data, loc(p)).build())
                .unwrap();
        }
        drop(f);

        let pool = PagePool::open(
            DataFile::open(&path).unwrap(),
            PoolConfig {
                reserve_bytes: ARENA_SIZE,
                ..PoolConfig::default()
            },
        )
        .unwrap();
        assert_eq!(pool.file().page_count(), 8);
        (dir, pool)
    }

    fn collect_pks(tree: &SpatialTree<'_>, query: SpatialCell) -> Vec<i64> {
        let mut pks = Vec::new();
        tree.for_cell(&query, &mut |row| {
            pks.push(row.pk0);
            ControlFlow::Continue(())
        })
        .unwrap();
        pks
    }

    #[test]
    fn min_and_max_leaves_are_cached() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        assert_eq!(tree.min_page(), loc(1));
        assert_eq!(tree.max_page(), loc(2));
        assert_eq!(tree.min_cell().unwrap(), cell([1, 0, 0, 0]));
        assert_eq!(tree.max_cell().unwrap(), cell([2, 0, 0, 0]));
    }

    #[test]
    fn find_page_descends_by_cell() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        assert_eq!(tree.find_page(&cell([1, 0, 0, 0])).unwrap(), loc(1));
        assert_eq!(tree.find_page(&cell([1, 3, 0, 0])).unwrap(), loc(2));
        assert_eq!(tree.find_page(&cell([9, 0, 0, 0])).unwrap(), loc(2));
        // Smaller than everything: the placeholder routes left.
        assert_eq!(tree.find_page(&cell([0, 0, 0, 1])).unwrap(), loc(1));
    }

    #[test]
    fn find_cell_lands_on_the_first_intersection() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let rid = tree
            .find_cell(&SpatialCell::new([1, 0, 0, 0], 1))
            .unwrap()
            .unwrap();
        assert_eq!(rid, RecordId::new(loc(1), 0));
        // Beyond every cell in the tree.
        assert!(tree.find_cell(&cell([3, 0, 0, 0])).unwrap().is_none());
    }

    #[test]
    fn depth_one_query_spans_the_page_boundary() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let pks = collect_pks(&tree, SpatialCell::new([1, 0, 0, 0], 1));
        assert_eq!(pks, vec![1, 2, 3]);
    }

    #[test]
    fn depth_two_query_hits_the_exact_cell() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let pks = collect_pks(&tree, SpatialCell::new([1, 1, 0, 0], 2));
        assert_eq!(pks, vec![2]);
    }

    #[test]
    fn break_stops_the_walk() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let mut pks = Vec::new();
        let flow = tree
            .for_cell(&SpatialCell::new([1, 0, 0, 0], 1), &mut |row| {
                pks.push(row.pk0);
                if pks.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert!(flow.is_break());
        assert_eq!(pks, vec![1, 2]);
    }

    #[test]
    fn full_globe_visits_every_row() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let mut pks = Vec::new();
        tree.full_globe(&CancelToken::new(), &mut |row| {
            pks.push(row.pk0);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(pks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn cancelled_full_globe_reports_cancelled() {
        let (_dir, pool) = build_tree();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = tree
            .full_globe(&cancel, &mut |_| ControlFlow::Continue(()))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Cancelled)
        ));
    }

    #[test]
    fn ghost_rows_are_skipped() {
        let root = index_page(
            loc(0),
            1,
            vec![index_row(cell([0, 0, 0, 0]), 0, loc(1))],
            PageLocator::NULL,
            PageLocator::NULL,
        );
        let leaf = leaf_page(
            loc(1),
            vec![
                leaf_row(cell([1, 0, 0, 0]), 1),
                leaf_row_status(
                    cell([1, 1, 0, 0]),
                    2,
                    row_flags::HAS_NULL_BITMAP | row_flags::GHOST,
                ),
                leaf_row(cell([1, 2, 0, 0]), 3),
            ],
            PageLocator::NULL,
            PageLocator::NULL,
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghost.mdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&root).unwrap();
        f.write_all(&leaf).unwrap();
        for p in 2..8u32 {
            f.write_all(&PageBuilder::new(PageType::Data, loc(p)).build())
                .unwrap();
        }
        drop(f);
        let pool = PagePool::open(
            DataFile::open(&path).unwrap(),
            PoolConfig {
                reserve_bytes: ARENA_SIZE,
                ..PoolConfig::default()
            },
        )
        .unwrap();
        let tree = SpatialTree::new(&pool, loc(0)).unwrap();
        let pks = collect_pks(&tree, SpatialCell::new([1, 0, 0, 0], 1));
        assert_eq!(pks, vec![1, 3]);
    }
}
