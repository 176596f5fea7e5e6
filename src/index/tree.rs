//! # Clustered-Index Walker
//!
//! Descends an on-disk B-tree from its root to the leaf data page holding a
//! composite key. Internal (index) pages hold fixed-size rows of
//! `{ status(1), key bytes, child locator(6) }`; leaf (data) pages hold the
//! table's records, ordered by the cluster key.
//!
//! The first slot of a page whose `prev` locator is null — the leftmost
//! page of its level — carries a placeholder key and is treated as negative
//! infinity during the descent.
//!
//! Scans are cursors over the leaf level: forward iteration follows each
//! page's `next` neighbor, reverse follows `prev`, and a cursor whose page
//! is exhausted in both directions reports the end sentinel. Ghost records
//! are skipped. The cooperative cancel flag is checked at every page
//! boundary.

use std::cmp::Ordering;

use eyre::Result;
use tracing::trace;

use crate::error::{CancelToken, EngineError};
use crate::index::key::compare_keys;
use crate::schema::TableSchema;
use crate::storage::page::{PageHeader, PageLocator, PageView, RecordId};
use crate::storage::record::RecordView;
use crate::storage::{PagePool, PageRef};

/// Status byte plus child locator around the key bytes of an index row.
const INDEX_ROW_OVERHEAD: usize = 1 + 6;

pub struct IndexTree<'p> {
    pool: &'p PagePool,
    schema: &'p TableSchema,
    root: PageLocator,
}

impl<'p> IndexTree<'p> {
    pub fn new(pool: &'p PagePool, schema: &'p TableSchema, root: PageLocator) -> Result<Self> {
        eyre::ensure!(!root.is_null(), "index root is the null locator");
        eyre::ensure!(
            !schema.cluster_key().is_empty(),
            "table '{}' has no cluster key",
            schema.name()
        );
        Ok(Self { pool, schema, root })
    }

    pub fn root(&self) -> PageLocator {
        self.root
    }

    fn expected_pminlen(&self) -> usize {
        INDEX_ROW_OVERHEAD + self.schema.key_length()
    }

    /// Key bytes and child locator of row `slot` on an index page.
    fn index_row<'a>(
        &self,
        view: &PageView<'a>,
        header: &PageHeader,
        slot: usize,
    ) -> Result<(&'a [u8], PageLocator)> {
        let key_len = self.schema.key_length();
        let row = view.row_bytes(slot)?;
        if row.len() < self.expected_pminlen() {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                format!("index row {} shorter than its key", slot)
            ));
        }
        let key = &row[1..1 + key_len];
        let child = crate::storage::parse_zerocopy::<crate::storage::page::RawPageLocator>(
            &row[1 + key_len..],
            "child locator",
        )?
        .get();
        Ok((key, child))
    }

    /// Child slot to descend into for `key`: the largest row whose key
    /// compares `<= key`, with the leftmost page's first row standing in
    /// for negative infinity.
    fn find_slot(&self, view: &PageView<'_>, header: &PageHeader, key: &[u8]) -> Result<usize> {
        let count = header.slot_count() as usize;
        if count == 0 {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                "index page with no rows".to_string()
            ));
        }
        let placeholder_first = header.prev_page().is_null();

        // partition_point over "row belongs at or before the key".
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let le = if mid == 0 && placeholder_first {
                true
            } else {
                let (row_key, _) = self.index_row(view, header, mid)?;
                compare_keys(self.schema, row_key, key) != Ordering::Greater
            };
            if le {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo.saturating_sub(1))
    }

    fn check_index_page(&self, header: &PageHeader) -> Result<()> {
        let want = self.expected_pminlen();
        if header.pminlen() as usize != want {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                format!(
                    "index row length {} does not fit a {}-byte key",
                    header.pminlen(),
                    self.schema.key_length()
                )
            ));
        }
        Ok(())
    }

    /// Descends to the leaf data page that owns `key`.
    ///
    /// Never returns the null locator: a descent that cannot reach a data
    /// page is a corruption failure naming the offending page.
    pub fn find_page(&self, key: &[u8]) -> Result<PageLocator> {
        let mut loc = self.root;
        loop {
            let page = self.pool.load_locator(loc)?;
            let view = page.view();
            let header = view.header()?;
            if header.is_data() {
                trace!(page = %loc, "descent reached leaf");
                return Ok(loc);
            }
            if !header.is_index() {
                eyre::bail!(EngineError::corruption(
                    loc,
                    format!("unexpected page type {:?} during descent", header.page_type())
                ));
            }
            self.check_index_page(header)?;
            let slot = self.find_slot(&view, header, key)?;
            let (_, child) = self.index_row(&view, header, slot)?;
            if child.is_null() {
                eyre::bail!(EngineError::corruption(
                    loc,
                    format!("index row {} points at the null locator", slot)
                ));
            }
            trace!(page = %loc, slot, child = %child, "descending");
            loc = child;
        }
    }

    /// Slot of the first leaf record with cluster key `>= key`, which may
    /// be one past the last slot.
    fn leaf_lower_bound(&self, view: &PageView<'_>, key: &[u8]) -> Result<usize> {
        let header = view.header()?;
        let count = header.slot_count() as usize;
        let mut buf = Vec::with_capacity(self.schema.key_length());
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let row = RecordView::parse(view.row_bytes(mid)?, self.schema, header.page_id())?;
            row.cluster_key_bytes(&mut buf)?;
            if compare_keys(self.schema, &buf, key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Exact lookup: the record whose cluster key equals `key`, if present
    /// and not a ghost.
    pub fn find_record(&self, key: &[u8]) -> Result<Option<RecordId>> {
        let loc = self.find_page(key)?;
        let page = self.pool.load_locator(loc)?;
        let view = page.view();
        let header = view.header()?;
        let slot = self.leaf_lower_bound(&view, key)?;
        if slot >= header.slot_count() as usize {
            return Ok(None);
        }
        let row = RecordView::parse(view.row_bytes(slot)?, self.schema, loc)?;
        let mut buf = Vec::with_capacity(self.schema.key_length());
        row.cluster_key_bytes(&mut buf)?;
        if compare_keys(self.schema, &buf, key) != Ordering::Equal || row.is_ghost() {
            return Ok(None);
        }
        Ok(Some(RecordId::new(loc, slot as u16)))
    }

    /// Positions a cursor at the first record with cluster key `>= key`.
    pub fn lower_bound(&self, key: &[u8], cancel: CancelToken) -> Result<Cursor<'p>> {
        let loc = self.find_page(key)?;
        let page = self.pool.load_locator(loc)?;
        let slot = self.leaf_lower_bound(&page.view(), key)?;
        Ok(Cursor {
            pool: self.pool,
            schema: self.schema,
            page: Some(page),
            slot,
            cancel,
        })
    }
}

impl std::fmt::Debug for IndexTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTree")
            .field("root", &self.root)
            .field("table", &self.schema.name())
            .finish()
    }
}

/// Leaf-level scan position. `slot` is the index of the next record a
/// forward step yields; a cursor with no page is the end sentinel.
pub struct Cursor<'p> {
    pool: &'p PagePool,
    schema: &'p TableSchema,
    page: Option<PageRef<'p>>,
    slot: usize,
    cancel: CancelToken,
}

impl<'p> Cursor<'p> {
    /// Current position, or `None` at the end sentinel.
    pub fn position(&self) -> Option<RecordId> {
        self.page
            .as_ref()
            .map(|p| RecordId::new(p.locator(), self.slot as u16))
    }

    fn ensure_data_page(page: &PageRef<'_>) -> Result<()> {
        let header = page.view().header()?;
        if !header.is_data() {
            eyre::bail!(EngineError::corruption(
                page.locator(),
                format!("leaf chain reached a {:?} page", header.page_type())
            ));
        }
        Ok(())
    }

    /// Advances forward, skipping ghosts. Exhausting a page follows its
    /// `next` neighbor.
    pub fn next(&mut self) -> Result<Option<RecordId>> {
        loop {
            let Some(page) = self.page.as_ref() else {
                return Ok(None);
            };
            let view = page.view();
            let header = view.header()?;
            if self.slot < header.slot_count() as usize {
                let slot = self.slot;
                self.slot += 1;
                let row = RecordView::parse(view.row_bytes(slot)?, self.schema, page.locator());
                // Ghost filtering needs the parsed row; parse failures
                // abort the scan as corruption.
                match row {
                    Ok(r) if r.is_ghost() => continue,
                    Ok(_) => return Ok(Some(RecordId::new(page.locator(), slot as u16))),
                    Err(e) => return Err(e),
                }
            }
            let next = header.next_page();
            if next.is_null() {
                self.page = None;
                return Ok(None);
            }
            self.cancel.check()?;
            let next_page = self.pool.load_locator(next)?;
            Self::ensure_data_page(&next_page)?;
            self.page = Some(next_page);
            self.slot = 0;
        }
    }

    /// Steps backward, skipping ghosts. Exhausting a page follows its
    /// `prev` neighbor.
    pub fn prev(&mut self) -> Result<Option<RecordId>> {
        loop {
            let Some(page) = self.page.as_ref() else {
                return Ok(None);
            };
            let view = page.view();
            let header = view.header()?;
            if self.slot > 0 {
                self.slot -= 1;
                let slot = self.slot;
                let row =
                    RecordView::parse(view.row_bytes(slot)?, self.schema, page.locator());
                match row {
                    Ok(r) if r.is_ghost() => continue,
                    Ok(_) => return Ok(Some(RecordId::new(page.locator(), slot as u16))),
                    Err(e) => return Err(e),
                }
            }
            let prev = header.prev_page();
            if prev.is_null() {
                self.page = None;
                return Ok(None);
            }
            self.cancel.check()?;
            let prev_page = self.pool.load_locator(prev)?;
            Self::ensure_data_page(&prev_page)?;
            self.slot = prev_page.view().header()?.slot_count() as usize;
            self.page = Some(prev_page);
        }
    }
}
