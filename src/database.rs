//! # Database Facade
//!
//! Opens an MDF file, validates its boot page and hands out table and
//! spatial-tree handles bound to the page pool. Schemas come from the
//! caller (the system catalog lives outside this engine); a handle is just
//! a schema plus an index-root locator.
//!
//! ## Boot page
//!
//! The boot page lives at `(1, 9)` and carries the database name (UCS-2,
//! 128 characters), the version and the locator of the first
//! system-catalog allocation unit:
//!
//! ```text
//! offset in record  field
//! 0x04              version (u16)
//! 0x34              name, 128 UCS-2 characters (256 bytes)
//! 0x134             first system-catalog allocation unit locator (6 bytes)
//! ```
//!
//! Any failure to open or validate — missing file, ragged size, wrong boot
//! page type, truncated boot record — surfaces as the `bad-open` kind.

use std::path::Path;
use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use crate::config::PoolConfig;
use crate::error::{CancelToken, EngineError};
use crate::index::{encode_key, Cursor, IndexTree, KeyValue};
use crate::schema::TableSchema;
use crate::spatial::SpatialTree;
use crate::storage::page::RawPageLocator;
use crate::storage::record::{OverflowChain, RecordView};
use crate::storage::{DataFile, PageLocator, PagePool, PageType, PoolStats, RecordId};

const BOOT_PAGE_INDEX: u32 = 9;
const BOOT_VERSION_OFFSET: usize = 0x04;
const BOOT_DBNAME_OFFSET: usize = 0x34;
const BOOT_DBNAME_CHARS: usize = 128;
const BOOT_FIRST_SYS_OFFSET: usize = BOOT_DBNAME_OFFSET + 2 * BOOT_DBNAME_CHARS;
const BOOT_RECORD_MIN: usize = BOOT_FIRST_SYS_OFFSET + 6;

/// Longest forwarding chain a record lookup follows before giving up.
const MAX_FORWARD_HOPS: usize = 4;

/// Decoded boot-page facts.
#[derive(Debug, Clone, PartialEq)]
pub struct BootInfo {
    pub name: String,
    pub version: u16,
    pub first_sys_indexes: PageLocator,
}

pub struct Database {
    pool: PagePool,
    boot: BootInfo,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(
            path,
            PoolConfig::default(),
            Arc::new(PoolStats::default()),
        )
    }

    pub fn open_with<P: AsRef<Path>>(
        path: P,
        config: PoolConfig,
        stats: Arc<PoolStats>,
    ) -> Result<Self> {
        let file = DataFile::open(path)?;
        let pool = PagePool::with_stats(file, config, stats)?;
        let boot = Self::read_boot(&pool)?;
        debug!(name = %boot.name, version = boot.version, "database open");
        Ok(Self { pool, boot })
    }

    fn read_boot(pool: &PagePool) -> Result<BootInfo> {
        if pool.page_count() <= BOOT_PAGE_INDEX {
            eyre::bail!(EngineError::bad_open(format!(
                "file of {} pages has no boot page",
                pool.page_count()
            )));
        }
        let page = pool.load(BOOT_PAGE_INDEX).map_err(|e| {
            eyre::Report::new(EngineError::bad_open(format!("boot page unreadable: {}", e)))
        })?;
        let view = page.view();
        let header = view.header()?;
        if header.page_type() != PageType::Boot {
            eyre::bail!(EngineError::bad_open(format!(
                "page (1, 9) has type {:?}, expected the boot page",
                header.page_type()
            )));
        }
        if header.slot_count() == 0 {
            eyre::bail!(EngineError::bad_open("boot page has no record".to_string()));
        }
        let record = view.row_bytes(0)?;
        if record.len() < BOOT_RECORD_MIN {
            eyre::bail!(EngineError::bad_open(format!(
                "boot record of {} bytes is truncated",
                record.len()
            )));
        }

        let version = u16::from_le_bytes([
            record[BOOT_VERSION_OFFSET],
            record[BOOT_VERSION_OFFSET + 1],
        ]);
        let units: Vec<u16> = record
            [BOOT_DBNAME_OFFSET..BOOT_DBNAME_OFFSET + 2 * BOOT_DBNAME_CHARS]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        let name = String::from_utf16_lossy(&units);
        let first_sys_indexes =
            crate::storage::parse_zerocopy::<RawPageLocator>(
                &record[BOOT_FIRST_SYS_OFFSET..],
                "boot catalog locator",
            )?
            .get();

        Ok(BootInfo {
            name,
            version,
            first_sys_indexes,
        })
    }

    pub fn boot(&self) -> &BootInfo {
        &self.boot
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    /// Binds a table handle: the caller supplies the schema and the
    /// clustered-index root.
    pub fn table<'db>(
        &'db self,
        schema: &'db TableSchema,
        index_root: PageLocator,
    ) -> Result<Table<'db>> {
        Ok(Table {
            pool: &self.pool,
            schema,
            tree: IndexTree::new(&self.pool, schema, index_root)?,
        })
    }

    /// Binds a spatial-tree walker to its index root.
    pub fn spatial_tree(&self, root: PageLocator) -> Result<SpatialTree<'_>> {
        SpatialTree::new(&self.pool, root)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.boot.name)
            .field("pages", &self.pool.page_count())
            .finish()
    }
}

/// A clustered table bound to the pool: key lookups, ordered scans and
/// indirection resolution.
pub struct Table<'db> {
    pool: &'db PagePool,
    schema: &'db TableSchema,
    tree: IndexTree<'db>,
}

impl<'db> Table<'db> {
    pub fn schema(&self) -> &TableSchema {
        self.schema
    }

    pub fn index_root(&self) -> PageLocator {
        self.tree.root()
    }

    /// Leaf page owning the given key values.
    pub fn find_page(&self, values: &[KeyValue]) -> Result<PageLocator> {
        let key = encode_key(self.schema, values)?;
        self.tree.find_page(&key)
    }

    /// Exact-match lookup by key values.
    pub fn find_record(&self, values: &[KeyValue]) -> Result<Option<RecordId>> {
        let key = encode_key(self.schema, values)?;
        self.tree.find_record(&key)
    }

    /// Cursor at the first record with key `>=` the given values.
    pub fn lower_bound(&self, values: &[KeyValue], cancel: CancelToken) -> Result<Cursor<'db>> {
        let key = encode_key(self.schema, values)?;
        self.tree.lower_bound(&key, cancel)
    }

    /// Decodes the record at `rid`, following forwarding stubs, and hands
    /// the view to `fun`.
    pub fn with_record<R>(
        &self,
        rid: RecordId,
        fun: impl FnOnce(&RecordView<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut at = rid;
        for _ in 0..MAX_FORWARD_HOPS {
            let page = self.pool.load_locator(at.page)?;
            let view = page.view();
            let header = view.header()?;
            if !header.is_data() {
                eyre::bail!(EngineError::corruption(
                    at.page,
                    format!("record lookup on a {:?} page", header.page_type())
                ));
            }
            let row = RecordView::parse(view.row_bytes(at.slot as usize)?, self.schema, at.page)?;
            match row.forwarded_to()? {
                Some(destination) => at = destination,
                None => return fun(&row),
            }
        }
        eyre::bail!(EngineError::corruption(
            at.page,
            format!("forwarding chain longer than {} hops", MAX_FORWARD_HOPS)
        ));
    }

    /// Concatenates an overflow chain: walks the text pages the chain
    /// links to and rebuilds the column's full payload.
    pub fn read_overflow(&self, chain: &OverflowChain<'_>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(chain.total_len as usize);
        for link in chain.links() {
            let page = self.pool.load_locator(link.page)?;
            let view = page.view();
            let header = view.header()?;
            if !matches!(header.page_type(), PageType::TextMix | PageType::TextTree) {
                eyre::bail!(EngineError::corruption(
                    link.page,
                    format!("overflow chain reached a {:?} page", header.page_type())
                ));
            }
            let fragment = view.row_bytes(link.slot as usize)?;
            if fragment.len() < 4 {
                eyre::bail!(EngineError::corruption(
                    link.page,
                    "text fragment shorter than its header".to_string()
                ));
            }
            let len = u16::from_le_bytes([fragment[2], fragment[3]]) as usize;
            if fragment.len() < 4 + len {
                eyre::bail!(EngineError::corruption(
                    link.page,
                    format!("text fragment of {} bytes truncated", len)
                ));
            }
            out.extend_from_slice(&fragment[4..4 + len]);
        }
        if out.len() < chain.total_len as usize {
            eyre::bail!(EngineError::corruption(
                PageLocator::NULL,
                format!(
                    "overflow chain rebuilt {} of {} bytes",
                    out.len(),
                    chain.total_len
                )
            ));
        }
        out.truncate(chain.total_len as usize);
        Ok(out)
    }
}

impl std::fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.schema.name())
            .field("root", &self.tree.root())
            .finish()
    }
}
