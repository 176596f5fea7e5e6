//! # Page Types and Header Layout
//!
//! Every 8KB page begins with a 96-byte header. Rows grow upward from the
//! header; a slot array of 2-byte row offsets grows downward from the page
//! end.
//!
//! ## Page Header Layout (96 bytes)
//!
//! ```text
//! Offset  Size  Field          Description
//! ------  ----  -------------  ----------------------------------------
//! 0x00    1     header_version Format version (1)
//! 0x01    1     page_type      Type of page (data, index, IAM, ...)
//! 0x02    1     type_flags     Per-type flag bits
//! 0x03    1     level          B-tree level (0 = leaf)
//! 0x04    2     flag_bits      Page flag bits
//! 0x06    2     index_id       Owning index
//! 0x08    6     prev_page      Previous page on the same level
//! 0x0E    2     pminlen        Minimum (fixed) row length
//! 0x10    6     next_page      Next page on the same level
//! 0x16    2     slot_count     Number of slots in the slot array
//! 0x18    4     obj_id         Owning object
//! 0x1C    2     free_count     Free bytes on the page
//! 0x1E    2     free_data      Offset of the free-space start
//! 0x20    6     page_id        Self locator, verified against the request
//! 0x26    2     reserved_count
//! 0x28    10    lsn            Logical sequence number
//! 0x32    2     xact_reserved
//! 0x34    6     xdes_id
//! 0x3A    2     ghost_rec_count
//! 0x3C    4     torn_bits
//! 0x40    32    reserved
//! ```
//!
//! All multi-byte fields are little-endian. The 6-byte locators break
//! natural alignment, so the struct is fully `Unaligned` and every integer
//! field uses a `zerocopy::little_endian` type.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::error::EngineError;

/// Page types of the host format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Unknown = 0,
    Data = 1,
    Index = 2,
    TextMix = 3,
    TextTree = 4,
    Sort = 7,
    Gam = 8,
    Sgam = 9,
    Iam = 10,
    Pfs = 11,
    Boot = 13,
    FileHeader = 15,
    DiffMap = 16,
    MlMap = 17,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => PageType::Data,
            2 => PageType::Index,
            3 => PageType::TextMix,
            4 => PageType::TextTree,
            7 => PageType::Sort,
            8 => PageType::Gam,
            9 => PageType::Sgam,
            10 => PageType::Iam,
            11 => PageType::Pfs,
            13 => PageType::Boot,
            15 => PageType::FileHeader,
            16 => PageType::DiffMap,
            17 => PageType::MlMap,
            _ => PageType::Unknown,
        }
    }
}

/// 6-byte on-disk page locator: `{ uint32 pageId; uint16 fileId }`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RawPageLocator {
    page: U32,
    file: U16,
}

impl RawPageLocator {
    pub fn get(&self) -> PageLocator {
        PageLocator {
            page: self.page.get(),
            file: self.file.get(),
        }
    }

    pub fn set(loc: PageLocator) -> Self {
        Self {
            page: U32::new(loc.page),
            file: U16::new(loc.file),
        }
    }
}

/// Logical page locator. `(0, 0)` is the null locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageLocator {
    pub page: u32,
    pub file: u16,
}

impl PageLocator {
    pub const NULL: PageLocator = PageLocator { page: 0, file: 0 };

    pub fn new(page: u32, file: u16) -> Self {
        Self { page, file }
    }

    pub fn is_null(&self) -> bool {
        self.page == 0 && self.file == 0
    }
}

impl std::fmt::Display for PageLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.page)
    }
}

/// 8-byte record identifier: page locator plus slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page: PageLocator,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page: PageLocator, slot: u16) -> Self {
        Self { page, slot }
    }

    pub fn is_null(&self) -> bool {
        self.page.is_null()
    }

    /// Decodes the on-disk form `{ locator(6), slot(2) }`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= 8, "record id needs 8 bytes, got {}", bytes.len());
        let loc = RawPageLocator::read_from_bytes(&bytes[..6])
            .map_err(|e| eyre::eyre!("failed to read record id locator: {:?}", e))?;
        let slot = u16::from_le_bytes([bytes[6], bytes[7]]);
        Ok(Self {
            page: loc.get(),
            slot,
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    header_version: u8,
    page_type: u8,
    type_flags: u8,
    level: u8,
    flag_bits: U16,
    index_id: U16,
    prev_page: RawPageLocator,
    pminlen: U16,
    next_page: RawPageLocator,
    slot_count: U16,
    obj_id: U32,
    free_count: U16,
    free_data: U16,
    page_id: RawPageLocator,
    reserved_count: U16,
    lsn: [u8; 10],
    xact_reserved: U16,
    xdes_id: [u8; 6],
    ghost_rec_count: U16,
    torn_bits: U32,
    reserved: [u8; 32],
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    pub fn from_page(data: &[u8]) -> Result<&Self> {
        super::parse_zerocopy(data, "PageHeader")
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn prev_page(&self) -> PageLocator {
        self.prev_page.get()
    }

    pub fn next_page(&self) -> PageLocator {
        self.next_page.get()
    }

    pub fn page_id(&self) -> PageLocator {
        self.page_id.get()
    }

    pub fn pminlen(&self) -> u16 {
        self.pminlen.get()
    }

    pub fn slot_count(&self) -> u16 {
        self.slot_count.get()
    }

    pub fn free_data(&self) -> u16 {
        self.free_data.get()
    }

    pub fn ghost_rec_count(&self) -> u16 {
        self.ghost_rec_count.get()
    }

    pub fn torn_bits(&self) -> u32 {
        self.torn_bits.get()
    }

    pub fn lsn(&self) -> &[u8; 10] {
        &self.lsn
    }

    pub fn is_data(&self) -> bool {
        self.page_type() == PageType::Data
    }

    pub fn is_index(&self) -> bool {
        self.page_type() == PageType::Index
    }
}

/// Immutable view of one page image: header plus slot array.
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    data: &'a [u8],
}

impl<'a> PageView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        Ok(Self { data })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn header(&self) -> Result<&'a PageHeader> {
        super::parse_zerocopy(self.data, "PageHeader")
    }

    pub fn slot_count(&self) -> usize {
        // Header parse cannot fail once the view exists (size checked).
        self.header().map(|h| h.slot_count() as usize).unwrap_or(0)
    }

    /// Row offset recorded in slot `i`. The slot array grows downward from
    /// the page end, two bytes per slot.
    pub fn slot_offset(&self, slot: usize) -> Result<usize> {
        let header = self.header()?;
        let count = header.slot_count() as usize;
        if slot >= count {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                format!("slot {} out of range ({} slots)", slot, count)
            ));
        }
        let pos = PAGE_SIZE - 2 * (slot + 1);
        let offset = u16::from_le_bytes([self.data[pos], self.data[pos + 1]]) as usize;
        if offset < PAGE_HEADER_SIZE || offset >= PAGE_SIZE - 2 * count {
            eyre::bail!(EngineError::corruption(
                header.page_id(),
                format!("slot {} offset {} outside the row area", slot, offset)
            ));
        }
        Ok(offset)
    }

    /// Byte range of the row at `slot`, from its recorded offset to the
    /// start of the slot array. The decoder computes the true row end.
    pub fn row_bytes(&self, slot: usize) -> Result<&'a [u8]> {
        let offset = self.slot_offset(slot)?;
        let count = self.slot_count();
        Ok(&self.data[offset..PAGE_SIZE - 2 * count])
    }

    /// Ordered sequence of row offsets.
    pub fn slots(&self) -> impl Iterator<Item = Result<usize>> + '_ {
        (0..self.slot_count()).map(move |i| self.slot_offset(i))
    }
}

/// Structural validation applied by the pool after a load: the self-recorded
/// locator must match the requested page.
pub fn verify_self_id(data: &[u8], expected: PageLocator) -> Result<()> {
    let header = PageHeader::from_page(data)?;
    let actual = header.page_id();
    if actual != expected {
        eyre::bail!(EngineError::corruption(
            expected,
            format!("self id {} disagrees with requested page", actual)
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_page::PageBuilder;
    use super::*;

    #[test]
    fn page_header_is_96_bytes() {
        assert_eq!(std::mem::size_of::<PageHeader>(), 96);
    }

    #[test]
    fn header_round_trips_through_builder() {
        let id = PageLocator::new(42, 1);
        let data = PageBuilder::new(PageType::Data, id)
            .pminlen(25)
            .next(PageLocator::new(43, 1))
            .build();
        let header = PageHeader::from_page(&data).unwrap();
        assert_eq!(header.page_type(), PageType::Data);
        assert_eq!(header.page_id(), id);
        assert_eq!(header.pminlen(), 25);
        assert_eq!(header.next_page(), PageLocator::new(43, 1));
        assert!(header.prev_page().is_null());
    }

    #[test]
    fn slot_array_reads_back_in_order() {
        let data = PageBuilder::new(PageType::Data, PageLocator::new(5, 1))
            .row(vec![1; 30])
            .row(vec![2; 20])
            .row(vec![3; 10])
            .build();
        let view = PageView::new(&data).unwrap();
        assert_eq!(view.slot_count(), 3);
        assert_eq!(view.slot_offset(0).unwrap(), 96);
        assert_eq!(view.slot_offset(1).unwrap(), 126);
        assert_eq!(view.slot_offset(2).unwrap(), 146);
        assert_eq!(view.row_bytes(1).unwrap()[0], 2);
    }

    #[test]
    fn out_of_range_slot_is_corruption() {
        let data = PageBuilder::new(PageType::Data, PageLocator::new(5, 1))
            .row(vec![0; 10])
            .build();
        let view = PageView::new(&data).unwrap();
        let err = view.slot_offset(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Corruption { .. })
        ));
    }

    #[test]
    fn slot_offset_inside_header_is_corruption() {
        let mut data = PageBuilder::new(PageType::Data, PageLocator::new(5, 1))
            .row(vec![0; 10])
            .build();
        let pos = PAGE_SIZE - 2;
        data[pos..pos + 2].copy_from_slice(&10u16.to_le_bytes());
        let view = PageView::new(&data).unwrap();
        assert!(view.slot_offset(0).is_err());
    }

    #[test]
    fn self_id_verification() {
        let id = PageLocator::new(9, 1);
        let data = PageBuilder::new(PageType::Boot, id).build();
        verify_self_id(&data, id).unwrap();
        assert!(verify_self_id(&data, PageLocator::new(10, 1)).is_err());
    }

    #[test]
    fn null_locator() {
        assert!(PageLocator::NULL.is_null());
        assert!(!PageLocator::new(0, 1).is_null());
        assert!(!PageLocator::new(1, 0).is_null());
    }

    #[test]
    fn record_id_from_bytes() {
        let bytes = [7, 0, 0, 0, 1, 0, 3, 0];
        let rid = RecordId::from_bytes(&bytes).unwrap();
        assert_eq!(rid.page, PageLocator::new(7, 1));
        assert_eq!(rid.slot, 3);
    }
}
