//! # Row Decoder
//!
//! Interprets one data row against a [`TableSchema`] without copying. The
//! on-disk layout is:
//!
//! ```text
//! +--------+----------------+------+-------------+--------------------+----------+
//! | header | fixed columns  | ncol | null bitmap | var table (opt.)   | payloads |
//! | 4 B    | schema order   | 2 B  | ceil(n/8) B | 2 B count + 2 B*m  |          |
//! +--------+----------------+------+-------------+--------------------+----------+
//! ```
//!
//! The header is a 16-bit flag word plus the 16-bit offset of the end of
//! the fixed span (counted from the row start, so it includes the header
//! itself). Variable-column entries are cumulative end offsets from the row
//! start; an entry with the high bit set marks a *complex column* whose
//! first payload byte is a complex-type tag.
//!
//! A trailing variable column can be a forwarding stub (tag `0x05`) when
//! the row's forwarding-stub flag is set; the same tag without the flag is
//! a packed sparse vector, surfaced raw. Trailing null variable columns are
//! not stored at all, so the payload count may be smaller than the schema's
//! variable-column count.
//!
//! The decoder never follows indirection itself: overflow chains and
//! forwarding destinations are surfaced as values for the table layer to
//! resolve.

use eyre::Result;

use crate::error::EngineError;
use crate::schema::TableSchema;
use crate::storage::page::{PageLocator, RecordId};
use crate::types::{self, Value};

/// Row-header flag word (first two bytes of the row).
pub mod row_flags {
    pub const GHOST: u16 = 1 << 0;
    pub const HAS_NULL_BITMAP: u16 = 1 << 4;
    pub const HAS_VARIABLE: u16 = 1 << 5;
    pub const FORWARDING_STUB: u16 = 1 << 8;
    pub const FORWARDED: u16 = 1 << 9;
}

/// Complex-column type tags (first payload byte when the var-table entry
/// has its high bit set).
pub mod complex_tag {
    pub const ROW_OVERFLOW: u8 = 0x02;
    pub const BLOB_INLINE_ROOT: u8 = 0x04;
    /// Forwarding stub when the row's forwarding-stub flag is set,
    /// sparse vector otherwise.
    pub const FORWARDED: u8 = 0x05;
    pub const SPARSE_VECTOR: u8 = 0x05;
}

const ROW_HEADER_SIZE: usize = 4;
const COMPLEX_BIT: u16 = 0x8000;
const OVERFLOW_HEADER_SIZE: usize = 16;
const OVERFLOW_LINK_SIZE: usize = 8;

/// Out-of-row continuation of a row-overflow or LOB column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowKind {
    RowOverflow,
    BlobInlineRoot,
}

/// Parsed complex-column indirection: a 16-byte prefix carrying the full
/// length, then a chain of record links holding the remainder.
#[derive(Debug, Clone, Copy)]
pub struct OverflowChain<'a> {
    pub kind: OverflowKind,
    pub total_len: u32,
    payload: &'a [u8],
}

impl<'a> OverflowChain<'a> {
    fn parse(kind: OverflowKind, page: PageLocator, payload: &'a [u8]) -> Result<Self> {
        if payload.len() < OVERFLOW_HEADER_SIZE
            || (payload.len() - OVERFLOW_HEADER_SIZE) % OVERFLOW_LINK_SIZE != 0
        {
            eyre::bail!(EngineError::corruption(
                page,
                format!("overflow payload of {} bytes is malformed", payload.len())
            ));
        }
        let total_len = u32::from_le_bytes(payload[12..16].try_into().unwrap());
        Ok(Self {
            kind,
            total_len,
            payload,
        })
    }

    pub fn link_count(&self) -> usize {
        (self.payload.len() - OVERFLOW_HEADER_SIZE) / OVERFLOW_LINK_SIZE
    }

    /// Record links in chain order.
    pub fn links(&self) -> impl Iterator<Item = RecordId> + 'a {
        self.payload[OVERFLOW_HEADER_SIZE..]
            .chunks_exact(OVERFLOW_LINK_SIZE)
            .map(|c| RecordId::from_bytes(c).expect("chunk is exactly one link"))
    }
}

/// What a column resolves to inside one row image.
#[derive(Debug, Clone, Copy)]
pub enum ColumnValue<'a> {
    Null,
    Fixed(&'a [u8]),
    Variable(&'a [u8]),
    Overflow(OverflowChain<'a>),
    /// The row is a forwarding stub; decoding continues at this record.
    Forwarded(RecordId),
    /// Self-describing packed sparse form; not decoded by the core.
    SparseVector(&'a [u8]),
}

/// Zero-copy view of one decoded row.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    row: &'a [u8],
    schema: &'a TableSchema,
    page: PageLocator,
    status: u16,
    fixed_end: usize,
    column_count: usize,
    bitmap_start: usize,
    var_count: usize,
    var_table: usize,
}

impl<'a> RecordView<'a> {
    /// Parses a row starting at `row[0]`. `row` extends to the slot array,
    /// which bounds but does not define the row; the variable-column table
    /// defines the true end. `page` feeds corruption diagnostics only.
    pub fn parse(row: &'a [u8], schema: &'a TableSchema, page: PageLocator) -> Result<Self> {
        let corrupt = |reason: String| EngineError::corruption(page, reason);

        if row.len() < ROW_HEADER_SIZE {
            eyre::bail!(corrupt(format!("row of {} bytes has no header", row.len())));
        }
        let status = u16::from_le_bytes([row[0], row[1]]);
        let fixed_end = u16::from_le_bytes([row[2], row[3]]) as usize;

        if fixed_end < ROW_HEADER_SIZE || fixed_end + 2 > row.len() {
            eyre::bail!(corrupt(format!("fixed span end {} outside the row", fixed_end)));
        }
        if fixed_end - ROW_HEADER_SIZE != schema.fixed_size() {
            eyre::bail!(corrupt(format!(
                "fixed span is {} bytes, schema declares {}",
                fixed_end - ROW_HEADER_SIZE,
                schema.fixed_size()
            )));
        }
        if status & row_flags::HAS_NULL_BITMAP == 0 {
            eyre::bail!(corrupt("null bitmap missing".to_string()));
        }

        let column_count = u16::from_le_bytes([row[fixed_end], row[fixed_end + 1]]) as usize;
        if column_count != schema.column_count() {
            // A non-unique clustered index materializes a hidden uniquifier
            // that this engine does not model.
            if column_count == schema.column_count() + 1 {
                eyre::bail!(corrupt(format!(
                    "row reports {} columns, schema declares {}: uniquifier column present",
                    column_count,
                    schema.column_count()
                )));
            }
            eyre::bail!(corrupt(format!(
                "row reports {} columns, schema declares {}",
                column_count,
                schema.column_count()
            )));
        }

        let bitmap_start = fixed_end + 2;
        let bitmap_len = column_count.div_ceil(8);
        if bitmap_start + bitmap_len > row.len() {
            eyre::bail!(corrupt("null bitmap extends past the row".to_string()));
        }

        let mut view = Self {
            row,
            schema,
            page,
            status,
            fixed_end,
            column_count,
            bitmap_start,
            var_count: 0,
            var_table: bitmap_start + bitmap_len,
        };

        if status & row_flags::HAS_VARIABLE != 0 {
            let table = view.var_table;
            if table + 2 > row.len() {
                eyre::bail!(corrupt("variable-column count missing".to_string()));
            }
            let var_count = u16::from_le_bytes([row[table], row[table + 1]]) as usize;
            view.var_count = var_count;
            view.var_table = table + 2;
            if view.var_table + 2 * var_count > row.len() {
                eyre::bail!(corrupt("variable-column table extends past the row".to_string()));
            }
            // Forwarded rows append the forwarding back-pointer as an extra
            // variable payload; stubs carry only the stub payload.
            let allowed = if view.is_forwarded() || view.is_forwarding_stub() {
                schema.var_column_count() + 1
            } else {
                schema.var_column_count()
            };
            if var_count > allowed {
                eyre::bail!(corrupt(format!(
                    "{} variable payloads exceed the schema's {}",
                    var_count,
                    schema.var_column_count()
                )));
            }
            // Validate the offsets are monotonic and inside the row.
            let mut prev = view.payloads_start();
            for ix in 0..var_count {
                let end = view.var_end(ix);
                if end < prev || end > row.len() {
                    eyre::bail!(corrupt(format!(
                        "variable payload {} ends at {} outside [{}, {}]",
                        ix,
                        end,
                        prev,
                        row.len()
                    )));
                }
                prev = end;
            }
        }

        Ok(view)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_ghost(&self) -> bool {
        self.status & row_flags::GHOST != 0
    }

    pub fn is_forwarded(&self) -> bool {
        self.status & row_flags::FORWARDED != 0
    }

    pub fn is_forwarding_stub(&self) -> bool {
        self.status & row_flags::FORWARDING_STUB != 0
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Stored variable payloads (can be fewer than the schema's variable
    /// columns when trailing ones are null).
    pub fn stored_var_count(&self) -> usize {
        self.var_count
    }

    /// Total bytes this row occupies on the page.
    pub fn row_len(&self) -> usize {
        if self.var_count > 0 {
            self.var_end(self.var_count - 1)
        } else {
            self.bitmap_start + self.column_count.div_ceil(8)
        }
    }

    pub fn is_null(&self, i: usize) -> bool {
        let place = self.schema.place(i);
        let byte = self.row[self.bitmap_start + place / 8];
        byte & (1 << (place % 8)) != 0
    }

    fn payloads_start(&self) -> usize {
        self.var_table + 2 * self.var_count
    }

    fn var_end_raw(&self, ix: usize) -> u16 {
        let at = self.var_table + 2 * ix;
        u16::from_le_bytes([self.row[at], self.row[at + 1]])
    }

    fn var_end(&self, ix: usize) -> usize {
        (self.var_end_raw(ix) & !COMPLEX_BIT) as usize
    }

    fn var_is_complex(&self, ix: usize) -> bool {
        self.var_end_raw(ix) & COMPLEX_BIT != 0
    }

    fn var_payload(&self, ix: usize) -> &'a [u8] {
        let start = if ix == 0 {
            self.payloads_start()
        } else {
            self.var_end(ix - 1)
        };
        &self.row[start..self.var_end(ix)]
    }

    /// Raw bytes of a fixed column.
    pub fn fixed_bytes(&self, i: usize) -> Result<&'a [u8]> {
        let col = self.schema.column(i);
        if !col.is_fixed() {
            eyre::bail!(EngineError::TypeMismatch {
                column: i,
                requested: "fixed column",
                declared: col.scalar.name(),
            });
        }
        let start = ROW_HEADER_SIZE + self.schema.fixed_offset(i);
        let end = start + col.fixed_len() as usize;
        debug_assert!(end <= self.fixed_end);
        Ok(&self.row[start..end])
    }

    /// The forwarding destination of a stub row, if any.
    pub fn forwarded_to(&self) -> Result<Option<RecordId>> {
        if !self.is_forwarding_stub() || self.var_count == 0 {
            return Ok(None);
        }
        let payload = self.var_payload(self.var_count - 1);
        if payload.len() != 9 || payload[0] != complex_tag::FORWARDED {
            eyre::bail!(EngineError::corruption(
                self.page,
                "forwarding stub without a record-id payload".to_string()
            ));
        }
        Ok(Some(RecordId::from_bytes(&payload[1..])?))
    }

    /// Resolves declared column `i` to its value in this row.
    pub fn column(&self, i: usize) -> Result<ColumnValue<'a>> {
        if i >= self.column_count {
            eyre::bail!(EngineError::corruption(
                self.page,
                format!("column {} out of range ({} columns)", i, self.column_count)
            ));
        }
        if self.is_null(i) {
            return Ok(ColumnValue::Null);
        }
        let col = self.schema.column(i);
        if col.is_fixed() {
            return Ok(ColumnValue::Fixed(self.fixed_bytes(i)?));
        }

        let ordinal = self.schema.var_ordinal(i);
        if ordinal >= self.var_count {
            // Trailing null variable columns are not stored.
            return Ok(ColumnValue::Null);
        }

        let payload = self.var_payload(ordinal);
        if !self.var_is_complex(ordinal) {
            return Ok(ColumnValue::Variable(payload));
        }

        if payload.is_empty() {
            eyre::bail!(EngineError::corruption(
                self.page,
                format!("complex column {} has an empty payload", i)
            ));
        }
        match payload[0] {
            complex_tag::ROW_OVERFLOW => Ok(ColumnValue::Overflow(OverflowChain::parse(
                OverflowKind::RowOverflow,
                self.page,
                payload,
            )?)),
            complex_tag::BLOB_INLINE_ROOT => Ok(ColumnValue::Overflow(OverflowChain::parse(
                OverflowKind::BlobInlineRoot,
                self.page,
                payload,
            )?)),
            complex_tag::FORWARDED => {
                if self.is_forwarding_stub() {
                    Ok(ColumnValue::Forwarded(RecordId::from_bytes(&payload[1..])?))
                } else {
                    Ok(ColumnValue::SparseVector(payload))
                }
            }
            tag => eyre::bail!(EngineError::corruption(
                self.page,
                format!("unknown complex-column tag {:#04x}", tag)
            )),
        }
    }

    /// Typed view of column `i` via the scalar layer. Indirected columns
    /// come back as an error: the caller resolves chains first.
    pub fn value(&self, i: usize) -> Result<Value<'a>> {
        match self.column(i)? {
            ColumnValue::Null => Ok(Value::Null),
            ColumnValue::Fixed(bytes) | ColumnValue::Variable(bytes) => {
                types::decode(self.schema.column(i).scalar, bytes, i)
            }
            ColumnValue::SparseVector(bytes) => Ok(Value::Bytes(bytes)),
            ColumnValue::Overflow(_) | ColumnValue::Forwarded(_) => {
                eyre::bail!(EngineError::TypeMismatch {
                    column: i,
                    requested: "inline value",
                    declared: "indirected storage",
                })
            }
        }
    }

    /// Concatenated raw bytes of the cluster-key columns, for ordering.
    pub fn cluster_key_bytes(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.clear();
        for part in self.schema.cluster_key() {
            match self.column(part.column)? {
                ColumnValue::Fixed(bytes) => buf.extend_from_slice(bytes),
                other => eyre::bail!(EngineError::corruption(
                    self.page,
                    format!(
                        "cluster key column {} is not a stored fixed value ({:?})",
                        part.column, other
                    )
                )),
            }
        }
        Ok(())
    }
}

/// Serializes a row image for the given schema. The inverse of
/// [`RecordView::parse`]; the engine itself never writes rows, but the
/// walkers' tests need byte-exact fixtures and external tooling reuses it.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    fixed: Vec<u8>,
    nulls: Vec<bool>,
    vars: Vec<Option<(Vec<u8>, bool)>>,
    status_extra: u16,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, extra: u16) -> Self {
        self.status_extra |= extra;
        self
    }

    pub fn fixed(mut self, bytes: &[u8]) -> Self {
        self.fixed.extend_from_slice(bytes);
        self.nulls.push(false);
        self
    }

    pub fn null_fixed(mut self, width: usize) -> Self {
        self.fixed.extend(std::iter::repeat(0).take(width));
        self.nulls.push(true);
        self
    }

    pub fn var(mut self, bytes: &[u8]) -> Self {
        self.vars.push(Some((bytes.to_vec(), false)));
        self.nulls.push(false);
        self
    }

    pub fn complex_var(mut self, bytes: &[u8]) -> Self {
        self.vars.push(Some((bytes.to_vec(), true)));
        self.nulls.push(false);
        self
    }

    pub fn null_var(mut self) -> Self {
        self.vars.push(None);
        self.nulls.push(true);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let fixed_end = ROW_HEADER_SIZE + self.fixed.len();
        let column_count = self.nulls.len();
        let bitmap_len = column_count.div_ceil(8);

        // Trailing nulls are not stored.
        let stored = {
            let mut n = self.vars.len();
            while n > 0 && self.vars[n - 1].is_none() {
                n -= 1;
            }
            n
        };

        let mut status = row_flags::HAS_NULL_BITMAP | self.status_extra;
        if stored > 0 {
            status |= row_flags::HAS_VARIABLE;
        }

        let mut row = Vec::new();
        row.extend_from_slice(&status.to_le_bytes());
        row.extend_from_slice(&(fixed_end as u16).to_le_bytes());
        row.extend_from_slice(&self.fixed);
        row.extend_from_slice(&(column_count as u16).to_le_bytes());

        let mut bitmap = vec![0u8; bitmap_len];
        // The builder lays columns out fixed-first, so declaration order is
        // already physical order here.
        for (place, is_null) in self.nulls.iter().enumerate() {
            if *is_null {
                bitmap[place / 8] |= 1 << (place % 8);
            }
        }
        row.extend_from_slice(&bitmap);

        if stored > 0 {
            row.extend_from_slice(&(stored as u16).to_le_bytes());
            let table_at = row.len();
            row.extend(std::iter::repeat(0).take(2 * stored));
            let mut end = row.len();
            for (ix, slot) in self.vars[..stored].iter().enumerate() {
                let (bytes, complex) = match slot {
                    Some((bytes, complex)) => (bytes.as_slice(), *complex),
                    None => (&[][..], false),
                };
                row.extend_from_slice(bytes);
                end += bytes.len();
                let mut entry = end as u16;
                if complex {
                    entry |= COMPLEX_BIT;
                }
                row[table_at + 2 * ix..table_at + 2 * ix + 2]
                    .copy_from_slice(&entry.to_le_bytes());
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SortOrder, TableSchema};
    use crate::types::ScalarType;

    fn schema() -> TableSchema {
        TableSchema::builder("t")
            .column("id", ScalarType::Int, false)
            .column("score", ScalarType::Float, true)
            .column("name", ScalarType::NVarChar, true)
            .column("blob", ScalarType::VarBinary, true)
            .key("id", SortOrder::Ascending)
            .build()
            .unwrap()
    }

    fn page() -> PageLocator {
        PageLocator::new(11, 1)
    }

    #[test]
    fn round_trips_fixed_and_variable_columns() {
        let schema = schema();
        let row = RecordBuilder::new()
            .fixed(&7i32.to_le_bytes())
            .fixed(&2.5f64.to_le_bytes())
            .var(&[b'a', 0, b'b', 0])
            .var(&[9, 9, 9])
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert_eq!(view.column_count(), 4);
        assert_eq!(view.value(0).unwrap(), Value::Int(7));
        assert_eq!(view.value(1).unwrap(), Value::Float(2.5));
        assert_eq!(view.value(2).unwrap(), Value::NChar("ab".into()));
        assert_eq!(view.value(3).unwrap(), Value::Bytes(&[9, 9, 9]));
        assert_eq!(view.row_len(), row.len());
    }

    #[test]
    fn null_bitmap_is_read_in_physical_order() {
        let schema = schema();
        let row = RecordBuilder::new()
            .fixed(&1i32.to_le_bytes())
            .null_fixed(8)
            .null_var()
            .var(&[1])
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert!(!view.is_null(0));
        assert!(view.is_null(1)); // score
        assert!(view.is_null(2)); // name
        assert_eq!(view.value(1).unwrap(), Value::Null);
        assert_eq!(view.value(3).unwrap(), Value::Bytes(&[1][..]));
    }

    #[test]
    fn trailing_null_variable_columns_are_not_stored() {
        let schema = schema();
        let row = RecordBuilder::new()
            .fixed(&1i32.to_le_bytes())
            .fixed(&0f64.to_le_bytes())
            .null_var()
            .null_var()
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert_eq!(view.stored_var_count(), 0);
        assert!(matches!(view.column(2).unwrap(), ColumnValue::Null));
        assert!(matches!(view.column(3).unwrap(), ColumnValue::Null));
    }

    #[test]
    fn empty_variable_table_decodes() {
        // Flag set, count = 0: legal encoding of "no variable columns".
        let schema = TableSchema::builder("t")
            .column("id", ScalarType::Int, false)
            .build()
            .unwrap();
        let mut row = RecordBuilder::new().fixed(&5i32.to_le_bytes()).build();
        let status = u16::from_le_bytes([row[0], row[1]]) | row_flags::HAS_VARIABLE;
        row[..2].copy_from_slice(&status.to_le_bytes());
        row.extend_from_slice(&0u16.to_le_bytes());
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert_eq!(view.stored_var_count(), 0);
        assert_eq!(view.value(0).unwrap(), Value::Int(5));
    }

    #[test]
    fn zero_column_row_decodes_to_empty_record() {
        let schema = TableSchema::builder("empty").build().unwrap();
        let row = RecordBuilder::new().build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert_eq!(view.column_count(), 0);
        assert_eq!(view.row_len(), 6);
    }

    #[test]
    fn fixed_span_mismatch_is_rejected() {
        let schema = schema();
        let row = RecordBuilder::new()
            .fixed(&1i32.to_le_bytes()) // missing the float column
            .var(&[1])
            .var(&[2])
            .null_fixed(0)
            .build();
        let err = RecordView::parse(&row, &schema, page()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Corruption { .. })
        ));
    }

    #[test]
    fn uniquifier_rejection_names_the_cause() {
        let schema = TableSchema::builder("t")
            .column("id", ScalarType::Int, false)
            .build()
            .unwrap();
        let row = RecordBuilder::new()
            .fixed(&1i32.to_le_bytes())
            .var(&[0, 0, 0, 0]) // phantom uniquifier
            .build();
        let err = RecordView::parse(&row, &schema, page()).unwrap_err();
        assert!(err.to_string().contains("uniquifier"));
    }

    #[test]
    fn overflow_chain_parses_links() {
        let schema = schema();
        let mut payload = vec![0u8; OVERFLOW_HEADER_SIZE];
        payload[0] = complex_tag::ROW_OVERFLOW;
        payload[12..16].copy_from_slice(&5000u32.to_le_bytes());
        // One link: page (77, 1) slot 0.
        payload.extend_from_slice(&[77, 0, 0, 0, 1, 0, 0, 0]);

        let row = RecordBuilder::new()
            .fixed(&1i32.to_le_bytes())
            .fixed(&0f64.to_le_bytes())
            .null_var()
            .complex_var(&payload)
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        match view.column(3).unwrap() {
            ColumnValue::Overflow(chain) => {
                assert_eq!(chain.kind, OverflowKind::RowOverflow);
                assert_eq!(chain.total_len, 5000);
                let links: Vec<_> = chain.links().collect();
                assert_eq!(links, vec![RecordId::new(PageLocator::new(77, 1), 0)]);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn forwarding_stub_yields_destination() {
        let schema = TableSchema::builder("t")
            .column("id", ScalarType::Int, false)
            .build()
            .unwrap();
        let mut stub_payload = vec![complex_tag::FORWARDED];
        stub_payload.extend_from_slice(&[9, 0, 0, 0, 1, 0, 2, 0]);
        let row = RecordBuilder::new()
            .flags(row_flags::FORWARDING_STUB)
            .fixed(&1i32.to_le_bytes())
            .complex_var(&stub_payload)
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        let rid = view.forwarded_to().unwrap().unwrap();
        assert_eq!(rid, RecordId::new(PageLocator::new(9, 1), 2));
    }

    #[test]
    fn sparse_vector_tag_without_stub_flag() {
        let schema = schema();
        let payload = vec![complex_tag::SPARSE_VECTOR, 1, 2, 3];
        let row = RecordBuilder::new()
            .fixed(&1i32.to_le_bytes())
            .fixed(&0f64.to_le_bytes())
            .null_var()
            .complex_var(&payload)
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert!(matches!(
            view.column(3).unwrap(),
            ColumnValue::SparseVector(_)
        ));
    }

    #[test]
    fn ghost_flag_is_visible() {
        let schema = TableSchema::builder("t")
            .column("id", ScalarType::Int, false)
            .build()
            .unwrap();
        let row = RecordBuilder::new()
            .flags(row_flags::GHOST)
            .fixed(&1i32.to_le_bytes())
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        assert!(view.is_ghost());
    }

    #[test]
    fn cluster_key_bytes_concatenate_key_columns() {
        let schema = schema();
        let row = RecordBuilder::new()
            .fixed(&513i32.to_le_bytes())
            .fixed(&0f64.to_le_bytes())
            .null_var()
            .null_var()
            .build();
        let view = RecordView::parse(&row, &schema, page()).unwrap();
        let mut buf = Vec::new();
        view.cluster_key_bytes(&mut buf).unwrap();
        assert_eq!(buf, 513i32.to_le_bytes());
    }
}
