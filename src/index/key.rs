//! # Cluster Key Encoding and Ordering
//!
//! A key is the concatenation, in index-column order, of each key column's
//! fixed-size storage encoding: integers little-endian, floats IEEE-754,
//! fixed strings byte-for-byte. That matches the bytes
//! `RecordView::cluster_key_bytes` extracts from rows, so walker
//! comparisons never materialize typed values.
//!
//! Comparison is typed per column — a little-endian integer does not order
//! lexicographically — and descending key columns negate their column's
//! result.

use std::cmp::Ordering;

use eyre::Result;
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::schema::{SortOrder, TableSchema};
use crate::types::ScalarType;

/// A caller-supplied key column value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Float(f64),
    /// Fixed string or binary, exactly the declared width.
    Bytes(Vec<u8>),
}

pub type KeyBuf = SmallVec<[u8; 32]>;

/// Serializes `values` to the byte layout used for comparisons.
pub fn encode_key(schema: &TableSchema, values: &[KeyValue]) -> Result<KeyBuf> {
    let key = schema.cluster_key();
    if values.len() != key.len() {
        eyre::bail!(
            "key has {} values, index declares {} columns",
            values.len(),
            key.len()
        );
    }
    let mut buf = KeyBuf::new();
    for (part, value) in key.iter().zip(values) {
        let col = schema.column(part.column);
        let width = col.fixed_len() as usize;
        match (col.scalar, value) {
            (ScalarType::TinyInt, KeyValue::TinyInt(v)) => buf.push(*v),
            (ScalarType::SmallInt, KeyValue::SmallInt(v)) => {
                buf.extend_from_slice(&v.to_le_bytes())
            }
            (ScalarType::Int, KeyValue::Int(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (ScalarType::BigInt, KeyValue::BigInt(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (ScalarType::Real, KeyValue::Real(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (ScalarType::Float, KeyValue::Float(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (
                scalar @ (ScalarType::Char
                | ScalarType::NChar
                | ScalarType::Binary
                | ScalarType::UniqueIdentifier
                | ScalarType::Decimal
                | ScalarType::Numeric),
                KeyValue::Bytes(bytes),
            ) => {
                if bytes.len() != width {
                    eyre::bail!(EngineError::TypeMismatch {
                        column: part.column,
                        requested: "fixed bytes of the declared width",
                        declared: scalar.name(),
                    });
                }
                buf.extend_from_slice(bytes);
            }
            (scalar, _) => eyre::bail!(EngineError::TypeMismatch {
                column: part.column,
                requested: "matching key value",
                declared: scalar.name(),
            }),
        }
    }
    debug_assert_eq!(buf.len(), schema.key_length());
    Ok(buf)
}

/// Recovers the column values from an encoded key. Inverse of
/// [`encode_key`] for every encodable type.
pub fn decode_key(schema: &TableSchema, bytes: &[u8]) -> Result<Vec<KeyValue>> {
    if bytes.len() != schema.key_length() {
        eyre::bail!(
            "encoded key is {} bytes, index declares {}",
            bytes.len(),
            schema.key_length()
        );
    }
    let mut values = Vec::with_capacity(schema.cluster_key().len());
    let mut at = 0usize;
    for part in schema.cluster_key() {
        let col = schema.column(part.column);
        let width = col.fixed_len() as usize;
        let field = &bytes[at..at + width];
        at += width;
        values.push(match col.scalar {
            ScalarType::TinyInt => KeyValue::TinyInt(field[0]),
            ScalarType::SmallInt => KeyValue::SmallInt(i16::from_le_bytes([field[0], field[1]])),
            ScalarType::Int => KeyValue::Int(i32::from_le_bytes(field.try_into().unwrap())),
            ScalarType::BigInt => KeyValue::BigInt(i64::from_le_bytes(field.try_into().unwrap())),
            ScalarType::Real => KeyValue::Real(f32::from_le_bytes(field.try_into().unwrap())),
            ScalarType::Float => KeyValue::Float(f64::from_le_bytes(field.try_into().unwrap())),
            _ => KeyValue::Bytes(field.to_vec()),
        });
    }
    Ok(values)
}

fn compare_column(scalar: ScalarType, a: &[u8], b: &[u8]) -> Ordering {
    match scalar {
        ScalarType::TinyInt | ScalarType::Bit => a[0].cmp(&b[0]),
        ScalarType::SmallInt => {
            i16::from_le_bytes([a[0], a[1]]).cmp(&i16::from_le_bytes([b[0], b[1]]))
        }
        ScalarType::Int => i32::from_le_bytes(a.try_into().unwrap())
            .cmp(&i32::from_le_bytes(b.try_into().unwrap())),
        ScalarType::BigInt | ScalarType::Money | ScalarType::DateTime => {
            i64::from_le_bytes(a.try_into().unwrap())
                .cmp(&i64::from_le_bytes(b.try_into().unwrap()))
        }
        ScalarType::Real => f32::from_le_bytes(a.try_into().unwrap())
            .total_cmp(&f32::from_le_bytes(b.try_into().unwrap())),
        ScalarType::Float => f64::from_le_bytes(a.try_into().unwrap())
            .total_cmp(&f64::from_le_bytes(b.try_into().unwrap())),
        // Fixed strings and everything else order lexicographically.
        _ => a.cmp(b),
    }
}

/// Compares two encoded keys column by column, honoring sort order.
///
/// Truncated keys (prefix searches over a composite index) compare on the
/// columns they cover; a key that is a strict prefix orders first.
pub fn compare_keys(schema: &TableSchema, a: &[u8], b: &[u8]) -> Ordering {
    let mut at = 0usize;
    for part in schema.cluster_key() {
        let col = schema.column(part.column);
        let width = col.fixed_len() as usize;
        if a.len() < at + width || b.len() < at + width {
            break;
        }
        let ord = compare_column(col.scalar, &a[at..at + width], &b[at..at + width]);
        let ord = match part.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
        at += width;
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSchema;

    fn schema() -> TableSchema {
        TableSchema::builder("t")
            .column("a", ScalarType::Int, false)
            .column("b", ScalarType::BigInt, false)
            .key("a", SortOrder::Ascending)
            .key("b", SortOrder::Ascending)
            .build()
            .unwrap()
    }

    #[test]
    fn encode_decode_round_trip() {
        let schema = schema();
        let values = vec![KeyValue::Int(-17), KeyValue::BigInt(1 << 40)];
        let bytes = encode_key(&schema, &values).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_key(&schema, &bytes).unwrap(), values);
    }

    #[test]
    fn integers_compare_by_value_not_bytes() {
        let schema = schema();
        let small = encode_key(&schema, &[KeyValue::Int(2), KeyValue::BigInt(0)]).unwrap();
        let big = encode_key(&schema, &[KeyValue::Int(256), KeyValue::BigInt(0)]).unwrap();
        // Lexicographically [2,0,0,0] > [0,1,0,0]; typed comparison fixes it.
        assert_eq!(compare_keys(&schema, &small, &big), Ordering::Less);
    }

    #[test]
    fn negative_integers_order_before_positive() {
        let schema = schema();
        let neg = encode_key(&schema, &[KeyValue::Int(-1), KeyValue::BigInt(0)]).unwrap();
        let pos = encode_key(&schema, &[KeyValue::Int(1), KeyValue::BigInt(0)]).unwrap();
        assert_eq!(compare_keys(&schema, &neg, &pos), Ordering::Less);
    }

    #[test]
    fn second_column_breaks_ties() {
        let schema = schema();
        let a = encode_key(&schema, &[KeyValue::Int(5), KeyValue::BigInt(10)]).unwrap();
        let b = encode_key(&schema, &[KeyValue::Int(5), KeyValue::BigInt(11)]).unwrap();
        assert_eq!(compare_keys(&schema, &a, &b), Ordering::Less);
        assert_eq!(compare_keys(&schema, &b, &a), Ordering::Greater);
        assert_eq!(compare_keys(&schema, &a, &a), Ordering::Equal);
    }

    #[test]
    fn descending_column_negates_comparison() {
        let schema = TableSchema::builder("t")
            .column("a", ScalarType::Int, false)
            .key("a", SortOrder::Descending)
            .build()
            .unwrap();
        let two = encode_key(&schema, &[KeyValue::Int(2)]).unwrap();
        let three = encode_key(&schema, &[KeyValue::Int(3)]).unwrap();
        assert_eq!(compare_keys(&schema, &three, &two), Ordering::Less);
    }

    #[test]
    fn prefix_key_orders_first() {
        let schema = schema();
        let full = encode_key(&schema, &[KeyValue::Int(5), KeyValue::BigInt(0)]).unwrap();
        let prefix = &full[..4];
        assert_eq!(compare_keys(&schema, prefix, &full), Ordering::Less);
        assert_eq!(compare_keys(&schema, &full, prefix), Ordering::Greater);
    }

    #[test]
    fn wrong_value_type_is_type_mismatch() {
        let schema = schema();
        let err = encode_key(&schema, &[KeyValue::BigInt(1), KeyValue::BigInt(0)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn float_keys_use_total_order() {
        let schema = TableSchema::builder("t")
            .column("f", ScalarType::Float, false)
            .key("f", SortOrder::Ascending)
            .build()
            .unwrap();
        let a = encode_key(&schema, &[KeyValue::Float(-0.5)]).unwrap();
        let b = encode_key(&schema, &[KeyValue::Float(0.25)]).unwrap();
        assert_eq!(compare_keys(&schema, &a, &b), Ordering::Less);
    }
}
