//! # Scalar Type Layer
//!
//! The record decoder yields raw bytes plus the schema's type tag; this
//! module owns the interpretation of those bytes. Only the enumerated
//! subset of the host engine's scalar types is recognized.
//!
//! On-disk forms (all little-endian unless noted):
//!
//! ```text
//! int/smallint/bigint/tinyint  two's complement
//! real/float                   IEEE-754
//! smalldatetime (4)            u16 days from 1900-01-01, u16 minutes
//! datetime (8)                 i32 days from 1900-01-01, u32 ticks (1/300 s)
//! date (3)                     u24 days from 0001-01-01
//! time (5)                     u40 units of 100ns
//! datetime2 (8)                time(5) then date(3)
//! datetimeoffset (10)          datetime2(8) then i16 minutes offset
//! uniqueidentifier (16)        first three groups little-endian, rest as-is
//! money (8) / smallmoney (4)   integer scaled by 10,000
//! decimal/numeric (1+4n)       sign byte (1 = positive) + packed u32 digits
//! char/nchar                   single-byte / UCS-2 little-endian, fixed
//! varchar/nvarchar             same, variable
//! ```

use eyre::Result;

use crate::error::EngineError;

/// Recognized scalar types. `from_xtype` maps the host catalog's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    SmallMoney,
    Money,
    SmallDateTime,
    DateTime,
    Date,
    Time,
    DateTime2,
    DateTimeOffset,
    UniqueIdentifier,
    Decimal,
    Numeric,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Binary,
    VarBinary,
    Text,
    NText,
    Image,
    Geography,
    Geometry,
}

impl ScalarType {
    pub fn from_xtype(xtype: u8) -> Option<Self> {
        Some(match xtype {
            104 => ScalarType::Bit,
            48 => ScalarType::TinyInt,
            52 => ScalarType::SmallInt,
            56 => ScalarType::Int,
            127 => ScalarType::BigInt,
            59 => ScalarType::Real,
            62 => ScalarType::Float,
            122 => ScalarType::SmallMoney,
            60 => ScalarType::Money,
            58 => ScalarType::SmallDateTime,
            61 => ScalarType::DateTime,
            40 => ScalarType::Date,
            41 => ScalarType::Time,
            42 => ScalarType::DateTime2,
            43 => ScalarType::DateTimeOffset,
            36 => ScalarType::UniqueIdentifier,
            106 => ScalarType::Decimal,
            108 => ScalarType::Numeric,
            175 => ScalarType::Char,
            167 => ScalarType::VarChar,
            239 => ScalarType::NChar,
            231 => ScalarType::NVarChar,
            173 => ScalarType::Binary,
            165 => ScalarType::VarBinary,
            35 => ScalarType::Text,
            99 => ScalarType::NText,
            34 => ScalarType::Image,
            240 => ScalarType::Geography,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bit => "bit",
            ScalarType::TinyInt => "tinyint",
            ScalarType::SmallInt => "smallint",
            ScalarType::Int => "int",
            ScalarType::BigInt => "bigint",
            ScalarType::Real => "real",
            ScalarType::Float => "float",
            ScalarType::SmallMoney => "smallmoney",
            ScalarType::Money => "money",
            ScalarType::SmallDateTime => "smalldatetime",
            ScalarType::DateTime => "datetime",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::DateTime2 => "datetime2",
            ScalarType::DateTimeOffset => "datetimeoffset",
            ScalarType::UniqueIdentifier => "uniqueidentifier",
            ScalarType::Decimal => "decimal",
            ScalarType::Numeric => "numeric",
            ScalarType::Char => "char",
            ScalarType::VarChar => "varchar",
            ScalarType::NChar => "nchar",
            ScalarType::NVarChar => "nvarchar",
            ScalarType::Binary => "binary",
            ScalarType::VarBinary => "varbinary",
            ScalarType::Text => "text",
            ScalarType::NText => "ntext",
            ScalarType::Image => "image",
            ScalarType::Geography => "geography",
            ScalarType::Geometry => "geometry",
        }
    }

    /// Whether values live in the fixed column span.
    pub fn is_fixed(&self) -> bool {
        !matches!(
            self,
            ScalarType::VarChar
                | ScalarType::NVarChar
                | ScalarType::VarBinary
                | ScalarType::Text
                | ScalarType::NText
                | ScalarType::Image
                | ScalarType::Geography
                | ScalarType::Geometry
        )
    }

    /// Intrinsic fixed size, when the type has one independent of the
    /// declaration. `char`, `nchar`, `binary`, `decimal` and `numeric` take
    /// their size from the column declaration instead.
    pub fn intrinsic_size(&self) -> Option<usize> {
        Some(match self {
            ScalarType::Bit | ScalarType::TinyInt => 1,
            ScalarType::SmallInt => 2,
            ScalarType::Int | ScalarType::Real | ScalarType::SmallMoney => 4,
            ScalarType::BigInt
            | ScalarType::Float
            | ScalarType::Money
            | ScalarType::DateTime
            | ScalarType::DateTime2 => 8,
            ScalarType::SmallDateTime => 4,
            ScalarType::Date => 3,
            ScalarType::Time => 5,
            ScalarType::DateTimeOffset => 10,
            ScalarType::UniqueIdentifier => 16,
            _ => return None,
        })
    }
}

/// `datetime`: days from 1900-01-01 plus 1/300-second ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub days: i32,
    pub ticks: u32,
}

/// Days between 1900-01-01 and the Unix epoch.
const UNIX_DATE_DIFF: i64 = 25_567;

impl DateTime {
    pub fn to_unix_time(&self) -> i64 {
        (self.days as i64 - UNIX_DATE_DIFF) * 86_400 + (self.ticks as i64) / 300
    }

    pub fn milliseconds(&self) -> u32 {
        ((self.ticks % 300) as u64 * 1000 / 300) as u32
    }
}

/// `smalldatetime`: days from 1900-01-01 plus minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmallDateTime {
    pub days: u16,
    pub minutes: u16,
}

impl SmallDateTime {
    pub fn to_unix_time(&self) -> i64 {
        (self.days as i64 - UNIX_DATE_DIFF) * 86_400 + self.minutes as i64 * 60
    }
}

/// 16-byte GUID. The first three groups are stored little-endian, the rest
/// byte-for-byte, so display reorders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6],
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

/// Sign-and-digits decimal: magnitude in packed little-endian 32-bit limbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub positive: bool,
    pub magnitude: u128,
}

impl Decimal {
    pub fn to_i128(&self) -> i128 {
        if self.positive {
            self.magnitude as i128
        } else {
            -(self.magnitude as i128)
        }
    }
}

/// A decoded scalar value. Borrowed variants reference the row image.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Float(f64),
    SmallDateTime(SmallDateTime),
    DateTime(DateTime),
    /// Days from 0001-01-01.
    Date(u32),
    /// 100ns units since midnight.
    Time(u64),
    DateTime2 { time: u64, date: u32 },
    DateTimeOffset { time: u64, date: u32, offset_minutes: i16 },
    Guid(Guid),
    /// Scaled by 10,000.
    Money(i64),
    Decimal(Decimal),
    Char(&'a [u8]),
    NChar(String),
    Bytes(&'a [u8]),
}

fn expect_len(scalar: ScalarType, bytes: &[u8], want: usize, column: usize) -> Result<()> {
    if bytes.len() != want {
        eyre::bail!(EngineError::TypeMismatch {
            column,
            requested: scalar.name(),
            declared: "differently sized storage",
        });
    }
    Ok(())
}

fn u24(bytes: &[u8]) -> u32 {
    bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
}

fn u40(bytes: &[u8]) -> u64 {
    bytes[0] as u64
        | (bytes[1] as u64) << 8
        | (bytes[2] as u64) << 16
        | (bytes[3] as u64) << 24
        | (bytes[4] as u64) << 32
}

/// Interprets `bytes` as `scalar`. `column` only feeds diagnostics.
pub fn decode<'a>(scalar: ScalarType, bytes: &'a [u8], column: usize) -> Result<Value<'a>> {
    let value = match scalar {
        ScalarType::Bit => {
            expect_len(scalar, bytes, 1, column)?;
            Value::Bool(bytes[0] != 0)
        }
        ScalarType::TinyInt => {
            expect_len(scalar, bytes, 1, column)?;
            Value::TinyInt(bytes[0])
        }
        ScalarType::SmallInt => {
            expect_len(scalar, bytes, 2, column)?;
            Value::SmallInt(i16::from_le_bytes([bytes[0], bytes[1]]))
        }
        ScalarType::Int => {
            expect_len(scalar, bytes, 4, column)?;
            Value::Int(i32::from_le_bytes(bytes.try_into().unwrap()))
        }
        ScalarType::BigInt => {
            expect_len(scalar, bytes, 8, column)?;
            Value::BigInt(i64::from_le_bytes(bytes.try_into().unwrap()))
        }
        ScalarType::Real => {
            expect_len(scalar, bytes, 4, column)?;
            Value::Real(f32::from_le_bytes(bytes.try_into().unwrap()))
        }
        ScalarType::Float => {
            expect_len(scalar, bytes, 8, column)?;
            Value::Float(f64::from_le_bytes(bytes.try_into().unwrap()))
        }
        ScalarType::SmallMoney => {
            expect_len(scalar, bytes, 4, column)?;
            Value::Money(i32::from_le_bytes(bytes.try_into().unwrap()) as i64)
        }
        ScalarType::Money => {
            expect_len(scalar, bytes, 8, column)?;
            // Stored as two 32-bit halves, high half first.
            let hi = i32::from_le_bytes(bytes[..4].try_into().unwrap()) as i64;
            let lo = u32::from_le_bytes(bytes[4..].try_into().unwrap()) as i64;
            Value::Money((hi << 32) | lo)
        }
        ScalarType::SmallDateTime => {
            expect_len(scalar, bytes, 4, column)?;
            Value::SmallDateTime(SmallDateTime {
                days: u16::from_le_bytes([bytes[0], bytes[1]]),
                minutes: u16::from_le_bytes([bytes[2], bytes[3]]),
            })
        }
        ScalarType::DateTime => {
            expect_len(scalar, bytes, 8, column)?;
            Value::DateTime(DateTime {
                days: i32::from_le_bytes(bytes[..4].try_into().unwrap()),
                ticks: u32::from_le_bytes(bytes[4..].try_into().unwrap()),
            })
        }
        ScalarType::Date => {
            expect_len(scalar, bytes, 3, column)?;
            Value::Date(u24(bytes))
        }
        ScalarType::Time => {
            expect_len(scalar, bytes, 5, column)?;
            Value::Time(u40(bytes))
        }
        ScalarType::DateTime2 => {
            expect_len(scalar, bytes, 8, column)?;
            Value::DateTime2 {
                time: u40(&bytes[..5]),
                date: u24(&bytes[5..]),
            }
        }
        ScalarType::DateTimeOffset => {
            expect_len(scalar, bytes, 10, column)?;
            Value::DateTimeOffset {
                time: u40(&bytes[..5]),
                date: u24(&bytes[5..8]),
                offset_minutes: i16::from_le_bytes([bytes[8], bytes[9]]),
            }
        }
        ScalarType::UniqueIdentifier => {
            expect_len(scalar, bytes, 16, column)?;
            Value::Guid(Guid(bytes.try_into().unwrap()))
        }
        ScalarType::Decimal | ScalarType::Numeric => {
            if bytes.is_empty() || (bytes.len() - 1) % 4 != 0 || bytes.len() > 17 {
                eyre::bail!(EngineError::TypeMismatch {
                    column,
                    requested: scalar.name(),
                    declared: "malformed decimal storage",
                });
            }
            let positive = bytes[0] != 0;
            let mut magnitude: u128 = 0;
            for (i, limb) in bytes[1..].chunks_exact(4).enumerate() {
                let limb = u32::from_le_bytes(limb.try_into().unwrap()) as u128;
                magnitude |= limb << (32 * i);
            }
            Value::Decimal(Decimal { positive, magnitude })
        }
        ScalarType::Char | ScalarType::VarChar => Value::Char(bytes),
        ScalarType::NChar | ScalarType::NVarChar => {
            if bytes.len() % 2 != 0 {
                eyre::bail!(EngineError::TypeMismatch {
                    column,
                    requested: scalar.name(),
                    declared: "odd-length UCS-2 storage",
                });
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            Value::NChar(String::from_utf16_lossy(&units))
        }
        ScalarType::Binary
        | ScalarType::VarBinary
        | ScalarType::Text
        | ScalarType::NText
        | ScalarType::Image
        | ScalarType::Geography
        | ScalarType::Geometry => Value::Bytes(bytes),
    };
    Ok(value)
}
