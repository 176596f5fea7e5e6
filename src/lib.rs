//! # mdfread — Read-Only MDF Engine
//!
//! Opens a database file produced by Microsoft SQL Server (MDF format) and
//! exposes its tables, clustered indexes and spatial indexes for querying
//! without the server. The engine never writes: the file is assumed
//! quiescent and every page image handed out is immutable.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Database / Table facade               │
//! ├──────────────────────┬───────────────────────┤
//! │  Clustered walker    │  Spatial walker       │
//! │  (index)             │  (spatial)            │
//! ├──────────────────────┴───────────────────────┤
//! │  Schema facade + key encoding                │
//! ├──────────────────────────────────────────────┤
//! │  Record decoder (storage::record, types)     │
//! ├──────────────────────────────────────────────┤
//! │  Page pool (storage::pool)                   │
//! ├──────────────────────────────────────────────┤
//! │  Arena allocator over one VM reservation     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use mdfread::{Database, KeyValue, ScalarType, SortOrder, TableSchema};
//!
//! let db = Database::open("./sales.mdf")?;
//! println!("database: {}", db.boot().name);
//!
//! let schema = TableSchema::builder("orders")
//!     .column("id", ScalarType::Int, false)
//!     .column("note", ScalarType::NVarChar, true)
//!     .key("id", SortOrder::Ascending)
//!     .build()?;
//!
//! let orders = db.table(&schema, index_root)?;
//! if let Some(rid) = orders.find_record(&[KeyValue::Int(17)])? {
//!     orders.with_record(rid, |row| {
//!         println!("note: {:?}", row.value(1)?);
//!         Ok(())
//!     })?;
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`memory`]: virtual-memory reservation and arena block allocator
//! - [`storage`]: page pool, page/record decoding, file I/O
//! - [`types`]: scalar value interpretation
//! - [`schema`]: table descriptors and cluster-key declarations
//! - [`index`]: key encoding and the clustered-index walker
//! - [`spatial`]: Hilbert grid transform and the spatial-cell walker
//! - [`config`]: geometry constants and pool options
//! - [`error`]: typed failure kinds and cancellation
//!
//! ## Concurrency
//!
//! A pool is shared across native reader threads. Loads of the same extent
//! rendezvous; everything else is non-blocking. Long scans accept a
//! [`CancelToken`] checked at page boundaries.

pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod memory;
pub mod schema;
pub mod spatial;
pub mod storage;
pub mod types;

pub use config::PoolConfig;
pub use database::{BootInfo, Database, Table};
pub use error::{CancelToken, EngineError};
pub use index::KeyValue;
pub use schema::{SortOrder, TableSchema};
pub use spatial::{RadiusModel, SpatialCell, SpatialPoint, SpatialRect, SpatialTree};
pub use storage::{PageLocator, PagePool, PageRef, PoolStats, RecordId};
pub use types::{ScalarType, Value};
