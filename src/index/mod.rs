//! # Clustered-Index Layer
//!
//! `key` serializes and orders composite cluster keys; `tree` walks the
//! on-disk B-tree from the index root to leaf data pages and scans the leaf
//! chain.

pub mod key;
mod tree;

pub use key::{compare_keys, decode_key, encode_key, KeyBuf, KeyValue};
pub use tree::{Cursor, IndexTree};
