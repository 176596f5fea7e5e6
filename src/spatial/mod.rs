//! # Spatial Grid Index
//!
//! A Hilbert-curve grid over the globe plus a B-tree walker over its cell
//! identifiers:
//!
//! - `hilbert`: the order-16 curve at each grid level
//! - `cell`: 5-byte cell identifiers, ordering and intersection
//! - `transform`: globe projection, haversine/destination, disk and
//!   rectangle rasterization into cell sets
//! - `geometry`: geography column payloads (point, linestring, polygon
//!   variants)
//! - `sparse_set`: primary-key dedup for multi-cell queries
//! - `tree`: the spatial-cell B-tree walker

pub mod cell;
pub mod geometry;
pub mod hilbert;
mod sparse_set;
pub mod transform;
mod tree;

pub use cell::SpatialCell;
pub use geometry::{Geography, ShapeKind};
pub use sparse_set::SparseSet;
pub use transform::{
    cell_range, cell_rect, cell_to_latlon, destination, destination_rect, distance, haversine,
    point_to_cell, project_globe, reverse_project_globe, CellSet, RadiusModel, SpatialPoint,
    SpatialRect, EARTH_RADIUS,
};
pub use tree::{SpatialRow, SpatialTree, SPATIAL_INDEX_ROW_LEN, SPATIAL_LEAF_ROW_LEN};
