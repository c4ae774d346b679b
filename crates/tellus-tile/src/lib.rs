//! Tile addressing for the tellus quadtree: tile identifiers, parent/child
//! math, subtree-local ids, and layer-space tile extents.

mod tile_id;

pub use tile_id::{LocalId, TileExtents, TileId};
