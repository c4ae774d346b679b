//! Unique tile identifier in a layer's quadtree.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Uniquely identifies one quadtree cell of a tiled layer.
///
/// - `lod`: level of detail. LOD 0 is the single root tile covering the
///   whole layer; each level quarters the tiles of the previous one.
/// - `x`, `y`: grid coordinates within the level. At LOD `l` the valid
///   range for each coordinate is `0 .. 2^l`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    /// Level of detail (0 = coarsest root).
    pub lod: u32,
    /// Horizontal grid coordinate within the level.
    pub x: u32,
    /// Vertical grid coordinate within the level.
    pub y: u32,
}

impl TileId {
    /// Deepest LOD the tree will ever address.
    pub const MAX_LOD: u32 = 24;

    /// Number of tiles along one axis at the given LOD.
    pub fn grid_size(lod: u32) -> u32 {
        1 << lod
    }

    /// Construct a `TileId`, validating that `x` and `y` are within
    /// the grid bounds for the given LOD.
    ///
    /// # Panics
    ///
    /// Panics if `lod` exceeds [`Self::MAX_LOD`] or if `x`/`y` are out
    /// of range.
    pub fn new(lod: u32, x: u32, y: u32) -> Self {
        assert!(lod <= Self::MAX_LOD, "lod {lod} exceeds MAX_LOD");
        let size = Self::grid_size(lod);
        assert!(x < size, "x={x} out of range for lod {lod}");
        assert!(y < size, "y={y} out of range for lod {lod}");
        Self { lod, x, y }
    }

    /// The root tile.
    pub fn root() -> Self {
        Self { lod: 0, x: 0, y: 0 }
    }

    /// The parent tile at the next coarser LOD, or `None` at the root.
    pub fn parent(&self) -> Option<TileId> {
        if self.lod == 0 {
            return None;
        }
        Some(TileId {
            lod: self.lod - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four child tiles at the next finer LOD, in standard quadrant
    /// order: `[(2x, 2y), (2x+1, 2y), (2x, 2y+1), (2x+1, 2y+1)]`.
    pub fn children(&self) -> [TileId; 4] {
        let lod = self.lod + 1;
        let cx = self.x * 2;
        let cy = self.y * 2;
        [
            TileId { lod, x: cx, y: cy },
            TileId { lod, x: cx + 1, y: cy },
            TileId { lod, x: cx, y: cy + 1 },
            TileId { lod, x: cx + 1, y: cy + 1 },
        ]
    }

    /// Index of this tile within its parent's child array
    /// (`(x % 2) + (y % 2) * 2`).
    pub fn quadrant_in_parent(&self) -> usize {
        ((self.x % 2) + (self.y % 2) * 2) as usize
    }

    /// Origin tile of the metatile block this tile belongs to: the x and y
    /// coordinates rounded down to a multiple of `2^block_bits` at the
    /// same LOD. All tiles in a block share one metatile resource.
    pub fn meta_block_origin(&self, block_bits: u32) -> TileId {
        let mask = !((1u32 << block_bits) - 1);
        TileId {
            lod: self.lod,
            x: self.x & mask,
            y: self.y & mask,
        }
    }

    /// Extents of this tile in layer space, where the root tile spans the
    /// unit square.
    pub fn extents(&self) -> TileExtents {
        let size = Self::grid_size(self.lod) as f64;
        TileExtents {
            ll: DVec2::new(self.x as f64 / size, self.y as f64 / size),
            ur: DVec2::new((self.x + 1) as f64 / size, (self.y + 1) as f64 / size),
        }
    }

    /// Re-express this id relative to a subtree root. The root must be an
    /// ancestor of (or equal to) this tile.
    ///
    /// # Panics
    ///
    /// Panics if `root` is not an ancestor.
    pub fn local(&self, root: TileId) -> LocalId {
        assert!(root.lod <= self.lod, "root must not be finer than the tile");
        let shift = self.lod - root.lod;
        assert!(
            self.x >> shift == root.x && self.y >> shift == root.y,
            "{root} is not an ancestor of {self}"
        );
        LocalId {
            lod: shift,
            x: self.x - (root.x << shift),
            y: self.y - (root.y << shift),
        }
    }
}

/// The default id is the root tile, consistent with
/// `#[serde(default = "TileId::root")]` on structs embedding one.
impl Default for TileId {
    fn default() -> Self {
        Self::root()
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.lod, self.x, self.y)
    }
}

/// A tile id re-expressed relative to a subtree root, used for surfaces
/// whose tile pyramid starts below the layer root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId {
    pub lod: u32,
    pub x: u32,
    pub y: u32,
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.lod, self.x, self.y)
    }
}

/// Lower-left / upper-right corners of a tile in layer space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileExtents {
    pub ll: DVec2,
    pub ur: DVec2,
}

impl TileExtents {
    pub fn center(&self) -> DVec2 {
        (self.ll + self.ur) * 0.5
    }

    pub fn size(&self) -> DVec2 {
        self.ur - self.ll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_has_no_parent() {
        assert_eq!(TileId::root().parent(), None);
    }

    #[test]
    fn test_default_is_root() {
        assert_eq!(TileId::default(), TileId::root());
    }

    #[test]
    fn test_children_are_in_quadrant_order() {
        let t = TileId::new(2, 1, 3);
        let c = t.children();
        assert_eq!(c[0], TileId::new(3, 2, 6));
        assert_eq!(c[1], TileId::new(3, 3, 6));
        assert_eq!(c[2], TileId::new(3, 2, 7));
        assert_eq!(c[3], TileId::new(3, 3, 7));
        for (i, child) in c.iter().enumerate() {
            assert_eq!(child.quadrant_in_parent(), i);
            assert_eq!(child.parent(), Some(t));
        }
    }

    #[test]
    fn test_meta_block_origin() {
        let t = TileId::new(5, 13, 22);
        assert_eq!(t.meta_block_origin(2), TileId::new(5, 12, 20));
        assert_eq!(t.meta_block_origin(0), t);
        // All tiles of a block share the origin.
        let o = TileId::new(6, 16, 32);
        for dx in 0..4 {
            for dy in 0..4 {
                let id = TileId::new(6, 16 + dx, 32 + dy);
                assert_eq!(id.meta_block_origin(2), o);
            }
        }
    }

    #[test]
    fn test_extents_quarter_per_level() {
        let root = TileId::root().extents();
        assert_eq!(root.ll, DVec2::ZERO);
        assert_eq!(root.ur, DVec2::ONE);
        let c = TileId::new(1, 1, 0).extents();
        assert_eq!(c.ll, DVec2::new(0.5, 0.0));
        assert_eq!(c.ur, DVec2::new(1.0, 0.5));
        assert_eq!(c.center(), DVec2::new(0.75, 0.25));
    }

    #[test]
    fn test_local_id() {
        let root = TileId::new(2, 1, 1);
        let t = TileId::new(4, 6, 5);
        let l = t.local(root);
        assert_eq!(l, LocalId { lod: 2, x: 2, y: 1 });
        // Relative to itself the local id is the origin.
        assert_eq!(t.local(t), LocalId { lod: 0, x: 0, y: 0 });
    }

    #[test]
    #[should_panic(expected = "not an ancestor")]
    fn test_local_id_rejects_non_ancestor() {
        let root = TileId::new(2, 0, 0);
        let t = TileId::new(3, 7, 7);
        let _ = t.local(root);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_new_rejects_out_of_range() {
        let _ = TileId::new(1, 2, 0);
    }
}
