//! Candidate surfaces and their stacking order within a layer.

use serde::{Deserialize, Serialize};
use tellus_tile::TileId;

use crate::{CreditId, UrlTemplate};

/// One candidate surface (or alien-layer entry) in a layer's stack.
///
/// Carries the URL templates for every resource class the surface can
/// serve. Templates left empty mean the surface does not provide that
/// resource class.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SurfaceInfo {
    /// Stable surface identifier (used in logs and statistics).
    pub id: String,
    /// Whether this stack entry is an alien (glued-in foreign) surface.
    /// Only metanodes with a matching alien flag may elect it.
    pub alien: bool,
    /// Root of this surface's own tile pyramid; local ids are computed
    /// relative to it.
    #[serde(default = "TileId::root")]
    pub subtree_root: TileId,
    pub url_meta: UrlTemplate,
    pub url_mesh: UrlTemplate,
    /// Internal (surface-baked) texture per submesh.
    pub url_int_tex: UrlTemplate,
    pub url_geodata: UrlTemplate,
    /// Credits owed whenever this surface contributes geometry.
    pub credits: Vec<CreditId>,
}

/// Ordered list of candidate surfaces; earlier entries win ties.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SurfaceStack {
    pub surfaces: Vec<SurfaceInfo>,
}

impl SurfaceStack {
    pub fn new(surfaces: Vec<SurfaceInfo>) -> Self {
        Self { surfaces }
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SurfaceInfo> {
        self.surfaces.get(index)
    }
}

/// Identifies a chosen surface without borrowing it: either an index into
/// the layer's surface stack or into its tileset stack (resolved through
/// a metanode's 1-based `source_reference`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceIndex {
    Stack(usize),
    Tileset(usize),
}
