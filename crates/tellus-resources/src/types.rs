//! Decoded resource payload types.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::DMat4;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tellus_map::CreditId;
use tellus_math::DAabb;
use tellus_tile::TileId;

/// Metadata of one tile as reported by one surface.
#[derive(Clone, Debug)]
pub struct MetaNode {
    pub id: TileId,
    /// Whether this surface has geometry for the tile.
    pub geometry: bool,
    /// Alien flag; must match the surface stack entry to be electable.
    pub alien: bool,
    /// Per-quadrant child availability.
    pub child_flags: [bool; 4],
    /// 1-based index into the layer's tileset stack; 0 when unused.
    pub source_reference: u16,
    /// Tile bounding box in physical space.
    pub aabb: DAabb,
    /// Optional tight geometry z range for refined distance measures.
    pub geom_z: Option<(f64, f64)>,
    pub credits: Vec<CreditId>,
}

impl MetaNode {
    pub fn any_child(&self) -> bool {
        self.child_flags.iter().any(|&f| f)
    }
}

/// A batch of metanodes covering one block of tiles of one surface.
#[derive(Clone, Debug, Default)]
pub struct MetaTile {
    pub origin: TileId,
    nodes: FxHashMap<TileId, MetaNode>,
}

impl MetaTile {
    pub fn new(origin: TileId, nodes: impl IntoIterator<Item = MetaNode>) -> Self {
        Self {
            origin,
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }

    pub fn get(&self, id: TileId) -> Option<&MetaNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One interleaved mesh vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Shared vertex/index data of one submesh.
#[derive(Clone, Debug, Default)]
pub struct GpuMesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl GpuMesh {
    pub fn byte_size(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<MeshVertex>() + self.indices.len() * 4
    }
}

/// One submesh of a tile's mesh aggregate.
#[derive(Clone, Debug)]
pub struct MeshPart {
    pub mesh: Arc<GpuMesh>,
    /// Normalized-to-physical model transform.
    pub norm_to_phys: DMat4,
    /// Carries per-vertex UVs for internal (surface-baked) texture.
    pub internal_uv: bool,
    /// Carries external UVs for bound-layer compositing.
    pub external_uv: bool,
    /// Per-submesh bound-layer override appended to the composition list.
    pub texture_layer: Option<String>,
    /// Which glued surface this part originates from.
    pub surface_reference: u16,
}

/// All submeshes of one (surface, tile) pair.
#[derive(Clone, Debug, Default)]
pub struct MeshAggregate {
    pub submeshes: Vec<MeshPart>,
}

impl MeshAggregate {
    pub fn byte_size(&self) -> usize {
        self.submeshes.iter().map(|p| p.mesh.byte_size()).sum()
    }
}

/// A decoded RGBA8 texture tile.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Texture {
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

/// A geodata stylesheet document.
#[derive(Clone, Debug)]
pub struct GeodataStyle {
    pub json: Value,
}

/// A geodata feature collection for one tile (or a whole monolithic
/// layer).
#[derive(Clone, Debug)]
pub struct GeodataFeatures {
    pub json: Value,
}

impl GeodataFeatures {
    pub fn feature_count(&self) -> usize {
        self.json
            .get("features")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}
