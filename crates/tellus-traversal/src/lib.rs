//! The per-frame quadtree traversal core.
//!
//! Once per frame, for each camera and each map layer, the active
//! traversal policy walks the layer's tile tree from the root. At each
//! node it resolves metadata (which candidate surface serves the tile,
//! which children exist), then resolves draw tasks (mesh submeshes with
//! their bound-layer texture stacks, or geodata primitives), polling
//! the resource cache without ever blocking. An undetermined node is
//! simply revisited next frame.

mod culling;
mod draws;
mod meta;
mod node;
mod pass;
mod policy;
mod stats;
mod tasks;

pub use culling::{CullingModel, ScreenSpaceCulling};
pub use node::{NodeArena, NodeIndex, NodeMeta, ResourceRef, TraverseNode};
pub use pass::{CameraContext, TraversalPass};
pub use policy::{traverse_render, StableMode, TraverseMode};
pub use stats::{TraversalStats, STAT_LODS};
pub use tasks::{
    RecordingSink, RenderColliderTask, RenderGeodataTask, RenderSink, RenderSurfaceTask,
};

use serde::{Deserialize, Serialize};

/// Tunables of the traversal core, normally loaded from config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalOptions {
    /// Policy used for surface layers.
    pub surface_mode: TraverseMode,
    /// Policy used for geodata layers.
    pub geodata_mode: TraverseMode,
    /// Absolute distance gate of the Fixed policy, and the base
    /// distance of DistanceBaseFixed.
    pub fixed_distance: f64,
    /// LOD ceiling of the Fixed-family policies.
    pub fixed_lod: u32,
    /// LOD slack of DistanceBaseFixed.
    pub max_lod_diff: u32,
    /// Refine node distance by the metanode's geometry z range.
    pub use_geometry_extents: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            surface_mode: TraverseMode::Balanced,
            geodata_mode: TraverseMode::Stable,
            fixed_distance: 0.05,
            fixed_lod: 10,
            max_lod_diff: 4,
            use_geometry_extents: true,
        }
    }
}
