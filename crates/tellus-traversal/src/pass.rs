//! Per-frame traversal pass context and shared node-entry helpers.

use glam::DVec3;
use tellus_map::{MapLayer, MapModel, SurfaceIndex, SurfaceInfo};
use tellus_resources::ResourceCache;

use crate::culling::CullingModel;
use crate::meta;
use crate::node::{NodeArena, NodeIndex};
use crate::stats::TraversalStats;
use crate::tasks::RenderSink;
use crate::TraversalOptions;

/// Camera state a pass needs: the focus point priorities decay from,
/// and the render tick stamped onto everything touched.
#[derive(Clone, Copy, Debug)]
pub struct CameraContext {
    pub focus: DVec3,
    pub tick: u64,
}

/// Everything one traversal of one layer works against.
///
/// The pass borrows the layer's node arena mutably for the duration of
/// the walk; nothing else touches the tree meanwhile. Statistics
/// accumulate here and are merged by the caller afterwards.
pub struct TraversalPass<'a> {
    pub model: &'a MapModel,
    pub layer: &'a MapLayer,
    pub cache: &'a ResourceCache,
    pub arena: &'a mut NodeArena,
    pub culling: &'a dyn CullingModel,
    pub sink: &'a mut dyn RenderSink,
    pub camera: CameraContext,
    pub options: &'a TraversalOptions,
    pub stats: TraversalStats,
}

impl<'a> TraversalPass<'a> {
    /// Resolve a chosen-surface index against the layer's stacks.
    pub fn surface(&self, index: SurfaceIndex) -> Option<&'a SurfaceInfo> {
        match index {
            SurfaceIndex::Stack(i) => self.layer.surface_stack.get(i),
            SurfaceIndex::Tileset(i) => self.layer.tileset_stack.as_ref()?.get(i),
        }
    }

    /// Point-to-AABB distance from the camera focus, refined by the
    /// metanode's geometry z range when available.
    pub fn node_distance(&self, index: NodeIndex) -> f64 {
        let node = self.arena.get(index);
        let meta = node.meta.as_ref().expect("node_distance requires meta");
        let aabb = match meta.geom_z {
            Some((lo, hi)) if self.options.use_geometry_extents => meta.aabb.with_z_range(lo, hi),
            _ => meta.aabb,
        };
        aabb.point_distance(self.camera.focus)
    }

    /// Recompute the node's urgency: `1e6 / (distance + 1)` once meta
    /// is known, inherited from the parent until then.
    pub fn update_priority(&mut self, index: NodeIndex) {
        let priority = {
            let node = self.arena.get(index);
            if node.meta.is_some() {
                1e6 / (self.node_distance(index) + 1.0)
            } else if let Some(parent) = node.parent {
                self.arena.get(parent).priority
            } else {
                0.0
            }
        };
        self.arena.get_mut(index).priority = priority;
    }

    /// Keep the node's retained resources alive for eviction purposes.
    pub fn touch_draws(&self, index: NodeIndex) {
        let node = self.arena.get(index);
        for resource in &node.resources {
            resource.touch(self.camera.tick);
        }
    }

    /// Common node-entry step of every policy: statistics, last-access,
    /// priority, and metadata resolution. Returns false while metadata
    /// is still unavailable (the caller must stop descending).
    pub fn visit_init(&mut self, index: NodeIndex, init_all_children: bool) -> bool {
        let lod = self.arena.get(index).id.lod;
        self.stats.record_traversed(lod);

        let tick = self.camera.tick;
        self.arena.get_mut(index).last_access = tick;
        self.update_priority(index);

        if self.arena.get(index).meta.is_none() {
            for tile in self.arena.get(index).meta_tiles.iter().flatten() {
                tile.touch(tick);
            }
            return meta::determine_meta(self, index, init_all_children);
        }
        true
    }

    /// Hand the node's draw lists to the sink.
    pub fn render_node(&mut self, index: NodeIndex) {
        let tick = self.camera.tick;
        let lod = self.arena.get(index).id.lod;
        self.arena.get_mut(index).last_render = tick;
        self.stats.record_rendered(lod);

        let Self { arena, sink, .. } = self;
        let node = arena.get(index);
        for task in &node.opaque {
            sink.draw_surface(task, false);
        }
        for task in &node.transparent {
            sink.draw_surface(task, true);
        }
        for task in &node.colliders {
            sink.draw_collider(task);
        }
        for task in &node.geodata {
            sink.draw_geodata(task);
        }
    }

    /// Substitute the nearest determined ancestor's surface draws,
    /// clipped to this node's footprint. Fills visual gaps while the
    /// node itself streams in.
    pub fn render_node_coarser(&mut self, index: NodeIndex) {
        let Some((ancestor, sub)) = self.find_determined_ancestor(index) else {
            return;
        };
        self.touch_draws(ancestor);
        let tick = self.camera.tick;
        self.arena.get_mut(ancestor).last_render = tick;
        self.stats.rendered_coarser += 1;

        let Self { arena, sink, .. } = self;
        let node = arena.get(ancestor);
        for task in &node.opaque {
            sink.draw_surface(&task.clipped(sub), false);
        }
        for task in &node.transparent {
            sink.draw_surface(&task.clipped(sub), true);
        }
    }

    fn find_determined_ancestor(&self, index: NodeIndex) -> Option<(NodeIndex, [f64; 4])> {
        let id = self.arena.get(index).id;
        let mut current = self.arena.get(index).parent;
        while let Some(ancestor) = current {
            let node = self.arena.get(ancestor);
            if node.determined {
                let diff = id.lod - node.id.lod;
                if diff > 31 {
                    return None;
                }
                let scale = 1.0 / f64::from(1u32 << diff);
                let rx = f64::from(id.x - (node.id.x << diff)) * scale;
                let ry = f64::from(id.y - (node.id.y << diff)) * scale;
                return Some((ancestor, [rx, ry, rx + scale, ry + scale]));
            }
            current = node.parent;
        }
        None
    }

    /// Hook for grid-style preloading around a rendered node. The
    /// policies that call it only record the request for now.
    pub fn grid_preload_request(&mut self, _index: NodeIndex) {
        self.stats.preload_requests += 1;
    }
}
