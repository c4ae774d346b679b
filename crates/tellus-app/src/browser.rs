//! The browser itself: owns the map model, the resource cache, one
//! node tree per layer, and the frame loop that drives traversal over
//! them.

use std::sync::Arc;

use tellus_config::Config;
use tellus_map::MapModel;
use tellus_resources::{default_worker_count, CacheBudget, MemoryTransport, ResourceCache};
use tellus_tile::TileId;
use tellus_traversal::{
    traverse_render, CameraContext, NodeArena, RenderColliderTask, RenderGeodataTask, RenderSink,
    RenderSurfaceTask, ScreenSpaceCulling, TraversalPass, TraversalStats,
};

use crate::camera::FlyInCamera;
use crate::world::SyntheticWorld;

/// How often stale subtrees are pruned, in frames.
const PRUNE_INTERVAL: u64 = 64;
/// Nodes untouched for this many ticks are dropped by the prune pass.
const STALE_TICKS: u64 = 120;

/// Draw tasks of one frame, bucketed the way a renderer consumes them.
#[derive(Default)]
pub struct DrawBatch {
    pub opaque: Vec<RenderSurfaceTask>,
    pub transparent: Vec<RenderSurfaceTask>,
    pub colliders: Vec<RenderColliderTask>,
    pub geodata: Vec<RenderGeodataTask>,
}

impl DrawBatch {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.colliders.clear();
        self.geodata.clear();
    }

    pub fn task_count(&self) -> usize {
        self.opaque.len() + self.transparent.len() + self.colliders.len() + self.geodata.len()
    }
}

impl RenderSink for DrawBatch {
    fn draw_surface(&mut self, task: &RenderSurfaceTask, transparent: bool) {
        if transparent {
            self.transparent.push(task.clone());
        } else {
            self.opaque.push(task.clone());
        }
    }

    fn draw_collider(&mut self, task: &RenderColliderTask) {
        self.colliders.push(task.clone());
    }

    fn draw_geodata(&mut self, task: &RenderGeodataTask) {
        self.geodata.push(task.clone());
    }
}

struct LayerState {
    arena: NodeArena,
}

/// Owns everything a running map session needs and advances it one
/// frame at a time.
pub struct Browser {
    config: Config,
    model: MapModel,
    transport: Arc<MemoryTransport>,
    cache: ResourceCache,
    layers: Vec<LayerState>,
    camera: FlyInCamera,
    draws: DrawBatch,
    frame_stats: TraversalStats,
    root_geometric_error: f64,
    frame_index: u64,
}

impl Browser {
    /// Browser over the built-in synthetic world, with the worker pool
    /// sized from the config.
    pub fn new(config: Config) -> Self {
        let workers = if config.cache.worker_threads == 0 {
            default_worker_count()
        } else {
            config.cache.worker_threads
        };
        Self::with_world(config, SyntheticWorld::generate(5), workers)
    }

    /// Browser over an explicit world. `worker_count == 0` keeps all
    /// fetching on the calling thread behind [`Browser::pump`].
    pub fn with_world(config: Config, world: SyntheticWorld, worker_count: usize) -> Self {
        let budget = CacheBudget {
            mesh_budget: config.cache.mesh_budget_mb * 1024 * 1024,
            texture_budget: config.cache.texture_budget_mb * 1024 * 1024,
        };
        let cache = ResourceCache::new(world.transport.clone(), budget, worker_count);
        let layers = world
            .model
            .layers
            .iter()
            .map(|_| LayerState {
                arena: NodeArena::new(TileId::root()),
            })
            .collect();
        let camera = FlyInCamera::new(glam::DVec3::new(0.35, 0.45, 0.02), 4.0, 0.08);
        Self {
            config,
            model: world.model,
            transport: world.transport,
            cache,
            layers,
            camera,
            draws: DrawBatch::default(),
            frame_stats: TraversalStats::new(),
            root_geometric_error: world.root_geometric_error,
            frame_index: 0,
        }
    }

    /// Advance the session by one frame and rebuild the draw batch.
    pub fn frame(&mut self, dt: f64) -> &DrawBatch {
        let tick = self.cache.begin_frame();
        self.camera.advance(dt);

        let fov_y = self.config.camera.fov_y();
        let aspect =
            f64::from(self.config.camera.viewport_width) / f64::from(self.config.camera.viewport_height);
        let culling = ScreenSpaceCulling::new(
            self.camera.frustum(fov_y, aspect),
            self.camera.eye(),
            fov_y,
            f64::from(self.config.camera.viewport_height),
            self.root_geometric_error,
            self.config.camera.target_error,
        );

        self.draws.clear();
        self.frame_stats = TraversalStats::new();
        let focus = self.camera.eye();
        let model = &self.model;
        let cache = &self.cache;
        let options = &self.config.traversal;
        let draws = &mut self.draws;
        let frame_stats = &mut self.frame_stats;
        for (layer, state) in model.layers.iter().zip(self.layers.iter_mut()) {
            let mut pass = TraversalPass {
                model,
                layer,
                cache,
                arena: &mut state.arena,
                culling: &culling,
                sink: &mut *draws,
                camera: CameraContext { focus, tick },
                options,
                stats: TraversalStats::new(),
            };
            let root = pass.arena.root();
            traverse_render(&mut pass, root);
            frame_stats.merge(&pass.stats);
        }

        self.cache.enforce_budget();
        if self.frame_index % PRUNE_INTERVAL == PRUNE_INTERVAL - 1 {
            let cutoff = tick.saturating_sub(STALE_TICKS);
            let pruned: usize = self
                .layers
                .iter_mut()
                .map(|state| state.arena.prune_stale(cutoff))
                .sum();
            if pruned > 0 {
                tracing::debug!(pruned, cutoff, "dropped stale subtrees");
            }
        }

        let stats_interval = self.config.debug.stats_interval_frames;
        if stats_interval != 0 && self.frame_index % stats_interval == 0 {
            let cache = self.cache.stats();
            tracing::info!(
                frame = self.frame_index,
                traversed = self.frame_stats.traversed_total,
                rendered = self.frame_stats.rendered_total,
                coarser = self.frame_stats.rendered_coarser,
                culled = self.frame_stats.culled,
                draws = self.draws.task_count(),
                pending = cache.pending_jobs,
                mesh_mb = cache.mesh_bytes / (1024 * 1024),
                tex_mb = cache.texture_bytes / (1024 * 1024),
                "frame stats"
            );
        }
        self.frame_index += 1;
        &self.draws
    }

    /// Run a fixed number of frames at a nominal 60 Hz.
    pub fn run(&mut self, frames: u64) {
        for _ in 0..frames {
            self.frame(1.0 / 60.0);
        }
        let cache = self.cache.stats();
        tracing::info!(
            frames = self.frame_index,
            requests = self.transport.request_count(),
            completed = cache.completed,
            failed = cache.failed,
            evicted = cache.evicted,
            "session finished"
        );
    }

    /// Drain pending fetches on the calling thread. Only meaningful
    /// when the browser was built with zero workers.
    pub fn pump(&self) -> usize {
        self.cache.pump()
    }

    pub fn stats(&self) -> &TraversalStats {
        &self.frame_stats
    }

    pub fn draws(&self) -> &DrawBatch {
        &self.draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converged(browser: &mut Browser, frames: usize) {
        for _ in 0..frames {
            browser.frame(1.0 / 60.0);
            browser.pump();
        }
    }

    #[test]
    fn test_browser_converges_on_synthetic_world() {
        let mut browser = Browser::with_world(Config::default(), SyntheticWorld::generate(3), 0);
        converged(&mut browser, 40);
        let stats = browser.stats();
        assert!(stats.rendered_total > 0, "nothing rendered after warmup");
        let draws = browser.draws();
        assert!(!draws.opaque.is_empty(), "terrain should land in the opaque bucket");
        assert!(
            !draws.transparent.is_empty(),
            "ortho overlay should land in the transparent bucket"
        );
        assert!(!draws.colliders.is_empty());
        assert!(!draws.geodata.is_empty(), "landmarks layer produced no geodata");
    }

    #[test]
    fn test_draw_batch_rebuilt_every_frame() {
        let mut browser = Browser::with_world(Config::default(), SyntheticWorld::generate(2), 0);
        converged(&mut browser, 30);
        // Freeze the camera and let any in-flight fetches settle.
        for _ in 0..5 {
            browser.frame(0.0);
            browser.pump();
        }
        let first = browser.draws().task_count();
        assert!(first > 0);
        browser.frame(0.0);
        assert_eq!(browser.draws().task_count(), first);
    }

    #[test]
    fn test_zero_stats_interval_disables_reporting() {
        let mut config = Config::default();
        config.debug.stats_interval_frames = 0;
        let mut browser = Browser::with_world(config, SyntheticWorld::generate(1), 0);
        converged(&mut browser, 3);
        assert!(browser.frame_index > 0);
    }

    #[test]
    fn test_workerless_browser_makes_no_progress_without_pump() {
        let mut browser = Browser::with_world(Config::default(), SyntheticWorld::generate(2), 0);
        for _ in 0..10 {
            browser.frame(1.0 / 60.0);
        }
        assert_eq!(browser.stats().rendered_total, 0);
        assert!(browser.draws().task_count() == 0);
    }

    #[test]
    fn test_stale_subtrees_are_pruned_after_flyaway() {
        let mut browser = Browser::with_world(Config::default(), SyntheticWorld::generate(3), 0);
        converged(&mut browser, 40);
        let populated: usize = browser.layers.iter().map(|s| s.arena.len()).sum();
        assert!(populated > 2, "warmup should have expanded the trees");

        // Move the camera far away so the whole pyramid goes stale,
        // then run past the prune interval.
        browser.camera.focus = glam::DVec3::new(500.0, 500.0, 0.0);
        browser.camera.distance = 400.0;
        browser.camera.min_distance = 400.0;
        converged(&mut browser, PRUNE_INTERVAL as usize + STALE_TICKS as usize + 10);
        let remaining: usize = browser.layers.iter().map(|s| s.arena.len()).sum();
        assert!(
            remaining < populated,
            "prune kept {remaining} of {populated} nodes"
        );
    }
}
