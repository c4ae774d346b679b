//! Draw tasks handed to the renderer, and the sink seam they cross.

use std::sync::Arc;

use glam::DMat4;
use tellus_resources::{GeodataRender, GpuMesh, Resource, Texture};

/// One textured submesh draw.
#[derive(Clone)]
pub struct RenderSurfaceTask {
    pub mesh: Arc<GpuMesh>,
    /// Normalized-to-physical model transform.
    pub model: DMat4,
    pub color_texture: Option<Arc<Resource<Texture>>>,
    pub mask_texture: Option<Arc<Resource<Texture>>>,
    pub alpha: f64,
    /// UV sub-rectangle `[u0, v0, u1, v1]`; narrowed when an ancestor's
    /// draws substitute for a child tile.
    pub uv_clip: [f64; 4],
    pub external_uv: bool,
    pub bound_layer: Option<String>,
}

impl RenderSurfaceTask {
    pub fn new(mesh: Arc<GpuMesh>, model: DMat4) -> Self {
        Self {
            mesh,
            model,
            color_texture: None,
            mask_texture: None,
            alpha: 1.0,
            uv_clip: [0.0, 0.0, 1.0, 1.0],
            external_uv: false,
            bound_layer: None,
        }
    }

    /// Narrow the task's UV window to a sub-rectangle of itself.
    pub fn clipped(&self, sub: [f64; 4]) -> Self {
        let [u0, v0, u1, v1] = self.uv_clip;
        let du = u1 - u0;
        let dv = v1 - v0;
        let mut out = self.clone();
        out.uv_clip = [
            u0 + sub[0] * du,
            v0 + sub[1] * dv,
            u0 + sub[2] * du,
            v0 + sub[3] * dv,
        ];
        out
    }
}

/// Physics/picking geometry; emitted independently of texture state.
#[derive(Clone)]
pub struct RenderColliderTask {
    pub mesh: Arc<GpuMesh>,
    pub model: DMat4,
}

/// A shared alias of one geodata render primitive.
#[derive(Clone)]
pub struct RenderGeodataTask {
    pub render: Arc<GeodataRender>,
}

/// Where a traversal pass delivers its draw tasks.
pub trait RenderSink {
    fn draw_surface(&mut self, task: &RenderSurfaceTask, transparent: bool);
    fn draw_collider(&mut self, task: &RenderColliderTask);
    fn draw_geodata(&mut self, task: &RenderGeodataTask);
}

/// Sink that records a textual trace of everything drawn.
///
/// The trace is deterministic for a static scene, so tests can compare
/// whole frames against each other.
#[derive(Default)]
pub struct RecordingSink {
    pub lines: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

fn texture_key(texture: &Option<Arc<Resource<Texture>>>) -> &str {
    texture.as_deref().map_or("-", Resource::key)
}

impl RenderSink for RecordingSink {
    fn draw_surface(&mut self, task: &RenderSurfaceTask, transparent: bool) {
        self.lines.push(format!(
            "surface bucket={} color={} mask={} alpha={} uv={:?} ext={} bound={}",
            if transparent { "transparent" } else { "opaque" },
            texture_key(&task.color_texture),
            texture_key(&task.mask_texture),
            task.alpha,
            task.uv_clip,
            task.external_uv,
            task.bound_layer.as_deref().unwrap_or("-"),
        ));
    }

    fn draw_collider(&mut self, task: &RenderColliderTask) {
        self.lines
            .push(format!("collider tris={}", task.mesh.indices.len() / 3));
    }

    fn draw_geodata(&mut self, task: &RenderGeodataTask) {
        self.lines.push(format!(
            "geodata kind={:?} points={} label={}",
            task.render.kind,
            task.render.positions.len(),
            task.render.label.as_deref().unwrap_or("-"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipped_composes_uv_windows() {
        let mesh = Arc::new(GpuMesh::default());
        let mut task = RenderSurfaceTask::new(mesh, DMat4::IDENTITY);
        task.uv_clip = [0.5, 0.0, 1.0, 0.5];
        let sub = task.clipped([0.5, 0.5, 1.0, 1.0]);
        assert_eq!(sub.uv_clip, [0.75, 0.25, 1.0, 0.5]);
    }
}
