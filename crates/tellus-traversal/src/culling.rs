//! Visibility and coarseness tests consulted by the policies.

use glam::DVec3;
use tellus_math::{DAabb, Frustum, Intersection};

/// The two per-node geometric questions a policy asks.
pub trait CullingModel {
    /// Whether the node's bounding box can appear on screen at all.
    fn visible(&self, aabb: &DAabb) -> bool;

    /// Whether the node's screen-space error is already small enough
    /// that subdividing further would not improve the image.
    fn coarseness_satisfied(&self, aabb: &DAabb, lod: u32) -> bool;
}

/// Frustum culling plus a screen-space-error coarseness heuristic.
///
/// The error estimate is the classic `geometricError * viewportHeight
/// / (distance * 2 tan(fovY/2))` with the per-LOD geometric error
/// halving at each subdivision.
pub struct ScreenSpaceCulling {
    frustum: Frustum,
    eye: DVec3,
    viewport_height: f64,
    /// `2 * tan(fovY / 2)`.
    sse_denominator: f64,
    /// Geometric error of the root tile, in physical units.
    root_geometric_error: f64,
    /// Largest tolerated screen-space error, in pixels.
    target_error: f64,
}

impl ScreenSpaceCulling {
    pub fn new(
        frustum: Frustum,
        eye: DVec3,
        fov_y: f64,
        viewport_height: f64,
        root_geometric_error: f64,
        target_error: f64,
    ) -> Self {
        Self {
            frustum,
            eye,
            viewport_height,
            sse_denominator: 2.0 * (fov_y * 0.5).tan(),
            root_geometric_error,
            target_error,
        }
    }

    fn screen_space_error(&self, aabb: &DAabb, lod: u32) -> f64 {
        let geometric_error = self.root_geometric_error / f64::from(1u32 << lod.min(31));
        let distance = aabb.point_distance(self.eye).max(1e-9);
        geometric_error * self.viewport_height / (distance * self.sse_denominator)
    }
}

impl CullingModel for ScreenSpaceCulling {
    fn visible(&self, aabb: &DAabb) -> bool {
        self.frustum.intersects_aabb(aabb) != Intersection::Outside
    }

    fn coarseness_satisfied(&self, aabb: &DAabb, lod: u32) -> bool {
        self.screen_space_error(aabb, lod) <= self.target_error
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Everything visible; subdivision stops at a fixed LOD.
    pub struct LodCulling {
        pub stop_lod: u32,
    }

    impl CullingModel for LodCulling {
        fn visible(&self, _aabb: &DAabb) -> bool {
            true
        }

        fn coarseness_satisfied(&self, _aabb: &DAabb, lod: u32) -> bool {
            lod >= self.stop_lod
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DMat4;

    fn culling(eye: DVec3) -> ScreenSpaceCulling {
        let view = DMat4::look_at_rh(eye, DVec3::new(0.5, 0.5, 0.0), DVec3::Y);
        let proj = DMat4::perspective_rh(1.0, 1.0, 0.01, 100.0);
        ScreenSpaceCulling::new(Frustum::from_view_proj(&(proj * view)), eye, 1.0, 1080.0, 0.5, 2.0)
    }

    #[test]
    fn test_error_decreases_with_lod_and_distance() {
        let c = culling(DVec3::new(0.5, 0.5, 3.0));
        let aabb = DAabb::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.1));
        let coarse = c.screen_space_error(&aabb, 0);
        let fine = c.screen_space_error(&aabb, 4);
        assert!(fine < coarse);

        let far = culling(DVec3::new(0.5, 0.5, 50.0));
        assert!(far.screen_space_error(&aabb, 0) < coarse);
    }

    #[test]
    fn test_coarseness_settles_at_depth() {
        let c = culling(DVec3::new(0.5, 0.5, 3.0));
        let aabb = DAabb::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.1));
        assert!(!c.coarseness_satisfied(&aabb, 0));
        assert!(c.coarseness_satisfied(&aabb, 20));
    }

    #[test]
    fn test_behind_camera_is_invisible() {
        let c = culling(DVec3::new(0.5, 0.5, 3.0));
        let behind = DAabb::new(DVec3::new(0.0, 0.0, 10.0), DVec3::new(1.0, 1.0, 11.0));
        assert!(!c.visible(&behind));
        let front = DAabb::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.1));
        assert!(c.visible(&front));
    }
}
