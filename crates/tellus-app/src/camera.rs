//! The scripted fly-in camera driving the demo traversal.

use glam::{DMat4, DVec3};
use tellus_math::Frustum;

/// A camera that descends from orbit toward a focus point on the map,
/// exercising progressively deeper refinement as it approaches.
pub struct FlyInCamera {
    /// Point on the map plane the camera descends toward.
    pub focus: DVec3,
    /// Current distance from the focus.
    pub distance: f64,
    /// Distance at which the descent stops.
    pub min_distance: f64,
    /// Fraction of the remaining distance covered per second.
    pub approach_rate: f64,
    azimuth: f64,
}

impl FlyInCamera {
    pub fn new(focus: DVec3, start_distance: f64, min_distance: f64) -> Self {
        Self {
            focus,
            distance: start_distance,
            min_distance,
            approach_rate: 0.8,
            azimuth: 0.0,
        }
    }

    /// Advance the descent by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        let factor = (-self.approach_rate * dt).exp();
        self.distance = (self.distance * factor).max(self.min_distance);
        self.azimuth += 0.1 * dt;
    }

    /// Camera position in map space.
    pub fn eye(&self) -> DVec3 {
        // Looking down at a slant so the frustum cuts across LODs.
        let lateral = self.distance * 0.4;
        self.focus
            + DVec3::new(
                lateral * self.azimuth.cos(),
                lateral * self.azimuth.sin(),
                self.distance,
            )
    }

    pub fn view_proj(&self, fov_y: f64, aspect: f64) -> DMat4 {
        let view = DMat4::look_at_rh(self.eye(), self.focus, DVec3::Z);
        let near = (self.distance * 0.01).max(1e-5);
        let far = self.distance * 100.0;
        let proj = DMat4::perspective_rh(fov_y, aspect, near, far);
        proj * view
    }

    pub fn frustum(&self, fov_y: f64, aspect: f64) -> Frustum {
        Frustum::from_view_proj(&self.view_proj(fov_y, aspect))
    }
}
