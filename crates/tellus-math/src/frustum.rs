//! View-frustum culling against f64 AABBs.

use glam::{DMat4, DVec3, DVec4};

use crate::DAabb;

/// Result of testing an AABB against the frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    /// The box is entirely inside the frustum.
    Inside,
    /// The box is entirely outside the frustum.
    Outside,
    /// The box straddles one or more frustum planes.
    Intersecting,
}

/// A plane in f64 space. The plane equation is
/// `normal.dot(point) + distance >= 0` for the "inside" half-space.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Build a plane from a row of a view-projection matrix combination,
    /// normalizing so signed distances are in world units.
    fn from_coefficients(v: DVec4) -> Self {
        let normal = DVec3::new(v.x, v.y, v.z);
        let len = normal.length();
        Self {
            normal: normal / len,
            distance: v.w / len,
        }
    }

    /// Signed distance; positive on the inside half-space.
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.signed_distance(point) >= 0.0
    }
}

/// A view frustum with inward-pointing plane normals,
/// ordered: left, right, bottom, top, near, far.
#[derive(Debug, Clone)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract the six planes from a combined view-projection matrix
    /// (Gribb/Hartmann method). Assumes glam's 0..1 clip depth, where
    /// the near plane is `z' >= 0` rather than `z' >= -w`.
    pub fn from_view_proj(m: &DMat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0), // left
                Plane::from_coefficients(r3 - r0), // right
                Plane::from_coefficients(r3 + r1), // bottom
                Plane::from_coefficients(r3 - r1), // top
                Plane::from_coefficients(r2),      // near
                Plane::from_coefficients(r3 - r2), // far
            ],
        }
    }

    /// Test whether a point is inside all six planes.
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|p| p.contains_point(point))
    }

    /// Test an AABB against the frustum using the p-vertex / n-vertex
    /// method. For each plane, the p-vertex is the box corner most in the
    /// direction of the plane normal and the n-vertex is the opposite
    /// corner. If the p-vertex is outside any plane the box is outside;
    /// if every n-vertex is inside the box is fully inside.
    pub fn intersects_aabb(&self, aabb: &DAabb) -> Intersection {
        let mut all_inside = true;
        for plane in &self.planes {
            let p_vertex = DVec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.signed_distance(p_vertex) < 0.0 {
                return Intersection::Outside;
            }
            let n_vertex = DVec3::new(
                if plane.normal.x >= 0.0 { aabb.min.x } else { aabb.max.x },
                if plane.normal.y >= 0.0 { aabb.min.y } else { aabb.max.y },
                if plane.normal.z >= 0.0 { aabb.min.z } else { aabb.max.z },
            );
            if plane.signed_distance(n_vertex) < 0.0 {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersecting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An axis-aligned "slab" frustum around the origin: |x|,|y|,|z| <= 10.
    fn slab_frustum() -> Frustum {
        Frustum::new([
            Plane::new(DVec3::X, 10.0),
            Plane::new(-DVec3::X, 10.0),
            Plane::new(DVec3::Y, 10.0),
            Plane::new(-DVec3::Y, 10.0),
            Plane::new(DVec3::Z, 10.0),
            Plane::new(-DVec3::Z, 10.0),
        ])
    }

    #[test]
    fn test_point_inside() {
        let f = slab_frustum();
        assert!(f.contains_point(DVec3::ZERO));
        assert!(f.contains_point(DVec3::splat(9.9)));
        assert!(!f.contains_point(DVec3::new(10.1, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_fully_inside() {
        let f = slab_frustum();
        let b = DAabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        assert_eq!(f.intersects_aabb(&b), Intersection::Inside);
    }

    #[test]
    fn test_aabb_fully_outside() {
        let f = slab_frustum();
        let b = DAabb::new(DVec3::splat(20.0), DVec3::splat(30.0));
        assert_eq!(f.intersects_aabb(&b), Intersection::Outside);
    }

    #[test]
    fn test_aabb_straddling_plane() {
        let f = slab_frustum();
        let b = DAabb::new(DVec3::new(5.0, -1.0, -1.0), DVec3::new(15.0, 1.0, 1.0));
        assert_eq!(f.intersects_aabb(&b), Intersection::Intersecting);
    }

    /// A frustum extracted from an orthographic projection must accept
    /// boxes in the view volume and reject boxes behind the camera.
    #[test]
    fn test_from_view_proj_orthographic() {
        let proj = DMat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.1, 100.0);
        let f = Frustum::from_view_proj(&proj);
        // In front of the camera (rh looks down -z).
        let visible = DAabb::new(DVec3::new(-1.0, -1.0, -5.0), DVec3::new(1.0, 1.0, -4.0));
        assert_ne!(f.intersects_aabb(&visible), Intersection::Outside);
        // Behind the camera.
        let behind = DAabb::new(DVec3::new(-1.0, -1.0, 4.0), DVec3::new(1.0, 1.0, 5.0));
        assert_eq!(f.intersects_aabb(&behind), Intersection::Outside);
        // Far off to the side.
        let side = DAabb::new(DVec3::new(50.0, -1.0, -5.0), DVec3::new(60.0, 1.0, -4.0));
        assert_eq!(f.intersects_aabb(&side), Intersection::Outside);
    }

    /// The near plane of a 0..1 clip-depth perspective matrix sits at
    /// `z = -near`, not behind the eye.
    #[test]
    fn test_from_view_proj_perspective_near_plane() {
        let proj = DMat4::perspective_rh(std::f64::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        let f = Frustum::from_view_proj(&proj);
        // Between the eye and the near plane.
        let too_close = DAabb::new(
            DVec3::new(-0.001, -0.001, -0.05),
            DVec3::new(0.001, 0.001, -0.02),
        );
        assert_eq!(f.intersects_aabb(&too_close), Intersection::Outside);
        // Past the near plane, in view.
        let ahead = DAabb::new(DVec3::new(-0.1, -0.1, -2.0), DVec3::new(0.1, 0.1, -1.0));
        assert_ne!(f.intersects_aabb(&ahead), Intersection::Outside);
        // Behind the camera.
        let behind = DAabb::new(DVec3::new(-0.1, -0.1, 1.0), DVec3::new(0.1, 0.1, 2.0));
        assert_eq!(f.intersects_aabb(&behind), Intersection::Outside);
    }
}
