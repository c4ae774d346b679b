use glam::DVec3;

/// Axis-aligned bounding box in f64 physical space.
///
/// Invariant: min.x <= max.x, min.y <= max.y, min.z <= max.z.
/// The constructor enforces this by sorting components.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DAabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl DAabb {
    /// Create an AABB from two corners. Automatically sorts
    /// components so that min <= max on every axis.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create an AABB from a center point and half-extents.
    pub fn from_center_half_extents(center: DVec3, half: DVec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Returns true if this AABB overlaps with other
    /// (including touching edges/faces).
    pub fn intersects(&self, other: &DAabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Returns the smallest AABB enclosing both self and other.
    pub fn union(&self, other: &DAabb) -> DAabb {
        DAabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the size along each axis.
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Euclidean distance from a point to the box. Zero when the point
    /// is inside or on the boundary.
    pub fn point_distance(&self, p: DVec3) -> f64 {
        let d = (self.min - p).max(p - self.max).max(DVec3::ZERO);
        d.length()
    }

    /// Replace the z range of the box, keeping the xy footprint.
    ///
    /// Used to tighten a tile box with known geometry z extents.
    pub fn with_z_range(&self, z_min: f64, z_max: f64) -> DAabb {
        DAabb::new(
            DVec3::new(self.min.x, self.min.y, z_min),
            DVec3::new(self.max.x, self.max.y, z_max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> DAabb {
        DAabb::new(DVec3::ZERO, DVec3::splat(1.0))
    }

    #[test]
    fn test_constructor_sorts_corners() {
        let b = DAabb::new(DVec3::new(2.0, -1.0, 5.0), DVec3::new(-3.0, 4.0, 0.0));
        assert_eq!(b.min, DVec3::new(-3.0, -1.0, 0.0));
        assert_eq!(b.max, DVec3::new(2.0, 4.0, 5.0));
    }

    #[test]
    fn test_contains_point() {
        let b = unit_box();
        assert!(b.contains_point(DVec3::splat(0.5)));
        assert!(b.contains_point(DVec3::ZERO));
        assert!(!b.contains_point(DVec3::new(1.5, 0.5, 0.5)));
    }

    /// Distance is zero for interior points.
    #[test]
    fn test_point_distance_inside_is_zero() {
        let b = unit_box();
        assert_eq!(b.point_distance(DVec3::splat(0.5)), 0.0);
        assert_eq!(b.point_distance(DVec3::ZERO), 0.0);
    }

    /// Distance along a single axis equals the axis gap.
    #[test]
    fn test_point_distance_axis_aligned() {
        let b = unit_box();
        let d = b.point_distance(DVec3::new(3.0, 0.5, 0.5));
        assert!((d - 2.0).abs() < 1e-12);
    }

    /// Distance to a corner is the diagonal gap.
    #[test]
    fn test_point_distance_corner() {
        let b = unit_box();
        let d = b.point_distance(DVec3::new(2.0, 2.0, 1.0));
        assert!((d - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    /// Distance is monotonically non-decreasing as the point retreats.
    #[test]
    fn test_point_distance_monotonic() {
        let b = unit_box();
        let mut prev = 0.0;
        for i in 0..10 {
            let d = b.point_distance(DVec3::new(1.0 + i as f64, 0.5, 0.5));
            assert!(d >= prev);
            prev = d;
        }
    }

    #[test]
    fn test_with_z_range() {
        let b = DAabb::new(DVec3::ZERO, DVec3::new(2.0, 2.0, 100.0));
        let t = b.with_z_range(10.0, 20.0);
        assert_eq!(t.min.z, 10.0);
        assert_eq!(t.max.z, 20.0);
        assert_eq!(t.min.x, 0.0);
        assert_eq!(t.max.y, 2.0);
    }

    #[test]
    fn test_union_and_intersects() {
        let a = unit_box();
        let b = DAabb::new(DVec3::splat(0.5), DVec3::splat(2.0));
        assert!(a.intersects(&b));
        let u = a.union(&b);
        assert_eq!(u.min, DVec3::ZERO);
        assert_eq!(u.max, DVec3::splat(2.0));
        let far = DAabb::new(DVec3::splat(5.0), DVec3::splat(6.0));
        assert!(!a.intersects(&far));
    }
}
