//! Geometry primitives shared across the tellus workspace: f64 bounding
//! boxes, planes, and view-frustum tests in the physical SRS.

mod aabb;
mod frustum;

pub use aabb::DAabb;
pub use frustum::{Frustum, Intersection, Plane};
