//! Tellus browser application framework.
//!
//! Ties the configuration, cache, and traversal crates into a running
//! browser: a synthetic tiled world, a scripted fly-in camera, and the
//! per-frame traversal loop.

pub mod browser;
pub mod camera;
pub mod world;
