//! The interchangeable tree-walking strategies, re-run every frame.

use serde::{Deserialize, Serialize};

use crate::draws::determine_draws;
use crate::node::NodeIndex;
use crate::pass::TraversalPass;

/// Which policy walks a layer's tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraverseMode {
    /// Do not traverse at all.
    None,
    Flat,
    Hierarchical,
    Stable,
    Balanced,
    Fixed,
    DistanceBaseFixed,
}

/// Phase of the Stable policy's three-mode protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StableMode {
    Full,
    LoadOnly,
    RenderOnly,
}

/// Walk one layer's tree from `root` with the policy configured for
/// its kind.
pub fn traverse_render(pass: &mut TraversalPass, root: NodeIndex) {
    let mode = if pass.layer.is_geodata() {
        pass.options.geodata_mode
    } else {
        pass.options.surface_mode
    };
    match mode {
        TraverseMode::None => {}
        TraverseMode::Flat => trav_flat(pass, root),
        TraverseMode::Hierarchical => trav_hierarchical(pass, root, false),
        TraverseMode::Stable => {
            trav_stable(pass, root, StableMode::Full);
        }
        TraverseMode::Balanced => {
            trav_balanced(pass, root, false);
        }
        TraverseMode::Fixed => trav_fixed(pass, root),
        TraverseMode::DistanceBaseFixed => {
            trav_distance_base_fixed(pass, root);
        }
    }
}

fn visible(pass: &mut TraversalPass, index: NodeIndex) -> bool {
    let aabb = pass
        .arena
        .get(index)
        .meta
        .as_ref()
        .expect("visibility requires meta")
        .aabb;
    let visible = pass.culling.visible(&aabb);
    if !visible {
        pass.stats.culled += 1;
    }
    visible
}

fn coarse_enough(pass: &TraversalPass, index: NodeIndex) -> bool {
    let node = pass.arena.get(index);
    let aabb = node.meta.as_ref().expect("coarseness requires meta").aabb;
    pass.culling.coarseness_satisfied(&aabb, node.id.lod)
}

fn children_of(pass: &TraversalPass, index: NodeIndex) -> [Option<NodeIndex>; 4] {
    pass.arena.get(index).children
}

/// Depth-first, no fallback: draw at coarseness or leaves, recurse
/// everywhere else.
fn trav_flat(pass: &mut TraversalPass, index: NodeIndex) {
    if !pass.visit_init(index, false) {
        return;
    }
    if !visible(pass, index) {
        return;
    }
    if coarse_enough(pass, index) || !pass.arena.get(index).has_children() {
        if determine_draws(pass, index) {
            pass.render_node(index);
        }
        return;
    }
    for child in children_of(pass, index).into_iter().flatten() {
        trav_flat(pass, child);
    }
}

/// Like Flat, but the current node renders as a stand-in whenever any
/// child is still streaming, so no hole is ever left on screen.
fn trav_hierarchical(pass: &mut TraversalPass, index: NodeIndex, load_only: bool) {
    if !pass.visit_init(index, false) {
        return;
    }

    // Keep this node's resources resident while it backs children.
    {
        let node = pass.arena.get_mut(index);
        node.last_render = node.last_access;
    }

    determine_draws(pass, index);

    if load_only {
        return;
    }
    if !visible(pass, index) {
        return;
    }
    if coarse_enough(pass, index) || !pass.arena.get(index).has_children() {
        if pass.arena.get(index).determined {
            pass.render_node(index);
        }
        return;
    }

    let children = children_of(pass, index);
    let mut ok = true;
    for child in children.into_iter().flatten() {
        let node = pass.arena.get(child);
        if node.meta.is_none() {
            ok = false;
            continue;
        }
        if node.surface.is_some() && !node.determined {
            ok = false;
        }
    }

    for child in children.into_iter().flatten() {
        trav_hierarchical(pass, child, !ok);
    }

    if !ok && pass.arena.get(index).determined {
        pass.render_node(index);
    }
}

/// Three-phase protocol: preload whole subtrees before switching them
/// to render, so an already-rendering subtree never regresses.
fn trav_stable(pass: &mut TraversalPass, index: NodeIndex, mode: StableMode) -> bool {
    if mode == StableMode::RenderOnly {
        if pass.arena.get(index).meta.is_none() {
            return false;
        }
        let tick = pass.camera.tick;
        pass.arena.get_mut(index).last_access = tick;
    } else if !pass.visit_init(index, false) {
        return false;
    }

    if !visible(pass, index) {
        return true;
    }

    if mode == StableMode::RenderOnly {
        if pass.arena.get(index).determined {
            pass.touch_draws(index);
            pass.render_node(index);
        } else {
            for child in children_of(pass, index).into_iter().flatten() {
                trav_stable(pass, child, StableMode::RenderOnly);
            }
        }
        return true;
    }

    if coarse_enough(pass, index) || !pass.arena.get(index).has_children() {
        determine_draws(pass, index);
        if mode == StableMode::LoadOnly {
            let tick = pass.camera.tick;
            pass.arena.get_mut(index).last_render = tick;
            return pass.arena.get(index).determined;
        }
        if pass.arena.get(index).determined {
            pass.render_node(index);
        } else {
            for child in children_of(pass, index).into_iter().flatten() {
                trav_stable(pass, child, StableMode::RenderOnly);
            }
        }
        return true;
    }

    if mode == StableMode::Full && pass.arena.get(index).determined {
        let mut ok = true;
        for child in children_of(pass, index).into_iter().flatten() {
            ok = trav_stable(pass, child, StableMode::LoadOnly) && ok;
        }
        if !ok {
            pass.touch_draws(index);
            pass.render_node(index);
            return true;
        }
    }

    let mut ok = true;
    for child in children_of(pass, index).into_iter().flatten() {
        ok = trav_stable(pass, child, mode) && ok;
    }
    ok
}

/// Two-phase load-then-render split; child branches that produced no
/// output this frame are filled from the nearest coarser ancestor.
fn trav_balanced(pass: &mut TraversalPass, index: NodeIndex, mut render_only: bool) -> bool {
    if render_only {
        if pass.arena.get(index).meta.is_none() {
            return false;
        }
        let tick = pass.camera.tick;
        pass.arena.get_mut(index).last_access = tick;
    } else if !pass.visit_init(index, false) {
        return false;
    }

    if !visible(pass, index) {
        return true;
    }

    if render_only {
        if pass.arena.get(index).determined {
            pass.touch_draws(index);
            pass.render_node(index);
            return true;
        }
    } else if coarse_enough(pass, index) || !pass.arena.get(index).has_children() {
        pass.grid_preload_request(index);
        if determine_draws(pass, index) {
            pass.render_node(index);
            return true;
        }
        render_only = true;
    }

    let children = children_of(pass, index);
    let mut oks = [true; 4];
    let mut rendered_any = 0u32;
    for (slot, child) in children.into_iter().enumerate() {
        let Some(child) = child else { continue };
        let ok = trav_balanced(pass, child, render_only);
        oks[slot] = ok;
        if ok {
            rendered_any += 1;
        }
    }
    if rendered_any == 0 && render_only {
        return false;
    }
    for (slot, child) in children.into_iter().enumerate() {
        let Some(child) = child else { continue };
        if !oks[slot] {
            pass.render_node_coarser(child);
        }
    }
    true
}

/// Distance- and LOD-gated descent with no screen-space heuristics.
fn trav_fixed(pass: &mut TraversalPass, index: NodeIndex) {
    if !pass.visit_init(index, false) {
        return;
    }
    if pass.node_distance(index) > pass.options.fixed_distance {
        return;
    }
    if pass.arena.get(index).id.lod >= pass.options.fixed_lod
        || !pass.arena.get(index).has_children()
    {
        if determine_draws(pass, index) {
            pass.render_node(index);
        }
        return;
    }
    for child in children_of(pass, index).into_iter().flatten() {
        trav_fixed(pass, child);
    }
}

/// LOD-dependent distance thresholds with a bounded LOD slack; a child
/// the recursion failed to render is filled by drawing that child
/// directly, not a coarser ancestor.
fn trav_distance_base_fixed(pass: &mut TraversalPass, index: NodeIndex) -> bool {
    if !pass.visit_init(index, false) {
        return false;
    }

    let lod = pass.arena.get(index).id.lod;
    let lod_diff = pass.options.fixed_lod.saturating_sub(lod);
    let target_distance = pass.options.fixed_distance * f64::from(1u32 << lod_diff.min(31));
    let distance = pass.node_distance(index);
    if distance > target_distance {
        return false;
    }

    if (lod_diff < pass.options.max_lod_diff && distance > target_distance / 2.0)
        || !pass.arena.get(index).has_children()
    {
        if determine_draws(pass, index) {
            pass.render_node(index);
        }
        return true;
    }

    let children = children_of(pass, index);
    let mut rendered = [false; 4];
    let mut rendered_any = false;
    for (slot, child) in children.into_iter().enumerate() {
        let Some(child) = child else { continue };
        rendered[slot] = trav_distance_base_fixed(pass, child);
        rendered_any |= rendered[slot];
    }

    if lod_diff > pass.options.max_lod_diff {
        return rendered_any;
    }
    if !rendered_any {
        return false;
    }

    // Direct-child fallback: each skipped child is drawn once at its
    // own footprint.
    for (slot, child) in children.into_iter().enumerate() {
        let Some(child) = child else { continue };
        if rendered[slot] {
            continue;
        }
        if determine_draws(pass, child) {
            pass.render_node(child);
        }
    }
    rendered_any
}
