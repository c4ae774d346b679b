//! Metadata resolution: which surface serves a node, and which
//! children exist.

use std::sync::Arc;

use tellus_map::{FreeLayerGeodata, SurfaceIndex, TileVars};
use tellus_resources::{MetaNode, MetaTile, Resource, Validity, META_BLOCK_BITS};
use tellus_tile::TileId;

use crate::node::{NodeIndex, NodeMeta};
use crate::pass::TraversalPass;

/// Resolve a node's metadata from its candidate surfaces' metatiles.
///
/// Returns false while any requested metatile is still indeterminate;
/// the node is then revisited next frame. Resolution happens at most
/// once per node.
pub(crate) fn determine_meta(
    pass: &mut TraversalPass,
    index: NodeIndex,
    init_all_children: bool,
) -> bool {
    {
        let node = pass.arena.get(index);
        debug_assert!(node.meta.is_none(), "meta resolved twice");
        debug_assert!(!node.has_children());
        debug_assert!(!node.determined);
        debug_assert!(node.renders_empty());
        if let Some(parent) = node.parent {
            debug_assert!(
                pass.arena.get(parent).meta.is_some(),
                "child visited before parent meta"
            );
        }
    }

    pass.stats.meta_updates += 1;

    if let Some(free) = pass.layer.free_layer() {
        if free.monolithic {
            return synthesize_monolithic(pass, index, free);
        }
    }

    request_meta_tiles(pass, index);

    // Convergence: every surface must independently leave
    // Indeterminate before any selection happens.
    let mut converged = true;
    {
        let node = pass.arena.get(index);
        let priority = node.priority;
        for tile in node.meta_tiles.iter().flatten() {
            tile.update_priority((priority * 2.0) as f32);
            tile.touch(pass.camera.tick);
            if tile.validity() == Validity::Indeterminate {
                converged = false;
            }
        }
    }
    if !converged {
        return false;
    }

    let node_id = pass.arena.get(index).id;
    let Some(selection) = select_topmost(pass, index, node_id) else {
        // Every requested metatile turned out invalid; stay
        // unresolved and re-poll next visit.
        return false;
    };

    let local_root = selection
        .surface
        .and_then(|s| pass.surface(s))
        .map_or(TileId::root(), |s| s.subtree_root);

    {
        let node = pass.arena.get_mut(index);
        if let Some(surface) = selection.surface {
            node.surface = Some(surface);
            node.credits.extend(selection.node.credits.iter().copied());
        }
        node.meta = Some(NodeMeta {
            aabb: selection.node.aabb,
            geom_z: selection.node.geom_z,
            child_flags: selection.children,
            credits: selection.node.credits.clone(),
            local: node_id.local(local_root),
            geometry: selection.node.geometry,
        });
    }

    tracing::trace!(
        tile = ?node_id,
        surface = ?selection.surface,
        children = ?selection.children,
        "metadata resolved"
    );

    if init_all_children || selection.children.iter().any(|&f| f) {
        for quadrant in 0..4 {
            if init_all_children || selection.children[quadrant] {
                pass.arena.add_child(index, quadrant);
            }
        }
    }

    pass.update_priority(index);
    true
}

/// Non-tiled geodata layers carry their whole definition in the layer
/// config; metadata is synthesized without any metatile round trip.
fn synthesize_monolithic(
    pass: &mut TraversalPass,
    index: NodeIndex,
    free: &FreeLayerGeodata,
) -> bool {
    let aabb = free.extents();
    let node = pass.arena.get_mut(index);
    let id = node.id;
    node.meta = Some(NodeMeta {
        aabb,
        geom_z: None,
        child_flags: [false; 4],
        credits: Vec::new(),
        local: id.local(TileId::root()),
        geometry: true,
    });
    node.surface = Some(SurfaceIndex::Stack(0));
    pass.update_priority(index);
    true
}

/// Lazily issue one metatile request per surface-stack entry, skipping
/// surfaces whose parent metanode marks this quadrant as absent.
fn request_meta_tiles(pass: &mut TraversalPass, index: NodeIndex) {
    if !pass.arena.get(index).meta_tiles.is_empty() {
        return;
    }
    let layer = pass.layer;
    let surfaces = &layer.surface_stack.surfaces;
    let node_id = pass.arena.get(index).id;
    let parent_index = pass.arena.get(index).parent;
    let priority = pass.arena.get(index).priority;

    let origin = node_id.meta_block_origin(META_BLOCK_BITS);
    let vars = TileVars::new(origin, origin.local(TileId::root()));

    let mut tiles: Vec<Option<Arc<Resource<MetaTile>>>> = vec![None; surfaces.len()];
    for (i, surface) in surfaces.iter().enumerate() {
        if surface.url_meta.is_empty() {
            continue;
        }
        if let Some(parent_index) = parent_index {
            let parent = pass.arena.get(parent_index);
            let Some(parent_tile) = parent.meta_tiles.get(i).and_then(Option::as_ref) else {
                continue;
            };
            // The parent id always exists here; the root has no parent.
            let Some(parent_id) = node_id.parent() else {
                continue;
            };
            let quadrant = node_id.quadrant_in_parent();
            let available = parent_tile
                .get()
                .and_then(|tile| tile.get(parent_id))
                .map(|node| node.child_flags[quadrant]);
            if available != Some(true) {
                continue;
            }
        }
        let key = surface.url_meta.resolve(&vars);
        tiles[i] = Some(pass.cache.fetch_meta(&key, priority * 2.0));
    }
    pass.arena.get_mut(index).meta_tiles = tiles;
}

struct Selection {
    surface: Option<SurfaceIndex>,
    node: MetaNode,
    children: [bool; 4],
}

/// Elect the topmost surface with geometry among the resolved
/// metatiles, collecting ORed child availability along the way.
fn select_topmost(pass: &TraversalPass, index: NodeIndex, node_id: TileId) -> Option<Selection> {
    let layer = pass.layer;
    let surfaces = &layer.surface_stack.surfaces;
    let node = pass.arena.get(index);

    let mut topmost: Option<SurfaceIndex> = None;
    let mut chosen: Option<MetaNode> = None;
    let mut children = [false; 4];

    for (i, tile) in node.meta_tiles.iter().enumerate() {
        let Some(tile) = tile else { continue };
        let Some(meta_node) = tile.get().and_then(|t| t.get(node_id)) else {
            continue;
        };
        for (slot, &flag) in children.iter_mut().zip(&meta_node.child_flags) {
            *slot |= flag;
        }
        if topmost.is_some() || meta_node.alien != surfaces[i].alien {
            continue;
        }
        if meta_node.geometry {
            chosen = Some(meta_node.clone());
            topmost = match &layer.tileset_stack {
                Some(tileset) => {
                    let reference = meta_node.source_reference as usize;
                    debug_assert!(
                        reference >= 1 && reference <= tileset.len(),
                        "source_reference {reference} out of tileset stack"
                    );
                    Some(SurfaceIndex::Tileset(reference.saturating_sub(1)))
                }
                None => Some(SurfaceIndex::Stack(i)),
            };
        }
        if chosen.is_none() {
            chosen = Some(meta_node.clone());
        }
    }

    chosen.map(|node| Selection {
        surface: topmost,
        node,
        children,
    })
}
