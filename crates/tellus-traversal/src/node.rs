//! Traverse nodes and the arena holding one layer's tile tree.

use std::sync::Arc;

use tellus_map::{CreditId, SurfaceIndex};
use tellus_math::DAabb;
use tellus_resources::{MeshAggregate, MetaTile, Resource, Texture, Validity};
use tellus_tile::{LocalId, TileId};

use crate::tasks::{RenderColliderTask, RenderGeodataTask, RenderSurfaceTask};

/// Index of a node within its layer's [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub u32);

/// Immutable metadata of a node, set at most once.
#[derive(Clone, Debug)]
pub struct NodeMeta {
    /// Physical-space bounding box of the tile.
    pub aabb: DAabb,
    /// Tight geometry z range when the metanode reports one.
    pub geom_z: Option<(f64, f64)>,
    /// Child availability, ORed across all resolved metatiles.
    pub child_flags: [bool; 4],
    pub credits: Vec<CreditId>,
    /// Tile id relative to the chosen surface's subtree root.
    pub local: LocalId,
    pub geometry: bool,
}

/// A resource handle retained by a node for touching and polling.
#[derive(Clone)]
pub enum ResourceRef {
    Meta(Arc<Resource<MetaTile>>),
    Mesh(Arc<Resource<MeshAggregate>>),
    Texture(Arc<Resource<Texture>>),
}

impl ResourceRef {
    pub fn validity(&self) -> Validity {
        match self {
            ResourceRef::Meta(r) => r.validity(),
            ResourceRef::Mesh(r) => r.validity(),
            ResourceRef::Texture(r) => r.validity(),
        }
    }

    pub fn touch(&self, tick: u64) {
        match self {
            ResourceRef::Meta(r) => r.touch(tick),
            ResourceRef::Mesh(r) => r.touch(tick),
            ResourceRef::Texture(r) => r.touch(tick),
        }
    }
}

/// One quadtree cell of one layer.
pub struct TraverseNode {
    pub id: TileId,
    pub parent: Option<NodeIndex>,
    /// Child slots in quadrant order; created lazily after meta
    /// resolution discovers availability.
    pub children: [Option<NodeIndex>; 4],
    /// Set at most once; never cleared while children exist.
    pub meta: Option<NodeMeta>,
    /// Chosen surface; a node without one can never become determined.
    pub surface: Option<SurfaceIndex>,
    /// One optional metatile handle per surface-stack entry.
    pub meta_tiles: Vec<Option<Arc<Resource<MetaTile>>>>,
    /// Pending or retained resources, touched every visit.
    pub resources: Vec<ResourceRef>,
    pub priority: f64,
    pub last_access: u64,
    pub last_render: u64,
    pub determined: bool,
    pub opaque: Vec<RenderSurfaceTask>,
    pub transparent: Vec<RenderSurfaceTask>,
    pub geodata: Vec<RenderGeodataTask>,
    pub colliders: Vec<RenderColliderTask>,
    pub credits: Vec<CreditId>,
}

impl TraverseNode {
    pub fn new(id: TileId, parent: Option<NodeIndex>) -> Self {
        Self {
            id,
            parent,
            children: [None; 4],
            meta: None,
            surface: None,
            meta_tiles: Vec::new(),
            resources: Vec::new(),
            priority: 0.0,
            last_access: 0,
            last_render: 0,
            determined: false,
            opaque: Vec::new(),
            transparent: Vec::new(),
            geodata: Vec::new(),
            colliders: Vec::new(),
            credits: Vec::new(),
        }
    }

    pub fn renders_empty(&self) -> bool {
        self.opaque.is_empty()
            && self.transparent.is_empty()
            && self.geodata.is_empty()
            && self.colliders.is_empty()
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// Existing children in quadrant order.
    pub fn child_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.children.iter().filter_map(|c| *c)
    }
}

/// Arena owning all nodes of one layer's tree.
///
/// Parent links are indices, children own nothing but indices either;
/// the arena is the single owner, which sidesteps reference cycles.
pub struct NodeArena {
    nodes: Vec<TraverseNode>,
    free: Vec<NodeIndex>,
    root: NodeIndex,
}

impl NodeArena {
    pub fn new(root_id: TileId) -> Self {
        Self {
            nodes: vec![TraverseNode::new(root_id, None)],
            free: Vec::new(),
            root: NodeIndex(0),
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn get(&self, index: NodeIndex) -> &TraverseNode {
        &self.nodes[index.0 as usize]
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> &mut TraverseNode {
        &mut self.nodes[index.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a child node in the given quadrant slot of `parent`.
    pub fn add_child(&mut self, parent: NodeIndex, quadrant: usize) -> NodeIndex {
        debug_assert!(self.get(parent).children[quadrant].is_none());
        let id = self.get(parent).id.children()[quadrant];
        let node = TraverseNode::new(id, Some(parent));
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index.0 as usize] = node;
                index
            }
            None => {
                let index = NodeIndex(self.nodes.len() as u32);
                self.nodes.push(node);
                index
            }
        };
        self.get_mut(parent).children[quadrant] = Some(index);
        index
    }

    /// Drop a whole subtree, returning its slots to the free list. The
    /// parent's child slot is cleared by the caller.
    pub fn remove_subtree(&mut self, index: NodeIndex) {
        let children = self.get(index).children;
        for child in children.into_iter().flatten() {
            self.remove_subtree(child);
        }
        let node = self.get_mut(index);
        *node = TraverseNode::new(TileId::root(), None);
        self.free.push(index);
    }

    /// Prune subtrees not accessed since `cutoff`, except the root.
    pub fn prune_stale(&mut self, cutoff: u64) -> usize {
        let mut removed = 0;
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let children = self.get(index).children;
            for (quadrant, child) in children.into_iter().enumerate() {
                let Some(child) = child else { continue };
                if self.get(child).last_access < cutoff {
                    let before = self.free.len();
                    self.remove_subtree(child);
                    removed += self.free.len() - before;
                    self.get_mut(index).children[quadrant] = None;
                } else {
                    stack.push(child);
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_child_assigns_quadrant_id() {
        let mut arena = NodeArena::new(TileId::root());
        let root = arena.root();
        let c = arena.add_child(root, 3);
        assert_eq!(arena.get(c).id, TileId::new(1, 1, 1));
        assert_eq!(arena.get(c).parent, Some(root));
        assert_eq!(arena.get(root).children[3], Some(c));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_remove_subtree_recycles_slots() {
        let mut arena = NodeArena::new(TileId::root());
        let root = arena.root();
        let c = arena.add_child(root, 0);
        let g = arena.add_child(c, 1);
        arena.add_child(g, 2);
        assert_eq!(arena.len(), 4);

        arena.remove_subtree(c);
        arena.get_mut(root).children[0] = None;
        assert_eq!(arena.len(), 1);

        // Freed slots are reused before the vec grows.
        let d = arena.add_child(root, 2);
        assert_eq!(arena.len(), 2);
        assert!(d.0 < 4);
    }

    #[test]
    fn test_prune_stale_keeps_recent_branches() {
        let mut arena = NodeArena::new(TileId::root());
        let root = arena.root();
        let fresh = arena.add_child(root, 0);
        let stale = arena.add_child(root, 1);
        arena.add_child(stale, 0);
        arena.get_mut(fresh).last_access = 10;
        arena.get_mut(stale).last_access = 2;

        let removed = arena.prune_stale(5);
        assert_eq!(removed, 2);
        assert!(arena.get(root).children[1].is_none());
        assert_eq!(arena.get(root).children[0], Some(fresh));
    }
}
