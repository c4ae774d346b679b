//! Map layers: surface layers and free geodata layers.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tellus_math::DAabb;

use crate::{BoundLayerParams, BoundLayerRegistry, CreditRegistry, SurfaceStack};

/// Definition of a free geodata layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FreeLayerGeodata {
    /// Name under which style/features are cached.
    pub name: String,
    /// URL of the layer's active style document.
    pub style_url: String,
    /// Monolithic layers carry all features in one resource and never
    /// subdivide; tiled layers follow the surface's geodata template.
    pub monolithic: bool,
    /// Physical-space extents used to synthesize metadata for
    /// monolithic layers.
    pub extents_min: [f64; 3],
    pub extents_max: [f64; 3],
}

impl FreeLayerGeodata {
    pub fn extents(&self) -> DAabb {
        DAabb::new(
            DVec3::from_array(self.extents_min),
            DVec3::from_array(self.extents_max),
        )
    }
}

/// What a layer renders: surface tiles or geodata features.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LayerKind {
    Surface,
    Geodata(FreeLayerGeodata),
}

/// One renderable layer of the map: a surface stack plus composition
/// defaults, traversed independently each frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapLayer {
    pub id: String,
    pub kind: LayerKind,
    /// Ordered candidate surfaces; the traversal elects the topmost one
    /// with geometry per node.
    pub surface_stack: SurfaceStack,
    /// Optional tileset indirection stack resolved through metanode
    /// `source_reference` (1-based).
    pub tileset_stack: Option<SurfaceStack>,
    /// Default bound-layer composition applied to externally UV-mapped
    /// submeshes.
    pub bound_defaults: Vec<BoundLayerParams>,
}

impl MapLayer {
    pub fn is_geodata(&self) -> bool {
        matches!(self.kind, LayerKind::Geodata(_))
    }

    pub fn free_layer(&self) -> Option<&FreeLayerGeodata> {
        match &self.kind {
            LayerKind::Geodata(g) => Some(g),
            LayerKind::Surface => None,
        }
    }

    /// The bound-layer composition list for a submesh. The per-submesh
    /// texture-layer override, when present, is appended after the
    /// layer defaults.
    pub fn bound_list(&self, texture_layer: Option<&str>) -> Vec<BoundLayerParams> {
        let mut list = self.bound_defaults.clone();
        if let Some(id) = texture_layer {
            list.push(BoundLayerParams::new(id));
        }
        list
    }
}

/// The whole static map model a camera traverses.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapModel {
    pub layers: Vec<MapLayer>,
    pub bound_layers: BoundLayerRegistry,
    pub credits: CreditRegistry,
    /// Opaque options blob forwarded to geodata tile assembly.
    pub browser_options: Value,
}

impl Default for MapLayer {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: LayerKind::Surface,
            surface_stack: SurfaceStack::default(),
            tileset_stack: None,
            bound_defaults: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_list_appends_override() {
        let layer = MapLayer {
            bound_defaults: vec![BoundLayerParams::new("a"), BoundLayerParams::new("b")],
            ..Default::default()
        };
        let list = layer.bound_list(Some("c"));
        let ids: Vec<_> = list.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(layer.bound_list(None).len(), 2);
    }

    #[test]
    fn test_layer_kind() {
        let surface = MapLayer::default();
        assert!(!surface.is_geodata());
        let geo = MapLayer {
            kind: LayerKind::Geodata(FreeLayerGeodata {
                name: "poi".into(),
                style_url: "style.json".into(),
                monolithic: true,
                extents_min: [0.0; 3],
                extents_max: [1.0; 3],
            }),
            ..Default::default()
        };
        assert!(geo.is_geodata());
        assert!(geo.free_layer().unwrap().monolithic);
    }
}
