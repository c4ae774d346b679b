//! Bound layers: composable texture pyramids applied over externally
//! UV-mapped surface geometry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{CreditId, UrlTemplate};

/// Static definition of a bound layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoundLayerInfo {
    pub id: String,
    pub url_color: UrlTemplate,
    /// Optional alpha mask pyramid; layers with a mask composite as
    /// transparencies (see draw resolution for the depth-write exception).
    pub url_mask: UrlTemplate,
    /// Optional availability metatile pyramid; when configured, a tile is
    /// only requested if the bound metatile reports it present.
    pub url_meta: UrlTemplate,
    /// Whether the layer's color data itself is semi-transparent.
    pub transparent: bool,
    pub credits: Vec<CreditId>,
}

/// One entry of a layer's composition list: which bound layer to apply
/// and with what constant alpha.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundLayerParams {
    pub id: String,
    pub alpha: Option<f64>,
}

impl BoundLayerParams {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alpha: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

/// Map-wide registry of bound layer definitions, keyed by id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoundLayerRegistry {
    layers: HashMap<String, BoundLayerInfo>,
}

impl BoundLayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: BoundLayerInfo) {
        self.layers.insert(info.id.clone(), info);
    }

    pub fn get(&self, id: &str) -> Option<&BoundLayerInfo> {
        self.layers.get(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_round_trip() {
        let mut reg = BoundLayerRegistry::new();
        reg.insert(BoundLayerInfo {
            id: "ortho".into(),
            url_color: UrlTemplate::new("c/{lod}/{x}/{y}.jpg"),
            ..Default::default()
        });
        assert!(reg.get("ortho").is_some());
        assert!(reg.get("missing").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_params_builder() {
        let p = BoundLayerParams::new("ortho").with_alpha(0.5);
        assert_eq!(p.id, "ortho");
        assert_eq!(p.alpha, Some(0.5));
    }
}
