//! Tile URL templates with `{lod}`-style placeholder substitution.

use serde::{Deserialize, Serialize};
use tellus_tile::{LocalId, TileId};

/// Substitution variables for one tile request.
#[derive(Clone, Copy, Debug)]
pub struct TileVars {
    pub id: TileId,
    pub local: LocalId,
    /// Submesh index for per-submesh resources (internal textures).
    pub sub: u32,
}

impl TileVars {
    pub fn new(id: TileId, local: LocalId) -> Self {
        Self { id, local, sub: 0 }
    }

    pub fn with_sub(mut self, sub: u32) -> Self {
        self.sub = sub;
        self
    }
}

/// A URL template such as `https://host/tiles/{lod}-{x}-{y}.mesh`.
///
/// Recognized placeholders: `{lod}`, `{x}`, `{y}` (global tile id),
/// `{loclod}`, `{locx}`, `{locy}` (subtree-local id), `{sub}` (submesh
/// index). Unknown placeholders are left verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTemplate(pub String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Whether the template is configured at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expand the template for one tile.
    pub fn resolve(&self, vars: &TileVars) -> String {
        let mut out = self.0.clone();
        for (name, value) in [
            ("{lod}", vars.id.lod),
            ("{x}", vars.id.x),
            ("{y}", vars.id.y),
            ("{loclod}", vars.local.lod),
            ("{locx}", vars.local.x),
            ("{locy}", vars.local.y),
            ("{sub}", vars.sub),
        ] {
            if out.contains(name) {
                out = out.replace(name, &value.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TileVars {
        let id = TileId::new(3, 5, 2);
        TileVars::new(id, id.local(TileId::new(1, 1, 0)))
    }

    #[test]
    fn test_resolve_global_id() {
        let t = UrlTemplate::new("https://h/{lod}-{x}-{y}.meta");
        assert_eq!(t.resolve(&vars()), "https://h/3-5-2.meta");
    }

    #[test]
    fn test_resolve_local_id_and_sub() {
        let t = UrlTemplate::new("{loclod}/{locx}/{locy}/{sub}.jpg");
        assert_eq!(t.resolve(&vars().with_sub(4)), "2/1/2/4.jpg");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let t = UrlTemplate::new("{x}/{unknown}");
        assert_eq!(t.resolve(&vars()), "5/{unknown}");
    }
}
