//! Static map model: the per-layer surface stacks, bound-layer registry,
//! free (geodata) layer definitions, URL templates, and credit registry
//! that the traversal core consults while walking tile trees.
//!
//! Everything here is immutable for the lifetime of a map view; the
//! traversal core borrows it and never mutates it.

mod bound;
mod credits;
mod layer;
mod surface;
mod url_template;

pub use bound::{BoundLayerInfo, BoundLayerParams, BoundLayerRegistry};
pub use credits::{Credit, CreditId, CreditRegistry};
pub use layer::{FreeLayerGeodata, LayerKind, MapLayer, MapModel};
pub use surface::{SurfaceIndex, SurfaceInfo, SurfaceStack};
pub use url_template::{TileVars, UrlTemplate};
