//! Asynchronous resource cache for streamed map data.
//!
//! Every resource the traversal core touches (metatiles, mesh
//! aggregates, textures, geodata) lives behind a shared handle with a
//! three-state validity machine (`Indeterminate -> Valid | Invalid`).
//! Fetching and decoding run on a background worker pool; the render
//! thread only ever polls. An undetermined consumer retries by being
//! revisited next frame, never by blocking.

mod budget;
mod cache;
mod codec;
mod geodata;
mod queue;
mod resource;
mod transport;
mod types;

pub use budget::CacheBudget;
pub use cache::{default_worker_count, CacheStats, ResourceCache};
pub use codec::{
    decode_features, decode_mesh_aggregate, decode_meta_tile, decode_style, decode_texture,
    encode_mesh_aggregate, encode_meta_tile, DecodeError, MeshAggregateSpec, MeshPartSpec,
    MetaNodeSpec,
};
pub use geodata::{
    assemble_geodata, GeodataAssemblyError, GeodataRender, GeodataRenderKind, GeodataTile,
};
pub use queue::{FetchJob, FetchKind, FetchQueue};
pub use resource::{Resource, Validity};
pub use transport::{MemoryTransport, TileTransport, TransportError};
pub use types::{
    GeodataFeatures, GeodataStyle, GpuMesh, MeshAggregate, MeshPart, MeshVertex, MetaNode,
    MetaTile, Texture,
};

/// Tiles covered per metatile axis are `2^META_BLOCK_BITS`; a metatile
/// request key is always derived from the block origin.
pub const META_BLOCK_BITS: u32 = 2;
