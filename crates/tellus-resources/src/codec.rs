//! Binary tile formats and their encoders/decoders.
//!
//! Encoders exist so that synthetic transports and tests can author
//! tiles; the streaming side only ever decodes.

use std::sync::Arc;

use glam::{DMat4, DVec3};
use tellus_map::CreditId;
use tellus_math::DAabb;
use tellus_tile::TileId;
use thiserror::Error;

use crate::types::{
    GeodataFeatures, GeodataStyle, GpuMesh, MeshAggregate, MeshPart, MeshVertex, MetaNode,
    MetaTile, Texture,
};

const META_MAGIC: &[u8; 4] = b"TMT1";
const MESH_MAGIC: &[u8; 4] = b"TMA1";

const NODE_GEOMETRY: u8 = 1;
const NODE_ALIEN: u8 = 2;
const NODE_GEOM_Z: u8 = 4;

const PART_INTERNAL_UV: u8 = 1;
const PART_EXTERNAL_UV: u8 = 2;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of tile data")]
    UnexpectedEof,
    #[error("bad magic, expected {expected:?}")]
    BadMagic { expected: &'static str },
    #[error("vertex buffer length is not a multiple of the vertex size")]
    BadVertexData,
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Authoring-side description of one metanode.
#[derive(Clone, Debug)]
pub struct MetaNodeSpec {
    pub id: TileId,
    pub geometry: bool,
    pub alien: bool,
    pub child_flags: [bool; 4],
    pub source_reference: u16,
    pub aabb: DAabb,
    pub geom_z: Option<(f64, f64)>,
    pub credits: Vec<u16>,
}

impl MetaNodeSpec {
    pub fn new(id: TileId, aabb: DAabb) -> Self {
        Self {
            id,
            geometry: true,
            alien: false,
            child_flags: [false; 4],
            source_reference: 0,
            aabb,
            geom_z: None,
            credits: vec![],
        }
    }

    pub fn children(mut self, flags: [bool; 4]) -> Self {
        self.child_flags = flags;
        self
    }

    pub fn alien(mut self, alien: bool) -> Self {
        self.alien = alien;
        self
    }

    pub fn geometry(mut self, geometry: bool) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn source_reference(mut self, reference: u16) -> Self {
        self.source_reference = reference;
        self
    }
}

/// Authoring-side description of one submesh.
#[derive(Clone, Debug)]
pub struct MeshPartSpec {
    pub internal_uv: bool,
    pub external_uv: bool,
    pub texture_layer: Option<String>,
    pub surface_reference: u16,
    pub norm_to_phys: DMat4,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl Default for MeshPartSpec {
    fn default() -> Self {
        Self {
            internal_uv: false,
            external_uv: true,
            texture_layer: None,
            surface_reference: 0,
            norm_to_phys: DMat4::IDENTITY,
            vertices: vec![],
            indices: vec![],
        }
    }
}

/// Authoring-side description of a whole mesh aggregate.
#[derive(Clone, Debug, Default)]
pub struct MeshAggregateSpec {
    pub parts: Vec<MeshPartSpec>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        let b = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(f64::from_le_bytes(buf))
    }

    fn tile_id(&mut self) -> Result<TileId, DecodeError> {
        let lod = self.u32()?;
        let x = self.u32()?;
        let y = self.u32()?;
        Ok(TileId::new(lod, x, y))
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_tile_id(out: &mut Vec<u8>, id: TileId) {
    put_u32(out, id.lod);
    put_u32(out, id.x);
    put_u32(out, id.y);
}

pub fn encode_meta_tile(origin: TileId, nodes: &[MetaNodeSpec]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(META_MAGIC);
    put_tile_id(&mut out, origin);
    put_u32(&mut out, nodes.len() as u32);
    for node in nodes {
        put_tile_id(&mut out, node.id);
        let mut flags = 0u8;
        if node.geometry {
            flags |= NODE_GEOMETRY;
        }
        if node.alien {
            flags |= NODE_ALIEN;
        }
        if node.geom_z.is_some() {
            flags |= NODE_GEOM_Z;
        }
        out.push(flags);
        let mut children = 0u8;
        for (i, &set) in node.child_flags.iter().enumerate() {
            if set {
                children |= 1 << i;
            }
        }
        out.push(children);
        put_u16(&mut out, node.source_reference);
        for v in [node.aabb.min, node.aabb.max] {
            put_f64(&mut out, v.x);
            put_f64(&mut out, v.y);
            put_f64(&mut out, v.z);
        }
        if let Some((lo, hi)) = node.geom_z {
            put_f64(&mut out, lo);
            put_f64(&mut out, hi);
        }
        out.push(node.credits.len() as u8);
        for &c in &node.credits {
            put_u16(&mut out, c);
        }
    }
    out
}

pub fn decode_meta_tile(data: &[u8]) -> Result<MetaTile, DecodeError> {
    let mut r = Reader::new(data);
    if r.bytes(4)? != META_MAGIC {
        return Err(DecodeError::BadMagic { expected: "TMT1" });
    }
    let origin = r.tile_id()?;
    let count = r.u32()? as usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let id = r.tile_id()?;
        let flags = r.u8()?;
        let children = r.u8()?;
        let source_reference = r.u16()?;
        let min = DVec3::new(r.f64()?, r.f64()?, r.f64()?);
        let max = DVec3::new(r.f64()?, r.f64()?, r.f64()?);
        let geom_z = if flags & NODE_GEOM_Z != 0 {
            Some((r.f64()?, r.f64()?))
        } else {
            None
        };
        let ncredits = r.u8()? as usize;
        let mut credits = Vec::with_capacity(ncredits);
        for _ in 0..ncredits {
            credits.push(CreditId(r.u16()?));
        }
        nodes.push(MetaNode {
            id,
            geometry: flags & NODE_GEOMETRY != 0,
            alien: flags & NODE_ALIEN != 0,
            child_flags: [
                children & 1 != 0,
                children & 2 != 0,
                children & 4 != 0,
                children & 8 != 0,
            ],
            source_reference,
            aabb: DAabb::new(min, max),
            geom_z,
            credits,
        });
    }
    Ok(MetaTile::new(origin, nodes))
}

pub fn encode_mesh_aggregate(spec: &MeshAggregateSpec) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MESH_MAGIC);
    put_u16(&mut out, spec.parts.len() as u16);
    for part in &spec.parts {
        let mut flags = 0u8;
        if part.internal_uv {
            flags |= PART_INTERNAL_UV;
        }
        if part.external_uv {
            flags |= PART_EXTERNAL_UV;
        }
        out.push(flags);
        let layer = part.texture_layer.as_deref().unwrap_or("");
        out.push(layer.len() as u8);
        out.extend_from_slice(layer.as_bytes());
        put_u16(&mut out, part.surface_reference);
        for v in part.norm_to_phys.to_cols_array() {
            put_f64(&mut out, v);
        }
        put_u32(&mut out, part.vertices.len() as u32);
        out.extend_from_slice(bytemuck::cast_slice(&part.vertices));
        put_u32(&mut out, part.indices.len() as u32);
        out.extend_from_slice(bytemuck::cast_slice(&part.indices));
    }
    out
}

pub fn decode_mesh_aggregate(data: &[u8]) -> Result<MeshAggregate, DecodeError> {
    let mut r = Reader::new(data);
    if r.bytes(4)? != MESH_MAGIC {
        return Err(DecodeError::BadMagic { expected: "TMA1" });
    }
    let count = r.u16()? as usize;
    let mut submeshes = Vec::with_capacity(count);
    for _ in 0..count {
        let flags = r.u8()?;
        let layer_len = r.u8()? as usize;
        let layer_bytes = r.bytes(layer_len)?;
        let texture_layer = if layer_len == 0 {
            None
        } else {
            Some(String::from_utf8_lossy(layer_bytes).into_owned())
        };
        let surface_reference = r.u16()?;
        let mut cols = [0.0f64; 16];
        for c in &mut cols {
            *c = r.f64()?;
        }
        let vcount = r.u32()? as usize;
        let vbytes = r.bytes(vcount * std::mem::size_of::<MeshVertex>())?;
        // The vertex payload sits at an arbitrary byte offset in the
        // stream, so each vertex is copied out, not cast in place.
        let vertices: Vec<MeshVertex> = vbytes
            .chunks_exact(std::mem::size_of::<MeshVertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        if vertices.len() != vcount {
            return Err(DecodeError::BadVertexData);
        }
        let icount = r.u32()? as usize;
        let mut indices = Vec::with_capacity(icount);
        for _ in 0..icount {
            indices.push(r.u32()?);
        }
        submeshes.push(MeshPart {
            mesh: Arc::new(GpuMesh { vertices, indices }),
            norm_to_phys: DMat4::from_cols_array(&cols),
            internal_uv: flags & PART_INTERNAL_UV != 0,
            external_uv: flags & PART_EXTERNAL_UV != 0,
            texture_layer,
            surface_reference,
        });
    }
    Ok(MeshAggregate { submeshes })
}

pub fn decode_texture(data: &[u8]) -> Result<Texture, DecodeError> {
    let img = image::load_from_memory(data)?.to_rgba8();
    Ok(Texture {
        width: img.width(),
        height: img.height(),
        data: img.into_raw(),
    })
}

pub fn decode_style(data: &[u8]) -> Result<GeodataStyle, DecodeError> {
    Ok(GeodataStyle {
        json: serde_json::from_slice(data)?,
    })
}

pub fn decode_features(data: &[u8]) -> Result<GeodataFeatures, DecodeError> {
    Ok(GeodataFeatures {
        json: serde_json::from_slice(data)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_nodes() -> Vec<MetaNodeSpec> {
        vec![
            MetaNodeSpec::new(
                TileId::new(1, 0, 0),
                DAabb::new(DVec3::ZERO, DVec3::new(0.5, 0.5, 0.1)),
            )
            .children([true, true, false, false]),
            MetaNodeSpec {
                geom_z: Some((-0.1, 0.3)),
                credits: vec![7, 9],
                ..MetaNodeSpec::new(
                    TileId::new(1, 1, 0),
                    DAabb::new(DVec3::new(0.5, 0.0, 0.0), DVec3::new(1.0, 0.5, 0.1)),
                )
                .alien(true)
                .source_reference(2)
            },
        ]
    }

    #[test]
    fn test_meta_tile_round_trip() {
        let origin = TileId::new(1, 0, 0);
        let bytes = encode_meta_tile(origin, &sample_nodes());
        let tile = decode_meta_tile(&bytes).unwrap();
        assert_eq!(tile.origin, origin);
        assert_eq!(tile.len(), 2);

        let a = tile.get(TileId::new(1, 0, 0)).unwrap();
        assert!(a.geometry);
        assert!(!a.alien);
        assert_eq!(a.child_flags, [true, true, false, false]);

        let b = tile.get(TileId::new(1, 1, 0)).unwrap();
        assert!(b.alien);
        assert_eq!(b.source_reference, 2);
        assert_eq!(b.geom_z, Some((-0.1, 0.3)));
        assert_eq!(b.credits, vec![CreditId(7), CreditId(9)]);
    }

    #[test]
    fn test_meta_tile_bad_magic() {
        assert!(matches!(
            decode_meta_tile(b"NOPE"),
            Err(DecodeError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_meta_tile_truncated() {
        let bytes = encode_meta_tile(TileId::root(), &sample_nodes());
        assert!(matches!(
            decode_meta_tile(&bytes[..bytes.len() - 3]),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_mesh_aggregate_round_trip() {
        let spec = MeshAggregateSpec {
            parts: vec![
                MeshPartSpec {
                    internal_uv: true,
                    external_uv: false,
                    texture_layer: Some("ortho".into()),
                    surface_reference: 1,
                    vertices: vec![
                        MeshVertex {
                            position: [0.0, 0.0, 0.0],
                            uv: [0.0, 0.0],
                        },
                        MeshVertex {
                            position: [1.0, 0.0, 0.0],
                            uv: [1.0, 0.0],
                        },
                        MeshVertex {
                            position: [0.0, 1.0, 0.0],
                            uv: [0.0, 1.0],
                        },
                    ],
                    indices: vec![0, 1, 2],
                    ..Default::default()
                },
                MeshPartSpec::default(),
            ],
        };
        let agg = decode_mesh_aggregate(&encode_mesh_aggregate(&spec)).unwrap();
        assert_eq!(agg.submeshes.len(), 2);

        let part = &agg.submeshes[0];
        assert!(part.internal_uv);
        assert!(!part.external_uv);
        assert_eq!(part.texture_layer.as_deref(), Some("ortho"));
        assert_eq!(part.surface_reference, 1);
        assert_eq!(part.mesh.vertices.len(), 3);
        assert_eq!(part.mesh.indices, vec![0, 1, 2]);

        assert!(agg.submeshes[1].texture_layer.is_none());
        assert!(agg.submeshes[1].external_uv);
    }

    /// The texture-layer name length shifts the vertex payload to an
    /// arbitrary byte offset; decoding must not depend on alignment.
    #[test]
    fn test_mesh_vertices_decode_at_any_offset() {
        for name in ["", "a", "ab", "abc", "abcd"] {
            let spec = MeshAggregateSpec {
                parts: vec![MeshPartSpec {
                    texture_layer: (!name.is_empty()).then(|| name.to_string()),
                    vertices: vec![MeshVertex {
                        position: [1.0, 2.0, 3.0],
                        uv: [0.25, 0.75],
                    }],
                    indices: vec![0],
                    ..Default::default()
                }],
            };
            let agg = decode_mesh_aggregate(&encode_mesh_aggregate(&spec)).unwrap();
            let v = agg.submeshes[0].mesh.vertices[0];
            assert_eq!(v.position, [1.0, 2.0, 3.0], "layer name {name:?}");
            assert_eq!(v.uv, [0.25, 0.75]);
        }
    }

    #[test]
    fn test_style_and_features_decode() {
        let style = decode_style(br#"{"layers":{}}"#).unwrap();
        assert!(style.json.get("layers").is_some());
        let feats = decode_features(br#"{"features":[{"id":1}]}"#).unwrap();
        assert_eq!(feats.feature_count(), 1);
        assert!(decode_style(b"not json").is_err());
    }
}
