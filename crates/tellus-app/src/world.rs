//! Synthetic in-memory world used by the demo browser.
//!
//! Generates a complete tile pyramid behind a [`MemoryTransport`]: a
//! terrain surface with metatiles, mesh aggregates, and textures, an
//! orthophoto bound layer draped over it, and a monolithic geodata
//! layer of landmarks.

use std::hash::Hasher;
use std::sync::Arc;

use glam::{DMat4, DVec3};
use rustc_hash::FxHasher;
use serde_json::json;
use tellus_map::{
    BoundLayerInfo, BoundLayerParams, Credit, CreditId, FreeLayerGeodata, LayerKind, MapLayer,
    MapModel, SurfaceInfo, SurfaceStack, UrlTemplate,
};
use tellus_resources::{
    encode_mesh_aggregate, encode_meta_tile, MemoryTransport, MeshAggregateSpec, MeshPartSpec,
    MeshVertex, MetaNodeSpec, META_BLOCK_BITS,
};
use tellus_tile::TileId;

/// A generated world: the transport serving it and the model
/// describing it.
pub struct SyntheticWorld {
    pub transport: Arc<MemoryTransport>,
    pub model: MapModel,
    /// Geometric error of the root tile, for screen-space culling.
    pub root_geometric_error: f64,
}

const TERRAIN_CREDIT: CreditId = CreditId(1);

fn tile_hash(id: TileId) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u32(id.lod);
    hasher.write_u32(id.x);
    hasher.write_u32(id.y);
    hasher.finish()
}

fn tile_height(id: TileId) -> f64 {
    0.01 + (tile_hash(id) % 1000) as f64 / 1000.0 * 0.04
}

fn tile_png(id: TileId) -> Vec<u8> {
    let h = tile_hash(id);
    let pixel = image::Rgba([
        (h >> 16) as u8,
        (h >> 8) as u8,
        h as u8,
        255,
    ]);
    let img = image::RgbaImage::from_pixel(4, 4, pixel);
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encoding is infallible for in-memory targets");
    buf.into_inner()
}

fn tile_mesh(id: TileId) -> Vec<u8> {
    let e = id.extents();
    let size = e.ur - e.ll;
    let z = tile_height(id);
    let vertices = vec![
        MeshVertex {
            position: [0.0, 0.0, z as f32],
            uv: [0.0, 0.0],
        },
        MeshVertex {
            position: [1.0, 0.0, z as f32],
            uv: [1.0, 0.0],
        },
        MeshVertex {
            position: [1.0, 1.0, z as f32],
            uv: [1.0, 1.0],
        },
        MeshVertex {
            position: [0.0, 1.0, z as f32],
            uv: [0.0, 1.0],
        },
    ];
    encode_mesh_aggregate(&MeshAggregateSpec {
        parts: vec![MeshPartSpec {
            internal_uv: true,
            external_uv: true,
            norm_to_phys: DMat4::from_translation(DVec3::new(e.ll.x, e.ll.y, 0.0))
                * DMat4::from_scale(DVec3::new(size.x, size.y, 1.0)),
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
            ..MeshPartSpec::default()
        }],
    })
}

fn key(template: &str, id: TileId) -> String {
    template
        .replace("{lod}", &id.lod.to_string())
        .replace("{x}", &id.x.to_string())
        .replace("{y}", &id.y.to_string())
}

fn tiles_at(lod: u32) -> impl Iterator<Item = TileId> {
    let n = TileId::grid_size(lod);
    (0..n).flat_map(move |y| (0..n).map(move |x| TileId::new(lod, x, y)))
}

fn generate_terrain(transport: &MemoryTransport, max_lod: u32) {
    // Metatiles, grouped by block origin.
    for lod in 0..=max_lod {
        let block = 1u32 << META_BLOCK_BITS;
        let n = TileId::grid_size(lod);
        for by in (0..n).step_by(block as usize) {
            for bx in (0..n).step_by(block as usize) {
                let origin = TileId::new(lod, bx, by);
                let nodes: Vec<MetaNodeSpec> = (by..n.min(by + block))
                    .flat_map(|y| (bx..n.min(bx + block)).map(move |x| TileId::new(lod, x, y)))
                    .map(|id| {
                        let e = id.extents();
                        let height = tile_height(id);
                        let aabb = tellus_math::DAabb::new(
                            DVec3::new(e.ll.x, e.ll.y, 0.0),
                            DVec3::new(e.ur.x, e.ur.y, height),
                        );
                        let children = if id.lod < max_lod {
                            [true; 4]
                        } else {
                            [false; 4]
                        };
                        let mut spec = MetaNodeSpec::new(id, aabb).children(children);
                        spec.geom_z = Some((0.0, height));
                        spec.credits = vec![TERRAIN_CREDIT.0];
                        spec
                    })
                    .collect();
                transport.insert(
                    key("terrain/meta/{lod}-{x}-{y}", origin),
                    encode_meta_tile(origin, &nodes),
                );
            }
        }
    }

    // Meshes and textures for every tile.
    for lod in 0..=max_lod {
        for id in tiles_at(lod) {
            transport.insert(key("terrain/mesh/{lod}-{x}-{y}", id), tile_mesh(id));
            transport.insert(key("terrain/tex/{lod}-{x}-{y}-0", id), tile_png(id));
            transport.insert(key("ortho/c/{lod}-{x}-{y}", id), tile_png(id));
        }
    }
}

fn generate_landmarks(transport: &MemoryTransport) {
    transport.insert(
        "landmarks/style".to_string(),
        serde_json::to_vec(&json!({
            "point-color": [1.0, 0.85, 0.2, 1.0],
            "line-color": [0.2, 0.6, 1.0, 1.0],
            "label-source": "name",
        }))
        .expect("static style serializes"),
    );
    transport.insert(
        "landmarks/features".to_string(),
        serde_json::to_vec(&json!({
            "features": [
                {
                    "geometry": {"type": "Point", "coordinates": [0.31, 0.41]},
                    "properties": {"name": "Observatory"}
                },
                {
                    "geometry": {"type": "Point", "coordinates": [0.62, 0.18]},
                    "properties": {"name": "Lighthouse"}
                },
                {
                    "geometry": {"type": "Point", "coordinates": [0.12, 0.77]},
                    "properties": {"name": "Summit"}
                },
                {
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[0.31, 0.41], [0.62, 0.18], [0.12, 0.77]]
                    },
                    "properties": {"name": "Trail"}
                }
            ]
        }))
        .expect("static features serialize"),
    );
}

impl SyntheticWorld {
    /// Generate a world with a full terrain pyramid down to `max_lod`.
    pub fn generate(max_lod: u32) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        generate_terrain(&transport, max_lod);
        generate_landmarks(&transport);

        let terrain = SurfaceInfo {
            id: "terrain".into(),
            url_meta: UrlTemplate::new("terrain/meta/{lod}-{x}-{y}"),
            url_mesh: UrlTemplate::new("terrain/mesh/{lod}-{x}-{y}"),
            url_int_tex: UrlTemplate::new("terrain/tex/{lod}-{x}-{y}-{sub}"),
            credits: vec![TERRAIN_CREDIT],
            ..SurfaceInfo::default()
        };
        let terrain_layer = MapLayer {
            id: "terrain".into(),
            kind: LayerKind::Surface,
            surface_stack: SurfaceStack::new(vec![terrain]),
            bound_defaults: vec![BoundLayerParams::new("ortho").with_alpha(0.8)],
            ..MapLayer::default()
        };

        let landmarks_surface = SurfaceInfo {
            id: "landmarks".into(),
            url_geodata: UrlTemplate::new("landmarks/features"),
            ..SurfaceInfo::default()
        };
        let landmarks_layer = MapLayer {
            id: "landmarks".into(),
            kind: LayerKind::Geodata(FreeLayerGeodata {
                name: "landmarks".into(),
                style_url: "landmarks/style".into(),
                monolithic: true,
                extents_min: [0.0, 0.0, 0.0],
                extents_max: [1.0, 1.0, 0.05],
            }),
            surface_stack: SurfaceStack::new(vec![landmarks_surface]),
            ..MapLayer::default()
        };

        let mut model = MapModel {
            layers: vec![terrain_layer, landmarks_layer],
            browser_options: json!({"label-limit": 8}),
            ..MapModel::default()
        };
        model.bound_layers.insert(BoundLayerInfo {
            id: "ortho".into(),
            url_color: UrlTemplate::new("ortho/c/{lod}-{x}-{y}"),
            transparent: true,
            ..BoundLayerInfo::default()
        });
        model.credits.insert(Credit {
            id: TERRAIN_CREDIT,
            notice: "\u{a9} Tellus synthetic terrain".into(),
        });

        Self {
            transport,
            model,
            root_geometric_error: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellus_resources::decode_meta_tile;

    #[test]
    fn test_pyramid_is_complete() {
        let world = SyntheticWorld::generate(2);
        for lod in 0..=2 {
            for id in tiles_at(lod) {
                for template in [
                    "terrain/mesh/{lod}-{x}-{y}",
                    "terrain/tex/{lod}-{x}-{y}-0",
                    "ortho/c/{lod}-{x}-{y}",
                ] {
                    let k = key(template, id);
                    assert!(
                        world.transport.get(&k).is_some(),
                        "missing resource {k}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_metatiles_decode_and_link() {
        let world = SyntheticWorld::generate(3);
        let bytes = world
            .transport
            .get("terrain/meta/0-0-0")
            .expect("root metatile present");
        let tile = decode_meta_tile(&bytes).unwrap();
        let root = tile.get(TileId::root()).expect("root node present");
        assert!(root.geometry);
        assert_eq!(root.child_flags, [true; 4]);
        assert_eq!(root.credits, vec![TERRAIN_CREDIT]);

        // Leaf nodes report no children.
        let leaf_block = world
            .transport
            .get("terrain/meta/3-4-4")
            .expect("leaf metatile present");
        let tile = decode_meta_tile(&leaf_block).unwrap();
        let leaf = tile.get(TileId::new(3, 5, 6)).expect("leaf node present");
        assert_eq!(leaf.child_flags, [false; 4]);
        assert!(leaf.geom_z.is_some());
    }

    #[test]
    fn test_model_references_generated_layers() {
        let world = SyntheticWorld::generate(1);
        assert_eq!(world.model.layers.len(), 2);
        assert!(world.model.layers[1].is_geodata());
        assert!(world.model.bound_layers.get("ortho").is_some());
        assert!(world.model.credits.find(TERRAIN_CREDIT).is_some());
    }
}
