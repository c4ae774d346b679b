//! Draw resolution: turning a determined-to-be-renderable node's
//! resources into concrete draw tasks.

use std::sync::Arc;

use tellus_map::{BoundLayerParams, CreditId, TileVars};
use tellus_resources::{Resource, Texture, Validity};

use crate::node::{NodeIndex, ResourceRef};
use crate::pass::TraversalPass;
use crate::tasks::{RenderColliderTask, RenderGeodataTask, RenderSurfaceTask};

/// Resolve the node's draw tasks if possible. Returns the node's
/// `determined` flag; false means retry next frame (or never, when the
/// surface got cleared).
pub(crate) fn determine_draws(pass: &mut TraversalPass, index: NodeIndex) -> bool {
    debug_assert!(pass.arena.get(index).meta.is_some());
    pass.touch_draws(index);
    {
        let node = pass.arena.get(index);
        if node.surface.is_none() || node.determined {
            return node.determined;
        }
        debug_assert!(node.renders_empty());
    }

    pass.stats.draw_updates += 1;
    pass.update_priority(index);

    let determined = if pass.layer.is_geodata() {
        determine_draws_geodata(pass, index)
    } else {
        determine_draws_surface(pass, index)
    };
    pass.arena.get_mut(index).determined = determined;
    determined
}

fn determine_draws_surface(pass: &mut TraversalPass, index: NodeIndex) -> bool {
    let tick = pass.camera.tick;

    // Poll everything requested on earlier passes first; anything
    // still pending means retry.
    {
        let node = pass.arena.get(index);
        for resource in &node.resources {
            resource.touch(tick);
        }
        if node
            .resources
            .iter()
            .any(|r| r.validity() == Validity::Indeterminate)
        {
            return false;
        }
    }
    pass.arena.get_mut(index).resources.clear();

    let (node_id, local, priority, surface_index) = {
        let node = pass.arena.get(index);
        let meta = node.meta.as_ref().expect("draws require meta");
        let Some(surface_index) = node.surface else {
            return false;
        };
        (node.id, meta.local, node.priority, surface_index)
    };
    let Some(surface) = pass.surface(surface_index) else {
        return false;
    };
    let vars = TileVars::new(node_id, local);

    let mesh_resource = pass
        .cache
        .fetch_mesh(&surface.url_mesh.resolve(&vars), priority);
    pass.arena
        .get_mut(index)
        .resources
        .push(ResourceRef::Mesh(mesh_resource.clone()));
    match mesh_resource.validity() {
        Validity::Invalid => {
            // No geometry will ever come for this node.
            tracing::debug!(tile = ?node_id, "mesh unavailable, dropping surface");
            let node = pass.arena.get_mut(index);
            node.surface = None;
            node.resources.clear();
            return false;
        }
        Validity::Indeterminate => return false,
        Validity::Valid => {}
    }
    let Some(aggregate) = mesh_resource.get_shared() else {
        return false;
    };

    let mut determined = true;
    let mut new_opaque: Vec<RenderSurfaceTask> = Vec::new();
    let mut new_transparent: Vec<RenderSurfaceTask> = Vec::new();
    let mut new_credits: Vec<CreditId> = Vec::new();

    for (sub_index, part) in aggregate.submeshes.iter().enumerate() {
        if part.external_uv {
            let params = pass.layer.bound_list(part.texture_layer.as_deref());
            let (validity, bounds) = resolve_bound_stack(pass, index, &params, &vars, priority);
            match validity {
                Validity::Indeterminate => {
                    determined = false;
                    continue;
                }
                Validity::Invalid => continue,
                Validity::Valid => {}
            }

            let mut any_opaque = bounds.iter().any(|b| !b.transparent && b.mask.is_none());
            let mut all_transparent = true;
            for bound in &bounds {
                new_credits.extend(bound.credits.iter().copied());

                let mut task = RenderSurfaceTask::new(part.mesh.clone(), part.norm_to_phys);
                task.color_texture = Some(bound.color.clone());
                task.mask_texture = bound.mask.clone();
                task.alpha = bound.alpha;
                task.external_uv = true;
                task.bound_layer = Some(bound.id.clone());

                // Masked layers composite as transparencies for
                // consistent ordering, but at least one layer must
                // write depth; the first mask is promoted when no
                // opaque layer exists.
                let mut render_transparent = bound.transparent;
                if !render_transparent && bound.mask.is_some() {
                    if any_opaque {
                        render_transparent = true;
                    } else {
                        any_opaque = true;
                    }
                }

                if render_transparent {
                    new_transparent.push(task);
                } else {
                    new_opaque.push(task);
                }
                all_transparent = all_transparent && bound.transparent;
            }
            if !all_transparent {
                // External layers cover the submesh opaquely; the
                // internal texture would be overdrawn.
                continue;
            }
        }

        if part.internal_uv {
            let key = surface
                .url_int_tex
                .resolve(&vars.with_sub(sub_index as u32));
            let texture = pass.cache.fetch_texture(&key, priority);
            pass.arena
                .get_mut(index)
                .resources
                .push(ResourceRef::Texture(texture.clone()));
            match texture.validity() {
                Validity::Indeterminate => {
                    determined = false;
                    continue;
                }
                Validity::Invalid => continue,
                Validity::Valid => {}
            }
            let mut task = RenderSurfaceTask::new(part.mesh.clone(), part.norm_to_phys);
            task.color_texture = Some(texture);
            task.external_uv = false;
            // Internal textures render before external additions
            // layered on the same submesh.
            new_opaque.insert(0, task);
        }
    }

    if determined {
        let node = pass.arena.get_mut(index);
        node.opaque = new_opaque;
        node.transparent = new_transparent;
        node.colliders = aggregate
            .submeshes
            .iter()
            .map(|part| RenderColliderTask {
                mesh: part.mesh.clone(),
                model: part.norm_to_phys,
            })
            .collect();
        node.credits.extend(new_credits);
        node.resources.shrink_to_fit();
    }
    determined
}

fn determine_draws_geodata(pass: &mut TraversalPass, index: NodeIndex) -> bool {
    let tick = pass.camera.tick;
    let Some(free) = pass.layer.free_layer() else {
        return false;
    };
    let (node_id, local, priority, surface_index) = {
        let node = pass.arena.get(index);
        debug_assert!(node.renders_empty());
        let meta = node.meta.as_ref().expect("draws require meta");
        let Some(surface_index) = node.surface else {
            return false;
        };
        (node.id, meta.local, node.priority, surface_index)
    };
    let Some(surface) = pass.surface(surface_index) else {
        return false;
    };
    let features_key = surface
        .url_geodata
        .resolve(&TileVars::new(node_id, local));

    let style_resource = pass.cache.fetch_style(&free.style_url, priority);
    let features_resource = pass.cache.fetch_features(&features_key, priority);
    style_resource.touch(tick);
    features_resource.touch(tick);

    if style_resource.validity() == Validity::Invalid
        || features_resource.validity() == Validity::Invalid
    {
        pass.arena.get_mut(index).surface = None;
        return false;
    }
    let (Some(style), Some(features)) =
        (style_resource.get_shared(), features_resource.get_shared())
    else {
        return false;
    };

    let geodata = pass.cache.fetch_geodata(
        &format!("{features_key}#tile"),
        style,
        features,
        pass.model.browser_options.clone(),
        priority,
    );
    match geodata.validity() {
        Validity::Invalid => {
            pass.arena.get_mut(index).surface = None;
            false
        }
        Validity::Indeterminate => false,
        Validity::Valid => {
            let node = pass.arena.get_mut(index);
            node.geodata = geodata
                .renders()
                .into_iter()
                .map(|render| RenderGeodataTask { render })
                .collect();
            true
        }
    }
}

struct ResolvedBound {
    id: String,
    color: Arc<Resource<Texture>>,
    mask: Option<Arc<Resource<Texture>>>,
    transparent: bool,
    alpha: f64,
    credits: Vec<CreditId>,
}

/// Resolve a submesh's bound-layer composition list. Layers whose
/// resources turn out invalid are filtered; any pending resource makes
/// the whole stack indeterminate for this pass.
fn resolve_bound_stack(
    pass: &mut TraversalPass,
    index: NodeIndex,
    params: &[BoundLayerParams],
    vars: &TileVars,
    priority: f64,
) -> (Validity, Vec<ResolvedBound>) {
    let model = pass.model;
    let mut overall = Validity::Valid;
    let mut out = Vec::new();

    for param in params {
        let Some(info) = model.bound_layers.get(&param.id) else {
            continue;
        };

        // Optional availability metatile gate.
        if !info.url_meta.is_empty() {
            let meta = pass
                .cache
                .fetch_meta(&info.url_meta.resolve(vars), priority);
            pass.arena
                .get_mut(index)
                .resources
                .push(ResourceRef::Meta(meta.clone()));
            match meta.validity() {
                Validity::Indeterminate => {
                    overall = Validity::Indeterminate;
                    continue;
                }
                Validity::Invalid => continue,
                Validity::Valid => {
                    let present = meta
                        .get()
                        .and_then(|tile| tile.get(vars.id))
                        .is_some_and(|node| node.geometry);
                    if !present {
                        continue;
                    }
                }
            }
        }

        if info.url_color.is_empty() {
            continue;
        }
        let color = pass
            .cache
            .fetch_texture(&info.url_color.resolve(vars), priority);
        pass.arena
            .get_mut(index)
            .resources
            .push(ResourceRef::Texture(color.clone()));
        match color.validity() {
            Validity::Indeterminate => {
                overall = Validity::Indeterminate;
                continue;
            }
            Validity::Invalid => continue,
            Validity::Valid => {}
        }

        let mask = if info.url_mask.is_empty() {
            None
        } else {
            let mask = pass
                .cache
                .fetch_texture(&info.url_mask.resolve(vars), priority);
            pass.arena
                .get_mut(index)
                .resources
                .push(ResourceRef::Texture(mask.clone()));
            match mask.validity() {
                Validity::Indeterminate => {
                    overall = Validity::Indeterminate;
                    continue;
                }
                Validity::Invalid => None,
                Validity::Valid => Some(mask),
            }
        };

        out.push(ResolvedBound {
            id: info.id.clone(),
            color,
            mask,
            transparent: info.transparent,
            alpha: param.alpha.unwrap_or(1.0),
            credits: info.credits.clone(),
        });
    }

    // A configured stack whose layers all dropped out is a failure;
    // an empty composition list is not (internal texture applies).
    if overall == Validity::Valid && out.is_empty() && !params.is_empty() {
        overall = Validity::Invalid;
    }
    (overall, out)
}
