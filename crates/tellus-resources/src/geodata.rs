//! Geodata tiles: style + features are combined into render
//! primitives, and the result is rebuilt whenever either input
//! changes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use glam::DVec3;
use serde_json::Value;

use crate::resource::Validity;
use crate::types::{GeodataFeatures, GeodataStyle};

/// A feature document that cannot be interpreted at all.
#[derive(Debug, thiserror::Error)]
#[error("feature document has no features array")]
pub struct GeodataAssemblyError;

/// What a single geodata render primitive draws.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GeodataRenderKind {
    Points,
    Lines,
    Labels,
}

/// One styled render primitive produced from a feature.
#[derive(Clone, Debug)]
pub struct GeodataRender {
    pub kind: GeodataRenderKind,
    pub positions: Vec<DVec3>,
    pub color: [f32; 4],
    pub label: Option<String>,
}

/// Inputs captured for one assembly run.
#[derive(Clone)]
struct GeodataInputs {
    style: Arc<GeodataStyle>,
    features: Arc<GeodataFeatures>,
    /// Browser options blob forwarded from the map model.
    options: Value,
}

/// Pointer identities of the inputs the current renders were built
/// from. A style hot-swap changes the identity and forces a rebuild.
type InputVersion = (usize, usize);

fn version_of(inputs: &GeodataInputs) -> InputVersion {
    (
        Arc::as_ptr(&inputs.style) as usize,
        Arc::as_ptr(&inputs.features) as usize,
    )
}

/// A per-tile geodata product.
///
/// Unlike plain fetched resources this one can be republished: when
/// [`GeodataTile::update`] sees new inputs it drops back to
/// indeterminate until a worker reassembles it.
pub struct GeodataTile {
    key: String,
    state: AtomicU8,
    inputs: Mutex<Option<GeodataInputs>>,
    built_version: Mutex<Option<InputVersion>>,
    renders: Mutex<Vec<Arc<GeodataRender>>>,
}

impl GeodataTile {
    pub fn new(key: String) -> Self {
        Self {
            key,
            state: AtomicU8::new(Validity::Indeterminate as u8),
            inputs: Mutex::new(None),
            built_version: Mutex::new(None),
            renders: Mutex::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn validity(&self) -> Validity {
        match self.state.load(Ordering::Acquire) {
            v if v == Validity::Valid as u8 => Validity::Valid,
            v if v == Validity::Invalid as u8 => Validity::Invalid,
            _ => Validity::Indeterminate,
        }
    }

    /// Record the latest inputs. Returns true when the inputs differ
    /// from what the current renders were built from, meaning an
    /// assembly job must be scheduled.
    pub fn update(
        &self,
        style: Arc<GeodataStyle>,
        features: Arc<GeodataFeatures>,
        options: Value,
    ) -> bool {
        let next = GeodataInputs {
            style,
            features,
            options,
        };
        let next_version = version_of(&next);
        let built = *self.built_version.lock().unwrap();
        if built == Some(next_version) {
            return false;
        }
        *self.inputs.lock().unwrap() = Some(next);
        self.state
            .store(Validity::Indeterminate as u8, Ordering::Release);
        true
    }

    /// Run assembly against the most recently recorded inputs.
    /// Called from a worker thread.
    pub fn assemble(&self) {
        let inputs = match self.inputs.lock().unwrap().clone() {
            Some(i) => i,
            None => return,
        };
        let version = version_of(&inputs);
        match assemble_geodata(&inputs.style, &inputs.features, &inputs.options) {
            Ok(renders) => {
                *self.renders.lock().unwrap() = renders;
                *self.built_version.lock().unwrap() = Some(version);
                self.state.store(Validity::Valid as u8, Ordering::Release);
            }
            Err(GeodataAssemblyError) => {
                self.renders.lock().unwrap().clear();
                *self.built_version.lock().unwrap() = Some(version);
                self.state.store(Validity::Invalid as u8, Ordering::Release);
            }
        }
    }

    /// Current render primitives. The clones are cheap aliases.
    pub fn renders(&self) -> Vec<Arc<GeodataRender>> {
        self.renders.lock().unwrap().clone()
    }
}

fn color_from_style(style: &Value, field: &str) -> [f32; 4] {
    style
        .get(field)
        .and_then(Value::as_array)
        .and_then(|a| {
            if a.len() == 4 {
                let mut c = [0.0f32; 4];
                for (slot, v) in c.iter_mut().zip(a) {
                    *slot = v.as_f64()? as f32;
                }
                Some(c)
            } else {
                None
            }
        })
        .unwrap_or([1.0, 1.0, 1.0, 1.0])
}

fn parse_position(coords: &Value) -> Option<DVec3> {
    let a = coords.as_array()?;
    Some(DVec3::new(
        a.first()?.as_f64()?,
        a.get(1)?.as_f64()?,
        a.get(2).and_then(Value::as_f64).unwrap_or(0.0),
    ))
}

/// Turn a feature collection plus a stylesheet into render
/// primitives. Fails only when the feature document is structurally
/// unusable.
pub fn assemble_geodata(
    style: &GeodataStyle,
    features: &GeodataFeatures,
    options: &Value,
) -> Result<Vec<Arc<GeodataRender>>, GeodataAssemblyError> {
    let list = features
        .json
        .get("features")
        .and_then(Value::as_array)
        .ok_or(GeodataAssemblyError)?;
    let point_color = color_from_style(&style.json, "point-color");
    let line_color = color_from_style(&style.json, "line-color");
    let label_source = style
        .json
        .get("label-source")
        .and_then(Value::as_str);
    let label_limit = options
        .get("label-limit")
        .and_then(Value::as_u64)
        .unwrap_or(u64::MAX);

    let mut labels = 0u64;
    let mut out = Vec::new();
    for feature in list {
        let geometry = match feature.get("geometry") {
            Some(g) => g,
            None => continue,
        };
        let label = label_source.and_then(|field| {
            feature
                .get("properties")
                .and_then(|p| p.get(field))
                .and_then(Value::as_str)
                .map(str::to_owned)
        });
        match geometry.get("type").and_then(Value::as_str) {
            Some("Point") => {
                let Some(pos) = geometry.get("coordinates").and_then(parse_position) else {
                    continue;
                };
                out.push(Arc::new(GeodataRender {
                    kind: GeodataRenderKind::Points,
                    positions: vec![pos],
                    color: point_color,
                    label: None,
                }));
                if let Some(text) = label {
                    if labels < label_limit {
                        labels += 1;
                        out.push(Arc::new(GeodataRender {
                            kind: GeodataRenderKind::Labels,
                            positions: vec![pos],
                            color: point_color,
                            label: Some(text),
                        }));
                    }
                }
            }
            Some("LineString") => {
                let positions: Vec<DVec3> = geometry
                    .get("coordinates")
                    .and_then(Value::as_array)
                    .map(|pts| pts.iter().filter_map(parse_position).collect())
                    .unwrap_or_default();
                if positions.len() < 2 {
                    continue;
                }
                out.push(Arc::new(GeodataRender {
                    kind: GeodataRenderKind::Lines,
                    positions,
                    color: line_color,
                    label: None,
                }));
            }
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(json: Value) -> Arc<GeodataStyle> {
        Arc::new(GeodataStyle { json })
    }

    fn features(json: Value) -> Arc<GeodataFeatures> {
        Arc::new(GeodataFeatures { json })
    }

    fn sample_features() -> Arc<GeodataFeatures> {
        features(serde_json::json!({
            "features": [
                {
                    "geometry": { "type": "Point", "coordinates": [1.0, 2.0, 3.0] },
                    "properties": { "name": "summit" }
                },
                {
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]]
                    }
                }
            ]
        }))
    }

    #[test]
    fn test_assemble_points_and_lines() {
        let style = style(serde_json::json!({
            "point-color": [1.0, 0.0, 0.0, 1.0],
            "label-source": "name"
        }));
        let renders =
            assemble_geodata(&style, &sample_features(), &Value::Null).unwrap();
        assert_eq!(renders.len(), 3);
        assert_eq!(renders[0].kind, GeodataRenderKind::Points);
        assert_eq!(renders[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(renders[1].kind, GeodataRenderKind::Labels);
        assert_eq!(renders[1].label.as_deref(), Some("summit"));
        assert_eq!(renders[2].kind, GeodataRenderKind::Lines);
        assert_eq!(renders[2].positions.len(), 3);
    }

    #[test]
    fn test_tile_update_detects_new_inputs() {
        let tile = GeodataTile::new("geo/1-0-0".into());
        let s = style(serde_json::json!({}));
        let f = sample_features();

        assert!(tile.update(s.clone(), f.clone(), Value::Null));
        assert_eq!(tile.validity(), Validity::Indeterminate);
        tile.assemble();
        assert_eq!(tile.validity(), Validity::Valid);
        assert_eq!(tile.renders().len(), 2);

        // Same inputs: nothing to do.
        assert!(!tile.update(s.clone(), f.clone(), Value::Null));
        assert_eq!(tile.validity(), Validity::Valid);

        // Swapped style: rebuild required.
        let s2 = style(serde_json::json!({ "label-source": "name" }));
        assert!(tile.update(s2, f, Value::Null));
        assert_eq!(tile.validity(), Validity::Indeterminate);
        tile.assemble();
        assert_eq!(tile.validity(), Validity::Valid);
        assert_eq!(tile.renders().len(), 3);
    }

    #[test]
    fn test_unusable_features_go_invalid() {
        let tile = GeodataTile::new("geo/bad".into());
        tile.update(
            style(serde_json::json!({})),
            features(serde_json::json!(42)),
            Value::Null,
        );
        tile.assemble();
        assert_eq!(tile.validity(), Validity::Invalid);
        assert!(tile.renders().is_empty());
    }
}
