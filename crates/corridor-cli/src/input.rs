//! Presets and GeoJSON inputs.
//!
//! Criterion layers are read from `<source>/<layer>.geojson`. Each feature
//! carries either a `category` string, looked up in the criterion's
//! `weight_values`, or an integer `value`.

use crate::backoff::{retry, Backoff};
use anyhow::{bail, Context, Result};
use corridor_core::{CriterionSpec, PresetRef, PresetRegistry, ProcessedLayers, RasterPreset, SuitabilityFeature};
use geo::{Geometry, LineString, MultiPolygon};
use geojson::{GeoJson, JsonObject};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct Loader {
    retries: u32,
}

impl Loader {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    pub async fn read(&self, path: &Path) -> Result<String> {
        let what = path.display().to_string();
        retry(&what, self.retries, Backoff::default(), || tokio::fs::read_to_string(path))
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Register every `*.json` in `dir` under its file stem.
    pub async fn load_registry(&self, dir: &Path) -> Result<PresetRegistry> {
        let mut registry = PresetRegistry::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "preset directory missing");
                return Ok(registry);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to list {}", dir.display()));
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = self.read(&path).await?;
            registry
                .load_json(name, &text)
                .with_context(|| format!("Invalid preset {}", path.display()))?;
        }
        info!(presets = registry.len(), dir = %dir.display(), "loaded preset registry");
        Ok(registry)
    }

    /// A path to a JSON file is an inline preset; anything else is a name.
    pub async fn preset_ref(&self, arg: &str) -> Result<PresetRef> {
        let path = Path::new(arg);
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let text = self.read(path).await?;
            let preset = RasterPreset::from_json(&text)
                .with_context(|| format!("Invalid preset {}", path.display()))?;
            return Ok(PresetRef::Inline(Box::new(preset)));
        }
        Ok(PresetRef::Named(arg.to_string()))
    }

    pub async fn layers(&self, source: &Path, preset: &RasterPreset) -> Result<ProcessedLayers> {
        let mut layers = ProcessedLayers::new();
        for (name, spec) in &preset.criteria {
            let mut records = Vec::new();
            for layer in &spec.layers {
                let path = source.join(format!("{layer}.geojson"));
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    debug!(criterion = %name, path = %path.display(), "no layer file");
                    continue;
                }
                let text = self.read(&path).await?;
                let (features, skipped) = suitability_features(spec, &text)
                    .with_context(|| format!("Invalid layer {}", path.display()))?;
                if skipped > 0 {
                    warn!(criterion = %name, layer = %layer, skipped, "features without a usable weight");
                }
                records.extend(features);
            }
            debug!(criterion = %name, records = records.len(), "criterion loaded");
            layers.insert(name.clone(), records);
        }
        Ok(layers)
    }
}

/// Reclassify a layer's features; also returns how many had no weight.
pub fn suitability_features(spec: &CriterionSpec, text: &str) -> Result<(Vec<SuitabilityFeature>, usize)> {
    let mut features = Vec::new();
    let mut skipped = 0;
    for (geometry, properties) in geometries(text)? {
        let category = properties.get("category").and_then(|v| v.as_str());
        let value = properties.get("value").and_then(|v| v.as_i64());
        match spec.reclassifier.classify(category, value) {
            Some(value) => features.push(SuitabilityFeature { geometry, value }),
            None => skipped += 1,
        }
    }
    Ok((features, skipped))
}

pub fn project_area(text: &str) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    for (geometry, _) in geometries(text)? {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            _ => {}
        }
    }
    if polygons.is_empty() {
        bail!("project area contains no polygons");
    }
    Ok(MultiPolygon::new(polygons))
}

/// First line (or ordered points) in `text`.
pub fn sketch(text: &str) -> Result<LineString<f64>> {
    for (geometry, _) in geometries(text)? {
        match geometry {
            Geometry::LineString(line) => return Ok(line),
            Geometry::MultiPoint(points) => {
                return Ok(points.iter().map(|p| p.0).collect());
            }
            _ => {}
        }
    }
    bail!("route sketch contains no LineString")
}

fn geometries(text: &str) -> Result<Vec<(Geometry<f64>, JsonObject)>> {
    let geojson: GeoJson = text.parse().context("Failed to parse GeoJSON")?;
    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => {
            return Ok(vec![(Geometry::try_from(geometry)?, JsonObject::new())]);
        }
    };
    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        out.push((Geometry::try_from(geometry)?, feature.properties.unwrap_or_default()));
    }
    Ok(out)
}
