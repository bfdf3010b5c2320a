//! Writing mosaics and routes, and reading mosaics back for routing.

use crate::input::Loader;
use anyhow::{Context, Result};
use corridor_core::{
    compute_route, render_tiles, CancelToken, CompositeRaster, MosaicDescriptor, Raster, RouteResult,
    SolverOptions,
};
use geo::LineString;
use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::json;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::info;

/// Write tile grids concurrently, then the JSON descriptor and its VRT.
pub async fn write_mosaic(dir: &Path, surface: &CompositeRaster, name: &str) -> Result<MosaicDescriptor> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let descriptor = MosaicDescriptor::from_composite(surface, name);
    let mut writes = JoinSet::new();
    for (file, text) in render_tiles(surface, &descriptor) {
        let path = dir.join(file);
        writes.spawn(async move {
            tokio::fs::write(&path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))
        });
    }
    while let Some(written) = writes.join_next().await {
        written??;
    }

    let json_path = dir.join(format!("{name}.json"));
    tokio::fs::write(&json_path, descriptor.to_json()?)
        .await
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    let vrt_path = dir.join(format!("{name}.vrt"));
    tokio::fs::write(&vrt_path, descriptor.to_vrt())
        .await
        .with_context(|| format!("Failed to write {}", vrt_path.display()))?;

    info!(
        tiles = descriptor.tiles.len(),
        failed = descriptor.failed_tiles.len(),
        descriptor = %json_path.display(),
        "mosaic written"
    );
    Ok(descriptor)
}

/// Load a descriptor and stitch its tile files into one cost grid.
pub async fn read_mosaic(path: &Path, loader: &Loader) -> Result<(MosaicDescriptor, Raster)> {
    let text = loader.read(path).await?;
    let descriptor = MosaicDescriptor::from_json(&text)
        .with_context(|| format!("Invalid mosaic descriptor {}", path.display()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut files = HashMap::with_capacity(descriptor.tiles.len());
    for tile in &descriptor.tiles {
        files.insert(tile.path.clone(), loader.read(&dir.join(&tile.path)).await?);
    }
    let raster = descriptor
        .assemble(|tile| {
            files
                .remove(&tile.path)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, tile.path.clone()))
        })
        .with_context(|| format!("Failed to assemble mosaic {}", path.display()))?;
    Ok((descriptor, raster))
}

/// Route over a persisted mosaic. Failed tiles recorded in the descriptor
/// are fatal when the sketch legs cross them.
pub async fn route_mosaic(
    path: &Path,
    loader: &Loader,
    sketch: LineString<f64>,
    options: SolverOptions,
    cancel: CancelToken,
) -> Result<(MosaicDescriptor, RouteResult)> {
    let (descriptor, cost) = read_mosaic(path, loader).await?;
    descriptor.check_corridor(&sketch.0)?;
    let transform = descriptor.transform;
    let route = tokio::task::spawn_blocking(move || compute_route(&cost, &transform, &sketch, &options, &cancel))
        .await??;
    Ok((descriptor, route))
}

/// Route as a one-feature collection named after `name`.
pub fn route_feature_collection(name: &str, route: &RouteResult) -> FeatureCollection {
    let mut properties = JsonObject::new();
    properties.insert("total_cost".into(), json!(route.total_cost()));
    properties.insert("segment_costs".into(), json!(route.path.segment_costs));
    properties.insert("cells".into(), json!(route.path.cells.len()));
    properties.insert("waypoints".into(), json!(route.model.waypoints().len()));

    let feature = Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&route.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };
    let mut members = JsonObject::new();
    members.insert("name".into(), json!(name));
    FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: Some(members),
    }
}

pub async fn write_route(dir: &Path, name: &str, route: &RouteResult) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{name}_route.geojson"));
    let text = serde_json::to_string_pretty(&route_feature_collection(name, route))?;
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), total_cost = route.total_cost(), "route written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corridor_core::error::RoutingError;
    use corridor_core::{build_cost_surface, Error, Geotransform, ProcessedLayers, RasterPreset, SuitabilityFeature};
    use geo::{line_string, polygon, MultiPolygon};

    fn route() -> RouteResult {
        let cost = Raster::filled(4, 4, Some(2));
        let transform = Geotransform::new(0.0, 40.0, 10.0);
        let sketch = line_string![(x: 5.0, y: 35.0), (x: 35.0, y: 35.0), (x: 35.0, y: 5.0)];
        compute_route(&cost, &transform, &sketch, &SolverOptions::default(), &CancelToken::new()).unwrap()
    }

    #[test]
    fn route_collection_carries_costs_and_name() {
        let collection = route_feature_collection("corridor", &route());
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["name"], "corridor");
        let properties = &value["features"][0]["properties"];
        assert_eq!(properties["segment_costs"].as_array().unwrap().len(), 2);
        assert_eq!(properties["total_cost"], json!(12.0));
        assert_eq!(value["features"][0]["geometry"]["type"], "LineString");
    }

    #[tokio::test]
    async fn route_file_lands_in_output_dir() {
        let dir = std::env::temp_dir().join(format!("corridor-route-{}", std::process::id()));
        let path = write_route(&dir, "corridor", &route()).await.unwrap();
        assert!(path.ends_with("corridor_route.geojson"));
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"total_cost\""));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    fn surface_with_failed_tile() -> CompositeRaster {
        let preset = RasterPreset::from_value(json!({
            "general": {"cell_size": 10.0, "tile_size": 5, "block_size": 2, "final_bounds": [1, 100]},
            "criteria": {"land": {"group": "A"}}
        }))
        .unwrap();
        let area = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ]]);
        let mut layers = ProcessedLayers::new();
        layers.insert(
            "land".into(),
            vec![
                SuitabilityFeature::new(area.0[0].clone(), 10),
                SuitabilityFeature::new(
                    line_string![(x: 80.0, y: 20.0), (x: f64::NAN, y: 10.0), (x: 90.0, y: 10.0)],
                    5,
                ),
            ],
        );
        build_cost_surface(&preset, &area, &layers, &CancelToken::new()).unwrap()
    }

    #[tokio::test]
    async fn persisted_failed_tile_under_sketch_is_critical() {
        let dir = std::env::temp_dir().join(format!("corridor-mosaic-{}", std::process::id()));
        let surface = surface_with_failed_tile();
        let descriptor = write_mosaic(&dir, &surface, "corridor").await.unwrap();
        assert_eq!(descriptor.failed_tiles.len(), 1);
        let path = dir.join("corridor.json");
        let loader = Loader::new(0);

        let crossing = line_string![(x: 95.0, y: 55.0), (x: 45.0, y: 5.0)];
        let err = route_mosaic(&path, &loader, crossing, SolverOptions::default(), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Routing(RoutingError::CriticalTileUnavailable { tile_id: 3, .. }))
        ));

        let clear = line_string![(x: 5.0, y: 95.0), (x: 45.0, y: 55.0)];
        let (_, route) = route_mosaic(&path, &loader, clear, SolverOptions::default(), CancelToken::new())
            .await
            .unwrap();
        assert_eq!(route.path.cells.len(), 5);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
