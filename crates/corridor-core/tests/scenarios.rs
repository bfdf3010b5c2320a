use corridor_core::error::RoutingError;
use corridor_core::{
    CancelToken, CorridorEngine, Error, MosaicDescriptor, PresetRef, PresetRegistry, ProcessedLayers,
    RasterPreset, SolverOptions, SuitabilityFeature, SurfaceRequest,
};
use geo::{line_string, polygon, MultiPolygon, Polygon};
use serde_json::json;
use std::collections::HashMap;
use std::io;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0)]
}

fn project_area() -> MultiPolygon<f64> {
    MultiPolygon::new(vec![rect(0.0, 0.0, 100.0, 100.0)])
}

fn preset(final_upper: i32) -> RasterPreset {
    RasterPreset::from_value(json!({
        "general": {
            "prefix": "scenario",
            "final_raster_name": "cost",
            "cell_size": 10.0,
            "tile_size": 5,
            "block_size": 2,
            "final_bounds": [1, final_upper]
        },
        "criteria": {
            "landcover": {"group": "A"},
            "slope": {"group": "B"},
            "river": {"group": "C"}
        }
    }))
    .unwrap()
}

fn engine(final_upper: i32) -> CorridorEngine {
    let mut registry = PresetRegistry::new();
    registry.insert("scenario", preset(final_upper));
    CorridorEngine::new(registry)
}

fn request(layers: ProcessedLayers) -> SurfaceRequest {
    SurfaceRequest {
        preset: PresetRef::Named("scenario".into()),
        project_area: project_area(),
        layers,
    }
}

fn overlapping_a_and_b() -> ProcessedLayers {
    let mut layers = ProcessedLayers::new();
    layers.insert(
        "landcover".into(),
        vec![SuitabilityFeature::new(rect(0.0, 0.0, 100.0, 100.0), 100)],
    );
    layers.insert(
        "slope".into(),
        vec![SuitabilityFeature::new(rect(0.0, 0.0, 100.0, 100.0), 20)],
    );
    layers
}

#[test]
fn a_plus_b_overlap_is_capped_at_final_upper() {
    let cancel = CancelToken::new();

    let capped = engine(100)
        .build_cost_surface(&request(overlapping_a_and_b()), &cancel)
        .unwrap()
        .to_cost_grid();
    assert!(capped.cells().iter().all(|c| *c == Some(100)));

    let open = engine(250)
        .build_cost_surface(&request(overlapping_a_and_b()), &cancel)
        .unwrap()
        .to_cost_grid();
    assert_eq!(open.shape(), (10, 10));
    assert!(open.cells().iter().all(|c| *c == Some(120)));
}

#[test]
fn exclusion_band_across_the_corridor_is_unreachable() {
    let mut layers = overlapping_a_and_b();
    layers.insert(
        "river".into(),
        vec![SuitabilityFeature::new(rect(0.0, 40.0, 100.0, 60.0), 1)],
    );
    let sketch = line_string![(x: 5.0, y: 95.0), (x: 5.0, y: 5.0)];
    let err = engine(250)
        .run(&request(layers), &sketch, &SolverOptions::default(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Routing(RoutingError::UnreachableWaypoint { segment: 0, .. })
    ));
}

#[test]
fn route_threads_the_gap_in_an_exclusion_band() {
    let mut layers = overlapping_a_and_b();
    layers.insert(
        "river".into(),
        vec![
            SuitabilityFeature::new(rect(0.0, 40.0, 70.0, 60.0), 1),
            SuitabilityFeature::new(rect(80.0, 40.0, 100.0, 60.0), 1),
        ],
    );
    let sketch = line_string![(x: 5.0, y: 95.0), (x: 45.0, y: 85.0), (x: 5.0, y: 5.0)];
    let (surface, route) = engine(250)
        .run(&request(layers), &sketch, &SolverOptions::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(surface.failed_tiles().count(), 0);
    assert_eq!(route.path.segment_costs.len(), 2);
    let crossing: Vec<_> = route
        .path
        .cells
        .iter()
        .filter(|c| c.row == 4 || c.row == 5)
        .collect();
    assert!(!crossing.is_empty());
    assert!(crossing.iter().all(|c| c.col == 7));
    assert!(route.geometry.0.len() >= 3);
}

#[test]
fn mosaic_files_rebuild_the_cost_grid() {
    let surface = engine(250)
        .build_cost_surface(&request(overlapping_a_and_b()), &CancelToken::new())
        .unwrap();
    let descriptor = MosaicDescriptor::from_composite(&surface, "scenario_cost");
    assert_eq!(descriptor.tiles.len(), 4);

    let files: HashMap<String, String> = corridor_core::render_tiles(&surface, &descriptor)
        .into_iter()
        .collect();
    let json = descriptor.to_json().unwrap();
    let reloaded = MosaicDescriptor::from_json(&json).unwrap();
    let stitched = reloaded
        .assemble(|tile| {
            files
                .get(&tile.path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, tile.path.clone()))
        })
        .unwrap();

    assert_eq!(stitched, surface.to_cost_grid());
}
