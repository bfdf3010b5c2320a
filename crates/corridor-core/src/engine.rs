//! Engine facade tying the cost surface to the route solver.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geotransform::Geotransform;
use crate::grid::Raster;
use crate::lcp::{least_cost_path, PathResult, SolverOptions};
use crate::preset::{PresetRef, PresetRegistry, RasterPreset};
use crate::route_model::RouteModel;
use crate::smoothing::route_geometry;
use crate::surface::{build_cost_surface, CompositeRaster};
use crate::vector::ProcessedLayers;
use geo::{LineString, MultiPolygon};
use tracing::{info, info_span};

/// Inputs of one cost-surface build.
#[derive(Debug, Clone)]
pub struct SurfaceRequest {
    pub preset: PresetRef,
    pub project_area: MultiPolygon<f64>,
    pub layers: ProcessedLayers,
}

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub model: RouteModel,
    pub path: PathResult,
    pub geometry: LineString<f64>,
}

impl RouteResult {
    pub fn total_cost(&self) -> f64 {
        self.path.total_cost()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorridorEngine {
    registry: PresetRegistry,
}

impl CorridorEngine {
    pub fn new(registry: PresetRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PresetRegistry {
        &self.registry
    }

    pub fn resolve<'a>(&'a self, preset: &'a PresetRef) -> Result<&'a RasterPreset> {
        match preset {
            PresetRef::Named(name) => Ok(self.registry.get(name)?),
            PresetRef::Inline(preset) => Ok(&**preset),
        }
    }

    pub fn build_cost_surface(&self, request: &SurfaceRequest, cancel: &CancelToken) -> Result<CompositeRaster> {
        let preset = self.resolve(&request.preset)?;
        let span = info_span!("surface", name = %preset.general.output_name());
        let _guard = span.enter();
        let surface = build_cost_surface(preset, &request.project_area, &request.layers, cancel)?;
        info!(
            tiles = surface.tiles.len(),
            failed = surface.failed_tiles().count(),
            "cost surface built"
        );
        Ok(surface)
    }

    /// Route over an already stitched cost grid, e.g. one read back from a
    /// persisted mosaic.
    pub fn compute_route(
        &self,
        cost: &Raster,
        transform: &Geotransform,
        sketch: &LineString<f64>,
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> Result<RouteResult> {
        compute_route(cost, transform, sketch, options, cancel)
    }

    /// Route across a freshly built surface. Failed tiles under the sketch
    /// are fatal; elsewhere they read as impassable.
    pub fn route_on_surface(
        &self,
        surface: &CompositeRaster,
        sketch: &LineString<f64>,
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> Result<RouteResult> {
        surface.check_corridor(&sketch.0)?;
        compute_route(&surface.to_cost_grid(), &surface.transform(), sketch, options, cancel)
    }

    /// Build the surface, then route across it.
    pub fn run(
        &self,
        request: &SurfaceRequest,
        sketch: &LineString<f64>,
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> Result<(CompositeRaster, RouteResult)> {
        let surface = self.build_cost_surface(request, cancel)?;
        let route = self.route_on_surface(&surface, sketch, options, cancel)?;
        Ok((surface, route))
    }
}

/// Least-cost route along `sketch` over a stitched cost grid.
pub fn compute_route(
    cost: &Raster,
    transform: &Geotransform,
    sketch: &LineString<f64>,
    options: &SolverOptions,
    cancel: &CancelToken,
) -> Result<RouteResult> {
    let span = info_span!("route", waypoints = sketch.0.len());
    let _guard = span.enter();

    let model = RouteModel::from_sketch(sketch, transform)?;
    let path = least_cost_path(cost, &model.waypoints(), options, cancel)?;
    let geometry = route_geometry(&path.cells, transform);
    info!(
        cells = path.cells.len(),
        vertices = geometry.0.len(),
        total_cost = path.total_cost(),
        "route solved"
    );
    Ok(RouteResult {
        model,
        path,
        geometry,
    })
}
