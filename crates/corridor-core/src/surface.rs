//! Cost-surface construction: tile grid, per-tile rasterization and group
//! aggregation, collected into a [`CompositeRaster`].
//!
//! Tiles are independent and processed in parallel. A tile that fails keeps
//! its failure reason and contributes no-data; whether that is fatal is
//! decided later, against the route corridor.

use crate::aggregate::{aggregate_tile, AggregationLayer, AggregationSettings};
use crate::cancel::CancelToken;
use crate::error::{AggregationError, Error, Result, RoutingError};
use crate::geotransform::{coordinate_to_index, Geotransform};
use crate::grid::{Raster, Window};
use crate::preset::{Bounds, CriterionSpec, Group, RasterPreset};
use crate::rasterize::{rasterize, BurnTarget};
use crate::tiling::{project_area_mask, ProjectAreaGrid, Tile};
use crate::vector::{ProcessedLayers, ProcessedVector};
use geo::{Coord, MultiPolygon};
use rayon::prelude::*;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum TileOutcome {
    Done(Raster),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TileResult {
    pub tile: Tile,
    pub outcome: TileOutcome,
}

impl TileResult {
    pub fn raster(&self) -> Option<&Raster> {
        match &self.outcome {
            TileOutcome::Done(raster) => Some(raster),
            TileOutcome::Failed(_) => None,
        }
    }
}

/// Finished composite: one raster per tile, joined logically through the
/// tile grid.
#[derive(Debug, Clone)]
pub struct CompositeRaster {
    pub grid: ProjectAreaGrid,
    pub tiles: Vec<TileResult>,
    pub final_bounds: Bounds,
    pub no_data_value: i32,
}

impl CompositeRaster {
    pub fn transform(&self) -> Geotransform {
        self.grid.transform()
    }

    pub fn failed_tiles(&self) -> impl Iterator<Item = (usize, &str)> {
        self.tiles.iter().filter_map(|t| match &t.outcome {
            TileOutcome::Failed(reason) => Some((t.tile.id, reason.as_str())),
            TileOutcome::Done(_) => None,
        })
    }

    /// Stitch all tiles into one raster; failed tiles read as no-data.
    pub fn to_cost_grid(&self) -> Raster {
        let (rows, cols) = self.grid.raster_shape();
        let mut out = Raster::filled(rows, cols, None);
        for result in &self.tiles {
            if let Some(raster) = result.raster() {
                let t = &result.tile;
                let window = Window::new(t.row_off, t.col_off, t.rows, t.cols);
                out.write_window(&window, raster.cells());
            }
        }
        out
    }

    /// Fail if a failed tile lies under the straight legs of the sketch.
    pub fn check_corridor(&self, sketch: &[Coord<f64>]) -> Result<()> {
        let failed: Vec<(usize, &str)> = self.failed_tiles().collect();
        if failed.is_empty() {
            return Ok(());
        }
        check_sketch_legs(&self.transform(), sketch, |row, col| {
            let tile_id = self.grid.tile_of_cell(row, col)?;
            failed.iter().find(|(id, _)| *id == tile_id).copied()
        })
    }
}

/// Walk the straight legs of `sketch` at half-cell steps. `failed_at` maps a
/// global cell to the failed tile covering it, if any; the first hit is
/// reported as [`RoutingError::CriticalTileUnavailable`].
pub(crate) fn check_sketch_legs<'a, F>(transform: &Geotransform, sketch: &[Coord<f64>], failed_at: F) -> Result<()>
where
    F: Fn(usize, usize) -> Option<(usize, &'a str)>,
{
    let step = transform.cell_size() / 2.0;
    for leg in sketch.windows(2) {
        let (a, b) = (leg[0], leg[1]);
        let length = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
        let samples = ((length / step).ceil() as usize).max(1);
        for i in 0..=samples {
            let f = i as f64 / samples as f64;
            let idx = coordinate_to_index(a.x + (b.x - a.x) * f, a.y + (b.y - a.y) * f, transform);
            if idx.row < 0 || idx.col < 0 {
                continue;
            }
            if let Some((tile_id, reason)) = failed_at(idx.row as usize, idx.col as usize) {
                return Err(RoutingError::CriticalTileUnavailable {
                    tile_id,
                    reason: reason.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Build the composite cost raster for `project_area`.
///
/// Criteria with no records are skipped. Criteria present in `layers` but
/// absent from the preset are ignored with a warning.
pub fn build_cost_surface(
    preset: &RasterPreset,
    project_area: &MultiPolygon<f64>,
    layers: &ProcessedLayers,
    cancel: &CancelToken,
) -> Result<CompositeRaster> {
    let general = &preset.general;
    let grid = ProjectAreaGrid::build(project_area, general.cell_size, general.tile_size)?;
    let (tiles_y, tiles_x) = grid.tile_dims();
    info!(
        tiles = grid.tiles().len(),
        tiles_y,
        tiles_x,
        cell_size = general.cell_size,
        "built project area grid"
    );

    for name in layers.keys() {
        if preset.criterion(name).is_none() {
            warn!(criterion = %name, "layer has no criterion in preset, ignored");
        }
    }

    let vectors: Vec<(ProcessedVector<'_>, &CriterionSpec)> = preset
        .criteria
        .iter()
        .filter_map(|(name, spec)| {
            let features = layers.get(name).filter(|f| !f.is_empty())?;
            Some((
                ProcessedVector::tag(name.clone(), features, spec.buffer, &grid),
                spec,
            ))
        })
        .collect();

    if !vectors
        .iter()
        .any(|(_, spec)| matches!(spec.group, Group::A | Group::B))
    {
        return Err(AggregationError::InvalidSuitabilityRasterInput.into());
    }

    let settings = AggregationSettings {
        final_bounds: general.final_bounds,
        block_size: general.block_size,
        fill_value: general.fill_value,
    };

    let tiles = grid
        .tiles()
        .par_iter()
        .map(|tile| {
            cancel.check()?;
            let outcome = match build_tile(tile, &vectors, project_area, preset, &settings, cancel) {
                Ok(raster) => TileOutcome::Done(raster),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    warn!(tile = tile.id, error = %err, "tile failed, contributes no-data");
                    TileOutcome::Failed(err.to_string())
                }
            };
            Ok(TileResult {
                tile: *tile,
                outcome,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CompositeRaster {
        grid,
        tiles,
        final_bounds: general.final_bounds,
        no_data_value: general.no_data_value,
    })
}

fn build_tile(
    tile: &Tile,
    vectors: &[(ProcessedVector<'_>, &CriterionSpec)],
    project_area: &MultiPolygon<f64>,
    preset: &RasterPreset,
    settings: &AggregationSettings,
    cancel: &CancelToken,
) -> Result<Raster> {
    let target = BurnTarget {
        rows: tile.rows,
        cols: tile.cols,
        transform: tile.transform,
    };
    let bounds = preset.general.intermediate_bounds;
    let layers = vectors
        .par_iter()
        .map(|(vector, spec)| {
            cancel.check()?;
            let raster = rasterize(vector.features_in_tile(tile.id), &target, bounds, spec.buffer)?;
            Ok(AggregationLayer::new(vector.criterion.clone(), raster, spec.group))
        })
        .collect::<Result<Vec<_>>>()?;

    let mask = project_area_mask(tile, project_area);
    let composite = aggregate_tile(tile.id, &layers, Some(&mask), settings, cancel)?;
    debug!(
        tile = tile.id,
        layers = layers.len(),
        covered = composite.cells().iter().filter(|c| c.is_some()).count(),
        "tile composite finalized"
    );
    Ok(composite)
}
