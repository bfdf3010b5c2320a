pub mod aggregate;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod geotransform;
pub mod grid;
pub mod lcp;
pub mod mosaic;
pub mod preset;
pub mod rasterize;
pub mod route_model;
pub mod smoothing;
pub mod surface;
pub mod tiling;
pub mod vector;

pub use aggregate::{aggregate_tile, AggregationLayer, AggregationSettings, RasterBlock};
pub use cancel::CancelToken;
pub use engine::{compute_route, CorridorEngine, RouteResult, SurfaceRequest};
pub use error::{Error, ErrorKind, Result};
pub use geotransform::{coordinate_to_index, index_to_coordinate, Geotransform, RasterIndex};
pub use grid::{CellIndex, Grid, Raster, Window};
pub use lcp::{least_cost_path, PathResult, SolverOptions};
pub use mosaic::{decode_ascii_grid, encode_ascii_grid, render_tiles, FailedTile, MosaicDescriptor, MosaicTile};
pub use preset::{
    Bounds, CriterionSpec, GeneralSettings, Group, PresetRef, PresetRegistry, RasterPreset,
    Reclassifier,
};
pub use rasterize::{rasterize, BurnTarget};
pub use route_model::{RouteModel, WaypointRole};
pub use smoothing::{path_to_linestring, route_geometry, smooth_path};
pub use surface::{build_cost_surface, CompositeRaster, TileOutcome, TileResult};
pub use tiling::{project_area_mask, ProjectAreaGrid, Tile};
pub use vector::{ProcessedLayers, ProcessedVector, SuitabilityFeature};
