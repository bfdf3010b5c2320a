//! Error taxonomy for the corridor engine.
//!
//! Each family gets its own enum so callers can present a specific message
//! ("route area fully excluded" vs. "sketch left the raster" vs. "preset
//! misconfigured"). [`Error::kind`] flattens them for reporting.

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    RasterSizing(#[from] RasterSizingError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Geometry,
    RasterSizing,
    Aggregation,
    Routing,
    Io,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Schema(_) => ErrorKind::Schema,
            Error::Geometry(_) => ErrorKind::Geometry,
            Error::RasterSizing(_) => ErrorKind::RasterSizing,
            Error::Aggregation(_) => ErrorKind::Aggregation,
            Error::Routing(_) => ErrorKind::Routing,
            Error::Io(_) => ErrorKind::Io,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to parse preset: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("criterion '{criterion}': invalid group value '{tag}' (expected A, B or C)")]
    InvalidGroup { criterion: String, tag: String },

    #[error("criterion '{criterion}': weight for '{category}' must be an integer, got {value}")]
    WeightType {
        criterion: String,
        category: String,
        value: String,
    },

    #[error(
        "criterion '{criterion}': weight {value} for '{category}' outside intermediate bounds [{lower}, {upper}]"
    )]
    WeightOutOfRange {
        criterion: String,
        category: String,
        value: i64,
        lower: i32,
        upper: i32,
    },

    #[error("criterion '{criterion}': geometry value '{key}' is invalid: {reason}")]
    GeometryValue {
        criterion: String,
        key: String,
        reason: String,
    },

    #[error("{name} bounds are inverted: [{lower}, {upper}]")]
    InvertedBounds { name: &'static str, lower: i32, upper: i32 },

    #[error("final lower bound {0} is negative; path costs must be non-negative")]
    NegativeFinalBound(i32),

    #[error("no-data value {value} collides with final bounds [{lower}, {upper}]")]
    NoDataCollision { value: i32, lower: i32, upper: i32 },

    #[error("general setting '{name}' is invalid: {reason}")]
    General { name: &'static str, reason: String },

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
}

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("project area is empty")]
    EmptyProjectArea,

    #[error("project area is degenerate ({width} x {height})")]
    DegenerateProjectArea { width: f64, height: f64 },

    #[error("route needs at least 2 coordinates, got {0}")]
    TooFewRoutePoints(usize),

    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite { x: f64, y: f64 },
}

#[derive(Error, Debug)]
pub enum RasterSizingError {
    #[error(
        "cell size {cell_size} exceeds project area extent ({width} x {height}); raster cell size too small for area"
    )]
    RasterCellSizeTooSmall {
        cell_size: f64,
        width: f64,
        height: f64,
    },
}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("invalid group value '{0}' (expected A, B or C)")]
    InvalidGroupValue(String),

    #[error("no group A or B rasters to aggregate (invalid suitability raster input)")]
    InvalidSuitabilityRasterInput,

    #[error("layer '{name}' has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        got: (usize, usize),
        expected: (usize, usize),
    },
}

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("waypoint {waypoint} at ({row}, {col}) lies outside the {rows}x{cols} raster")]
    WaypointOutOfBounds {
        waypoint: usize,
        row: i64,
        col: i64,
        rows: usize,
        cols: usize,
    },

    #[error("no feasible route for segment {segment} from {from:?} to {to:?}")]
    UnreachableWaypoint {
        segment: usize,
        from: (usize, usize),
        to: (usize, usize),
    },

    #[error("segment {segment} exceeded its search budget of {budget:?}")]
    SegmentBudgetExceeded { segment: usize, budget: Duration },

    #[error("tile {tile_id} on the route corridor failed: {reason}")]
    CriticalTileUnavailable { tile_id: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_distinguish_routing_failures_from_schema() {
        let routing: Error = RoutingError::UnreachableWaypoint {
            segment: 0,
            from: (0, 0),
            to: (1, 1),
        }
        .into();
        let schema: Error = SchemaError::UnknownPreset("x".into()).into();
        assert_eq!(routing.kind(), ErrorKind::Routing);
        assert_eq!(schema.kind(), ErrorKind::Schema);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn budget_and_unreachable_read_differently() {
        let budget = RoutingError::SegmentBudgetExceeded {
            segment: 2,
            budget: Duration::from_secs(5),
        };
        assert!(budget.to_string().contains("budget"));
        let out = RoutingError::WaypointOutOfBounds {
            waypoint: 1,
            row: -3,
            col: 4,
            rows: 10,
            cols: 10,
        };
        assert!(out.to_string().contains("outside"));
    }
}
