//! Route sketch to waypoint indices.

use crate::error::{GeometryError, Result};
use crate::geotransform::{coordinate_to_index, Geotransform, RasterIndex};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "index", rename_all = "snake_case")]
pub enum WaypointRole {
    Start,
    Stop(usize),
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteModel {
    pub coordinates: Vec<Coord<f64>>,
    pub idx_start: RasterIndex,
    pub idx_stops: Vec<RasterIndex>,
    pub idx_end: RasterIndex,
    pub visiting_order: Vec<WaypointRole>,
}

impl RouteModel {
    pub fn build(coordinates: &[Coord<f64>], transform: &Geotransform) -> Result<Self> {
        if coordinates.len() < 2 {
            return Err(GeometryError::TooFewRoutePoints(coordinates.len()).into());
        }
        if let Some(c) = coordinates
            .iter()
            .find(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(GeometryError::NonFinite { x: c.x, y: c.y }.into());
        }

        let index = |c: &Coord<f64>| coordinate_to_index(c.x, c.y, transform);
        let last = coordinates.len() - 1;
        let idx_stops = coordinates[1..last].iter().map(index).collect::<Vec<_>>();

        let mut visiting_order = Vec::with_capacity(coordinates.len());
        visiting_order.push(WaypointRole::Start);
        visiting_order.extend((0..idx_stops.len()).map(WaypointRole::Stop));
        visiting_order.push(WaypointRole::End);

        Ok(Self {
            coordinates: coordinates.to_vec(),
            idx_start: index(&coordinates[0]),
            idx_stops,
            idx_end: index(&coordinates[last]),
            visiting_order,
        })
    }

    pub fn from_sketch(sketch: &LineString<f64>, transform: &Geotransform) -> Result<Self> {
        Self::build(&sketch.0, transform)
    }

    /// All waypoint indices in visiting order.
    pub fn waypoints(&self) -> Vec<RasterIndex> {
        let mut out = Vec::with_capacity(self.idx_stops.len() + 2);
        out.push(self.idx_start);
        out.extend_from_slice(&self.idx_stops);
        out.push(self.idx_end);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn transform() -> Geotransform {
        Geotransform::new(0.0, 100.0, 10.0)
    }

    #[test]
    fn stops_keep_their_order() {
        let coords = [
            Coord { x: 5.0, y: 95.0 },
            Coord { x: 55.0, y: 45.0 },
            Coord { x: 25.0, y: 15.0 },
            Coord { x: 95.0, y: 5.0 },
        ];
        let model = RouteModel::build(&coords, &transform()).unwrap();
        assert_eq!(model.idx_start, RasterIndex { row: 0, col: 0 });
        assert_eq!(
            model.idx_stops,
            vec![RasterIndex { row: 5, col: 5 }, RasterIndex { row: 8, col: 2 }]
        );
        assert_eq!(model.idx_end, RasterIndex { row: 9, col: 9 });
        assert_eq!(
            model.visiting_order,
            vec![
                WaypointRole::Start,
                WaypointRole::Stop(0),
                WaypointRole::Stop(1),
                WaypointRole::End
            ]
        );
        assert_eq!(model.waypoints().len(), 4);
    }

    #[test]
    fn single_point_sketch_is_rejected() {
        let err = RouteModel::build(&[Coord { x: 1.0, y: 1.0 }], &transform()).unwrap_err();
        assert!(matches!(err, Error::Geometry(GeometryError::TooFewRoutePoints(1))));
    }
}
