//! Burning one criterion's weighted geometries into a tile raster.
//!
//! Records are clamped into the intermediate bounds, stably sorted by value
//! and burned in ascending order, so on overlap the highest value wins.
//! Polygons claim cells whose centroid they contain; lines and points claim
//! every cell they touch. A positive buffer additionally claims cells whose
//! centroid lies within that distance of the geometry.

use crate::error::{GeometryError, Result};
use crate::geotransform::Geotransform;
use crate::grid::Raster;
use crate::preset::Bounds;
use crate::vector::SuitabilityFeature;
use geo::{
    BoundingRect, Contains, Coord, CoordsIter, EuclideanDistance, Geometry, Intersects, Point, Rect,
};

/// Target raster of a burn: shape plus transform.
#[derive(Debug, Clone, Copy)]
pub struct BurnTarget {
    pub rows: usize,
    pub cols: usize,
    pub transform: Geotransform,
}

pub fn rasterize<'a, I>(features: I, target: &BurnTarget, bounds: Bounds, buffer: f64) -> Result<Raster>
where
    I: IntoIterator<Item = &'a SuitabilityFeature>,
{
    let mut burn: Vec<(i32, &Geometry<f64>)> = Vec::new();
    for feature in features {
        if let Some(c) = feature
            .geometry
            .coords_iter()
            .find(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(GeometryError::NonFinite { x: c.x, y: c.y }.into());
        }
        burn.push((bounds.clamp(feature.value), &feature.geometry));
    }
    burn.sort_by_key(|(value, _)| *value);

    let mut raster = Raster::filled(target.rows, target.cols, None);
    for (value, geometry) in burn {
        burn_geometry(&mut raster, target, geometry, value, buffer);
    }
    Ok(raster)
}

fn burn_geometry(raster: &mut Raster, target: &BurnTarget, geometry: &Geometry<f64>, value: i32, buffer: f64) {
    let Some(rect) = geometry.bounding_rect() else {
        return;
    };
    let grown = Rect::new(
        Coord {
            x: rect.min().x - buffer,
            y: rect.min().y - buffer,
        },
        Coord {
            x: rect.max().x + buffer,
            y: rect.max().y + buffer,
        },
    );
    let t = &target.transform;
    let Some((r0, r1, c0, c1)) = t.cell_span(&grown, target.rows, target.cols) else {
        return;
    };

    for row in r0..=r1 {
        for col in c0..=c1 {
            let centroid = Point::new(
                t.upper_left_x + (col as f64 + 0.5) * t.x_size,
                t.upper_left_y + (row as f64 + 0.5) * t.y_size,
            );
            let hit = covers(geometry, &centroid, t.cell_rect(row, col));
            if hit || (buffer > 0.0 && distance(geometry, &centroid) <= buffer) {
                raster.set(row, col, Some(value));
            }
        }
    }
}

/// Areal geometries test the cell centroid, everything else the cell footprint.
fn covers(geometry: &Geometry<f64>, centroid: &Point<f64>, cell: Rect<f64>) -> bool {
    match geometry {
        Geometry::Polygon(p) => p.contains(centroid),
        Geometry::MultiPolygon(mp) => mp.contains(centroid),
        Geometry::Rect(r) => r.contains(centroid),
        Geometry::Triangle(t) => t.contains(centroid),
        Geometry::Point(p) => cell.to_polygon().intersects(p),
        Geometry::Line(l) => cell.to_polygon().intersects(l),
        Geometry::LineString(ls) => cell.to_polygon().intersects(ls),
        Geometry::MultiPoint(mp) => {
            let footprint = cell.to_polygon();
            mp.iter().any(|p| footprint.intersects(p))
        }
        Geometry::MultiLineString(mls) => {
            let footprint = cell.to_polygon();
            mls.iter().any(|ls| footprint.intersects(ls))
        }
        Geometry::GeometryCollection(gc) => gc.iter().any(|g| covers(g, centroid, cell)),
    }
}

fn distance(geometry: &Geometry<f64>, point: &Point<f64>) -> f64 {
    match geometry {
        Geometry::Point(p) => point.euclidean_distance(p),
        Geometry::Line(l) => point.euclidean_distance(l),
        Geometry::LineString(ls) => point.euclidean_distance(ls),
        Geometry::Polygon(p) => point.euclidean_distance(p),
        Geometry::Rect(r) => point.euclidean_distance(&r.to_polygon()),
        Geometry::Triangle(t) => point.euclidean_distance(&t.to_polygon()),
        Geometry::MultiPoint(mp) => nearest(mp.iter().map(|p| point.euclidean_distance(p))),
        Geometry::MultiLineString(mls) => {
            nearest(mls.iter().map(|ls| point.euclidean_distance(ls)))
        }
        Geometry::MultiPolygon(mp) => nearest(mp.iter().map(|p| point.euclidean_distance(p))),
        Geometry::GeometryCollection(gc) => nearest(gc.iter().map(|g| distance(g, point))),
    }
}

fn nearest(distances: impl Iterator<Item = f64>) -> f64 {
    distances.fold(f64::INFINITY, f64::min)
}
