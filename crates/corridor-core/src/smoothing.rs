//! Path cells to route geometry.

use crate::geotransform::{index_to_coordinate, Geotransform};
use crate::grid::CellIndex;
use geo::{Coord, Intersects, LineString, Simplify, SimplifyVwPreserve};

/// Linestring through the centroids of `cells`. A single cell yields a
/// degenerate two-vertex line so the result is always a valid linestring.
pub fn path_to_linestring(cells: &[CellIndex], transform: &Geotransform) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = cells
        .iter()
        .map(|cell| {
            let (x, y) = index_to_coordinate(cell.row as i64, cell.col as i64, transform);
            Coord { x, y }
        })
        .collect();
    if coords.len() == 1 {
        coords.push(coords[0]);
    }
    LineString::new(coords)
}

/// Douglas-Peucker with `tolerance`; falls back to the topology-preserving
/// Visvalingam-Whyatt variant when the simplified line crosses itself.
pub fn smooth_path(line: &LineString<f64>, tolerance: f64) -> LineString<f64> {
    if line.0.len() <= 2 {
        return line.clone();
    }
    let simplified = line.simplify(&tolerance);
    if !self_intersects(&simplified) {
        return simplified;
    }
    line.simplify_vw_preserve(&(tolerance * tolerance))
}

/// Centroid line for `cells`, simplified at the cell size.
pub fn route_geometry(cells: &[CellIndex], transform: &Geotransform) -> LineString<f64> {
    smooth_path(&path_to_linestring(cells, transform), transform.cell_size())
}

/// True if two non-adjacent segments of `line` touch.
pub fn self_intersects(line: &LineString<f64>) -> bool {
    let segments: Vec<_> = line.lines().collect();
    for (i, a) in segments.iter().enumerate() {
        for b in segments.iter().skip(i + 2) {
            if a.intersects(b) {
                return true;
            }
        }
    }
    false
}
