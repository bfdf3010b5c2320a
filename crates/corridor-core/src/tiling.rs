//! Tile grid over the project area.
//!
//! The project-area bounding box is split into square tiles of
//! `tile_size x tile_size` cells. Ceiling division on each axis means the
//! last row/column of tiles may extend past the box; cells there fall
//! outside the project-area mask and end up as no-data.

use crate::error::{GeometryError, RasterSizingError, Result};
use crate::geotransform::Geotransform;
use crate::grid::Grid;
use geo::{BoundingRect, Contains, Coord, Intersects, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Row-major index in the tile grid.
    pub id: usize,
    pub tile_row: usize,
    pub tile_col: usize,
    /// Pixel offset of the tile's first cell in the global raster.
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
    pub transform: Geotransform,
}

impl Tile {
    pub fn extent(&self) -> Rect<f64> {
        self.transform.extent(self.rows, self.cols)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectAreaGrid {
    bounds: Rect<f64>,
    transform: Geotransform,
    tile_size: usize,
    tiles_x: usize,
    tiles_y: usize,
    tiles: Vec<Tile>,
}

impl ProjectAreaGrid {
    /// Tile the bounding box of `project_area`.
    pub fn build(project_area: &MultiPolygon<f64>, cell_size: f64, tile_size: usize) -> Result<Self> {
        let bounds = project_area
            .bounding_rect()
            .ok_or(GeometryError::EmptyProjectArea)?;
        Self::from_bounds(bounds, cell_size, tile_size)
    }

    pub fn from_bounds(bounds: Rect<f64>, cell_size: f64, tile_size: usize) -> Result<Self> {
        let width = bounds.width();
        let height = bounds.height();
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(GeometryError::DegenerateProjectArea { width, height }.into());
        }
        if cell_size > width || cell_size > height {
            return Err(RasterSizingError::RasterCellSizeTooSmall {
                cell_size,
                width,
                height,
            }
            .into());
        }

        let tile_size = tile_size.max(1);
        let tile_edge = tile_size as f64 * cell_size;
        let tiles_x = ((width / tile_edge).ceil() as usize).max(1);
        let tiles_y = ((height / tile_edge).ceil() as usize).max(1);
        let transform = Geotransform::new(bounds.min().x, bounds.max().y, cell_size);

        let mut tiles = Vec::with_capacity(tiles_x * tiles_y);
        for tile_row in 0..tiles_y {
            for tile_col in 0..tiles_x {
                let row_off = tile_row * tile_size;
                let col_off = tile_col * tile_size;
                tiles.push(Tile {
                    id: tile_row * tiles_x + tile_col,
                    tile_row,
                    tile_col,
                    row_off,
                    col_off,
                    rows: tile_size,
                    cols: tile_size,
                    transform: transform.offset(row_off, col_off),
                });
            }
        }

        Ok(Self {
            bounds,
            transform,
            tile_size,
            tiles_x,
            tiles_y,
            tiles,
        })
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, id: usize) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Transform of the full mosaic.
    pub fn transform(&self) -> Geotransform {
        self.transform
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn tile_dims(&self) -> (usize, usize) {
        (self.tiles_y, self.tiles_x)
    }

    /// Shape of the full mosaic in cells.
    pub fn raster_shape(&self) -> (usize, usize) {
        (self.tiles_y * self.tile_size, self.tiles_x * self.tile_size)
    }

    /// Ids of tiles whose extent intersects `rect`, ascending.
    pub fn tiles_intersecting(&self, rect: &Rect<f64>) -> Vec<usize> {
        let (rows, cols) = self.raster_shape();
        let Some((r0, r1, c0, c1)) = self.transform.cell_span(rect, rows, cols) else {
            return Vec::new();
        };
        let ts = self.tile_size;
        let mut ids = Vec::new();
        for tile_row in r0 / ts..=r1 / ts {
            for tile_col in c0 / ts..=c1 / ts {
                ids.push(tile_row * self.tiles_x + tile_col);
            }
        }
        ids
    }

    /// Tile owning the global cell `(row, col)`.
    pub fn tile_of_cell(&self, row: usize, col: usize) -> Option<usize> {
        let (tile_row, tile_col) = (row / self.tile_size, col / self.tile_size);
        (tile_row < self.tiles_y && tile_col < self.tiles_x).then_some(tile_row * self.tiles_x + tile_col)
    }
}

/// Cells of `tile` whose centroid lies inside the project area.
pub fn project_area_mask(tile: &Tile, project_area: &MultiPolygon<f64>) -> Grid<bool> {
    let extent = tile.extent();
    if project_area.contains(&extent.to_polygon()) {
        return Grid::filled(tile.rows, tile.cols, true);
    }
    let mut mask = Grid::filled(tile.rows, tile.cols, false);
    if !project_area.intersects(&extent) {
        return mask;
    }
    let t = &tile.transform;
    for row in 0..tile.rows {
        let y = t.upper_left_y + (row as f64 + 0.5) * t.y_size;
        for col in 0..tile.cols {
            let x = t.upper_left_x + (col as f64 + 0.5) * t.x_size;
            if project_area.contains(&Point::from(Coord { x, y })) {
                mask.set(row, col, true);
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use geo::polygon;

    fn area(width: f64, height: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: width, y: 0.0),
            (x: width, y: height),
            (x: 0.0, y: height),
            (x: 0.0, y: 0.0),
        ]])
    }

    #[test]
    fn tiles_cover_box_with_ceiling_division() {
        let grid = ProjectAreaGrid::build(&area(250.0, 120.0), 10.0, 10).unwrap();
        assert_eq!(grid.tile_dims(), (2, 3));
        assert_eq!(grid.tiles().len(), 6);
        assert_eq!(grid.raster_shape(), (20, 30));
        let last = grid.tile(5).unwrap();
        assert_eq!((last.tile_row, last.tile_col), (1, 2));
        assert_eq!(last.transform.upper_left_x, 200.0);
        assert_eq!(last.transform.upper_left_y, 20.0);
        // Union reaches past the box edge but never falls short of it.
        let covered = last.extent();
        assert!(covered.max().x >= 250.0);
        assert!(covered.min().y <= 0.0);
    }

    #[test]
    fn cell_larger_than_area_fails() {
        let err = ProjectAreaGrid::build(&area(50.0, 5.0), 10.0, 10).unwrap_err();
        assert!(matches!(
            err,
            Error::RasterSizing(RasterSizingError::RasterCellSizeTooSmall { .. })
        ));
    }

    #[test]
    fn empty_project_area_is_a_geometry_error() {
        let err = ProjectAreaGrid::build(&MultiPolygon::new(vec![]), 10.0, 10).unwrap_err();
        assert!(matches!(err, Error::Geometry(GeometryError::EmptyProjectArea)));
    }

    #[test]
    fn rect_spanning_tile_seam_hits_both_tiles() {
        let grid = ProjectAreaGrid::build(&area(200.0, 100.0), 10.0, 10).unwrap();
        let rect = Rect::new(Coord { x: 95.0, y: 40.0 }, Coord { x: 105.0, y: 60.0 });
        assert_eq!(grid.tiles_intersecting(&rect), vec![0, 1]);
    }

    #[test]
    fn mask_excludes_cells_outside_triangle() {
        let triangle = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ]]);
        let grid = ProjectAreaGrid::build(&triangle, 10.0, 10).unwrap();
        let mask = project_area_mask(&grid.tiles()[0], &triangle);
        // Top-right corner is outside, bottom-left corner inside.
        assert!(!mask.get(0, 9).copied().unwrap());
        assert!(mask.get(9, 0).copied().unwrap());
    }
}
