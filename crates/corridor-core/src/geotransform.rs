//! Affine mapping between raster cells and map coordinates.
//!
//! Only north-up rasters are supported: the rotation terms are always zero
//! and `y_size` is negative.
//!
//! Coordinate to index uses truncation toward zero, not floor. For points
//! less than one cell left of or above the origin this maps them into column
//! or row 0; anything further out produces a negative index that bounds
//! checks reject.

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geotransform {
    pub upper_left_x: f64,
    pub upper_left_y: f64,
    pub x_size: f64,
    pub y_size: f64,
}

/// Signed raster index as produced by [`coordinate_to_index`]; may lie
/// outside the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterIndex {
    pub row: i64,
    pub col: i64,
}

impl Geotransform {
    pub fn new(upper_left_x: f64, upper_left_y: f64, cell_size: f64) -> Self {
        Self {
            upper_left_x,
            upper_left_y,
            x_size: cell_size,
            y_size: -cell_size.abs(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.x_size.abs()
    }

    /// GDAL-ordered six-term form: `[ulx, xsize, 0, uly, 0, ysize]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.upper_left_x,
            self.x_size,
            0.0,
            self.upper_left_y,
            0.0,
            self.y_size,
        ]
    }

    /// Transform for the sub-raster starting at `(row_off, col_off)`.
    pub fn offset(&self, row_off: usize, col_off: usize) -> Self {
        Self {
            upper_left_x: self.upper_left_x + col_off as f64 * self.x_size,
            upper_left_y: self.upper_left_y + row_off as f64 * self.y_size,
            ..*self
        }
    }

    /// Map-space footprint of one cell.
    pub fn cell_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let x0 = self.upper_left_x + col as f64 * self.x_size;
        let y0 = self.upper_left_y + row as f64 * self.y_size;
        Rect::new(
            Coord { x: x0, y: y0 },
            Coord {
                x: x0 + self.x_size,
                y: y0 + self.y_size,
            },
        )
    }

    /// Footprint of a `rows x cols` raster using this transform.
    pub fn extent(&self, rows: usize, cols: usize) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.upper_left_x,
                y: self.upper_left_y,
            },
            Coord {
                x: self.upper_left_x + cols as f64 * self.x_size,
                y: self.upper_left_y + rows as f64 * self.y_size,
            },
        )
    }

    /// Inclusive cell range overlapped by `rect`, clipped to the raster.
    pub fn cell_span(&self, rect: &Rect<f64>, rows: usize, cols: usize) -> Option<(usize, usize, usize, usize)> {
        if rows == 0 || cols == 0 {
            return None;
        }
        let c0 = ((rect.min().x - self.upper_left_x) / self.x_size).floor();
        let c1 = ((rect.max().x - self.upper_left_x) / self.x_size).floor();
        let r0 = ((rect.max().y - self.upper_left_y) / self.y_size).floor();
        let r1 = ((rect.min().y - self.upper_left_y) / self.y_size).floor();
        if !(c0.is_finite() && c1.is_finite() && r0.is_finite() && r1.is_finite()) {
            return None;
        }
        let (c0, c1) = (c0.min(c1), c0.max(c1));
        let (r0, r1) = (r0.min(r1), r0.max(r1));
        if c1 < 0.0 || r1 < 0.0 || c0 >= cols as f64 || r0 >= rows as f64 {
            return None;
        }
        Some((
            r0.max(0.0) as usize,
            (r1 as usize).min(rows - 1),
            c0.max(0.0) as usize,
            (c1 as usize).min(cols - 1),
        ))
    }
}

/// Map coordinate to raster index, truncating toward zero.
pub fn coordinate_to_index(x: f64, y: f64, transform: &Geotransform) -> RasterIndex {
    let col = ((x - transform.upper_left_x) / transform.x_size).trunc();
    let row = ((y - transform.upper_left_y) / transform.y_size).trunc();
    RasterIndex {
        row: row as i64,
        col: col as i64,
    }
}

/// Centroid of the cell at `(row, col)`.
pub fn index_to_coordinate(row: i64, col: i64, transform: &Geotransform) -> (f64, f64) {
    let x = transform.upper_left_x + col as f64 * transform.x_size + transform.x_size / 2.0;
    let y = transform.upper_left_y
        - (row as f64 * transform.y_size + transform.y_size / 2.0).abs();
    (x, y)
}
