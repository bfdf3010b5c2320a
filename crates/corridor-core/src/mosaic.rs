//! Persisted form of a composite raster.
//!
//! Every finished tile becomes one ESRI ASCII grid. A JSON
//! [`MosaicDescriptor`] places the tile files in the global raster and is
//! also rendered as a GDAL VRT so desktop GIS tools can open the mosaic.

use crate::error::{AggregationError, Result};
use crate::geotransform::Geotransform;
use crate::grid::{Raster, Window};
use crate::preset::Bounds;
use crate::surface::{check_sketch_legs, CompositeRaster, TileOutcome};
use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicTile {
    pub id: usize,
    pub path: String,
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

/// A tile that produced no raster, with its placement so routes can be
/// checked against it after reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTile {
    pub id: usize,
    pub reason: String,
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl FailedTile {
    fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_off..self.row_off + self.rows).contains(&row)
            && (self.col_off..self.col_off + self.cols).contains(&col)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosaicDescriptor {
    pub name: String,
    pub transform: Geotransform,
    pub rows: usize,
    pub cols: usize,
    pub no_data_value: i32,
    pub final_bounds: Bounds,
    pub tiles: Vec<MosaicTile>,
    pub failed_tiles: Vec<FailedTile>,
    pub created_at: DateTime<Utc>,
}

impl MosaicDescriptor {
    /// Describe `composite`; tile files are named `{name}_{id:04}.asc`.
    pub fn from_composite(composite: &CompositeRaster, name: &str) -> Self {
        let (rows, cols) = composite.grid.raster_shape();
        let tiles = composite
            .tiles
            .iter()
            .filter(|t| t.raster().is_some())
            .map(|t| MosaicTile {
                id: t.tile.id,
                path: format!("{name}_{:04}.asc", t.tile.id),
                row_off: t.tile.row_off,
                col_off: t.tile.col_off,
                rows: t.tile.rows,
                cols: t.tile.cols,
            })
            .collect();
        let failed_tiles = composite
            .tiles
            .iter()
            .filter_map(|t| match &t.outcome {
                TileOutcome::Failed(reason) => Some(FailedTile {
                    id: t.tile.id,
                    reason: reason.clone(),
                    row_off: t.tile.row_off,
                    col_off: t.tile.col_off,
                    rows: t.tile.rows,
                    cols: t.tile.cols,
                }),
                TileOutcome::Done(_) => None,
            })
            .collect();

        Self {
            name: name.to_string(),
            transform: composite.transform(),
            rows,
            cols,
            no_data_value: composite.no_data_value,
            final_bounds: composite.final_bounds,
            tiles,
            failed_tiles,
            created_at: Utc::now(),
        }
    }

    /// Fail if a failed tile lies under the straight legs of the sketch.
    pub fn check_corridor(&self, sketch: &[Coord<f64>]) -> Result<()> {
        if self.failed_tiles.is_empty() {
            return Ok(());
        }
        check_sketch_legs(&self.transform, sketch, |row, col| {
            self.failed_tiles
                .iter()
                .find(|t| t.contains(row, col))
                .map(|t| (t.id, t.reason.as_str()))
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_vrt(&self) -> String {
        let gt = self.transform.to_gdal();
        let mut out = String::new();
        let _ = writeln!(
            out,
            r#"<VRTDataset rasterXSize="{}" rasterYSize="{}">"#,
            self.cols, self.rows
        );
        let _ = writeln!(
            out,
            "  <GeoTransform>{}, {}, {}, {}, {}, {}</GeoTransform>",
            gt[0], gt[1], gt[2], gt[3], gt[4], gt[5]
        );
        out.push_str("  <VRTRasterBand dataType=\"Int32\" band=\"1\">\n");
        let _ = writeln!(out, "    <NoDataValue>{}</NoDataValue>", self.no_data_value);
        for tile in &self.tiles {
            out.push_str("    <SimpleSource>\n");
            let _ = writeln!(
                out,
                r#"      <SourceFilename relativeToVRT="1">{}</SourceFilename>"#,
                xml_escape(&tile.path)
            );
            out.push_str("      <SourceBand>1</SourceBand>\n");
            let _ = writeln!(
                out,
                r#"      <SrcRect xOff="0" yOff="0" xSize="{}" ySize="{}"/>"#,
                tile.cols, tile.rows
            );
            let _ = writeln!(
                out,
                r#"      <DstRect xOff="{}" yOff="{}" xSize="{}" ySize="{}"/>"#,
                tile.col_off, tile.row_off, tile.cols, tile.rows
            );
            out.push_str("    </SimpleSource>\n");
        }
        out.push_str("  </VRTRasterBand>\n</VRTDataset>\n");
        out
    }

    /// Rebuild the global raster; `read` supplies the text of each tile file.
    /// Failed tiles stay no-data.
    pub fn assemble<F>(&self, mut read: F) -> Result<Raster>
    where
        F: FnMut(&MosaicTile) -> io::Result<String>,
    {
        let mut out = Raster::filled(self.rows, self.cols, None);
        for tile in &self.tiles {
            let (raster, _) = decode_ascii_grid(&read(tile)?)?;
            if raster.shape() != (tile.rows, tile.cols) {
                return Err(AggregationError::ShapeMismatch {
                    name: tile.path.clone(),
                    got: raster.shape(),
                    expected: (tile.rows, tile.cols),
                }
                .into());
            }
            let window = Window::new(tile.row_off, tile.col_off, tile.rows, tile.cols);
            out.write_window(&window, raster.cells());
        }
        Ok(out)
    }
}

/// Rendered tile files of `composite`, as `(path, contents)` pairs.
pub fn render_tiles(composite: &CompositeRaster, descriptor: &MosaicDescriptor) -> Vec<(String, String)> {
    descriptor
        .tiles
        .iter()
        .filter_map(|entry| {
            let result = composite.tiles.iter().find(|t| t.tile.id == entry.id)?;
            let raster = result.raster()?;
            let text = encode_ascii_grid(raster, &result.tile.transform, descriptor.no_data_value);
            Some((entry.path.clone(), text))
        })
        .collect()
}

pub fn encode_ascii_grid(raster: &Raster, transform: &Geotransform, no_data: i32) -> String {
    let (rows, cols) = raster.shape();
    let lower_left_y = transform.upper_left_y + rows as f64 * transform.y_size;
    let mut out = String::with_capacity(rows * cols * 4 + 128);
    let _ = writeln!(out, "ncols {cols}");
    let _ = writeln!(out, "nrows {rows}");
    let _ = writeln!(out, "xllcorner {}", transform.upper_left_x);
    let _ = writeln!(out, "yllcorner {lower_left_y}");
    let _ = writeln!(out, "cellsize {}", transform.cell_size());
    let _ = writeln!(out, "NODATA_value {no_data}");
    for row in 0..rows {
        let line = raster
            .row(row)
            .iter()
            .map(|cell| cell.unwrap_or(no_data).to_string())
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn decode_ascii_grid(text: &str) -> Result<(Raster, Geotransform)> {
    let mut tokens = text.split_whitespace();
    let mut header = |key: &str| -> io::Result<f64> {
        let name = tokens.next().ok_or_else(|| invalid(format!("missing {key}")))?;
        if !name.eq_ignore_ascii_case(key) {
            return Err(invalid(format!("expected {key}, found {name}")));
        }
        let value = tokens.next().ok_or_else(|| invalid(format!("missing value for {key}")))?;
        value
            .parse::<f64>()
            .map_err(|_| invalid(format!("bad value for {key}: {value}")))
    };
    let cols = header("ncols")? as usize;
    let rows = header("nrows")? as usize;
    let xll = header("xllcorner")?;
    let yll = header("yllcorner")?;
    let cell_size = header("cellsize")?;
    let no_data = header("NODATA_value")? as i32;

    let cells = tokens
        .map(|t| {
            t.parse::<i32>()
                .map(|v| (v != no_data).then_some(v))
                .map_err(|_| invalid(format!("bad cell value {t}")))
        })
        .collect::<io::Result<Vec<_>>>()?;
    let found = cells.len();
    let raster = Raster::from_vec(rows, cols, cells)
        .ok_or_else(|| invalid(format!("expected {} cells, found {found}", rows * cols)))?;
    let transform = Geotransform::new(xll, yll + rows as f64 * cell_size, cell_size);
    Ok((raster, transform))
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
