//! Dense row-major grids and pixel windows.

use serde::{Deserialize, Serialize};

/// Row/column address of a raster cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn manhattan(&self, other: &CellIndex) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl From<(usize, usize)> for CellIndex {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// Pixel window: offset plus size, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_off,
            col_off,
            rows,
            cols,
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split a `rows x cols` area into windows of at most `block` cells per edge.
    pub fn blocks(rows: usize, cols: usize, block: usize) -> Vec<Window> {
        let block = block.max(1);
        let mut windows = Vec::with_capacity(rows.div_ceil(block) * cols.div_ceil(block));
        let mut row_off = 0;
        while row_off < rows {
            let h = block.min(rows - row_off);
            let mut col_off = 0;
            while col_off < cols {
                let w = block.min(cols - col_off);
                windows.push(Window::new(row_off, col_off, h, w));
                col_off += w;
            }
            row_off += h;
        }
        windows
    }
}

/// Dense 2-D array stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            cells: vec![value; rows * cols],
        }
    }

    /// Copy of the cells inside `window`, row-major.
    pub fn window(&self, window: &Window) -> Vec<T> {
        let mut out = Vec::with_capacity(window.len());
        for r in window.row_off..window.row_off + window.rows {
            let start = r * self.cols + window.col_off;
            out.extend_from_slice(&self.cells[start..start + window.cols]);
        }
        out
    }

    /// Write `data` (row-major, `window`-shaped) back into the grid.
    pub fn write_window(&mut self, window: &Window, data: &[T]) {
        debug_assert_eq!(data.len(), window.len());
        for (i, r) in (window.row_off..window.row_off + window.rows).enumerate() {
            let start = r * self.cols + window.col_off;
            self.cells[start..start + window.cols]
                .clone_from_slice(&data[i * window.cols..(i + 1) * window.cols]);
        }
    }
}

impl<T> Grid<T> {
    pub fn from_vec(rows: usize, cols: usize, cells: Vec<T>) -> Option<Self> {
        (cells.len() == rows * cols).then_some(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows && (col as usize) < self.cols
    }

    pub fn offset(&self, cell: CellIndex) -> usize {
        cell.row * self.cols + cell.col
    }

    pub fn cell_at(&self, offset: usize) -> CellIndex {
        CellIndex::new(offset / self.cols, offset % self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.cells.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        if row < self.rows && col < self.cols {
            self.cells.get_mut(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        if let Some(cell) = self.get_mut(row, col) {
            *cell = value;
        }
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }
}

/// Raster of optional integer cells; `None` is no-data.
pub type Raster = Grid<Option<i32>>;
