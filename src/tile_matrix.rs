//! Tile ids, grid positions and the row-major tile grid.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// Global tile identifier, unique across all tilesets attached to a map.
pub type TileId = i32;

/// Tile identifier local to a single tileset.
pub type TileIndex = i32;

/// Id of a cell without a tile.
pub const EMPTY_TILE: TileId = 0;

/// Largest grid a map may have, counted in cells.
pub const MAX_CELL_COUNT: usize = 1 << 26;

/// A cell position. Signed so that positions left of or above the grid can be expressed
/// (and rejected) without wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    /// Zero-based row, growing down.
    pub row: i32,
    /// Zero-based column, growing right.
    pub col: i32,
}

/// Shorthand for a `TilePos` literal.
#[inline]
pub const fn tile_pos(row: i32, col: i32) -> TilePos {
    TilePos { row, col }
}

impl TilePos {
    /// The cell to the left.
    pub fn west(self) -> TilePos {
        tile_pos(self.row, self.col.saturating_sub(1))
    }

    /// The cell to the right.
    pub fn east(self) -> TilePos {
        tile_pos(self.row, self.col.saturating_add(1))
    }

    /// The cell below.
    pub fn south(self) -> TilePos {
        tile_pos(self.row.saturating_add(1), self.col)
    }

    /// The cell above.
    pub fn north(self) -> TilePos {
        tile_pos(self.row.saturating_sub(1), self.col)
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Grid size in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileExtent {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl TileExtent {
    /// An extent from its two dimensions. See [`TileExtent::validate`].
    pub const fn new(rows: usize, cols: usize) -> Self {
        TileExtent { rows, cols }
    }

    /// Both dimensions at least 1 and no more than [`MAX_CELL_COUNT`] cells.
    pub fn is_valid(self) -> bool {
        self.rows >= 1
            && self.cols >= 1
            && self.cell_count().is_some_and(|cells| cells <= MAX_CELL_COUNT)
    }

    /// Returns the extent unchanged if it [is valid](TileExtent::is_valid).
    pub fn validate(self) -> Result<Self, MapError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(MapError::InvalidExtent {
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    /// `rows * cols`, `None` if that does not fit in a `usize`.
    pub fn cell_count(self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }
}

/// Rectangular row-major grid of tile identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMatrix {
    rows: Vec<Vec<TileId>>,
    cols: usize,
}

impl TileMatrix {
    /// Creates an all-empty matrix.
    pub fn new(extent: TileExtent) -> Self {
        TileMatrix {
            rows: vec![vec![EMPTY_TILE; extent.cols]; extent.rows],
            cols: extent.cols,
        }
    }

    /// Builds a matrix from a flat row-major slice, which must hold exactly `rows * cols` ids.
    pub fn from_row_major(extent: TileExtent, ids: &[TileId]) -> Option<Self> {
        if extent.cell_count() != Some(ids.len()) {
            return None;
        }
        let rows = if extent.cols == 0 {
            vec![Vec::new(); extent.rows]
        } else {
            ids.chunks(extent.cols).map(<[TileId]>::to_vec).collect()
        };
        Some(TileMatrix {
            rows,
            cols: extent.cols,
        })
    }

    /// Rows and columns.
    pub fn extent(&self) -> TileExtent {
        TileExtent::new(self.rows.len(), self.cols)
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn col_count(&self) -> usize {
        self.cols
    }

    /// `pos` lies inside the grid.
    pub fn contains(&self, pos: TilePos) -> bool {
        pos.row >= 0
            && pos.col >= 0
            && (pos.row as usize) < self.rows.len()
            && (pos.col as usize) < self.cols
    }

    /// Non-failing lookup, `None` when the position lies outside the grid.
    pub fn get(&self, pos: TilePos) -> Option<TileId> {
        if self.contains(pos) {
            Some(self.rows[pos.row as usize][pos.col as usize])
        } else {
            None
        }
    }

    /// Like `get`, but a position outside the grid is an error.
    pub fn at(&self, pos: TilePos) -> Result<TileId, MapError> {
        self.get(pos).ok_or(MapError::OutOfRange(pos))
    }

    /// Writes one cell.
    pub fn set(&mut self, pos: TilePos, id: TileId) -> Result<(), MapError> {
        if !self.contains(pos) {
            return Err(MapError::OutOfRange(pos));
        }
        self.rows[pos.row as usize][pos.col as usize] = id;
        Ok(())
    }

    /// Row slices from top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[TileId]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// All cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = TileId> + '_ {
        self.rows.iter().flat_map(|row| row.iter().copied())
    }

    /// All cells with their positions, in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (TilePos, TileId)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, &id)| (tile_pos(r as i32, c as i32), id))
        })
    }

    /// Appends an empty row.
    pub fn add_row(&mut self) {
        self.rows.push(vec![EMPTY_TILE; self.cols]);
    }

    /// Appends an empty column.
    pub fn add_column(&mut self) {
        for row in &mut self.rows {
            row.push(EMPTY_TILE);
        }
        self.cols += 1;
    }

    /// Drops the last row. At least one row is kept.
    pub fn remove_row(&mut self) -> Result<(), MapError> {
        if self.rows.len() <= 1 {
            return Err(MapError::InvalidArgument(
                "cannot remove the last row".to_owned(),
            ));
        }
        self.rows.pop();
        Ok(())
    }

    /// Drops the last column. At least one column is kept.
    pub fn remove_column(&mut self) -> Result<(), MapError> {
        if self.cols <= 1 {
            return Err(MapError::InvalidArgument(
                "cannot remove the last column".to_owned(),
            ));
        }
        for row in &mut self.rows {
            row.pop();
        }
        self.cols -= 1;
        Ok(())
    }

    /// Adds or drops trailing rows and columns. Cells outside the new extent are lost.
    pub fn resize(&mut self, extent: TileExtent) {
        let cols = self.cols;
        self.rows.resize_with(extent.rows, || vec![EMPTY_TILE; cols]);
        for row in &mut self.rows {
            row.resize(extent.cols, EMPTY_TILE);
        }
        self.cols = extent.cols;
    }

    /// Breadth-first flood fill over 4-connected cells sharing the origin's value.
    ///
    /// Returns every position that was changed, in the order it was filled. Filling from
    /// outside the grid, or with the value already at the origin, changes nothing.
    pub fn flood(&mut self, origin: TilePos, replacement: TileId) -> Vec<TilePos> {
        let mut affected = Vec::new();

        let Some(target) = self.get(origin) else {
            return affected;
        };
        if target == replacement {
            return affected;
        }

        let mut queue = VecDeque::new();
        self.rows[origin.row as usize][origin.col as usize] = replacement;
        affected.push(origin);
        queue.push_back(origin);

        while let Some(pos) = queue.pop_front() {
            for next in [pos.west(), pos.east(), pos.south(), pos.north()] {
                if self.get(next) == Some(target) {
                    self.rows[next.row as usize][next.col as usize] = replacement;
                    affected.push(next);
                    queue.push_back(next);
                }
            }
        }

        affected
    }
}
