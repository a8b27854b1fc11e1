//! 2D toroidal grid and the generation rule.

use life_core::{Cell, CellChange, Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Offsets of the eight cells surrounding a cell, as `(row, col)` deltas
const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A rectangular board of cells whose edges wrap around to the opposite side.
///
/// Indexed `[row][col]`. Every row has the same length and every cell's
/// stored position matches its indices; both are checked on construction and
/// on deserialization, and nothing exposed here can break them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Cell>>", into = "Vec<Vec<Cell>>")]
pub struct Grid {
    cells: Vec<Vec<Cell>>,
}

/// Result of computing one generation from a grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub grid: Grid,
    /// True iff no cell of `grid` is alive
    pub extinct: bool,
}

impl Grid {
    /// Create a `rows x cols` grid with every cell set to `alive`
    pub fn new(rows: i32, cols: i32, alive: bool) -> Result<Self> {
        if rows <= 0 || cols <= 0 {
            return Err(Error::InvalidDimension { rows, cols });
        }

        let cells = (0..rows as usize)
            .map(|row| {
                (0..cols as usize)
                    .map(|col| Cell::new(row, col, alive))
                    .collect()
            })
            .collect();

        Ok(Self { cells })
    }

    /// Create a dead grid with the listed `(row, col)` cells alive
    pub fn with_live_cells(rows: i32, cols: i32, live: &[(usize, usize)]) -> Result<Self> {
        let mut grid = Self::new(rows, cols, false)?;
        let changes: Vec<CellChange> = live
            .iter()
            .map(|&(row, col)| {
                // Coordinates past i32 are off any board; keep them off it
                let row = i32::try_from(row).unwrap_or(i32::MAX);
                let col = i32::try_from(col).unwrap_or(i32::MAX);
                CellChange::new(row, col, true)
            })
            .collect();
        grid.apply(&changes)?;
        Ok(grid)
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells[0].len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn is_alive(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some_and(|cell| cell.alive)
    }

    /// Iterator over the rows of the grid
    pub fn iter_rows(&self) -> impl Iterator<Item = &[Cell]> + '_ {
        self.cells.iter().map(Vec::as_slice)
    }

    /// Iterator over all cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter().flatten()
    }

    /// Positions of every living cell in row-major order
    pub fn live_cells(&self) -> Vec<(usize, usize)> {
        self.iter()
            .filter(|cell| cell.alive)
            .map(|cell| (cell.row, cell.col))
            .collect()
    }

    pub fn population(&self) -> usize {
        self.iter().filter(|cell| cell.alive).count()
    }

    pub fn is_extinct(&self) -> bool {
        !self.iter().any(|cell| cell.alive)
    }

    /// Overwrite every cell with a fair coin flip
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for cell in self.cells.iter_mut().flatten() {
            cell.alive = rng.gen_bool(0.5);
        }
    }

    /// Check that every change in a batch lies on this grid
    pub fn validate(&self, changes: &[CellChange]) -> Result<()> {
        self.resolve(changes).map(|_| ())
    }

    /// Apply a batch of edits. Either every change lands or, if any change
    /// lies outside the grid, none do.
    pub fn apply(&mut self, changes: &[CellChange]) -> Result<()> {
        for ((row, col), alive) in self.resolve(changes)? {
            self.cells[row][col].alive = alive;
        }

        Ok(())
    }

    fn resolve(&self, changes: &[CellChange]) -> Result<Vec<((usize, usize), bool)>> {
        let (rows, cols) = (self.rows(), self.cols());

        changes
            .iter()
            .map(|change| {
                change
                    .index_in(rows, cols)
                    .map(|index| (index, change.alive))
                    .ok_or(Error::OutOfBounds {
                        row: change.row,
                        col: change.col,
                        rows,
                        cols,
                    })
            })
            .collect()
    }

    /// Count living neighbors of `(row, col)`, wrapping at the edges.
    ///
    /// On boards narrower than three cells the same cell can be reached
    /// through several offsets and is counted each time; a 1x1 board sees its
    /// only cell eight times.
    pub fn neighbor_count(&self, row: usize, col: usize) -> u8 {
        let (rows, cols) = (self.rows(), self.cols());

        NEIGHBOR_OFFSETS
            .iter()
            .filter(|(dr, dc)| {
                let r = wrap(row as isize + dr, rows);
                let c = wrap(col as isize + dc, cols);
                self.cells[r][c].alive
            })
            .count() as u8
    }

    /// Whether `(row, col)` is alive in the next generation
    pub fn future_alive(&self, row: usize, col: usize) -> bool {
        let alive = self.cells[row][col].alive;
        matches!((self.neighbor_count(row, col), alive), (3, _) | (2, true))
    }

    /// Compute the next generation without touching `self`.
    ///
    /// The result starts as a structural copy of this grid, so every neighbor
    /// lookup reads the untouched input rather than cells already updated.
    pub fn next_generation(&self) -> Generation {
        let mut next = self.clone();
        let mut extinct = true;

        for (row, cells) in next.cells.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                cell.alive = self.future_alive(row, col);
                extinct &= !cell.alive;
            }
        }

        Generation {
            grid: next,
            extinct,
        }
    }
}

fn wrap(value: isize, len: usize) -> usize {
    value.rem_euclid(len as isize) as usize
}

impl TryFrom<Vec<Vec<Cell>>> for Grid {
    type Error = Error;

    fn try_from(cells: Vec<Vec<Cell>>) -> Result<Self> {
        let cols = cells.first().map_or(0, Vec::len);
        if cols == 0 {
            return Err(Error::InvalidDimension {
                rows: cells.len() as i32,
                cols: cols as i32,
            });
        }

        for (row, line) in cells.iter().enumerate() {
            if line.len() != cols {
                return Err(Error::Serialization(format!(
                    "row {} has {} cells, expected {}",
                    row,
                    line.len(),
                    cols
                )));
            }
            for (col, cell) in line.iter().enumerate() {
                if cell.row != row || cell.col != col {
                    return Err(Error::Serialization(format!(
                        "cell at [{}][{}] claims position ({}, {})",
                        row, col, cell.row, cell.col
                    )));
                }
            }
        }

        Ok(Self { cells })
    }
}

impl From<Grid> for Vec<Vec<Cell>> {
    fn from(grid: Grid) -> Self {
        grid.cells
    }
}
