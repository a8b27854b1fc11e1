//! Core type definitions for the simulation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier handed out for each observer registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single cell of the board.
///
/// The position duplicates the cell's indices in the grid so that a cell can
/// be handed to a renderer on its own. The grid keeps both in agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub alive: bool,
}

impl Cell {
    pub fn new(row: usize, col: usize, alive: bool) -> Self {
        Self { row, col, alive }
    }

    pub fn dead(row: usize, col: usize) -> Self {
        Self::new(row, col, false)
    }
}

/// A user edit: set the cell at `(row, col)` to `alive`.
///
/// Coordinates are signed because they come straight from a client and are
/// checked against the board before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellChange {
    pub row: i32,
    pub col: i32,
    pub alive: bool,
}

impl CellChange {
    pub fn new(row: i32, col: i32, alive: bool) -> Self {
        Self { row, col, alive }
    }

    /// Resolve this change to grid indices, if it lies on a `rows x cols` board
    pub fn index_in(&self, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let row = usize::try_from(self.row).ok()?;
        let col = usize::try_from(self.col).ok()?;
        (row < rows && col < cols).then_some((row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_change_index() {
        assert_eq!(CellChange::new(2, 3, true).index_in(5, 5), Some((2, 3)));
        assert_eq!(CellChange::new(5, 0, true).index_in(5, 5), None);
        assert_eq!(CellChange::new(0, -1, true).index_in(5, 5), None);
    }

    #[test]
    fn test_cell_wire_shape() {
        let json = serde_json::to_value(Cell::new(1, 2, true)).unwrap();
        assert_eq!(json, serde_json::json!({ "row": 1, "col": 2, "alive": true }));
    }
}
