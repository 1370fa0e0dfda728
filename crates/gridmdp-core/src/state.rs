//! State indices and grid geometry

use serde::{Deserialize, Serialize};

use crate::{MdpError, Result};

/// Index of a state in `[0, n_states)`
pub type StateId = usize;

/// A `(row, col)` cell, row 0 at the top
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
}

impl Position {
    /// Create a new position
    #[must_use]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl From<(usize, usize)> for Position {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// What happens to a move that would leave the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// The whole move is cancelled and the agent stays put
    Hold,
    /// Each coordinate is clamped into range independently
    Clamp,
}

/// Rectangular grid dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    /// Number of rows
    pub height: usize,
    /// Number of columns
    pub width: usize,
}

impl GridShape {
    /// Create a new shape
    #[must_use]
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Square `n × n` grid
    #[must_use]
    pub fn square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// Total number of states
    #[must_use]
    pub fn n_states(&self) -> usize {
        self.height * self.width
    }

    /// `row * width + col`
    #[must_use]
    pub fn to_state(&self, pos: Position) -> StateId {
        pos.row * self.width + pos.col
    }

    /// Inverse of [`GridShape::to_state`]
    #[must_use]
    pub fn to_position(&self, state: StateId) -> Position {
        Position::new(state / self.width, state % self.width)
    }

    /// Whether the signed coordinates fall inside the grid
    #[must_use]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    /// Check a state index against the grid size
    pub fn check_state(&self, state: StateId) -> Result<()> {
        if state < self.n_states() {
            Ok(())
        } else {
            Err(MdpError::InvalidState {
                state,
                n_states: self.n_states(),
            })
        }
    }

    /// Check a position against the grid size
    pub fn check_position(&self, pos: Position) -> Result<()> {
        if pos.row < self.height && pos.col < self.width {
            Ok(())
        } else {
            Err(MdpError::InvalidConfig(format!(
                "position ({}, {}) outside {}x{} grid",
                pos.row, pos.col, self.height, self.width
            )))
        }
    }

    /// Clamp signed coordinates into the grid
    #[must_use]
    pub fn clamp(&self, row: isize, col: isize) -> Position {
        let row = row.clamp(0, self.height as isize - 1) as usize;
        let col = col.clamp(0, self.width as isize - 1) as usize;
        Position::new(row, col)
    }

    /// Resolve `from + (d_row, d_col)` under a boundary policy
    #[must_use]
    pub fn shift(&self, from: Position, (d_row, d_col): (isize, isize), policy: BoundaryPolicy) -> Position {
        let row = from.row as isize + d_row;
        let col = from.col as isize + d_col;
        match policy {
            BoundaryPolicy::Hold if !self.contains(row, col) => from,
            BoundaryPolicy::Hold | BoundaryPolicy::Clamp => self.clamp(row, col),
        }
    }
}
