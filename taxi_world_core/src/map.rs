use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::{Error, GRID_SIZE, GridCell, Result};

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Cells are addressed by `GridCell` or `(row, col)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn new(rows: usize, cols: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        Grid {
            rows,
            cols,
            cells: vec![T::default(); size],
        }
    }

    /// Creates a new grid filled by a generator function taking the cell coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn from_generator<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(GridCell) -> T,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for row in 0..rows {
            for col in 0..cols {
                cells.push(f(GridCell { row, col }));
            }
        }
        Grid { rows, cols, cells }
    }

    /// Converts a cell to a flat vector index, `None` if out of bounds.
    #[inline]
    fn cell_to_index(&self, cell: GridCell) -> Option<usize> {
        if self.is_valid(cell) {
            Some(cell.row * self.cols + cell.col)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_valid(&self, cell: GridCell) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    pub fn get(&self, cell: GridCell) -> Option<&T> {
        self.cell_to_index(cell).and_then(|i| self.cells.get(i))
    }

    /// Sets the value of a cell, failing with `Error::OutOfBounds` for invalid cells.
    pub fn set(&mut self, cell: GridCell, value: T) -> Result<()> {
        let index = self
            .cell_to_index(cell)
            .ok_or(Error::OutOfBounds { cell })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator that yields `(GridCell, &T)` in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (GridCell, &T)> {
        let cols = self.cols;
        self.cells.iter().enumerate().map(move |(index, value)| {
            (
                GridCell {
                    row: index / cols,
                    col: index % cols,
                },
                value,
            )
        })
    }

    /// Iterates over the grid one row slice at a time.
    pub fn row_slices(&self) -> impl Iterator<Item = &[T]> {
        self.cells.chunks(self.cols.max(1))
    }
}

impl<T> Index<GridCell> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, cell: GridCell) -> &Self::Output {
        match self.cell_to_index(cell) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                cell, self.rows, self.cols
            ),
        }
    }
}

/// The fixed set of cells the taxi may never occupy.
///
/// Built once and never mutated during an episode; membership is the only query
/// the simulation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleSet {
    blocked: Grid<bool>,
    free: Vec<GridCell>,
}

impl ObstacleSet {
    /// Builds an obstacle set from a list of cells. Out-of-bounds cells are rejected.
    pub fn from_cells<I>(cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = GridCell>,
    {
        let mut blocked = Grid::new(GRID_SIZE, GRID_SIZE);
        for cell in cells {
            blocked.set(cell, true)?;
        }
        let free: Vec<GridCell> = blocked
            .enumerate()
            .filter_map(|(cell, &is_blocked)| (!is_blocked).then_some(cell))
            .collect();
        if free.is_empty() {
            return Err(Error::NoFreeCells);
        }
        Ok(Self { blocked, free })
    }

    /// The standard layout: full top and bottom rows, a wall segment on row 3,
    /// and single blocks on the right edge and in the interior.
    pub fn standard() -> Self {
        let last = GRID_SIZE - 1;
        let cells = (0..GRID_SIZE)
            .flat_map(|col| [GridCell::new(0, col), GridCell::new(last, col)])
            .chain((0..=3).map(|col| GridCell::new(3, col)))
            .chain([
                GridCell::new(3, 9),
                GridCell::new(5, 9),
                GridCell::new(6, 5),
                GridCell::new(7, 9),
            ]);
        Self::from_cells(cells).expect("standard layout is in bounds and leaves free cells")
    }

    /// Only the top and bottom rows are blocked.
    pub fn border_rows() -> Self {
        let last = GRID_SIZE - 1;
        let cells = (0..GRID_SIZE).flat_map(|col| [GridCell::new(0, col), GridCell::new(last, col)]);
        Self::from_cells(cells).expect("border layout is in bounds and leaves free cells")
    }

    /// Returns true if the cell is blocked. Out-of-bounds cells count as blocked.
    #[inline]
    pub fn contains(&self, cell: GridCell) -> bool {
        self.blocked.get(cell).copied().unwrap_or(true)
    }

    /// Cells that are not blocked, in row-major order.
    pub fn free_cells(&self) -> &[GridCell] {
        &self.free
    }

    /// Number of blocked cells.
    pub fn len(&self) -> usize {
        GRID_SIZE * GRID_SIZE - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObstacleSet {
    fn default() -> Self {
        Self::standard()
    }
}
