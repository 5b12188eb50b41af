use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod encoding;
pub mod environment;
pub mod error;
pub mod inspect;
pub mod learner;
pub mod map;
pub mod persistence;
pub mod q_table;
pub mod stats;

pub use error::{Error, Result};

/// Side length of the square taxi grid.
pub const GRID_SIZE: usize = 10;

/// Number of discrete actions available to the taxi.
pub const ACTION_COUNT: usize = 6;

/// Represents a (row, col) coordinate on the grid, 0-indexed from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

impl GridCell {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Returns true if the cell lies inside the `GRID_SIZE` x `GRID_SIZE` grid.
    pub fn in_bounds(&self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }

    /// Returns manhattan distance between two cells.
    pub fn manhattan_distance(&self, other: &GridCell) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Represents actions the taxi can take.
///
/// The discriminants are the action indices used by the value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    South = 0,
    North = 1,
    East = 2,
    West = 3,
    Pickup = 4,
    Dropoff = 5,
}

impl Action {
    /// All actions in index order.
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::South,
        Action::North,
        Action::East,
        Action::West,
        Action::Pickup,
        Action::Dropoff,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Row/column delta for movement actions, `None` for pickup and dropoff.
    pub fn delta(self) -> Option<(isize, isize)> {
        match self {
            Action::South => Some((1, 0)),
            Action::North => Some((-1, 0)),
            Action::East => Some((0, 1)),
            Action::West => Some((0, -1)),
            Action::Pickup | Action::Dropoff => None,
        }
    }

    /// Human readable name for presentation layers.
    pub fn name(self) -> &'static str {
        match self {
            Action::South => "south",
            Action::North => "north",
            Action::East => "east",
            Action::West => "west",
            Action::Pickup => "pickup",
            Action::Dropoff => "dropoff",
        }
    }
}

impl TryFrom<usize> for Action {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        Action::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidAction { index })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
