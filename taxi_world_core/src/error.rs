use std::path::PathBuf;

/// Represents errors raised by the taxi world core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid action index {index} (expected 0..=5)")]
    InvalidAction { index: usize },

    #[error("encoded state {index} is out of range (expected < {count})")]
    StateOutOfRange { index: usize, count: usize },

    #[error("cell {cell} is outside the grid")]
    OutOfBounds { cell: crate::GridCell },

    #[error("cell {cell} is an obstacle")]
    BlockedCell { cell: crate::GridCell },

    #[error("obstacle set leaves no free cell to place entities on")]
    NoFreeCells,

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error(
        "value table shape mismatch: expected {expected_states}x{expected_actions}, found {states}x{actions}"
    )]
    TableShapeMismatch {
        expected_states: usize,
        expected_actions: usize,
        states: usize,
        actions: usize,
    },

    #[error("unsupported value table format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("value table not found at {}", path.display())]
    TableNotFound { path: PathBuf },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {operation}: {message}")]
    Serialization { operation: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
