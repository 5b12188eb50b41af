//! Mixed-radix packing of a full taxi state into a single table index.
//!
//! Digits are packed most-significant first as
//! `(agent_row, agent_col, passenger_row, passenger_col, dest_row, dest_col, aboard)`
//! with radices `(10, 10, 10, 10, 10, 10, 2)`.

use serde::{Deserialize, Serialize};

use crate::{Error, GRID_SIZE, GridCell, Result};

/// Total number of encodable states: `GRID_SIZE^6 * 2`.
pub const STATE_COUNT: usize = GRID_SIZE.pow(6) * 2;

/// A flat index into the value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncodedState(usize);

impl EncodedState {
    /// Wraps a raw index, rejecting values outside `0..STATE_COUNT`.
    pub fn new(index: usize) -> Result<Self> {
        if index < STATE_COUNT {
            Ok(Self(index))
        } else {
            Err(Error::StateOutOfRange {
                index,
                count: STATE_COUNT,
            })
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EncodedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The structured view of a state: everything the encoding captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub agent: GridCell,
    pub passenger: GridCell,
    pub destination: GridCell,
    pub passenger_aboard: bool,
}

/// Packs an observation into its index.
///
/// # Panics
///
/// Panics in debug builds if any cell lies outside the grid.
pub fn encode(observation: &Observation) -> EncodedState {
    debug_assert!(observation.agent.in_bounds());
    debug_assert!(observation.passenger.in_bounds());
    debug_assert!(observation.destination.in_bounds());

    let digits = [
        observation.agent.row,
        observation.agent.col,
        observation.passenger.row,
        observation.passenger.col,
        observation.destination.row,
        observation.destination.col,
    ];
    let packed = digits
        .iter()
        .fold(0usize, |acc, &digit| acc * GRID_SIZE + digit);
    EncodedState(packed * 2 + usize::from(observation.passenger_aboard))
}

/// Unpacks an index, extracting the least-significant digit first.
pub fn decode(state: EncodedState) -> Result<Observation> {
    let mut rest = EncodedState::new(state.0)?.0;

    let passenger_aboard = rest % 2 == 1;
    rest /= 2;

    // Filled from the back: dest_col, dest_row, passenger_col, ... agent_row.
    let mut digits = [0usize; 6];
    for digit in digits.iter_mut().rev() {
        *digit = rest % GRID_SIZE;
        rest /= GRID_SIZE;
    }

    let [agent_row, agent_col, passenger_row, passenger_col, dest_row, dest_col] = digits;
    Ok(Observation {
        agent: GridCell::new(agent_row, agent_col),
        passenger: GridCell::new(passenger_row, passenger_col),
        destination: GridCell::new(dest_row, dest_col),
        passenger_aboard,
    })
}
