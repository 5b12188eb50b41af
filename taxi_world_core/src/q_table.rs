//! Dense value table indexed by (encoded state, action).

use serde::{Deserialize, Serialize};

use crate::{ACTION_COUNT, Action, Error, Result, encoding::EncodedState};

/// Dense `states x ACTION_COUNT` table of action values, row-major by state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTable {
    states: usize,
    values: Vec<f64>,
}

impl ValueTable {
    /// Creates a zero-initialised table.
    pub fn new(states: usize) -> Self {
        Self {
            states,
            values: vec![0.0; states * ACTION_COUNT],
        }
    }

    /// Wraps existing values, checking that the buffer matches the declared shape.
    pub fn from_values(states: usize, actions: usize, values: Vec<f64>) -> Result<Self> {
        if actions != ACTION_COUNT || values.len() != states * ACTION_COUNT {
            return Err(Error::TableShapeMismatch {
                expected_states: states,
                expected_actions: ACTION_COUNT,
                states: values.len() / actions.max(1),
                actions,
            });
        }
        Ok(Self { states, values })
    }

    #[inline]
    pub fn states(&self) -> usize {
        self.states
    }

    #[inline]
    pub fn actions(&self) -> usize {
        ACTION_COUNT
    }

    /// Raw row-major value buffer.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Action values for one state.
    ///
    /// # Panics
    ///
    /// Panics if the state lies outside the table.
    #[inline]
    pub fn row(&self, state: EncodedState) -> &[f64; ACTION_COUNT] {
        let start = state.index() * ACTION_COUNT;
        self.values[start..start + ACTION_COUNT]
            .try_into()
            .expect("row slice has ACTION_COUNT entries")
    }

    #[inline]
    pub fn get(&self, state: EncodedState, action: Action) -> f64 {
        self.values[state.index() * ACTION_COUNT + action.index()]
    }

    #[inline]
    pub fn set(&mut self, state: EncodedState, action: Action, value: f64) {
        self.values[state.index() * ACTION_COUNT + action.index()] = value;
    }

    /// Maximum value over all actions in a state.
    pub fn max_value(&self, state: EncodedState) -> f64 {
        self.row(state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Action with the highest value. Ties go to the lowest action index.
    pub fn greedy_action(&self, state: EncodedState) -> Action {
        let row = self.row(state);
        let mut best = 0;
        for (i, &value) in row.iter().enumerate().skip(1) {
            if value > row[best] {
                best = i;
            }
        }
        Action::ALL[best]
    }

    /// Q-learning update in incremental form:
    /// `Q(s,a) <- Q(s,a) + alpha * (r + gamma * max_a' Q(s',a') - Q(s,a))`.
    ///
    /// Returns the new value.
    pub fn q_learning_update(
        &mut self,
        state: EncodedState,
        action: Action,
        reward: f64,
        next_state: EncodedState,
        alpha: f64,
        gamma: f64,
    ) -> f64 {
        let current = self.get(state, action);
        let target = reward + gamma * self.max_value(next_state);
        let updated = current + alpha * (target - current);
        self.set(state, action, updated);
        updated
    }
}
