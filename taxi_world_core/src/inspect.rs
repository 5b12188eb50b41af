//! Diagnostics over a trained value table.

use rand::Rng;
use serde::Serialize;

use crate::{
    ACTION_COUNT, Action, Result,
    encoding::{self, EncodedState, Observation},
    q_table::ValueTable,
};

/// Fill ratio below which a table is flagged as barely trained.
const SPARSE_FILL_PERCENT: f64 = 1.0;

/// Best action and values for one state.
#[derive(Debug, Clone, Serialize)]
pub struct StateSample {
    pub state: EncodedState,
    pub observation: Observation,
    pub best_action: Action,
    pub values: [f64; ACTION_COUNT],
}

/// Summary statistics of a value table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub total_entries: usize,
    pub non_zero_entries: usize,
    pub fill_percent: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub warnings: Vec<String>,
    pub samples: Vec<StateSample>,
}

/// Computes fill and range statistics and draws `samples` random states.
pub fn inspect<R: Rng>(table: &ValueTable, samples: usize, rng: &mut R) -> Result<TableReport> {
    let values = table.values();
    let total_entries = values.len();
    let non_zero_entries = values.iter().filter(|&&v| v != 0.0).count();
    let fill_percent = if total_entries == 0 {
        0.0
    } else {
        non_zero_entries as f64 * 100.0 / total_entries as f64
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / total_entries.max(1) as f64;

    let mut warnings = Vec::new();
    if fill_percent < SPARSE_FILL_PERCENT {
        warnings.push(format!(
            "only {fill_percent:.2}% of entries are non-zero; training was probably too short"
        ));
    }
    if max <= 0.0 {
        warnings.push("no entry is positive; the agent never learned a rewarding action".to_string());
    }

    let samples = if table.states() == 0 {
        Vec::new()
    } else {
        (0..samples)
            .map(|_| -> Result<StateSample> {
                let state = EncodedState::new(rng.random_range(0..table.states()))?;
                Ok(StateSample {
                    state,
                    observation: encoding::decode(state)?,
                    best_action: table.greedy_action(state),
                    values: *table.row(state),
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    Ok(TableReport {
        total_entries,
        non_zero_entries,
        fill_percent,
        min,
        max,
        mean,
        warnings,
        samples,
    })
}
