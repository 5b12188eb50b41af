//! Per-episode statistics produced by training and evaluation.

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// Passenger dropped off at the destination.
    Success,
    /// The environment truncated the episode at its step limit.
    StepLimit,
    /// The caller's per-episode step cap was reached first.
    Capped,
}

impl EpisodeOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, EpisodeOutcome::Success)
    }
}

/// Summary of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: usize,
    pub total_reward: f64,
    pub steps: usize,
    pub outcome: EpisodeOutcome,
}

/// Sliding-window success rate.
#[derive(Debug, Clone)]
pub struct SuccessWindow {
    capacity: usize,
    recent: VecDeque<bool>,
    successes: usize,
}

impl SuccessWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            recent: VecDeque::with_capacity(capacity),
            successes: 0,
        }
    }

    /// Records an episode and returns the updated rate.
    pub fn push(&mut self, success: bool) -> f64 {
        if self.recent.len() == self.capacity && self.recent.pop_front() == Some(true) {
            self.successes -= 1;
        }
        self.recent.push_back(success);
        if success {
            self.successes += 1;
        }
        self.rate()
    }

    pub fn rate(&self) -> f64 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.successes as f64 / self.recent.len() as f64
        }
    }
}

/// Series collected over a training run: reward, length and rolling success rate
/// for every episode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub records: Vec<EpisodeRecord>,
    pub success_rates: Vec<f64>,
    pub epsilons: Vec<f64>,
    /// True when an observer stopped training before all episodes ran.
    pub interrupted: bool,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpisodeRecord, success_rate: f64, epsilon: f64) {
        self.records.push(record);
        self.success_rates.push(success_rate);
        self.epsilons.push(epsilon);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_rewards(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.total_reward).collect()
    }

    pub fn lengths(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.steps as f64).collect()
    }

    pub fn final_success_rate(&self) -> f64 {
        self.success_rates.last().copied().unwrap_or(0.0)
    }

    /// Writes one CSV row per episode for an external plotting tool.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| Error::Io {
            operation: format!("write metrics {}", path.display()),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "episode,total_reward,steps,outcome,success_rate,epsilon").map_err(io_err)?;
        for ((record, rate), epsilon) in self
            .records
            .iter()
            .zip(&self.success_rates)
            .zip(&self.epsilons)
        {
            let outcome = match record.outcome {
                EpisodeOutcome::Success => "success",
                EpisodeOutcome::StepLimit => "step_limit",
                EpisodeOutcome::Capped => "capped",
            };
            writeln!(
                writer,
                "{},{},{},{},{:.4},{:.6}",
                record.episode, record.total_reward, record.steps, outcome, rate, epsilon
            )
            .map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}

/// Trailing moving average; the output has `values.len() - window + 1` entries.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }
    out
}

/// Aggregate over a batch of greedy evaluation episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub episodes: Vec<EpisodeRecord>,
    pub mean_reward: f64,
    pub mean_steps: f64,
    pub success_rate: f64,
}

impl EvaluationSummary {
    pub fn from_records(episodes: Vec<EpisodeRecord>) -> Self {
        let n = episodes.len().max(1) as f64;
        let mean_reward = episodes.iter().map(|r| r.total_reward).sum::<f64>() / n;
        let mean_steps = episodes.iter().map(|r| r.steps as f64).sum::<f64>() / n;
        let success_rate = episodes.iter().filter(|r| r.outcome.is_success()).count() as f64 / n;
        Self {
            episodes,
            mean_reward,
            mean_steps,
            success_rate,
        }
    }
}
