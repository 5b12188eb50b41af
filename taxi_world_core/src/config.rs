//! Hyper-parameter records for training and evaluation.

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Training hyper-parameters, passed explicitly into the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training episodes
    pub episodes: usize,
    /// Learning rate α
    pub alpha: f64,
    /// Discount factor γ
    pub gamma: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// Multiplicative decay applied to epsilon after every episode
    pub epsilon_decay: f64,
    /// Learner-side cap on steps per episode
    pub max_steps_per_episode: usize,
    /// Number of recent episodes the success rate is computed over
    pub success_window: usize,
    /// Seed for the learner's exploration rng
    pub seed: Option<u64>,
    /// Log progress every this many episodes, 0 disables
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 500_000,
            alpha: 0.2,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.9995,
            max_steps_per_episode: 1000,
            success_window: 100,
            seed: None,
            log_every: 100,
        }
    }
}

impl TrainingConfig {
    pub fn with_episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_steps_per_episode(mut self, max_steps: usize) -> Self {
        self.max_steps_per_episode = max_steps;
        self
    }

    /// Reads a JSON config file. Missing fields take their default values.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            operation: format!("open config {}", path.display()),
            source,
        })?;
        let config: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::Serialization {
                operation: format!("parse config {}", path.display()),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects hyper-parameters outside their meaningful ranges.
    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, message: String| {
            if ok {
                Ok(())
            } else {
                tracing::warn!(%message, "rejecting training configuration");
                Err(Error::InvalidConfiguration { message })
            }
        };

        check(self.episodes > 0, "episodes must be positive".into())?;
        check(
            self.max_steps_per_episode > 0,
            "max_steps_per_episode must be positive".into(),
        )?;
        check(self.success_window > 0, "success_window must be positive".into())?;
        check(
            self.alpha.is_finite() && self.alpha > 0.0 && self.alpha <= 1.0,
            format!("alpha must be in (0, 1], got {}", self.alpha),
        )?;
        check(
            (0.0..=1.0).contains(&self.gamma),
            format!("gamma must be in [0, 1], got {}", self.gamma),
        )?;
        // Values above 1 explore on every step until decay brings them below 1.
        check(
            self.epsilon_start.is_finite() && self.epsilon_start >= 0.0,
            format!("epsilon_start must be finite and non-negative, got {}", self.epsilon_start),
        )?;
        check(
            (0.0..=1.0).contains(&self.epsilon_end),
            format!("epsilon_end must be in [0, 1], got {}", self.epsilon_end),
        )?;
        check(
            self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0,
            format!("epsilon_decay must be in (0, 1], got {}", self.epsilon_decay),
        )?;
        Ok(())
    }
}

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub episodes: usize,
    pub max_steps_per_episode: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            episodes: 10,
            max_steps_per_episode: 100,
        }
    }
}
