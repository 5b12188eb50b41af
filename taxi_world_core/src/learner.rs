//! Tabular Q-learning over the encoded taxi state space.
//!
//! Training runs whole episodes against a [`TaxiEnv`]: epsilon-greedy action
//! choice, one table update per step, multiplicative epsilon decay between
//! episodes. Updates are applied in place, so the table is usable at every
//! episode boundary and an observer may stop training early without losing work.

use std::ops::ControlFlow;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};

use crate::{
    Action, Result,
    agent::{GreedyPolicy, rollout},
    config::TrainingConfig,
    encoding::{EncodedState, STATE_COUNT},
    environment::TaxiEnv,
    q_table::ValueTable,
    stats::{EpisodeOutcome, EpisodeRecord, EvaluationSummary, SuccessWindow, TrainingHistory},
};

/// Receives a callback after every training episode.
pub trait TrainingObserver {
    /// Return `ControlFlow::Break(())` to stop before the next episode.
    fn on_episode_end(
        &mut self,
        record: &EpisodeRecord,
        success_rate: f64,
        epsilon: f64,
    ) -> ControlFlow<()>;
}

/// Observer that never interrupts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {
    fn on_episode_end(&mut self, _: &EpisodeRecord, _: f64, _: f64) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F> TrainingObserver for F
where
    F: FnMut(&EpisodeRecord, f64, f64) -> ControlFlow<()>,
{
    fn on_episode_end(
        &mut self,
        record: &EpisodeRecord,
        success_rate: f64,
        epsilon: f64,
    ) -> ControlFlow<()> {
        self(record, success_rate, epsilon)
    }
}

fn build_rng(seed: Option<u64>) -> StdRng {
    if let Some(seed) = seed {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_rng(&mut rand::rng())
    }
}

/// Q-learning agent owning its value table.
#[derive(Debug, Clone)]
pub struct QLearner {
    table: ValueTable,
    epsilon: f64,
    rng: StdRng,
}

impl QLearner {
    /// Creates a learner with a zeroed table covering every encodable state.
    pub fn new(seed: Option<u64>) -> Self {
        Self::from_table(ValueTable::new(STATE_COUNT), seed)
    }

    /// Resumes from an existing table.
    pub fn from_table(table: ValueTable, seed: Option<u64>) -> Self {
        Self {
            table,
            epsilon: 1.0,
            rng: build_rng(seed),
        }
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn into_table(self) -> ValueTable {
        self.table
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// ε-greedy action selection.
    fn select_action(&mut self, state: EncodedState) -> Action {
        if self.rng.random::<f64>() < self.epsilon {
            *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::South)
        } else {
            self.table.greedy_action(state)
        }
    }

    fn decay_epsilon(&mut self, config: &TrainingConfig) {
        self.epsilon = (self.epsilon * config.epsilon_decay).max(config.epsilon_end);
    }

    /// Trains for `config.episodes` episodes, or until the observer breaks.
    pub fn train<O: TrainingObserver + ?Sized>(
        &mut self,
        env: &mut TaxiEnv,
        config: &TrainingConfig,
        observer: &mut O,
    ) -> Result<TrainingHistory> {
        config.validate()?;
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.epsilon = config.epsilon_start;

        let mut history = TrainingHistory::default();
        let mut window = SuccessWindow::new(config.success_window);

        tracing::info!(
            episodes = config.episodes,
            alpha = config.alpha,
            gamma = config.gamma,
            epsilon_start = config.epsilon_start,
            "starting training"
        );

        for episode in 0..config.episodes {
            let record = self.run_training_episode(env, config, episode);
            let success_rate = window.push(record.outcome.is_success());
            self.decay_epsilon(config);
            history.push(record, success_rate, self.epsilon);

            if config.log_every > 0 && (episode + 1) % config.log_every == 0 {
                tracing::info!(
                    episode = episode + 1,
                    total_reward = record.total_reward,
                    steps = record.steps,
                    epsilon = self.epsilon,
                    success_rate,
                    "training progress"
                );
            }

            if observer
                .on_episode_end(&record, success_rate, self.epsilon)
                .is_break()
            {
                tracing::info!(episode = episode + 1, "training interrupted");
                history.interrupted = true;
                break;
            }
        }

        tracing::info!(
            episodes = history.len(),
            success_rate = history.final_success_rate(),
            "training finished"
        );
        Ok(history)
    }

    fn run_training_episode(
        &mut self,
        env: &mut TaxiEnv,
        config: &TrainingConfig,
        episode: usize,
    ) -> EpisodeRecord {
        let mut state = env.reset();
        let mut total_reward = 0.0;
        let mut steps = 0;
        let mut outcome = EpisodeOutcome::Capped;

        while steps < config.max_steps_per_episode {
            let action = self.select_action(state);
            let result = env.step(action);

            self.table.q_learning_update(
                state,
                action,
                result.reward,
                result.state,
                config.alpha,
                config.gamma,
            );

            state = result.state;
            total_reward += result.reward;
            steps += 1;

            if result.done {
                outcome = if result.info.step_limit_reached {
                    EpisodeOutcome::StepLimit
                } else {
                    EpisodeOutcome::Success
                };
                break;
            }
        }

        EpisodeRecord {
            episode,
            total_reward,
            steps,
            outcome,
        }
    }

    /// Greedy rollouts for reporting. The table is not modified.
    pub fn evaluate(&self, env: &mut TaxiEnv, episodes: usize, max_steps: usize) -> EvaluationSummary {
        evaluate_table(&self.table, env, episodes, max_steps)
    }
}

/// Greedy rollouts of a table, e.g. one loaded from disk.
pub fn evaluate_table(
    table: &ValueTable,
    env: &mut TaxiEnv,
    episodes: usize,
    max_steps: usize,
) -> EvaluationSummary {
    let mut policy = GreedyPolicy::new(table);
    let records = (0..episodes)
        .map(|episode| rollout(env, &mut policy, episode, max_steps).0)
        .collect();
    let summary = EvaluationSummary::from_records(records);
    tracing::info!(
        episodes,
        mean_reward = summary.mean_reward,
        mean_steps = summary.mean_steps,
        success_rate = summary.success_rate,
        "evaluation finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;
    use crate::environment::{
        APPROACH_BONUS, MISPLACED_ACTION_PENALTY, PICKUP_REWARD, STEP_PENALTY,
    };

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            epsilon_decay: 0.9,
            epsilon_end: 0.05,
            log_every: 0,
            ..Default::default()
        }
        .with_episodes(20)
        .with_max_steps_per_episode(200)
        .with_seed(17)
    }

    #[test]
    fn epsilon_decays_to_the_floor() {
        let mut learner = QLearner::new(Some(1));
        let mut env = TaxiEnv::with_seed(1);
        let config = TrainingConfig {
            episodes: 40,
            max_steps_per_episode: 5,
            epsilon_decay: 0.5,
            epsilon_end: 0.1,
            log_every: 0,
            ..Default::default()
        };
        let history = learner.train(&mut env, &config, &mut NoopObserver).unwrap();
        assert_eq!(history.len(), 40);
        assert_float_eq!(history.epsilons[0], 0.5, abs <= 1e-12);
        assert_float_eq!(history.epsilons[1], 0.25, abs <= 1e-12);
        assert_float_eq!(learner.epsilon(), 0.1, abs <= 1e-12);
    }

    #[test]
    fn capped_episodes_are_not_successes() {
        let mut learner = QLearner::new(Some(3));
        let mut env = TaxiEnv::with_seed(3);
        let config = TrainingConfig {
            log_every: 0,
            ..Default::default()
        }
        .with_episodes(25)
        .with_max_steps_per_episode(1);
        let history = learner.train(&mut env, &config, &mut NoopObserver).unwrap();

        // A lone first step can be a move (with or without the bonus), a
        // successful pickup or a misplaced pickup/dropoff.
        let single_step_rewards = [
            STEP_PENALTY,
            STEP_PENALTY + APPROACH_BONUS,
            PICKUP_REWARD,
            MISPLACED_ACTION_PENALTY,
        ];
        for (record, &reward) in history.records.iter().zip(&history.total_rewards()) {
            assert_eq!(record.steps, 1);
            assert_eq!(record.outcome, EpisodeOutcome::Capped);
            assert!(!record.outcome.is_success());
            assert_float_eq!(reward, record.total_reward, abs <= 1e-12);
            assert!(
                single_step_rewards.iter().any(|&r| (r - reward).abs() < 1e-9),
                "unexpected capped reward {reward}"
            );
        }
        assert!(history.success_rates.iter().all(|&rate| rate == 0.0));
    }

    #[test]
    fn capped_episode_rewards_accumulate_every_step() {
        let mut learner = QLearner::new(Some(11));
        let mut env = TaxiEnv::with_seed(11);
        let config = TrainingConfig {
            log_every: 0,
            ..Default::default()
        }
        .with_episodes(10)
        .with_max_steps_per_episode(3);
        let history = learner.train(&mut env, &config, &mut NoopObserver).unwrap();

        let capped: Vec<_> = history
            .records
            .iter()
            .filter(|r| r.outcome == EpisodeOutcome::Capped)
            .collect();
        assert!(!capped.is_empty());
        for record in capped {
            assert_eq!(record.steps, 3);
            // Three steps, each at least the misplaced-action penalty and at
            // most a pickup.
            assert!(record.total_reward >= 3.0 * MISPLACED_ACTION_PENALTY - 1e-9);
            assert!(record.total_reward <= 3.0 * PICKUP_REWARD + 1e-9);
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.total_rewards().len(), 10);
    }

    #[test]
    fn epsilon_above_one_always_explores() {
        let mut learner = QLearner::new(Some(4));
        learner.epsilon = 4.0;
        let state = EncodedState::new(0).unwrap();
        // An untouched table is greedy towards South, so any other action
        // comes from exploration.
        let explored: Vec<Action> = (0..200).map(|_| learner.select_action(state)).collect();
        assert!(explored.iter().any(|&a| a != Action::South));
        for action in Action::ALL {
            assert!(explored.contains(&action));
        }

        learner.epsilon = 0.0;
        assert!((0..50).all(|_| learner.select_action(state) == Action::South));
    }

    #[test]
    fn oversized_epsilon_start_decays_into_the_unit_range() {
        let mut learner = QLearner::new(Some(6));
        let mut env = TaxiEnv::with_seed(6);
        let config = TrainingConfig {
            epsilon_start: 4.0,
            epsilon_decay: 0.5,
            epsilon_end: 0.01,
            log_every: 0,
            ..Default::default()
        }
        .with_episodes(4)
        .with_max_steps_per_episode(5);
        let history = learner.train(&mut env, &config, &mut NoopObserver).unwrap();
        let expected = [2.0, 1.0, 0.5, 0.25];
        for (&epsilon, &want) in history.epsilons.iter().zip(&expected) {
            assert_float_eq!(epsilon, want, abs <= 1e-12);
        }
    }

    #[test]
    fn training_updates_the_table() {
        let mut learner = QLearner::new(None);
        let mut env = TaxiEnv::with_seed(5);
        learner
            .train(&mut env, &small_config(), &mut NoopObserver)
            .unwrap();
        assert!(learner.table().values().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn observer_can_stop_training_between_episodes() {
        let mut learner = QLearner::new(None);
        let mut env = TaxiEnv::with_seed(9);
        let mut seen = 0;
        let mut stop_after_three = |_: &EpisodeRecord, _: f64, _: f64| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let history = learner
            .train(&mut env, &small_config(), &mut stop_after_three)
            .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.interrupted);
    }

    #[test]
    fn invalid_config_is_rejected_before_training() {
        let mut learner = QLearner::new(None);
        let mut env = TaxiEnv::with_seed(9);
        let config = TrainingConfig {
            alpha: 2.0,
            ..small_config()
        };
        assert!(learner.train(&mut env, &config, &mut NoopObserver).is_err());
        assert!(learner.table().values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn evaluation_leaves_the_table_untouched() {
        let mut learner = QLearner::new(None);
        let mut env = TaxiEnv::with_seed(21);
        learner
            .train(&mut env, &small_config(), &mut NoopObserver)
            .unwrap();
        let before = learner.table().clone();
        let summary = learner.evaluate(&mut env, 3, 50);
        assert_eq!(summary.episodes.len(), 3);
        assert_eq!(learner.table(), &before);
    }
}
