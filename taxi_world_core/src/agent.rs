use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};

use crate::{
    Action,
    encoding::EncodedState,
    environment::TaxiEnv,
    q_table::ValueTable,
    stats::{EpisodeOutcome, EpisodeRecord},
};

/// Trait defining how actions are chosen from an encoded state.
pub trait Policy {
    /// `&mut self` allows policies to carry their own rng.
    fn select_action(&mut self, state: EncodedState) -> Action;
}

/// Picks uniformly among the six actions.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn select_action(&mut self, _state: EncodedState) -> Action {
        *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::South)
    }
}

/// Always takes the highest-valued action of a borrowed table.
#[derive(Debug, Clone, Copy)]
pub struct GreedyPolicy<'a> {
    table: &'a ValueTable,
}

impl<'a> GreedyPolicy<'a> {
    pub fn new(table: &'a ValueTable) -> Self {
        Self { table }
    }
}

impl Policy for GreedyPolicy<'_> {
    fn select_action(&mut self, state: EncodedState) -> Action {
        self.table.greedy_action(state)
    }
}

/// One step of a recorded rollout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceStep {
    pub action: Action,
    pub reward: f64,
}

/// Runs one episode from a fresh reset until the environment signals done or
/// `max_steps` actions have been taken.
pub fn rollout<P: Policy + ?Sized>(
    env: &mut TaxiEnv,
    policy: &mut P,
    episode: usize,
    max_steps: usize,
) -> (EpisodeRecord, Vec<TraceStep>) {
    rollout_with(env, policy, episode, max_steps, |_, _| {})
}

/// Like [`rollout`], but calls `on_step` once after the reset with `None` and
/// after every action with the step just taken.
pub fn rollout_with<P, F>(
    env: &mut TaxiEnv,
    policy: &mut P,
    episode: usize,
    max_steps: usize,
    mut on_step: F,
) -> (EpisodeRecord, Vec<TraceStep>)
where
    P: Policy + ?Sized,
    F: FnMut(&TaxiEnv, Option<&TraceStep>),
{
    let mut state = env.reset();
    on_step(env, None);
    let mut trace = Vec::new();
    let mut total_reward = 0.0;
    let mut outcome = EpisodeOutcome::Capped;

    while trace.len() < max_steps {
        let action = policy.select_action(state);
        let result = env.step(action);
        let step = TraceStep {
            action,
            reward: result.reward,
        };
        on_step(env, Some(&step));
        trace.push(step);
        total_reward += result.reward;
        state = result.state;

        if result.done {
            outcome = if result.info.step_limit_reached {
                EpisodeOutcome::StepLimit
            } else {
                EpisodeOutcome::Success
            };
            break;
        }
    }

    let record = EpisodeRecord {
        episode,
        total_reward,
        steps: trace.len(),
        outcome,
    };
    (record, trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_policy_is_reproducible() {
        let mut a = RandomPolicy::new(42);
        let mut b = RandomPolicy::new(42);
        let state = EncodedState::new(0).unwrap();
        let xs: Vec<Action> = (0..50).map(|_| a.select_action(state)).collect();
        let ys: Vec<Action> = (0..50).map(|_| b.select_action(state)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn rollout_stops_at_the_cap() {
        let mut env = TaxiEnv::with_seed(1);
        // An untrained greedy policy always moves south and never finishes.
        let table = ValueTable::new(crate::encoding::STATE_COUNT);
        let mut policy = GreedyPolicy::new(&table);
        let (record, trace) = rollout(&mut env, &mut policy, 0, 25);
        assert_eq!(record.steps, 25);
        assert_eq!(trace.len(), 25);
        assert_eq!(record.outcome, EpisodeOutcome::Capped);
        assert!(trace.iter().all(|s| s.action == Action::South));
    }

    #[test]
    fn rollout_reports_environment_truncation() {
        let mut env = TaxiEnv::with_seed(2).with_max_steps(10);
        let mut policy = RandomPolicy::new(2);
        let (record, _) = rollout(&mut env, &mut policy, 3, 100);
        assert_eq!(record.episode, 3);
        assert!(record.steps <= 10);
        assert_ne!(record.outcome, EpisodeOutcome::Capped);
    }

    #[test]
    fn step_callback_sees_every_step() {
        let mut env = TaxiEnv::with_seed(4);
        let mut policy = RandomPolicy::new(4);
        let mut resets = 0;
        let mut seen = Vec::new();
        let (record, trace) = rollout_with(&mut env, &mut policy, 0, 15, |env, step| match step {
            None => {
                resets += 1;
                assert_eq!(env.episode().steps_taken, 0);
            }
            Some(step) => seen.push((*step, env.episode().steps_taken)),
        });
        assert_eq!(resets, 1);
        assert_eq!(seen.len(), record.steps);
        for (i, ((step, steps_taken), traced)) in seen.iter().zip(&trace).enumerate() {
            assert_eq!(step, traced);
            assert_eq!(*steps_taken, i + 1);
        }
    }
}
