use float_eq::assert_float_eq;
use rand::{SeedableRng, rngs::StdRng};
use taxi_world_core::{
    Action, GridCell,
    config::TrainingConfig,
    encoding::STATE_COUNT,
    environment::{DROPOFF_REWARD, PICKUP_REWARD, STEP_PENALTY, TaxiEnv},
    learner::{NoopObserver, QLearner, evaluate_table},
    map::ObstacleSet,
    persistence::{load_table, save_table},
};

#[test]
fn scripted_delivery_on_open_grid() {
    let mut env = TaxiEnv::with_obstacles(ObstacleSet::border_rows(), StdRng::seed_from_u64(0));
    let start = GridCell::new(1, 1);
    env.set_state(start, start, GridCell::new(5, 5)).unwrap();

    let mut actions = vec![Action::Pickup];
    actions.extend([Action::South; 4]);
    actions.extend([Action::East; 4]);
    actions.push(Action::Dropoff);

    let results: Vec<_> = actions.iter().map(|&a| env.step(a)).collect();

    assert_eq!(results[0].reward, PICKUP_REWARD);
    for result in &results[1..9] {
        assert_float_eq!(result.reward, STEP_PENALTY, abs <= 1e-12);
        assert!(!result.done);
    }
    let last = results.last().unwrap();
    assert_eq!(last.reward, DROPOFF_REWARD);
    assert!(last.done);
    assert!(!last.info.step_limit_reached);
    assert_eq!(env.episode().agent_position, GridCell::new(5, 5));
    assert!(!env.episode().passenger_aboard);
}

#[test]
fn seeded_training_is_reproducible() {
    let config = TrainingConfig {
        episodes: 15,
        max_steps_per_episode: 300,
        epsilon_decay: 0.8,
        seed: Some(1234),
        log_every: 0,
        ..Default::default()
    };

    let run = || {
        let mut env = TaxiEnv::with_seed(99);
        let mut learner = QLearner::new(None);
        let history = learner.train(&mut env, &config, &mut NoopObserver).unwrap();
        (learner.into_table(), history.total_rewards())
    };

    let (table_a, rewards_a) = run();
    let (table_b, rewards_b) = run();
    assert_eq!(rewards_a, rewards_b);
    assert!(table_a == table_b);
}

#[test]
fn trained_table_round_trips_through_disk_and_evaluates() {
    let config = TrainingConfig {
        log_every: 0,
        ..Default::default()
    }
    .with_episodes(10)
    .with_max_steps_per_episode(200)
    .with_seed(8);
    let mut env = TaxiEnv::with_seed(8);
    let mut learner = QLearner::new(None);
    learner.train(&mut env, &config, &mut NoopObserver).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("q_table.msgpack");
    save_table(learner.table(), &path).unwrap();

    let loaded = load_table(&path, STATE_COUNT).unwrap();
    assert!(&loaded == learner.table());

    let summary = evaluate_table(&loaded, &mut env, 4, 30);
    assert_eq!(summary.episodes.len(), 4);
    assert!(summary.episodes.iter().all(|r| r.steps <= 30));
}
