use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Action, Error, GRID_SIZE, GridCell, Result,
    encoding::{self, EncodedState, Observation},
    map::{Grid, ObstacleSet},
};

/// Default number of steps after which an episode is truncated.
pub const MAX_STEPS: usize = 2000;

/// Cost charged on every step.
pub const STEP_PENALTY: f64 = -0.1;
/// Added to the step cost when the shaping check passes.
pub const APPROACH_BONUS: f64 = 0.05;
pub const PICKUP_REWARD: f64 = 10.0;
pub const DROPOFF_REWARD: f64 = 20.0;
/// Charged for a pickup or dropoff attempted in the wrong place.
pub const MISPLACED_ACTION_PENALTY: f64 = -10.0;

/// Mutable state of the episode in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeState {
    pub agent_position: GridCell,
    pub passenger_position: GridCell,
    pub destination_position: GridCell,
    pub passenger_aboard: bool,
    pub steps_taken: usize,
}

impl EpisodeState {
    fn observation(&self) -> Observation {
        Observation {
            agent: self.agent_position,
            passenger: self.passenger_position,
            destination: self.destination_position,
            passenger_aboard: self.passenger_aboard,
        }
    }
}

/// Extra information returned with a step. Empty unless the episode was truncated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub step_limit_reached: bool,
}

/// Represents the outcome of a single environment step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub state: EncodedState,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Provides a read-only view of the environment for presentation layers.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentView<'a> {
    episode: &'a EpisodeState,
    obstacles: &'a ObstacleSet,
    max_steps: usize,
}

impl EnvironmentView<'_> {
    pub fn agent_position(&self) -> GridCell {
        self.episode.agent_position
    }
    pub fn passenger_position(&self) -> GridCell {
        self.episode.passenger_position
    }
    pub fn destination_position(&self) -> GridCell {
        self.episode.destination_position
    }
    pub fn passenger_aboard(&self) -> bool {
        self.episode.passenger_aboard
    }
    pub fn steps_taken(&self) -> usize {
        self.episode.steps_taken
    }
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }
    pub fn is_obstacle(&self, cell: GridCell) -> bool {
        self.obstacles.contains(cell)
    }

    /// Glyph for a single cell. The taxi hides everything under it, and a
    /// passenger riding in the taxi is not drawn at the pickup cell.
    pub fn glyph(&self, cell: GridCell) -> char {
        if cell == self.episode.agent_position {
            if self.episode.passenger_aboard { 'T' } else { 't' }
        } else if self.obstacles.contains(cell) {
            '#'
        } else if cell == self.episode.destination_position {
            'D'
        } else if !self.episode.passenger_aboard && cell == self.episode.passenger_position {
            'P'
        } else {
            '.'
        }
    }
}

/// The 10x10 taxi simulation.
#[derive(Debug, Clone)]
pub struct TaxiEnv {
    obstacles: ObstacleSet,
    episode: EpisodeState,
    max_steps: usize,
    rng: StdRng,
}

impl TaxiEnv {
    /// Creates an environment with the standard layout, seeded from the OS.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_rng(&mut rand::rng()))
    }

    /// Creates an environment with the standard layout and a deterministic seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self::with_obstacles(ObstacleSet::standard(), rng)
    }

    /// Creates an environment with a custom obstacle layout. The first episode is
    /// started immediately.
    pub fn with_obstacles(obstacles: ObstacleSet, rng: StdRng) -> Self {
        let start = obstacles.free_cells()[0];
        let mut env = Self {
            obstacles,
            episode: EpisodeState {
                agent_position: start,
                passenger_position: start,
                destination_position: start,
                passenger_aboard: false,
                steps_taken: 0,
            },
            max_steps: MAX_STEPS,
            rng,
        };
        env.reset();
        env
    }

    /// Overrides the truncation limit.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Starts a new episode with taxi, passenger and destination each drawn
    /// independently from the free cells. They may coincide.
    pub fn reset(&mut self) -> EncodedState {
        let agent_position = self.random_free_cell();
        let passenger_position = self.random_free_cell();
        let destination_position = self.random_free_cell();
        self.episode = EpisodeState {
            agent_position,
            passenger_position,
            destination_position,
            passenger_aboard: false,
            steps_taken: 0,
        };
        self.encode()
    }

    /// Starts a new episode from a known configuration.
    pub fn set_state(
        &mut self,
        agent: GridCell,
        passenger: GridCell,
        destination: GridCell,
    ) -> Result<EncodedState> {
        for cell in [agent, passenger, destination] {
            if !cell.in_bounds() {
                return Err(Error::OutOfBounds { cell });
            }
            if self.obstacles.contains(cell) {
                return Err(Error::BlockedCell { cell });
            }
        }
        self.episode = EpisodeState {
            agent_position: agent,
            passenger_position: passenger,
            destination_position: destination,
            passenger_aboard: false,
            steps_taken: 0,
        };
        Ok(self.encode())
    }

    /// Validates a raw action index before stepping.
    pub fn step_index(&mut self, action: usize) -> Result<StepResult> {
        let action = Action::try_from(action)?;
        Ok(self.step(action))
    }

    /// Applies one action.
    pub fn step(&mut self, action: Action) -> StepResult {
        self.episode.steps_taken += 1;

        if self.episode.steps_taken >= self.max_steps {
            return StepResult {
                state: self.encode(),
                reward: STEP_PENALTY,
                done: true,
                info: StepInfo {
                    step_limit_reached: true,
                },
            };
        }

        let mut reward = STEP_PENALTY;
        let mut done = false;

        let candidate = self.candidate_position(action);
        if !self.obstacles.contains(candidate) {
            self.episode.agent_position = candidate;
        }

        // Shaping compares the final cell against the candidate cell, not against
        // the cell the taxi started the step in. After an accepted move the two
        // coincide, so the bonus can only fire on a blocked move.
        let agent = self.episode.agent_position;
        let target = if self.episode.passenger_aboard {
            self.episode.destination_position
        } else {
            self.episode.passenger_position
        };
        if agent.manhattan_distance(&target) < agent.manhattan_distance(&candidate) {
            reward += APPROACH_BONUS;
        }

        match action {
            Action::Pickup => {
                if !self.episode.passenger_aboard && agent == self.episode.passenger_position {
                    self.episode.passenger_aboard = true;
                    reward = PICKUP_REWARD;
                } else {
                    reward = MISPLACED_ACTION_PENALTY;
                }
            }
            Action::Dropoff => {
                if self.episode.passenger_aboard && agent == self.episode.destination_position {
                    self.episode.passenger_aboard = false;
                    reward = DROPOFF_REWARD;
                    done = true;
                } else {
                    reward = MISPLACED_ACTION_PENALTY;
                }
            }
            _ => {}
        }

        StepResult {
            state: self.encode(),
            reward,
            done,
            info: StepInfo::default(),
        }
    }

    /// Encodes the current state.
    pub fn encode(&self) -> EncodedState {
        encoding::encode(&self.episode.observation())
    }

    /// Decodes an index into its structured form.
    pub fn decode(&self, state: EncodedState) -> Result<Observation> {
        encoding::decode(state)
    }

    pub fn observation(&self) -> Observation {
        self.episode.observation()
    }

    pub fn episode(&self) -> &EpisodeState {
        &self.episode
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn view(&self) -> EnvironmentView<'_> {
        EnvironmentView {
            episode: &self.episode,
            obstacles: &self.obstacles,
            max_steps: self.max_steps,
        }
    }

    /// Draws the grid as text followed by a short status block.
    pub fn render_text(&self) -> String {
        let view = self.view();
        let glyphs = Grid::from_generator(GRID_SIZE, GRID_SIZE, |cell| view.glyph(cell));

        let mut out = String::with_capacity(GRID_SIZE * (GRID_SIZE * 2 + 1) + 128);
        for row in glyphs.row_slices() {
            let line: Vec<String> = row.iter().map(char::to_string).collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out.push_str(&format!(
            "taxi: {}  aboard: {}\npassenger: {}\ndestination: {}\nsteps: {}\n",
            view.agent_position(),
            view.passenger_aboard(),
            view.passenger_position(),
            view.destination_position(),
            view.steps_taken()
        ));
        out
    }

    /// Applies the movement delta, leaving the position unchanged when the move
    /// would leave the grid.
    fn candidate_position(&self, action: Action) -> GridCell {
        let current = self.episode.agent_position;
        let Some((d_row, d_col)) = action.delta() else {
            return current;
        };
        match (
            current.row.checked_add_signed(d_row),
            current.col.checked_add_signed(d_col),
        ) {
            (Some(row), Some(col)) if row < GRID_SIZE && col < GRID_SIZE => GridCell { row, col },
            _ => current,
        }
    }

    fn random_free_cell(&mut self) -> GridCell {
        // ObstacleSet guarantees at least one free cell.
        *self
            .obstacles
            .free_cells()
            .choose(&mut self.rng)
            .unwrap_or(&self.episode.agent_position)
    }
}

impl Default for TaxiEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;
    use rstest::rstest;

    use super::*;

    fn env_at(agent: GridCell, passenger: GridCell, destination: GridCell) -> TaxiEnv {
        let mut env = TaxiEnv::with_seed(7);
        env.set_state(agent, passenger, destination).unwrap();
        env
    }

    #[test]
    fn reset_never_places_anything_on_an_obstacle() {
        let mut env = TaxiEnv::with_seed(11);
        for _ in 0..2_000 {
            env.reset();
            let ep = env.episode();
            assert!(!env.obstacles().contains(ep.agent_position));
            assert!(!env.obstacles().contains(ep.passenger_position));
            assert!(!env.obstacles().contains(ep.destination_position));
            assert!(!ep.passenger_aboard);
            assert_eq!(ep.steps_taken, 0);
        }
    }

    #[test]
    fn reset_returns_encoding_of_new_state() {
        let mut env = TaxiEnv::with_seed(3);
        let state = env.reset();
        assert_eq!(env.decode(state).unwrap(), env.observation());
    }

    #[rstest]
    #[case(Action::South, GridCell::new(5, 4))]
    #[case(Action::North, GridCell::new(3, 4))]
    #[case(Action::East, GridCell::new(4, 5))]
    #[case(Action::West, GridCell::new(4, 3))]
    fn moves_follow_action_deltas(#[case] action: Action, #[case] expected: GridCell) {
        let mut env = env_at(GridCell::new(4, 4), GridCell::new(8, 8), GridCell::new(1, 1));
        let result = env.step(action);
        assert_eq!(env.episode().agent_position, expected);
        assert_float_eq!(result.reward, STEP_PENALTY, abs <= 1e-12);
        assert!(!result.done);
        assert_eq!(result.info, StepInfo::default());
    }

    #[test]
    fn move_into_obstacle_leaves_position_unchanged() {
        // (3, 3) is blocked; passenger far away so no shaping bonus applies.
        let mut env = env_at(GridCell::new(4, 3), GridCell::new(8, 8), GridCell::new(1, 1));
        let result = env.step(Action::North);
        assert_eq!(env.episode().agent_position, GridCell::new(4, 3));
        assert_float_eq!(result.reward, STEP_PENALTY, abs <= 1e-12);
        assert!(!result.done);
    }

    #[test]
    fn moving_off_the_grid_is_clamped() {
        let mut env = TaxiEnv::with_obstacles(
            ObstacleSet::from_cells([GridCell::new(5, 5)]).unwrap(),
            StdRng::seed_from_u64(1),
        );
        env.set_state(GridCell::new(0, 0), GridCell::new(8, 8), GridCell::new(9, 9))
            .unwrap();
        env.step(Action::North);
        env.step(Action::West);
        assert_eq!(env.episode().agent_position, GridCell::new(0, 0));
    }

    #[test]
    fn blocked_move_next_to_passenger_earns_the_bonus() {
        // Blocked move keeps the taxi on the passenger's cell: distance 0 < 1.
        let cell = GridCell::new(4, 3);
        let mut env = env_at(cell, cell, GridCell::new(1, 1));
        let result = env.step(Action::North);
        assert_eq!(env.episode().agent_position, cell);
        assert_float_eq!(result.reward, STEP_PENALTY + APPROACH_BONUS, abs <= 1e-12);
    }

    #[test]
    fn accepted_move_never_earns_the_bonus() {
        let mut env = env_at(GridCell::new(5, 3), GridCell::new(5, 4), GridCell::new(1, 1));
        let result = env.step(Action::East);
        assert_eq!(env.episode().agent_position, GridCell::new(5, 4));
        assert_float_eq!(result.reward, STEP_PENALTY, abs <= 1e-12);
    }

    #[test]
    fn successful_pickup() {
        let cell = GridCell::new(2, 2);
        let mut env = env_at(cell, cell, GridCell::new(7, 7));
        let result = env.step(Action::Pickup);
        assert!(env.episode().passenger_aboard);
        assert_eq!(result.reward, PICKUP_REWARD);
        assert!(!result.done);
    }

    #[test]
    fn failed_pickup_away_from_passenger() {
        let mut env = env_at(GridCell::new(2, 2), GridCell::new(2, 3), GridCell::new(7, 7));
        let result = env.step(Action::Pickup);
        assert!(!env.episode().passenger_aboard);
        assert_eq!(result.reward, MISPLACED_ACTION_PENALTY);
    }

    #[test]
    fn second_pickup_is_penalised() {
        let cell = GridCell::new(2, 2);
        let mut env = env_at(cell, cell, GridCell::new(7, 7));
        env.step(Action::Pickup);
        let result = env.step(Action::Pickup);
        assert!(env.episode().passenger_aboard);
        assert_eq!(result.reward, MISPLACED_ACTION_PENALTY);
    }

    #[test]
    fn successful_dropoff_ends_the_episode() {
        let cell = GridCell::new(6, 6);
        let mut env = env_at(cell, cell, cell);
        env.step(Action::Pickup);
        let result = env.step(Action::Dropoff);
        assert!(!env.episode().passenger_aboard);
        assert_eq!(result.reward, DROPOFF_REWARD);
        assert!(result.done);
        assert!(!result.info.step_limit_reached);
    }

    #[test]
    fn dropoff_without_passenger_is_penalised() {
        let cell = GridCell::new(6, 6);
        let mut env = env_at(cell, GridCell::new(2, 2), cell);
        let result = env.step(Action::Dropoff);
        assert_eq!(result.reward, MISPLACED_ACTION_PENALTY);
        assert!(!result.done);
    }

    #[test]
    fn episode_truncates_at_the_step_limit() {
        let mut env = env_at(GridCell::new(4, 4), GridCell::new(8, 8), GridCell::new(1, 1))
            .with_max_steps(5);
        for _ in 0..4 {
            assert!(!env.step(Action::Pickup).done);
        }
        let before = env.episode().agent_position;
        let result = env.step(Action::South);
        assert!(result.done);
        assert!(result.info.step_limit_reached);
        assert_float_eq!(result.reward, STEP_PENALTY, abs <= 1e-12);
        assert_eq!(env.episode().agent_position, before);
        assert_eq!(env.episode().steps_taken, 5);
    }

    #[test]
    fn raw_action_index_is_validated() {
        let mut env = TaxiEnv::with_seed(5);
        assert!(matches!(
            env.step_index(6),
            Err(Error::InvalidAction { index: 6 })
        ));
        assert_eq!(env.episode().steps_taken, 0);
        assert!(env.step_index(4).is_ok());
    }

    #[test]
    fn set_state_rejects_obstacles() {
        let mut env = TaxiEnv::with_seed(5);
        assert!(matches!(
            env.set_state(GridCell::new(0, 0), GridCell::new(4, 4), GridCell::new(4, 4)),
            Err(Error::BlockedCell { .. })
        ));
        assert!(matches!(
            env.set_state(GridCell::new(4, 4), GridCell::new(4, 10), GridCell::new(4, 4)),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn render_text_draws_every_entity() {
        let env = env_at(GridCell::new(1, 1), GridCell::new(2, 2), GridCell::new(5, 5));
        let text = env.render_text();
        let rows: Vec<&str> = text.lines().take(GRID_SIZE).collect();
        assert_eq!(rows[0], "# # # # # # # # # #");
        assert_eq!(rows[1].chars().nth(2), Some('t'));
        assert_eq!(rows[2].chars().nth(4), Some('P'));
        assert_eq!(rows[5].chars().nth(10), Some('D'));
        assert!(text.contains("steps: 0"));
    }
}
