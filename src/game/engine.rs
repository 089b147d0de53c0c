use super::{
    action::Direction,
    config::GameConfig,
    state::{CollisionType, GameState, Position, Snake},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Side information about a step
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    /// Whether the snake ate food this step
    pub ate_food: bool,
    /// What ended the game, if anything
    pub collision_type: Option<CollisionType>,
}

/// Outcome of a single game step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub reward: f32,
    pub terminated: bool,
    pub info: StepInfo,
}

impl StepResult {
    fn finished() -> Self {
        Self {
            reward: 0.0,
            terminated: true,
            info: StepInfo {
                ate_food: false,
                collision_type: None,
            },
        }
    }
}

/// Game rules: spawning, movement, collisions and rewards
pub struct GameEngine {
    config: GameConfig,
    rng: StdRng,
}

impl GameEngine {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Engine with reproducible food placement
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Start a new game: snake centred and facing right, food on a free cell
    pub fn reset(&mut self) -> GameState {
        let center_x = (self.config.grid_width / 2) as i32;
        let center_y = (self.config.grid_height / 2) as i32;

        let snake = Snake::new(
            Position::new(center_x, center_y),
            Direction::Right,
            self.config.initial_snake_length,
        );

        let mut state = GameState::new(
            snake,
            Position::new(0, 0),
            self.config.grid_width,
            self.config.grid_height,
        );
        // A fresh board always has room for food
        if let Some(food) = self.spawn_food(&state) {
            state.food = food;
        }
        state
    }

    /// Apply one action to `state`
    ///
    /// Reversing straight into the neck is ignored and the snake keeps its
    /// heading. Stepping a finished game is a no-op.
    pub fn step(&mut self, state: &mut GameState, direction: Direction) -> StepResult {
        if !state.is_alive {
            return StepResult::finished();
        }

        if !state.snake.direction.is_opposite(direction) {
            state.snake.direction = direction;
        }

        let new_head = state.snake.head().step(state.snake.direction);
        let ate_food = new_head == state.food;

        if let Some(collision_type) = self.check_collision(state, new_head, ate_food) {
            state.is_alive = false;
            state.steps += 1;

            return StepResult {
                reward: self.config.death_penalty,
                terminated: true,
                info: StepInfo {
                    ate_food: false,
                    collision_type: Some(collision_type),
                },
            };
        }

        state.snake.advance(ate_food);
        state.steps += 1;

        let mut reward = self.config.step_penalty;
        let mut terminated = false;

        if ate_food {
            state.score += 1;
            reward += self.config.food_reward;

            match self.spawn_food(state) {
                Some(food) => state.food = food,
                None => {
                    // Board filled: nothing left to eat
                    state.is_alive = false;
                    terminated = true;
                }
            }
        }

        StepResult {
            reward,
            terminated,
            info: StepInfo {
                ate_food,
                collision_type: None,
            },
        }
    }

    fn check_collision(
        &self,
        state: &GameState,
        pos: Position,
        growing: bool,
    ) -> Option<CollisionType> {
        if !state.is_in_bounds(pos) {
            return Some(CollisionType::Wall);
        }

        if state.snake.would_collide(pos, growing) {
            return Some(CollisionType::SelfCollision);
        }

        None
    }

    /// Pick a uniformly random cell not covered by the snake
    fn spawn_food(&mut self, state: &GameState) -> Option<Position> {
        let free = state.free_cells();
        if free.is_empty() {
            return None;
        }
        Some(free[self.rng.gen_range(0..free.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset() {
        let mut engine = GameEngine::new(GameConfig::default());
        let state = engine.reset();

        assert!(state.is_alive);
        assert_eq!(state.score, 0);
        assert_eq!(state.steps, 0);
        assert_eq!(state.snake.len(), 3);
        assert!(!state.is_occupied_by_snake(state.food));
    }

    #[test]
    fn test_seeded_engines_agree() {
        let mut a = GameEngine::with_seed(GameConfig::default(), 7);
        let mut b = GameEngine::with_seed(GameConfig::default(), 7);
        assert_eq!(a.reset().food, b.reset().food);
    }

    #[test]
    fn test_basic_movement() {
        let mut engine = GameEngine::new(GameConfig::default());
        let mut state = engine.reset();
        state.food = Position::new(0, 0);
        let initial_head = state.snake.head();

        let result = engine.step(&mut state, Direction::Right);

        assert!(!result.terminated);
        assert!(!result.info.ate_food);
        assert_eq!(state.steps, 1);
        assert_eq!(state.snake.head(), initial_head.step(Direction::Right));
        assert_eq!(result.reward, engine.config().step_penalty);
    }

    #[test]
    fn test_food_consumption() {
        let mut engine = GameEngine::new(GameConfig::default());
        let mut state = engine.reset();

        let head = state.snake.head();
        state.food = head.step(state.snake.direction);
        let initial_length = state.snake.len();

        let result = engine.step(&mut state, Direction::Right);

        assert!(result.info.ate_food);
        assert_eq!(state.score, 1);
        assert_eq!(state.snake.len(), initial_length + 1);
        assert!(result.reward > 0.0);
        assert!(!state.is_occupied_by_snake(state.food));
    }

    #[test]
    fn test_wall_collision() {
        let mut engine = GameEngine::new(GameConfig::default());
        let mut state = GameState::new(
            Snake::new(Position::new(0, 5), Direction::Left, 3),
            Position::new(5, 5),
            10,
            10,
        );

        let result = engine.step(&mut state, Direction::Left);

        assert!(result.terminated);
        assert!(!state.is_alive);
        assert_eq!(result.reward, engine.config().death_penalty);
        assert_eq!(result.info.collision_type, Some(CollisionType::Wall));
    }

    #[test]
    fn test_self_collision() {
        let mut engine = GameEngine::new(GameConfig::default());

        // (5,5) heading right, body trailing to (1,5)
        let snake = Snake::new(Position::new(5, 5), Direction::Right, 5);
        let mut state = GameState::new(snake, Position::new(8, 8), 10, 10);

        engine.step(&mut state, Direction::Right);
        engine.step(&mut state, Direction::Down);
        engine.step(&mut state, Direction::Left);
        // Head returns to (5,5), which is still part of the body
        let result = engine.step(&mut state, Direction::Up);

        assert!(result.terminated);
        assert_eq!(
            result.info.collision_type,
            Some(CollisionType::SelfCollision)
        );
    }

    #[test]
    fn test_chasing_tail_is_allowed() {
        let mut engine = GameEngine::new(GameConfig::default());

        // Length 4 loop: the head moves into the cell the tail is leaving
        let snake = Snake::new(Position::new(5, 5), Direction::Right, 4);
        let mut state = GameState::new(snake, Position::new(8, 8), 10, 10);

        engine.step(&mut state, Direction::Right);
        engine.step(&mut state, Direction::Down);
        engine.step(&mut state, Direction::Left);
        let result = engine.step(&mut state, Direction::Up);

        assert!(!result.terminated);
        assert!(state.is_alive);
    }

    #[test]
    fn test_prevent_180_degree_turn() {
        let mut engine = GameEngine::new(GameConfig::default());
        let mut state = engine.reset();
        state.food = Position::new(0, 0);

        engine.step(&mut state, Direction::Left);

        assert_eq!(state.snake.direction, Direction::Right);
        assert!(state.is_alive);
    }

    #[test]
    fn test_terminated_game_no_update() {
        let mut engine = GameEngine::new(GameConfig::default());
        let mut state = engine.reset();
        state.is_alive = false;
        let steps_before = state.steps;

        let result = engine.step(&mut state, Direction::Up);

        assert!(result.terminated);
        assert_eq!(result.reward, 0.0);
        assert_eq!(state.steps, steps_before);
    }

    #[test]
    fn test_filling_the_board_ends_the_game() {
        let mut engine = GameEngine::new(GameConfig::new(3, 3));
        // Snake covers 8 of 9 cells, food on the last free cell
        let mut snake = Snake::new(Position::new(1, 0), Direction::Left, 1);
        snake.body = vec![
            Position::new(1, 0),
            Position::new(2, 0),
            Position::new(2, 1),
            Position::new(1, 1),
            Position::new(0, 1),
            Position::new(0, 2),
            Position::new(1, 2),
            Position::new(2, 2),
        ];
        let mut state = GameState::new(snake, Position::new(0, 0), 3, 3);

        let result = engine.step(&mut state, Direction::Left);

        assert!(result.info.ate_food);
        assert!(result.terminated);
        assert!(!state.is_alive);
        assert_eq!(state.score, 1);
    }
}
