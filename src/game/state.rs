use super::action::Direction;

/// A cell on the game grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position one cell away in `direction`
    pub fn step(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Row-major index into a grid of the given width
    ///
    /// Only meaningful for in-bounds positions.
    pub fn cell_index(&self, grid_width: usize) -> usize {
        self.y as usize * grid_width + self.x as usize
    }
}

/// The snake, head first
#[derive(Debug, Clone, PartialEq)]
pub struct Snake {
    /// Segments with the head at index 0
    pub body: Vec<Position>,
    /// Current heading
    pub direction: Direction,
}

impl Snake {
    /// Lay out a snake of `length` cells trailing straight behind `head`
    pub fn new(head: Position, direction: Direction, length: usize) -> Self {
        let behind = match direction {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        };

        let mut body = Vec::with_capacity(length.max(1));
        let mut cell = head;
        body.push(cell);
        for _ in 1..length {
            cell = cell.step(behind);
            body.push(cell);
        }

        Self { body, direction }
    }

    pub fn head(&self) -> Position {
        self.body[0]
    }

    /// Segments after the head
    pub fn body_segments(&self) -> &[Position] {
        &self.body[1..]
    }

    /// Whether moving the head onto `pos` would hit the body
    ///
    /// The tail cell is free unless the snake is growing this step, because
    /// it moves away at the same time as the head moves in.
    pub fn would_collide(&self, pos: Position, growing: bool) -> bool {
        let segments = self.body_segments();
        let checked = if growing || segments.is_empty() {
            segments
        } else {
            &segments[..segments.len() - 1]
        };
        checked.contains(&pos)
    }

    /// Advance one cell in the current direction, keeping the tail when growing
    pub fn advance(&mut self, grow: bool) {
        let new_head = self.head().step(self.direction);
        self.body.insert(0, new_head);

        if !grow {
            self.body.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// What ended a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionType {
    Wall,
    SelfCollision,
}

/// Complete game state
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub snake: Snake,
    pub food: Position,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Food eaten so far
    pub score: u32,
    pub steps: u32,
    pub is_alive: bool,
}

impl GameState {
    pub fn new(snake: Snake, food: Position, grid_width: usize, grid_height: usize) -> Self {
        Self {
            snake,
            food,
            grid_width,
            grid_height,
            score: 0,
            steps: 0,
            is_alive: true,
        }
    }

    pub fn is_in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0
            && pos.x < self.grid_width as i32
            && pos.y >= 0
            && pos.y < self.grid_height as i32
    }

    pub fn is_occupied_by_snake(&self, pos: Position) -> bool {
        self.snake.body.contains(&pos)
    }

    /// Cells not covered by the snake, in row-major order
    pub fn free_cells(&self) -> Vec<Position> {
        (0..self.grid_height as i32)
            .flat_map(|y| (0..self.grid_width as i32).map(move |x| Position::new(x, y)))
            .filter(|pos| !self.is_occupied_by_snake(*pos))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_step() {
        let pos = Position::new(5, 5);
        assert_eq!(pos.step(Direction::Right), Position::new(6, 5));
        assert_eq!(pos.step(Direction::Left), Position::new(4, 5));
        assert_eq!(pos.step(Direction::Down), Position::new(5, 6));
        assert_eq!(pos.step(Direction::Up), Position::new(5, 4));
        assert_eq!(Position::new(3, 2).cell_index(10), 23);
    }

    #[test]
    fn test_snake_layout() {
        let snake = Snake::new(Position::new(5, 5), Direction::Right, 3);
        assert_eq!(snake.len(), 3);
        assert_eq!(snake.head(), Position::new(5, 5));
        assert_eq!(snake.body[1], Position::new(4, 5));
        assert_eq!(snake.body[2], Position::new(3, 5));
    }

    #[test]
    fn test_snake_advance() {
        let mut snake = Snake::new(Position::new(5, 5), Direction::Right, 3);

        snake.advance(false);
        assert_eq!(snake.len(), 3);
        assert_eq!(snake.head(), Position::new(6, 5));

        snake.advance(true);
        assert_eq!(snake.len(), 4);
        assert_eq!(snake.head(), Position::new(7, 5));
    }

    #[test]
    fn test_tail_cell_is_free_unless_growing() {
        let snake = Snake::new(Position::new(5, 5), Direction::Right, 4);
        let tail = Position::new(2, 5);

        assert!(!snake.would_collide(tail, false));
        assert!(snake.would_collide(tail, true));
        assert!(snake.would_collide(Position::new(4, 5), false));
        assert!(!snake.would_collide(Position::new(5, 5), false));
    }

    #[test]
    fn test_bounds_and_free_cells() {
        let state = GameState::new(
            Snake::new(Position::new(2, 1), Direction::Right, 3),
            Position::new(0, 0),
            4,
            3,
        );

        assert!(state.is_in_bounds(Position::new(0, 0)));
        assert!(state.is_in_bounds(Position::new(3, 2)));
        assert!(!state.is_in_bounds(Position::new(-1, 0)));
        assert!(!state.is_in_bounds(Position::new(4, 0)));
        assert!(!state.is_in_bounds(Position::new(0, 3)));

        let free = state.free_cells();
        assert_eq!(free.len(), 4 * 3 - 3);
        assert!(!free.contains(&Position::new(1, 1)));
    }
}
