//! Frame producer and frame stacking
//!
//! A frame is a single-channel `[height, width]` picture of the board. The
//! policy sees the last `n_frames` of them stacked channel-first, so it can
//! infer the direction of travel.

use std::collections::VecDeque;

use burn::tensor::{Tensor, TensorData, backend::Backend};

use crate::game::GameState;

/// Cell value for the snake head
pub const HEAD_VALUE: f32 = 1.0;
/// Cell value for the rest of the snake
pub const BODY_VALUE: f32 = 0.5;
/// Cell value for food
pub const FOOD_VALUE: f32 = -1.0;

/// Render the board as a row-major `[height, width]` frame
///
/// Empty cells are 0. Positions outside the grid (a head that just left the
/// board on a losing move) are not drawn.
pub fn render_frame(state: &GameState) -> Vec<f32> {
    let mut frame = vec![0.0; state.grid_height * state.grid_width];

    if state.is_in_bounds(state.food) {
        frame[state.food.cell_index(state.grid_width)] = FOOD_VALUE;
    }

    for &pos in state.snake.body_segments() {
        if state.is_in_bounds(pos) {
            frame[pos.cell_index(state.grid_width)] = BODY_VALUE;
        }
    }

    let head = state.snake.head();
    if state.is_in_bounds(head) {
        frame[head.cell_index(state.grid_width)] = HEAD_VALUE;
    }

    frame
}

/// Rolling window over the most recent frames of an episode
#[derive(Debug, Clone)]
pub struct FrameHistory {
    frames: VecDeque<Vec<f32>>,
    n_frames: usize,
    height: usize,
    width: usize,
}

impl FrameHistory {
    /// Create a history already padded for the start of an episode
    pub fn new(n_frames: usize, height: usize, width: usize) -> Self {
        let mut history = Self {
            frames: VecDeque::with_capacity(n_frames),
            n_frames,
            height,
            width,
        };
        history.reset();
        history
    }

    /// Start a new episode: `n_frames - 1` blank frames precede the first real one
    pub fn reset(&mut self) {
        self.frames.clear();
        for _ in 1..self.n_frames {
            self.frames.push_back(vec![0.0; self.frame_len()]);
        }
    }

    /// Append a frame, dropping the oldest once the window is full
    pub fn push(&mut self, frame: Vec<f32>) {
        debug_assert_eq!(frame.len(), self.frame_len());
        if self.frames.len() == self.n_frames {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Last `n_frames` frames, oldest first, flattened to `[n_frames, height, width]`
    ///
    /// Before the first `push` after a reset the newest slot is blank.
    pub fn stacked(&self) -> Vec<f32> {
        let mut stack = Vec::with_capacity(self.stack_len());
        for _ in self.frames.len()..self.n_frames {
            stack.extend(std::iter::repeat_n(0.0, self.frame_len()));
        }
        for frame in &self.frames {
            stack.extend_from_slice(frame);
        }
        stack
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Number of values in one frame
    pub fn frame_len(&self) -> usize {
        self.height * self.width
    }

    /// Number of values in one stacked observation
    pub fn stack_len(&self) -> usize {
        self.n_frames * self.frame_len()
    }

    /// Shape of one stacked observation as the policy expects it
    pub fn stack_shape(&self) -> [usize; 3] {
        [self.n_frames, self.height, self.width]
    }
}

/// Turn a batch of flattened stacks into a `[batch, n_frames, height, width]` tensor
pub fn stacks_to_tensor<B: Backend>(
    stacks: Vec<f32>,
    shape: [usize; 3],
    device: &B::Device,
) -> Tensor<B, 4> {
    let [n_frames, height, width] = shape;
    let batch = stacks.len() / (n_frames * height * width);
    Tensor::from_data(
        TensorData::new(stacks, [batch, n_frames, height, width]),
        device,
    )
}
