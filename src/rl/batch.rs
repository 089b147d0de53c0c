//! Trajectory storage for REINFORCE updates
//!
//! An [`EpisodeBatch`] accumulates every step of `batch_size` complete games:
//! the frame stack the policy saw, the action it sampled and the discounted
//! return that followed. Returns are only known once an episode ends, so
//! rewards are held per episode until [`EpisodeBatch::finish_episode`].

use burn::tensor::{Tensor, TensorData, backend::Backend};

use crate::game::NUM_ACTIONS;

/// Discounted return for every step of one episode
///
/// ```text
/// R_t = r_t + γ * R_{t+1},    R_T = r_T
/// ```
///
/// # Example
///
/// ```rust
/// use pg_snake::rl::discount_rewards;
///
/// let returns = discount_rewards(&[1.0, 1.0, 1.0], 0.5);
/// assert_eq!(returns, vec![1.75, 1.5, 1.0]);
/// ```
pub fn discount_rewards(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;

    for t in (0..rewards.len()).rev() {
        running = rewards[t] + gamma * running;
        returns[t] = running;
    }

    returns
}

/// Shift to zero mean and, when there is any spread, scale to unit variance
///
/// Uses the population standard deviation. Constant input comes back as all
/// zeros rather than NaN.
pub fn normalize_advantages(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let centered: Vec<f32> = values.iter().map(|v| v - mean).collect();
    let std = (centered.iter().map(|c| c * c).sum::<f32>() / n).sqrt();

    if std == 0.0 {
        centered
    } else {
        centered.into_iter().map(|c| c / std).collect()
    }
}

/// Steps from a batch of whole games, ready for one gradient step
#[derive(Debug, Clone)]
pub struct EpisodeBatch {
    /// Shape of one frame stack `[n_frames, height, width]`
    stack_shape: [usize; 3],

    /// Flattened frame stacks, one per step
    stacks: Vec<f32>,

    /// Sampled action index per step
    actions: Vec<usize>,

    /// Discounted return per step (filled per finished episode)
    returns: Vec<f32>,

    /// Rewards of the episode still in progress
    running_rewards: Vec<f32>,

    /// Fruits eaten in the episode still in progress
    running_fruits: u32,

    /// Steps survived by each finished episode
    lifetimes: Vec<usize>,

    /// Fruits eaten across finished episodes
    fruits: u32,
}

impl EpisodeBatch {
    pub fn new(stack_shape: [usize; 3]) -> Self {
        Self {
            stack_shape,
            stacks: Vec::new(),
            actions: Vec::new(),
            returns: Vec::new(),
            running_rewards: Vec::new(),
            running_fruits: 0,
            lifetimes: Vec::new(),
            fruits: 0,
        }
    }

    /// Record one step of the current episode
    pub fn push_step(&mut self, stack: &[f32], action: usize, reward: f32, ate_food: bool) {
        debug_assert_eq!(stack.len(), self.stack_len());
        debug_assert!(action < NUM_ACTIONS);

        self.stacks.extend_from_slice(stack);
        self.actions.push(action);
        self.running_rewards.push(reward);
        if ate_food {
            self.running_fruits += 1;
        }
    }

    /// Close the current episode, discounting its rewards into returns
    pub fn finish_episode(&mut self, gamma: f32) {
        let rewards = std::mem::take(&mut self.running_rewards);
        self.returns.extend(discount_rewards(&rewards, gamma));
        self.lifetimes.push(rewards.len());
        self.fruits += std::mem::take(&mut self.running_fruits);
    }

    /// Number of finished games
    pub fn games(&self) -> usize {
        self.lifetimes.len()
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Fruits eaten across finished games
    pub fn fruits(&self) -> u32 {
        self.fruits
    }

    /// Mean number of steps survived per finished game
    pub fn mean_lifetime(&self) -> f32 {
        if self.lifetimes.is_empty() {
            return 0.0;
        }
        self.lifetimes.iter().sum::<usize>() as f32 / self.lifetimes.len() as f32
    }

    /// Mean discounted return over all finished steps, before normalization
    pub fn mean_return(&self) -> f32 {
        if self.returns.is_empty() {
            return 0.0;
        }
        self.returns.iter().sum::<f32>() / self.returns.len() as f32
    }

    /// Raw discounted returns of finished steps
    pub fn returns(&self) -> &[f32] {
        &self.returns
    }

    pub fn actions(&self) -> &[usize] {
        &self.actions
    }

    /// Normalized returns used to weight the policy update
    pub fn advantages(&self) -> Vec<f32> {
        normalize_advantages(&self.returns)
    }

    pub fn stack_shape(&self) -> [usize; 3] {
        self.stack_shape
    }

    fn stack_len(&self) -> usize {
        self.stack_shape.iter().product()
    }

    /// Build the update tensors
    ///
    /// Only steps of finished episodes are included.
    ///
    /// # Returns
    ///
    /// - frame stacks: `[steps, n_frames, height, width]`
    /// - one-hot played actions: `[steps, NUM_ACTIONS]`
    /// - advantages: `[steps]`
    pub fn to_tensors<B: Backend>(
        &self,
        device: &B::Device,
    ) -> (Tensor<B, 4>, Tensor<B, 2>, Tensor<B, 1>) {
        let steps = self.returns.len();
        let [n_frames, height, width] = self.stack_shape;

        let stacks = self.stacks[..steps * self.stack_len()].to_vec();
        let frames = Tensor::from_data(
            TensorData::new(stacks, [steps, n_frames, height, width]),
            device,
        );

        let mut one_hot = vec![0.0f32; steps * NUM_ACTIONS];
        for (i, &action) in self.actions[..steps].iter().enumerate() {
            one_hot[i * NUM_ACTIONS + action] = 1.0;
        }
        let targets = Tensor::from_data(TensorData::new(one_hot, [steps, NUM_ACTIONS]), device);

        let advantages = Tensor::from_data(TensorData::new(self.advantages(), [steps]), device);

        (frames, targets, advantages)
    }

    /// Drop everything for the next batch
    pub fn clear(&mut self) {
        self.stacks.clear();
        self.actions.clear();
        self.returns.clear();
        self.running_rewards.clear();
        self.running_fruits = 0;
        self.lifetimes.clear();
        self.fruits = 0;
    }
}
