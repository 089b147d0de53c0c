//! REINFORCE agent
//!
//! Samples actions from the policy during play and, once a batch of games is
//! complete, takes a single Adam step on
//!
//! ```text
//! L = -Σ_i A_i · log(π(a_i | s_i) + ε)
//! ```
//!
//! where `a_i` is the action actually played at step `i` and `A_i` its
//! normalized discounted return. Minimizing `L` raises the probability of
//! actions that did better than the batch average and lowers the rest.

use anyhow::{Result, anyhow};
use burn::{
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{ElementConversion, Tensor, backend::AutodiffBackend, backend::Backend},
};
use rand::{Rng, SeedableRng, distributions::Standard, rngs::StdRng};
use tracing::debug;

use super::batch::EpisodeBatch;
use super::config::ReinforceConfig;
use super::frames::stacks_to_tensor;
use super::policy::{Policy, PolicyConfig};

/// Batch policy-gradient loss
///
/// # Arguments
///
/// * `probs` - Action probabilities `[batch, num_actions]`
/// * `targets` - One-hot played actions `[batch, num_actions]`
/// * `advantages` - Normalized returns `[batch]`
/// * `epsilon` - Added inside the log so zero probabilities stay finite
///
/// # Returns
///
/// Scalar loss tensor of shape `[1]`
pub fn policy_loss<B: Backend>(
    probs: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    advantages: Tensor<B, 1>,
    epsilon: f32,
) -> Tensor<B, 1> {
    let log_probs = probs.add_scalar(epsilon).log();
    let played = (targets * log_probs).sum_dim(1).squeeze::<1>(1);

    (played * advantages).sum().neg()
}

/// Policy-gradient learner wrapping a [`Policy`] and its optimizer
///
/// # Type Parameters
///
/// * `B` - Autodiff backend for gradient computation
/// * `M` - Policy architecture
pub struct ReinforceAgent<B, M>
where
    B: AutodiffBackend,
    M: Policy<B> + AutodiffModule<B>,
    M::InnerModule: Policy<B::InnerBackend>,
{
    policy: M,

    /// Gradient-free copy of `policy` used for acting, refreshed after each update
    inference: M::InnerModule,

    optim: OptimizerAdaptor<Adam, M, B>,

    config: ReinforceConfig,

    policy_config: PolicyConfig,

    /// Source of randomness for action sampling
    rng: StdRng,

    device: B::Device,

    /// Gradient steps taken
    iterations: usize,

    /// Games played while training
    episodes: usize,
}

impl<B, M> ReinforceAgent<B, M>
where
    B: AutodiffBackend,
    M: Policy<B> + AutodiffModule<B>,
    M::InnerModule: Policy<B::InnerBackend>,
{
    /// Create an agent with a freshly initialized policy
    pub fn new(
        policy_config: PolicyConfig,
        config: ReinforceConfig,
        device: B::Device,
    ) -> Result<Self> {
        policy_config
            .validate()
            .map_err(|e| anyhow!("invalid policy configuration: {e}"))?;
        let policy = M::init(&policy_config, &device);
        Self::from_policy(policy, policy_config, config, device)
    }

    /// Continue training an existing policy
    pub fn from_policy(
        policy: M,
        policy_config: PolicyConfig,
        config: ReinforceConfig,
        device: B::Device,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("invalid REINFORCE configuration: {e}"))?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            inference: policy.valid(),
            policy,
            optim: AdamConfig::new().init(),
            config,
            policy_config,
            rng,
            device,
            iterations: 0,
            episodes: 0,
        })
    }

    /// Action probabilities for one frame stack, without tracking gradients
    pub fn action_probabilities(&self, stack: &[f32]) -> Result<Vec<f32>> {
        let shape = [
            self.policy_config.n_frames,
            self.policy_config.grid_height,
            self.policy_config.grid_width,
        ];
        let frames = stacks_to_tensor::<B::InnerBackend>(stack.to_vec(), shape, &self.device);

        let probs = self.inference.forward(frames);
        probs
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("failed to read action probabilities: {e:?}"))
    }

    /// Sample an action index from the policy's distribution
    pub fn select_action(&mut self, stack: &[f32]) -> Result<usize> {
        let probs = self.action_probabilities(stack)?;
        Ok(sample_categorical(&probs, &mut self.rng))
    }

    /// One gradient step on a batch of finished games
    ///
    /// # Returns
    ///
    /// The loss before the step, or 0.0 if the batch holds no finished steps
    pub fn update(&mut self, batch: &EpisodeBatch) -> f32 {
        if batch.returns().is_empty() {
            return 0.0;
        }

        let (frames, targets, advantages) = batch.to_tensors::<B>(&self.device);

        let probs = self.policy.forward(frames);
        let loss = policy_loss(probs, targets, advantages, self.config.epsilon);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.policy);
        self.policy = self
            .optim
            .step(self.config.learning_rate, self.policy.clone(), grads);
        self.inference = self.policy.valid();

        self.iterations += 1;
        debug!(
            iteration = self.iterations,
            steps = batch.returns().len(),
            loss = loss_value,
            "policy updated"
        );

        loss_value
    }

    pub fn policy(&self) -> &M {
        &self.policy
    }

    pub fn config(&self) -> &ReinforceConfig {
        &self.config
    }

    pub fn policy_config(&self) -> &PolicyConfig {
        &self.policy_config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Gradient steps taken so far
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Games played so far
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    pub fn increment_episode(&mut self) {
        self.episodes += 1;
    }
}

/// Draw an index from a probability vector
///
/// Falls back to the last index if rounding leaves the cumulative sum short
/// of the random draw.
pub fn sample_categorical<R: Rng>(probs: &[f32], rng: &mut R) -> usize {
    let draw: f32 = rng.sample(Standard);
    let mut cumsum = 0.0;

    for (idx, &prob) in probs.iter().enumerate() {
        cumsum += prob;
        if draw < cumsum {
            return idx;
        }
    }

    probs.len().saturating_sub(1)
}

/// Index of the most probable action
pub fn greedy_action(probs: &[f32]) -> usize {
    probs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::NUM_ACTIONS;
    use crate::rl::{FullyConnectedPolicy, InferenceBackend, TrainingBackend, default_device};

    type TestAgent = ReinforceAgent<TrainingBackend, FullyConnectedPolicy<TrainingBackend>>;

    fn test_config() -> ReinforceConfig {
        ReinforceConfig {
            learning_rate: 1e-2,
            seed: Some(3),
            ..Default::default()
        }
    }

    fn create_test_agent() -> TestAgent {
        TestAgent::new(PolicyConfig::new(2, 4, 4), test_config(), default_device()).unwrap()
    }

    #[test]
    fn test_agent_creation() {
        let agent = create_test_agent();
        assert_eq!(agent.iterations(), 0);
        assert_eq!(agent.episodes(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ReinforceConfig {
            batch_size: 0,
            ..Default::default()
        };
        let result = TestAgent::new(PolicyConfig::new(2, 4, 4), config, default_device());
        assert!(result.is_err());
    }

    #[test]
    fn test_action_probabilities_form_distribution() {
        let agent = create_test_agent();
        let probs = agent.action_probabilities(&[0.0; 32]).unwrap();

        assert_eq!(probs.len(), NUM_ACTIONS);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_select_action_in_range() {
        let mut agent = create_test_agent();
        for _ in 0..20 {
            assert!(agent.select_action(&[0.5; 32]).unwrap() < NUM_ACTIONS);
        }
    }

    #[test]
    fn test_sample_categorical_respects_certain_outcomes() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..50 {
            assert_eq!(sample_categorical(&[0.0, 0.0, 1.0, 0.0], &mut rng), 2);
        }
    }

    #[test]
    fn test_sample_categorical_covers_support() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = [false; 4];
        for _ in 0..500 {
            seen[sample_categorical(&[0.25; 4], &mut rng)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_greedy_action() {
        assert_eq!(greedy_action(&[0.1, 0.6, 0.2, 0.1]), 1);
        assert_eq!(greedy_action(&[0.1, 0.2, 0.3, 0.4]), 3);
        assert_eq!(greedy_action(&[]), 0);
    }

    #[test]
    fn test_policy_loss_sign() {
        let device = default_device();
        let probs = Tensor::<InferenceBackend, 2>::from_floats(
            [[0.5, 0.5, 0.0, 0.0], [0.25, 0.25, 0.25, 0.25]],
            &device,
        );
        let targets = Tensor::<InferenceBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]],
            &device,
        );
        let advantages = Tensor::<InferenceBackend, 1>::from_floats([1.0, -1.0], &device);

        let loss: f32 = policy_loss(probs, targets, advantages, 1e-15)
            .into_scalar()
            .elem();

        // -(1 * ln 0.5 + (-1) * ln 0.25) = ln 0.5 - ln 0.25 = ln 2
        assert!((loss - 2.0f32.ln()).abs() < 1e-5, "loss was {}", loss);
    }

    #[test]
    fn test_policy_loss_handles_zero_probability() {
        let device = default_device();
        let probs = Tensor::<InferenceBackend, 2>::from_floats([[1.0, 0.0, 0.0, 0.0]], &device);
        let targets = Tensor::<InferenceBackend, 2>::from_floats([[0.0, 1.0, 0.0, 0.0]], &device);
        let advantages = Tensor::<InferenceBackend, 1>::from_floats([1.0], &device);

        let loss: f32 = policy_loss(probs, targets, advantages, 1e-15)
            .into_scalar()
            .elem();
        assert!(loss.is_finite());
    }

    #[test]
    fn test_acting_model_follows_updates() {
        let mut agent = create_test_agent();
        let stack = [1.0f32; 32];

        let mut batch = EpisodeBatch::new([2, 4, 4]);
        batch.push_step(&stack, 2, 1.0, false);
        batch.finish_episode(1.0);
        batch.push_step(&[-1.0; 32], 1, -1.0, false);
        batch.finish_episode(1.0);
        agent.update(&batch);

        let cached = agent.action_probabilities(&stack).unwrap();
        let frames =
            stacks_to_tensor::<InferenceBackend>(stack.to_vec(), [2, 4, 4], agent.device());
        let fresh: Vec<f32> = agent
            .policy()
            .valid()
            .forward(frames)
            .into_data()
            .to_vec()
            .unwrap();

        for (a, b) in cached.iter().zip(&fresh) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_empty_batch_update_is_noop() {
        let mut agent = create_test_agent();
        let batch = EpisodeBatch::new([2, 4, 4]);

        assert_eq!(agent.update(&batch), 0.0);
        assert_eq!(agent.iterations(), 0);
    }

    #[test]
    fn test_update_moves_probability_toward_advantaged_action() {
        let mut agent = create_test_agent();
        let good = [1.0f32; 32];
        let bad = [-1.0f32; 32];

        let before_good = agent.action_probabilities(&good).unwrap()[0];
        let before_bad = agent.action_probabilities(&bad).unwrap()[0];

        // Action 0 pays off from the first state and hurts from the second
        let mut batch = EpisodeBatch::new([2, 4, 4]);
        batch.push_step(&good, 0, 1.0, false);
        batch.finish_episode(1.0);
        batch.push_step(&bad, 0, -1.0, false);
        batch.finish_episode(1.0);

        for _ in 0..5 {
            let loss = agent.update(&batch);
            assert!(loss.is_finite());
        }

        let after_good = agent.action_probabilities(&good).unwrap()[0];
        let after_bad = agent.action_probabilities(&bad).unwrap()[0];

        assert_eq!(agent.iterations(), 5);
        assert!(after_good > before_good, "{} -> {}", before_good, after_good);
        assert!(after_bad < before_bad, "{} -> {}", before_bad, after_bad);
    }
}
