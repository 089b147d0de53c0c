//! REINFORCE hyperparameter configuration

use serde::{Deserialize, Serialize};

/// Hyperparameters for REINFORCE training
///
/// Defaults mirror the classic setup for this game: 100 games per batch,
/// 100 batches, undiscounted returns and two stacked frames.
///
/// # Example
///
/// ```rust
/// use pg_snake::rl::ReinforceConfig;
///
/// let config = ReinforceConfig {
///     n_iterations: 20,
///     gamma: 0.95,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReinforceConfig {
    /// Learning rate for the Adam optimizer
    ///
    /// Default: 1e-3
    pub learning_rate: f64,

    /// Discount factor applied to future rewards
    ///
    /// Default: 1.0 (plain sum of remaining rewards)
    pub gamma: f32,

    /// Number of games collected before each gradient step
    ///
    /// Default: 100
    pub batch_size: usize,

    /// Number of gradient steps (batches) to train for
    ///
    /// Default: 100
    pub n_iterations: usize,

    /// Number of consecutive frames fed to the policy
    ///
    /// Default: 2
    pub n_frames: usize,

    /// A game is cut off once it has run for more than this many steps
    ///
    /// Default: 50, so a capped game lasts 51 steps
    pub max_episode_steps: usize,

    /// Log a progress line every N iterations; `None` logs ten times per run
    pub log_every: Option<usize>,

    /// Added to probabilities before taking the log
    ///
    /// Default: 1e-15
    pub epsilon: f32,

    /// Seed for action sampling and food placement; `None` draws from entropy
    pub seed: Option<u64>,
}

impl ReinforceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterations between progress lines
    pub fn log_interval(&self) -> usize {
        self.log_every.unwrap_or(self.n_iterations / 10).max(1)
    }

    /// Validate configuration parameters
    ///
    /// # Example
    ///
    /// ```rust
    /// use pg_snake::rl::ReinforceConfig;
    ///
    /// let mut config = ReinforceConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.n_frames = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            ));
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must be in [0, 1], got {}", self.gamma));
        }

        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }

        if self.n_iterations == 0 {
            return Err("n_iterations must be at least 1".to_string());
        }

        if self.n_frames == 0 {
            return Err("n_frames must be at least 1".to_string());
        }

        if self.max_episode_steps == 0 {
            return Err("max_episode_steps must be at least 1".to_string());
        }

        if self.log_every == Some(0) {
            return Err("log_every must be at least 1".to_string());
        }

        if !(self.epsilon > 0.0 && self.epsilon < 1e-3) {
            return Err(format!(
                "epsilon must be in (0, 1e-3), got {}",
                self.epsilon
            ));
        }

        Ok(())
    }
}

impl Default for ReinforceConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 1.0,
            batch_size: 100,
            n_iterations: 100,
            n_frames: 2,
            max_episode_steps: 50,
            log_every: None,
            epsilon: 1e-15,
            seed: None,
        }
    }
}
