//! Training mode for the REINFORCE agent
//!
//! Plays whole games with the current policy, collects them into batches of
//! `batch_size` games and takes one gradient step per batch. When all
//! iterations are done the weights and the two learning curves are written
//! out.
//!
//! # Example
//!
//! ```rust,ignore
//! use pg_snake::modes::{TrainConfig, TrainMode};
//! use pg_snake::game::GameConfig;
//! use pg_snake::rl::{default_device, FullyConnectedPolicy, ReinforceConfig, TrainingBackend};
//!
//! let config = TrainConfig::new(GameConfig::default(), ReinforceConfig::default());
//! let mut train_mode =
//!     TrainMode::<TrainingBackend, FullyConnectedPolicy<TrainingBackend>>::new(config, default_device())?;
//! train_mode.run()?;
//! ```

use anyhow::{Context, Result, anyhow};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use crate::config::AppConfig;
use crate::game::{Direction, GameConfig, GameEngine};
use crate::metrics::{TrainingStats, export_curve};
use crate::rl::{
    EpisodeBatch, FrameHistory, ModelMetadata, Policy, PolicyConfig, ReinforceAgent,
    ReinforceConfig, render_frame, save_policy, weights_path,
};

/// Configuration for training mode
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Grid size and rewards
    pub game_config: GameConfig,

    /// REINFORCE hyperparameters
    pub reinforce: ReinforceConfig,

    /// Policy input and layer sizes
    pub policy: PolicyConfig,

    /// Directory receiving the trained weights
    pub weights_dir: PathBuf,

    /// Directory receiving the learning curves
    pub graphs_dir: PathBuf,
}

impl TrainConfig {
    /// Training configuration with default policy sizes and output directories
    ///
    /// # Example
    ///
    /// ```rust
    /// use pg_snake::game::GameConfig;
    /// use pg_snake::modes::TrainConfig;
    /// use pg_snake::rl::ReinforceConfig;
    ///
    /// let config = TrainConfig::new(GameConfig::new(8, 8), ReinforceConfig::default());
    /// assert_eq!(config.policy.input_len(), 2 * 8 * 8);
    /// ```
    pub fn new(game_config: GameConfig, reinforce: ReinforceConfig) -> Self {
        let policy = PolicyConfig::new(
            reinforce.n_frames,
            game_config.grid_height,
            game_config.grid_width,
        );
        Self {
            game_config,
            reinforce,
            policy,
            weights_dir: PathBuf::from("weights"),
            graphs_dir: PathBuf::from("graphs"),
        }
    }

    pub fn from_app_config(app: &AppConfig) -> Self {
        Self {
            game_config: app.game.clone(),
            reinforce: app.reinforce.clone(),
            policy: app.policy_config(),
            weights_dir: app.paths.weights_dir.clone(),
            graphs_dir: app.paths.graphs_dir.clone(),
        }
    }
}

/// Training mode for the REINFORCE agent
pub struct TrainMode<B, M>
where
    B: AutodiffBackend,
    M: Policy<B> + AutodiffModule<B>,
    M::InnerModule: Policy<B::InnerBackend>,
{
    agent: ReinforceAgent<B, M>,

    engine: GameEngine,

    history: FrameHistory,

    /// Games collected since the last update
    batch: EpisodeBatch,

    stats: TrainingStats,

    config: TrainConfig,
}

impl<B, M> TrainMode<B, M>
where
    B: AutodiffBackend,
    M: Policy<B> + AutodiffModule<B>,
    M::InnerModule: Policy<B::InnerBackend>,
{
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self> {
        config
            .game_config
            .validate()
            .map_err(|e| anyhow!("invalid game configuration: {e}"))?;

        let agent = ReinforceAgent::new(config.policy.clone(), config.reinforce.clone(), device)?;

        let engine = match config.reinforce.seed {
            Some(seed) => GameEngine::with_seed(config.game_config.clone(), seed),
            None => GameEngine::new(config.game_config.clone()),
        };

        let history = FrameHistory::new(
            config.reinforce.n_frames,
            config.game_config.grid_height,
            config.game_config.grid_width,
        );
        let batch = EpisodeBatch::new(history.stack_shape());

        Ok(Self {
            agent,
            engine,
            history,
            batch,
            stats: TrainingStats::new(),
            config,
        })
    }

    /// Run every iteration, then save weights and learning curves
    pub fn run(&mut self) -> Result<()> {
        self.log_header();

        let start = Instant::now();
        let log_interval = self.config.reinforce.log_interval();

        while self.stats.iterations() < self.config.reinforce.n_iterations {
            self.run_episode()?;

            if self.batch.games() >= self.config.reinforce.batch_size {
                self.apply_batch();

                if self.stats.iterations() % log_interval == 0 {
                    info!("{}", self.stats.format_progress(start.elapsed().as_secs()));
                }
            }
        }

        let path = self.save_weights()?;
        self.export_curves()?;

        info!(path = %path.display(), "Training complete");
        info!("{}", self.stats.format_summary());

        Ok(())
    }

    /// Play one game with the sampling policy and add it to the batch
    ///
    /// # Returns
    ///
    /// Steps survived; a game still alive after `max_episode_steps` steps
    /// gets one more before it is cut off
    fn run_episode(&mut self) -> Result<usize> {
        let mut state = self.engine.reset();
        self.history.reset();

        let max_steps = self.config.reinforce.max_episode_steps;
        let mut steps = 0;

        loop {
            self.history.push(render_frame(&state));
            let stack = self.history.stacked();

            let action = self.agent.select_action(&stack)?;
            let direction = Direction::from_index(action)
                .ok_or_else(|| anyhow!("policy produced invalid action {action}"))?;

            let result = self.engine.step(&mut state, direction);
            self.batch
                .push_step(&stack, action, result.reward, result.info.ate_food);
            steps += 1;

            if result.terminated || steps > max_steps {
                break;
            }
        }

        self.batch.finish_episode(self.config.reinforce.gamma);
        self.agent.increment_episode();

        Ok(steps)
    }

    /// Record the batch, update the policy and start a new batch
    fn apply_batch(&mut self) {
        let avg_lifetime = self.batch.mean_lifetime();
        let avg_reward = self.batch.mean_return();
        let fruits = self.batch.fruits();
        let games = self.batch.games();

        let loss = self.agent.update(&self.batch);

        self.stats
            .record_batch(games, avg_lifetime, avg_reward, fruits, loss);
        self.batch.clear();
    }

    fn save_weights(&self) -> Result<PathBuf> {
        let policy = self.agent.policy().valid();
        let metadata = ModelMetadata::new::<B::InnerBackend, M::InnerModule>(
            &policy,
            self.config.policy.clone(),
            self.agent.iterations(),
            self.agent.episodes(),
        )?;

        let path = weights_path(&self.config.weights_dir, M::NAME);
        save_policy::<B::InnerBackend, M::InnerModule>(&policy, &metadata, &path)
            .with_context(|| format!("Failed to save trained weights to {:?}", path))?;

        Ok(path)
    }

    fn export_curves(&self) -> Result<()> {
        let graphs_dir = &self.config.graphs_dir;

        export_curve(
            &graphs_dir.join(format!("average_lifetime_{}.csv", M::NAME)),
            "average_lifetime",
            &self.stats.avg_lifetimes(),
        )?;
        export_curve(
            &graphs_dir.join(format!("average_reward_{}.csv", M::NAME)),
            "average_reward",
            &self.stats.avg_rewards(),
        )?;

        Ok(())
    }

    fn log_header(&self) {
        let game = &self.config.game_config;
        let rl = &self.config.reinforce;

        info!(
            model = M::NAME,
            grid = %format!("{}x{}", game.grid_width, game.grid_height),
            "Starting REINFORCE training"
        );
        info!(
            iterations = rl.n_iterations,
            batch_size = rl.batch_size,
            learning_rate = rl.learning_rate,
            gamma = rl.gamma,
            n_frames = rl.n_frames,
            max_steps = rl.max_episode_steps,
            "Hyperparameters"
        );
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn agent(&self) -> &ReinforceAgent<B, M> {
        &self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{FullyConnectedPolicy, TrainingBackend, default_device};
    use tempfile::TempDir;

    type Fc = FullyConnectedPolicy<TrainingBackend>;

    fn small_config(temp_dir: &TempDir) -> TrainConfig {
        let mut reinforce = ReinforceConfig::default();
        reinforce.batch_size = 3;
        reinforce.n_iterations = 4;
        reinforce.max_episode_steps = 12;
        reinforce.seed = Some(7);

        let mut config = TrainConfig::new(GameConfig::new(5, 5), reinforce);
        config.policy.hidden_dims = [16, 8];
        config.weights_dir = temp_dir.path().join("weights");
        config.graphs_dir = temp_dir.path().join("graphs");
        config
    }

    #[test]
    fn test_train_config_creation() {
        let config = TrainConfig::new(GameConfig::new(6, 4), ReinforceConfig::default());
        assert_eq!(config.policy.n_frames, 2);
        assert_eq!(config.policy.grid_height, 4);
        assert_eq!(config.policy.grid_width, 6);
        assert_eq!(config.weights_dir, PathBuf::from("weights"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = TrainConfig::new(GameConfig::new(5, 5), ReinforceConfig::default());
        config.reinforce.gamma = 1.5;

        let result = TrainMode::<TrainingBackend, Fc>::new(config, default_device());
        assert!(result.is_err());
    }

    #[test]
    fn test_episode_respects_step_cap() {
        let temp_dir = TempDir::new().unwrap();
        let config = small_config(&temp_dir);
        let mut train_mode = TrainMode::<TrainingBackend, Fc>::new(config, default_device()).unwrap();

        for _ in 0..5 {
            let steps = train_mode.run_episode().unwrap();
            assert!(steps >= 1);
            assert!(steps <= 13);
        }
        assert_eq!(train_mode.batch.games(), 5);
        assert_eq!(train_mode.agent().episodes(), 5);
    }

    #[test]
    fn test_capped_game_runs_one_step_past_the_limit() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = small_config(&temp_dir);
        // Two steps from the centre of a 12x12 board can never end the game
        config.game_config = GameConfig::new(12, 12);
        config.policy = config.policy.with_input(2, 12, 12);
        config.reinforce.max_episode_steps = 1;
        let mut train_mode = TrainMode::<TrainingBackend, Fc>::new(config, default_device()).unwrap();

        for _ in 0..3 {
            assert_eq!(train_mode.run_episode().unwrap(), 2);
        }
        assert_eq!(train_mode.batch.mean_lifetime(), 2.0);
    }

    #[test]
    fn test_run_produces_history_weights_and_curves() {
        let temp_dir = TempDir::new().unwrap();
        let config = small_config(&temp_dir);
        let mut train_mode = TrainMode::<TrainingBackend, Fc>::new(config, default_device()).unwrap();

        train_mode.run().unwrap();

        let stats = train_mode.stats();
        assert_eq!(stats.iterations(), 4);
        assert_eq!(stats.total_games(), 12);
        assert_eq!(train_mode.agent().iterations(), 4);
        assert!(stats.avg_lifetimes().iter().all(|&l| (1.0..=13.0).contains(&l)));

        let weights = weights_path(&temp_dir.path().join("weights"), "FullyConnected");
        assert!(weights.with_extension("mpk").exists());
        assert!(weights.with_extension("meta.json").exists());

        let lifetime_csv = std::fs::read_to_string(
            temp_dir
                .path()
                .join("graphs/average_lifetime_FullyConnected.csv"),
        )
        .unwrap();
        assert_eq!(lifetime_csv.lines().count(), 5);
        assert!(
            temp_dir
                .path()
                .join("graphs/average_reward_FullyConnected.csv")
                .exists()
        );
    }
}
