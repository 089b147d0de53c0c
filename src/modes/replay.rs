//! Replay mode for watching a trained policy
//!
//! Loads the weights saved by training and lets the policy play greedily,
//! always taking its most probable action. Games can be shown in a TUI or
//! played headless with one log line per game.
//!
//! # Controls
//!
//! - Space: Pause/unpause
//! - N: Skip to the next game
//! - 1-4: Speed control (1=slow, 2=normal, 3=fast, 4=very fast)
//! - Q/Esc: Quit
//!
//! # Example
//!
//! ```rust,ignore
//! use pg_snake::modes::{ReplayConfig, ReplayMode};
//! use pg_snake::rl::{default_device, FullyConnectedPolicy, InferenceBackend};
//! use std::path::Path;
//!
//! let mut replay = ReplayMode::<InferenceBackend, FullyConnectedPolicy<InferenceBackend>>::new(
//!     Path::new("weights"),
//!     ReplayConfig::default(),
//!     default_device(),
//! )?;
//! replay.run().await?;
//! ```

use anyhow::{Context, Result, anyhow};
use burn::tensor::backend::Backend;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{
    fmt,
    io::{Stderr, stderr},
    path::Path,
    time::Duration,
};
use tokio::time::{Interval, interval};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::game::{CollisionType, Direction, GameConfig, GameEngine, GameState};
use crate::render::{Renderer, ReplayStatus};
use crate::rl::{
    FrameHistory, ModelMetadata, Policy, greedy_action, load_policy, render_frame,
    stacks_to_tensor, weights_path,
};

/// Replay speed settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaySpeed {
    /// Slow: 2 Hz (500ms per step)
    Slow,
    /// Normal: 8 Hz (125ms per step)
    Normal,
    /// Fast: 20 Hz (50ms per step)
    Fast,
    /// Very Fast: 60 Hz (16ms per step)
    VeryFast,
}

impl ReplaySpeed {
    fn tick_interval(&self) -> Duration {
        match self {
            Self::Slow => Duration::from_millis(500),
            Self::Normal => Duration::from_millis(125),
            Self::Fast => Duration::from_millis(50),
            Self::VeryFast => Duration::from_millis(16),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "Slow",
            Self::Normal => "Normal",
            Self::Fast => "Fast",
            Self::VeryFast => "Very Fast",
        }
    }
}

/// How a replayed game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEnd {
    Wall,
    SelfCollision,
    /// No free cell left for food
    BoardFilled,
    /// Reached the step cap alive
    StepLimit,
}

impl fmt::Display for GameEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GameEnd::Wall => "hit a wall",
            GameEnd::SelfCollision => "hit itself",
            GameEnd::BoardFilled => "filled the board",
            GameEnd::StepLimit => "reached the step limit",
        };
        f.write_str(text)
    }
}

/// Result of one replayed game
#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub steps: u32,
    pub score: u32,
    pub total_reward: f32,
    pub cause: GameEnd,
}

/// Configuration for replay mode
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Rewards and snake length; the grid size comes from the saved weights
    pub game_config: GameConfig,

    /// Games to play before stopping
    pub n_games: usize,

    /// A game is cut off once it has run for more than this many steps
    pub max_episode_steps: usize,

    /// Seed for food placement
    pub seed: Option<u64>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            game_config: GameConfig::default(),
            n_games: 10,
            max_episode_steps: 50,
            seed: None,
        }
    }
}

impl ReplayConfig {
    pub fn from_app_config(app: &AppConfig, n_games: usize) -> Self {
        Self {
            game_config: app.game.clone(),
            n_games,
            max_episode_steps: app.reinforce.max_episode_steps,
            seed: app.reinforce.seed,
        }
    }
}

/// A game in progress
struct Episode {
    state: GameState,
    total_reward: f32,
    end: Option<GameEnd>,
}

impl Episode {
    fn is_over(&self) -> bool {
        self.end.is_some()
    }

    fn summary(&self) -> GameSummary {
        GameSummary {
            steps: self.state.steps,
            score: self.state.score,
            total_reward: self.total_reward,
            cause: self.end.unwrap_or(GameEnd::StepLimit),
        }
    }
}

/// Replay mode for a trained policy
pub struct ReplayMode<B: Backend, M: Policy<B>> {
    policy: M,

    metadata: ModelMetadata,

    engine: GameEngine,

    history: FrameHistory,

    config: ReplayConfig,

    device: B::Device,

    renderer: Renderer,

    should_quit: bool,

    paused: bool,

    speed: ReplaySpeed,

    /// Summaries of finished games, in order
    summaries: Vec<GameSummary>,
}

impl<B: Backend, M: Policy<B>> ReplayMode<B, M> {
    /// Load `M`'s weights from `weights_dir` and prepare a game of matching size
    pub fn new(weights_dir: &Path, mut config: ReplayConfig, device: B::Device) -> Result<Self> {
        if config.n_games == 0 {
            return Err(anyhow!("n_games must be at least 1"));
        }
        if config.max_episode_steps == 0 {
            return Err(anyhow!("max_episode_steps must be at least 1"));
        }

        let path = weights_path(weights_dir, M::NAME);
        let (policy, metadata) = load_policy::<B, M>(&path, &device)
            .with_context(|| format!("Failed to load {} policy from {:?}", M::NAME, path))?;

        let trained = &metadata.policy_config;
        let game = &mut config.game_config;
        if (game.grid_width, game.grid_height) != (trained.grid_width, trained.grid_height) {
            warn!(
                requested = %format!("{}x{}", game.grid_width, game.grid_height),
                trained = %format!("{}x{}", trained.grid_width, trained.grid_height),
                "Grid size overridden by the saved policy"
            );
            game.grid_width = trained.grid_width;
            game.grid_height = trained.grid_height;
        }
        game.validate()
            .map_err(|e| anyhow!("invalid game configuration: {e}"))?;

        info!(
            model = %metadata.model_name,
            path = %path.display(),
            iterations = metadata.iterations_trained,
            games = metadata.episodes_trained,
            version = %metadata.version,
            "Loaded policy"
        );

        let engine = match config.seed {
            Some(seed) => GameEngine::with_seed(config.game_config.clone(), seed),
            None => GameEngine::new(config.game_config.clone()),
        };
        let history = FrameHistory::new(
            trained.n_frames,
            trained.grid_height,
            trained.grid_width,
        );

        Ok(Self {
            policy,
            metadata,
            engine,
            history,
            config,
            device,
            renderer: Renderer::new(),
            should_quit: false,
            paused: false,
            speed: ReplaySpeed::Normal,
            summaries: Vec::new(),
        })
    }

    /// Play one whole game without rendering
    pub fn play_game(&mut self) -> Result<GameSummary> {
        let mut episode = self.start_episode();
        while !episode.is_over() {
            self.advance(&mut episode)?;
        }

        let summary = episode.summary();
        self.summaries.push(summary.clone());
        Ok(summary)
    }

    /// Play every configured game, logging one line each
    pub fn run_headless(&mut self) -> Result<Vec<GameSummary>> {
        for game in 1..=self.config.n_games {
            let summary = self.play_game()?;
            info!(
                "Game {}/{}: score {}, {} steps, reward {:.2}, {}",
                game,
                self.config.n_games,
                summary.score,
                summary.steps,
                summary.total_reward,
                summary.cause
            );
        }

        let games = self.summaries.len().max(1) as f32;
        let mean_score = self.summaries.iter().map(|s| s.score as f32).sum::<f32>() / games;
        let mean_steps = self.summaries.iter().map(|s| s.steps as f32).sum::<f32>() / games;
        info!(
            "Replay finished: average score {:.2}, average lifetime {:.2}",
            mean_score, mean_steps
        );

        Ok(self.summaries.clone())
    }

    /// Run the TUI until every game is played or the user quits
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stderr = stderr();
        execute!(stderr, EnterAlternateScreen).context("Failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stderr);
        let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;
        terminal.hide_cursor().context("Failed to hide cursor")?;
        terminal.clear().context("Failed to clear terminal")?;

        let result = self.run_replay_loop(&mut terminal).await;

        self.cleanup_terminal(&mut terminal)?;

        result
    }

    async fn run_replay_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stderr>>,
    ) -> Result<()> {
        let mut event_stream = EventStream::new();
        let mut tick_timer = interval(self.speed.tick_interval());
        let mut render_timer = interval(Duration::from_millis(33));

        let mut episode = self.start_episode();

        loop {
            tokio::select! {
                maybe_event = event_stream.next() => {
                    if let Some(Ok(event)) = maybe_event {
                        self.handle_event(event, &mut episode, &mut tick_timer);
                    }
                }

                _ = tick_timer.tick() => {
                    if !self.paused {
                        if episode.is_over() {
                            self.finish_episode(&mut episode);
                        } else {
                            self.advance(&mut episode)?;
                        }
                    }
                }

                _ = render_timer.tick() => {
                    let status = self.status();
                    terminal.draw(|frame| {
                        self.renderer.render(frame, &episode.state, &status);
                    }).context("Failed to draw frame")?;
                }

                _ = tokio::signal::ctrl_c() => {
                    self.should_quit = true;
                }
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    fn start_episode(&mut self) -> Episode {
        self.history.reset();
        Episode {
            state: self.engine.reset(),
            total_reward: 0.0,
            end: None,
        }
    }

    /// Record a finished game and start the next, or stop after the last one
    fn finish_episode(&mut self, episode: &mut Episode) {
        self.summaries.push(episode.summary());

        if self.summaries.len() >= self.config.n_games {
            self.should_quit = true;
        } else {
            *episode = self.start_episode();
        }
    }

    /// Take the policy's most probable action
    fn advance(&mut self, episode: &mut Episode) -> Result<()> {
        if episode.is_over() {
            return Ok(());
        }

        self.history.push(render_frame(&episode.state));
        let probs = self.action_probabilities(&self.history.stacked())?;
        let action = greedy_action(&probs);
        let direction = Direction::from_index(action)
            .ok_or_else(|| anyhow!("policy produced invalid action {action}"))?;

        let result = self.engine.step(&mut episode.state, direction);
        episode.total_reward += result.reward;

        if result.terminated {
            episode.end = Some(match result.info.collision_type {
                Some(CollisionType::Wall) => GameEnd::Wall,
                Some(CollisionType::SelfCollision) => GameEnd::SelfCollision,
                None => GameEnd::BoardFilled,
            });
        } else if episode.state.steps as usize > self.config.max_episode_steps {
            episode.end = Some(GameEnd::StepLimit);
        }

        Ok(())
    }

    fn action_probabilities(&self, stack: &[f32]) -> Result<Vec<f32>> {
        let frames =
            stacks_to_tensor::<B>(stack.to_vec(), self.history.stack_shape(), &self.device);
        self.policy
            .forward(frames)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("failed to read action probabilities: {e:?}"))
    }

    fn handle_event(&mut self, event: Event, episode: &mut Episode, tick_timer: &mut Interval) {
        let Event::Key(key) = event else {
            return;
        };
        if key.kind != KeyEventKind::Press {
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(' ') => self.paused = !self.paused,
            KeyCode::Char('n') => {
                if episode.end.is_none() {
                    episode.end = Some(GameEnd::StepLimit);
                }
                self.finish_episode(episode);
            }
            KeyCode::Char('1') => self.change_speed(ReplaySpeed::Slow, tick_timer),
            KeyCode::Char('2') => self.change_speed(ReplaySpeed::Normal, tick_timer),
            KeyCode::Char('3') => self.change_speed(ReplaySpeed::Fast, tick_timer),
            KeyCode::Char('4') => self.change_speed(ReplaySpeed::VeryFast, tick_timer),
            _ => {}
        }
    }

    fn change_speed(&mut self, new_speed: ReplaySpeed, tick_timer: &mut Interval) {
        self.speed = new_speed;
        tick_timer.reset_after(self.speed.tick_interval());
    }

    fn status(&self) -> ReplayStatus {
        ReplayStatus {
            model_name: self.metadata.model_name.clone(),
            game: (self.summaries.len() + 1).min(self.config.n_games),
            total_games: self.config.n_games,
            speed: self.speed.as_str(),
            paused: self.paused,
        }
    }

    fn cleanup_terminal(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stderr>>,
    ) -> Result<()> {
        disable_raw_mode().context("Failed to disable raw mode")?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)
            .context("Failed to leave alternate screen")?;
        terminal.show_cursor().context("Failed to show cursor")?;
        Ok(())
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Summaries of the games played so far
    pub fn summaries(&self) -> &[GameSummary] {
        &self.summaries
    }
}
