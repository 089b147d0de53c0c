use anyhow::Result;
use burn::module::AutodiffModule;
use clap::{Parser, ValueEnum};
use pg_snake::config::AppConfig;
use pg_snake::modes::{ReplayConfig, ReplayMode, TrainConfig, TrainMode};
use pg_snake::rl::{
    ConvPolicy, FullyConnectedPolicy, InferenceBackend, Policy, PolicyKind, TrainingBackend,
    default_device,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pg_snake")]
#[command(version, about = "Snake agent trained with REINFORCE policy gradients")]
struct Cli {
    /// What to do
    #[arg(long, default_value = "train")]
    mode: Mode,

    /// Policy architecture
    #[arg(long)]
    policy: Option<PolicyArg>,

    /// TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Grid width
    #[arg(long)]
    grid_width: Option<usize>,

    /// Grid height
    #[arg(long)]
    grid_height: Option<usize>,

    /// Number of gradient steps
    #[arg(long)]
    iterations: Option<usize>,

    /// Games per gradient step
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Discount factor
    #[arg(long)]
    gamma: Option<f32>,

    /// Stacked frames per observation
    #[arg(long)]
    frames: Option<usize>,

    /// Step cap per game
    #[arg(long)]
    max_steps: Option<usize>,

    /// Games to replay
    #[arg(long, default_value = "10")]
    games: usize,

    /// Replay without the TUI
    #[arg(long)]
    headless: bool,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    weights_dir: Option<PathBuf>,

    #[arg(long)]
    graphs_dir: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    /// Train a policy and save its weights
    Train,
    /// Watch a trained policy play
    Replay,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    FullyConnected,
    Convolutional,
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FullyConnected => PolicyKind::FullyConnected,
            PolicyArg::Convolutional => PolicyKind::Convolutional,
        }
    }
}

impl Cli {
    /// Load the config file if given, then apply flag overrides
    fn app_config(&self) -> Result<AppConfig> {
        let mut app = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(policy) = self.policy {
            app.policy.kind = policy.into();
        }
        if let Some(width) = self.grid_width {
            app.game.grid_width = width;
        }
        if let Some(height) = self.grid_height {
            app.game.grid_height = height;
        }
        if let Some(iterations) = self.iterations {
            app.reinforce.n_iterations = iterations;
        }
        if let Some(batch_size) = self.batch_size {
            app.reinforce.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            app.reinforce.learning_rate = learning_rate;
        }
        if let Some(gamma) = self.gamma {
            app.reinforce.gamma = gamma;
        }
        if let Some(frames) = self.frames {
            app.reinforce.n_frames = frames;
        }
        if let Some(max_steps) = self.max_steps {
            app.reinforce.max_episode_steps = max_steps;
        }
        if self.seed.is_some() {
            app.reinforce.seed = self.seed;
        }
        if let Some(dir) = &self.weights_dir {
            app.paths.weights_dir = dir.clone();
        }
        if let Some(dir) = &self.graphs_dir {
            app.paths.graphs_dir = dir.clone();
        }

        app.validate()?;
        Ok(app)
    }
}

fn train<M>(app: &AppConfig) -> Result<()>
where
    M: Policy<TrainingBackend> + AutodiffModule<TrainingBackend>,
    M::InnerModule: Policy<InferenceBackend>,
{
    let config = TrainConfig::from_app_config(app);
    let mut train_mode = TrainMode::<TrainingBackend, M>::new(config, default_device())?;
    train_mode.run()
}

async fn replay<M: Policy<InferenceBackend>>(
    app: &AppConfig,
    games: usize,
    headless: bool,
) -> Result<()> {
    let config = ReplayConfig::from_app_config(app, games);
    let mut replay_mode =
        ReplayMode::<InferenceBackend, M>::new(&app.paths.weights_dir, config, default_device())?;

    if headless {
        replay_mode.run_headless()?;
    } else {
        replay_mode.run().await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let app = cli.app_config()?;

    match (cli.mode, app.policy.kind) {
        (Mode::Train, PolicyKind::FullyConnected) => {
            train::<FullyConnectedPolicy<TrainingBackend>>(&app)?;
        }
        (Mode::Train, PolicyKind::Convolutional) => {
            train::<ConvPolicy<TrainingBackend>>(&app)?;
        }
        (Mode::Replay, PolicyKind::FullyConnected) => {
            replay::<FullyConnectedPolicy<InferenceBackend>>(&app, cli.games, cli.headless)
                .await?;
        }
        (Mode::Replay, PolicyKind::Convolutional) => {
            replay::<ConvPolicy<InferenceBackend>>(&app, cli.games, cli.headless).await?;
        }
    }

    Ok(())
}
