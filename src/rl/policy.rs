//! Policy networks mapping stacked frames to action probabilities
//!
//! Two architectures are provided:
//!
//! ```text
//! FullyConnected
//!   Input: [batch, n_frames, H, W]
//!   ↓ Flatten: [batch, n_frames*H*W]
//!   ↓ Linear(→ hidden[0]) + ReLU
//!   ↓ Linear(→ hidden[1]) + ReLU
//!   ↓ Linear(→ 4) + Softmax
//!
//! Convolutional
//!   Input: [batch, n_frames, H, W]
//!   ↓ Conv2d(n_frames→c0, k=3, p=1) + ReLU
//!   ↓ Conv2d(c0→c1, k=3, p=1) + ReLU
//!   ↓ Flatten: [batch, c1*H*W]
//!   ↓ Linear(→ hidden[0]) + ReLU
//!   ↓ Linear(→ 4) + Softmax
//! ```
//!
//! Both implement [`Policy`], which is all the training loop and replay need:
//! a name for the weight file, a constructor, and a probability forward pass.

use burn::{
    module::Module,
    nn::{
        Linear, LinearConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    tensor::{
        Tensor,
        activation::{relu, softmax},
        backend::Backend,
    },
};
use serde::{Deserialize, Serialize};

use crate::game::NUM_ACTIONS;

/// Name and shape of one learnable tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterShape {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParameterShape {
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }
}

/// Input dimensions and layer sizes shared by all policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Stacked frames per observation (input channels)
    pub n_frames: usize,

    pub grid_height: usize,

    pub grid_width: usize,

    /// Widths of the hidden fully connected layers
    ///
    /// The convolutional policy only uses the first entry.
    pub hidden_dims: [usize; 2],

    /// Output channels of the two convolutions
    pub conv_channels: [usize; 2],
}

impl PolicyConfig {
    /// Default layer sizes for the given input
    pub fn new(n_frames: usize, grid_height: usize, grid_width: usize) -> Self {
        Self {
            n_frames,
            grid_height,
            grid_width,
            ..Default::default()
        }
    }

    /// Same layer sizes, different input
    pub fn with_input(mut self, n_frames: usize, grid_height: usize, grid_width: usize) -> Self {
        self.n_frames = n_frames;
        self.grid_height = grid_height;
        self.grid_width = grid_width;
        self
    }

    /// Values in one flattened frame stack
    pub fn input_len(&self) -> usize {
        self.n_frames * self.grid_height * self.grid_width
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.input_len() == 0 {
            return Err(format!(
                "policy input must be non-empty, got {}x{}x{}",
                self.n_frames, self.grid_height, self.grid_width
            ));
        }

        if self.hidden_dims.contains(&0) || self.conv_channels.contains(&0) {
            return Err("layer sizes must be at least 1".to_string());
        }

        Ok(())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            n_frames: 2,
            grid_height: 10,
            grid_width: 10,
            hidden_dims: [200, 100],
            conv_channels: [16, 32],
        }
    }
}

/// A model that turns frame stacks into action probabilities
pub trait Policy<B: Backend>: Module<B> + Sized {
    /// Model name, used to derive the weight file name
    const NAME: &'static str;

    fn init(config: &PolicyConfig, device: &B::Device) -> Self;

    /// Action probabilities for a batch of frame stacks
    ///
    /// `frames` is `[batch, n_frames, H, W]`; the result is `[batch, 4]` with
    /// rows summing to one.
    fn forward(&self, frames: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Which architecture to train or replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    FullyConnected,
    Convolutional,
}

impl PolicyKind {
    /// Model name for this kind, matching [`Policy::NAME`]
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::FullyConnected => "FullyConnected",
            PolicyKind::Convolutional => "Convolutional",
        }
    }
}

/// Multi-layer perceptron over the flattened frame stack
#[derive(Module, Debug)]
pub struct FullyConnectedPolicy<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> Policy<B> for FullyConnectedPolicy<B> {
    const NAME: &'static str = "FullyConnected";

    fn init(config: &PolicyConfig, device: &B::Device) -> Self {
        let [h1, h2] = config.hidden_dims;
        Self {
            fc1: LinearConfig::new(config.input_len(), h1).init(device),
            fc2: LinearConfig::new(h1, h2).init(device),
            out: LinearConfig::new(h2, NUM_ACTIONS).init(device),
        }
    }

    fn forward(&self, frames: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, height, width] = frames.dims();
        let x = frames.reshape([batch_size, channels * height * width]);

        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));

        softmax(self.out.forward(x), 1)
    }
}

/// Small convolutional trunk followed by one hidden dense layer
#[derive(Module, Debug)]
pub struct ConvPolicy<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    fc: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> Policy<B> for ConvPolicy<B> {
    const NAME: &'static str = "Convolutional";

    fn init(config: &PolicyConfig, device: &B::Device) -> Self {
        let [c1, c2] = config.conv_channels;
        // Padded 3x3 convolutions keep the spatial size
        let flattened_dim = c2 * config.grid_height * config.grid_width;

        Self {
            conv1: Conv2dConfig::new([config.n_frames, c1], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv2: Conv2dConfig::new([c1, c2], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            fc: LinearConfig::new(flattened_dim, config.hidden_dims[0]).init(device),
            out: LinearConfig::new(config.hidden_dims[0], NUM_ACTIONS).init(device),
        }
    }

    fn forward(&self, frames: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(frames));
        let x = relu(self.conv2.forward(x));

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = relu(self.fc.forward(x));
        softmax(self.out.forward(x), 1)
    }
}
