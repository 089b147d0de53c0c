//! REINFORCE policy-gradient training for Snake
//!
//! Provides:
//! - Single-channel board frames stacked over time
//! - Fully connected and convolutional policies built on Burn
//! - Trajectory batching with discounted, normalized returns
//! - The REINFORCE agent and its loss
//! - Weight persistence keyed by model name

pub mod backend;
pub mod batch;
pub mod config;
pub mod frames;
pub mod layout;
pub mod persistence;
pub mod policy;
pub mod reinforce;

pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use batch::{EpisodeBatch, discount_rewards, normalize_advantages};
pub use config::ReinforceConfig;
pub use frames::{FrameHistory, render_frame, stacks_to_tensor};
pub use layout::{ParameterLayout, module_parameters};
pub use persistence::{
    ModelMetadata, check_parameters, load_metadata, load_policy, save_policy, weights_path,
};
pub use policy::{ConvPolicy, FullyConnectedPolicy, ParameterShape, Policy, PolicyConfig, PolicyKind};
pub use reinforce::{ReinforceAgent, greedy_action, policy_loss, sample_categorical};
