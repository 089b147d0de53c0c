//! PG Snake - a Snake agent trained with REINFORCE policy gradients
//!
//! This library provides:
//! - Core game logic (game module)
//! - Frame stacking, policies, batching and the REINFORCE update (rl module)
//! - Per-batch training statistics and learning curves (metrics module)
//! - TUI rendering for replays (render module)
//! - Training and replay modes (modes module)
//! - TOML configuration (config module)

pub mod config;
pub mod error;
pub mod game;
pub mod metrics;
pub mod modes;
pub mod render;
pub mod rl;
