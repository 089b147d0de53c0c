//! Grid snake simulation
//!
//! Pure game rules with no I/O, shared by training and replay.

pub mod action;
pub mod config;
pub mod engine;
pub mod state;

pub use action::{Direction, NUM_ACTIONS};
pub use config::GameConfig;
pub use engine::{GameEngine, StepInfo, StepResult};
pub use state::{CollisionType, GameState, Position, Snake};
