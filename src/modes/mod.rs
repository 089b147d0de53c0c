pub mod replay;
pub mod train;

pub use replay::{GameEnd, GameSummary, ReplayConfig, ReplayMode};
pub use train::{TrainConfig, TrainMode};
