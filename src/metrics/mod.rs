pub mod training_stats;

pub use training_stats::{BatchRecord, TrainingStats, export_curve};
