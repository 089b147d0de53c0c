//! Training statistics for REINFORCE
//!
//! One [`BatchRecord`] is kept per gradient step. The history doubles as the
//! learning curves written at the end of training.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write as IoWrite;
use std::path::Path;

/// Summary of one batch of games and the update that followed
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    /// 1-based iteration number
    pub iteration: usize,
    /// Mean steps survived per game
    pub avg_lifetime: f32,
    /// Mean discounted return per step, before normalization
    pub avg_reward: f32,
    /// Fruits eaten across the batch
    pub fruits: u32,
    /// Policy loss for the update
    pub loss: f32,
}

/// Learning-curve history plus running totals
///
/// # Example
///
/// ```rust
/// use pg_snake::metrics::TrainingStats;
///
/// let mut stats = TrainingStats::new();
/// stats.record_batch(100, 12.5, -0.3, 4, 1.2);
///
/// assert_eq!(stats.total_games(), 100);
/// println!("{}", stats.format_progress(30));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TrainingStats {
    history: Vec<BatchRecord>,
    total_games: usize,
    total_fruits: u64,
}

impl TrainingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished batch of `games` games
    pub fn record_batch(
        &mut self,
        games: usize,
        avg_lifetime: f32,
        avg_reward: f32,
        fruits: u32,
        loss: f32,
    ) {
        self.total_games += games;
        self.total_fruits += u64::from(fruits);
        self.history.push(BatchRecord {
            iteration: self.history.len() + 1,
            avg_lifetime,
            avg_reward,
            fruits,
            loss,
        });
    }

    pub fn history(&self) -> &[BatchRecord] {
        &self.history
    }

    pub fn latest(&self) -> Option<&BatchRecord> {
        self.history.last()
    }

    /// Iterations completed
    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    pub fn total_games(&self) -> usize {
        self.total_games
    }

    pub fn total_fruits(&self) -> u64 {
        self.total_fruits
    }

    /// Average lifetime curve, one point per iteration
    pub fn avg_lifetimes(&self) -> Vec<f32> {
        self.history.iter().map(|r| r.avg_lifetime).collect()
    }

    /// Average reward curve, one point per iteration
    pub fn avg_rewards(&self) -> Vec<f32> {
        self.history.iter().map(|r| r.avg_reward).collect()
    }

    /// Best average lifetime seen so far
    pub fn best_avg_lifetime(&self) -> f32 {
        self.history
            .iter()
            .map(|r| r.avg_lifetime)
            .fold(0.0, f32::max)
    }

    /// Progress line for the latest batch
    ///
    /// # Example
    ///
    /// ```rust
    /// use pg_snake::metrics::TrainingStats;
    ///
    /// let mut stats = TrainingStats::new();
    /// stats.record_batch(100, 12.5, -0.3, 4, 1.2);
    /// assert_eq!(
    ///     stats.format_progress(30),
    ///     "Batch #1, average lifetime: 12.50, fruits eaten: 4, games played: 100, time: 30 sec"
    /// );
    /// ```
    pub fn format_progress(&self, elapsed_secs: u64) -> String {
        let (iteration, avg_lifetime, fruits) = self
            .latest()
            .map(|r| (r.iteration, r.avg_lifetime, r.fruits))
            .unwrap_or((0, 0.0, 0));

        format!(
            "Batch #{}, average lifetime: {:.2}, fruits eaten: {}, games played: {}, time: {} sec",
            iteration, avg_lifetime, fruits, self.total_games, elapsed_secs
        )
    }

    /// Final summary across all iterations
    pub fn format_summary(&self) -> String {
        let last = self.latest();
        format!(
            "Iterations: {} | Games: {} | Fruits: {} | Last lifetime: {:.2} | Best lifetime: {:.2} | Last reward: {:.3}",
            self.iterations(),
            self.total_games,
            self.total_fruits,
            last.map(|r| r.avg_lifetime).unwrap_or(0.0),
            self.best_avg_lifetime(),
            last.map(|r| r.avg_reward).unwrap_or(0.0),
        )
    }
}

/// Write one curve as `iteration,<column>` CSV rows
pub fn export_curve(path: &Path, column: &str, values: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let mut file =
        File::create(path).with_context(|| format!("Failed to create CSV file {:?}", path))?;

    writeln!(file, "iteration,{}", column).context("Failed to write CSV header")?;
    for (i, value) in values.iter().enumerate() {
        writeln!(file, "{},{}", i + 1, value).context("Failed to write CSV row")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new() {
        let stats = TrainingStats::new();
        assert_eq!(stats.iterations(), 0);
        assert_eq!(stats.total_games(), 0);
        assert!(stats.latest().is_none());
    }

    #[test]
    fn test_record_batch() {
        let mut stats = TrainingStats::new();
        stats.record_batch(100, 10.0, 0.5, 3, 2.0);
        stats.record_batch(100, 14.0, 1.5, 5, 1.0);

        assert_eq!(stats.iterations(), 2);
        assert_eq!(stats.total_games(), 200);
        assert_eq!(stats.total_fruits(), 8);
        assert_eq!(stats.avg_lifetimes(), vec![10.0, 14.0]);
        assert_eq!(stats.avg_rewards(), vec![0.5, 1.5]);
        assert_eq!(stats.latest().unwrap().iteration, 2);
    }

    #[test]
    fn test_best_avg_lifetime() {
        let mut stats = TrainingStats::new();
        stats.record_batch(10, 4.0, 0.0, 0, 0.0);
        stats.record_batch(10, 9.0, 0.0, 0, 0.0);
        stats.record_batch(10, 6.0, 0.0, 0, 0.0);

        assert_eq!(stats.best_avg_lifetime(), 9.0);
    }

    #[test]
    fn test_format_progress_before_any_batch() {
        let stats = TrainingStats::new();
        assert!(stats.format_progress(0).starts_with("Batch #0"));
    }

    #[test]
    fn test_format_summary() {
        let mut stats = TrainingStats::new();
        stats.record_batch(50, 7.25, -0.125, 2, 0.3);

        let summary = stats.format_summary();
        assert!(summary.contains("Iterations: 1"));
        assert!(summary.contains("Games: 50"));
        assert!(summary.contains("Last lifetime: 7.25"));
        assert!(summary.contains("Last reward: -0.125"));
    }

    #[test]
    fn test_export_curve() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("graphs/average_lifetime_Test.csv");

        export_curve(&path, "average_lifetime", &[1.5, 2.0]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "iteration,average_lifetime\n1,1.5\n2,2\n");
    }
}
