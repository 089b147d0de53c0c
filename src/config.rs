//! File-based configuration
//!
//! Every section is optional; anything left out keeps its default.
//!
//! ```toml
//! [game]
//! grid_width = 12
//! grid_height = 12
//!
//! [reinforce]
//! batch_size = 50
//! gamma = 0.99
//!
//! [policy]
//! kind = "convolutional"
//! hidden_dims = [128, 64]
//!
//! [paths]
//! weights_dir = "weights"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::game::GameConfig;
use crate::rl::{PolicyConfig, PolicyKind, ReinforceConfig};

/// Architecture choice and layer sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub kind: PolicyKind,
    pub hidden_dims: [usize; 2],
    pub conv_channels: [usize; 2],
}

impl Default for PolicySection {
    fn default() -> Self {
        let defaults = PolicyConfig::default();
        Self {
            kind: PolicyKind::default(),
            hidden_dims: defaults.hidden_dims,
            conv_channels: defaults.conv_channels,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Directory holding `weights_fc_<Model>` files
    pub weights_dir: PathBuf,
    /// Directory receiving learning-curve CSVs
    pub graphs_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            weights_dir: PathBuf::from("weights"),
            graphs_dir: PathBuf::from("graphs"),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub game: GameConfig,
    pub reinforce: ReinforceConfig,
    pub policy: PolicySection,
    pub paths: PathsSection,
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Policy input and layer sizes implied by the game and frame settings
    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            hidden_dims: self.policy.hidden_dims,
            conv_channels: self.policy.conv_channels,
            ..Default::default()
        }
        .with_input(
            self.reinforce.n_frames,
            self.game.grid_height,
            self.game.grid_width,
        )
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game
            .validate()
            .map_err(|message| ConfigError::Invalid {
                section: "game",
                message,
            })?;
        self.reinforce
            .validate()
            .map_err(|message| ConfigError::Invalid {
                section: "reinforce",
                message,
            })?;
        self.policy_config()
            .validate()
            .map_err(|message| ConfigError::Invalid {
                section: "policy",
                message,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.paths.weights_dir, PathBuf::from("weights"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [game]
            grid_width = 12

            [reinforce]
            gamma = 0.9

            [policy]
            kind = "convolutional"
        "#;

        let config = AppConfig::from_toml_str(toml, Path::new("inline")).unwrap();

        assert_eq!(config.game.grid_width, 12);
        assert_eq!(config.game.grid_height, 10);
        assert_eq!(config.reinforce.gamma, 0.9);
        assert_eq!(config.reinforce.batch_size, 100);
        assert_eq!(config.policy.kind, PolicyKind::Convolutional);
    }

    #[test]
    fn test_policy_config_follows_game_and_frames() {
        let mut config = AppConfig::default();
        config.game = GameConfig::new(8, 6);
        config.reinforce.n_frames = 3;
        config.policy.hidden_dims = [32, 16];

        let policy = config.policy_config();
        assert_eq!(policy.n_frames, 3);
        assert_eq!(policy.grid_height, 6);
        assert_eq!(policy.grid_width, 8);
        assert_eq!(policy.hidden_dims, [32, 16]);
    }

    #[test]
    fn test_invalid_section_is_named() {
        let toml = "[reinforce]\nbatch_size = 0\n";
        let config = AppConfig::from_toml_str(toml, Path::new("inline")).unwrap();

        match config.validate() {
            Err(ConfigError::Invalid { section, .. }) => assert_eq!(section, "reinforce"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_file_errors() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            AppConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[game\n").unwrap();
        assert!(matches!(
            AppConfig::from_file(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
