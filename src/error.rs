//! Typed errors for configuration and saved weights

use std::path::PathBuf;

use thiserror::Error;

/// Saved weights that do not fit the model being loaded
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("weights were saved for model `{found}`, expected `{expected}`")]
    ModelMismatch { expected: String, found: String },

    #[error("parameter `{name}` in saved weights does not exist in model `{model}`")]
    UnknownParameter { name: String, model: String },

    #[error("parameter `{name}` of model `{model}` is missing from saved weights")]
    MissingParameter { name: String, model: String },

    #[error("parameter `{name}` was saved with shape {saved:?} but the model has {expected:?}")]
    ShapeMismatch {
        name: String,
        saved: Vec<usize>,
        expected: Vec<usize>,
    },
}

/// Problems loading or validating a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {section} configuration: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}
