//! Saving and loading trained policies
//!
//! Weights are written with Burn's named MessagePack recorder, so the file is
//! a mapping from parameter name to tensor. A JSON sidecar records which model
//! produced it, the input shape it was built for and its parameter listing.
//! Loading rebuilds the model from the sidecar, then reads the parameter
//! layout of the weight file itself and checks it against the model before
//! any tensor is loaded.
//!
//! Files for a model named `Foo` in `weights/`:
//! - `weights/weights_fc_Foo.mpk` - network weights
//! - `weights/weights_fc_Foo.meta.json` - metadata

use anyhow::{Context, Result};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::layout::{ParameterLayout, module_parameters};
use super::policy::{ParameterShape, Policy, PolicyConfig};
use crate::error::PersistenceError;

/// Weight file stem for a model, without extension
///
/// # Example
///
/// ```rust
/// use pg_snake::rl::weights_path;
/// use std::path::{Path, PathBuf};
///
/// let path = weights_path(Path::new("weights"), "FullyConnected");
/// assert_eq!(path, PathBuf::from("weights/weights_fc_FullyConnected"));
/// ```
pub fn weights_path(dir: &Path, model_name: &str) -> PathBuf {
    dir.join(format!("weights_fc_{model_name}"))
}

fn metadata_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

/// Everything needed to rebuild a saved policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Name of the model that produced the weights
    pub model_name: String,

    /// Input shape and layer sizes
    pub policy_config: PolicyConfig,

    /// Every saved parameter with its shape
    pub parameters: Vec<ParameterShape>,

    /// Gradient steps taken before saving
    pub iterations_trained: usize,

    /// Games played before saving
    pub episodes_trained: usize,

    /// Crate version that wrote the file
    pub version: String,
}

impl ModelMetadata {
    pub fn new<B: Backend, M: Policy<B>>(
        policy: &M,
        policy_config: PolicyConfig,
        iterations_trained: usize,
        episodes_trained: usize,
    ) -> Result<Self> {
        Ok(Self {
            model_name: M::NAME.to_string(),
            policy_config,
            parameters: module_parameters::<B, M>(policy)?,
            iterations_trained,
            episodes_trained,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// Write a policy's weights and metadata
///
/// Creates parent directories if they don't exist.
pub fn save_policy<B: Backend, M: Policy<B>>(
    policy: &M,
    metadata: &ModelMetadata,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(policy.clone().into_record(), path.to_path_buf())
        .with_context(|| format!("Failed to save weights to {:?}", path))?;

    let meta_path = metadata_path(path);
    let meta_json =
        serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
    std::fs::write(&meta_path, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", meta_path))?;

    Ok(())
}

/// Read the metadata sidecar for a weight file
pub fn load_metadata(path: &Path) -> Result<ModelMetadata> {
    let meta_path = metadata_path(path);
    let meta_json = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read metadata from {:?}", meta_path))?;
    serde_json::from_str(&meta_json).context("Failed to deserialize metadata")
}

/// Check saved parameters against the model they are about to be loaded into
///
/// Every saved name must exist in the model with the same shape, and every
/// model parameter must have been saved.
pub fn check_parameters(
    model_name: &str,
    saved: &[ParameterShape],
    expected: &[ParameterShape],
) -> Result<(), PersistenceError> {
    for param in saved {
        let Some(found) = expected.iter().find(|p| p.name == param.name) else {
            return Err(PersistenceError::UnknownParameter {
                name: param.name.clone(),
                model: model_name.to_string(),
            });
        };

        if found.shape != param.shape {
            return Err(PersistenceError::ShapeMismatch {
                name: param.name.clone(),
                saved: param.shape.clone(),
                expected: found.shape.clone(),
            });
        }
    }

    if let Some(missing) = expected
        .iter()
        .find(|p| !saved.iter().any(|s| s.name == p.name))
    {
        return Err(PersistenceError::MissingParameter {
            name: missing.name.clone(),
            model: model_name.to_string(),
        });
    }

    Ok(())
}

/// Load a saved policy onto `device`
///
/// The model is rebuilt from the metadata, so the caller does not need to know
/// the grid size or frame count it was trained with. The weight file must hold
/// exactly the rebuilt model's parameters, with the same shapes.
pub fn load_policy<B: Backend, M: Policy<B>>(
    path: &Path,
    device: &B::Device,
) -> Result<(M, ModelMetadata)> {
    let metadata = load_metadata(path)?;

    if metadata.model_name != M::NAME {
        return Err(PersistenceError::ModelMismatch {
            expected: M::NAME.to_string(),
            found: metadata.model_name.clone(),
        }
        .into());
    }

    let policy = M::init(&metadata.policy_config, device);
    let expected = module_parameters::<B, M>(&policy)?;
    let saved = ParameterLayout::from_file::<B>(path, device)?.parameters();
    check_parameters(M::NAME, &saved, &expected)?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Failed to load weights from {:?}", path))?;

    Ok((policy.load_record(record), metadata))
}
