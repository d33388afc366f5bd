use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileLearningRateConfig {
    pub base_lr: Option<f64>,
    pub policy: Option<String>,
    pub gamma: Option<f64>,
    pub power: Option<f64>,
    pub stepsize: Option<usize>,
    pub stepvalues: Option<Vec<usize>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSolverConfig {
    pub max_iter: Option<usize>,
    pub momentum: Option<f64>,
    pub clip_gradients: Option<f64>,
    pub iter_size: Option<usize>,
    pub average_loss: Option<usize>,
    pub display: Option<usize>,
    pub debug_info: Option<bool>,
    pub execution_mode: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileTestConfig {
    pub interval: Option<usize>,
    pub iterations: Option<usize>,
    pub initialization: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSnapshotConfig {
    pub interval: Option<usize>,
    pub prefix: Option<PathBuf>,
    pub format: Option<String>,
    pub after_train: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileThresholdConfig {
    pub enabled: Option<bool>,
    pub receptor_channels: Option<usize>,
    pub ligand_channels: Option<usize>,
    pub grid_points: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub learning_rate: Option<FileLearningRateConfig>,
    pub solver: Option<FileSolverConfig>,
    pub test: Option<FileTestConfig>,
    pub snapshot: Option<FileSnapshotConfig>,
    pub threshold: Option<FileThresholdConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
