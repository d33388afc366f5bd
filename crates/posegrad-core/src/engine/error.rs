use std::path::PathBuf;
use thiserror::Error;

use super::config::{ConfigError, ExecutionMode};
use super::tensor::ShapeError;

/// Failures reported by a [`ScoringNetwork`](super::network::ScoringNetwork) implementation.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Layer range {start}..={end} is invalid for a network of {len} layers")]
    LayerRange {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Tensor '{0}' not found in network")]
    TensorNotFound(String),

    #[error("Tensor shape error: {source}")]
    Shape {
        #[from]
        source: ShapeError,
    },

    #[error("Failed to write network weights to {path:?}: {message}")]
    WriteWeights { path: PathBuf, message: String },

    #[error("Network evaluation failed: {0}")]
    Evaluation(String),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error on checkpoint {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode structured checkpoint: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Failed to decode structured checkpoint: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("Malformed checkpoint {path:?}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Checkpoint tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Cannot infer checkpoint format from file name {0:?}")]
    UnknownFormat(PathBuf),
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Network has no input tensor named '{0}'")]
    MissingInputTensor(String),

    #[error("Execution backend '{0}' is not available in this build")]
    BackendUnavailable(ExecutionMode),

    #[error("Invalid solver configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Network failure: {source}")]
    Network {
        #[from]
        source: NetworkError,
    },

    #[error("Checkpoint failure: {source}")]
    Checkpoint {
        #[from]
        source: CheckpointError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
