//! Error types for the interaction model.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sample {index} has no non-padding positions to pool over")]
    EmptySample { index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    BFactor(#[from] BFactorLoadError),
}

/// Why a structural data file could not be turned into a weight table.
///
/// Kept separate from [`ModelError`] so callers can tell a missing file
/// apart from a malformed one and pick their own fallback.
#[derive(Error, Debug)]
pub enum BFactorLoadError {
    #[error("B-factor file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("B-factor file {} could not be parsed: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl From<candle_core::Error> for ModelError {
    fn from(e: candle_core::Error) -> Self {
        ModelError::Inference(e.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for ModelError {
    fn from(e: hf_hub::api::sync::ApiError) -> Self {
        ModelError::Download(e.to_string())
    }
}
