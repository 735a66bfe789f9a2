//! Error types for dataset handling.

use pepcept_model::ModelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Tokenizer download failed: {0}")]
    Download(String),

    #[error("Row {row}: {message}")]
    InvalidSample { row: usize, message: String },

    #[error("Cannot assemble an empty batch")]
    EmptyBatch,

    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<candle_core::Error> for DataError {
    fn from(e: candle_core::Error) -> Self {
        DataError::Model(ModelError::from(e))
    }
}

impl From<tokenizers::Error> for DataError {
    fn from(e: tokenizers::Error) -> Self {
        DataError::Tokenizer(e.to_string())
    }
}
