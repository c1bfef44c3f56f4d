use thiserror::Error;

use crate::document::MergeError;

pub type SheetfillResult<T> = Result<T, SheetfillError>;

#[derive(Error, Debug)]
pub enum SheetfillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Failed to read workbook: {0}")]
    Read(String),

    #[error("Failed to write workbook: {0}")]
    Write(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),
}
