use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read configuration file '{0}'")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse configuration file '{0}'")]
    ConfigParse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to create output directory '{0}'")]
    OutputDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to write '{0}'")]
    PersistIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode table into '{0}'")]
    PersistPolars(PathBuf, #[source] PolarsError),

    #[error("Required column '{0}' is missing from the measurement table")]
    MissingColumn(String),

    #[error("Table operation failed: {0}")]
    Polars(#[from] PolarsError),
}
