use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with a single source file. The importer logs these and moves on
/// to the next file.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to list source directory '{0}'")]
    ReadDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse '{0}' as a delimited table")]
    Parse(PathBuf, #[source] PolarsError),

    #[error("'{path}' has no '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("'{0}' contains no rows after removing duplicates")]
    Empty(PathBuf),

    #[error("Failed to clean rows of '{0}'")]
    Clean(PathBuf, #[source] PolarsError),
}
