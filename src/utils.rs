use crate::error::PipelineError;
use log::info;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

const CACHE_DIR_NAME: &str = "waqi_etl_cache";

/// Default location for downloaded station and weather data.
pub fn get_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join(CACHE_DIR_NAME))
}

pub fn ensure_output_dir(path: &Path) -> Result<(), PipelineError> {
    if path.is_dir() {
        return Ok(());
    }
    info!("Creating output directory: {}", path.display());
    std::fs::create_dir_all(path).map_err(|e| PipelineError::OutputDirCreation(path.to_path_buf(), e))
}

/// Writes `df` as CSV with a header row, creating the parent directory if needed.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_output_dir(parent)?;
    }
    let mut file = File::create(path).map_err(|e| PipelineError::PersistIo(path.to_path_buf(), e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| PipelineError::PersistPolars(path.to_path_buf(), e))?;
    info!("Saved {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Join-key normalization for city names: lowercase, surrounding whitespace removed.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().trim().to_string()
}

/// Expression form of [`normalize_name`].
pub fn normalize_name_expr(expr: Expr) -> Expr {
    expr.cast(DataType::String)
        .str()
        .to_lowercase()
        .str()
        .strip_chars(lit(NULL))
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}
