//! Record Importer: folds every raw WAQI export in a directory into one long table.
//!
//! Files are read one at a time. A file that cannot be parsed, has no `Specie`
//! column or holds nothing but duplicates is skipped with a warning; the other
//! files still contribute. Duplicate rows are removed per file only, so a record
//! repeated in two exports appears twice in the result.

use crate::config::PipelineConfig;
use crate::measurements::error::ImportError;
use crate::types::columns::raw;
use log::{error, info, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};

const COMMENT_PREFIX: &str = "#";

/// Fixed species spellings rewritten before any grouping.
pub const SPECIES_SUBSTITUTIONS: [(&str, &str); 2] =
    [("wind gust", "wind-gust"), ("wind speed", "wind-speed")];

/// Lists the files the importer reads, sorted by file name.
pub fn discover_source_files(config: &PipelineConfig) -> Result<Vec<PathBuf>, ImportError> {
    let dir = &config.source_directory;
    let entries = std::fs::read_dir(dir).map_err(|e| ImportError::ReadDir(dir.clone(), e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            (name.starts_with(&config.measurement_prefix)
                && name.ends_with(&config.measurement_suffix))
                || config.extra_source_files.iter().any(|extra| *extra == name)
        })
        .map(|entry| entry.path())
        .collect();
    files.sort();
    Ok(files)
}

/// Rewrites the lexical species variants listed in [`SPECIES_SUBSTITUTIONS`].
pub fn normalize_species(specie: Expr) -> Expr {
    SPECIES_SUBSTITUTIONS
        .iter()
        .fold(specie.clone(), |acc, (from, to)| {
            when(specie.clone().eq(lit(*from)))
                .then(lit(*to))
                .otherwise(acc)
        })
}

/// Reads one export: comment lines skipped, species normalized, duplicates removed.
pub fn read_measurement_file(path: &Path) -> Result<DataFrame, ImportError> {
    // Columns are read as text and typed below, so a late decimal in a column of
    // integers cannot fail the whole file.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_comment_prefix(Some(COMMENT_PREFIX)))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| ImportError::Parse(path.to_path_buf(), e))?
        .finish()
        .map_err(|e| ImportError::Parse(path.to_path_buf(), e))?;

    if !crate::utils::has_column(&df, raw::SPECIE) {
        return Err(ImportError::MissingColumn {
            path: path.to_path_buf(),
            column: raw::SPECIE,
        });
    }

    // Every column gets one fixed type so files can be stacked regardless of
    // what the CSV reader inferred for each of them.
    let typed: Vec<Expr> = df
        .get_column_names()
        .iter()
        .map(|name| {
            let name = name.as_str();
            let target = if raw::NUMERIC.contains(&name) {
                DataType::Float64
            } else {
                DataType::String
            };
            col(name).cast(target)
        })
        .collect();

    let cleaned = df
        .lazy()
        .select(typed)
        .with_column(normalize_species(col(raw::SPECIE)).alias(raw::SPECIE))
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
        .map_err(|e| ImportError::Clean(path.to_path_buf(), e))?;

    if cleaned.height() == 0 {
        return Err(ImportError::Empty(path.to_path_buf()));
    }
    Ok(cleaned)
}

/// Imports every qualifying file of the source directory.
///
/// Returns `None` when no file contributed rows (missing or empty directory,
/// or every file skipped).
pub fn import_records(config: &PipelineConfig) -> Option<DataFrame> {
    let files = match discover_source_files(config) {
        Ok(files) => files,
        Err(e) => {
            warn!("{}", e);
            return None;
        }
    };

    let frames: Vec<LazyFrame> = files
        .iter()
        .filter_map(|path| match read_measurement_file(path) {
            Ok(df) => {
                info!("Imported {} rows from {}", df.height(), path.display());
                Some(df.lazy())
            }
            Err(e) => {
                warn!("Skipping file: {}", e);
                None
            }
        })
        .collect();

    if frames.is_empty() {
        warn!(
            "No measurement data found in {}",
            config.source_directory.display()
        );
        return None;
    }

    match concat_lf_diagonal(frames, UnionArgs::default()).and_then(LazyFrame::collect) {
        Ok(combined) => {
            info!("Combined long table has {} rows", combined.height());
            Some(combined)
        }
        Err(e) => {
            error!("Failed to combine imported files: {}", e);
            None
        }
    }
}
