//! Population Enricher: city population per year, joined on (city, year).

use crate::config::PipelineConfig;
use crate::enrichment::error::EnrichmentError;
use crate::enrichment::left_join_sorted;
use crate::types::columns::{CITY, POPULATION, YEAR};
use crate::utils::{has_column, normalize_name_expr, write_csv};
use log::{info, warn};
use polars::prelude::*;
use std::path::Path;

const SOURCE_CITY: &str = "City";
const SOURCE_VALUE: &str = "Value";
const SOURCE_YEAR: &str = "Year";

/// Reads the population reference as `city, population, year`.
///
/// Malformed lines are skipped, rows missing any of the three fields are dropped
/// and only the first row of each (city, year) is kept.
pub fn load_population(path: &Path) -> Result<DataFrame, EnrichmentError> {
    let raw = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_ignore_errors(true)
        .map_parse_options(|opts| opts.with_truncate_ragged_lines(true))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| EnrichmentError::ReferenceTable(path.to_path_buf(), e))?
        .finish()
        .map_err(|e| EnrichmentError::ReferenceTable(path.to_path_buf(), e))?;

    for column in [SOURCE_CITY, SOURCE_VALUE, SOURCE_YEAR] {
        if !has_column(&raw, column) {
            return Err(EnrichmentError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    let population = raw
        .lazy()
        .select([
            normalize_name_expr(col(SOURCE_CITY)).alias(CITY),
            col(SOURCE_VALUE)
                .cast(DataType::Float64)
                .cast(DataType::Int64)
                .alias(POPULATION),
            col(SOURCE_YEAR)
                .cast(DataType::Float64)
                .cast(DataType::Int32)
                .alias(YEAR),
        ])
        .filter(
            col(CITY)
                .is_not_null()
                .and(col(CITY).neq(lit("")))
                .and(col(POPULATION).is_not_null())
                .and(col(YEAR).is_not_null()),
        )
        .group_by_stable([col(CITY), col(YEAR)])
        .agg([col(POPULATION).first()])
        .select([col(CITY), col(POPULATION), col(YEAR)])
        .collect()?;
    Ok(population)
}

/// Joins a loaded reference onto the table by (city, year). Without a `year`
/// column nothing can match and `population` is added as an all-null column.
pub fn join_population(table: &DataFrame, population: &DataFrame) -> PolarsResult<DataFrame> {
    if !has_column(table, YEAR) {
        warn!("Table has no '{}' column, population cannot be matched", YEAR);
        return table
            .clone()
            .lazy()
            .with_column(lit(NULL).cast(DataType::Int64).alias(POPULATION))
            .collect();
    }
    left_join_sorted(table, population.clone().lazy(), &[CITY, YEAR])
}

/// Adds a `population` column and persists the cleaned reference as
/// `population_data.csv`. Never fails: the table is returned unchanged when the
/// reference cannot be loaded or joined.
pub fn enrich_with_population(table: &DataFrame, config: &PipelineConfig) -> DataFrame {
    let path = config.population_path();
    let mut population = match load_population(&path) {
        Ok(population) => population,
        Err(e) => {
            warn!("Skipping population enrichment: {}", e);
            return table.clone();
        }
    };
    info!(
        "Loaded {} population entries from {}",
        population.height(),
        path.display()
    );

    if let Err(e) = write_csv(&mut population, &config.population_output_path()) {
        warn!("Could not persist population reference: {}", e);
    }

    match join_population(table, &population) {
        Ok(joined) => joined,
        Err(e) => {
            warn!("Skipping population enrichment, join failed: {}", e);
            table.clone()
        }
    }
}
