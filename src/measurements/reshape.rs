//! Aggregator/Reshaper: long measurement rows to one wide row per (date, country, city).
//!
//! Repeated readings of the same species on the same day are collapsed to the mean
//! of their medians. Each distinct species then becomes its own column.

use crate::error::PipelineError;
use crate::types::columns::{
    raw, CALENDAR_PARTS, CITY, COUNTRY, DATE, DAY, MEDIAN, MONTH, SPECIE, WIDE_KEYS, YEAR,
};
use crate::utils::{has_column, normalize_name_expr};
use log::{info, warn};
use polars::prelude::*;
use std::collections::BTreeSet;

const REQUIRED: [&str; 5] = [raw::DATE, raw::COUNTRY, raw::CITY, raw::SPECIE, raw::MEDIAN];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Mean of `median` per (date, country, city, specie), with normalized keys.
///
/// Columns other than the keys and `median` (variance, min, max, count) are dropped.
/// Rows whose date cannot be parsed or whose keys are missing do not contribute.
pub fn aggregate_medians(long: &DataFrame) -> Result<DataFrame, PipelineError> {
    if let Some(missing) = REQUIRED.iter().find(|name| !has_column(long, name)) {
        return Err(PipelineError::MissingColumn(missing.to_string()));
    }

    let aggregated = long
        .clone()
        .lazy()
        .select([
            col(raw::DATE)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(NULL))
                .str()
                .to_date(StrptimeOptions {
                    format: Some(DATE_FORMAT.into()),
                    strict: false,
                    ..Default::default()
                })
                .alias(DATE),
            col(raw::COUNTRY)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(NULL))
                .alias(COUNTRY),
            normalize_name_expr(col(raw::CITY)).alias(CITY),
            normalize_name_expr(col(raw::SPECIE)).alias(SPECIE),
            col(raw::MEDIAN).cast(DataType::Float64).alias(MEDIAN),
        ])
        .filter(
            col(DATE)
                .is_not_null()
                .and(col(COUNTRY).is_not_null())
                .and(col(CITY).is_not_null())
                .and(col(SPECIE).is_not_null())
                .and(col(SPECIE).neq(lit(""))),
        )
        .group_by([col(DATE), col(COUNTRY), col(CITY), col(SPECIE)])
        .agg([col(MEDIAN).mean()])
        .collect()?;

    Ok(aggregated)
}

/// Distinct species of an aggregated table, sorted. Names that would clash with a
/// key or calendar column are left out.
fn species_columns(aggregated: &DataFrame) -> PolarsResult<Vec<String>> {
    let distinct: BTreeSet<&str> = aggregated
        .column(SPECIE)?
        .str()?
        .into_iter()
        .flatten()
        .collect();

    Ok(distinct
        .into_iter()
        .filter(|specie| {
            let clashes = WIDE_KEYS.contains(specie) || CALENDAR_PARTS.contains(specie);
            if clashes {
                warn!("Ignoring species '{}': name is reserved for a key column", specie);
            }
            !clashes
        })
        .map(str::to_string)
        .collect())
}

/// Builds the wide table: `date, country, city, year, month, day, <species...>`.
///
/// `date` is an ISO `YYYY-MM-DD` string; the calendar parts are Int32. Species
/// missing for a date and city are null. Rows are sorted by date, country, city.
pub fn aggregate_and_pivot(long: &DataFrame) -> Result<DataFrame, PipelineError> {
    let aggregated = aggregate_medians(long)?;
    let species = species_columns(&aggregated)?;

    let per_species: Vec<Expr> = species
        .iter()
        .map(|specie| {
            col(MEDIAN)
                .filter(col(SPECIE).eq(lit(specie.as_str())))
                .first()
                .alias(specie.as_str())
        })
        .collect();

    let output_order: Vec<Expr> = WIDE_KEYS
        .iter()
        .chain(CALENDAR_PARTS.iter())
        .map(|name| col(*name))
        .chain(species.iter().map(|specie| col(specie.as_str())))
        .collect();

    let wide = aggregated
        .lazy()
        .group_by_stable([col(DATE), col(COUNTRY), col(CITY)])
        .agg(per_species)
        .with_columns([
            col(DATE).dt().year().cast(DataType::Int32).alias(YEAR),
            col(DATE).dt().month().cast(DataType::Int32).alias(MONTH),
            col(DATE).dt().day().cast(DataType::Int32).alias(DAY),
        ])
        .sort_by_exprs(
            [col(DATE), col(COUNTRY), col(CITY)],
            SortMultipleOptions::default(),
        )
        .with_column(col(DATE).dt().to_string(DATE_FORMAT).alias(DATE))
        .select(output_order)
        .collect()?;

    info!(
        "Reshaped {} long rows into {} wide rows with {} species columns",
        long.height(),
        wide.height(),
        species.len()
    );
    Ok(wide)
}
