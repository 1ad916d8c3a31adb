use crate::stations::error::LocateStationError;
use crate::weather_data::error::WeatherDataError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading or joining reference data. Enrichers log these and
/// hand back their input unchanged.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Failed to read reference file '{0}'")]
    ReferenceRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse reference document '{0}'")]
    ReferenceParse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to read reference table '{0}'")]
    ReferenceTable(PathBuf, #[source] PolarsError),

    #[error("Reference table '{path}' has no '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Station lookup failed")]
    Station(#[from] LocateStationError),

    #[error("Weather data could not be loaded")]
    WeatherData(#[from] WeatherDataError),

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("No cache directory could be determined")]
    CacheDirResolution,

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Table operation failed: {0}")]
    Polars(#[from] PolarsError),
}
