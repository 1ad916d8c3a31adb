//! Explicit configuration for a pipeline run.
//!
//! Every stage receives the values it needs from a [`PipelineConfig`]; nothing is
//! read from process-wide state. A config can be assembled with the builder or
//! loaded from a JSON document in which every field is optional.

use crate::error::PipelineError;
use crate::utils::get_cache_dir;
use bon::Builder;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CLEANED_DATA_FILE: &str = "cleaned_data.csv";
pub const CITY_SELECTION_FILE: &str = "city_per_country.csv";
pub const POPULATION_OUTPUT_FILE: &str = "population_data.csv";
pub const MAX_RETRIES_LIMIT: u32 = 10;

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default()
}

fn default_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default()
}

/// Options of a pipeline run.
///
/// # Examples
///
/// ```
/// use waqi_etl::PipelineConfig;
/// use chrono::NaiveDate;
///
/// let config = PipelineConfig::builder()
///     .source_directory("./raw")
///     .output_directory("./out")
///     .date_range_start(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
///     .enrich_weather(false)
///     .build();
/// assert_eq!(config.missing_threshold, 0.8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the raw exports and reference files.
    #[builder(into, default = PathBuf::from("./data"))]
    pub source_directory: PathBuf,
    /// Directory the cleaned table and side tables are written to.
    #[builder(into, default = PathBuf::from("./data"))]
    pub output_directory: PathBuf,
    /// First day of weather observations to fetch (inclusive).
    #[builder(default = default_start())]
    pub date_range_start: NaiveDate,
    /// Last day of weather observations to fetch (inclusive).
    #[builder(default = default_end())]
    pub date_range_end: NaiveDate,
    /// Weather columns whose missing fraction is above this value are dropped.
    #[builder(default = 0.8)]
    pub missing_threshold: f64,
    #[builder(into, default = String::from("waqi-covid-"))]
    pub measurement_prefix: String,
    #[builder(into, default = String::from(".csv"))]
    pub measurement_suffix: String,
    /// Files handed to the importer by exact name, in addition to the prefix/suffix matches.
    #[builder(default = vec![String::from("airquality-covid19-cities.json")])]
    pub extra_source_files: Vec<String>,
    #[builder(into, default = String::from("airquality-covid19-cities.json"))]
    pub geo_catalog_file: String,
    #[builder(into, default = String::from("population.csv"))]
    pub population_file: String,
    /// Keep only the city with the most rows per country.
    #[builder(default = false)]
    pub select_representative_cities: bool,
    #[builder(default = true)]
    pub enrich_geo: bool,
    #[builder(default = true)]
    pub enrich_weather: bool,
    #[builder(default = true)]
    pub enrich_population: bool,
    /// Where station and weather downloads are cached. Defaults to the OS cache directory.
    #[builder(into)]
    pub cache_directory: Option<PathBuf>,
    /// Ignore stations further away than this. Unlimited when unset.
    pub station_search_radius_km: Option<f64>,
    /// Only consider stations whose daily inventory overlaps the date window.
    #[builder(default = false)]
    pub require_daily_inventory: bool,
    #[builder(default = 30)]
    pub request_timeout_secs: u64,
    #[builder(default = 2)]
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::builder().build()
    }
}

impl PipelineConfig {
    /// Loads a config from a JSON document. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigRead(path.to_path_buf(), e))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| PipelineError::ConfigParse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.date_range_start > self.date_range_end {
            return Err(PipelineError::InvalidConfig(format!(
                "date range start {} is after end {}",
                self.date_range_start, self.date_range_end
            )));
        }
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "missing threshold {} must be a fraction between 0 and 1",
                self.missing_threshold
            )));
        }
        if let Some(radius) = self.station_search_radius_km {
            if radius.is_nan() || radius <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "station search radius {} km must be positive",
                    radius
                )));
            }
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(PipelineError::InvalidConfig(format!(
                "max retries {} exceeds the limit of {}",
                self.max_retries, MAX_RETRIES_LIMIT
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resolved_cache_directory(&self) -> Option<PathBuf> {
        self.cache_directory.clone().or_else(get_cache_dir)
    }

    pub fn cleaned_data_path(&self) -> PathBuf {
        self.output_directory.join(CLEANED_DATA_FILE)
    }

    pub fn city_selection_path(&self) -> PathBuf {
        self.output_directory.join(CITY_SELECTION_FILE)
    }

    pub fn population_output_path(&self) -> PathBuf {
        self.output_directory.join(POPULATION_OUTPUT_FILE)
    }

    pub fn geo_catalog_path(&self) -> PathBuf {
        self.source_directory.join(&self.geo_catalog_file)
    }

    pub fn population_path(&self) -> PathBuf {
        self.source_directory.join(&self.population_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.source_directory, PathBuf::from("./data"));
        assert_eq!(config.date_range_start, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(config.date_range_end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(config.missing_threshold, 0.8);
        assert_eq!(config.extra_source_files, ["airquality-covid19-cities.json"]);
        assert!(!config.select_representative_cities);
        assert!(config.enrich_geo && config.enrich_weather && config.enrich_population);
        assert_eq!(config.cleaned_data_path(), PathBuf::from("./data/cleaned_data.csv"));
        assert_eq!(config.station_search_radius_km, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"output_directory": "out", "date_range_end": "2021-06-30", "enrich_weather": false}"#,
        )?;

        let config = PipelineConfig::from_json_file(&path)?;
        assert_eq!(config.output_directory, PathBuf::from("out"));
        assert_eq!(config.date_range_end, NaiveDate::from_ymd_opt(2021, 6, 30).unwrap());
        assert!(!config.enrich_weather);
        assert_eq!(config.measurement_prefix, "waqi-covid-");
        Ok(())
    }

    #[test]
    fn test_validate_rejects_inverted_range_and_bad_threshold() {
        let inverted = PipelineConfig::builder()
            .date_range_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .date_range_end(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
            .build();
        assert!(matches!(inverted.validate(), Err(PipelineError::InvalidConfig(_))));

        let threshold = PipelineConfig::builder().missing_threshold(1.5).build();
        assert!(matches!(threshold.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_radius_and_unbounded_retries() {
        let radius = PipelineConfig::builder().station_search_radius_km(0.0).build();
        assert!(matches!(radius.validate(), Err(PipelineError::InvalidConfig(_))));
        let radius = PipelineConfig::builder().station_search_radius_km(f64::NAN).build();
        assert!(matches!(radius.validate(), Err(PipelineError::InvalidConfig(_))));
        let radius = PipelineConfig::builder().station_search_radius_km(250.0).build();
        assert!(radius.validate().is_ok());

        let retries = PipelineConfig::builder().max_retries(u32::MAX).build();
        assert!(matches!(retries.validate(), Err(PipelineError::InvalidConfig(_))));
        let retries = PipelineConfig::builder()
            .max_retries(MAX_RETRIES_LIMIT)
            .build();
        assert!(retries.validate().is_ok());
    }
}
