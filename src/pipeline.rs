//! Runs the stages in order and persists the results.
//!
//! Import -> (city selection) -> aggregate/pivot -> checkpoint -> geo -> weather
//! -> population -> final table. Enrichment stages are optional and best-effort;
//! only an unusable output directory, a failed write or a measurement table
//! without its key columns stops a run.

use crate::config::PipelineConfig;
use crate::enrichment::geo::enrich_with_geo;
use crate::enrichment::population::enrich_with_population;
use crate::enrichment::weather::enrich_with_weather;
use crate::enrichment::weather_source::{MeteostatSource, WeatherSource};
use crate::error::PipelineError;
use crate::measurements::city_selector::apply_city_selection;
use crate::measurements::importer::import_records;
use crate::measurements::reshape::aggregate_and_pivot;
use crate::utils::{ensure_output_dir, write_csv};
use log::{info, warn};
use polars::prelude::DataFrame;
use std::path::PathBuf;

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The final wide, enriched table.
    pub table: DataFrame,
    /// Where `table` was written.
    pub output_path: PathBuf,
    /// Cities the geo catalog had no coordinates for.
    pub unmatched_cities: Vec<String>,
}

pub struct Pipeline<S = MeteostatSource> {
    config: PipelineConfig,
    weather_source: Option<S>,
}

impl Pipeline<MeteostatSource> {
    /// Validates `config` and, when weather enrichment is enabled, opens the
    /// Meteostat source. A source that cannot be opened disables the weather stage.
    pub async fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let weather_source = if config.enrich_weather {
            match MeteostatSource::from_config(&config).await {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!("Weather enrichment unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Ok(Pipeline {
            config,
            weather_source,
        })
    }
}

impl<S: WeatherSource> Pipeline<S> {
    /// Validates `config` and runs the weather stage against `weather_source`.
    pub fn with_weather_source(
        config: PipelineConfig,
        weather_source: S,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Pipeline {
            config,
            weather_source: Some(weather_source),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every configured stage. Returns `Ok(None)` when the source directory
    /// holds no usable measurement files.
    pub async fn run(&self) -> Result<Option<PipelineOutput>, PipelineError> {
        let config = &self.config;
        ensure_output_dir(&config.output_directory)?;

        let Some(mut long) = import_records(config) else {
            warn!("Nothing to process, no output written");
            return Ok(None);
        };

        if config.select_representative_cities {
            long = apply_city_selection(&long, config)?;
        }

        let mut table = aggregate_and_pivot(&long)?;
        let output_path = config.cleaned_data_path();
        write_csv(&mut table, &output_path)?;

        let mut unmatched_cities = Vec::new();
        if config.enrich_geo {
            let enriched = enrich_with_geo(&table, &config.geo_catalog_path());
            table = enriched.table;
            unmatched_cities = enriched.unmatched_cities;
        }

        if config.enrich_weather {
            match &self.weather_source {
                Some(source) => table = enrich_with_weather(&table, source, config).await,
                None => warn!("Weather enrichment enabled but no weather source is available"),
            }
        }

        if config.enrich_population {
            table = enrich_with_population(&table, config);
        }

        write_csv(&mut table, &output_path)?;
        info!(
            "Pipeline finished: {} rows x {} columns written to {}",
            table.height(),
            table.width(),
            output_path.display()
        );

        Ok(Some(PipelineOutput {
            table,
            output_path,
            unmatched_cities,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::error::EnrichmentError;
    use crate::types::columns::{DATE, LATITUDE, POPULATION};
    use crate::types::lat_lon::LatLon;
    use crate::types::station::{Inventory, Location, Station};
    use chrono::NaiveDate;
    use polars::prelude::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Every location gets a station; every station reports the same two days.
    struct FixedWeather;

    impl WeatherSource for FixedWeather {
        async fn nearest_station(
            &self,
            location: LatLon,
        ) -> Result<Option<Station>, EnrichmentError> {
            Ok(Some(Station {
                id: format!("{:.2}:{:.2}", location.0, location.1),
                country: String::new(),
                name: HashMap::new(),
                location: Location {
                    latitude: location.0,
                    longitude: location.1,
                    elevation: None,
                },
                inventory: Inventory::default(),
                catalog_index: 0,
            }))
        }

        async fn daily_observations(
            &self,
            _station: &Station,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<DataFrame, EnrichmentError> {
            Ok(df!(
                DATE => [
                    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2021, 1, 2).unwrap(),
                ],
                "tavg" => [1.5, 2.5],
            )?)
        }
    }

    const MEASUREMENTS: &str = "# WAQI export\n\
        Date,Country,City,Specie,count,min,max,median,variance\n\
        2021-01-01,DE,Berlin,pm25,10,1,50,10,4\n\
        2021-01-01,DE,Berlin,pm25,10,1,50,20,4\n\
        2021-01-01,DE,Berlin,wind gust,10,1,9,3,1\n\
        2021-01-02,DE,Berlin,pm25,10,1,50,12,4\n\
        2021-01-01,DE,Hamburg,pm25,10,1,50,8,4\n\
        2021-01-01,FR,Paris,no2,10,1,50,30,4\n";

    const CATALOG: &str = r#"{"data": [
        {"Place": {"name": "Berlin", "geo": [52.52, 13.405]}},
        {"Place": {"name": "Paris", "geo": [48.8566, 2.3522]}}
    ]}"#;

    const POPULATION_CSV: &str = "City,Value,Year\nBerlin,3600000,2021\nParis,2100000,2019\n";

    fn source_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("waqi-covid-2021Q1.csv"), MEASUREMENTS).unwrap();
        fs::write(dir.path().join("airquality-covid19-cities.json"), CATALOG).unwrap();
        fs::write(dir.path().join("population.csv"), POPULATION_CSV).unwrap();
        dir
    }

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig::builder()
            .source_directory(dir.path())
            .output_directory(dir.path().join("out"))
            .build()
    }

    #[tokio::test]
    async fn test_full_run_enriches_and_persists() -> Result<(), PipelineError> {
        let dir = source_dir();
        let pipeline = Pipeline::with_weather_source(config(&dir), FixedWeather)?;
        let output = pipeline.run().await?.expect("measurements were imported");
        let table = &output.table;

        let names: Vec<&str> = table.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "date", "country", "city", "year", "month", "day", "no2", "pm25", "wind-gust",
                "latitude", "longitude", "tavg", "population"
            ]
        );
        assert_eq!(table.height(), 4);

        let cities: Vec<Option<&str>> = table.column("city")?.str()?.into_iter().collect();
        assert_eq!(
            cities,
            [Some("berlin"), Some("hamburg"), Some("paris"), Some("berlin")]
        );
        let pm25: Vec<Option<f64>> = table.column("pm25")?.f64()?.into_iter().collect();
        assert_eq!(pm25, [Some(15.0), Some(8.0), None, Some(12.0)]);
        let tavg: Vec<Option<f64>> = table.column("tavg")?.f64()?.into_iter().collect();
        assert_eq!(tavg, [Some(1.5), None, Some(1.5), Some(2.5)]);
        let population: Vec<Option<i64>> = table.column(POPULATION)?.i64()?.into_iter().collect();
        assert_eq!(population, [Some(3600000), None, None, Some(3600000)]);
        assert_eq!(table.column(LATITUDE)?.null_count(), 1);
        assert_eq!(output.unmatched_cities, ["hamburg"]);

        let written = fs::read_to_string(&output.output_path)
            .map_err(|e| PipelineError::PersistIo(output.output_path.clone(), e))?;
        assert_eq!(written.lines().count(), 5);
        assert!(written.starts_with("date,country,city,year,month,day,no2,pm25,wind-gust,"));
        assert!(config(&dir).population_output_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_representative_city_run() -> Result<(), PipelineError> {
        let dir = source_dir();
        let config = PipelineConfig::builder()
            .source_directory(dir.path())
            .output_directory(dir.path().join("out"))
            .select_representative_cities(true)
            .enrich_weather(false)
            .enrich_population(false)
            .build();
        let output = Pipeline::with_weather_source(config.clone(), FixedWeather)?
            .run()
            .await?
            .expect("measurements were imported");

        assert_eq!(output.table.height(), 3);
        assert!(!crate::utils::has_column(&output.table, "tavg"));
        let selection = fs::read_to_string(config.city_selection_path())
            .map_err(|e| PipelineError::PersistIo(config.city_selection_path(), e))?;
        assert_eq!(selection, "Country,City,count\nDE,Berlin,4\nFR,Paris,1\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_source_directory_yields_none() -> Result<(), PipelineError> {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let output = Pipeline::with_weather_source(config.clone(), FixedWeather)?
            .run()
            .await?;
        assert!(output.is_none());
        assert!(config.output_directory.is_dir());
        assert!(!config.cleaned_data_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unusable_output_directory_is_an_error() {
        let dir = source_dir();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let config = PipelineConfig::builder()
            .source_directory(dir.path())
            .output_directory(&blocker)
            .build();

        let result = Pipeline::with_weather_source(config, FixedWeather)
            .unwrap()
            .run()
            .await;
        assert!(matches!(result, Err(PipelineError::OutputDirCreation(..))));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_running() {
        let dir = source_dir();
        let config = PipelineConfig::builder()
            .source_directory(dir.path())
            .output_directory(dir.path().join("out"))
            .missing_threshold(1.5)
            .build();

        let result = Pipeline::with_weather_source(config.clone(), FixedWeather);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
        assert!(!config.output_directory.exists());
    }
}
