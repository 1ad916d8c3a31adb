use crate::config::PipelineConfig;
use crate::enrichment::error::EnrichmentError;
use crate::stations::locate_station::StationLocator;
use crate::types::data_source::RequiredData;
use crate::types::lat_lon::LatLon;
use crate::types::station::Station;
use crate::weather_data::data_loader::WeatherDataLoader;
use crate::weather_data::filtering::DailyFrameFilterExt;
use chrono::NaiveDate;
use log::{debug, info};
use polars::prelude::DataFrame;
use reqwest::Client;

/// Where the weather enricher gets stations and daily observations from.
#[allow(async_fn_in_trait)]
pub trait WeatherSource {
    /// The station observations for `location` are taken from, if any.
    async fn nearest_station(&self, location: LatLon) -> Result<Option<Station>, EnrichmentError>;

    /// Daily observations of `station` between `start` and `end` (inclusive).
    ///
    /// The frame has a `date` column and one column per observed field.
    async fn daily_observations(
        &self,
        station: &Station,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, EnrichmentError>;
}

/// Meteostat bulk data: station catalog plus per-station daily files, both cached
/// on disk.
pub struct MeteostatSource {
    locator: StationLocator,
    loader: WeatherDataLoader,
    max_distance_km: Option<f64>,
    required_data: Option<RequiredData>,
}

impl MeteostatSource {
    pub fn new(
        locator: StationLocator,
        loader: WeatherDataLoader,
        max_distance_km: Option<f64>,
        required_data: Option<RequiredData>,
    ) -> Self {
        MeteostatSource {
            locator,
            loader,
            max_distance_km,
            required_data,
        }
    }

    /// Opens the cache directory, builds an HTTP client with the configured timeout
    /// and loads the station catalog.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self, EnrichmentError> {
        let cache_dir = config
            .resolved_cache_directory()
            .ok_or(EnrichmentError::CacheDirResolution)?;
        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| EnrichmentError::CacheDirCreation(cache_dir.clone(), e))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(EnrichmentError::ClientBuild)?;

        let locator = StationLocator::new(&cache_dir, &client).await?;
        info!("Station catalog holds {} stations", locator.len());
        let loader = WeatherDataLoader::new(&cache_dir, client, config.max_retries);
        let required_data = config.require_daily_inventory.then_some(RequiredData::Overlapping {
            start: config.date_range_start,
            end: config.date_range_end,
        });

        Ok(Self::new(
            locator,
            loader,
            config.station_search_radius_km,
            required_data,
        ))
    }
}

impl WeatherSource for MeteostatSource {
    async fn nearest_station(&self, location: LatLon) -> Result<Option<Station>, EnrichmentError> {
        let nearest = self
            .locator
            .nearest(location, self.max_distance_km, self.required_data);
        if let Some((station, distance_km)) = &nearest {
            debug!(
                "Nearest station to {:?} is {} ({}) at {:.1} km",
                location,
                station.id,
                station.display_name(),
                distance_km
            );
        }
        Ok(nearest.map(|(station, _)| station))
    }

    async fn daily_observations(
        &self,
        station: &Station,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, EnrichmentError> {
        let frame = self.loader.get_daily_frame(&station.id).await?;
        Ok(frame.filter_daily(start, end).collect()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "downloads the Meteostat station catalog and daily data"]
    async fn test_meteostat_source_for_berlin() -> Result<(), EnrichmentError> {
        let cache = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .cache_directory(cache.path())
            .build();
        let source = MeteostatSource::from_config(&config).await?;

        let station = source
            .nearest_station(LatLon(52.52, 13.405))
            .await?
            .expect("a station near Berlin");
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        let daily = source.daily_observations(&station, start, end).await?;
        assert!(daily.height() <= 31);
        assert!(daily.height() > 0);
        Ok(())
    }
}
