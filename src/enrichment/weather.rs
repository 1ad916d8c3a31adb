//! Weather Enricher: joins daily observations of each city's nearest station.
//!
//! Cities are processed one after another. A city whose station cannot be found
//! or whose data cannot be fetched is logged and left without weather values.
//! Columns that are mostly empty across all collected observations are dropped
//! before the join on (city, date).

use crate::config::PipelineConfig;
use crate::enrichment::error::EnrichmentError;
use crate::enrichment::left_join_sorted;
use crate::enrichment::weather_source::WeatherSource;
use crate::types::columns::{CITY, DATE, LATITUDE, LONGITUDE};
use crate::types::lat_lon::LatLon;
use crate::utils::{has_column, normalize_name};
use crate::weather_data::filtering::DailyFrameFilterExt;
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::HashSet;

/// Distinct cities in first-seen order, with coordinates when the row has both.
pub fn city_locations(table: &DataFrame) -> PolarsResult<Vec<(String, Option<LatLon>)>> {
    let latitudes = table.column(LATITUDE)?.cast(&DataType::Float64)?;
    let longitudes = table.column(LONGITUDE)?.cast(&DataType::Float64)?;
    let cities = table.column(CITY)?.str()?;

    let mut seen = HashSet::new();
    let mut locations = Vec::new();
    for ((city, latitude), longitude) in cities
        .into_iter()
        .zip(latitudes.f64()?)
        .zip(longitudes.f64()?)
    {
        let Some(city) = city else { continue };
        if seen.insert(city) {
            locations.push((city.to_string(), LatLon::from_parts(latitude, longitude)));
        }
    }
    Ok(locations)
}

/// Drops every column whose fraction of nulls is above `threshold`.
/// `city` and `date` are always kept.
pub fn drop_sparse_columns(weather: &DataFrame, threshold: f64) -> PolarsResult<DataFrame> {
    let height = weather.height();
    let mut kept = Vec::new();
    for column in weather.get_columns() {
        let name = column.name().as_str();
        let missing_fraction = if height == 0 {
            0.0
        } else {
            column.null_count() as f64 / height as f64
        };
        if name == CITY || name == DATE || missing_fraction <= threshold {
            kept.push(col(name));
        } else {
            info!(
                "Dropping weather column '{}': {:.0}% missing",
                name,
                missing_fraction * 100.0
            );
        }
    }
    weather.clone().lazy().select(kept).collect()
}

async fn fetch_city_weather<S: WeatherSource>(
    source: &S,
    city: &str,
    location: LatLon,
    config: &PipelineConfig,
) -> Result<Option<LazyFrame>, EnrichmentError> {
    let Some(station) = source.nearest_station(location).await? else {
        return Ok(None);
    };
    let daily = source
        .daily_observations(&station, config.date_range_start, config.date_range_end)
        .await?;
    debug!(
        "Fetched {} days for {} from station {}",
        daily.height(),
        city,
        station.id
    );

    let observations: Vec<&str> = daily
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| *name != DATE)
        .collect();
    let tagged = daily
        .clone()
        .lazy()
        .drop_empty_observations(&observations)
        .with_column(lit(city).alias(CITY));
    Ok(Some(tagged))
}

/// Fetches and combines the observations of every locatable city in `table`.
/// Returns `None` when no city produced any observations.
pub async fn collect_weather<S: WeatherSource>(
    table: &DataFrame,
    source: &S,
    config: &PipelineConfig,
) -> Result<Option<DataFrame>, EnrichmentError> {
    let mut frames = Vec::new();
    for (city, location) in city_locations(table)? {
        let Some(location) = location else {
            debug!("No coordinates for {}, skipping weather", city);
            continue;
        };
        match fetch_city_weather(source, &city, location, config).await {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => warn!("No weather station near {} ({:?})", city, location),
            Err(e) => warn!("Weather lookup failed for {}: {}", city, e),
        }
    }
    if frames.is_empty() {
        return Ok(None);
    }

    let combined = concat_lf_diagonal(frames, UnionArgs::default())?.collect()?;
    let renamed: Vec<Expr> = combined
        .get_column_names()
        .iter()
        .map(|name| col(name.as_str()).alias(normalize_name(name.as_str())))
        .collect();
    let normalized = combined
        .lazy()
        .select(renamed)
        .with_column(
            col(DATE)
                .cast(DataType::Date)
                .dt()
                .to_string("%Y-%m-%d")
                .alias(DATE),
        )
        .collect()?;

    if normalized.height() == 0 {
        return Ok(None);
    }
    Ok(Some(drop_sparse_columns(&normalized, config.missing_threshold)?))
}

/// Adds the daily weather of each city's nearest station, joined on (city, date).
/// Never fails: the table is returned unchanged when no weather is available.
pub async fn enrich_with_weather<S: WeatherSource>(
    table: &DataFrame,
    source: &S,
    config: &PipelineConfig,
) -> DataFrame {
    if !has_column(table, LATITUDE) || !has_column(table, LONGITUDE) {
        warn!("Skipping weather enrichment: table has no coordinates");
        return table.clone();
    }

    let weather = match collect_weather(table, source, config).await {
        Ok(Some(weather)) => weather,
        Ok(None) => {
            warn!("Skipping weather enrichment: no observations for any city");
            return table.clone();
        }
        Err(e) => {
            warn!("Skipping weather enrichment: {}", e);
            return table.clone();
        }
    };
    info!(
        "Collected {} weather rows with columns {:?}",
        weather.height(),
        weather.get_column_names()
    );

    match left_join_sorted(table, weather.lazy(), &[CITY, DATE]) {
        Ok(joined) => joined,
        Err(e) => {
            warn!("Skipping weather enrichment, join failed: {}", e);
            table.clone()
        }
    }
}
