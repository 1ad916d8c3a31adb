//! Geo Enricher: attaches latitude and longitude to every city of the wide table.
//!
//! Coordinates come from the WAQI city catalog, a JSON document of the form
//! `{"data": [{"Place": {"name": "Berlin", "geo": [52.52, 13.405]}}, ...]}`.

use crate::enrichment::error::EnrichmentError;
use crate::enrichment::left_join_sorted;
use crate::types::columns::{CITY, LATITUDE, LONGITUDE};
use crate::types::lat_lon::LatLon;
use crate::utils::normalize_name;
use log::{info, warn};
use polars::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct GeoCatalog {
    #[serde(default)]
    data: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "Place", default)]
    place: Option<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: Option<String>,
    geo: Option<Vec<Option<f64>>>,
}

/// Output of the geo stage.
#[derive(Debug, Clone)]
pub struct GeoEnrichment {
    pub table: DataFrame,
    /// Cities of the table without coordinates, sorted.
    pub unmatched_cities: Vec<String>,
}

/// Parses a catalog document into normalized city name -> coordinates.
///
/// Entries without a name or a usable `[latitude, longitude]` pair are dropped.
/// When two entries normalize to the same name the later one wins.
pub fn parse_geo_catalog(text: &str) -> Result<BTreeMap<String, LatLon>, serde_json::Error> {
    let catalog: GeoCatalog = serde_json::from_str(text)?;

    let mut reference = BTreeMap::new();
    for place in catalog.data.into_iter().filter_map(|entry| entry.place) {
        let Some(name) = place.name.map(|n| normalize_name(&n)).filter(|n| !n.is_empty()) else {
            continue;
        };
        let coordinates = place.geo.and_then(|geo| match geo.as_slice() {
            [latitude, longitude, ..] => LatLon::from_parts(*latitude, *longitude),
            _ => None,
        });
        if let Some(coordinates) = coordinates {
            reference.insert(name, coordinates);
        }
    }
    Ok(reference)
}

pub fn load_geo_reference(path: &Path) -> Result<BTreeMap<String, LatLon>, EnrichmentError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EnrichmentError::ReferenceRead(path.to_path_buf(), e))?;
    parse_geo_catalog(&text).map_err(|e| EnrichmentError::ReferenceParse(path.to_path_buf(), e))
}

fn reference_frame(reference: &BTreeMap<String, LatLon>) -> PolarsResult<DataFrame> {
    let cities: Vec<&str> = reference.keys().map(String::as_str).collect();
    let latitudes: Vec<f64> = reference.values().map(|c| c.0).collect();
    let longitudes: Vec<f64> = reference.values().map(|c| c.1).collect();
    df!(CITY => cities, LATITUDE => latitudes, LONGITUDE => longitudes)
}

fn unmatched_cities(table: &DataFrame) -> PolarsResult<Vec<String>> {
    let missing = table
        .clone()
        .lazy()
        .filter(col(LATITUDE).is_null())
        .select([col(CITY)])
        .collect()?;
    let cities: BTreeSet<&str> = missing.column(CITY)?.str()?.into_iter().flatten().collect();
    Ok(cities.into_iter().map(str::to_string).collect())
}

/// Joins a loaded reference onto the wide table by `city`.
pub fn join_geo_reference(
    wide: &DataFrame,
    reference: &BTreeMap<String, LatLon>,
) -> PolarsResult<GeoEnrichment> {
    let table = left_join_sorted(wide, reference_frame(reference)?.lazy(), &[CITY])?;
    let unmatched_cities = unmatched_cities(&table)?;
    Ok(GeoEnrichment {
        table,
        unmatched_cities,
    })
}

/// Adds `latitude` and `longitude` columns. Never fails: a catalog that cannot be
/// loaded or joined leaves the table as it was.
pub fn enrich_with_geo(wide: &DataFrame, catalog_path: &Path) -> GeoEnrichment {
    let passthrough = || GeoEnrichment {
        table: wide.clone(),
        unmatched_cities: Vec::new(),
    };

    let reference = match load_geo_reference(catalog_path) {
        Ok(reference) => reference,
        Err(e) => {
            warn!("Skipping geo enrichment: {}", e);
            return passthrough();
        }
    };
    info!(
        "Loaded coordinates for {} cities from {}",
        reference.len(),
        catalog_path.display()
    );

    match join_geo_reference(wide, &reference) {
        Ok(enriched) => {
            if !enriched.unmatched_cities.is_empty() {
                warn!(
                    "No coordinates for {} cities: {}",
                    enriched.unmatched_cities.len(),
                    enriched.unmatched_cities.join(", ")
                );
            }
            enriched
        }
        Err(e) => {
            warn!("Skipping geo enrichment, join failed: {}", e);
            passthrough()
        }
    }
}
