//! Defines the data structures representing Meteostat weather stations and the
//! parts of their metadata the pipeline relies on (location and daily inventory).
//! Also includes implementations necessary for spatial indexing using the `rstar` crate.

use chrono::NaiveDate;
use rstar::{PointDistance, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents a single Meteostat weather station and its associated metadata.
///
/// Fields mirror the Meteostat `lite` stations catalog. Catalog fields the
/// pipeline does not use (identifiers, hourly/monthly inventory) are ignored
/// during deserialization.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// The unique Meteostat station identifier (e.g., "10637").
    pub id: String,
    /// The country code where the station is located (e.g., "NL", "DE").
    pub country: String,
    /// A map of station names in different languages (e.g., {"en": "Amsterdam Airport Schiphol"}).
    #[serde(default)]
    pub name: HashMap<String, String>,
    /// Geographical location details (latitude, longitude, elevation).
    pub location: Location,
    /// Information about the availability periods of daily data.
    pub inventory: Inventory,
    /// Position of the station in the catalog. Used to break distance ties.
    #[serde(skip)]
    pub catalog_index: usize,
}

impl Station {
    /// English display name, falling back to the station id.
    pub fn display_name(&self) -> &str {
        self.name.get("en").map(String::as_str).unwrap_or(&self.id)
    }
}

/// Stores the data availability range for daily data.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Inventory {
    /// The reported start and end dates for daily data.
    #[serde(default)]
    pub daily: DateRange,
}

/// Represents a date range with optional start and end dates.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DateRange {
    /// The earliest date for which data is reported available, if known.
    pub start: Option<NaiveDate>,
    /// The latest date for which data is reported available, if known.
    pub end: Option<NaiveDate>,
}

/// Represents the geographical location of a weather station.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Location {
    /// Latitude in decimal degrees (positive for North, negative for South).
    pub latitude: f64,
    /// Longitude in decimal degrees (positive for East, negative for West).
    pub longitude: f64,
    /// Elevation above sea level in meters, if available.
    pub elevation: Option<i32>,
}

// --- R-Tree Implementations ---

/// Implementation required by `rstar` to treat a `Station` as an object within an R-Tree.
impl RTreeObject for Station {
    type Envelope = AABB<[f64; 2]>;

    /// A station is a point, so its envelope is a degenerate AABB at (latitude, longitude).
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.latitude, self.location.longitude])
    }
}

/// Implementation required by `rstar` to calculate distances between stations and query points.
impl PointDistance for Station {
    /// Squared Euclidean distance in degree space.
    ///
    /// Only used to order R-tree candidates; the final ranking uses Haversine distances.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.location.latitude - point[0];
        let dy = self.location.longitude - point[1];
        dx * dx + dy * dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_catalog_entry_ignores_unused_fields() {
        let json = r#"{
            "id": "10384",
            "country": "DE",
            "region": "BE",
            "timezone": "Europe/Berlin",
            "name": {"en": "Berlin / Tempelhof"},
            "identifiers": {"national": null, "wmo": "10384", "icao": "EDDI"},
            "location": {"latitude": 52.4667, "longitude": 13.4, "elevation": 48},
            "inventory": {
                "daily": {"start": "1931-01-01", "end": "2024-06-30"},
                "hourly": {"start": null, "end": null},
                "monthly": {"start": 1931, "end": 2024}
            }
        }"#;

        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.id, "10384");
        assert_eq!(station.display_name(), "Berlin / Tempelhof");
        assert_eq!(
            station.inventory.daily.start,
            NaiveDate::from_ymd_opt(1931, 1, 1)
        );
        assert_eq!(station.catalog_index, 0);
    }
}
