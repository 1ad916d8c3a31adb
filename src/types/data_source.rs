//! Describes the Meteostat daily bulk data source and the inventory requirements
//! used when picking a station for a city.

use chrono::NaiveDate;

/// Path segment of the daily bulk endpoint, also used as cache file prefix.
pub(crate) const DAILY_PATH_SEGMENT: &str = "daily";

/// Column names of the header-less daily CSV files, in file order.
pub const DAILY_SCHEMA: [&str; 11] = [
    "date", "tavg", "tmin", "tmax", "prcp", "snow", "wdir", "wspd", "wpgt", "pres", "tsun",
];

/// Observation columns of [`DAILY_SCHEMA`] (everything except the date).
pub fn daily_observation_columns() -> &'static [&'static str] {
    &DAILY_SCHEMA[1..]
}

/// Specifies what daily data availability a station must report before it is
/// considered as the nearest station for a city.
///
/// These checks rely on the station metadata provided by Meteostat and don't
/// guarantee that every single day within a reported range actually exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredData {
    /// The station's daily range overlaps the given window (inclusive).
    /// A station that covers only part of the window still qualifies.
    Overlapping {
        /// Window start (inclusive).
        start: NaiveDate,
        /// Window end (inclusive).
        end: NaiveDate,
    },
}
