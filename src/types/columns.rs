//! Column names shared by the pipeline stages.
//!
//! Raw export files use capitalized headers (`Date`, `Country`, ...). Every table
//! produced after reshaping uses the lowercase names.

/// Headers of the raw WAQI measurement exports.
pub mod raw {
    pub const DATE: &str = "Date";
    pub const COUNTRY: &str = "Country";
    pub const CITY: &str = "City";
    pub const SPECIE: &str = "Specie";
    pub const COUNT: &str = "count";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const MEDIAN: &str = "median";
    pub const VARIANCE: &str = "variance";

    /// Columns that are parsed as numbers in every source file.
    pub const NUMERIC: [&str; 5] = [COUNT, MIN, MAX, MEDIAN, VARIANCE];
}

pub const DATE: &str = "date";
pub const COUNTRY: &str = "country";
pub const CITY: &str = "city";
pub const SPECIE: &str = "specie";
pub const MEDIAN: &str = "median";
pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DAY: &str = "day";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const POPULATION: &str = "population";
pub const COUNT: &str = "count";

/// Key columns of the wide table, in output order.
pub const WIDE_KEYS: [&str; 3] = [DATE, COUNTRY, CITY];
/// Calendar parts derived from [`DATE`].
pub const CALENDAR_PARTS: [&str; 3] = [YEAR, MONTH, DAY];
