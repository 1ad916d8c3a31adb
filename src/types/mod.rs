pub mod columns;
pub mod data_source;
pub mod lat_lon;
pub mod station;
