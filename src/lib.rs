mod config;
mod download;
mod enrichment;
mod error;
mod measurements;
mod pipeline;
mod stations;
mod types;
mod utils;
mod weather_data;

pub use config::*;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOutput};

pub use measurements::city_selector::{apply_city_selection, select_representative_cities};
pub use measurements::error::ImportError;
pub use measurements::importer::{import_records, read_measurement_file, SPECIES_SUBSTITUTIONS};
pub use measurements::reshape::{aggregate_and_pivot, aggregate_medians};

pub use enrichment::error::EnrichmentError;
pub use enrichment::geo::{enrich_with_geo, load_geo_reference, GeoEnrichment};
pub use enrichment::population::{enrich_with_population, load_population};
pub use enrichment::weather::{drop_sparse_columns, enrich_with_weather};
pub use enrichment::weather_source::{MeteostatSource, WeatherSource};

pub use download::{download_sources, load_manifest, DownloadError};

pub use types::columns;
pub use types::data_source::{RequiredData, DAILY_SCHEMA};
pub use types::lat_lon::LatLon;
pub use types::station::*;

pub use stations::error::LocateStationError;
pub use stations::locate_station::StationLocator;
pub use weather_data::data_loader::WeatherDataLoader;
pub use weather_data::error::WeatherDataError;
