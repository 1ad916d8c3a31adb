use crate::stations::error::LocateStationError;
use crate::types::data_source::RequiredData;
use crate::types::lat_lon::LatLon;
use crate::types::station::{DateRange, Station};
use async_compression::tokio::bufread::GzipDecoder;
use bincode::config::{Configuration, Fixint, LittleEndian};
use futures_util::TryStreamExt;
use haversine::{distance, Location as HaversineLocation, Units};
use log::info;
use ordered_float::OrderedFloat;
use reqwest::Client;
use rstar::RTree;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::path::Path;
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::io::StreamReader;

const DATA_URL: &str = "https://bulk.meteostat.net/v2/stations/lite.json.gz";
const BINCODE_CACHE_FILE_NAME: &str = "stations_lite.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// Spatial index over the Meteostat station catalog.
#[derive(Debug, Clone)]
pub struct StationLocator {
    rtree: RTree<Station>,
}

// Heap entry for filtered queries. Ordered by distance, then catalog position.
struct StationCandidate<'a> {
    distance_km: OrderedFloat<f64>,
    station: &'a Station,
}
impl PartialEq for StationCandidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for StationCandidate<'_> {}
impl PartialOrd for StationCandidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for StationCandidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_km
            .cmp(&other.distance_km)
            .then(self.station.catalog_index.cmp(&other.station.catalog_index))
    }
}

fn haversine_km(latitude: f64, longitude: f64, station: &Station) -> f64 {
    distance(
        HaversineLocation {
            latitude,
            longitude,
        },
        HaversineLocation {
            latitude: station.location.latitude,
            longitude: station.location.longitude,
        },
        Units::Kilometers,
    )
}

impl StationLocator {
    /// Loads the station catalog from the bincode cache in `cache_dir`, downloading
    /// and caching it first when no cache file exists.
    pub async fn new(cache_dir: &Path, client: &Client) -> Result<Self, LocateStationError> {
        let cache_file = cache_dir.join(BINCODE_CACHE_FILE_NAME);

        let stations = if cache_file.exists() {
            let path_clone = cache_file.clone();
            tokio::task::spawn_blocking(move || Self::get_cached_stations(&path_clone)).await??
        } else {
            info!("Station cache not found. Fetching from URL: {}", DATA_URL);
            let stations = Self::fetch_stations(client).await?;
            Self::cache_stations(stations.clone(), &cache_file).await?;
            stations
        };

        Ok(Self::from_stations(stations))
    }

    /// Builds a locator from an in-memory catalog. Catalog order decides distance ties.
    pub fn from_stations(mut stations: Vec<Station>) -> Self {
        for (index, station) in stations.iter_mut().enumerate() {
            station.catalog_index = index;
        }
        StationLocator {
            rtree: RTree::bulk_load(stations),
        }
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    fn get_cached_stations(cache_path: &Path) -> Result<Vec<Station>, LocateStationError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| LocateStationError::CacheRead(cache_path.to_path_buf(), e))?;
        let (decoded_stations, _) =
            bincode::serde::decode_from_slice::<Vec<Station>, _>(&bytes, BINCODE_CONFIG).map_err(
                |e| LocateStationError::CacheDecode(cache_path.to_path_buf(), Box::from(e)),
            )?;
        Ok(decoded_stations)
    }

    async fn fetch_stations(client: &Client) -> Result<Vec<Station>, LocateStationError> {
        let response = client
            .get(DATA_URL)
            .send()
            .await
            .map_err(|e| LocateStationError::NetworkRequest(DATA_URL.to_string(), e))?;
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(match e.status() {
                    Some(status) => LocateStationError::HttpStatus {
                        url: DATA_URL.to_string(),
                        status,
                        source: e,
                    },
                    None => LocateStationError::NetworkRequest(DATA_URL.to_string(), e),
                });
            }
        };
        let stream = response.bytes_stream().map_err(io::Error::other);
        let stream_reader = StreamReader::new(stream);
        let gzip_decoder = GzipDecoder::new(BufReader::new(stream_reader));
        let mut decoder_reader = BufReader::new(gzip_decoder);
        let mut decompressed_json = Vec::with_capacity(20_000_000);
        decoder_reader.read_to_end(&mut decompressed_json).await?;

        let parse_start = std::time::Instant::now();
        let stations = tokio::task::spawn_blocking(move || {
            serde_json::from_slice::<Vec<Station>>(&decompressed_json)
                .map_err(LocateStationError::from)
        })
        .await??;
        info!(
            "Parsed {} stations from JSON in {:?}",
            stations.len(),
            parse_start.elapsed()
        );
        Ok(stations)
    }

    async fn cache_stations(
        stations: Vec<Station>,
        cache_path: &Path,
    ) -> Result<(), LocateStationError> {
        let bincode_data = tokio::task::spawn_blocking(move || {
            bincode::serde::encode_to_vec(stations, BINCODE_CONFIG)
                .map_err(|e| LocateStationError::CacheEncode(Box::new(e)))
        })
        .await??;
        tokio::fs::write(&cache_path, &bincode_data)
            .await
            .map_err(|e| LocateStationError::CacheWrite(cache_path.to_path_buf(), e))?;
        info!(
            "Wrote station cache ({} bytes) to {}",
            bincode_data.len(),
            cache_path.display()
        );
        Ok(())
    }

    /// The single nearest station, or `None`. With `max_distance_km` set, stations
    /// further away than that are not considered.
    pub fn nearest(
        &self,
        location: LatLon,
        max_distance_km: Option<f64>,
        required_data: Option<RequiredData>,
    ) -> Option<(Station, f64)> {
        self.query(location, 1, max_distance_km, required_data)
            .into_iter()
            .next()
    }

    /// Finds up to N nearest stations, sorted by Haversine distance and then by
    /// catalog position. Uses a fast path for plain proximity queries and a
    /// heap-based approach when an inventory requirement is given.
    pub fn query(
        &self,
        location: LatLon,
        n_results: usize,
        max_distance_km: Option<f64>,
        required_data: Option<RequiredData>,
    ) -> Vec<(Station, f64)> {
        if n_results == 0 {
            return vec![];
        }

        match required_data {
            None => self.fast_proximity_query(location, n_results, max_distance_km),
            Some(required) => {
                self.filtered_heap_query(location, n_results, max_distance_km, required)
            }
        }
    }

    fn fast_proximity_query(
        &self,
        location: LatLon,
        n_results: usize,
        max_distance_km: Option<f64>,
    ) -> Vec<(Station, f64)> {
        let LatLon(latitude, longitude) = location;

        // Degree-space ordering differs from Haversine ordering, so look at more
        // candidates than requested.
        let candidate_limit = (n_results * 2).max(20);

        let mut stations_with_dist: Vec<(Station, f64)> = self
            .rtree
            .nearest_neighbor_iter(&[latitude, longitude])
            .take(candidate_limit)
            .filter_map(|station| {
                let dist_km = haversine_km(latitude, longitude, station);
                max_distance_km
                    .is_none_or(|max| dist_km <= max)
                    .then(|| (station.to_owned(), dist_km))
            })
            .collect();

        stations_with_dist.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.catalog_index.cmp(&b.0.catalog_index))
        });
        stations_with_dist.truncate(n_results);
        stations_with_dist
    }

    fn filtered_heap_query(
        &self,
        location: LatLon,
        n_results: usize,
        max_distance_km: Option<f64>,
        required_data: RequiredData,
    ) -> Vec<(Station, f64)> {
        let LatLon(latitude, longitude) = location;
        let mut heap: BinaryHeap<StationCandidate<'_>> = BinaryHeap::with_capacity(n_results);

        for station in self.rtree.nearest_neighbor_iter(&[latitude, longitude]) {
            if !Self::check_daily_inventory(&station.inventory.daily, &required_data) {
                continue;
            }

            let dist_km = haversine_km(latitude, longitude, station);

            if let Some(max) = max_distance_km {
                if dist_km > max {
                    // Degree-space order only approximates great-circle order, so a
                    // few candidates past the radius are tolerated before giving up.
                    if dist_km > max * 2.0 {
                        break;
                    }
                    continue;
                }
            }

            let candidate = StationCandidate {
                distance_km: OrderedFloat(dist_km),
                station,
            };
            if heap.len() < n_results {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|c| (c.station.to_owned(), c.distance_km.into_inner()))
            .collect()
    }

    fn check_daily_inventory(inventory_range: &DateRange, required_data: &RequiredData) -> bool {
        let (Some(inv_start), Some(inv_end)) = (inventory_range.start, inventory_range.end) else {
            return false;
        };
        match required_data {
            RequiredData::Overlapping { start, end } => inv_start <= *end && inv_end >= *start,
        }
    }
}
