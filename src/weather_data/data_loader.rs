use crate::types::data_source::{daily_observation_columns, DAILY_PATH_SEGMENT, DAILY_SCHEMA};
use crate::types::columns::DATE;
use crate::weather_data::error::WeatherDataError;
use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use polars::prelude::*;
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::{fs, task};
use tokio_util::io::StreamReader;

const BULK_URL: &str = "https://bulk.meteostat.net/v2";
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Downloads, parses and caches per-station daily observation files.
pub struct WeatherDataLoader {
    cache_dir: PathBuf,
    download_client: Client,
    max_retries: u32,
}

impl WeatherDataLoader {
    pub fn new(cache_dir: &Path, download_client: Client, max_retries: u32) -> WeatherDataLoader {
        WeatherDataLoader {
            cache_dir: cache_dir.to_path_buf(),
            download_client,
            max_retries,
        }
    }

    /// Loads the daily frame for a station, downloading and caching it as parquet
    /// on a cache miss. The returned frame has a `date` column of type `Date`
    /// and Float64 observation columns.
    pub async fn get_daily_frame(&self, station: &str) -> Result<LazyFrame, WeatherDataError> {
        let cache_filename = format!("{}-{}.parquet", DAILY_PATH_SEGMENT, station);
        let parquet_path = self.cache_dir.join(&cache_filename);

        if fs::metadata(&parquet_path).await.is_ok() {
            debug!("Cache hit for daily data of station {} at {:?}", station, parquet_path);
        } else {
            info!("Cache miss for daily data of station {}. Downloading.", station);

            let raw_bytes = self.download(station).await?;
            let df = Self::csv_to_dataframe(raw_bytes, station).await?;

            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| WeatherDataError::CacheDirCreation(self.cache_dir.clone(), e))?;

            Self::cache_dataframe(df, &parquet_path).await?;
            debug!("Cached daily data for station {} to {:?}", station, parquet_path);
        }

        LazyFrame::scan_parquet(&parquet_path, Default::default())
            .map_err(|e| WeatherDataError::ParquetScan(parquet_path.clone(), e))
    }

    /// Downloads the gzip CSV for a station, retrying transient failures with
    /// exponential backoff. Every attempt issues the same GET request.
    async fn download(&self, station: &str) -> Result<Vec<u8>, WeatherDataError> {
        let url = format!("{}/{}/{}.csv.gz", BULK_URL, DAILY_PATH_SEGMENT, station);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_once(&url, attempt).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let delay = retry_delay(attempt);
                    warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt, url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_once(&self, url: &str, attempt: u32) -> Result<Vec<u8>, WeatherDataError> {
        let response = self
            .download_client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(url, attempt, e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(match e.status() {
                    Some(status) => WeatherDataError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    },
                    None => WeatherDataError::NetworkRequest(url.to_string(), e),
                });
            }
        };

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let stream_reader = StreamReader::new(stream);
        let mut decoder = GzipDecoder::new(stream_reader);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).await?;
        debug!("Downloaded and decompressed {} bytes from {}", decompressed.len(), url);
        Ok(decompressed)
    }

    /// Parses raw CSV bytes (without header) into a DataFrame using a blocking task.
    /// Assigns the daily schema names and coerces column types.
    async fn csv_to_dataframe(bytes: Vec<u8>, station: &str) -> Result<DataFrame, WeatherDataError> {
        let station_owned = station.to_string();

        task::spawn_blocking(move || {
            let csv_io_error = |source| WeatherDataError::CsvReadIo {
                station: station_owned.clone(),
                source,
            };
            let mut temp_file = NamedTempFile::new().map_err(csv_io_error)?;
            temp_file.write_all(&bytes).map_err(csv_io_error)?;
            temp_file.flush().map_err(csv_io_error)?;

            let csv_polars_error = |source| WeatherDataError::CsvReadPolars {
                station: station_owned.clone(),
                source,
            };
            let mut df = CsvReadOptions::default()
                .with_has_header(false)
                .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))
                .map_err(csv_polars_error)?
                .finish()
                .map_err(csv_polars_error)?;

            if df.width() != DAILY_SCHEMA.len() {
                return Err(WeatherDataError::SchemaMismatch {
                    station: station_owned,
                    expected: DAILY_SCHEMA.len(),
                    found: df.width(),
                });
            }

            df.set_column_names(DAILY_SCHEMA.iter().copied())
                .map_err(|e| WeatherDataError::ColumnRenameError {
                    station: station_owned.clone(),
                    source: e,
                })?;

            let mut typed = vec![col(DATE)
                .cast(DataType::String)
                .str()
                .to_date(StrptimeOptions {
                    format: Some("%Y-%m-%d".into()),
                    strict: false,
                    ..Default::default()
                })
                .alias(DATE)];
            typed.extend(
                daily_observation_columns()
                    .iter()
                    .map(|name| col(*name).cast(DataType::Float64)),
            );

            df.lazy()
                .select(typed)
                .collect()
                .map_err(|e| WeatherDataError::CsvReadPolars {
                    station: station_owned,
                    source: e,
                })
        })
        .await?
    }

    /// Writes a DataFrame to a Parquet file using spawn_blocking.
    async fn cache_dataframe(mut df: DataFrame, path: &Path) -> Result<(), WeatherDataError> {
        let path_buf = path.to_path_buf();
        task::spawn_blocking(move || {
            let file = std::fs::File::create(&path_buf)
                .map_err(|e| WeatherDataError::ParquetWriteIo(path_buf.clone(), e))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)
                .map_err(|e| WeatherDataError::ParquetWritePolars(path_buf, e))?;
            Ok::<(), WeatherDataError>(())
        })
        .await??;
        Ok(())
    }
}

/// Exponential backoff for the given 1-based attempt. Saturates instead of overflowing.
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BASE_DELAY.saturating_mul(factor)
}

fn classify_request_error(url: &str, attempts: u32, e: reqwest::Error) -> WeatherDataError {
    if e.is_timeout() {
        WeatherDataError::Timeout {
            url: url.to_string(),
            attempts,
            source: e,
        }
    } else {
        WeatherDataError::NetworkRequest(url.to_string(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "2020-01-01,3.4,1.2,5.8,0.3,,250,14.8,,1012.3,\n\
                          2020-01-02,4.1,2.0,6.2,0.0,,,12.1,,1015.0,\n";

    #[test]
    fn test_retry_delay_doubles_and_saturates() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_delay(4), Duration::from_millis(4000));
        assert_eq!(retry_delay(40), RETRY_BASE_DELAY.saturating_mul(u32::MAX));
        assert_eq!(retry_delay(u32::MAX), retry_delay(40));
    }

    #[tokio::test]
    async fn test_csv_to_dataframe_assigns_daily_schema() -> Result<(), WeatherDataError> {
        let df = WeatherDataLoader::csv_to_dataframe(SAMPLE.as_bytes().to_vec(), "10384").await?;

        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, DAILY_SCHEMA);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("date")?.dtype(), &DataType::Date);
        assert_eq!(df.column("snow")?.dtype(), &DataType::Float64);
        assert_eq!(df.column("snow")?.null_count(), 2);
        assert_eq!(df.column("tavg")?.f64()?.get(1), Some(4.1));
        Ok(())
    }

    #[tokio::test]
    async fn test_csv_with_wrong_width_is_rejected() {
        let result =
            WeatherDataLoader::csv_to_dataframe(b"2020-01-01,1.0,2.0\n".to_vec(), "x").await;
        assert!(matches!(
            result,
            Err(WeatherDataError::SchemaMismatch { found: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_cached_parquet_is_served_without_download() -> Result<(), WeatherDataError> {
        let cache = tempfile::tempdir()?;
        let df = WeatherDataLoader::csv_to_dataframe(SAMPLE.as_bytes().to_vec(), "10384").await?;
        WeatherDataLoader::cache_dataframe(df, &cache.path().join("daily-10384.parquet")).await?;

        // The client is never used on a cache hit.
        let loader = WeatherDataLoader::new(cache.path(), Client::new(), 0);
        let frame = loader.get_daily_frame("10384").await?.collect()?;
        assert_eq!(frame.height(), 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "downloads daily data from the Meteostat bulk endpoint"]
    async fn test_download_daily_berlin_tempelhof() -> Result<(), WeatherDataError> {
        let cache = tempfile::tempdir()?;
        let loader = WeatherDataLoader::new(cache.path(), Client::new(), 2);
        let frame = loader.get_daily_frame("10384").await?.collect()?;
        assert!(frame.height() > 10_000);
        Ok(())
    }
}
