//! Bulk download of the raw source files listed in a JSON manifest.
//!
//! The manifest maps target file names to URLs:
//! `{"waqi-covid-2020Q1.csv": "https://aqicn.org/.../waqi-covid-2020Q1.csv"}`.
//! Files are fetched one after another; a failed file is logged and skipped.

use futures_util::TryStreamExt;
use log::{info, warn};
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to read manifest '{0}'")]
    ManifestRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse manifest '{0}'")]
    ManifestParse(PathBuf, #[source] serde_json::Error),

    #[error("'{0}' is not a plain file name")]
    InvalidFileName(String),

    #[error("Failed to create target directory '{0}'")]
    TargetDir(PathBuf, #[source] std::io::Error),

    #[error("Request to {0} failed")]
    Request(String, #[source] reqwest::Error),

    #[error("Failed to write '{0}'")]
    Write(PathBuf, #[source] std::io::Error),
}

/// File name -> URL, in file name order.
pub fn load_manifest(path: &Path) -> Result<BTreeMap<String, String>, DownloadError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DownloadError::ManifestRead(path.to_path_buf(), e))?;
    serde_json::from_str(&text).map_err(|e| DownloadError::ManifestParse(path.to_path_buf(), e))
}

/// Joins `name` onto `target_dir`, refusing anything that is not a single path component.
pub fn target_path(target_dir: &Path, name: &str) -> Result<PathBuf, DownloadError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name);
    if !plain {
        return Err(DownloadError::InvalidFileName(name.to_string()));
    }
    Ok(target_dir.join(name))
}

/// Streams one URL into `path`.
pub async fn download_file(client: &Client, url: &str, path: &Path) -> Result<u64, DownloadError> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DownloadError::Request(url.to_string(), e))?;

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::Write(path.to_path_buf(), e))?;
    let written = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| DownloadError::Write(path.to_path_buf(), e))?;
    file.flush()
        .await
        .map_err(|e| DownloadError::Write(path.to_path_buf(), e))?;
    Ok(written)
}

/// Downloads every manifest entry into `target_dir` and returns the files written.
pub async fn download_sources(
    manifest: &BTreeMap<String, String>,
    target_dir: &Path,
    client: &Client,
) -> Result<Vec<PathBuf>, DownloadError> {
    tokio::fs::create_dir_all(target_dir)
        .await
        .map_err(|e| DownloadError::TargetDir(target_dir.to_path_buf(), e))?;

    let mut written = Vec::new();
    for (name, url) in manifest {
        let result = match target_path(target_dir, name) {
            Ok(path) => download_file(client, url, &path).await.map(|bytes| (path, bytes)),
            Err(e) => Err(e),
        };
        match result {
            Ok((path, bytes)) => {
                info!("Downloaded {} ({} bytes) to {}", url, bytes, path.display());
                written.push(path);
            }
            Err(e) => warn!("Skipping {}: {}", name, e),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves `/ok.csv` with a fixed body and answers 404 for anything else.
    async fn serve() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buffer = [0u8; 2048];
                let read = socket.read(&mut buffer).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buffer[..read]);
                let response = if request.starts_with("GET /ok.csv ") {
                    let body = "Date,Country,City,Specie,median\n";
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", address)
    }

    #[test]
    fn test_target_path_rejects_traversal() {
        let dir = Path::new("/data");
        assert_eq!(
            target_path(dir, "waqi-covid-2020Q1.csv").unwrap(),
            PathBuf::from("/data/waqi-covid-2020Q1.csv")
        );
        for name in ["", ".", "..", "../etc/passwd", "nested/file.csv", "a\\b.csv"] {
            assert!(matches!(
                target_path(dir, name),
                Err(DownloadError::InvalidFileName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_failed_entries_are_skipped() -> Result<(), DownloadError> {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let manifest = BTreeMap::from([
            ("waqi-covid-2020Q1.csv".to_string(), format!("{}/ok.csv", base)),
            ("waqi-covid-2020Q2.csv".to_string(), format!("{}/missing.csv", base)),
            ("../escape.csv".to_string(), format!("{}/ok.csv", base)),
        ]);
        let client = Client::builder().no_proxy().build().unwrap();

        let written = download_sources(&manifest, dir.path(), &client).await?;
        assert_eq!(written, [dir.path().join("waqi-covid-2020Q1.csv")]);
        let body = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(body, "Date,Country,City,Specie,median\n");
        assert!(!dir.path().join("waqi-covid-2020Q2.csv").exists());
        Ok(())
    }

    #[test]
    fn test_manifest_is_read_in_name_order() -> Result<(), DownloadError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"{"population.csv": "https://example.org/p.csv", "airquality-covid19-cities.json": "https://example.org/c.json"}"#,
        )
        .unwrap();
        let manifest = load_manifest(&path)?;
        let names: Vec<&str> = manifest.keys().map(String::as_str).collect();
        assert_eq!(names, ["airquality-covid19-cities.json", "population.csv"]);
        Ok(())
    }
}
