//! Siphon Content Fetcher
//!
//! Retrieves task input bytes by URL scheme:
//!
//! | scheme | backend |
//! |---|---|
//! | `file://` or a bare absolute path | local disk, read synchronously |
//! | `s3://` | Amazon S3 (credentials from `AWS_*` environment) |
//! | `gs://` | Google Cloud Storage (`GOOGLE_*` environment) |
//! | `az://`, `azure://`, `abfs://`, `abfss://` | Azure Blob Storage (`AZURE_*` environment) |
//! | `http://`, `https://` | HTTP GET, optionally with a client certificate |
//!
//! Failures are isolated per task id: [`ContentFetcher::fetch_all`] never
//! fails as a whole, and there is no retry at this layer.

#![warn(missing_docs)]

mod error;

pub use error::FetchError;

use futures::future::join_all;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use siphon_domain::TaskId;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default timeout for a single HTTP fetch
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Storage backend selected for a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Local filesystem
    Local,
    /// Amazon S3
    S3,
    /// Google Cloud Storage
    Gcs,
    /// Azure Blob Storage
    Azure,
    /// Plain HTTP(S)
    Http,
}

impl StorageKind {
    /// Classify a storage URL
    pub fn of(url: &str) -> Result<Self, FetchError> {
        if url.starts_with('/') {
            return Ok(StorageKind::Local);
        }
        let (scheme, _) = url
            .split_once("://")
            .or_else(|| url.split_once(":/"))
            .ok_or_else(|| FetchError::UnsupportedUrl(url.to_string()))?;
        match scheme.to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::Local),
            "s3" | "s3a" => Ok(StorageKind::S3),
            "gs" => Ok(StorageKind::Gcs),
            "az" | "azure" | "abfs" | "abfss" => Ok(StorageKind::Azure),
            "http" | "https" => Ok(StorageKind::Http),
            _ => Err(FetchError::UnsupportedUrl(url.to_string())),
        }
    }
}

/// PEM-encoded client credentials for mutual TLS
#[derive(Debug, Clone, Default)]
pub struct ClientTls {
    /// CA bundle used to verify servers
    pub ca_bundle: Option<Vec<u8>>,
    /// Client certificate chain and PKCS#8 private key
    pub identity: Option<(Vec<u8>, Vec<u8>)>,
}

/// Fetches content bytes from heterogeneous storage
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    http: reqwest::Client,
}

impl ContentFetcher {
    /// Create a fetcher with a plain HTTP client
    pub fn new() -> Result<Self, FetchError> {
        Self::with_tls(&ClientTls::default())
    }

    /// Create a fetcher whose HTTP client presents the given credentials
    pub fn with_tls(tls: &ClientTls) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .use_native_tls();

        if let Some(ca) = &tls.ca_bundle {
            let cert = reqwest::Certificate::from_pem(ca).map_err(|e| FetchError::Tls(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some((cert, key)) = &tls.identity {
            let identity =
                reqwest::Identity::from_pkcs8_pem(cert, key).map_err(|e| FetchError::Tls(e.to_string()))?;
            builder = builder.identity(identity);
        }

        let http = builder.build().map_err(|e| FetchError::Tls(e.to_string()))?;
        Ok(Self { http })
    }

    /// Fetch every URL, returning one result per task id
    ///
    /// Local files are read first, in the calling task. Remote URLs are then
    /// fetched concurrently.
    pub async fn fetch_all(&self, urls: HashMap<TaskId, String>) -> HashMap<TaskId, Result<Vec<u8>, FetchError>> {
        let mut out = HashMap::with_capacity(urls.len());
        let mut remote = Vec::new();

        for (task_id, url) in urls {
            match StorageKind::of(&url) {
                Ok(StorageKind::Local) => {
                    out.insert(task_id, read_local(&url));
                }
                Ok(kind) => remote.push((task_id, url, kind)),
                Err(e) => {
                    out.insert(task_id, Err(e));
                }
            }
        }

        let fetches = remote.into_iter().map(|(task_id, url, kind)| async move {
            let result = self.fetch_remote(&url, kind).await;
            (task_id, result)
        });
        out.extend(join_all(fetches).await);

        for (task_id, result) in &out {
            if let Err(e) = result {
                warn!(task_id = %task_id, error = %e, "Fetch failed");
            }
        }
        out
    }

    /// Fetch a single URL
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match StorageKind::of(url)? {
            StorageKind::Local => read_local(url),
            kind => self.fetch_remote(url, kind).await,
        }
    }

    async fn fetch_remote(&self, url: &str, kind: StorageKind) -> Result<Vec<u8>, FetchError> {
        debug!(url, ?kind, "Fetching content");
        match kind {
            StorageKind::Local => read_local(url),
            StorageKind::Http => self.fetch_http(url).await,
            StorageKind::S3 | StorageKind::Gcs | StorageKind::Azure => fetch_object(url, kind).await,
        }
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn read_local(url: &str) -> Result<Vec<u8>, FetchError> {
    let path = if url.starts_with('/') {
        std::path::PathBuf::from(url)
    } else if let Ok(parsed) = Url::parse(url) {
        parsed
            .to_file_path()
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?
    } else {
        // "file:/abs/path" with a single slash
        std::path::PathBuf::from(url.trim_start_matches("file:"))
    };

    std::fs::read(&path).map_err(|source| FetchError::Io {
        path: path.display().to_string(),
        source,
    })
}

async fn fetch_object(url: &str, kind: StorageKind) -> Result<Vec<u8>, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let store: Box<dyn ObjectStore> = match kind {
        StorageKind::S3 => Box::new(AmazonS3Builder::from_env().with_url(url).build()?),
        StorageKind::Gcs => Box::new(GoogleCloudStorageBuilder::from_env().with_url(url).build()?),
        StorageKind::Azure => Box::new(MicrosoftAzureBuilder::from_env().with_url(url).build()?),
        StorageKind::Local | StorageKind::Http => return Err(FetchError::UnsupportedUrl(url.to_string())),
    };
    let path = ObjectPath::from_url_path(parsed.path())
        .map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

    let bytes = store.get(&path).await?.bytes().await?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_dispatch() {
        assert_eq!(StorageKind::of("file:///tmp/a").unwrap(), StorageKind::Local);
        assert_eq!(StorageKind::of("file:/tmp/a").unwrap(), StorageKind::Local);
        assert_eq!(StorageKind::of("/tmp/a").unwrap(), StorageKind::Local);
        assert_eq!(StorageKind::of("s3://bucket/key").unwrap(), StorageKind::S3);
        assert_eq!(StorageKind::of("gs://bucket/key").unwrap(), StorageKind::Gcs);
        assert_eq!(StorageKind::of("az://container/blob").unwrap(), StorageKind::Azure);
        assert_eq!(StorageKind::of("HTTPS://example.com/x").unwrap(), StorageKind::Http);
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            StorageKind::of("ftp://host/file"),
            Err(FetchError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            StorageKind::of("relative/path"),
            Err(FetchError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn test_read_local_single_slash_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, b"hello").unwrap();

        let url = format!("file:{}", path.display());
        assert_eq!(read_local(&url).unwrap(), b"hello");
    }
}
