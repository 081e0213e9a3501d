use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{EtlError, Result};

/// Opaque byte-stream source/sink, standing in for the object store the
/// engine's collaborators own. The core never interprets locators; picking
/// an implementation is the wrapper's job.
pub trait BlobStore {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
    fn put(&self, locator: &str, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed store: locators are plain paths.
#[derive(Debug, Default)]
pub struct FsBlobStore;

impl BlobStore for FsBlobStore {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        fs::read(locator).map_err(|e| EtlError::Storage(format!("fetching `{locator}`: {e}")))
    }

    fn put(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = Path::new(locator).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| EtlError::Storage(format!("creating `{}`: {e}", parent.display())))?;
            }
        }
        fs::write(locator, bytes)
            .map_err(|e| EtlError::Storage(format!("writing `{locator}`: {e}")))?;
        info!(locator, len = bytes.len(), "wrote blob");
        Ok(())
    }
}

/// HTTP(S)-backed source: locators are URLs, fetched with a blocking GET.
/// Writes are not supported over this boundary.
#[derive(Debug, Default)]
pub struct HttpBlobStore {
    client: reqwest::blocking::Client,
}

impl BlobStore for HttpBlobStore {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(locator)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| EtlError::Storage(format!("fetching `{locator}`: {e}")))?;
        let bytes = response
            .bytes()
            .map_err(|e| EtlError::Storage(format!("reading `{locator}`: {e}")))?;
        info!(locator, len = bytes.len(), "fetched blob");
        Ok(bytes.to_vec())
    }

    fn put(&self, locator: &str, _bytes: &[u8]) -> Result<()> {
        Err(EtlError::Storage(format!(
            "writing to `{locator}` is not supported over http"
        )))
    }
}

/// Dispatches on locator scheme: `http(s)://` fetches over the network,
/// anything else is treated as a filesystem path.
#[derive(Debug, Default)]
pub struct DefaultBlobStore {
    fs: FsBlobStore,
    http: HttpBlobStore,
}

impl DefaultBlobStore {
    fn backend(&self, locator: &str) -> &dyn BlobStore {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            &self.http
        } else {
            &self.fs
        }
    }
}

impl BlobStore for DefaultBlobStore {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        self.backend(locator).fetch(locator)
    }

    fn put(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        self.backend(locator).put(locator, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_round_trips_bytes() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let locator = dir.path().join("data.csv").display().to_string();

        let store = FsBlobStore;
        store.put(&locator, b"a,b,c\n")?;
        assert_eq!(store.fetch(&locator)?, b"a,b,c\n");
        Ok(())
    }

    #[test]
    fn missing_blob_is_a_storage_error() {
        let err = FsBlobStore.fetch("/no/such/blob.csv").unwrap_err();
        assert!(matches!(err, EtlError::Storage(_)));
    }

    #[test]
    fn http_put_is_refused() {
        let err = HttpBlobStore::default()
            .put("https://example.com/out.csv", b"x")
            .unwrap_err();
        assert!(matches!(err, EtlError::Storage(_)));
    }
}
