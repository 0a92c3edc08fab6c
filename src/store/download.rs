//! Pack archive downloads with an on-disk cache.
//!
//! Archives are cached under the configured `cache` directory at a path
//! mirroring the pack URL without its scheme, e.g.
//! `https://cdn.bitpack.io/gulp/lint-1.0.0.zip` lands in
//! `<cache>/cdn.bitpack.io/gulp/lint-1.0.0.zip`.

use crate::cache::PackDownloadCache;
use crate::core::{BitpackError, FileOps, PackPackage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A downloaded archive and the URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackDownload {
    pack_url: String,
    package: PackPackage,
}

impl PackDownload {
    pub fn new(pack_url: impl Into<String>, package: PackPackage) -> Self {
        Self {
            pack_url: pack_url.into(),
            package,
        }
    }

    pub fn pack_url(&self) -> &str {
        &self.pack_url
    }

    pub fn package(&self) -> &PackPackage {
        &self.package
    }
}

/// Retrieves pack archives from wherever `pack_url` points.
#[async_trait]
pub trait PackFetcher: Send + Sync {
    async fn fetch(&self, pack_url: &str) -> Result<Vec<u8>>;
}

/// [`PackFetcher`] over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpPackFetcher {
    client: reqwest::Client,
}

impl HttpPackFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackFetcher for HttpPackFetcher {
    async fn fetch(&self, pack_url: &str) -> Result<Vec<u8>> {
        tracing::debug!(target: "pack", "Downloading {}", pack_url);
        let response = self.client.get(pack_url).send().await.map_err(|e| BitpackError::DownloadFailed {
            url: pack_url.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(BitpackError::DownloadFailed {
                url: pack_url.to_string(),
                reason: format!("HTTP {}", response.status()),
            }
            .into());
        }

        let bytes = response.bytes().await.with_context(|| format!("Failed to read body of {pack_url}"))?;
        Ok(bytes.to_vec())
    }
}

/// Downloads into, and serves from, one cache directory.
pub struct PackDownloadStore {
    cache_dir: PathBuf,
    fetcher: Arc<dyn PackFetcher>,
    cache: PackDownloadCache,
}

impl PackDownloadStore {
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: Arc<dyn PackFetcher>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
            cache: PackDownloadCache::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the archive for `pack_url` is cached on disk.
    ///
    /// Only normal path components of the URL are kept, so a URL can never
    /// address a file outside the cache directory.
    pub fn cache_path(&self, pack_url: &str) -> PathBuf {
        let stripped = pack_url
            .strip_prefix("https://")
            .or_else(|| pack_url.strip_prefix("http://"))
            .unwrap_or(pack_url);
        let mut path = self.cache_dir.clone();
        for component in Path::new(stripped).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }

    /// The archive at `pack_url`: from memory, then the cache directory,
    /// then the network (saving it to the cache directory).
    pub async fn download(&self, pack_url: &str) -> Result<Arc<PackDownload>> {
        if let Some(hit) = self.cache.get(pack_url) {
            return Ok(hit);
        }

        let download = match self.load_from_cache_dir(pack_url).await? {
            Some(download) => download,
            None => self.fetch_and_save(pack_url).await?,
        };
        Ok(self.cache.set(pack_url, Arc::new(download)))
    }

    async fn load_from_cache_dir(&self, pack_url: &str) -> Result<Option<PackDownload>> {
        let cache_path = self.cache_path(pack_url);
        let metadata = match FileOps::metadata_with_context(&cache_path, "checking pack cache").await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(BitpackError::CacheNotAFile {
                path: cache_path,
            }
            .into());
        }

        let archive = FileOps::read_bytes_with_context(&cache_path, "reading cached pack").await?;
        tracing::debug!(target: "cache", "Using cached archive {}", cache_path.display());
        Ok(Some(PackDownload::new(pack_url, PackPackage::from_archive(archive))))
    }

    async fn fetch_and_save(&self, pack_url: &str) -> Result<PackDownload> {
        let archive = self.fetcher.fetch(pack_url).await?;
        let cache_path = self.cache_path(pack_url);
        FileOps::write_with_mode(&cache_path, &archive, 0o644, "caching pack archive").await?;
        Ok(PackDownload::new(pack_url, PackPackage::from_archive(archive)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryPackFetcher;
    use tempfile::TempDir;

    const URL: &str = "https://cdn.bitpack.io/gulp/lint-1.0.0.zip";

    #[test]
    fn test_cache_path_strips_scheme_and_traversal() {
        let store = PackDownloadStore::new("/cache", Arc::new(MemoryPackFetcher::new()));
        assert_eq!(store.cache_path(URL), PathBuf::from("/cache/cdn.bitpack.io/gulp/lint-1.0.0.zip"));
        assert_eq!(store.cache_path("http://host/../../etc/passwd"), PathBuf::from("/cache/host/etc/passwd"));
    }

    #[tokio::test]
    async fn test_download_fetches_once_then_uses_cache_dir() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryPackFetcher::new());
        fetcher.insert(URL, b"archive".to_vec());

        let store = PackDownloadStore::new(dir.path(), fetcher.clone());
        let first = store.download(URL).await.unwrap();
        assert_eq!(first.package().archive(), b"archive");
        assert_eq!(fetcher.fetch_count(), 1);
        assert!(store.cache_path(URL).is_file());

        // In-memory hit
        let again = store.download(URL).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // A fresh store over the same directory reads the file instead of fetching
        let cold = PackDownloadStore::new(dir.path(), fetcher.clone());
        let from_disk = cold.download(URL).await.unwrap();
        assert_eq!(from_disk.package().hash(), first.package().hash());
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_entry_must_be_a_file() {
        let dir = TempDir::new().unwrap();
        let store = PackDownloadStore::new(dir.path(), Arc::new(MemoryPackFetcher::new()));
        std::fs::create_dir_all(store.cache_path(URL)).unwrap();

        let err = store.download(URL).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::CacheNotAFile { .. })));
    }
}
