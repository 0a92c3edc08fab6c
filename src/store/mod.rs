//! Stores for installed packs, pack files and downloads
//!
//! Installed packs live under the execution directory:
//!
//! ```text
//! <exec>/.<type>/<class>/<scope>/<name>/<version>/<type>.json
//! ```
//!
//! [`StoreRegistry`] hands out one [`PackStore`] per execution directory and
//! one [`PackDownloadStore`] per cache directory; all pack stores share a
//! single [`PackFileStore`] so a pack file is parsed once per process.

mod download;

pub use download::{HttpPackFetcher, PackDownload, PackDownloadStore, PackFetcher};

use crate::cache::{PackCache, PackFileCache, PackKey};
use crate::core::{Pack, PackFile, PackFileDefaults};
use anyhow::Result;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `<exec>/.<type>/<class>/<scope>/<name>/<version>`
pub fn pack_path(exec_path: &Path, key: &PackKey<'_>) -> PathBuf {
    exec_path
        .join(format!(".{}", key.pack_type))
        .join(key.pack_class)
        .join(key.scope)
        .join(key.name)
        .join(key.version)
}

/// `<pack path>/<type>.json`
pub fn pack_file_path(pack_dir: &Path, pack_type: &str) -> PathBuf {
    pack_dir.join(format!("{pack_type}.json"))
}

/// Parsed pack files, cached by absolute path.
#[derive(Debug, Default)]
pub struct PackFileStore {
    cache: PackFileCache,
}

impl PackFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a pack file, or `None` if it does not exist. Missing files are
    /// not cached so a later install is picked up.
    pub async fn load_pack_file(&self, file_path: &Path, defaults: &PackFileDefaults) -> Result<Option<Arc<PackFile>>> {
        if let Some(hit) = self.cache.get(file_path) {
            return Ok(Some(hit));
        }
        match PackFile::load_from_file(file_path, defaults).await? {
            Some(pack_file) => Ok(Some(self.cache.set(file_path, Arc::new(pack_file)))),
            None => Ok(None),
        }
    }

    pub fn cache(&self) -> &PackFileCache {
        &self.cache
    }
}

/// Installed packs of one execution directory.
#[derive(Debug)]
pub struct PackStore {
    exec_path: PathBuf,
    pack_files: Arc<PackFileStore>,
    cache: PackCache,
}

impl PackStore {
    pub fn new(exec_path: impl Into<PathBuf>, pack_files: Arc<PackFileStore>) -> Self {
        Self {
            exec_path: exec_path.into(),
            pack_files,
            cache: PackCache::new(),
        }
    }

    pub fn exec_path(&self) -> &Path {
        &self.exec_path
    }

    pub fn pack_path(&self, key: &PackKey<'_>) -> PathBuf {
        pack_path(&self.exec_path, key)
    }

    /// The installed pack for `key`, or `None` if it is not installed.
    pub async fn load_pack(&self, key: &PackKey<'_>) -> Result<Option<Arc<Pack>>> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit));
        }

        let file_path = pack_file_path(&self.pack_path(key), key.pack_type);
        let defaults = PackFileDefaults::new(key.pack_type, key.pack_class, key.scope);
        let Some(pack_file) = self.pack_files.load_pack_file(&file_path, &defaults).await? else {
            return Ok(None);
        };

        let pack = Arc::new(Pack::new(pack_file.as_ref().clone()));
        Ok(Some(self.cache.set(key, pack)))
    }
}

/// Hands out the per-directory stores.
pub struct StoreRegistry {
    fetcher: Arc<dyn PackFetcher>,
    pack_files: Arc<PackFileStore>,
    pack_stores: DashMap<PathBuf, Arc<PackStore>>,
    download_stores: DashMap<PathBuf, Arc<PackDownloadStore>>,
}

impl StoreRegistry {
    pub fn new(fetcher: Arc<dyn PackFetcher>) -> Self {
        Self {
            fetcher,
            pack_files: Arc::new(PackFileStore::new()),
            pack_stores: DashMap::new(),
            download_stores: DashMap::new(),
        }
    }

    pub fn pack_store(&self, exec_path: &Path) -> Arc<PackStore> {
        self.pack_stores
            .entry(exec_path.to_path_buf())
            .or_insert_with(|| Arc::new(PackStore::new(exec_path, self.pack_files.clone())))
            .clone()
    }

    pub fn download_store(&self, cache_dir: &Path) -> Arc<PackDownloadStore> {
        self.download_stores
            .entry(cache_dir.to_path_buf())
            .or_insert_with(|| Arc::new(PackDownloadStore::new(cache_dir, self.fetcher.clone())))
            .clone()
    }

    pub fn pack_files(&self) -> &Arc<PackFileStore> {
        &self.pack_files
    }
}
