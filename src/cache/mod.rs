//! In-memory caches for packs, downloads, pack files and query results
//!
//! Each cache is a [`DashMap`] keyed by a string derived from the identifying
//! fields of its entries with [`make_cache_key`]. There is no eviction and no
//! TTL: entries live until [`delete`](PackCache::delete)d or until the process
//! exits. Callers that need to build a value once under concurrency use
//! [`SingleFlight`] instead.
//!
//! | Cache | Identified by | Value |
//! |-------|---------------|-------|
//! | [`PackCache`] | type, class, scope, name, version | [`Pack`] |
//! | [`PackDownloadCache`] | pack url | [`PackDownload`] |
//! | [`PackFileCache`] | absolute pack file path | [`PackFile`] |
//! | [`PackQueryCache`] | type, class, scope, raw query | [`QueryResultData`] |
//!
//! # Key derivation
//!
//! Fields are length-prefixed before joining, so no two distinct tuples share
//! a key even when a field contains the separator:
//!
//! ```rust
//! use bitpack::cache::make_cache_key;
//!
//! assert_eq!(make_cache_key(&["gulp", "task"]), "4:gulp@4:task");
//! assert_ne!(make_cache_key(&["a@b", "c"]), make_cache_key(&["a", "b@c"]));
//! ```

mod single_flight;

pub use single_flight::SingleFlight;

use crate::core::{Pack, PackFile};
use crate::query::QueryResultData;
use crate::store::PackDownload;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Injective string key for a tuple of fields.
pub fn make_cache_key(fields: &[&str]) -> String {
    fields.iter().map(|field| format!("{}:{}", field.len(), field)).collect::<Vec<_>>().join("@")
}

/// String-keyed map shared by the typed caches below.
#[derive(Debug)]
struct KeyedCache<V> {
    entries: DashMap<String, V>,
}

impl<V: Clone> KeyedCache<V> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: String, value: V) -> V {
        tracing::trace!(target: "cache", "set {}", key);
        self.entries.insert(key, value.clone());
        value
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Identity of a concrete pack version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackKey<'a> {
    pub pack_type: &'a str,
    pub pack_class: &'a str,
    pub scope: &'a str,
    pub name: &'a str,
    pub version: &'a str,
}

impl PackKey<'_> {
    pub fn cache_key(&self) -> String {
        make_cache_key(&[self.pack_type, self.pack_class, self.scope, self.name, self.version])
    }
}

/// Loaded packs.
#[derive(Debug)]
pub struct PackCache {
    inner: KeyedCache<Arc<Pack>>,
}

impl Default for PackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PackCache {
    pub fn new() -> Self {
        Self {
            inner: KeyedCache::new(),
        }
    }

    pub fn get(&self, key: &PackKey<'_>) -> Option<Arc<Pack>> {
        self.inner.get(&key.cache_key())
    }

    pub fn set(&self, key: &PackKey<'_>, pack: Arc<Pack>) -> Arc<Pack> {
        self.inner.set(key.cache_key(), pack)
    }

    pub fn has(&self, key: &PackKey<'_>) -> bool {
        self.inner.has(&key.cache_key())
    }

    pub fn delete(&self, key: &PackKey<'_>) -> bool {
        self.inner.delete(&key.cache_key())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Downloaded pack archives, by source url.
#[derive(Debug)]
pub struct PackDownloadCache {
    inner: KeyedCache<Arc<PackDownload>>,
}

impl Default for PackDownloadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PackDownloadCache {
    pub fn new() -> Self {
        Self {
            inner: KeyedCache::new(),
        }
    }

    pub fn get(&self, pack_url: &str) -> Option<Arc<PackDownload>> {
        self.inner.get(&make_cache_key(&[pack_url]))
    }

    pub fn set(&self, pack_url: &str, download: Arc<PackDownload>) -> Arc<PackDownload> {
        self.inner.set(make_cache_key(&[pack_url]), download)
    }

    pub fn has(&self, pack_url: &str) -> bool {
        self.inner.has(&make_cache_key(&[pack_url]))
    }

    pub fn delete(&self, pack_url: &str) -> bool {
        self.inner.delete(&make_cache_key(&[pack_url]))
    }
}

/// Parsed pack files, by absolute path.
#[derive(Debug)]
pub struct PackFileCache {
    inner: KeyedCache<Arc<PackFile>>,
}

impl Default for PackFileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PackFileCache {
    pub fn new() -> Self {
        Self {
            inner: KeyedCache::new(),
        }
    }

    fn key(pack_file_path: &Path) -> String {
        let absolute: PathBuf =
            std::path::absolute(pack_file_path).unwrap_or_else(|_| pack_file_path.to_path_buf());
        make_cache_key(&[&absolute.to_string_lossy()])
    }

    pub fn get(&self, pack_file_path: &Path) -> Option<Arc<PackFile>> {
        self.inner.get(&Self::key(pack_file_path))
    }

    pub fn set(&self, pack_file_path: &Path, pack_file: Arc<PackFile>) -> Arc<PackFile> {
        self.inner.set(Self::key(pack_file_path), pack_file)
    }

    pub fn has(&self, pack_file_path: &Path) -> bool {
        self.inner.has(&Self::key(pack_file_path))
    }

    pub fn delete(&self, pack_file_path: &Path) -> bool {
        self.inner.delete(&Self::key(pack_file_path))
    }
}

/// Identity of a raw query within a pack namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey<'a> {
    pub pack_type: &'a str,
    pub pack_class: &'a str,
    pub scope: &'a str,
    pub query: &'a str,
}

impl QueryKey<'_> {
    pub fn cache_key(&self) -> String {
        make_cache_key(&[self.pack_type, self.pack_class, self.scope, self.query])
    }
}

/// Resolved queries.
#[derive(Debug)]
pub struct PackQueryCache {
    inner: KeyedCache<QueryResultData>,
}

impl Default for PackQueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PackQueryCache {
    pub fn new() -> Self {
        Self {
            inner: KeyedCache::new(),
        }
    }

    pub fn get(&self, key: &QueryKey<'_>) -> Option<QueryResultData> {
        self.inner.get(&key.cache_key())
    }

    pub fn set(&self, key: &QueryKey<'_>, result: QueryResultData) -> QueryResultData {
        self.inner.set(key.cache_key(), result)
    }

    pub fn has(&self, key: &QueryKey<'_>) -> bool {
        self.inner.has(&key.cache_key())
    }

    pub fn delete(&self, key: &QueryKey<'_>) -> bool {
        self.inner.delete(&key.cache_key())
    }
}
