//! Pack query resolution
//!
//! A query is `name` or `name@range`. Resolution reads the pack's
//! `versionsInfo` record and picks either the highest published version
//! satisfying the range or, without a range, the last published version.
//!
//! Results are cached per user: [`QueryResolver`] keeps one
//! [`PackQueryStore`] per user id, since what a user can see depends on
//! their credentials.

mod range;

pub use range::VersionRange;

use crate::cache::{PackQueryCache, QueryKey};
use crate::context::ContextChain;
use crate::core::BitpackError;
use crate::remote::{PackRef, RecordManager};
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// The outcome of a query: a concrete pack version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryResultData {
    pack_type: String,
    pack_class: String,
    scope: String,
    name: String,
    version_number: String,
}

impl QueryResultData {
    pub fn new(
        pack_type: impl Into<String>,
        pack_class: impl Into<String>,
        scope: impl Into<String>,
        name: impl Into<String>,
        version_number: impl Into<String>,
    ) -> Self {
        Self {
            pack_type: pack_type.into(),
            pack_class: pack_class.into(),
            scope: scope.into(),
            name: name.into(),
            version_number: version_number.into(),
        }
    }

    pub fn pack_type(&self) -> &str {
        &self.pack_type
    }

    pub fn pack_class(&self) -> &str {
        &self.pack_class
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_number(&self) -> &str {
        &self.version_number
    }

    pub fn pack_ref(&self) -> PackRef<'_> {
        PackRef::new(&self.pack_type, &self.pack_class, &self.scope, &self.name)
    }
}

/// A raw query split into name and version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackQuery<'a> {
    pub name: &'a str,
    pub range: &'a str,
}

impl<'a> PackQuery<'a> {
    /// Split on the first `@`; without one the whole query is the name.
    pub fn parse(query: &'a str) -> Self {
        match query.split_once('@') {
            Some((name, range)) => Self {
                name,
                range,
            },
            None => Self {
                name: query,
                range: "",
            },
        }
    }
}

/// Resolves and caches queries for one user.
pub struct PackQueryStore {
    records: RecordManager,
    cache: PackQueryCache,
}

impl PackQueryStore {
    pub fn new(records: RecordManager) -> Self {
        Self {
            records,
            cache: PackQueryCache::new(),
        }
    }

    pub fn cache(&self) -> &PackQueryCache {
        &self.cache
    }

    pub async fn query(
        &self,
        chain: &ContextChain,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        raw_query: &str,
    ) -> Result<QueryResultData> {
        let key = QueryKey {
            pack_type,
            pack_class,
            scope,
            query: raw_query,
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let result = self.resolve(chain, pack_type, pack_class, scope, raw_query).await?;
        tracing::debug!(target: "query", "Resolved {} to {}@{}", raw_query, result.name(), result.version_number());
        Ok(self.cache.set(&key, result))
    }

    async fn resolve(
        &self,
        chain: &ContextChain,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        raw_query: &str,
    ) -> Result<QueryResultData> {
        let query = PackQuery::parse(raw_query);
        let pack = PackRef::new(pack_type, pack_class, scope, query.name);

        let info = self.records.get_versions_info(chain, pack).await?.ok_or_else(|| BitpackError::PackNotFound {
            name: query.name.to_string(),
        })?;

        let version = if query.range.is_empty() {
            info.last.clone()
        } else {
            match VersionRange::parse(query.range) {
                Some(range) => range.max_satisfying(info.versions()).map(str::to_string),
                None => {
                    tracing::debug!(target: "query", "Unparseable version range '{}'", query.range);
                    None
                }
            }
        };

        let version = version.ok_or_else(|| BitpackError::NoVersionMatch {
            query: raw_query.to_string(),
        })?;
        Ok(QueryResultData::new(pack_type, pack_class, scope, query.name, version))
    }
}

/// Routes queries to the [`PackQueryStore`] of the chain's current user.
pub struct QueryResolver {
    records: RecordManager,
    stores: DashMap<String, Arc<PackQueryStore>>,
}

impl QueryResolver {
    pub fn new(records: RecordManager) -> Self {
        Self {
            records,
            stores: DashMap::new(),
        }
    }

    /// The store for `user_id`, created on first use.
    pub fn store_for(&self, user_id: &str) -> Arc<PackQueryStore> {
        self.stores
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(PackQueryStore::new(self.records.clone())))
            .clone()
    }

    /// Resolve `raw_query` for the user established in `chain`.
    pub async fn query(
        &self,
        chain: &ContextChain,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        raw_query: &str,
    ) -> Result<QueryResultData> {
        let user = chain.user()?;
        self.store_for(user.user_id()).query(chain, pack_type, pack_class, scope, raw_query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextRegistry;
    use crate::test_utils::MemoryRecordStore;

    const LINT: PackRef<'static> = PackRef {
        pack_type: "gulp",
        pack_class: "task",
        scope: "public",
        name: "lint",
    };

    async fn seeded() -> (Arc<MemoryRecordStore>, RecordManager) {
        let store = Arc::new(MemoryRecordStore::new());
        let records = RecordManager::new(store.clone());
        let chain = ContextChain::default();
        for version in ["1.0.0", "1.2.0", "2.0.0"] {
            records.create_pack_version(&chain, LINT, version).await.unwrap();
            records.publish_pack_version(&chain, LINT, version, "url", "hash").await.unwrap();
        }
        (store, records)
    }

    fn user_chain(user_id: &str) -> ContextChain {
        let registry = ContextRegistry::new();
        let mut chain = registry.generate_context_chain();
        registry.establish_user(&mut chain, user_id);
        chain
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            PackQuery::parse("lint@^1.0.0"),
            PackQuery {
                name: "lint",
                range: "^1.0.0"
            }
        );
        assert_eq!(PackQuery::parse("lint").range, "");
        assert_eq!(PackQuery::parse("lint@1@2").range, "1@2");
    }

    #[tokio::test]
    async fn test_query_resolution() {
        let (_, records) = seeded().await;
        let resolver = QueryResolver::new(records);
        let chain = user_chain("anonymous");

        let result = resolver.query(&chain, "gulp", "task", "public", "lint@^1.0.0").await.unwrap();
        assert_eq!(result.version_number(), "1.2.0");
        assert_eq!(result.pack_type(), "gulp");

        let latest = resolver.query(&chain, "gulp", "task", "public", "lint").await.unwrap();
        assert_eq!(latest.version_number(), "2.0.0");

        let err = resolver.query(&chain, "gulp", "task", "public", "lint@^9.0.0").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::NoVersionMatch { .. })));
    }

    #[tokio::test]
    async fn test_unknown_pack() {
        let (_, records) = seeded().await;
        let resolver = QueryResolver::new(records);
        let err = resolver.query(&user_chain("u1"), "gulp", "task", "public", "nope").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::PackNotFound { .. })));
    }

    #[tokio::test]
    async fn test_results_are_cached_per_user() {
        let (store, records) = seeded().await;
        let resolver = QueryResolver::new(records);
        let alice = user_chain("alice");

        resolver.query(&alice, "gulp", "task", "public", "lint").await.unwrap();
        let reads = store.read_count();
        resolver.query(&alice, "gulp", "task", "public", "lint").await.unwrap();
        assert_eq!(store.read_count(), reads);

        resolver.query(&user_chain("bob"), "gulp", "task", "public", "lint").await.unwrap();
        assert_eq!(store.read_count(), reads + 1);
        assert!(!Arc::ptr_eq(&resolver.store_for("alice"), &resolver.store_for("bob")));
    }

    #[tokio::test]
    async fn test_query_requires_user_context() {
        let (_, records) = seeded().await;
        let resolver = QueryResolver::new(records);
        let err = resolver.query(&ContextChain::default(), "gulp", "task", "public", "lint").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BitpackError>(),
            Some(BitpackError::ContextNotEstablished { kind: "user" })
        ));
    }
}
