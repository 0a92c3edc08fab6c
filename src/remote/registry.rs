//! Typed access to pack, publish-key and user records.

use super::records::{
    PackCollaboratorRecord, PackInfoRecord, PackRecord, PackVersionRecord, PackVersionsInfo,
    PublishKeyRecord, SemanticVersionRecord, UserRecord, now_millis,
};
use super::{MultiUpdate, RecordPath, RecordStore};
use crate::context::ContextChain;
use crate::core::BitpackError;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identifies a pack independent of version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackRef<'a> {
    pub pack_type: &'a str,
    pub pack_class: &'a str,
    pub scope: &'a str,
    pub name: &'a str,
}

impl<'a> PackRef<'a> {
    pub fn new(pack_type: &'a str, pack_class: &'a str, scope: &'a str, name: &'a str) -> Self {
        Self {
            pack_type,
            pack_class,
            scope,
            name,
        }
    }

    /// `packs/<type>/<class>/<scope>/<name>[/<rest>...]`
    pub fn path(&self, rest: &[&str]) -> RecordPath {
        let base = ["packs", self.pack_type, self.pack_class, self.scope, self.name];
        RecordPath::new(base.iter().chain(rest.iter()))
    }
}

/// Maps pack and user operations onto [`RecordStore`] paths.
#[derive(Clone)]
pub struct RecordManager {
    store: Arc<dyn RecordStore>,
}

impl RecordManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn load<T: DeserializeOwned>(&self, chain: &ContextChain, path: &RecordPath) -> Result<Option<T>> {
        let Some(value) = self.store.get(chain, path).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(value).map_err(|e| BitpackError::RemoteError {
            path: path.to_string(),
            reason: format!("malformed record: {e}"),
        })?;
        Ok(Some(record))
    }

    async fn save<T: Serialize>(&self, chain: &ContextChain, path: &RecordPath, record: &T) -> Result<()> {
        self.store.set(chain, path, serde_json::to_value(record)?).await
    }

    pub async fn get_versions_info(&self, chain: &ContextChain, pack: PackRef<'_>) -> Result<Option<PackVersionsInfo>> {
        self.load(chain, &pack.path(&["versionsInfo"])).await
    }

    pub async fn get_pack_version(
        &self,
        chain: &ContextChain,
        pack: PackRef<'_>,
        version: &str,
    ) -> Result<Option<PackVersionRecord>> {
        self.load(chain, &pack.path(&["versions", version])).await
    }

    /// Create an unpublished version record.
    pub async fn create_pack_version(
        &self,
        chain: &ContextChain,
        pack: PackRef<'_>,
        version: &str,
    ) -> Result<PackVersionRecord> {
        let parsed = semver::Version::parse(version).map_err(|e| BitpackError::InvalidPackVersion {
            version: version.to_string(),
            reason: e.to_string(),
        })?;
        let record = PackVersionRecord {
            published: false,
            pack_hash: String::new(),
            pack_url: String::new(),
            semantic_version: Some(SemanticVersionRecord::from(&parsed)),
            version_number: version.to_string(),
        };
        self.save(chain, &pack.path(&["versions", version]), &record).await?;
        tracing::debug!(target: "pack", "Created version record {}@{}", pack.name, version);
        Ok(record)
    }

    /// Mark a version published and record it in the versions index.
    pub async fn publish_pack_version(
        &self,
        chain: &ContextChain,
        pack: PackRef<'_>,
        version: &str,
        pack_url: &str,
        pack_hash: &str,
    ) -> Result<()> {
        let updates = MultiUpdate::new()
            .update(
                &["versions", version],
                serde_json::json!({
                    "published": true,
                    "packUrl": pack_url,
                    "packHash": pack_hash,
                }),
            )
            .set(&["versionsInfo", "all", version], version)
            .set(&["versionsInfo", "last"], version)
            .build();
        self.store.update(chain, &pack.path(&[]), updates).await
    }

    pub async fn get_pack_info(&self, chain: &ContextChain, pack: PackRef<'_>) -> Result<Option<PackInfoRecord>> {
        self.load(chain, &pack.path(&["info"])).await
    }

    /// Create the pack record with `owner_id` as its owning collaborator.
    pub async fn create_pack(&self, chain: &ContextChain, pack: PackRef<'_>, owner_id: &str) -> Result<PackRecord> {
        let now = now_millis();
        let owner = PackCollaboratorRecord {
            created_at: now,
            owner: true,
            updated_at: now,
            user_id: owner_id.to_string(),
        };
        let record = PackRecord {
            collaborators: BTreeMap::from([(owner_id.to_string(), owner)]),
            info: PackInfoRecord {
                class: pack.pack_class.to_string(),
                created_at: now,
                name: pack.name.to_string(),
                scope: pack.scope.to_string(),
                pack_type: pack.pack_type.to_string(),
                updated_at: now,
            },
        };
        self.save(chain, &pack.path(&[]), &record).await?;
        tracing::info!(target: "pack", "Created pack {}-{} {} owned by {}", pack.pack_type, pack.pack_class, pack.name, owner_id);
        Ok(record)
    }

    pub async fn get_collaborator(
        &self,
        chain: &ContextChain,
        pack: PackRef<'_>,
        user_id: &str,
    ) -> Result<Option<PackCollaboratorRecord>> {
        self.load(chain, &pack.path(&["collaborators", user_id])).await
    }

    /// Store a publish key under a fresh random key.
    pub async fn create_publish_key(
        &self,
        chain: &ContextChain,
        pack: PackRef<'_>,
        version: &str,
        pack_hash: &str,
    ) -> Result<PublishKeyRecord> {
        let record = PublishKeyRecord {
            key: uuid::Uuid::new_v4().to_string(),
            pack_class: pack.pack_class.to_string(),
            pack_hash: pack_hash.to_string(),
            pack_name: pack.name.to_string(),
            pack_scope: pack.scope.to_string(),
            pack_type: pack.pack_type.to_string(),
            pack_version_number: version.to_string(),
        };
        self.save(chain, &RecordPath::new(["publishKeys", record.key.as_str()]), &record).await?;
        Ok(record)
    }

    pub async fn get_publish_key(&self, chain: &ContextChain, key: &str) -> Result<Option<PublishKeyRecord>> {
        self.load(chain, &RecordPath::new(["publishKeys", key])).await
    }

    pub async fn get_user(&self, chain: &ContextChain, user_id: &str) -> Result<Option<UserRecord>> {
        self.load(chain, &RecordPath::new(["users", user_id])).await
    }

    pub async fn set_user(&self, chain: &ContextChain, user: &UserRecord) -> Result<()> {
        self.save(chain, &RecordPath::new(["users", user.id.as_str()]), user).await
    }

    /// Merge `fields` into `users/<user_id>`.
    pub async fn update_user(&self, chain: &ContextChain, user_id: &str, fields: Value) -> Result<()> {
        let updates = MultiUpdate::new().update(&[] as &[&str], fields).build();
        self.store.update(chain, &RecordPath::new(["users", user_id]), updates).await
    }

    pub async fn user_id_for_username(&self, chain: &ContextChain, username: &str) -> Result<Option<String>> {
        self.load(chain, &RecordPath::new(["indexes", "usernameToUserId", username])).await
    }

    pub async fn user_id_for_email(&self, chain: &ContextChain, email: &str) -> Result<Option<String>> {
        self.load(chain, &RecordPath::new(["indexes", "emailToUserId", email])).await
    }

    /// Set a user's email and username together with both index entries,
    /// releasing the index entries of any previous email or username.
    pub async fn claim_identity(&self, chain: &ContextChain, user: &UserRecord, email: &str, username: &str) -> Result<()> {
        let user_id = user.id.as_str();
        let mut updates = MultiUpdate::new();
        if !user.email.is_empty() && user.email != email {
            updates = updates.remove(&["indexes", "emailToUserId", user.email.as_str()]);
        }
        if !user.username.is_empty() && user.username != username {
            updates = updates.remove(&["indexes", "usernameToUserId", user.username.as_str()]);
        }
        let updates = updates
            .set(&["users", user_id, "email"], email)
            .set(&["indexes", "emailToUserId", email], user_id)
            .set(&["users", user_id, "username"], username)
            .set(&["indexes", "usernameToUserId", username], user_id)
            .build();
        self.store.update(chain, &RecordPath::root(), updates).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryRecordStore;
    use serde_json::json;

    fn manager() -> (Arc<MemoryRecordStore>, RecordManager) {
        let store = Arc::new(MemoryRecordStore::new());
        (store.clone(), RecordManager::new(store))
    }

    const LINT: PackRef<'static> = PackRef {
        pack_type: "gulp",
        pack_class: "task",
        scope: "public",
        name: "lint",
    };

    #[tokio::test]
    async fn test_version_lifecycle() {
        let (_, records) = manager();
        let chain = ContextChain::default();

        assert!(records.get_pack_version(&chain, LINT, "1.0.0").await.unwrap().is_none());
        let created = records.create_pack_version(&chain, LINT, "1.0.0").await.unwrap();
        assert!(!created.published);

        records.publish_pack_version(&chain, LINT, "1.0.0", "https://cdn/lint.zip", "abc").await.unwrap();
        let published = records.get_pack_version(&chain, LINT, "1.0.0").await.unwrap().unwrap();
        assert!(published.published);
        assert_eq!(published.pack_url, "https://cdn/lint.zip");

        let info = records.get_versions_info(&chain, LINT).await.unwrap().unwrap();
        assert_eq!(info.last.as_deref(), Some("1.0.0"));
        assert_eq!(info.versions().collect::<Vec<_>>(), vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_create_pack_version_rejects_bad_semver() {
        let (_, records) = manager();
        let err = records.create_pack_version(&ContextChain::default(), LINT, "one").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::InvalidPackVersion { .. })));
    }

    #[tokio::test]
    async fn test_create_pack_adds_owner() {
        let (store, records) = manager();
        let chain = ContextChain::default();
        records.create_pack(&chain, LINT, "u1").await.unwrap();

        let owner = records.get_collaborator(&chain, LINT, "u1").await.unwrap().unwrap();
        assert!(owner.owner);
        assert!(records.get_collaborator(&chain, LINT, "u2").await.unwrap().is_none());
        assert_eq!(store.value_at("packs/gulp/task/public/lint/info/type"), Some(json!("gulp")));
    }

    #[tokio::test]
    async fn test_claim_identity_writes_indexes() {
        let (store, records) = manager();
        let chain = ContextChain::default();
        let pending = UserRecord::pending("u1");
        records.set_user(&chain, &pending).await.unwrap();
        records.claim_identity(&chain, &pending, "a@b.co", "alice").await.unwrap();

        assert_eq!(records.user_id_for_email(&chain, "a@b.co").await.unwrap().as_deref(), Some("u1"));
        assert_eq!(records.user_id_for_username(&chain, "alice").await.unwrap().as_deref(), Some("u1"));
        assert!(store.value_at("indexes/emailToUserId/a(A)b(P)co").is_some());

        records.update_user(&chain, "u1", json!({"signedUp": true})).await.unwrap();
        let user = records.get_user(&chain, "u1").await.unwrap().unwrap();
        assert!(user.signed_up);
        assert_eq!(user.username, "alice");

        records.claim_identity(&chain, &user, "a@b.co", "alicia").await.unwrap();
        assert!(records.user_id_for_username(&chain, "alice").await.unwrap().is_none());
        assert_eq!(records.user_id_for_username(&chain, "alicia").await.unwrap().as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_malformed_record_is_remote_error() {
        let (store, records) = manager();
        let chain = ContextChain::default();
        store.set(&chain, &RecordPath::new(["users", "u1"]), json!(42)).await.unwrap();
        let err = records.get_user(&chain, "u1").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::RemoteError { .. })));
    }
}
