use super::{DependencyInstaller, PublishTransport};
use crate::auth::CurrentUser;
use crate::cache::{PackKey, SingleFlight};
use crate::config::ConfigResolver;
use crate::context::ContextChain;
use crate::core::{BitpackError, Pack, PackFileDefaults, PackPackage, is_valid_name};
use crate::query::QueryResolver;
use crate::remote::records::PublishKeyRecord;
use crate::remote::{PackRef, RecordManager};
use crate::store::{StoreRegistry, pack_file_path};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators of [`PackService`].
pub struct PackServiceParts {
    pub config: Arc<ConfigResolver>,
    pub queries: Arc<QueryResolver>,
    pub stores: Arc<StoreRegistry>,
    pub records: RecordManager,
    pub installer: Arc<dyn DependencyInstaller>,
    pub transport: Arc<dyn PublishTransport>,
}

/// Installs packs into the execution directory and publishes packs from disk.
pub struct PackService {
    config: Arc<ConfigResolver>,
    queries: Arc<QueryResolver>,
    stores: Arc<StoreRegistry>,
    records: RecordManager,
    installer: Arc<dyn DependencyInstaller>,
    transport: Arc<dyn PublishTransport>,
    loaded_prefixes: SingleFlight<PathBuf, ()>,
}

impl PackService {
    pub fn new(parts: PackServiceParts) -> Self {
        Self {
            config: parts.config,
            queries: parts.queries,
            stores: parts.stores,
            records: parts.records,
            installer: parts.installer,
            transport: parts.transport,
            loaded_prefixes: SingleFlight::new(),
        }
    }

    /// Resolve `query` and make sure the resulting version is installed.
    ///
    /// The chain must carry a user context.
    pub async fn install_pack(
        &self,
        chain: &ContextChain,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        query: &str,
    ) -> Result<Arc<Pack>> {
        let result = self.queries.query(chain, pack_type, pack_class, scope, query).await?;
        let key = PackKey {
            pack_type: result.pack_type(),
            pack_class: result.pack_class(),
            scope: result.scope(),
            name: result.name(),
            version: result.version_number(),
        };
        self.ensure_pack_installed(chain, &key).await
    }

    /// Same as [`install_pack`](Self::install_pack).
    pub async fn get_pack(
        &self,
        chain: &ContextChain,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        query: &str,
    ) -> Result<Arc<Pack>> {
        self.install_pack(chain, pack_type, pack_class, scope, query).await
    }

    /// The installed pack for `key`, downloading and installing it first if
    /// it is not in the execution directory yet.
    ///
    /// Every key field becomes a directory under the execution directory, so
    /// the key is validated first: the name must be a valid pack name, the
    /// version valid semver, and the rest single path segments.
    pub async fn ensure_pack_installed(&self, chain: &ContextChain, key: &PackKey<'_>) -> Result<Arc<Pack>> {
        validate_install_key(key)?;
        let exec = chain.exec()?;
        let store = self.stores.pack_store(exec.exec_path());
        if let Some(pack) = store.load_pack(key).await? {
            tracing::debug!(target: "pack", "{}@{} already installed", key.name, key.version);
            return Ok(pack);
        }

        let pack_ref = PackRef::new(key.pack_type, key.pack_class, key.scope, key.name);
        let version = self.records.get_pack_version(chain, pack_ref, key.version).await?.ok_or_else(|| {
            BitpackError::PackVersionNotFound {
                pack_type: key.pack_type.to_string(),
                class: key.pack_class.to_string(),
                scope: key.scope.to_string(),
                name: key.name.to_string(),
                version: key.version.to_string(),
            }
        })?;

        let cache_dir = self.config_string(chain, "cache").await?;
        let download = self.stores.download_store(Path::new(&cache_dir)).download(&version.pack_url).await?;

        let pack_path = store.pack_path(key);
        download.package().extract_to_path(&pack_path).await?;
        tracing::info!(target: "pack", "Installed {}@{} into {}", key.name, key.version, pack_path.display());

        let pack = store.load_pack(key).await?.ok_or_else(|| BitpackError::InvalidPackFile {
            path: pack_file_path(&pack_path, key.pack_type),
            reason: "the downloaded archive does not contain a pack file".to_string(),
        })?;
        self.ensure_pack_dependencies_installed(&pack).await?;
        Ok(pack)
    }

    /// Install the pack's npm dependencies into its pack directory.
    pub async fn ensure_pack_dependencies_installed(&self, pack: &Pack) -> Result<()> {
        let prefix = pack.pack_path().to_path_buf();
        self.loaded_prefixes
            .get_or_try_init(prefix.clone(), || {
                let prefix = prefix.clone();
                async move { self.installer.load(&prefix).await }
            })
            .await?;

        let packages: Vec<String> =
            pack.dependencies().iter().map(|(name, range)| format!("{name}@{range}")).collect();
        if packages.is_empty() {
            return Ok(());
        }
        self.installer.install(&prefix, &packages).await
    }

    /// Package the pack at `pack_path` and upload it as a new version.
    ///
    /// Creates the pack record (owned by `current`) and the version record
    /// when they do not exist yet, then registers a publish key and posts the
    /// archive to `<serverUrl>/api/v1/publish` authorized by that key.
    pub async fn publish_pack(
        &self,
        chain: &ContextChain,
        current: &CurrentUser,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        pack_path: &Path,
    ) -> Result<PublishKeyRecord> {
        let defaults = PackFileDefaults::new(pack_type, pack_class, scope);
        let file_path = pack_file_path(pack_path, pack_type);
        let pack_file = self.stores.pack_files().load_pack_file(&file_path, &defaults).await?.ok_or_else(|| {
            BitpackError::InvalidPackFile {
                path: file_path.clone(),
                reason: "no pack file found".to_string(),
            }
        })?;

        validate_pack(pack_file.name(), pack_file.version())?;
        let pack = PackRef::new(pack_file.pack_type(), pack_file.pack_class(), pack_file.scope(), pack_file.name());
        let version = pack_file.version();

        if current.is_anonymous() {
            return Err(BitpackError::UserIsAnonymous {
                operation: "publish".to_string(),
            }
            .into());
        }

        let existing = self.records.get_pack_version(chain, pack, version).await?;
        if existing.as_ref().is_some_and(|record| record.published) {
            return Err(BitpackError::PackVersionExists {
                pack_type: pack.pack_type.to_string(),
                class: pack.pack_class.to_string(),
                name: pack.name.to_string(),
                version: version.to_string(),
            }
            .into());
        }

        let package = PackPackage::package(pack_type, pack_path).await?;

        if self.records.get_pack_info(chain, pack).await?.is_some() {
            if self.records.get_collaborator(chain, pack, current.user_id()).await?.is_none() {
                return Err(BitpackError::AccessDenied {
                    name: pack.name.to_string(),
                }
                .into());
            }
        } else {
            self.records.create_pack(chain, pack, current.user_id()).await?;
        }

        if existing.is_none() {
            self.records.create_pack_version(chain, pack, version).await?;
        }

        let publish_key = self.records.create_publish_key(chain, pack, version, package.hash()).await?;
        let server_url = self.config_string(chain, "serverUrl").await?;
        let url = format!("{}/api/v1/publish", server_url.trim_end_matches('/'));

        tracing::info!(target: "pack", "Publishing {}@{} ({} files)", pack.name, version, package.file_count());
        self.transport.post(&url, &publish_key.key, package.into_archive()).await?;
        Ok(publish_key)
    }

    async fn config_string(&self, chain: &ContextChain, key: &str) -> Result<String> {
        let value = self.config.get_config_property(chain, key).await?.ok_or_else(|| {
            BitpackError::InvalidConfigValue {
                key: key.to_string(),
                expected: "string",
            }
        })?;
        Ok(value.expect_str(key)?.to_string())
    }
}

fn validate_install_key(key: &PackKey<'_>) -> Result<(), BitpackError> {
    for (name, value) in [("packType", key.pack_type), ("class", key.pack_class), ("scope", key.scope)] {
        let plain = !value.is_empty() && value != "." && value != ".." && !value.contains(['/', '\\']);
        if !plain {
            return Err(BitpackError::InvalidArgument {
                name: name.to_string(),
                reason: format!("'{value}' is not a single path segment"),
            });
        }
    }
    validate_pack(key.name, key.version)
}

fn validate_pack(name: &str, version: &str) -> Result<(), BitpackError> {
    if !is_valid_name(name) {
        return Err(BitpackError::InvalidPackName {
            name: name.to_string(),
            reason: "must be lower case letters, numbers or dashes and must start with a letter".to_string(),
        });
    }
    semver::Version::parse(version).map_err(|e| BitpackError::InvalidPackVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
