//! The public entry point tying all services together.
//!
//! A [`BitPack`] manages one pack type. Every operation builds a fresh
//! [`ContextChain`] from the caller's [`ContextOptions`]:
//!
//! 1. establish the pack type and exec contexts
//! 2. load the config chain for them
//! 3. establish the firebase context from the `firebaseUrl` property
//! 4. resolve the current user, establishing the user context
//!
//! Config, install and publish operations default to the `project` target;
//! login, logout and sign up default to `user`, so credentials land in the
//! user's home config unless the caller asks otherwise.
//!
//! # Example
//!
//! ```rust,no_run
//! use bitpack::BitPack;
//! use bitpack::context::ContextOptions;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let bitpack = BitPack::new("gulp");
//! let pack = bitpack.install("gulp", "task", "public", "clean@^1.0.0", ContextOptions::default()).await?;
//! println!("{}", pack.pack_path().display());
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthBackend, AuthService, CurrentUser};
use crate::config::{ConfigDeleteResult, ConfigResolver, ConfigValue};
use crate::context::{ConfigTarget, ContextChain, ContextOptions, ContextRegistry};
use crate::core::{BitpackError, Pack};
use crate::installer::{
    DependencyInstaller, HttpPublishTransport, NpmInstaller, PackService, PackServiceParts, PublishTransport,
};
use crate::query::QueryResolver;
use crate::remote::records::PublishKeyRecord;
use crate::remote::rest::RestBackend;
use crate::remote::{RecordManager, RecordStore};
use crate::store::{HttpPackFetcher, PackFetcher, StoreRegistry};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Client for one pack type.
pub struct BitPack {
    pack_type: String,
    contexts: Arc<ContextRegistry>,
    config: Arc<ConfigResolver>,
    auth: AuthService,
    packs: PackService,
}

/// Builder for [`BitPack`] with replaceable collaborators.
///
/// Anything left unset talks to the real world: the REST record store and
/// auth backend, HTTP downloads and uploads, and npm.
pub struct BitPackBuilder {
    pack_type: String,
    contexts: Option<Arc<ContextRegistry>>,
    config: Option<Arc<ConfigResolver>>,
    record_store: Option<Arc<dyn RecordStore>>,
    auth_backend: Option<Arc<dyn AuthBackend>>,
    fetcher: Option<Arc<dyn PackFetcher>>,
    installer: Option<Arc<dyn DependencyInstaller>>,
    transport: Option<Arc<dyn PublishTransport>>,
}

impl BitPackBuilder {
    pub fn new(pack_type: impl Into<String>) -> Self {
        Self {
            pack_type: pack_type.into(),
            contexts: None,
            config: None,
            record_store: None,
            auth_backend: None,
            fetcher: None,
            installer: None,
            transport: None,
        }
    }

    pub fn contexts(mut self, contexts: Arc<ContextRegistry>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn config(mut self, config: Arc<ConfigResolver>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    pub fn auth_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth_backend = Some(backend);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PackFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn installer(mut self, installer: Arc<dyn DependencyInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn PublishTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> BitPack {
        let contexts = self.contexts.unwrap_or_default();
        let config = self.config.unwrap_or_default();

        let rest = Arc::new(RestBackend::new(config.clone()));
        let store: Arc<dyn RecordStore> = match self.record_store {
            Some(store) => store,
            None => rest.clone(),
        };
        let backend: Arc<dyn AuthBackend> = match self.auth_backend {
            Some(backend) => backend,
            None => rest,
        };
        let records = RecordManager::new(store);

        let fetcher = self.fetcher.unwrap_or_else(|| Arc::new(HttpPackFetcher::new()));
        let auth = AuthService::new(config.clone(), contexts.clone(), backend, records.clone());
        let packs = PackService::new(PackServiceParts {
            config: config.clone(),
            queries: Arc::new(QueryResolver::new(records.clone())),
            stores: Arc::new(StoreRegistry::new(fetcher)),
            records,
            installer: self.installer.unwrap_or_else(|| Arc::new(NpmInstaller::new())),
            transport: self.transport.unwrap_or_else(|| Arc::new(HttpPublishTransport::new())),
        });

        BitPack {
            pack_type: self.pack_type,
            contexts,
            config,
            auth,
            packs,
        }
    }
}

impl BitPack {
    /// A client with the default collaborators.
    pub fn new(pack_type: impl Into<String>) -> Self {
        BitPackBuilder::new(pack_type).build()
    }

    pub fn builder(pack_type: impl Into<String>) -> BitPackBuilder {
        BitPackBuilder::new(pack_type)
    }

    pub fn pack_type(&self) -> &str {
        &self.pack_type
    }

    pub fn config_resolver(&self) -> &Arc<ConfigResolver> {
        &self.config
    }

    /// Merge `config` into the process-wide override layer.
    ///
    /// # Errors
    ///
    /// [`BitpackError::InvalidArgument`] unless `config` is a JSON object.
    pub fn configure(&self, config: Value) -> Result<()> {
        let Value::Object(map) = config else {
            return Err(BitpackError::InvalidArgument {
                name: "config".to_string(),
                reason: "must be an object".to_string(),
            }
            .into());
        };
        self.config.update_config_overrides(map.into_iter().map(|(k, v)| (k, ConfigValue::from(v))).collect());
        Ok(())
    }

    /// A fully established context chain for `options`.
    pub async fn context(&self, options: ContextOptions) -> Result<ContextChain> {
        let mut chain = self.contexts.generate_context_chain();
        self.contexts.establish_pack_type(&mut chain, &self.pack_type)?;
        self.contexts.establish_exec(&mut chain, &options)?;

        let config = self.config.load_config_chain(&chain).await?;
        let firebase_url = config.get_property("firebaseUrl").ok_or_else(|| BitpackError::InvalidConfigValue {
            key: "firebaseUrl".to_string(),
            expected: "string",
        })?;
        self.contexts.establish_firebase(&mut chain, firebase_url.expect_str("firebaseUrl")?)?;

        self.auth.auth(&mut chain).await?;
        Ok(chain)
    }

    pub async fn config_get(&self, key: &str, options: ContextOptions) -> Result<Option<ConfigValue>> {
        let chain = self.context(options.or_target(ConfigTarget::Project)).await?;
        self.config.get_config_property(&chain, key).await
    }

    pub async fn config_set(&self, key: &str, value: ConfigValue, options: ContextOptions) -> Result<()> {
        let chain = self.context(options.or_target(ConfigTarget::Project)).await?;
        self.config.set_config_property(&chain, key, value).await
    }

    pub async fn config_delete(&self, key: &str, options: ContextOptions) -> Result<ConfigDeleteResult> {
        let chain = self.context(options.or_target(ConfigTarget::Project)).await?;
        self.config.delete_config_property(&chain, key).await
    }

    pub async fn get(
        &self,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        query: &str,
        options: ContextOptions,
    ) -> Result<Arc<Pack>> {
        let chain = self.context(options.or_target(ConfigTarget::Project)).await?;
        self.packs.get_pack(&chain, pack_type, pack_class, scope, query).await
    }

    pub async fn install(
        &self,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        query: &str,
        options: ContextOptions,
    ) -> Result<Arc<Pack>> {
        let chain = self.context(options.or_target(ConfigTarget::Project)).await?;
        self.packs.install_pack(&chain, pack_type, pack_class, scope, query).await
    }

    /// Publish the pack at `pack_path`, or at the exec directory when `None`.
    ///
    /// A relative `pack_path` is taken relative to the exec directory.
    pub async fn publish(
        &self,
        pack_type: &str,
        pack_class: &str,
        scope: &str,
        pack_path: Option<&Path>,
        options: ContextOptions,
    ) -> Result<PublishKeyRecord> {
        let mut chain = self.context(options.or_target(ConfigTarget::Project)).await?;
        let exec = chain.exec()?;
        let pack_path = pack_path.map_or_else(|| exec.exec_path().to_path_buf(), |p| exec.exec_path().join(p));
        let current = self.auth.auth(&mut chain).await?;
        self.packs.publish_pack(&chain, &current, pack_type, pack_class, scope, &pack_path).await
    }

    pub async fn login(&self, email: &str, password: &str, options: ContextOptions) -> Result<Arc<CurrentUser>> {
        let mut chain = self.context(options.or_target(ConfigTarget::User)).await?;
        self.auth.login(&mut chain, email, password).await
    }

    pub async fn logout(&self, options: ContextOptions) -> Result<Arc<CurrentUser>> {
        let mut chain = self.context(options.or_target(ConfigTarget::User)).await?;
        self.auth.logout(&mut chain).await
    }

    pub async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
        options: ContextOptions,
    ) -> Result<Arc<CurrentUser>> {
        let mut chain = self.context(options.or_target(ConfigTarget::User)).await?;
        self.auth.sign_up(&mut chain, username, email, password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::PackRef;
    use crate::test_utils::{
        MemoryAuthBackend, MemoryPackFetcher, MemoryRecordStore, RecordingInstaller, RecordingTransport, TestContext,
    };
    use serde_json::json;

    struct Fixture {
        ctx: TestContext,
        store: Arc<MemoryRecordStore>,
        backend: Arc<MemoryAuthBackend>,
        transport: Arc<RecordingTransport>,
        bitpack: BitPack,
    }

    fn fixture() -> Fixture {
        let ctx = TestContext::new("gulp").unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let backend = Arc::new(MemoryAuthBackend::new());
        let transport = Arc::new(RecordingTransport::new());
        let bitpack = BitPack::builder("gulp")
            .contexts(ctx.contexts.clone())
            .config(ctx.config.clone())
            .record_store(store.clone())
            .auth_backend(backend.clone())
            .fetcher(Arc::new(MemoryPackFetcher::new()))
            .installer(Arc::new(RecordingInstaller::new()))
            .transport(transport.clone())
            .build();
        Fixture {
            ctx,
            store,
            backend,
            transport,
            bitpack,
        }
    }

    fn options(ctx: &TestContext) -> ContextOptions {
        ContextOptions::default()
            .with_exec_path(&ctx.exec_path)
            .with_module_path(&ctx.module_path)
            .with_user_path(&ctx.home_path)
    }

    #[test]
    fn test_configure_requires_object() {
        let f = fixture();
        let err = f.bitpack.configure(json!(["prefix"])).unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::InvalidArgument { .. })));

        f.bitpack.configure(json!({"prefix": "/opt"})).unwrap();
        assert_eq!(f.ctx.config.get_config_override("prefix"), Some(ConfigValue::from("/opt")));
    }

    #[tokio::test]
    async fn test_context_establishes_every_slot() {
        let f = fixture();
        let chain = f.bitpack.context(options(&f.ctx)).await.unwrap();

        assert_eq!(chain.pack_type().unwrap().pack_type(), "gulp");
        assert_eq!(chain.exec().unwrap().target(), ConfigTarget::Project);
        assert_eq!(chain.firebase().unwrap().firebase_url(), crate::config::DEFAULT_FIREBASE_URL);
        assert_eq!(chain.user().unwrap().user_id(), crate::auth::ANONYMOUS_USER_ID);
    }

    #[tokio::test]
    async fn test_config_round_trip_on_project_target() {
        let f = fixture();
        f.bitpack.config_set("registry", ConfigValue::from("local"), options(&f.ctx)).await.unwrap();

        let value = f.bitpack.config_get("registry", options(&f.ctx)).await.unwrap();
        assert_eq!(value, Some(ConfigValue::from("local")));
        assert!(f.ctx.exec_path.join(".gulprc").exists());

        let deleted = f.bitpack.config_delete("registry", options(&f.ctx)).await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(f.bitpack.config_get("registry", options(&f.ctx)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_writes_user_config() {
        let f = fixture();
        f.backend.add_account("alice@example.com", "secret", "uid-1");

        let current = f.bitpack.login("alice@example.com", "secret", options(&f.ctx)).await.unwrap();
        assert_eq!(current.user_id(), "uid-1");
        assert!(f.ctx.home_path.join(".gulprc").exists());
        assert!(!f.ctx.exec_path.join(".gulprc").exists());

        let current = f.bitpack.logout(options(&f.ctx)).await.unwrap();
        assert!(current.is_anonymous());
    }

    #[tokio::test]
    async fn test_publish_as_anonymous_fails() {
        let f = fixture();
        let pack_dir = f.ctx.exec_path.join("clean");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("gulp.json"), r#"{"name": "clean", "version": "1.0.0"}"#).unwrap();

        let err = f
            .bitpack
            .publish("gulp", "task", "public", Some(Path::new("clean")), options(&f.ctx))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::UserIsAnonymous { .. })));
        assert!(f.transport.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_sign_up_then_publish() {
        let f = fixture();
        let pack_dir = f.ctx.exec_path.join("clean");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("gulp.json"), r#"{"name": "clean", "version": "1.0.0"}"#).unwrap();

        let current = f.bitpack.sign_up("alice", "alice@example.com", "secret", options(&f.ctx)).await.unwrap();
        assert_eq!(current.username(), Some("alice"));

        let key = f
            .bitpack
            .publish("gulp", "task", "public", Some(pack_dir.as_path()), options(&f.ctx).with_target("user"))
            .await
            .unwrap();
        assert_eq!(key.pack_name, "clean");
        assert_eq!(f.transport.uploads().len(), 1);

        let pack = PackRef::new("gulp", "task", "public", "clean");
        let owner = format!("{}/collaborators/{}/owner", pack.path(&[]), current.user_id());
        assert_eq!(f.store.value_at(&owner), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_install_unknown_pack() {
        let f = fixture();
        let err = f.bitpack.install("gulp", "task", "public", "missing", options(&f.ctx)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::PackNotFound { .. })));
    }
}
