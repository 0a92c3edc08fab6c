//! Building and caching config chains per context.

use super::chain::{self, ChainLayers, ConfigDeleteResult, PackConfigChain, SharedConfig};
use super::tokens::replace_value_tokens;
use super::{ConfigProperties, ConfigValue, PackConfig};
use crate::cache::{SingleFlight, make_cache_key};
use crate::context::{ConfigTarget, ContextChain, ExecContext};
use crate::core::BitpackError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Default firebase root used when no layer sets `firebaseUrl`.
pub const DEFAULT_FIREBASE_URL: &str = "https://bitpack.firebaseio.com";
/// Default server root used when no layer sets `serverUrl`.
pub const DEFAULT_SERVER_URL: &str = "https://bitpack.io";
/// Default install prefix, also the location of the global config file.
pub const DEFAULT_PREFIX: &str = "/usr/local";

/// Built-in defaults before token substitution.
fn built_in_defaults() -> ConfigProperties {
    ConfigProperties::from([
        ("cache".to_string(), ConfigValue::from("{home}/.{type}")),
        ("debug".to_string(), ConfigValue::Bool(false)),
        ("firebaseUrl".to_string(), ConfigValue::from(DEFAULT_FIREBASE_URL)),
        ("prefix".to_string(), ConfigValue::from(DEFAULT_PREFIX)),
        ("serverUrl".to_string(), ConfigValue::from(DEFAULT_SERVER_URL)),
    ])
}

/// Name of the config file for a pack type, e.g. `.gulprc`.
pub fn config_file_name(pack_type: &str) -> String {
    format!(".{pack_type}rc")
}

/// Builds the [`PackConfigChain`] for a context chain and memoizes it.
///
/// Chains are keyed by pack type and exec context. Concurrent requests for a
/// chain that is still being built wait for that build instead of starting
/// another one.
///
/// # Example
///
/// ```rust,no_run
/// use bitpack::config::ConfigResolver;
/// use bitpack::context::{ContextOptions, ContextRegistry};
///
/// # async fn example() -> anyhow::Result<()> {
/// let registry = ContextRegistry::new();
/// let resolver = ConfigResolver::new();
/// let mut chain = registry.generate_context_chain();
/// registry.establish_pack_type(&mut chain, "gulp")?;
/// registry.establish_exec(&mut chain, &ContextOptions::default())?;
///
/// let prefix = resolver.get_config_property(&chain, "prefix").await?;
/// println!("{prefix:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigResolver {
    overrides: SharedConfig,
    chains: SingleFlight<String, Arc<PackConfigChain>>,
    builds: AtomicUsize,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            overrides: Arc::new(RwLock::new(PackConfig::in_memory(ConfigProperties::new()))),
            chains: SingleFlight::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Composite key of the pack type and exec contexts.
    pub fn chain_key(context_chain: &ContextChain) -> Result<String, BitpackError> {
        let pack_type = context_chain.pack_type()?;
        let exec = context_chain.exec()?;
        Ok(make_cache_key(&[&pack_type.context_key(), &exec.context_key()]))
    }

    /// Load (or reuse) the config chain for `context_chain`.
    pub async fn load_config_chain(&self, context_chain: &ContextChain) -> Result<Arc<PackConfigChain>> {
        let key = Self::chain_key(context_chain)?;
        let exec = context_chain.exec()?;
        let pack_type = context_chain.pack_type()?;

        self.chains
            .get_or_try_init(key, || async move {
                self.builds.fetch_add(1, Ordering::SeqCst);
                let chain = self.build_config_chain(&exec, pack_type.pack_type()).await?;
                Ok(Arc::new(chain))
            })
            .await
    }

    /// The already-loaded chain for `context_chain`, if any.
    pub fn config_chain(&self, context_chain: &ContextChain) -> Result<Option<Arc<PackConfigChain>>> {
        Ok(self.chains.get(&Self::chain_key(context_chain)?))
    }

    /// Number of chain builds started so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Read a property from an already-loaded chain.
    ///
    /// # Errors
    ///
    /// [`BitpackError::ConfigNotLoaded`] if the chain has not been loaded.
    pub fn get_property(&self, context_chain: &ContextChain, key: &str) -> Result<Option<ConfigValue>> {
        let chain = self.config_chain(context_chain)?.ok_or(BitpackError::ConfigNotLoaded)?;
        Ok(chain.get_property(key))
    }

    pub async fn get_config_property(&self, context_chain: &ContextChain, key: &str) -> Result<Option<ConfigValue>> {
        let chain = self.load_config_chain(context_chain).await?;
        Ok(chain.get_property(key))
    }

    /// Write `key` through to the context's target layer.
    pub async fn set_config_property(
        &self,
        context_chain: &ContextChain,
        key: &str,
        value: ConfigValue,
    ) -> Result<()> {
        let chain = self.load_config_chain(context_chain).await?;
        tracing::debug!(target: "config", "Setting '{}' on {} config", key, chain.target());
        chain.set_property(key, value).await
    }

    pub async fn delete_config_property(
        &self,
        context_chain: &ContextChain,
        key: &str,
    ) -> Result<ConfigDeleteResult> {
        let chain = self.load_config_chain(context_chain).await?;
        tracing::debug!(target: "config", "Deleting '{}' from {} config", key, chain.target());
        chain.delete_property(key).await
    }

    /// Merge `properties` into the process-wide override layer.
    pub fn update_config_overrides(&self, properties: ConfigProperties) {
        chain::write(&self.overrides).update(properties);
    }

    pub fn get_config_override(&self, key: &str) -> Option<ConfigValue> {
        chain::read(&self.overrides).get(key).cloned()
    }

    pub fn set_config_override(&self, key: &str, value: ConfigValue) -> Option<ConfigValue> {
        chain::write(&self.overrides).set(key, value)
    }

    /// Built-in defaults with `{home}` and `{type}` substituted.
    pub fn config_defaults(exec: &ExecContext, pack_type: &str) -> ConfigProperties {
        let values = HashMap::from([
            ("home", exec.user_path().to_string_lossy().into_owned()),
            ("type", pack_type.to_string()),
        ]);
        built_in_defaults().into_iter().map(|(k, v)| (k, replace_value_tokens(v, &values))).collect()
    }

    async fn build_config_chain(&self, exec: &ExecContext, pack_type: &str) -> Result<PackConfigChain> {
        let file_name = config_file_name(pack_type);
        let target = exec.target();
        tracing::debug!(target: "config", "Building config chain for {} ({})", exec.exec_path().display(), target);

        let built_in_path = exec.module_path().join("resources").join(&file_name);
        let project_path = exec.exec_path().join(&file_name);
        let user_path = exec.user_path().join(&file_name);
        let (built_in, project, user) = tokio::try_join!(
            PackConfig::load_from_file(&built_in_path, Self::config_defaults(exec, pack_type)),
            load_in_scope(target, ConfigTarget::Project, &project_path),
            load_in_scope(target, ConfigTarget::User, &user_path),
        )?;

        let mut layers = ChainLayers {
            override_config: Some(self.overrides.clone()),
            project: project.map(shared),
            user: user.map(shared),
            global: None,
            built_in: Some(shared(built_in)),
        };

        // The global file lives under the prefix, which the other layers decide.
        let provisional = PackConfigChain::new(layers.clone(), target);
        let prefix = provisional.get_property("prefix").ok_or(BitpackError::InvalidConfigValue {
            key: "prefix".to_string(),
            expected: "string",
        })?;
        let prefix = exec.exec_path().join(prefix.expect_str("prefix")?);

        let global = load_in_scope(target, ConfigTarget::Global, &prefix.join(&file_name))
            .await
            .with_context(|| format!("Failed to load global config under {}", prefix.display()))?;
        layers.global = global.map(shared);

        Ok(PackConfigChain::new(layers, target))
    }
}

fn shared(config: PackConfig) -> SharedConfig {
    Arc::new(RwLock::new(config))
}

/// Load a layer only when the context target is not below it.
async fn load_in_scope(target: ConfigTarget, layer: ConfigTarget, path: &Path) -> Result<Option<PackConfig>> {
    if target.weight() < layer.weight() {
        return Ok(None);
    }
    PackConfig::load_from_file(path, ConfigProperties::new()).await.map(Some)
}
