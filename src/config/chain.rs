//! Overlay of config layers.

use super::{ConfigValue, PackConfig};
use crate::context::ConfigTarget;
use crate::core::BitpackError;
use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

/// A config layer shared between chains.
pub type SharedConfig = Arc<RwLock<PackConfig>>;

pub(crate) fn read(config: &SharedConfig) -> RwLockReadGuard<'_, PackConfig> {
    config.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write(config: &SharedConfig) -> RwLockWriteGuard<'_, PackConfig> {
    config.write().unwrap_or_else(PoisonError::into_inner)
}

/// Position of a layer in the chain, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigLayer {
    Override,
    Project,
    User,
    Global,
    BuiltIn,
}

impl ConfigLayer {
    fn for_target(target: ConfigTarget) -> Self {
        match target {
            ConfigTarget::Global => Self::Global,
            ConfigTarget::User => Self::User,
            ConfigTarget::Project => Self::Project,
        }
    }
}

/// Layers to assemble into a chain. Absent layers are skipped.
#[derive(Debug, Clone, Default)]
pub struct ChainLayers {
    pub override_config: Option<SharedConfig>,
    pub project: Option<SharedConfig>,
    pub user: Option<SharedConfig>,
    pub global: Option<SharedConfig>,
    pub built_in: Option<SharedConfig>,
}

/// Outcome of deleting a property from the target layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDeleteResult {
    /// Whether the property was removed
    pub deleted: bool,
    /// Whether the target config file existed
    pub exists: bool,
    pub key: String,
    /// The removed value
    pub value: Option<ConfigValue>,
}

/// Resolves properties across layers: override > project > user > global >
/// built-in. Writes go to the layer selected by the context's target.
#[derive(Debug)]
pub struct PackConfigChain {
    layers: Vec<(ConfigLayer, SharedConfig)>,
    target: ConfigTarget,
    /// Held from mutation until the target file is written.
    saving: Mutex<()>,
}

impl PackConfigChain {
    pub fn new(layers: ChainLayers, target: ConfigTarget) -> Self {
        let ordered = [
            (ConfigLayer::Override, layers.override_config),
            (ConfigLayer::Project, layers.project),
            (ConfigLayer::User, layers.user),
            (ConfigLayer::Global, layers.global),
            (ConfigLayer::BuiltIn, layers.built_in),
        ];

        Self {
            layers: ordered.into_iter().filter_map(|(layer, config)| config.map(|c| (layer, c))).collect(),
            target,
            saving: Mutex::new(()),
        }
    }

    pub fn target(&self) -> ConfigTarget {
        self.target
    }

    pub fn layer(&self, layer: ConfigLayer) -> Option<SharedConfig> {
        self.layers.iter().find(|(l, _)| *l == layer).map(|(_, config)| config.clone())
    }

    /// The layer that receives writes.
    pub fn target_config(&self) -> Result<SharedConfig, BitpackError> {
        self.layer(ConfigLayer::for_target(self.target)).ok_or(BitpackError::ConfigNotLoaded)
    }

    /// First value for `key` in precedence order.
    pub fn get_property(&self, key: &str) -> Option<ConfigValue> {
        self.layers.iter().find_map(|(_, config)| read(config).get(key).cloned())
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.layers.iter().any(|(_, config)| read(config).has(key))
    }

    /// Set `key` on the target layer and save it.
    pub async fn set_property(&self, key: &str, value: ConfigValue) -> Result<()> {
        let target = self.target_config()?;
        let _saving = self.saving.lock().await;
        let mut snapshot = {
            let mut config = write(&target);
            config.set(key, value);
            config.clone()
        };
        snapshot.save_to_file().await?;
        write(&target).mark_exists();
        Ok(())
    }

    /// Delete `key` from the target layer, saving only if it was present.
    pub async fn delete_property(&self, key: &str) -> Result<ConfigDeleteResult> {
        let target = self.target_config()?;
        let _saving = self.saving.lock().await;
        let (mut result, snapshot) = {
            let mut config = write(&target);
            let value = config.get(key).cloned();
            let deleted = config.delete(key);
            let result = ConfigDeleteResult {
                deleted,
                exists: config.exists(),
                key: key.to_string(),
                value,
            };
            (result, deleted.then(|| config.clone()))
        };

        if let Some(mut snapshot) = snapshot {
            snapshot.save_to_file().await?;
            write(&target).mark_exists();
            result.exists = true;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProperties;

    fn layer(value: &str) -> SharedConfig {
        Arc::new(RwLock::new(PackConfig::in_memory(ConfigProperties::from([(
            "key".to_string(),
            ConfigValue::from(value),
        )]))))
    }

    #[test]
    fn test_precedence_order() {
        let all = ChainLayers {
            override_config: Some(layer("override")),
            project: Some(layer("project")),
            user: Some(layer("user")),
            global: Some(layer("global")),
            built_in: Some(layer("builtIn")),
        };
        let chain = PackConfigChain::new(all.clone(), ConfigTarget::Project);
        assert_eq!(chain.get_property("key"), Some(ConfigValue::from("override")));

        let chain = PackConfigChain::new(
            ChainLayers {
                override_config: None,
                project: None,
                ..all
            },
            ConfigTarget::Project,
        );
        assert_eq!(chain.get_property("key"), Some(ConfigValue::from("user")));
        assert_eq!(chain.get_property("absent"), None);
        assert!(!chain.has_property("absent"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_keep_file_valid() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");
        let project = PackConfig::load_from_file(&path, ConfigProperties::new()).await.unwrap();
        let chain = Arc::new(PackConfigChain::new(
            ChainLayers {
                project: Some(Arc::new(RwLock::new(project))),
                ..Default::default()
            },
            ConfigTarget::Project,
        ));

        let writes = (0..16).map(|i| {
            let chain = chain.clone();
            tokio::spawn(async move { chain.set_property(&format!("k{i}"), ConfigValue::from(i.to_string())).await })
        });
        for write in futures::future::join_all(writes).await {
            write.unwrap().unwrap();
        }
        chain.delete_property("k0").await.unwrap();

        let reloaded = PackConfig::load_from_file(&path, ConfigProperties::new()).await.unwrap();
        assert_eq!(reloaded.properties().len(), 15);
        assert!(!reloaded.has("k0"));
        assert_eq!(reloaded.get("k15"), Some(&ConfigValue::from("15")));
    }

    #[test]
    fn test_target_layer_follows_target() {
        let layers = ChainLayers {
            user: Some(layer("user")),
            global: Some(layer("global")),
            ..Default::default()
        };
        let chain = PackConfigChain::new(layers.clone(), ConfigTarget::User);
        let target = chain.target_config().unwrap();
        assert_eq!(read(&target).get("key"), Some(&ConfigValue::from("user")));

        let chain = PackConfigChain::new(layers, ConfigTarget::Project);
        assert!(chain.target_config().is_err());
    }
}
