//! A single config layer backed by a JSON file.
//!
//! Config files may hold auth tokens, so they must be readable by their owner
//! only. A file whose permission bits are anything other than `0600` is
//! refused on load, and every save forces the mode back to `0600`.

use super::{ConfigProperties, ConfigValue};
use crate::core::BitpackError;
use crate::core::file_error::FileOps;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Required permission bits of a config file.
pub const CONFIG_FILE_MODE: u32 = 0o600;

/// One layer of configuration.
///
/// File-backed layers remember their path and whether the file existed when
/// loaded. In-memory layers (the process-wide override bag) have no path and
/// cannot be saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackConfig {
    file_path: Option<PathBuf>,
    exists: bool,
    properties: ConfigProperties,
}

impl PackConfig {
    /// An in-memory layer holding `properties`.
    pub fn in_memory(properties: ConfigProperties) -> Self {
        Self {
            file_path: None,
            exists: false,
            properties,
        }
    }

    /// Load a config file.
    ///
    /// When the file does not exist the layer holds `defaults` and
    /// [`exists`](Self::exists) is false. When it does exist its contents
    /// replace the defaults entirely; an empty file is an empty bag.
    ///
    /// # Errors
    ///
    /// - [`BitpackError::ConfigNotAFile`] if the path is not a regular file
    /// - [`BitpackError::BadConfigPermissions`] if the mode is not `0600`
    /// - [`BitpackError::ConfigParseError`] if the content is not a JSON object
    /// - any other IO failure
    pub async fn load_from_file(file_path: &Path, defaults: ConfigProperties) -> Result<Self> {
        let missing = || Self {
            file_path: Some(file_path.to_path_buf()),
            exists: false,
            properties: defaults.clone(),
        };

        match Self::validate_config_file(file_path).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => return Ok(missing()),
            Err(e) => return Err(e),
        }

        let content = match FileOps::read_with_context(file_path, "loading config").await {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(missing()),
            Err(e) => return Err(e.into()),
        };

        let properties = if content.trim().is_empty() {
            ConfigProperties::new()
        } else {
            serde_json::from_str(&content).map_err(|e| BitpackError::ConfigParseError {
                path: file_path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        tracing::debug!(target: "config", "Loaded config file {}", file_path.display());
        Ok(Self {
            file_path: Some(file_path.to_path_buf()),
            exists: true,
            properties,
        })
    }

    /// Check that `file_path` is a regular file with mode `0600`.
    pub async fn validate_config_file(file_path: &Path) -> Result<()> {
        let metadata = FileOps::metadata_with_context(file_path, "validating config file").await?;
        if !metadata.is_file() {
            return Err(BitpackError::ConfigNotAFile {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode() & 0o777;
            if mode != CONFIG_FILE_MODE {
                return Err(BitpackError::BadConfigPermissions {
                    path: file_path.to_path_buf(),
                    mode,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Rewrite the whole file as pretty JSON and force mode `0600`.
    pub async fn save_to_file(&mut self) -> Result<()> {
        let Some(file_path) = self.file_path.clone() else {
            return Err(BitpackError::InvalidArgument {
                name: "config".to_string(),
                reason: "an in-memory config layer cannot be saved".to_string(),
            }
            .into());
        };

        let json = serde_json::to_string_pretty(&self.properties)?;
        FileOps::write_with_mode(&file_path, json.as_bytes(), CONFIG_FILE_MODE, "saving config").await?;
        self.exists = true;

        tracing::debug!(target: "config", "Wrote config file {}", file_path.display());
        Ok(())
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn mark_exists(&mut self) {
        self.exists = true;
    }

    pub fn properties(&self) -> &ConfigProperties {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.properties.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Set `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Option<ConfigValue> {
        self.properties.insert(key.into(), value.into())
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.properties.remove(key).is_some()
    }

    /// Merge `properties` over the current ones.
    pub fn update(&mut self, properties: ConfigProperties) {
        self.properties.extend(properties);
    }
}

fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<crate::core::FileOperationError>()
        .is_some_and(crate::core::FileOperationError::is_not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn defaults() -> ConfigProperties {
        ConfigProperties::from([("prefix".to_string(), ConfigValue::from("/usr/local"))])
    }

    #[cfg(unix)]
    fn write_with_mode(path: &Path, content: &str, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, content).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = PackConfig::load_from_file(&temp.path().join(".gulprc"), defaults()).await.unwrap();

        assert!(!config.exists());
        assert_eq!(config.get("prefix").and_then(ConfigValue::as_str), Some("/usr/local"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_existing_file_replaces_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");
        write_with_mode(&path, r#"{"debug": true}"#, 0o600);

        let config = PackConfig::load_from_file(&path, defaults()).await.unwrap();
        assert!(config.exists());
        assert_eq!(config.get("debug"), Some(&ConfigValue::Bool(true)));
        assert!(!config.has("prefix"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_group_readable_file_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");
        write_with_mode(&path, r#"{"debug": true}"#, 0o644);

        let err = PackConfig::load_from_file(&path, defaults()).await.unwrap_err();
        match err.downcast::<BitpackError>().unwrap() {
            BitpackError::BadConfigPermissions {
                mode,
                ..
            } => assert_eq!(mode, 0o644),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");
        std::fs::create_dir(&path).unwrap();

        let err = PackConfig::load_from_file(&path, defaults()).await.unwrap_err();
        assert!(matches!(err.downcast::<BitpackError>().unwrap(), BitpackError::ConfigNotAFile { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_malformed_json_is_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");
        write_with_mode(&path, "{not json", 0o600);

        let err = PackConfig::load_from_file(&path, defaults()).await.unwrap_err();
        assert!(matches!(err.downcast::<BitpackError>().unwrap(), BitpackError::ConfigParseError { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_empty_file_is_empty_bag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");
        write_with_mode(&path, "", 0o600);

        let config = PackConfig::load_from_file(&path, defaults()).await.unwrap();
        assert!(config.exists());
        assert!(config.properties().is_empty());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_save_is_idempotent_and_forces_mode() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gulprc");

        let mut config = PackConfig::load_from_file(&path, ConfigProperties::new()).await.unwrap();
        config.set("b", "2");
        config.set("a", true);
        config.save_to_file().await.unwrap();
        let first = std::fs::read(&path).unwrap();
        config.save_to_file().await.unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert!(config.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);

        let reloaded = PackConfig::load_from_file(&path, ConfigProperties::new()).await.unwrap();
        assert_eq!(reloaded.properties(), config.properties());
    }

    #[tokio::test]
    async fn test_in_memory_layer_cannot_be_saved() {
        let mut config = PackConfig::in_memory(defaults());
        assert!(config.save_to_file().await.is_err());
    }

    #[test]
    fn test_set_delete_update() {
        let mut config = PackConfig::in_memory(ConfigProperties::new());
        assert_eq!(config.set("k", "v"), None);
        assert!(config.has("k"));
        assert!(config.delete("k"));
        assert!(!config.delete("k"));
        config.update(defaults());
        assert!(config.has("prefix"));
    }
}
