//! Pack files and loaded packs.
//!
//! A pack on disk is a directory containing a `<type>.json` pack file. The
//! pack file must name the pack and its version; everything else is optional.
//! Identity fields missing from the file (`type`, `class`, `scope`) are filled
//! in from the location the file was loaded for.

use crate::core::BitpackError;
use crate::core::file_error::FileOps;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Lower case letters, digits and single dashes, starting with a letter.
/// Shared by pack names and usernames.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z]+(?:[a-z0-9-][a-z0-9]+)*$").expect("name pattern is valid")
});

/// Whether `name` is a valid pack name or username.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Parsed contents of a pack file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackData {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(rename = "class", default)]
    pub pack_class: String,
    #[serde(default)]
    pub scope: String,
    #[serde(rename = "type", default)]
    pub pack_type: String,
    /// Third-party dependencies installed alongside the pack, `name -> range`
    #[serde(rename = "npmDependencies", default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Identity fields applied underneath the file's own values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackFileDefaults {
    pub pack_type: String,
    pub pack_class: String,
    pub scope: String,
}

impl PackFileDefaults {
    pub fn new(
        pack_type: impl Into<String>,
        pack_class: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            pack_type: pack_type.into(),
            pack_class: pack_class.into(),
            scope: scope.into(),
        }
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("type".into(), Value::String(self.pack_type.clone()));
        map.insert("class".into(), Value::String(self.pack_class.clone()));
        map.insert("scope".into(), Value::String(self.scope.clone()));
        map
    }
}

/// A pack file together with the path it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFile {
    file_path: PathBuf,
    data: PackData,
}

impl PackFile {
    pub fn new(file_path: impl Into<PathBuf>, data: PackData) -> Self {
        Self {
            file_path: file_path.into(),
            data,
        }
    }

    /// Load and validate a pack file.
    ///
    /// Returns `Ok(None)` when no file exists at `file_path`. A file that
    /// exists but is not a JSON object, or lacks a string `name` or
    /// `version`, fails with [`BitpackError::InvalidPackFile`].
    pub async fn load_from_file(file_path: &Path, defaults: &PackFileDefaults) -> Result<Option<Self>> {
        let content = match FileOps::read_with_context(file_path, "loading pack file").await {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let parsed: Value = serde_json::from_str(&content).map_err(|e| BitpackError::InvalidPackFile {
            path: file_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let Value::Object(fields) = parsed else {
            return Err(BitpackError::InvalidPackFile {
                path: file_path.to_path_buf(),
                reason: "pack file must contain a JSON object".to_string(),
            }
            .into());
        };

        let mut merged = defaults.to_map();
        merged.extend(fields);
        let data = Self::validate(file_path, merged)?;

        Ok(Some(Self::new(file_path, data)))
    }

    fn validate(file_path: &Path, fields: Map<String, Value>) -> Result<PackData, BitpackError> {
        for required in ["name", "version"] {
            if !fields.get(required).is_some_and(Value::is_string) {
                return Err(BitpackError::InvalidPackFile {
                    path: file_path.to_path_buf(),
                    reason: format!("\"{required}\" must be specified"),
                });
            }
        }

        serde_json::from_value(Value::Object(fields)).map_err(|e| BitpackError::InvalidPackFile {
            path: file_path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn data(&self) -> &PackData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn version(&self) -> &str {
        &self.data.version
    }

    pub fn pack_type(&self) -> &str {
        &self.data.pack_type
    }

    pub fn pack_class(&self) -> &str {
        &self.data.pack_class
    }

    pub fn scope(&self) -> &str {
        &self.data.scope
    }
}

/// An installed pack, backed by its parsed pack file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    pack_file: PackFile,
}

impl Pack {
    pub fn new(pack_file: PackFile) -> Self {
        Self {
            pack_file,
        }
    }

    pub fn pack_file(&self) -> &PackFile {
        &self.pack_file
    }

    /// Entry point relative to [`pack_path`](Self::pack_path), if declared.
    pub fn main(&self) -> Option<&str> {
        self.pack_file.data.main.as_deref()
    }

    pub fn name(&self) -> &str {
        self.pack_file.name()
    }

    pub fn version(&self) -> &str {
        self.pack_file.version()
    }

    pub fn pack_type(&self) -> &str {
        self.pack_file.pack_type()
    }

    pub fn pack_class(&self) -> &str {
        self.pack_file.pack_class()
    }

    pub fn scope(&self) -> &str {
        self.pack_file.scope()
    }

    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.pack_file.data.dependencies
    }

    /// Directory the pack is installed in.
    pub fn pack_path(&self) -> &Path {
        self.pack_file.file_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Absolute path of the entry point, if declared.
    pub fn main_path(&self) -> Option<PathBuf> {
        self.main().map(|main| self.pack_path().join(main))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_pattern() {
        for valid in ["lint", "gulp-lint", "ab1", "es6-to-es5"] {
            assert!(is_valid_name(valid), "{valid}");
        }
        for invalid in ["", "1lint", "Lint", "lint-", "lint_x", "a-"] {
            assert!(!is_valid_name(invalid), "{invalid}");
        }
    }
    use tempfile::TempDir;

    fn defaults() -> PackFileDefaults {
        PackFileDefaults::new("gulp", "task", "public")
    }

    #[tokio::test]
    async fn test_load_applies_defaults_under_file_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gulp.json");
        std::fs::write(
            &path,
            r#"{"name": "lint", "version": "1.2.0", "scope": "private", "main": "index.js",
                "npmDependencies": {"eslint": "^8.0.0"}}"#,
        )
        .unwrap();

        let file = PackFile::load_from_file(&path, &defaults()).await.unwrap().unwrap();
        assert_eq!(file.name(), "lint");
        assert_eq!(file.pack_type(), "gulp");
        assert_eq!(file.pack_class(), "task");
        assert_eq!(file.scope(), "private");

        let pack = Pack::new(file);
        assert_eq!(pack.pack_path(), temp.path());
        assert_eq!(pack.main_path(), Some(temp.path().join("index.js")));
        assert_eq!(pack.dependencies().get("eslint").map(String::as_str), Some("^8.0.0"));
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let temp = TempDir::new().unwrap();
        let loaded = PackFile::load_from_file(&temp.path().join("gulp.json"), &defaults()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_missing_version_is_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gulp.json");
        std::fs::write(&path, r#"{"name": "lint"}"#).unwrap();

        let err = PackFile::load_from_file(&path, &defaults()).await.unwrap_err();
        let err = err.downcast::<BitpackError>().unwrap();
        assert!(matches!(err, BitpackError::InvalidPackFile { ref reason, .. } if reason.contains("version")));
    }

    #[tokio::test]
    async fn test_non_string_name_is_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gulp.json");
        std::fs::write(&path, r#"{"name": 7, "version": "1.0.0"}"#).unwrap();

        let err = PackFile::load_from_file(&path, &defaults()).await.unwrap_err();
        assert!(err.to_string().contains("\"name\" must be specified"));
    }
}
