//! Typed records stored in the remote record store.
//!
//! Field names follow the store's camelCase JSON layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds since the Unix epoch, the timestamp unit used by every record.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `packs/<type>/<class>/<scope>/<name>/versionsInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackVersionsInfo {
    /// Latest published version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    /// Every published version, keyed by escaped version string.
    #[serde(default)]
    pub all: BTreeMap<String, String>,
}

impl PackVersionsInfo {
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.all.values().map(String::as_str)
    }
}

/// Parsed form of a version number, stored alongside the raw string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticVersionRecord {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    #[serde(default)]
    pub prerelease: Vec<String>,
    #[serde(default)]
    pub build: Vec<String>,
    pub version: String,
}

impl From<&semver::Version> for SemanticVersionRecord {
    fn from(version: &semver::Version) -> Self {
        let split = |s: &str| -> Vec<String> {
            if s.is_empty() {
                Vec::new()
            } else {
                s.split('.').map(str::to_string).collect()
            }
        };
        Self {
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            prerelease: split(version.pre.as_str()),
            build: split(version.build.as_str()),
            version: version.to_string(),
        }
    }
}

/// `packs/<type>/<class>/<scope>/<name>/versions/<version>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackVersionRecord {
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub pack_hash: String,
    #[serde(default)]
    pub pack_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_version: Option<SemanticVersionRecord>,
    pub version_number: String,
}

/// `packs/<type>/<class>/<scope>/<name>/info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackInfoRecord {
    pub class: String,
    pub created_at: i64,
    pub name: String,
    pub scope: String,
    #[serde(rename = "type")]
    pub pack_type: String,
    pub updated_at: i64,
}

/// `packs/<type>/<class>/<scope>/<name>/collaborators/<userId>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackCollaboratorRecord {
    pub created_at: i64,
    #[serde(default)]
    pub owner: bool,
    pub updated_at: i64,
    pub user_id: String,
}

/// `packs/<type>/<class>/<scope>/<name>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackRecord {
    #[serde(default)]
    pub collaborators: BTreeMap<String, PackCollaboratorRecord>,
    pub info: PackInfoRecord,
}

/// `publishKeys/<key>`
///
/// A one-shot credential the publish endpoint exchanges for the right to
/// store one archive under one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishKeyRecord {
    pub key: String,
    pub pack_class: String,
    pub pack_hash: String,
    pub pack_name: String,
    pub pack_scope: String,
    pub pack_type: String,
    pub pack_version_number: String,
}

/// `users/<userId>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub email: String,
    pub id: String,
    #[serde(default)]
    pub signed_up: bool,
    #[serde(default)]
    pub username: String,
}

impl UserRecord {
    /// A freshly created user before sign-up completes.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            email: String::new(),
            id: id.into(),
            signed_up: false,
            username: String::new(),
        }
    }
}
