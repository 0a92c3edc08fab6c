//! Execution contexts
//!
//! Every bitpack operation runs against a [`ContextChain`]: which directory it
//! was invoked from and which config layer it writes to ([`ExecContext`]),
//! which kind of pack it manages ([`PackTypeContext`]), who is logged in
//! ([`UserContext`]) and which backend it talks to ([`FirebaseContext`]).
//!
//! Context values are immutable and compared by value. The
//! [`ContextRegistry`] hands out one canonical `Arc` per distinct value so the
//! caches keyed by contexts can share state between chains that describe the
//! same situation.
//!
//! # Establishing a chain
//!
//! ```rust,no_run
//! use bitpack::context::{ContextOptions, ContextRegistry};
//!
//! # fn example() -> anyhow::Result<()> {
//! let registry = ContextRegistry::new();
//! let mut chain = registry.generate_context_chain();
//! registry.establish_pack_type(&mut chain, "gulp")?;
//! registry.establish_exec(&mut chain, &ContextOptions::default())?;
//!
//! assert_eq!(chain.pack_type()?.pack_type(), "gulp");
//! # Ok(())
//! # }
//! ```

mod registry;

pub use registry::ContextRegistry;

use crate::cache::make_cache_key;
use crate::core::BitpackError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Environment variable overriding the directory holding `resources/`.
pub const MODULE_PATH_ENV: &str = "BITPACK_MODULE_PATH";

/// Which config layer writes are routed to.
///
/// Targets are ordered by weight: a context only reads the layers whose
/// weight does not exceed its own target, so a `global` context never sees
/// user or project settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigTarget {
    Global,
    User,
    #[default]
    Project,
}

impl ConfigTarget {
    pub const fn weight(self) -> u8 {
        match self {
            Self::Global => 0,
            Self::User => 1,
            Self::Project => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigTarget {
    type Err = BitpackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "user" => Ok(Self::User),
            "project" => Ok(Self::Project),
            other => Err(BitpackError::InvalidTarget {
                target: other.to_string(),
            }),
        }
    }
}

/// Caller-supplied inputs for an [`ExecContext`].
///
/// Unset fields fall back to the process environment: the current directory,
/// the `project` target, [`default_module_path`] and the user's home
/// directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    pub exec_path: Option<PathBuf>,
    pub target: Option<String>,
    pub module_path: Option<PathBuf>,
    pub user_path: Option<PathBuf>,
}

impl ContextOptions {
    pub fn with_exec_path(mut self, exec_path: impl Into<PathBuf>) -> Self {
        self.exec_path = Some(exec_path.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_module_path(mut self, module_path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(module_path.into());
        self
    }

    pub fn with_user_path(mut self, user_path: impl Into<PathBuf>) -> Self {
        self.user_path = Some(user_path.into());
        self
    }

    /// Fill in `target` only if the caller left it unset.
    pub fn or_target(mut self, target: ConfigTarget) -> Self {
        if self.target.is_none() {
            self.target = Some(target.as_str().to_string());
        }
        self
    }
}

/// Directory holding the built-in `resources/` directory.
///
/// `BITPACK_MODULE_PATH` when set, else the directory of the running
/// executable.
pub fn default_module_path() -> Result<PathBuf, BitpackError> {
    if let Some(path) = std::env::var_os(MODULE_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| BitpackError::InvalidContext {
        reason: format!("cannot determine module path from {}", exe.display()),
    })
}

fn absolute(path: &Path) -> Result<PathBuf, BitpackError> {
    Ok(std::path::absolute(path)?)
}

/// Where an operation runs and which config layer it targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecContext {
    exec_path: PathBuf,
    module_path: PathBuf,
    target: ConfigTarget,
    user_path: PathBuf,
}

impl ExecContext {
    pub fn new(
        exec_path: impl Into<PathBuf>,
        module_path: impl Into<PathBuf>,
        target: ConfigTarget,
        user_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            exec_path: exec_path.into(),
            module_path: module_path.into(),
            target,
            user_path: user_path.into(),
        }
    }

    /// Resolve options against the process environment.
    ///
    /// # Errors
    ///
    /// [`BitpackError::InvalidTarget`] for an unknown target string and
    /// [`BitpackError::InvalidContext`] when no home directory can be found.
    pub fn from_options(options: &ContextOptions) -> Result<Self, BitpackError> {
        let exec_path = match &options.exec_path {
            Some(path) => absolute(path)?,
            None => std::env::current_dir()?,
        };
        let target = match &options.target {
            Some(target) => target.parse()?,
            None => ConfigTarget::default(),
        };
        let module_path = match &options.module_path {
            Some(path) => absolute(path)?,
            None => default_module_path()?,
        };
        let user_path = match &options.user_path {
            Some(path) => absolute(path)?,
            None => dirs::home_dir().ok_or_else(|| BitpackError::InvalidContext {
                reason: "cannot determine the user's home directory".to_string(),
            })?,
        };

        Ok(Self::new(exec_path, module_path, target, user_path))
    }

    pub fn exec_path(&self) -> &Path {
        &self.exec_path
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn target(&self) -> ConfigTarget {
        self.target
    }

    pub fn user_path(&self) -> &Path {
        &self.user_path
    }

    /// Injective key over all four fields.
    pub fn context_key(&self) -> String {
        let target = self.target.to_string();
        make_cache_key(&[
            &self.exec_path.to_string_lossy(),
            &self.module_path.to_string_lossy(),
            &target,
            &self.user_path.to_string_lossy(),
        ])
    }
}

/// The kind of pack being managed, e.g. `gulp`.
///
/// Selects the config file name (`.<type>rc`) and the install directory
/// (`.<type>/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackTypeContext {
    pack_type: String,
}

impl PackTypeContext {
    pub fn new(pack_type: impl Into<String>) -> Result<Self, BitpackError> {
        let pack_type = pack_type.into();
        if pack_type.is_empty() {
            return Err(BitpackError::InvalidContext {
                reason: "pack type must be a non-empty string".to_string(),
            });
        }
        Ok(Self {
            pack_type,
        })
    }

    pub fn pack_type(&self) -> &str {
        &self.pack_type
    }

    pub fn context_key(&self) -> String {
        self.pack_type.clone()
    }
}

/// Identity of the current user (`anonymous` when not logged in).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserContext {
    user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn context_key(&self) -> String {
        self.user_id.clone()
    }
}

/// Root URL of the remote record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirebaseContext {
    firebase_url: String,
}

impl FirebaseContext {
    pub fn new(firebase_url: impl Into<String>) -> Result<Self, BitpackError> {
        let firebase_url = firebase_url.into();
        if firebase_url.is_empty() {
            return Err(BitpackError::InvalidContext {
                reason: "firebase url must be a non-empty string".to_string(),
            });
        }
        Ok(Self {
            firebase_url,
        })
    }

    pub fn firebase_url(&self) -> &str {
        &self.firebase_url
    }

    pub fn context_key(&self) -> String {
        self.firebase_url.clone()
    }
}

/// The contexts established so far for one operation.
///
/// Slots are filled through [`ContextRegistry`]; reading a slot that has not
/// been established yet is a [`BitpackError::ContextNotEstablished`].
#[derive(Debug, Clone, Default)]
pub struct ContextChain {
    exec: Option<Arc<ExecContext>>,
    pack_type: Option<Arc<PackTypeContext>>,
    user: Option<Arc<UserContext>>,
    firebase: Option<Arc<FirebaseContext>>,
}

impl ContextChain {
    pub fn exec(&self) -> Result<Arc<ExecContext>, BitpackError> {
        self.exec.clone().ok_or(BitpackError::ContextNotEstablished {
            kind: "exec",
        })
    }

    pub fn pack_type(&self) -> Result<Arc<PackTypeContext>, BitpackError> {
        self.pack_type.clone().ok_or(BitpackError::ContextNotEstablished {
            kind: "packType",
        })
    }

    pub fn user(&self) -> Result<Arc<UserContext>, BitpackError> {
        self.user.clone().ok_or(BitpackError::ContextNotEstablished {
            kind: "user",
        })
    }

    pub fn firebase(&self) -> Result<Arc<FirebaseContext>, BitpackError> {
        self.firebase.clone().ok_or(BitpackError::ContextNotEstablished {
            kind: "firebase",
        })
    }

    pub(crate) fn set_exec(&mut self, context: Arc<ExecContext>) {
        self.exec = Some(context);
    }

    pub(crate) fn set_pack_type(&mut self, context: Arc<PackTypeContext>) {
        self.pack_type = Some(context);
    }

    pub(crate) fn set_user(&mut self, context: Arc<UserContext>) {
        self.user = Some(context);
    }

    pub(crate) fn set_firebase(&mut self, context: Arc<FirebaseContext>) {
        self.firebase = Some(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing_and_weights() {
        assert_eq!("global".parse::<ConfigTarget>().unwrap(), ConfigTarget::Global);
        assert_eq!("user".parse::<ConfigTarget>().unwrap(), ConfigTarget::User);
        assert_eq!("project".parse::<ConfigTarget>().unwrap(), ConfigTarget::Project);
        assert!(ConfigTarget::Global.weight() < ConfigTarget::User.weight());
        assert!(ConfigTarget::User.weight() < ConfigTarget::Project.weight());

        let err = "system".parse::<ConfigTarget>().unwrap_err();
        assert!(matches!(err, BitpackError::InvalidTarget { ref target } if target == "system"));
    }

    #[test]
    fn test_exec_context_defaults_to_project_target() {
        let options = ContextOptions::default()
            .with_exec_path("/work/app")
            .with_module_path("/opt/bitpack")
            .with_user_path("/home/alice");
        let context = ExecContext::from_options(&options).unwrap();

        assert_eq!(context.target(), ConfigTarget::Project);
        assert_eq!(context.exec_path(), Path::new("/work/app"));
        assert_eq!(context.context_key(), "9:/work/app@12:/opt/bitpack@7:project@11:/home/alice");
    }

    #[test]
    fn test_exec_context_key_separates_paths() {
        let first = ExecContext::new("/a-/b", "/c", ConfigTarget::Project, "/home/alice");
        let second = ExecContext::new("/a", "/b-/c", ConfigTarget::Project, "/home/alice");
        assert_ne!(first.context_key(), second.context_key());
    }

    #[test]
    fn test_exec_context_relative_path_is_made_absolute() {
        let options = ContextOptions::default()
            .with_exec_path("relative/dir")
            .with_module_path("/opt/bitpack")
            .with_user_path("/home/alice");
        let context = ExecContext::from_options(&options).unwrap();
        assert!(context.exec_path().is_absolute());
        assert!(context.exec_path().ends_with("relative/dir"));
    }

    #[test]
    fn test_exec_context_rejects_unknown_target() {
        let options = ContextOptions::default().with_target("everywhere").with_user_path("/home/alice");
        assert!(matches!(ExecContext::from_options(&options), Err(BitpackError::InvalidTarget { .. })));
    }

    #[test]
    fn test_or_target_keeps_explicit_target() {
        let options = ContextOptions::default().with_target("global").or_target(ConfigTarget::User);
        assert_eq!(options.target.as_deref(), Some("global"));
        let options = ContextOptions::default().or_target(ConfigTarget::User);
        assert_eq!(options.target.as_deref(), Some("user"));
    }

    #[test]
    fn test_empty_pack_type_and_url_are_rejected() {
        assert!(PackTypeContext::new("").is_err());
        assert!(FirebaseContext::new("").is_err());
        assert_eq!(PackTypeContext::new("gulp").unwrap().pack_type(), "gulp");
    }

    #[test]
    fn test_unestablished_slots_fail() {
        let chain = ContextChain::default();
        assert!(matches!(chain.exec(), Err(BitpackError::ContextNotEstablished { kind: "exec" })));
        assert!(matches!(chain.user(), Err(BitpackError::ContextNotEstablished { kind: "user" })));
        assert!(matches!(chain.pack_type(), Err(BitpackError::ContextNotEstablished { kind: "packType" })));
        assert!(matches!(chain.firebase(), Err(BitpackError::ContextNotEstablished { kind: "firebase" })));
    }
}
