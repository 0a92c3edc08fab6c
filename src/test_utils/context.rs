use crate::config::{ConfigResolver, DEFAULT_FIREBASE_URL, DEFAULT_SERVER_URL, config_file_name};
use crate::context::{ContextChain, ContextOptions, ContextRegistry};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary exec, home, module and prefix directories for one pack type.
///
/// The module directory carries a built-in config with the usual defaults,
/// except that `prefix` points at [`global_path`](Self::global_path) so the
/// global layer never reads outside the temporary directory.
pub struct TestContext {
    pub temp: TempDir,
    pub exec_path: PathBuf,
    pub home_path: PathBuf,
    pub module_path: PathBuf,
    pub global_path: PathBuf,
    pub pack_type: String,
    pub contexts: Arc<ContextRegistry>,
    pub config: Arc<ConfigResolver>,
}

impl TestContext {
    pub fn new(pack_type: &str) -> Result<Self> {
        let temp = TempDir::new()?;
        let exec_path = temp.path().join("project");
        let home_path = temp.path().join("home");
        let module_path = temp.path().join("module");
        let global_path = temp.path().join("global");
        for dir in [&exec_path, &home_path, &module_path, &global_path] {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let ctx = Self {
            temp,
            exec_path,
            home_path,
            module_path,
            global_path,
            pack_type: pack_type.to_string(),
            contexts: Arc::new(ContextRegistry::new()),
            config: Arc::new(ConfigResolver::new()),
        };
        ctx.write_config(
            &ctx.module_path.join("resources"),
            json!({
                "cache": ctx.home_path.join(format!(".{pack_type}")),
                "debug": false,
                "firebaseUrl": DEFAULT_FIREBASE_URL,
                "prefix": ctx.global_path,
                "serverUrl": DEFAULT_SERVER_URL,
            }),
        )?;
        Ok(ctx)
    }

    pub fn options(&self, target: &str) -> ContextOptions {
        ContextOptions::default()
            .with_exec_path(&self.exec_path)
            .with_module_path(&self.module_path)
            .with_user_path(&self.home_path)
            .with_target(target)
    }

    /// A chain with exec, pack type and firebase contexts established.
    pub fn chain(&self, target: &str) -> Result<ContextChain> {
        let mut chain = self.contexts.generate_context_chain();
        self.contexts.establish_exec(&mut chain, &self.options(target))?;
        self.contexts.establish_pack_type(&mut chain, &self.pack_type)?;
        self.contexts.establish_firebase(&mut chain, DEFAULT_FIREBASE_URL)?;
        Ok(chain)
    }

    /// [`chain`](Self::chain) plus a user context.
    pub fn user_chain(&self, target: &str, user_id: &str) -> Result<ContextChain> {
        let mut chain = self.chain(target)?;
        self.contexts.establish_user(&mut chain, user_id);
        Ok(chain)
    }

    /// Write `<dir>/.<type>rc` with mode 0600.
    pub fn write_config(&self, dir: &Path, contents: Value) -> Result<PathBuf> {
        let path = dir.join(config_file_name(&self.pack_type));
        write_private(&path, &serde_json::to_string_pretty(&contents)?)?;
        Ok(path)
    }
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
