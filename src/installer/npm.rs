//! npm-backed [`DependencyInstaller`].

use super::DependencyInstaller;
use crate::core::BitpackError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

/// Installs a pack's npm dependencies into the pack directory by running
/// `npm install --prefix <pack path>`.
#[derive(Debug, Default)]
pub struct NpmInstaller {
    npm: OnceLock<PathBuf>,
}

impl NpmInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    fn npm_path(&self) -> Result<&Path> {
        if let Some(path) = self.npm.get() {
            return Ok(path.as_path());
        }
        let found = which::which("npm").map_err(|e| BitpackError::InstallFailed {
            reason: format!("npm was not found on PATH: {e}"),
        })?;
        Ok(self.npm.get_or_init(|| found).as_path())
    }
}

#[async_trait]
impl DependencyInstaller for NpmInstaller {
    async fn load(&self, prefix: &Path) -> Result<()> {
        let npm = self.npm_path()?;
        tokio::fs::create_dir_all(prefix)
            .await
            .with_context(|| format!("Failed to create install prefix {}", prefix.display()))?;
        tracing::debug!(target: "pack", "Using {} for prefix {}", npm.display(), prefix.display());
        Ok(())
    }

    async fn install(&self, prefix: &Path, packages: &[String]) -> Result<()> {
        let npm = self.npm_path()?;
        tracing::debug!(target: "pack", "npm install --prefix {} {}", prefix.display(), packages.join(" "));

        let output = Command::new(npm)
            .arg("install")
            .arg("--prefix")
            .arg(prefix)
            .arg("--no-save")
            .args(packages)
            .current_dir(prefix)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", npm.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BitpackError::InstallFailed {
                reason: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}
