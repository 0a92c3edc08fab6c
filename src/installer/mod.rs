//! Pack installation and publishing
//!
//! # Install
//!
//! 1. Resolve the query to a concrete version ([`crate::query`])
//! 2. Serve the pack from the execution directory when already installed
//! 3. Otherwise look up the version record, download its archive through the
//!    cache directory (config property `cache`) and extract it into
//!    `<exec>/.<type>/<class>/<scope>/<name>/<version>`
//! 4. Install the pack's `npmDependencies` into the pack directory with the
//!    [`DependencyInstaller`]
//!
//! # Publish
//!
//! 1. Load and validate `<pack path>/<type>.json`
//! 2. Refuse versions that are already published
//! 3. Package the directory ([`PackPackage`](crate::core::PackPackage))
//! 4. Check the current user is a collaborator, creating the pack record with
//!    them as owner if the pack is new
//! 5. Create the version record and a publish key
//! 6. Upload the archive with the [`PublishTransport`]

mod npm;
mod publish;
mod service;

pub use npm::NpmInstaller;
pub use publish::{HttpPublishTransport, PublishTransport};
pub use service::{PackService, PackServiceParts};

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Installs a pack's third-party dependencies.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Prepare for installs into `prefix`. Called once per prefix.
    async fn load(&self, prefix: &Path) -> Result<()>;

    /// Install `packages` (`name@range`) into `prefix`.
    async fn install(&self, prefix: &Path, packages: &[String]) -> Result<()>;
}
