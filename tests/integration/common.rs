//! Shared fixtures for the integration suite.

#![allow(dead_code)]

use anyhow::Result;
use bitpack::BitPack;
use bitpack::context::ContextOptions;
use bitpack::core::PackPackage;
use bitpack::test_utils::{
    MemoryAuthBackend, MemoryPackFetcher, MemoryRecordStore, RecordingInstaller, RecordingTransport, TestContext,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

pub const PACK_TYPE: &str = "gulp";

/// A [`BitPack`] wired to in-memory collaborators inside a [`TestContext`].
pub struct TestBitPack {
    pub ctx: TestContext,
    pub store: Arc<MemoryRecordStore>,
    pub backend: Arc<MemoryAuthBackend>,
    pub fetcher: Arc<MemoryPackFetcher>,
    pub installer: Arc<RecordingInstaller>,
    pub transport: Arc<RecordingTransport>,
    pub bitpack: BitPack,
}

impl TestBitPack {
    pub fn new() -> Result<Self> {
        let ctx = TestContext::new(PACK_TYPE)?;
        let store = Arc::new(MemoryRecordStore::new());
        let backend = Arc::new(MemoryAuthBackend::new());
        let fetcher = Arc::new(MemoryPackFetcher::new());
        let installer = Arc::new(RecordingInstaller::new());
        let transport = Arc::new(RecordingTransport::new());
        let bitpack = BitPack::builder(PACK_TYPE)
            .contexts(ctx.contexts.clone())
            .config(ctx.config.clone())
            .record_store(store.clone())
            .auth_backend(backend.clone())
            .fetcher(fetcher.clone())
            .installer(installer.clone())
            .transport(transport.clone())
            .build();
        Ok(Self {
            ctx,
            store,
            backend,
            fetcher,
            installer,
            transport,
            bitpack,
        })
    }

    /// Options pointing at the temporary exec, module and home directories.
    pub fn options(&self) -> ContextOptions {
        ContextOptions::default()
            .with_exec_path(&self.ctx.exec_path)
            .with_module_path(&self.ctx.module_path)
            .with_user_path(&self.ctx.home_path)
    }

    /// Package a pack with the given name and version, register its archive
    /// with the fetcher and record it as published.
    pub async fn seed_version(&self, class: &str, name: &str, version: &str) -> Result<()> {
        let source = tempfile::TempDir::new()?;
        write_pack_dir(source.path(), name, version)?;
        let package = PackPackage::package(PACK_TYPE, source.path()).await?;

        let url = format!("https://cdn.bitpack.io/{PACK_TYPE}/{class}/{name}/{version}.zip");
        self.fetcher.insert(&url, package.archive().to_vec());

        let chain = self.ctx.chain("project")?;
        let records = bitpack::remote::RecordManager::new(self.store.clone());
        let pack = bitpack::remote::PackRef::new(PACK_TYPE, class, "public", name);
        records.create_pack_version(&chain, pack, version).await?;
        records.publish_pack_version(&chain, pack, version, &url, package.hash()).await?;
        Ok(())
    }
}

/// Write `<dir>/gulp.json` and `<dir>/index.js`.
pub fn write_pack_dir(dir: &Path, name: &str, version: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(
        dir.join(format!("{PACK_TYPE}.json")),
        serde_json::to_string_pretty(&json!({
            "name": name,
            "version": version,
            "main": "index.js",
        }))?,
    )?;
    std::fs::write(dir.join("index.js"), "module.exports = function () {};\n")?;
    Ok(())
}
