//! Packaging of a pack directory into a zip archive.
//!
//! Publishing uploads a single archive of the pack directory together with its
//! SHA-256 hash. Installing extracts the same archive into the pack path. Both
//! run on the blocking pool since `zip` and `walkdir` are synchronous.
//!
//! Editor droppings, VCS directories, installed dependencies and the pack
//! type's own config and install directories are never packaged.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// A packaged pack directory ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackPackage {
    archive: Vec<u8>,
    hash: String,
    file_count: usize,
}

/// Names excluded from every package. `{type}` is the pack type.
const DEFAULT_IGNORES: &[&str] = &[
    ".DS_Store",
    ".git",
    ".hg",
    ".lock-wscript",
    ".npmrc",
    ".svn",
    ".{type}",
    ".{type}rc",
    "CVS",
    "config.gypi",
    "node_modules",
    "npm-debug.log",
];

fn is_ignored(name: &str, pack_type: &str) -> bool {
    if name.starts_with("._") || name.starts_with(".wafpickle-") {
        return true;
    }
    if name.starts_with('.') && name.ends_with(".swp") {
        return true;
    }
    DEFAULT_IGNORES.iter().any(|pattern| pattern.replace("{type}", pack_type) == name)
}

impl PackPackage {
    /// Zip every regular file under `pack_path`, with paths stored relative to
    /// it and `/` separated. Entries are added in sorted order with a fixed
    /// timestamp so the hash only depends on the directory contents.
    pub async fn package(pack_type: &str, pack_path: &Path) -> Result<Self> {
        let root = pack_path.to_path_buf();
        let pack_type = pack_type.to_string();
        tokio::task::spawn_blocking(move || Self::package_blocking(&pack_type, &root))
            .await
            .context("Packaging task panicked")?
    }

    /// Wrap an archive obtained elsewhere, e.g. a download.
    pub fn from_archive(archive: Vec<u8>) -> Self {
        let hash = hex::encode(Sha256::digest(&archive));
        Self {
            archive,
            hash,
            file_count: 0,
        }
    }

    fn package_blocking(pack_type: &str, root: &Path) -> Result<Self> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());
        let mut file_count = 0;

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(&e.file_name().to_string_lossy(), pack_type));
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root)?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;

            writer.start_file(name, options)?;
            writer.write_all(&bytes)?;
            file_count += 1;
        }

        let archive = writer.finish()?.into_inner();
        let hash = hex::encode(Sha256::digest(&archive));
        tracing::debug!(target: "pack", "Packaged {} files from {} ({} bytes)", file_count, root.display(), archive.len());

        Ok(Self {
            archive,
            hash,
            file_count,
        })
    }

    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    pub fn into_archive(self) -> Vec<u8> {
        self.archive
    }

    /// Lowercase hex SHA-256 of the archive bytes.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Number of files packaged; zero for archives from [`from_archive`](Self::from_archive).
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Extract into `destination`, creating it if needed.
    pub async fn extract_to_path(&self, destination: &Path) -> Result<()> {
        extract_archive(self.archive.clone(), destination).await
    }
}

/// Extract a pack archive into `destination`, creating it if needed.
pub async fn extract_archive(archive: Vec<u8>, destination: &Path) -> Result<()> {
    let destination: PathBuf = destination.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&destination)
            .with_context(|| format!("Failed to create {}", destination.display()))?;
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).context("Invalid pack archive")?;
        zip.extract(&destination)
            .with_context(|| format!("Failed to extract pack archive into {}", destination.display()))
    })
    .await
    .context("Extraction task panicked")?
}
