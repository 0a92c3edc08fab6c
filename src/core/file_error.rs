//! Structured file system error handling
//!
//! Config layers and pack files are read from several well-known locations.
//! Wrapping `std::io::Error` with the operation, path and purpose at the call
//! site lets callers recognise a missing file (`is_not_found`) while every
//! other failure still reports exactly which file was involved.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// File operation being performed when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Metadata,
    SetPermissions,
    CreateDir,
    Rename,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Metadata => write!(f, "getting file metadata"),
            FileOperation::SetPermissions => write!(f, "setting permissions"),
            FileOperation::CreateDir => write!(f, "creating directory"),
            FileOperation::Rename => write!(f, "renaming"),
        }
    }
}

/// IO error annotated with the operation, path and purpose
#[derive(Error, Debug)]
#[error("Failed {operation} '{}' for {purpose}", file_path.display())]
pub struct FileOperationError {
    pub operation: FileOperation,
    pub file_path: PathBuf,
    pub purpose: String,
    #[source]
    pub source: std::io::Error,
}

impl FileOperationError {
    /// True when the underlying IO error is `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::NotFound
    }
}

/// Extension trait to attach file context to IO results
pub trait FileResultExt<T> {
    fn with_file_context(
        self,
        operation: FileOperation,
        file_path: impl Into<PathBuf>,
        purpose: impl Into<String>,
    ) -> Result<T, FileOperationError>;
}

impl<T> FileResultExt<T> for Result<T, std::io::Error> {
    fn with_file_context(
        self,
        operation: FileOperation,
        file_path: impl Into<PathBuf>,
        purpose: impl Into<String>,
    ) -> Result<T, FileOperationError> {
        self.map_err(|source| FileOperationError {
            operation,
            file_path: file_path.into(),
            purpose: purpose.into(),
            source,
        })
    }
}

/// Async file helpers that always carry context
pub struct FileOps;

impl FileOps {
    pub async fn read_with_context(path: &Path, purpose: &str) -> Result<String, FileOperationError> {
        tokio::fs::read_to_string(path).await.with_file_context(FileOperation::Read, path, purpose)
    }

    pub async fn read_bytes_with_context(path: &Path, purpose: &str) -> Result<Vec<u8>, FileOperationError> {
        tokio::fs::read(path).await.with_file_context(FileOperation::Read, path, purpose)
    }

    pub async fn metadata_with_context(
        path: &Path,
        purpose: &str,
    ) -> Result<std::fs::Metadata, FileOperationError> {
        tokio::fs::metadata(path).await.with_file_context(FileOperation::Metadata, path, purpose)
    }

    /// Atomically replace `path` with `content`, creating the parent
    /// directory if needed.
    ///
    /// The content goes to a uniquely named sibling created with `mode`
    /// (Unix only), is synced, and is then renamed over `path`. Readers see
    /// either the old file or the new one.
    pub async fn write_with_mode(
        path: &Path,
        content: &[u8],
        mode: u32,
        purpose: &str,
    ) -> Result<(), FileOperationError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.with_file_context(
                FileOperation::CreateDir,
                parent,
                purpose,
            )?;
        }

        let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let result = Self::write_new_file(&temp_path, content, mode, purpose).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&temp_path, path).await.with_file_context(
                FileOperation::Rename,
                path,
                purpose,
            ),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        result
    }

    async fn write_new_file(
        path: &Path,
        content: &[u8],
        mode: u32,
        purpose: &str,
    ) -> Result<(), FileOperationError> {
        use tokio::io::AsyncWriteExt;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(path).await.with_file_context(FileOperation::Write, path, purpose)?;
        file.write_all(content).await.with_file_context(FileOperation::Write, path, purpose)?;
        file.sync_all().await.with_file_context(FileOperation::Write, path, purpose)?;

        // The umask may have cleared bits requested at creation.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                .await
                .with_file_context(FileOperation::SetPermissions, path, purpose)?;
        }

        Ok(())
    }
}
