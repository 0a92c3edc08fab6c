//! Error handling for bitpack
//!
//! This module provides the error taxonomy and user-facing error reporting for
//! bitpack. It follows two rules:
//! 1. **Strongly-typed errors** so callers can branch on a failure without
//!    string matching (e.g. [`BitpackError::PackVersionExists`])
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Not found**: [`BitpackError::PackNotFound`], [`BitpackError::NoVersionMatch`], ...
//!   Recoverable by the caller. The pack store turns a missing pack file into
//!   `None` instead of raising one of these.
//! - **Validation**: [`BitpackError::BadConfigPermissions`], [`BitpackError::InvalidPackFile`], ...
//!   Fatal and never retried.
//! - **Precondition**: [`BitpackError::ContextNotEstablished`], [`BitpackError::ConfigNotLoaded`].
//!   Programmer errors in the call sequence.
//! - **Conflict**: [`BitpackError::PackVersionExists`].
//! - **Access**: [`BitpackError::AccessDenied`], [`BitpackError::UserIsAnonymous`].
//! - **Transport**: [`BitpackError::UploadFailed`], [`BitpackError::DownloadFailed`],
//!   [`BitpackError::InstallFailed`], [`BitpackError::RemoteError`].
//! - **Cache**: [`BitpackError::CacheNotAFile`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use bitpack::core::{BitpackError, user_friendly_error};
//!
//! let err = anyhow::Error::from(BitpackError::NoVersionMatch {
//!     query: "left-pad@^9.0.0".to_string(),
//! });
//! let ctx = user_friendly_error(err);
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for bitpack operations.
///
/// Every failure the core can produce on its own has a dedicated variant.
/// Errors coming from collaborators (remote store, transport, installer) are
/// carried through `anyhow` unchanged unless they map onto one of these.
#[derive(Error, Debug)]
pub enum BitpackError {
    /// A context slot of a [`ContextChain`](crate::context::ContextChain) was
    /// read before it was established.
    #[error("No current {kind} context. Must first establish the {kind} context")]
    ContextNotEstablished {
        /// Which slot was read ("exec", "packType", "user", "firebase")
        kind: &'static str,
    },

    /// A context could not be constructed from the supplied fields
    #[error("Invalid context: {reason}")]
    InvalidContext {
        /// Why the context was rejected
        reason: String,
    },

    /// The requested config target is not one of global, user or project
    #[error("Invalid config target '{target}'. Target must be one of [\"global\", \"user\", \"project\"]")]
    InvalidTarget {
        /// The rejected target string
        target: String,
    },

    /// A property was read through the resolver before the config chain for
    /// that context was loaded
    #[error("Config not loaded. Must first load the config before reading properties")]
    ConfigNotLoaded,

    /// The config path exists but is not a regular file
    #[error("The config path \"{path}\" is not a file")]
    ConfigNotAFile {
        /// Offending path
        path: PathBuf,
    },

    /// A config file does not have mode 0600
    #[error("Cannot read config file \"{path}\" with perms \"{mode:o}\". Perms must be 600")]
    BadConfigPermissions {
        /// Offending path
        path: PathBuf,
        /// Permission bits found on disk
        mode: u32,
    },

    /// A config file could not be parsed
    #[error("Invalid config file \"{path}\": {reason}")]
    ConfigParseError {
        /// Offending path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// A config property holds a value of the wrong shape
    #[error("Invalid value for config property '{key}': expected {expected}")]
    InvalidConfigValue {
        /// Property name
        key: String,
        /// Expected shape ("string", "boolean", ...)
        expected: &'static str,
    },

    /// An API argument had the wrong shape
    #[error("Illegal argument '{name}': {reason}")]
    InvalidArgument {
        /// Argument name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// No pack exists under the queried name
    #[error("A pack by the name \"{name}\" does not exist.")]
    PackNotFound {
        /// Pack name
        name: String,
    },

    /// The pack exists but the requested version record does not
    #[error("Cannot find {scope} version \"{version}\" for {class}-{pack_type} \"{name}\".")]
    PackVersionNotFound {
        /// Pack type
        pack_type: String,
        /// Pack class
        class: String,
        /// Pack scope
        scope: String,
        /// Pack name
        name: String,
        /// Requested version number
        version: String,
    },

    /// No published version satisfies the query
    #[error("Cannot find a version match for \"{query}\"")]
    NoVersionMatch {
        /// The raw query
        query: String,
    },

    /// A pack file is missing required fields or is malformed
    #[error("Invalid pack file \"{path}\": {reason}")]
    InvalidPackFile {
        /// Pack file path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A pack name does not follow the naming rules
    #[error("Invalid pack name \"{name}\": {reason}")]
    InvalidPackName {
        /// Rejected name
        name: String,
        /// Rule that failed
        reason: String,
    },

    /// A pack version is not a semantic version
    #[error("Invalid pack version \"{version}\": {reason}")]
    InvalidPackVersion {
        /// Rejected version
        version: String,
        /// Parser message
        reason: String,
    },

    /// The version being published already exists and is published
    #[error("{pack_type}-{class} {name}@{version} has already been published")]
    PackVersionExists {
        /// Pack type
        pack_type: String,
        /// Pack class
        class: String,
        /// Pack name
        name: String,
        /// Version number
        version: String,
    },

    /// The current user may not publish to the pack
    #[error("User does not have access to publish to pack \"{name}\"")]
    AccessDenied {
        /// Pack name
        name: String,
    },

    /// The operation requires a logged-in user
    #[error("You must be logged in to {operation}")]
    UserIsAnonymous {
        /// Operation that was refused
        operation: String,
    },

    /// No stored credentials exist for the current context
    #[error("No auth data found")]
    NoAuthFound,

    /// The authenticated uid has no user record
    #[error("User with uid \"{uid}\" does not exist")]
    UserNotFound {
        /// Authenticated uid
        uid: String,
    },

    /// A username failed validation
    #[error("Invalid username \"{username}\"")]
    InvalidUsername {
        /// Rejected username
        username: String,
    },

    /// The username belongs to another user
    #[error("Username \"{username}\" is already in use")]
    UsernameInUse {
        /// Username
        username: String,
    },

    /// An email address failed validation
    #[error("Invalid email \"{email}\"")]
    InvalidEmail {
        /// Rejected email
        email: String,
    },

    /// The email belongs to another user
    #[error("Email \"{email}\" is already in use")]
    EmailInUse {
        /// Email
        email: String,
    },

    /// The publish endpoint rejected the upload
    #[error("Package upload error: {reason}")]
    UploadFailed {
        /// Transport or status message
        reason: String,
    },

    /// A pack archive could not be downloaded
    #[error("Failed to download \"{url}\": {reason}")]
    DownloadFailed {
        /// Pack URL
        url: String,
        /// Transport or status message
        reason: String,
    },

    /// A pack cache entry exists but is not a regular file
    #[error("The cache file path \"{path}\" is not a file")]
    CacheNotAFile {
        /// Offending path
        path: PathBuf,
    },

    /// The dependency installer failed
    #[error("Failed to install dependencies: {reason}")]
    InstallFailed {
        /// Installer output
        reason: String,
    },

    /// The remote record store returned an error
    #[error("Remote store error on '{path}': {reason}")]
    RemoteError {
        /// Record path
        path: String,
        /// Backend message
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Semver parsing error
    #[error("Semver parsing error: {0}")]
    SemverError(#[from] semver::Error),
}

impl BitpackError {
    /// Whether this error means "nothing there" rather than "something broke".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PackNotFound { .. }
                | Self::PackVersionNotFound { .. }
                | Self::NoVersionMatch { .. }
                | Self::NoAuthFound
                | Self::UserNotFound { .. }
        )
    }
}

/// Error wrapper carrying a suggestion and details for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    /// Headline message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors:
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions.
///
/// Recognizes [`BitpackError`] anywhere in the `anyhow` chain, then IO
/// errors, and falls back to printing the full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(bitpack_error) = error.chain().find_map(|e| e.downcast_ref::<BitpackError>()) {
        return create_error_context(bitpack_error, &error);
    }

    if let Some(io_error) = error.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(error.to_string())
                    .with_suggestion("Check file ownership and permissions")
                    .with_details("bitpack does not have permission to read or write a file");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(error.to_string())
                    .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    ErrorContext::new(with_cause_chain(&error))
}

fn with_cause_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }
    message
}

fn create_error_context(error: &BitpackError, full: &anyhow::Error) -> ErrorContext {
    let ctx = ErrorContext::new(error.to_string());
    match error {
        BitpackError::BadConfigPermissions {
            path,
            ..
        } => ctx
            .with_suggestion(format!("Run: chmod 600 {}", path.display()))
            .with_details("Config files may contain auth tokens and must only be readable by their owner"),
        BitpackError::ConfigParseError {
            ..
        } => ctx.with_suggestion("Fix the JSON syntax in the config file or delete it"),
        BitpackError::InvalidTarget {
            ..
        } => ctx.with_suggestion("Use --target global, --target user or --target project"),
        BitpackError::PackNotFound {
            ..
        } => ctx.with_suggestion("Check the pack name, type, class and scope"),
        BitpackError::NoVersionMatch {
            ..
        } => ctx.with_suggestion("Relax the version range or omit it to use the latest published version"),
        BitpackError::PackVersionExists {
            ..
        } => ctx.with_suggestion("Bump the \"version\" field of the pack file before publishing again"),
        BitpackError::InvalidPackName {
            ..
        } => ctx.with_details(
            "Pack names must be lower case letters, numbers or dashes and must start with a letter",
        ),
        BitpackError::UserIsAnonymous {
            ..
        } => ctx.with_suggestion("Run: bitpack login"),
        BitpackError::AccessDenied {
            ..
        } => ctx.with_suggestion("Ask an owner of the pack to add you as a collaborator"),
        BitpackError::CacheNotAFile {
            path,
        } => ctx.with_suggestion(format!("Remove {} so the pack can be downloaded again", path.display())),
        BitpackError::ContextNotEstablished {
            ..
        }
        | BitpackError::ConfigNotLoaded => ctx.with_details(with_cause_chain(full)),
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(
            BitpackError::PackNotFound {
                name: "x".into()
            }
            .is_not_found()
        );
        assert!(!BitpackError::ConfigNotLoaded.is_not_found());
    }

    #[test]
    fn test_user_friendly_error_finds_nested_bitpack_error() {
        let err = anyhow::Error::from(BitpackError::BadConfigPermissions {
            path: PathBuf::from("/tmp/.packrc"),
            mode: 0o644,
        })
        .context("loading project config");

        let ctx = user_friendly_error(err);
        assert!(ctx.message.contains("644"));
        assert!(ctx.suggestion.unwrap().contains("chmod 600"));
    }

    #[test]
    fn test_generic_error_includes_cause_chain() {
        let err = anyhow::anyhow!("root").context("outer");
        let ctx = user_friendly_error(err);
        assert!(ctx.message.contains("outer"));
        assert!(ctx.message.contains("Caused by"));
    }

    #[test]
    fn test_display_includes_suggestion() {
        let ctx = ErrorContext::new("boom").with_suggestion("try again");
        assert_eq!(format!("{ctx}"), "boom\nSuggestion: try again");
    }
}
