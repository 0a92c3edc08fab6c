//! Core types for bitpack
//!
//! This module holds the pieces every other module builds on:
//!
//! - [`error`] - the [`BitpackError`] taxonomy and terminal-friendly
//!   [`ErrorContext`] reporting via [`user_friendly_error`]
//! - [`file_error`] - IO errors annotated with operation, path and purpose
//! - [`pack`] - parsed pack files ([`PackFile`]) and installed packs ([`Pack`])
//! - [`package`] - zip packaging of a pack directory for publishing
//!
//! # Error Handling Pattern
//!
//! Services return `anyhow::Result` and raise [`BitpackError`] variants for
//! every failure the caller may want to branch on. The CLI converts whatever
//! reaches the top into an [`ErrorContext`]:
//!
//! ```rust,no_run
//! use bitpack::core::{BitpackError, user_friendly_error};
//!
//! fn resolve() -> anyhow::Result<String> {
//!     Err(BitpackError::PackNotFound { name: "left-pad".into() }.into())
//! }
//!
//! if let Err(e) = resolve() {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod error;
pub mod file_error;
pub mod pack;
pub mod package;

pub use error::{BitpackError, ErrorContext, user_friendly_error};
pub use file_error::{FileOperation, FileOperationError, FileOps, FileResultExt};
pub use pack::{Pack, PackData, PackFile, PackFileDefaults, is_valid_name};
pub use package::{PackPackage, extract_archive};
