//! bitpack - a context-scoped package manager client
//!
//! bitpack resolves, installs and publishes versioned *packs* against a
//! remote registry made of a realtime record store and an HTTP upload
//! endpoint. A pack is identified by `(type, class, scope, name, version)`
//! and described by a `<type>.json` pack file.
//!
//! # Architecture Overview
//!
//! Every operation runs against a [`context::ContextChain`]: where it was
//! started and which config layer it writes to, which pack type it manages,
//! who is logged in and which backend it talks to. Everything stateful is
//! cached per context:
//!
//! - config chains are built once per (pack type, exec context)
//! - query results are cached per user
//! - parsed pack files, installed packs and downloaded archives are cached by
//!   their identifying fields
//!
//! ## Layered configuration
//!
//! Properties resolve across up to five `.<type>rc` JSON files, first match
//! wins:
//!
//! 1. **override** - in-memory, set through [`BitPack::configure`]
//! 2. **project** - `<exec path>/.<type>rc`
//! 3. **user** - `<home>/.<type>rc`
//! 4. **global** - `<prefix>/.<type>rc`
//! 5. **built-in** - `<module path>/resources/.<type>rc` over static defaults
//!
//! Config files must have mode `0600`.
//!
//! # Core Modules
//!
//! - [`context`] - Context values, chains and the registry deduplicating them
//! - [`cache`] - Composite-key caches and the single-flight primitive
//! - [`config`] - Config layers, chains and the resolver building them
//! - [`query`] - Resolving `name@range` queries to concrete versions
//! - [`store`] - Loading installed packs and downloading archives
//! - [`remote`] - Record store paths, records and the REST backend
//! - [`auth`] - Current user resolution, login and sign up
//! - [`installer`] - Install and publish flows
//! - [`core`] - Errors, pack files and pack archives
//! - [`cli`] - The `bitpack` command line
//!
//! # Example
//!
//! ```rust,no_run
//! use bitpack::BitPack;
//! use bitpack::context::ContextOptions;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let bitpack = BitPack::new("gulp");
//! let prefix = bitpack.config_get("prefix", ContextOptions::default()).await?;
//! println!("{prefix:?}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
mod facade;
pub mod installer;
pub mod query;
pub mod remote;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use facade::{BitPack, BitPackBuilder};
