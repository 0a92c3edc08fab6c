//! Integration test suite for bitpack
//!
//! End-to-end tests through the public [`bitpack::BitPack`] API and the
//! `bitpack` binary. Remote collaborators are replaced with the in-memory
//! fakes from `bitpack::test_utils`; nothing here touches the network.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: The `bitpack` binary against temporary home and module dirs
//! - **config**: Layer precedence, target routing and file permissions
//! - **packs**: Query resolution, install and publish through the facade

mod common;

mod cli;
mod config;
mod packs;
