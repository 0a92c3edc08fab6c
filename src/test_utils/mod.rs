//! Test utilities for bitpack
//!
//! In-memory stand-ins for every external collaborator, plus a temporary
//! directory layout for exec, home and module paths:
//!
//! - [`MemoryRecordStore`] - a JSON tree implementing
//!   [`RecordStore`](crate::remote::RecordStore)
//! - [`MemoryAuthBackend`] - accounts and tokens in a map
//! - [`MemoryPackFetcher`] - archives keyed by URL
//! - [`RecordingInstaller`] and [`RecordingTransport`] - record calls instead
//!   of running npm or uploading
//! - [`TestContext`] - temporary directories plus a shared
//!   [`ConfigResolver`](crate::config::ConfigResolver) and
//!   [`ContextRegistry`](crate::context::ContextRegistry)
//!
//! # Example
//!
//! ```rust,no_run
//! use bitpack::test_utils::TestContext;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ctx = TestContext::new("gulp")?;
//! ctx.write_config(&ctx.exec_path, serde_json::json!({"prefix": "/opt"}))?;
//! let chain = ctx.chain("project")?;
//! let prefix = ctx.config.get_config_property(&chain, "prefix").await?;
//! # Ok(())
//! # }
//! ```

mod context;
mod memory;

pub use context::TestContext;
pub use memory::{
    MemoryAuthBackend, MemoryPackFetcher, MemoryRecordStore, RecordingInstaller, RecordingTransport, Upload,
};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` if given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=config=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
