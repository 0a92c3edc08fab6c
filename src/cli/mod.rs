//! Command-line interface for bitpack.
//!
//! # Available Commands
//!
//! ## Configuration
//! - `config get|set|delete` - Read and write properties of the layered config
//!
//! ## Packs
//! - `install` - Resolve a query and install the matching pack version
//! - `get` - Same as `install`, printing the pack's main file
//! - `publish` - Package a directory and publish it as a new version
//!
//! ## Accounts
//! - `login`, `logout`, `signup`
//!
//! # Global Options
//!
//! - `--pack-type` - The kind of pack managed (`.<type>rc` config files,
//!   `<type>.json` pack files); defaults to `pack`
//! - `--exec-path` - Run as if started in this directory
//! - `--target` - Config layer for writes: `global`, `user` or `project`
//! - `--verbose` / `--quiet` - Log at debug level / disable logging
//!
//! ```bash
//! bitpack config get prefix
//! bitpack --pack-type gulp --target user config set prefix /opt/gulp
//! bitpack --pack-type gulp install task clean@^1.0.0
//! bitpack --pack-type gulp publish task ./clean
//! ```

mod auth;
mod config;
mod pack;

use crate::BitPack;
use crate::context::ContextOptions;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Top-level command line.
#[derive(Parser)]
#[command(
    name = "bitpack",
    about = "bitpack - install and publish versioned packs",
    version,
    long_about = "bitpack resolves, installs and publishes versioned packs against the bitpack registry."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug output to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable all logging
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Kind of pack to manage
    #[arg(long, global = true, default_value = "pack", env = "BITPACK_PACK_TYPE")]
    pack_type: String,

    /// Directory to run in instead of the current directory
    #[arg(long, global = true)]
    exec_path: Option<PathBuf>,

    /// Config layer to write to: global, user or project
    #[arg(long, global = true)]
    target: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and write config properties
    Config(config::ConfigCommand),

    /// Install a pack version matching a query
    Install(pack::InstallCommand),

    /// Install a pack version and print where it lives
    Get(pack::GetCommand),

    /// Publish the pack in a directory
    Publish(pack::PublishCommand),

    /// Log in with email and password
    Login(auth::LoginCommand),

    /// Forget the stored credentials
    Logout,

    /// Create an account and log in
    Signup(auth::SignupCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        let bitpack = BitPack::new(self.pack_type.clone());
        let options = self.context_options();

        match self.command {
            Commands::Config(cmd) => cmd.execute(&bitpack, options).await,
            Commands::Install(cmd) => cmd.execute(&bitpack, options).await,
            Commands::Get(cmd) => cmd.execute(&bitpack, options).await,
            Commands::Publish(cmd) => cmd.execute(&bitpack, options).await,
            Commands::Login(cmd) => cmd.execute(&bitpack, options).await,
            Commands::Logout => auth::logout(&bitpack, options).await,
            Commands::Signup(cmd) => cmd.execute(&bitpack, options).await,
        }
    }

    /// Exec path and target from the global flags; everything else comes from
    /// the environment.
    fn context_options(&self) -> ContextOptions {
        ContextOptions {
            exec_path: self.exec_path.clone(),
            target: self.target.clone(),
            ..ContextOptions::default()
        }
    }

    /// `--quiet` disables logging, `--verbose` logs at debug, otherwise
    /// `RUST_LOG` or warn.
    fn init_logging(&self) {
        let filter = if self.quiet {
            EnvFilter::new("off")
        } else if self.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }
}
