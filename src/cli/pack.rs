use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::BitPack;
use crate::context::ContextOptions;

/// Which pack a query runs against.
#[derive(Args)]
pub struct PackQueryArgs {
    /// Pack class, e.g. `task`
    class: String,

    /// `name` for the latest version or `name@range`
    query: String,

    /// Pack scope
    #[arg(long, default_value = "public")]
    scope: String,
}

/// `bitpack install <class> <query>`
#[derive(Args)]
pub struct InstallCommand {
    #[command(flatten)]
    pack: PackQueryArgs,
}

impl InstallCommand {
    pub async fn execute(self, bitpack: &BitPack, options: ContextOptions) -> Result<()> {
        let PackQueryArgs {
            class,
            query,
            scope,
        } = self.pack;
        let pack = bitpack.install(bitpack.pack_type(), &class, &scope, &query, options).await?;
        println!("✅ Installed {}@{}", pack.name().green(), pack.version());
        println!("   {}", pack.pack_path().display());
        Ok(())
    }
}

/// `bitpack get <class> <query>`
#[derive(Args)]
pub struct GetCommand {
    #[command(flatten)]
    pack: PackQueryArgs,
}

impl GetCommand {
    pub async fn execute(self, bitpack: &BitPack, options: ContextOptions) -> Result<()> {
        let PackQueryArgs {
            class,
            query,
            scope,
        } = self.pack;
        let pack = bitpack.get(bitpack.pack_type(), &class, &scope, &query, options).await?;
        match pack.main_path() {
            Some(main) => println!("{}", main.display()),
            None => println!("{}", pack.pack_path().display()),
        }
        Ok(())
    }
}

/// `bitpack publish <class> [path]`
#[derive(Args)]
pub struct PublishCommand {
    /// Pack class, e.g. `task`
    class: String,

    /// Directory containing `<type>.json`; defaults to the exec path
    path: Option<PathBuf>,

    /// Pack scope
    #[arg(long, default_value = "public")]
    scope: String,
}

impl PublishCommand {
    pub async fn execute(self, bitpack: &BitPack, options: ContextOptions) -> Result<()> {
        let key = bitpack
            .publish(bitpack.pack_type(), &self.class, &self.scope, self.path.as_deref(), options)
            .await?;
        println!("✅ Published {}@{}", key.pack_name.green(), key.pack_version_number);
        Ok(())
    }
}
