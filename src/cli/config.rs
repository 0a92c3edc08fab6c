use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::BitPack;
use crate::config::ConfigValue;
use crate::context::ContextOptions;

/// `bitpack config <get|set|delete>`
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Print the effective value of a property
    Get {
        key: String,
    },

    /// Set a property on the target layer.
    ///
    /// Values that parse as JSON are stored as JSON, anything else as a string.
    Set {
        key: String,

        value: String,
    },

    /// Remove a property from the target layer
    Delete {
        key: String,
    },
}

impl ConfigCommand {
    pub async fn execute(self, bitpack: &BitPack, options: ContextOptions) -> Result<()> {
        match self.command {
            ConfigSubcommands::Get {
                key,
            } => {
                match bitpack.config_get(&key, options).await? {
                    Some(value) => println!("{value}"),
                    None => eprintln!("{} '{}' is not set", "⚠️ ".yellow(), key),
                }
                Ok(())
            }
            ConfigSubcommands::Set {
                key,
                value,
            } => {
                let value = ConfigValue::parse_cli(&value);
                bitpack.config_set(&key, value.clone(), options).await?;
                println!("✅ Set {} = {}", key.green(), value);
                Ok(())
            }
            ConfigSubcommands::Delete {
                key,
            } => {
                let result = bitpack.config_delete(&key, options).await?;
                if result.deleted {
                    println!("✅ Deleted {}", key.green());
                } else if !result.exists {
                    println!("No config file to delete '{key}' from");
                } else {
                    println!("'{key}' was not set");
                }
                Ok(())
            }
        }
    }
}
