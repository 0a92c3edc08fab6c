use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::BitPack;
use crate::auth::CurrentUser;
use crate::context::ContextOptions;

/// `bitpack login <email>`
#[derive(Args)]
pub struct LoginCommand {
    email: String,

    #[arg(long, env = "BITPACK_PASSWORD", hide_env_values = true)]
    password: String,
}

impl LoginCommand {
    pub async fn execute(self, bitpack: &BitPack, options: ContextOptions) -> Result<()> {
        let current = bitpack.login(&self.email, &self.password, options).await?;
        println!("✅ Logged in as {}", display_name(&current).green());
        Ok(())
    }
}

/// `bitpack signup <username> <email>`
#[derive(Args)]
pub struct SignupCommand {
    username: String,

    email: String,

    #[arg(long, env = "BITPACK_PASSWORD", hide_env_values = true)]
    password: String,
}

impl SignupCommand {
    pub async fn execute(self, bitpack: &BitPack, options: ContextOptions) -> Result<()> {
        let current = bitpack.sign_up(&self.username, &self.email, &self.password, options).await?;
        println!("✅ Signed up as {}", display_name(&current).green());
        Ok(())
    }
}

pub async fn logout(bitpack: &BitPack, options: ContextOptions) -> Result<()> {
    bitpack.logout(options).await?;
    println!("✅ Logged out");
    Ok(())
}

fn display_name(current: &CurrentUser) -> &str {
    current.username().unwrap_or(current.user_id())
}
