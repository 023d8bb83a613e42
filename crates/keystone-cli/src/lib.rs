//! Keystone CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Keystone - cluster trust and lifecycle bootstrap
#[derive(Parser, Debug)]
#[command(name = "keystone")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate TLS assets and provision every infrastructure step
    Create(commands::create::CreateArgs),
    /// Drain workers and destroy every provisioned step in reverse
    Destroy(commands::destroy::DestroyArgs),
    /// Generate only the TLS hierarchy
    Tls(commands::tls::TlsArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Create(args) => commands::create::run(args).await,
            Commands::Destroy(args) => commands::destroy::run(args).await,
            Commands::Tls(args) => commands::tls::run(args).await,
        }
    }
}
