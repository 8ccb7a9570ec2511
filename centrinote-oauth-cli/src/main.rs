//! centrinote-oauth service and operator CLI

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ConfigCommand, DbCommand, ServeCommand, TokensCommand};

#[derive(Parser)]
#[command(name = "centrinote-oauth")]
#[command(version)]
#[command(about = "Provider account linking service for Centrinote", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long, global = true, env = "CENTRINOTE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Inspect and manage stored provider tokens
    Tokens {
        #[command(subcommand)]
        command: TokensCommand,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Load and validate configuration without starting the service
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve => {
            ServeCommand::execute(config_path).await?;
        }
        Commands::Db { command } => {
            let db_cmd = match command {
                DbCommands::Migrate => DbCommand::Migrate,
            };
            db_cmd.execute(config_path).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Check => ConfigCommand::Check.execute(config_path)?,
        },
        Commands::Tokens { command } => {
            command.execute(config_path).await?;
        }
    }

    Ok(())
}
