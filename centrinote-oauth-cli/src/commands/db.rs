//! Database management commands

use anyhow::{bail, Context, Result};
use centrinote_oauth::oauth2::PgTokenStore;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

use super::load_config;

/// Database commands
#[derive(Debug)]
pub enum DbCommand {
    /// Apply pending migrations to the token database
    Migrate,
}

impl DbCommand {
    /// Execute the database command
    ///
    /// # Errors
    ///
    /// Returns an error if no database is configured, the database is
    /// unreachable, or a migration fails
    pub async fn execute(&self, config_path: Option<&str>) -> Result<()> {
        match self {
            Self::Migrate => Self::migrate(config_path).await,
        }
    }

    async fn migrate(config_path: Option<&str>) -> Result<()> {
        let config = load_config(config_path)?;
        if config.database.url.trim().is_empty() {
            bail!("database.url is not set; nothing to migrate for the in-memory store");
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;

        spinner.set_message("Applying migrations...");
        PgTokenStore::new(pool)
            .migrate()
            .await
            .context("Failed to apply migrations")?;

        spinner.finish_and_clear();
        println!("{} Migrations applied", style("✓").green().bold());
        Ok(())
    }
}
