//! Stored token commands

use acton_reactive::prelude::*;
use anyhow::{Context, Result};
use centrinote_oauth::state::AppState;
use clap::Subcommand;
use console::style;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use std::time::Duration;

use super::load_config;

/// Token management commands
#[derive(Debug, Subcommand)]
pub enum TokensCommand {
    /// Show connection metadata for a user
    Status {
        /// Centrinote user id
        user_id: String,
    },

    /// Force a refresh of a user's provider tokens
    Refresh {
        /// Centrinote user id
        user_id: String,
    },

    /// Remove a user's stored provider tokens
    Disconnect {
        /// Centrinote user id
        user_id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl TokensCommand {
    /// Execute the tokens command
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, the token store is
    /// unreachable, or the provider rejects a refresh
    pub async fn execute(&self, config_path: Option<&str>) -> Result<()> {
        if let Self::Disconnect { user_id, yes: false } = self {
            let confirmed = Confirm::new()
                .with_prompt(format!("Disconnect {user_id} and delete their provider tokens?"))
                .default(false)
                .interact()?;
            if !confirmed {
                println!("Cancelled");
                return Ok(());
            }
        }

        let config = load_config(config_path)?;
        let mut runtime = ActonApp::launch_async().await;
        let state = AppState::from_config(&mut runtime, config)
            .await
            .context("Failed to initialize token service")?;

        let result = self.run(&state).await;
        runtime.shutdown_all().await?;
        result
    }

    async fn run(&self, state: &AppState) -> Result<()> {
        let tokens = state.tokens();
        match self {
            Self::Status { user_id } => {
                let status = tokens.status(user_id).await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            Self::Refresh { user_id } => {
                let spinner = ProgressBar::new_spinner();
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner.set_message(format!("Refreshing tokens for {user_id}..."));
                let refreshed = tokens.refresh(user_id).await;
                spinner.finish_and_clear();

                let record = refreshed?;
                println!(
                    "{} Refreshed; expires at {}",
                    style("✓").green().bold(),
                    style(record.expires_at.to_rfc3339()).cyan()
                );
            }
            Self::Disconnect { user_id, .. } => {
                tokens.disconnect(user_id).await?;
                println!("{} Disconnected {user_id}", style("✓").green().bold());
            }
        }
        Ok(())
    }
}
