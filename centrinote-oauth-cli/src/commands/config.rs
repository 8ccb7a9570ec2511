//! Configuration commands

use anyhow::{bail, Result};
use console::style;

use super::load_config;

/// Configuration commands
#[derive(Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration with secrets redacted and validate it
    Check,
}

impl ConfigCommand {
    /// Execute the configuration command
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or is invalid
    pub fn execute(&self, config_path: Option<&str>) -> Result<()> {
        match self {
            Self::Check => Self::check(config_path),
        }
    }

    fn check(config_path: Option<&str>) -> Result<()> {
        let config = load_config(config_path)?;
        println!("{}", style("Effective configuration").bold());
        println!("{config:#?}");
        println!();

        match config.validate() {
            Ok(()) => {
                println!("{} Configuration is valid", style("✓").green().bold());
                Ok(())
            }
            Err(errors) => {
                for error in &errors {
                    println!("{} {error}", style("✗").red().bold());
                }
                bail!("{} configuration error(s)", errors.len())
            }
        }
    }
}
