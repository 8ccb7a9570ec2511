//! Run the HTTP service

use anyhow::{bail, Result};
use console::style;

use super::load_config;

/// Start the service in the foreground
pub struct ServeCommand;

impl ServeCommand {
    /// Load and validate configuration, then serve until Ctrl-C
    pub async fn execute(config_path: Option<&str>) -> Result<()> {
        centrinote_oauth::observability::init()?;
        let config = load_config(config_path)?;

        if let Err(errors) = config.validate() {
            for error in &errors {
                eprintln!("{} {error}", style("config:").red().bold());
            }
            bail!("refusing to start with {} configuration error(s)", errors.len());
        }

        centrinote_oauth::server::serve(config).await
    }
}
