//! CLI commands

pub mod config;
pub mod db;
pub mod serve;
pub mod tokens;

pub use config::ConfigCommand;
pub use db::DbCommand;
pub use serve::ServeCommand;
pub use tokens::TokensCommand;

use anyhow::Result;
use centrinote_oauth::config::CentrinoteConfig;

/// Service name used for the config search path
pub const SERVICE_NAME: &str = "centrinote-oauth";

/// Load configuration from `path`, or from the standard search path
pub fn load_config(path: Option<&str>) -> Result<CentrinoteConfig> {
    path.map_or_else(
        || CentrinoteConfig::load_for_service(SERVICE_NAME),
        CentrinoteConfig::load_from,
    )
}
