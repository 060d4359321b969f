use crate::core::db::{DropBehavior, TransactionBehavior};
use crate::core::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub transaction: Option<TransactionConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Database file selection.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

/// Transaction defaults.
#[derive(Debug, Deserialize)]
pub struct TransactionConfig {
    pub behavior: Option<TransactionBehavior>,
    pub drop_behavior: Option<DropBehavior>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

impl Config {
    pub fn database_path(&self) -> Option<&str> {
        self.database.as_ref()?.path.as_deref()
    }

    pub fn transaction_behavior(&self) -> TransactionBehavior {
        self.transaction
            .as_ref()
            .and_then(|t| t.behavior)
            .unwrap_or_default()
    }

    pub fn drop_behavior(&self) -> DropBehavior {
        self.transaction
            .as_ref()
            .and_then(|t| t.drop_behavior)
            .unwrap_or_default()
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref()?.level.as_deref()
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = litecall::config::load_config("litecall.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
