/// Logging bootstrap for binaries and tests built on litecall.
///
/// The library itself only emits `tracing` events; installing a subscriber
/// is left to the application.
use crate::core::{LitecallError, Result};
use std::str::FromStr;
use tracing::Level;

/// Parses a level name such as `info` or `DEBUG`.
pub fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| LitecallError::Config(format!("unknown log level '{level}'")))
}

/// Installs a formatting subscriber writing to stderr at `level`.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one stays in place.
pub fn init(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
