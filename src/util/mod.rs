//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use std::str::FromStr;
use std::time::Duration;

use tracing::Level;

use crate::core::{Error, Result, Tick};

/// Converts a duration to link ticks (milliseconds)
pub fn duration_to_ticks(duration: Duration) -> Tick {
    duration.as_millis().min(Tick::MAX as u128) as Tick
}

/// Converts link ticks (milliseconds) to a duration
pub fn ticks_to_duration(ticks: Tick) -> Duration {
    Duration::from_millis(ticks)
}

/// Installs a formatted log subscriber at the given level
///
/// `level` is one of `trace`, `debug`, `info`, `warn` or `error`. Fails if a
/// global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<()> {
    let level = Level::from_str(level)
        .map_err(|e| Error::config(format!("Invalid log level {:?}: {}", level, e)))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to init logging: {}", e)))
}
