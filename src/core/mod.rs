//! Core types and traits for the drone link
//! 
//! This module contains the fundamental building blocks used throughout the library.

pub mod config;
pub mod error;
pub mod types;

pub use self::config::{
    FramingConfig,
    LinkConfig,
    ReliabilityConfig,
    SerialConfig,
    SyncConfig,
};
pub use self::error::{Error, Result};
pub use self::types::{
    Role,
    Setting,
    Tick,
    Waypoint,
};

/// Maximum number of waypoints a route can hold
pub const MAX_WAYPOINTS: usize = 64;

/// Default serial baud rate of the radio link
pub const DEFAULT_BAUD_RATE: u32 = 9600;
