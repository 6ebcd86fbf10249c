use serde::{Serialize, Deserialize};

/// Monotonic time value supplied by the caller on every poll.
///
/// The link never reads a clock itself. Milliseconds are the expected unit,
/// but any monotonically increasing counter works as long as the configured
/// timeouts use the same unit.
pub type Tick = u64;

/// Which end of the link this node is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ground station; uploads its route on connection
    Dashboard,
    /// Flight controller; uploads its settings table on connection
    Drone,
}

impl Role {
    /// Returns the opposite role
    pub fn peer(&self) -> Self {
        match self {
            Role::Dashboard => Role::Drone,
            Role::Drone => Role::Dashboard,
        }
    }
}

/// A single route waypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Position of this waypoint in the route
    pub index: u8,
    /// Latitude in degrees
    pub latitude: f32,
    /// Longitude in degrees
    pub longitude: f32,
    /// Altitude in meters above the launch point
    pub altitude: u16,
}

impl Waypoint {
    /// Creates a new waypoint
    pub fn new(index: u8, latitude: f32, longitude: f32, altitude: u16) -> Self {
        Waypoint {
            index,
            latitude,
            longitude,
            altitude,
        }
    }
}

/// A single tunable setting record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Record index in the settings table
    pub key: u8,
    /// Stored value
    pub value: f32,
}

impl Setting {
    /// Creates a new setting record
    pub fn new(key: u8, value: f32) -> Self {
        Setting { key, value }
    }
}
