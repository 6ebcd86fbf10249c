//! Application state the link keeps in sync
//!
//! The link never owns the route or the settings table directly; it talks to
//! them through these traits so firmware can back them with whatever storage
//! it has.

mod settings;
mod waypoints;

pub use self::settings::SettingsTable;
pub use self::waypoints::WaypointList;

use crate::core::{Result, Setting, Waypoint};

/// Ordered route of waypoints
pub trait WaypointStore {
    /// Every waypoint, in route order
    fn list(&self) -> &[Waypoint];

    /// Stores a waypoint at `waypoint.index`
    ///
    /// Replaces the existing waypoint at that index, or appends when the
    /// index is one past the end. Re-adding the same waypoint is a no-op.
    fn add(&mut self, waypoint: Waypoint) -> Result<()>;

    /// Overwrites an existing waypoint
    fn alter(&mut self, waypoint: Waypoint) -> Result<()>;

    /// Removes the waypoint at `index`, shifting later ones down
    fn delete(&mut self, index: u8) -> Result<()>;

    /// Removes every waypoint
    fn clear(&mut self);
}

/// Keyed table of tunable settings
pub trait SettingsStore {
    /// Every setting, ordered by key
    fn list(&self) -> Vec<Setting>;

    /// Inserts or replaces a setting
    fn update(&mut self, setting: Setting) -> Result<()>;
}
