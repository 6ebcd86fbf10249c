//! Drone link: framed, checksummed messaging between a flight controller and
//! its ground station
//!
//! The protocol runs over any ordered byte stream (typically a serial radio
//! modem). Each frame carries a one-byte label, up to fifteen payload bytes
//! and a Fletcher-16 checksum between configurable delimiters. State-changing
//! messages are confirmed by echoing their checksum, and a two-way sync
//! handshake triggers the upload of the route (dashboard) or the settings
//! table (drone).
//!
//! ```no_run
//! use drone_link::core::{LinkConfig, Role};
//! use drone_link::network::{Link, SerialTransport};
//! use drone_link::store::{SettingsTable, WaypointList};
//!
//! fn main() -> drone_link::Result<()> {
//!     let config = LinkConfig::new(Role::Dashboard);
//!     let mut transport = SerialTransport::open(&config.serial)?;
//!     let mut link = Link::new(&config, WaypointList::new(), SettingsTable::new())?;
//!     let mut now = 0;
//!     loop {
//!         for event in link.service(&mut transport, now)? {
//!             println!("{:?}", event);
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(config.poll_interval_ms));
//!         now += config.poll_interval_ms;
//!     }
//! }
//! ```

pub mod core;
pub mod network;
pub mod protocol;
pub mod store;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Error, LinkConfig, Result, Role};
pub use crate::network::{Link, LinkEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
