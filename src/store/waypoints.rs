use tracing::debug;

use crate::core::{Error, Result, Waypoint, MAX_WAYPOINTS};
use super::WaypointStore;

/// In-memory route bounded by [`MAX_WAYPOINTS`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaypointList {
    waypoints: Vec<Waypoint>,
}

impl WaypointList {
    /// Creates an empty route
    pub fn new() -> Self {
        WaypointList {
            waypoints: Vec::with_capacity(MAX_WAYPOINTS),
        }
    }

    /// Number of waypoints in the route
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Returns true if the route is empty
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint at `index`, if present
    pub fn get(&self, index: u8) -> Option<&Waypoint> {
        self.waypoints.get(index as usize)
    }

    /// Appends a waypoint, assigning it the next index
    pub fn push(&mut self, latitude: f32, longitude: f32, altitude: u16) -> Result<Waypoint> {
        let waypoint = Waypoint::new(self.waypoints.len() as u8, latitude, longitude, altitude);
        self.add(waypoint)?;
        Ok(waypoint)
    }
}

impl WaypointStore for WaypointList {
    fn list(&self) -> &[Waypoint] {
        &self.waypoints
    }

    fn add(&mut self, waypoint: Waypoint) -> Result<()> {
        let index = waypoint.index as usize;
        if index < self.waypoints.len() {
            debug!(index, "Replacing waypoint");
            self.waypoints[index] = waypoint;
            return Ok(());
        }
        if index > self.waypoints.len() {
            return Err(Error::store(format!(
                "Waypoint index {} leaves a gap after {} waypoints",
                index,
                self.waypoints.len()
            )));
        }
        if self.waypoints.len() >= MAX_WAYPOINTS {
            return Err(Error::store(format!("Route is full ({} waypoints)", MAX_WAYPOINTS)));
        }
        self.waypoints.push(waypoint);
        Ok(())
    }

    fn alter(&mut self, waypoint: Waypoint) -> Result<()> {
        let slot = self
            .waypoints
            .get_mut(waypoint.index as usize)
            .ok_or_else(|| Error::store(format!("No waypoint at index {}", waypoint.index)))?;
        *slot = waypoint;
        Ok(())
    }

    fn delete(&mut self, index: u8) -> Result<()> {
        if index as usize >= self.waypoints.len() {
            return Err(Error::store(format!("No waypoint at index {}", index)));
        }
        self.waypoints.remove(index as usize);
        for (i, wp) in self.waypoints.iter_mut().enumerate().skip(index as usize) {
            wp.index = i as u8;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.waypoints.clear();
    }
}
