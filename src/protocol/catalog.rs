//! Message catalog and confirmation policy
//!
//! The catalog answers two questions about a subtype: is this (type, code)
//! pair defined, and must the receiver acknowledge it.

use serde::{Deserialize, Serialize};

use super::message::{
    DataSubtype, MessageType, StringSubtype, Subtype, WaypointSubtype, WordSubtype,
};

/// Every defined subtype, in wire order
pub const ALL_SUBTYPES: [Subtype; 9] = [
    Subtype::Waypoint(WaypointSubtype::Add),
    Subtype::Waypoint(WaypointSubtype::Alter),
    Subtype::Data(DataSubtype::Telemetry),
    Subtype::Data(DataSubtype::Setting),
    Subtype::Word(WordSubtype::Confirmation),
    Subtype::Word(WordSubtype::Sync),
    Subtype::Word(WordSubtype::Command),
    Subtype::String(StringSubtype::Error),
    Subtype::String(StringSubtype::State),
];

/// Returns true if `code` names a subtype of `message_type`
pub fn is_defined(message_type: MessageType, code: u8) -> bool {
    Subtype::from_parts(message_type, code).is_ok()
}

/// Subtypes defined for a message type
pub fn subtypes_of(message_type: MessageType) -> impl Iterator<Item = Subtype> {
    ALL_SUBTYPES
        .into_iter()
        .filter(move |s| s.message_type() == message_type)
}

/// Which message classes the receiver must acknowledge
///
/// Confirmations themselves are never acknowledged, whatever the policy
/// says, otherwise two peers would confirm each other forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    pub waypoint_add: bool,
    pub waypoint_alter: bool,
    pub telemetry: bool,
    pub setting: bool,
    pub sync: bool,
    pub command: bool,
    pub error: bool,
    pub state: bool,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        // State-mutating classes are confirmed; informational ones and the
        // handshake (which answers itself) are not.
        ConfirmationPolicy {
            waypoint_add: true,
            waypoint_alter: true,
            telemetry: false,
            setting: true,
            sync: false,
            command: true,
            error: false,
            state: false,
        }
    }
}

impl ConfirmationPolicy {
    /// Policy that never asks for confirmation
    pub fn none() -> Self {
        ConfirmationPolicy {
            waypoint_add: false,
            waypoint_alter: false,
            telemetry: false,
            setting: false,
            sync: false,
            command: false,
            error: false,
            state: false,
        }
    }

    /// Returns true if a message of this subtype must be acknowledged
    pub fn needs_confirmation(&self, subtype: Subtype) -> bool {
        match subtype {
            Subtype::Waypoint(WaypointSubtype::Add) => self.waypoint_add,
            Subtype::Waypoint(WaypointSubtype::Alter) => self.waypoint_alter,
            Subtype::Data(DataSubtype::Telemetry) => self.telemetry,
            Subtype::Data(DataSubtype::Setting) => self.setting,
            Subtype::Word(WordSubtype::Confirmation) => false,
            Subtype::Word(WordSubtype::Sync) => self.sync,
            Subtype::Word(WordSubtype::Command) => self.command,
            Subtype::String(StringSubtype::Error) => self.error,
            Subtype::String(StringSubtype::State) => self.state,
        }
    }
}
