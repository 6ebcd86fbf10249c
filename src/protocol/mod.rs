//! Protocol implementation module
//!
//! This module defines the drone link wire format: checksums, labels,
//! framing, the message catalog, payload encodings, confirmations and the
//! connection handshake.

pub mod catalog;
pub mod checksum;
pub mod codec;
pub mod label;
pub mod message;
pub mod payload;
pub mod reliability;
pub mod state;

pub use self::catalog::ConfirmationPolicy;
pub use self::codec::{CodecStats, Frame, FrameCodec};
pub use self::label::{build_label, Label};
pub use self::message::{
    CommandType, DataSubtype, Message, MessageType, StringSubtype, Subtype, SyncKind,
    TelemetryField, WaypointSubtype, WordSubtype,
};
pub use self::payload::{Command, Telemetry};
pub use self::reliability::{DeliveryFailure, ReliabilityManager};
pub use self::state::{ConnectionState, ConnectionUpload, SyncCoordinator, SyncOutcome};

// Constants
/// Maximum payload size in bytes, bounded by the 4-bit label length field
pub const MAX_PAYLOAD_SIZE: usize = 15;

/// Default frame header
pub const DEFAULT_HEADER: [u8; 2] = [0x13, 0x37];

/// Default frame footer
pub const DEFAULT_FOOTER: [u8; 1] = [0x9A];
