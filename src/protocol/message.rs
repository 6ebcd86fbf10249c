use serde::{Serialize, Deserialize};

use crate::core::{Error, Result};
use super::checksum::fletcher16_resume;
use super::label::{build_label, Label};
use super::MAX_PAYLOAD_SIZE;

/// Top-level message category, carried in the low two label bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Waypoint = 0,
    Data = 1,
    Word = 2,
    String = 3,
}

impl MessageType {
    /// Decodes the two type bits; every value is defined
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => MessageType::Waypoint,
            1 => MessageType::Data,
            2 => MessageType::Word,
            _ => MessageType::String,
        }
    }

    /// Wire value
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// Subtypes of [`MessageType::Waypoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaypointSubtype {
    Add = 0,
    Alter = 1,
}

/// Subtypes of [`MessageType::Data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSubtype {
    Telemetry = 0,
    Setting = 1,
}

/// Subtypes of [`MessageType::Word`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordSubtype {
    Confirmation = 0,
    Sync = 1,
    Command = 2,
}

/// Subtypes of [`MessageType::String`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringSubtype {
    Error = 0,
    State = 1,
}

/// A subtype together with the message type it belongs to
///
/// The variant determines the type, so a label can never pair a subtype
/// with the wrong category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subtype {
    Waypoint(WaypointSubtype),
    Data(DataSubtype),
    Word(WordSubtype),
    String(StringSubtype),
}

impl Subtype {
    /// Message type implied by the variant
    pub fn message_type(&self) -> MessageType {
        match self {
            Subtype::Waypoint(_) => MessageType::Waypoint,
            Subtype::Data(_) => MessageType::Data,
            Subtype::Word(_) => MessageType::Word,
            Subtype::String(_) => MessageType::String,
        }
    }

    /// Two-bit wire code
    pub fn code(&self) -> u8 {
        match self {
            Subtype::Waypoint(s) => *s as u8,
            Subtype::Data(s) => *s as u8,
            Subtype::Word(s) => *s as u8,
            Subtype::String(s) => *s as u8,
        }
    }

    /// Looks up the subtype for a (type, code) pair
    pub fn from_parts(message_type: MessageType, code: u8) -> Result<Self> {
        let subtype = match (message_type, code) {
            (MessageType::Waypoint, 0) => Subtype::Waypoint(WaypointSubtype::Add),
            (MessageType::Waypoint, 1) => Subtype::Waypoint(WaypointSubtype::Alter),
            (MessageType::Data, 0) => Subtype::Data(DataSubtype::Telemetry),
            (MessageType::Data, 1) => Subtype::Data(DataSubtype::Setting),
            (MessageType::Word, 0) => Subtype::Word(WordSubtype::Confirmation),
            (MessageType::Word, 1) => Subtype::Word(WordSubtype::Sync),
            (MessageType::Word, 2) => Subtype::Word(WordSubtype::Command),
            (MessageType::String, 0) => Subtype::String(StringSubtype::Error),
            (MessageType::String, 1) => Subtype::String(StringSubtype::State),
            _ => return Err(Error::UndefinedSubtype { message_type, code }),
        };
        Ok(subtype)
    }
}

impl From<WaypointSubtype> for Subtype {
    fn from(s: WaypointSubtype) -> Self {
        Subtype::Waypoint(s)
    }
}

impl From<DataSubtype> for Subtype {
    fn from(s: DataSubtype) -> Self {
        Subtype::Data(s)
    }
}

impl From<WordSubtype> for Subtype {
    fn from(s: WordSubtype) -> Self {
        Subtype::Word(s)
    }
}

impl From<StringSubtype> for Subtype {
    fn from(s: StringSubtype) -> Self {
        Subtype::String(s)
    }
}

/// Telemetry fields carried in DATA/TELEMETRY payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryField {
    Latitude = 0,
    Longitude = 1,
    Heading = 2,
    Pitch = 3,
    Roll = 4,
    GroundSpeed = 5,
    Voltage = 6,
}

impl TelemetryField {
    /// Decodes a field code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TelemetryField::Latitude),
            1 => Some(TelemetryField::Longitude),
            2 => Some(TelemetryField::Heading),
            3 => Some(TelemetryField::Pitch),
            4 => Some(TelemetryField::Roll),
            5 => Some(TelemetryField::GroundSpeed),
            6 => Some(TelemetryField::Voltage),
            _ => None,
        }
    }
}

/// Command codes carried in WORD/COMMAND payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    Estop = 0,
    Target = 1,
    Looping = 2,
    ClearWaypoints = 3,
    DeleteWaypoint = 4,
}

impl CommandType {
    /// Decodes a command code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CommandType::Estop),
            1 => Some(CommandType::Target),
            2 => Some(CommandType::Looping),
            3 => Some(CommandType::ClearWaypoints),
            4 => Some(CommandType::DeleteWaypoint),
            _ => None,
        }
    }
}

/// Direction of a WORD/SYNC message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncKind {
    Request = 0x00,
    Respond = 0x01,
}

impl SyncKind {
    /// Decodes a sync marker byte
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(SyncKind::Request),
            0x01 => Some(SyncKind::Respond),
            _ => None,
        }
    }
}

/// A protocol message: a subtype plus its raw payload
///
/// Payload bytes are opaque at this layer; see [`super::payload`] for the
/// application encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    subtype: Subtype,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a message, rejecting payloads the label cannot describe
    pub fn new(subtype: impl Into<Subtype>, payload: impl Into<Vec<u8>>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Message {
            subtype: subtype.into(),
            payload,
        })
    }

    /// Creates a message from a payload whose size is known to fit
    pub(crate) fn from_array<const N: usize>(subtype: impl Into<Subtype>, payload: [u8; N]) -> Self {
        debug_assert!(N <= MAX_PAYLOAD_SIZE);
        Message {
            subtype: subtype.into(),
            payload: payload.to_vec(),
        }
    }

    /// Rebuilds a message from a received label and payload
    pub fn from_label(label: Label, payload: Vec<u8>) -> Result<Self> {
        if label.length as usize != payload.len() {
            return Err(Error::protocol(format!(
                "Label declares {} payload bytes, frame carries {}",
                label.length,
                payload.len()
            )));
        }
        let subtype = label.resolve()?;
        Message::new(subtype, payload)
    }

    /// Message subtype
    pub fn subtype(&self) -> Subtype {
        self.subtype
    }

    /// Message type implied by the subtype
    pub fn message_type(&self) -> MessageType {
        self.subtype.message_type()
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message, returning the payload
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Label with the length field filled in
    pub fn label(&self) -> Label {
        // Length was bounded by the constructor
        Label {
            length: self.payload.len() as u8,
            ..build_label(self.subtype)
        }
    }

    /// Fletcher-16 over label and payload
    pub fn checksum(&self) -> u16 {
        let head = fletcher16_resume(&[self.label().pack()], 0);
        fletcher16_resume(&self.payload, head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::fletcher16;

    #[test]
    fn test_message_creation() {
        let msg = Message::new(WaypointSubtype::Add, vec![1, 2, 3]).unwrap();
        assert_eq!(msg.message_type(), MessageType::Waypoint);
        assert_eq!(msg.label().pack(), 0x30);
        assert_eq!(msg.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = Message::new(StringSubtype::Error, vec![0u8; 16]);
        assert!(matches!(result, Err(Error::PayloadTooLarge { len: 16, .. })));
        assert!(Message::new(StringSubtype::Error, vec![0u8; 15]).is_ok());
    }

    #[test]
    fn test_checksum_covers_label_and_payload() {
        let msg = Message::new(DataSubtype::Setting, vec![4, 0, 0, 128, 63]).unwrap();
        let mut body = vec![msg.label().pack()];
        body.extend_from_slice(msg.payload());
        assert_eq!(msg.checksum(), fletcher16(&body));
    }

    #[test]
    fn test_subtype_catalog_is_complete() {
        let defined = [
            (MessageType::Waypoint, 2),
            (MessageType::Data, 2),
            (MessageType::Word, 3),
            (MessageType::String, 2),
        ];
        for (message_type, count) in defined {
            for code in 0..4u8 {
                let result = Subtype::from_parts(message_type, code);
                if code < count {
                    let subtype = result.unwrap();
                    assert_eq!(subtype.message_type(), message_type);
                    assert_eq!(subtype.code(), code);
                } else {
                    assert!(result.is_err());
                }
            }
        }
    }

    #[test]
    fn test_from_label_checks_length() {
        let label = build_label(WordSubtype::Sync).with_length(1).unwrap();
        assert!(Message::from_label(label, vec![0x00]).is_ok());
        assert!(matches!(
            Message::from_label(label, vec![0x00, 0x01]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_enumeration_codes() {
        assert_eq!(TelemetryField::from_code(6), Some(TelemetryField::Voltage));
        assert_eq!(TelemetryField::from_code(7), None);
        assert_eq!(CommandType::from_code(4), Some(CommandType::DeleteWaypoint));
        assert_eq!(SyncKind::from_code(0x01), Some(SyncKind::Respond));
        assert_eq!(SyncKind::from_code(0x02), None);
    }
}
