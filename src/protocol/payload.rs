//! Application payload encodings
//!
//! The framing layer treats payloads as opaque bytes. These are the encodings
//! both ends agree on for the built-in message classes. Multi-byte numbers
//! are little-endian, except the confirmation checksum, which mirrors the
//! big-endian frame trailer byte for byte.

use serde::{Serialize, Deserialize};

use crate::core::{Error, Result, Setting, Waypoint};
use super::message::{
    CommandType, DataSubtype, Message, StringSubtype, Subtype, SyncKind, TelemetryField,
    WaypointSubtype, WordSubtype,
};
use super::MAX_PAYLOAD_SIZE;

const WAYPOINT_SIZE: usize = 11;
const RECORD_SIZE: usize = 5;

/// A single telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub field: TelemetryField,
    pub value: f32,
}

/// Operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Cut the motors immediately
    Estop,
    /// Fly towards the waypoint at this index
    Target(u8),
    /// Restart the route after the last waypoint
    Looping(bool),
    /// Drop the whole route
    ClearWaypoints,
    /// Remove the waypoint at this index
    DeleteWaypoint(u8),
}

impl Command {
    /// Command code
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Estop => CommandType::Estop,
            Command::Target(_) => CommandType::Target,
            Command::Looping(_) => CommandType::Looping,
            Command::ClearWaypoints => CommandType::ClearWaypoints,
            Command::DeleteWaypoint(_) => CommandType::DeleteWaypoint,
        }
    }
}

/// Builds a WAYPOINT message
pub fn waypoint_message(subtype: WaypointSubtype, waypoint: &Waypoint) -> Result<Message> {
    let mut payload = Vec::with_capacity(WAYPOINT_SIZE);
    payload.push(waypoint.index);
    payload.extend_from_slice(&waypoint.latitude.to_le_bytes());
    payload.extend_from_slice(&waypoint.longitude.to_le_bytes());
    payload.extend_from_slice(&waypoint.altitude.to_le_bytes());
    Message::new(subtype, payload)
}

/// Decodes a WAYPOINT payload
pub fn decode_waypoint(payload: &[u8]) -> Result<Waypoint> {
    expect_len(payload, WAYPOINT_SIZE, "waypoint")?;
    Ok(Waypoint {
        index: payload[0],
        latitude: f32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]),
        longitude: f32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]),
        altitude: u16::from_le_bytes([payload[9], payload[10]]),
    })
}

/// Builds a DATA/SETTING message
pub fn setting_message(setting: &Setting) -> Result<Message> {
    Message::new(DataSubtype::Setting, record(setting.key, setting.value))
}

/// Decodes a DATA/SETTING payload
pub fn decode_setting(payload: &[u8]) -> Result<Setting> {
    let (key, value) = decode_record(payload, "setting")?;
    Ok(Setting { key, value })
}

/// Builds a DATA/TELEMETRY message
pub fn telemetry_message(telemetry: &Telemetry) -> Result<Message> {
    Message::new(
        DataSubtype::Telemetry,
        record(telemetry.field as u8, telemetry.value),
    )
}

/// Decodes a DATA/TELEMETRY payload
pub fn decode_telemetry(payload: &[u8]) -> Result<Telemetry> {
    let (code, value) = decode_record(payload, "telemetry")?;
    let field = TelemetryField::from_code(code)
        .ok_or_else(|| Error::invalid_payload(format!("Unknown telemetry field {}", code)))?;
    Ok(Telemetry { field, value })
}

/// Builds a WORD/COMMAND message
pub fn command_message(command: &Command) -> Result<Message> {
    let code = command.command_type() as u8;
    let payload = match *command {
        Command::Estop | Command::ClearWaypoints => vec![code],
        Command::Target(index) | Command::DeleteWaypoint(index) => vec![code, index],
        Command::Looping(enabled) => vec![code, enabled as u8],
    };
    Message::new(WordSubtype::Command, payload)
}

/// Decodes a WORD/COMMAND payload
pub fn decode_command(payload: &[u8]) -> Result<Command> {
    let code = *payload
        .first()
        .ok_or_else(|| Error::invalid_payload("Empty command payload"))?;
    let command_type = CommandType::from_code(code)
        .ok_or_else(|| Error::invalid_payload(format!("Unknown command {}", code)))?;

    let command = match command_type {
        CommandType::Estop => {
            expect_len(payload, 1, "estop command")?;
            Command::Estop
        }
        CommandType::ClearWaypoints => {
            expect_len(payload, 1, "clear command")?;
            Command::ClearWaypoints
        }
        CommandType::Target => {
            expect_len(payload, 2, "target command")?;
            Command::Target(payload[1])
        }
        CommandType::DeleteWaypoint => {
            expect_len(payload, 2, "delete command")?;
            Command::DeleteWaypoint(payload[1])
        }
        CommandType::Looping => {
            expect_len(payload, 2, "looping command")?;
            Command::Looping(payload[1] != 0)
        }
    };
    Ok(command)
}

/// Builds a WORD/SYNC message
pub fn sync_message(kind: SyncKind) -> Message {
    Message::from_array(WordSubtype::Sync, [kind as u8])
}

/// Decodes a WORD/SYNC payload
pub fn decode_sync(payload: &[u8]) -> Result<SyncKind> {
    expect_len(payload, 1, "sync")?;
    SyncKind::from_code(payload[0])
        .ok_or_else(|| Error::invalid_payload(format!("Unknown sync marker {:#04x}", payload[0])))
}

/// Builds a WORD/CONFIRMATION acknowledging the frame with this checksum
pub fn confirmation_message(checksum: u16) -> Message {
    Message::from_array(WordSubtype::Confirmation, checksum.to_be_bytes())
}

/// Decodes a WORD/CONFIRMATION payload into the acknowledged checksum
pub fn decode_confirmation(payload: &[u8]) -> Result<u16> {
    expect_len(payload, 2, "confirmation")?;
    Ok(u16::from_be_bytes([payload[0], payload[1]]))
}

/// Builds a STRING message; text longer than a payload is rejected
pub fn text_message(subtype: StringSubtype, text: &str) -> Result<Message> {
    if text.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge {
            len: text.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Message::new(Subtype::String(subtype), text.as_bytes().to_vec())
}

/// Decodes a STRING payload
pub fn decode_text(payload: &[u8]) -> Result<String> {
    String::from_utf8(payload.to_vec())
        .map_err(|e| Error::invalid_payload(format!("Text is not UTF-8: {}", e)))
}

fn record(key: u8, value: f32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(RECORD_SIZE);
    payload.push(key);
    payload.extend_from_slice(&value.to_le_bytes());
    payload
}

fn decode_record(payload: &[u8], what: &str) -> Result<(u8, f32)> {
    expect_len(payload, RECORD_SIZE, what)?;
    Ok((
        payload[0],
        f32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]),
    ))
}

fn expect_len(payload: &[u8], len: usize, what: &str) -> Result<()> {
    if payload.len() != len {
        return Err(Error::invalid_payload(format!(
            "{} payload must be {} bytes, got {}",
            what,
            len,
            payload.len()
        )));
    }
    Ok(())
}
