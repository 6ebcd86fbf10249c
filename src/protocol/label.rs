//! One-byte message label
//!
//! ```text
//!  7      4 3    2 1    0
//! +--------+------+------+
//! | length | sub  | type |
//! +--------+------+------+
//! ```

use crate::core::{Error, Result};
use super::message::{MessageType, Subtype};
use super::MAX_PAYLOAD_SIZE;

const TYPE_MASK: u8 = 0b0000_0011;
const SUBTYPE_MASK: u8 = 0b0000_1100;
const SUBTYPE_SHIFT: u8 = 2;
const LENGTH_SHIFT: u8 = 4;

/// Extracts the message type bits
pub fn decode_type(label: u8) -> MessageType {
    MessageType::from_bits(label & TYPE_MASK)
}

/// Extracts the raw subtype code
pub fn decode_subtype(label: u8) -> u8 {
    (label & SUBTYPE_MASK) >> SUBTYPE_SHIFT
}

/// Extracts the declared payload length
pub fn decode_length(label: u8) -> usize {
    (label >> LENGTH_SHIFT) as usize
}

/// Builds a label for `subtype` with the length field zeroed
pub fn build_label(subtype: impl Into<Subtype>) -> Label {
    let subtype = subtype.into();
    Label {
        length: 0,
        subtype: subtype.code(),
        message_type: subtype.message_type(),
    }
}

/// Unpacked label fields
///
/// The subtype is kept as its raw code because its meaning depends on the
/// message type; [`Label::resolve`] looks it up in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    /// Payload length in bytes (0..=15)
    pub length: u8,
    /// Raw two-bit subtype code
    pub subtype: u8,
    /// Message type
    pub message_type: MessageType,
}

impl Label {
    /// Unpacks a wire byte
    pub fn unpack(byte: u8) -> Self {
        Label {
            length: decode_length(byte) as u8,
            subtype: decode_subtype(byte),
            message_type: decode_type(byte),
        }
    }

    /// Packs the label into its wire byte
    pub fn pack(&self) -> u8 {
        (self.length << LENGTH_SHIFT)
            | ((self.subtype << SUBTYPE_SHIFT) & SUBTYPE_MASK)
            | self.message_type.bits()
    }

    /// Returns a copy with the length field set
    pub fn with_length(self, length: usize) -> Result<Self> {
        if length > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: length,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Label {
            length: length as u8,
            ..self
        })
    }

    /// Resolves the subtype code against the message catalog
    pub fn resolve(&self) -> Result<Subtype> {
        Subtype::from_parts(self.message_type, self.subtype)
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> u8 {
        label.pack()
    }
}
