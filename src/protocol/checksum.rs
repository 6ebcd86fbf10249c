//! Fletcher-16 integrity code
//!
//! Two running sums modulo 255; the second accumulates the first. The 16-bit
//! result packs `sum2` in the high byte and `sum1` in the low byte and is
//! written to the wire big-endian.

/// Size of the checksum trailer in bytes
pub const CHECKSUM_SIZE: usize = 2;

/// Computes the Fletcher-16 checksum of `data`
pub fn fletcher16(data: &[u8]) -> u16 {
    fletcher16_resume(data, 0)
}

/// Continues a Fletcher-16 computation from a previously returned result
///
/// `fletcher16_resume(b, fletcher16(a))` equals `fletcher16(a ++ b)`.
pub fn fletcher16_resume(data: &[u8], last: u16) -> u16 {
    let mut sum1 = (last & 0xFF) % 255;
    let mut sum2 = (last >> 8) % 255;

    for &byte in data {
        sum1 = (sum1 + byte as u16) % 255;
        sum2 = (sum2 + sum1) % 255;
    }

    (sum2 << 8) | sum1
}

/// Returns true if `data` ends with the valid checksum of everything before it
pub fn validate(data: &[u8]) -> bool {
    if data.len() < CHECKSUM_SIZE {
        return false;
    }
    let (body, trailer) = data.split_at(data.len() - CHECKSUM_SIZE);
    fletcher16(body) == u16::from_be_bytes([trailer[0], trailer[1]])
}

/// Streaming Fletcher-16 accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fletcher16 {
    state: u16,
}

impl Fletcher16 {
    /// Creates an empty accumulator
    pub fn new() -> Self {
        Fletcher16 { state: 0 }
    }

    /// Feeds more bytes into the running checksum
    pub fn update(&mut self, data: &[u8]) {
        self.state = fletcher16_resume(data, self.state);
    }

    /// Feeds a single byte
    pub fn push(&mut self, byte: u8) {
        self.update(&[byte]);
    }

    /// Current checksum value
    pub fn value(&self) -> u16 {
        self.state
    }

    /// Current checksum as trailer bytes
    pub fn to_bytes(&self) -> [u8; CHECKSUM_SIZE] {
        self.state.to_be_bytes()
    }

    /// Clears the running sums
    pub fn reset(&mut self) {
        self.state = 0;
    }
}
