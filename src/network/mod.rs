//! Link endpoints and the transports that carry them
//!
//! This module handles the byte stream under the protocol: a polling
//! [`Transport`] abstraction, the [`Link`] endpoint built on it, and an
//! async driver for tokio streams.

pub mod connection;
pub mod link;
pub mod serial;

pub use self::connection::{LinkCommand, LinkDriver, LinkHandle};
pub use self::link::{Link, LinkEvent};
pub use self::serial::SerialTransport;

use std::collections::VecDeque;
use std::io;

use crate::core::{Error, Result};

/// Ordered byte stream without framing or delivery guarantees
pub trait Transport {
    /// Returns the next received byte, or `None` if nothing is available yet
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Writes every byte or fails
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// In-memory transport for tests and simulations
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    closed: bool,
}

impl MemoryTransport {
    /// Creates an open, empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes bytes available to `read_byte`
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Takes everything written so far
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    /// Simulates losing the link; every later call fails
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transport closed",
            )));
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.check_open()?;
        Ok(self.inbound.pop_front())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_open()?;
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}
