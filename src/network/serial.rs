use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

use crate::core::{Result, SerialConfig};
use super::Transport;

/// Serial port transport for the radio modem
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens the configured serial device
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(config.device.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()?;
        info!(device = %config.device, baud = config.baud_rate, "Serial port opened");
        Ok(SerialTransport { port })
    }

    /// Wraps an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        SerialTransport { port }
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let config = SerialConfig {
            device: "/dev/drone-link-does-not-exist".to_string(),
            ..SerialConfig::default()
        };
        assert!(SerialTransport::open(&config).is_err());
    }
}
