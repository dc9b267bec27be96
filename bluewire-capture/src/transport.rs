//! Serial transport binding.
//!
//! Implements the protocol crate's byte source/sink seam over a serial port.
//! The binding is fixed at startup (device path, baud rate, read timeout);
//! a per-read timeout is reported upward as "no byte yet", leaving deadline
//! policy to the deframer.

use crate::error::CaptureError;
use bluewire_protocol::{ByteSink, ByteSource};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A byte-oriented serial connection to the sniffer hardware.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens `device` at `baud` with the given per-read timeout.
    pub fn open(device: &str, baud: u32, read_timeout: Duration) -> Result<Self, CaptureError> {
        let port = serialport::new(device, baud).timeout(read_timeout).open()?;
        tracing::info!(device, baud, "serial transport open");
        Ok(Self { port })
    }
}

impl ByteSource for SerialTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl ByteSink for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}
