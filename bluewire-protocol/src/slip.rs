//! SLIP-style byte framing for the sniffer UART link.
//!
//! Frame layout on the wire:
//!
//! ```text
//! +-------+----------------------------------+-------+
//! | START | escaped payload bytes            | END   |
//! | 0xAB  | ESC-prefixed where needed        | 0xBC  |
//! +-------+----------------------------------+-------+
//! ```
//!
//! A payload byte equal to START, END, or ESC is written as ESC followed by
//! the marker value plus one. Any other byte after an ESC is a framing error
//! and aborts the frame; the next read resynchronizes on the following START.

use crate::error::ProtocolError;
use std::io;
use std::time::{Duration, Instant};

/// Start-of-frame marker.
pub const SLIP_START: u8 = 0xAB;
/// End-of-frame marker.
pub const SLIP_END: u8 = 0xBC;
/// Escape marker.
pub const SLIP_ESC: u8 = 0xCD;
/// Escaped code standing in for a literal START.
pub const SLIP_ESC_START: u8 = SLIP_START + 1;
/// Escaped code standing in for a literal END.
pub const SLIP_ESC_END: u8 = SLIP_END + 1;
/// Escaped code standing in for a literal ESC.
pub const SLIP_ESC_ESC: u8 = SLIP_ESC + 1;

/// Default per-frame deadline, covering both the wait for START and the wait
/// for END.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// One byte at a time from the sniffer transport.
///
/// `Ok(None)` means the transport's own read timeout elapsed with no byte
/// available; the deframer keeps waiting until its per-frame deadline.
pub trait ByteSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
}

/// Outbound byte sink on the sniffer transport.
pub trait ByteSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Pull-based frame reader.
///
/// Each [`Deframer::read_frame`] call begins a fresh search for START
/// regardless of how the previous call ended, so a single corrupt frame never
/// poisons the stream.
#[derive(Debug, Clone)]
pub struct Deframer {
    frame_timeout: Duration,
}

impl Deframer {
    pub fn new(frame_timeout: Duration) -> Self {
        Self { frame_timeout }
    }

    /// Reads one frame from `source`, unescaping as it goes.
    ///
    /// Bytes preceding the START marker are discarded (desynchronization
    /// recovery). Exceeding the per-frame deadline while waiting for either
    /// delimiter yields [`ProtocolError::FrameTimeout`]; transport failures
    /// propagate as [`ProtocolError::Transport`].
    pub fn read_frame<S: ByteSource>(&self, source: &mut S) -> Result<Vec<u8>, ProtocolError> {
        let deadline = Instant::now() + self.frame_timeout;

        // Hunt for START, discarding whatever a desynchronized stream left.
        loop {
            if Instant::now() >= deadline {
                return Err(ProtocolError::FrameTimeout);
            }
            match source.read_byte()? {
                Some(SLIP_START) => break,
                Some(_) | None => continue,
            }
        }

        let mut frame = Vec::with_capacity(64);
        loop {
            if Instant::now() >= deadline {
                return Err(ProtocolError::FrameTimeout);
            }
            let byte = match source.read_byte()? {
                Some(b) => b,
                None => continue,
            };
            match byte {
                SLIP_END => return Ok(frame),
                SLIP_ESC => {
                    let code = loop {
                        if Instant::now() >= deadline {
                            return Err(ProtocolError::FrameTimeout);
                        }
                        if let Some(b) = source.read_byte()? {
                            break b;
                        }
                    };
                    match code {
                        SLIP_ESC_START => frame.push(SLIP_START),
                        SLIP_ESC_END => frame.push(SLIP_END),
                        SLIP_ESC_ESC => frame.push(SLIP_ESC),
                        other => return Err(ProtocolError::EscapeSequenceInvalid(other)),
                    }
                }
                other => frame.push(other),
            }
        }
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_TIMEOUT)
    }
}

/// Escapes `payload` and wraps it in START/END markers.
///
/// Pure and total; the inverse of [`Deframer::read_frame`] for any payload.
pub fn enframe(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.push(SLIP_START);
    for &byte in payload {
        match byte {
            SLIP_START => framed.extend_from_slice(&[SLIP_ESC, SLIP_ESC_START]),
            SLIP_END => framed.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]),
            SLIP_ESC => framed.extend_from_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
            _ => framed.push(byte),
        }
    }
    framed.push(SLIP_END);
    framed
}
