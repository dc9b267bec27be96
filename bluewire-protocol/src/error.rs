//! Protocol error types.

use thiserror::Error;

/// Errors raised while reading or decoding the sniffer byte stream.
///
/// Only [`ProtocolError::Transport`] terminates the capture loop; every other
/// variant is scoped to the frame that produced it and the stream resumes
/// with the next frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serial transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("timed out waiting for a complete frame")]
    FrameTimeout,

    #[error("invalid escape sequence: {0:#04x}")]
    EscapeSequenceInvalid(u8),

    #[error("frame too short for envelope header: {len} bytes (need {min})")]
    TruncatedEnvelope { len: usize, min: usize },

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid BLE header length: {0} (expected 10)")]
    InvalidBleHeaderLength(u8),

    #[error("malformed PDU: truncated at {field}")]
    MalformedPdu { field: &'static str },

    #[error("invalid device address: {0}")]
    InvalidAddress(String),
}

impl ProtocolError {
    /// Whether this error must terminate the capture loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Transport(_))
    }
}
