//! Capture error types.

use bluewire_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the capture loop and its transport binding.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_conversion() {
        let err: CaptureError = ProtocolError::FrameTimeout.into();
        assert!(matches!(err, CaptureError::Protocol(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
