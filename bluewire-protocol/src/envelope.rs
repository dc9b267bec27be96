//! Envelope header parsing for deframed sniffer packets.
//!
//! Every frame starts with a 6-byte header; the width and position of the
//! payload-length field changed in protocol version 2:
//!
//! ```text
//! v1:    | reserved | payload_len | version | counter (2, LE) | type |
//! v2/v3: | payload_len (2, LE)    | version | counter (2, LE) | type |
//! ```
//!
//! The remainder of the frame is the type-specific payload.

use crate::error::ProtocolError;
use bytes::Bytes;
use std::fmt;

/// Fixed envelope header length in bytes.
pub const HEADER_LENGTH: usize = 6;

/// Firmware protocol revision, resolved once per envelope and passed
/// explicitly to every stage with version-dependent behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
}

impl ProtocolVersion {
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            3 => Ok(ProtocolVersion::V3),
            other => Err(ProtocolError::UnsupportedVersion(other)),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
            ProtocolVersion::V3 => 3,
        }
    }
}

/// Packet type identifiers carried in the envelope header.
///
/// A closed enumeration on the wire; identifiers outside it are tolerated and
/// surface as [`PacketType::Unrecognized`] so one unknown firmware message
/// never halts the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Outbound request steering the sniffer onto a target device.
    FollowRequest,
    /// Confirmation that the sniffer started following.
    FollowEvent,
    /// Captured advertising channel PDU.
    AdvertisingEvent,
    /// Captured data channel PDU.
    DataEvent,
    /// Keep-alive reply.
    PingResponse,
    /// Baud-rate switch request.
    BaudRateRequest,
    /// Baud-rate switch acknowledgement.
    BaudRateResponse,
    /// Firmware version reply.
    VersionResponse,
    /// Capture clock reply.
    TimestampResponse,
    Unrecognized(u8),
}

impl PacketType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => PacketType::FollowRequest,
            0x01 => PacketType::FollowEvent,
            0x02 => PacketType::AdvertisingEvent,
            0x06 => PacketType::DataEvent,
            0x0E => PacketType::PingResponse,
            0x13 => PacketType::BaudRateRequest,
            0x14 => PacketType::BaudRateResponse,
            0x1C => PacketType::VersionResponse,
            0x1E => PacketType::TimestampResponse,
            other => PacketType::Unrecognized(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PacketType::FollowRequest => 0x00,
            PacketType::FollowEvent => 0x01,
            PacketType::AdvertisingEvent => 0x02,
            PacketType::DataEvent => 0x06,
            PacketType::PingResponse => 0x0E,
            PacketType::BaudRateRequest => 0x13,
            PacketType::BaudRateResponse => 0x14,
            PacketType::VersionResponse => 0x1C,
            PacketType::TimestampResponse => 0x1E,
            PacketType::Unrecognized(code) => *code,
        }
    }

    /// Whether this envelope carries a captured link-layer packet.
    pub fn is_capture_event(&self) -> bool {
        matches!(self, PacketType::AdvertisingEvent | PacketType::DataEvent)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacketType::FollowRequest => "follow-request",
            PacketType::FollowEvent => "follow-event",
            PacketType::AdvertisingEvent => "advertising-event",
            PacketType::DataEvent => "data-event",
            PacketType::PingResponse => "ping-response",
            PacketType::BaudRateRequest => "baud-switch-request",
            PacketType::BaudRateResponse => "baud-switch-ack",
            PacketType::VersionResponse => "version-response",
            PacketType::TimestampResponse => "timestamp-response",
            PacketType::Unrecognized(_) => "unrecognized",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed envelope: the fixed header plus ownership of the type-specific
/// payload bytes.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub version: ProtocolVersion,
    pub counter: u16,
    pub packet_type: PacketType,
    /// Declared payload length. Decremented by the padding correction for
    /// capture events.
    pub payload_len: u16,
    /// Whether `payload_len + HEADER_LENGTH` matched the frame length as
    /// captured. A mismatch is diagnostic, not fatal.
    pub length_ok: bool,
    pub payload: Bytes,
}

impl Envelope {
    /// Parses the envelope header of a deframed packet.
    ///
    /// A declared-length mismatch is logged and decoding proceeds
    /// best-effort, mirroring the tolerant behavior of the reference
    /// firmware protocol.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < HEADER_LENGTH {
            return Err(ProtocolError::TruncatedEnvelope {
                len: frame.len(),
                min: HEADER_LENGTH,
            });
        }

        let version = ProtocolVersion::from_u8(frame[2])?;
        let payload_len = match version {
            ProtocolVersion::V1 => frame[1] as u16,
            ProtocolVersion::V2 | ProtocolVersion::V3 => {
                u16::from_le_bytes([frame[0], frame[1]])
            }
        };
        let counter = u16::from_le_bytes([frame[3], frame[4]]);
        let packet_type = PacketType::from_code(frame[5]);

        let length_ok = payload_len as usize + HEADER_LENGTH == frame.len();
        if !length_ok {
            tracing::warn!(
                declared = payload_len,
                actual = frame.len() - HEADER_LENGTH,
                "envelope length mismatch, decoding best-effort"
            );
        }

        Ok(Self {
            version,
            counter,
            packet_type,
            payload_len,
            length_ok,
            payload: Bytes::copy_from_slice(&frame[HEADER_LENGTH..]),
        })
    }
}
