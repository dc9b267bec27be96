//! BLE capture metadata extraction and padding correction.
//!
//! Advertising/data event payloads open with a 10-byte capture metadata
//! header written by the sniffer firmware:
//!
//! ```text
//! +------+-------+---------+------+---------------+----------------+
//! | hlen | flags | channel | rssi | event counter | timestamp      |
//! | 1    | 1     | 1       | 1    | 2 (LE)        | 4 (LE)         |
//! +------+-------+---------+------+---------------+----------------+
//! | link-layer packet ...                                          |
//! +----------------------------------------------------------------+
//! ```
//!
//! The firmware also inserts one byte of inter-field padding inside the
//! link-layer packet, right after its length field. That byte must be excised
//! before the PDU decoder runs, since the decoder indexes by fixed offsets
//! that assume a contiguous packet.

use crate::envelope::Envelope;
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Expected value of the metadata header length byte. Anything else marks
/// the capture invalid; no link-layer decode is attempted.
pub const BLE_HEADER_LENGTH: u8 = 10;

/// Offset of the link-layer packet within a capture event payload.
const BLE_PACKET_POS: usize = 10;

/// Physical layer a packet was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phy {
    OneM,
    TwoM,
    Coded,
    Reserved(u8),
}

impl Phy {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Phy::OneM,
            1 => Phy::TwoM,
            2 => Phy::Coded,
            other => Phy::Reserved(other),
        }
    }

    pub fn is_coded(&self) -> bool {
        matches!(self, Phy::Coded)
    }
}

/// Validity and direction flags reported by the firmware for one capture.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CaptureFlags {
    pub crc_ok: bool,
    pub direction: bool,
    pub encrypted: bool,
    pub mic_ok: bool,
}

/// Per-capture radio metadata.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RadioMetadata {
    pub flags: CaptureFlags,
    pub phy: Phy,
    pub channel: u8,
    /// Signed received signal strength in dBm. The firmware reports a
    /// positive magnitude; the stored value is its negation.
    pub rssi: i8,
    pub event_counter: u16,
    /// Capture clock, microseconds.
    pub timestamp: u32,
}

impl RadioMetadata {
    /// A capture is usable when the CRC checked out and, for encrypted
    /// traffic, the MIC did too.
    pub fn ok(&self) -> bool {
        self.flags.crc_ok && (self.flags.mic_ok || !self.flags.encrypted)
    }

    /// Extracts capture metadata from an advertising/data event envelope and
    /// returns it together with the padding-corrected link-layer buffer.
    ///
    /// The envelope's declared payload length is decremented to account for
    /// the excised padding byte.
    pub fn extract(envelope: &mut Envelope) -> Result<(Self, Bytes), ProtocolError> {
        let payload = &envelope.payload;
        if payload.len() < BLE_PACKET_POS {
            return Err(ProtocolError::MalformedPdu {
                field: "capture metadata header",
            });
        }

        let header_len = payload[0];
        if header_len != BLE_HEADER_LENGTH {
            return Err(ProtocolError::InvalidBleHeaderLength(header_len));
        }

        let flags_byte = payload[1];
        let flags = CaptureFlags {
            crc_ok: flags_byte & 0x01 != 0,
            direction: flags_byte & 0x02 != 0,
            encrypted: flags_byte & 0x04 != 0,
            mic_ok: flags_byte & 0x08 != 0,
        };
        let metadata = Self {
            flags,
            phy: Phy::from_bits((flags_byte >> 4) & 0x07),
            channel: payload[2],
            rssi: (payload[3] as i8).wrapping_neg(),
            event_counter: u16::from_le_bytes([payload[4], payload[5]]),
            timestamp: u32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]),
        };

        // The padding byte sits after the length field: access address (4) +
        // header (1) + length (1), plus the coding indicator on coded PHY.
        let ble = &payload[BLE_PACKET_POS..];
        let pad = if metadata.phy.is_coded() { 7 } else { 6 };
        if ble.len() <= pad {
            return Err(ProtocolError::MalformedPdu {
                field: "inter-field padding",
            });
        }

        let mut corrected = BytesMut::with_capacity(ble.len() - 1);
        corrected.put_slice(&ble[..pad]);
        corrected.put_slice(&ble[pad + 1..]);
        envelope.payload_len = envelope.payload_len.saturating_sub(1);

        Ok((metadata, corrected.freeze()))
    }
}
