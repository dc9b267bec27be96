//! Frame-to-packet decode pipeline.
//!
//! Ties the per-frame stages together: envelope parse, capture metadata
//! extraction with padding correction, link-layer decode, name resolution.
//! Everything here is owned by one decode cycle; nothing is shared across
//! frames.

use crate::envelope::{Envelope, PacketType, ProtocolVersion};
use crate::error::ProtocolError;
use crate::pdu::{LinkLayerPdu, PduFormat};
use crate::radio::RadioMetadata;

/// A fully decoded capture event.
#[derive(Debug, Clone)]
pub struct CapturedPdu {
    pub envelope: Envelope,
    pub metadata: RadioMetadata,
    pub pdu: LinkLayerPdu,
    pub device_name: Option<String>,
}

/// Decoded form of one deframed sniffer packet.
#[derive(Debug, Clone)]
pub enum DecodedPacket {
    /// Advertising channel capture.
    Advertising(CapturedPdu),
    /// Data channel capture.
    Data(CapturedPdu),
    /// Non-capture envelope: keep-alive, version, timestamp, baud switch,
    /// follow confirmation, or an unrecognized identifier. Carries its raw
    /// payload for logging.
    Diagnostic(Envelope),
    /// Capture event rejected by the metadata header-length gate. No
    /// link-layer decode was attempted.
    Invalid {
        envelope: Envelope,
        ble_header_length: u8,
    },
}

/// Decodes one deframed frame.
///
/// Structural failures inside the link-layer walk surface as errors; the
/// caller drops the frame and continues with the stream. The header-length
/// gate is not an error to the caller: it yields [`DecodedPacket::Invalid`].
pub fn decode_frame(frame: &[u8]) -> Result<DecodedPacket, ProtocolError> {
    let mut envelope = Envelope::parse(frame)?;
    if !envelope.packet_type.is_capture_event() {
        return Ok(DecodedPacket::Diagnostic(envelope));
    }

    let (metadata, ble) = match RadioMetadata::extract(&mut envelope) {
        Ok(extracted) => extracted,
        Err(ProtocolError::InvalidBleHeaderLength(len)) => {
            return Ok(DecodedPacket::Invalid {
                envelope,
                ble_header_length: len,
            });
        }
        Err(err) => return Err(err),
    };

    let format = pdu_format(envelope.version, envelope.packet_type);
    let pdu = LinkLayerPdu::decode(&ble, metadata.phy, format)?;
    let device_name = pdu.device_name();
    let captured = CapturedPdu {
        envelope,
        metadata,
        pdu,
        device_name,
    };

    Ok(match format {
        PduFormat::Advertising => DecodedPacket::Advertising(captured),
        PduFormat::Data => DecodedPacket::Data(captured),
    })
}

/// Version-3 firmware distinguishes advertising and data captures by packet
/// type; older revisions report every capture on the data-event identifier
/// and the classification is fixed.
fn pdu_format(version: ProtocolVersion, packet_type: PacketType) -> PduFormat {
    match version {
        ProtocolVersion::V3 => match packet_type {
            PacketType::AdvertisingEvent => PduFormat::Advertising,
            _ => PduFormat::Data,
        },
        ProtocolVersion::V1 | ProtocolVersion::V2 => PduFormat::Advertising,
    }
}
