//! # bluewire-protocol
//!
//! Wire protocol implementation for the bluewire sniffer link.
//!
//! This crate provides:
//! - SLIP-style byte framing with escape sequences (deframe/enframe)
//! - Versioned envelope parsing (protocol revisions 1-3)
//! - BLE capture metadata extraction and padding correction
//! - Link-layer PDU decoding, legacy and extended advertising formats
//! - Advertising-data TLV parsing
//! - Outbound follow-command construction

pub mod addr;
pub mod advdata;
pub mod command;
pub mod envelope;
pub mod error;
pub mod packet;
pub mod pdu;
pub mod radio;
pub mod slip;

pub use addr::DeviceAddress;
pub use advdata::{ad_structures, AdCategory, AdStructure, AdStructures};
pub use command::{CommandBuilder, FollowFilter};
pub use envelope::{Envelope, PacketType, ProtocolVersion, HEADER_LENGTH};
pub use error::ProtocolError;
pub use packet::{decode_frame, CapturedPdu, DecodedPacket};
pub use pdu::{AddressType, AdvFormat, AdvPduType, LinkLayerPdu, PduHeader};
pub use radio::{CaptureFlags, Phy, RadioMetadata, BLE_HEADER_LENGTH};
pub use slip::{enframe, ByteSink, ByteSource, Deframer};
