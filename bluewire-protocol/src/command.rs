//! Outbound sniffer commands.
//!
//! The only command the decode pipeline needs is the follow request that
//! steers the sniffer onto a chosen advertiser. Requests are wrapped in a
//! version-1 envelope and SLIP-framed, ready for the byte sink.

use crate::addr::DeviceAddress;
use crate::envelope::{PacketType, ProtocolVersion, HEADER_LENGTH};
use crate::slip;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Follow-request payload: 6 address bytes plus one filter flags byte.
pub const FOLLOW_PAYLOAD_LENGTH: usize = 7;

/// Capture filters for a follow request, packed into the low three bits of
/// the flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowFilter {
    /// Only forward advertising channel traffic.
    pub advertisements_only: bool,
    /// Only follow legacy advertising.
    pub legacy_only: bool,
    /// Only follow coded-PHY advertising.
    pub coded_only: bool,
}

impl FollowFilter {
    fn bits(&self) -> u8 {
        (self.advertisements_only as u8)
            | (self.legacy_only as u8) << 1
            | (self.coded_only as u8) << 2
    }
}

/// Builds framed outbound requests, tagging each with a fresh sequence
/// counter.
///
/// The counter is the only state that outlives a decode iteration; it is
/// owned here and incremented once per built command.
#[derive(Debug, Default)]
pub struct CommandBuilder {
    counter: u16,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current outbound sequence counter (the value the next command will
    /// carry).
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Builds a SLIP-framed follow request for `target`.
    ///
    /// The address is written in on-air byte order; the filter flags occupy
    /// the low three bits of the final payload byte.
    pub fn follow(&mut self, target: DeviceAddress, filter: FollowFilter) -> Vec<u8> {
        let mut payload = [0u8; FOLLOW_PAYLOAD_LENGTH];
        payload[..6].copy_from_slice(&target.to_wire());
        payload[6] = filter.bits();
        let frame = self.envelope(PacketType::FollowRequest, &payload);
        slip::enframe(&frame)
    }

    /// Wraps `payload` in a version-1 envelope header. The first header byte
    /// is the reserved slot, held at zero.
    fn envelope(&mut self, packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);

        let mut frame = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
        frame.put_u8(0x00);
        frame.put_u8(payload.len() as u8);
        frame.put_u8(ProtocolVersion::V1.number());
        frame.put_u16_le(counter);
        frame.put_u8(packet_type.code());
        frame.put_slice(payload);
        frame.to_vec()
    }
}
