//! 6-byte device addresses in canonical display byte order.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A BLE device address.
///
/// Stored most-significant octet first, the order used for display and for
/// operator-supplied target filters. On-air packets carry the reverse order;
/// use [`DeviceAddress::from_wire`] when reading address fields out of a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Builds an address from on-air byte order (least-significant octet
    /// first), reversing into canonical display order.
    pub fn from_wire(mut wire: [u8; 6]) -> Self {
        wire.reverse();
        Self(wire)
    }

    /// Canonical display-order octets.
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// On-air byte order, least-significant octet first.
    pub fn to_wire(&self) -> [u8; 6] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for DeviceAddress {
    type Err = ProtocolError;

    /// Parses `XX:XX:XX:XX:XX:XX`; `:` and `-` separators are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|&c| c != ':' && c != '-').collect();
        let bytes =
            hex::decode(&cleaned).map_err(|_| ProtocolError::InvalidAddress(s.to_string()))?;
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidAddress(s.to_string()))?;
        Ok(Self(octets))
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(addr: DeviceAddress) -> Self {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        let addr: DeviceAddress = "DE:AD:BE:EF:00:2A".parse().unwrap();
        assert_eq!(addr.octets(), [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x2A]);
        assert_eq!(addr.to_string(), "DE:AD:BE:EF:00:2A");
    }

    #[test]
    fn test_parse_dash_and_lowercase() {
        let addr: DeviceAddress = "de-ad-be-ef-00-2a".parse().unwrap();
        assert_eq!(addr.to_string(), "DE:AD:BE:EF:00:2A");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("DE:AD:BE:EF:00".parse::<DeviceAddress>().is_err());
        assert!("DE:AD:BE:EF:00:2A:FF".parse::<DeviceAddress>().is_err());
        assert!("not an address".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_wire_order_reversal() {
        let addr = DeviceAddress::from_wire([0x2A, 0x00, 0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(addr.to_string(), "DE:AD:BE:EF:00:2A");
        assert_eq!(addr.to_wire(), [0x2A, 0x00, 0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_serde_as_string() {
        let addr = DeviceAddress::new([1, 2, 3, 4, 5, 6]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"01:02:03:04:05:06\"");
        let parsed: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, addr);
    }
}
