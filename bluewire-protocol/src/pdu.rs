//! Link-layer PDU decoding.
//!
//! A state-free, single-pass offset walk over the padding-corrected
//! link-layer buffer: access address, coding indicator (coded PHY only),
//! header, length, PDU-type-dependent address fields, residual payload.
//!
//! Any cursor overrun is a [`ProtocolError::MalformedPdu`]; the caller drops
//! the envelope and the capture stream continues with the next frame.

use crate::addr::DeviceAddress;
use crate::advdata::ad_structures;
use crate::error::ProtocolError;
use crate::radio::Phy;
use bytes::Bytes;

/// Name emitted for directed advertisements, which carry no AD payload on
/// the wire.
pub const DIRECTED_NAME: &str = "(directed)";

/// How a capture's link-layer header is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduFormat {
    Advertising,
    Data,
}

/// Advertising header format: legacy single-byte header or the extended
/// advertising layout with its inner optional-field header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvFormat {
    Legacy,
    Extended,
}

/// Advertising channel PDU types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvPduType {
    AdvInd,
    AdvDirectInd,
    AdvNonconnInd,
    ScanReq,
    ScanRsp,
    ConnectReq,
    AdvScanInd,
    AdvExtInd,
    Reserved(u8),
}

impl AdvPduType {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0x0 => AdvPduType::AdvInd,
            0x1 => AdvPduType::AdvDirectInd,
            0x2 => AdvPduType::AdvNonconnInd,
            0x3 => AdvPduType::ScanReq,
            0x4 => AdvPduType::ScanRsp,
            0x5 => AdvPduType::ConnectReq,
            0x6 => AdvPduType::AdvScanInd,
            0x7 => AdvPduType::AdvExtInd,
            other => AdvPduType::Reserved(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            AdvPduType::AdvInd => 0x0,
            AdvPduType::AdvDirectInd => 0x1,
            AdvPduType::AdvNonconnInd => 0x2,
            AdvPduType::ScanReq => 0x3,
            AdvPduType::ScanRsp => 0x4,
            AdvPduType::ConnectReq => 0x5,
            AdvPduType::AdvScanInd => 0x6,
            AdvPduType::AdvExtInd => 0x7,
            AdvPduType::Reserved(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdvPduType::AdvInd => "ADV_IND",
            AdvPduType::AdvDirectInd => "ADV_DIRECT_IND",
            AdvPduType::AdvNonconnInd => "ADV_NONCONN_IND",
            AdvPduType::ScanReq => "SCAN_REQ",
            AdvPduType::ScanRsp => "SCAN_RSP",
            AdvPduType::ConnectReq => "CONNECT_REQ",
            AdvPduType::AdvScanInd => "ADV_SCAN_IND",
            AdvPduType::AdvExtInd => "ADV_EXT_IND",
            AdvPduType::Reserved(_) => "RESERVED",
        }
    }

    /// PDU types carrying a single advertiser address at the head of the
    /// payload.
    fn has_leading_advertiser_address(&self) -> bool {
        matches!(
            self,
            AdvPduType::AdvInd
                | AdvPduType::AdvDirectInd
                | AdvPduType::AdvNonconnInd
                | AdvPduType::ScanRsp
                | AdvPduType::AdvScanInd
        )
    }

    /// PDU types whose payload is an AD stream (and may carry a local name).
    pub fn has_ad_payload(&self) -> bool {
        matches!(
            self,
            AdvPduType::AdvInd
                | AdvPduType::AdvNonconnInd
                | AdvPduType::ScanRsp
                | AdvPduType::AdvScanInd
        )
    }
}

/// Whether an address field is public or random.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

impl AddressType {
    pub fn from_bit(set: bool) -> Self {
        if set {
            AddressType::Random
        } else {
            AddressType::Public
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AddressType::Public => "public",
            AddressType::Random => "random",
        }
    }
}

/// Parsed link-layer header fields.
#[derive(Debug, Clone, Copy)]
pub enum PduHeader {
    Advertising {
        pdu_type: AdvPduType,
        format: AdvFormat,
        tx_addr: AddressType,
        rx_addr: Option<AddressType>,
    },
    Data {
        llid: u8,
        sn: bool,
        nesn: bool,
        md: bool,
    },
}

/// One decoded link-layer packet.
///
/// `payload` is a view into the corrected capture buffer, never copied.
#[derive(Debug, Clone)]
pub struct LinkLayerPdu {
    pub access_address: u32,
    /// Coding indicator, present only on coded-PHY captures (2 low bits).
    pub coding_indicator: Option<u8>,
    pub header: PduHeader,
    /// Declared remaining PDU length.
    pub length: u8,
    pub advertiser_address: Option<DeviceAddress>,
    pub scan_address: Option<DeviceAddress>,
    pub target_address: Option<DeviceAddress>,
    pub payload: Bytes,
}

/// Bounds-checked cursor over the link-layer buffer.
struct Walker<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl<'a> Walker<'a> {
    fn new(buf: &'a Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(ProtocolError::MalformedPdu { field })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(ProtocolError::MalformedPdu { field });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32_le(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn address(&mut self, field: &'static str) -> Result<DeviceAddress, ProtocolError> {
        let bytes = self.take(6, field)?;
        let mut wire = [0u8; 6];
        wire.copy_from_slice(bytes);
        Ok(DeviceAddress::from_wire(wire))
    }

    /// Places the cursor at an absolute offset, validated against the buffer.
    fn seek(&mut self, pos: usize, field: &'static str) -> Result<(), ProtocolError> {
        if pos > self.buf.len() {
            return Err(ProtocolError::MalformedPdu { field });
        }
        self.pos = pos;
        Ok(())
    }

    fn rest(self) -> Bytes {
        self.buf.slice(self.pos..)
    }
}

impl LinkLayerPdu {
    /// Decodes the link-layer packet in the corrected capture buffer.
    pub fn decode(ble: &Bytes, phy: Phy, format: PduFormat) -> Result<Self, ProtocolError> {
        let mut walker = Walker::new(ble);
        let access_address = walker.u32_le("access address")?;
        let coding_indicator = if phy.is_coded() {
            Some(walker.u8("coding indicator")? & 0x03)
        } else {
            None
        };

        match format {
            PduFormat::Data => Self::decode_data(walker, access_address, coding_indicator),
            PduFormat::Advertising => {
                Self::decode_advertising(walker, access_address, coding_indicator)
            }
        }
    }

    fn decode_data(
        mut walker: Walker<'_>,
        access_address: u32,
        coding_indicator: Option<u8>,
    ) -> Result<Self, ProtocolError> {
        let header_byte = walker.u8("data header")?;
        let header = PduHeader::Data {
            llid: header_byte & 0x03,
            sn: (header_byte >> 2) & 1 != 0,
            nesn: (header_byte >> 3) & 1 != 0,
            md: (header_byte >> 4) & 1 != 0,
        };
        let length = walker.u8("length")?;
        Ok(Self {
            access_address,
            coding_indicator,
            header,
            length,
            advertiser_address: None,
            scan_address: None,
            target_address: None,
            payload: walker.rest(),
        })
    }

    fn decode_advertising(
        mut walker: Walker<'_>,
        access_address: u32,
        coding_indicator: Option<u8>,
    ) -> Result<Self, ProtocolError> {
        let header_byte = walker.u8("advertising header")?;
        let pdu_type = AdvPduType::from_bits(header_byte & 0x0F);
        let tx_addr = AddressType::from_bit(header_byte & 0x40 != 0);
        let mut rx_addr = match pdu_type {
            AdvPduType::AdvDirectInd | AdvPduType::ScanReq | AdvPduType::ConnectReq => {
                Some(AddressType::from_bit(header_byte & 0x80 != 0))
            }
            _ => None,
        };
        let length = walker.u8("length")?;

        let mut advertiser_address = None;
        let mut scan_address = None;
        let mut target_address = None;
        let mut format = AdvFormat::Legacy;

        match pdu_type {
            _ if pdu_type.has_leading_advertiser_address() => {
                advertiser_address = Some(walker.address("advertiser address")?);
                if pdu_type == AdvPduType::AdvDirectInd {
                    target_address = Some(walker.address("target address")?);
                }
            }
            AdvPduType::ScanReq | AdvPduType::ConnectReq => {
                scan_address = Some(walker.address("scan address")?);
                advertiser_address = Some(walker.address("advertiser address")?);
            }
            AdvPduType::AdvExtInd => {
                format = AdvFormat::Extended;
                let ext_start = walker.pos;
                let ext_len = (walker.u8("extended header length")? & 0x3F) as usize;
                if ext_len > 0 {
                    let flags = walker.u8("extended header flags")?;
                    rx_addr = Some(AddressType::from_bit(flags & 0x80 != 0));
                    if flags & 0x01 != 0 {
                        advertiser_address =
                            Some(walker.address("extended advertiser address")?);
                    }
                    if flags & 0x02 != 0 {
                        target_address = Some(walker.address("extended target address")?);
                    }
                }
                // Skip past the full declared extended header so the payload
                // cursor stays correct even when flagged fields were not
                // decoded.
                walker.seek(ext_start + 1 + ext_len, "extended header length")?;
            }
            _ => {}
        }

        let header = PduHeader::Advertising {
            pdu_type,
            format,
            tx_addr,
            rx_addr,
        };
        Ok(Self {
            access_address,
            coding_indicator,
            header,
            length,
            advertiser_address,
            scan_address,
            target_address,
            payload: walker.rest(),
        })
    }

    /// Resolves the advertised device name from the AD payload.
    ///
    /// Directed advertisements carry no AD stream; a fixed placeholder is
    /// emitted for them instead.
    pub fn device_name(&self) -> Option<String> {
        let PduHeader::Advertising { pdu_type, .. } = self.header else {
            return None;
        };
        if pdu_type == AdvPduType::AdvDirectInd {
            return Some(DIRECTED_NAME.to_string());
        }
        if !pdu_type.has_ad_payload() {
            return None;
        }
        ad_structures(&self.payload)
            .find(|element| element.category().is_local_name())
            .map(|element| String::from_utf8_lossy(element.data).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_ADDRESS: u32 = 0x8E89_BED6;

    fn adv_buffer(header: u8, length: u8, body: &[u8]) -> Bytes {
        let mut buf = ACCESS_ADDRESS.to_le_bytes().to_vec();
        buf.push(header);
        buf.push(length);
        buf.extend_from_slice(body);
        buf.into()
    }

    #[test]
    fn test_adv_ind_with_name() {
        // AdvA (wire order) then flags + complete local name "Hi".
        let mut body = vec![0x2A, 0x00, 0xEF, 0xBE, 0xAD, 0xDE];
        body.extend_from_slice(&[0x02, 0x01, 0x06, 0x03, 0x09, 0x48, 0x69]);
        let buf = adv_buffer(0x40, body.len() as u8, &body);

        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        assert_eq!(pdu.access_address, ACCESS_ADDRESS);
        assert!(pdu.coding_indicator.is_none());
        let PduHeader::Advertising {
            pdu_type,
            format,
            tx_addr,
            rx_addr,
        } = pdu.header
        else {
            panic!("expected advertising header");
        };
        assert_eq!(pdu_type, AdvPduType::AdvInd);
        assert_eq!(format, AdvFormat::Legacy);
        assert_eq!(tx_addr, AddressType::Random);
        assert!(rx_addr.is_none());
        assert_eq!(
            pdu.advertiser_address.unwrap().to_string(),
            "DE:AD:BE:EF:00:2A"
        );
        assert_eq!(pdu.device_name().as_deref(), Some("Hi"));
    }

    #[test]
    fn test_scan_req_two_addresses() {
        let mut body = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        body.extend_from_slice(&[0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]);
        let buf = adv_buffer(0x83, 12, &body);

        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        let PduHeader::Advertising {
            pdu_type, rx_addr, ..
        } = pdu.header
        else {
            panic!("expected advertising header");
        };
        assert_eq!(pdu_type, AdvPduType::ScanReq);
        assert_eq!(rx_addr, Some(AddressType::Random));
        assert_eq!(
            pdu.scan_address.unwrap().to_string(),
            "06:05:04:03:02:01"
        );
        assert_eq!(
            pdu.advertiser_address.unwrap().to_string(),
            "0F:0E:0D:0C:0B:0A"
        );
        assert!(pdu.device_name().is_none());
    }

    #[test]
    fn test_adv_direct_ind_target_and_placeholder_name() {
        let mut body = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        body.extend_from_slice(&[0x11, 0x12, 0x13, 0x14, 0x15, 0x16]);
        let buf = adv_buffer(0x81, 12, &body);

        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        let PduHeader::Advertising {
            pdu_type, rx_addr, ..
        } = pdu.header
        else {
            panic!("expected advertising header");
        };
        assert_eq!(pdu_type, AdvPduType::AdvDirectInd);
        assert_eq!(rx_addr, Some(AddressType::Random));
        assert_eq!(
            pdu.target_address.unwrap().to_string(),
            "16:15:14:13:12:11"
        );
        assert_eq!(pdu.device_name().as_deref(), Some(DIRECTED_NAME));
    }

    #[test]
    fn test_connect_req_addresses() {
        let mut body = vec![0xAA; 6];
        body.extend_from_slice(&[0xBB; 6]);
        body.extend_from_slice(&[0u8; 22]); // LLData
        let buf = adv_buffer(0x05, 34, &body);

        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        assert!(pdu.scan_address.is_some());
        assert!(pdu.advertiser_address.is_some());
        assert_eq!(pdu.payload.len(), 22);
    }

    #[test]
    fn test_extended_header_with_both_addresses() {
        // ext_len 13: flags + AdvA + TargetA.
        let mut body = vec![0x0D, 0x83];
        body.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        body.extend_from_slice(&[0x11, 0x12, 0x13, 0x14, 0x15, 0x16]);
        body.extend_from_slice(&[0xD0, 0xD1]); // primary payload remainder
        let buf = adv_buffer(0x47, body.len() as u8, &body);

        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        let PduHeader::Advertising {
            pdu_type,
            format,
            rx_addr,
            ..
        } = pdu.header
        else {
            panic!("expected advertising header");
        };
        assert_eq!(pdu_type, AdvPduType::AdvExtInd);
        assert_eq!(format, AdvFormat::Extended);
        assert_eq!(rx_addr, Some(AddressType::Random));
        assert!(pdu.advertiser_address.is_some());
        assert!(pdu.target_address.is_some());
        assert_eq!(pdu.payload.as_ref(), &[0xD0, 0xD1]);
        assert!(pdu.device_name().is_none());
    }

    #[test]
    fn test_extended_header_cursor_skips_undecoded_fields() {
        // ext_len 7: flags + AdvA only, but the declared length also covers
        // fields this decoder does not extract; add two such bytes.
        let mut body = vec![0x09, 0x01];
        body.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        body.extend_from_slice(&[0xFE, 0xFD]); // ADI bytes, flagged off here
        body.extend_from_slice(&[0xD0, 0xD1, 0xD2]);
        let buf = adv_buffer(0x07, body.len() as u8, &body);

        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        assert!(pdu.advertiser_address.is_some());
        assert!(pdu.target_address.is_none());
        assert_eq!(pdu.payload.as_ref(), &[0xD0, 0xD1, 0xD2]);
    }

    #[test]
    fn test_extended_header_zero_length() {
        let body = vec![0x00, 0xE0, 0xE1];
        let buf = adv_buffer(0x07, body.len() as u8, &body);
        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        let PduHeader::Advertising { rx_addr, .. } = pdu.header else {
            panic!("expected advertising header");
        };
        assert!(rx_addr.is_none());
        assert_eq!(pdu.payload.as_ref(), &[0xE0, 0xE1]);
    }

    #[test]
    fn test_extended_header_overrunning_buffer_is_malformed() {
        let body = vec![0x3F, 0x00];
        let buf = adv_buffer(0x07, body.len() as u8, &body);
        let err = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPdu { .. }));
    }

    #[test]
    fn test_coded_phy_consumes_coding_indicator() {
        let mut buf = ACCESS_ADDRESS.to_le_bytes().to_vec();
        buf.push(0x02); // CI: S=8
        buf.push(0x42);
        buf.push(6);
        buf.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let buf = Bytes::from(buf);

        let pdu = LinkLayerPdu::decode(&buf, Phy::Coded, PduFormat::Advertising).unwrap();
        assert_eq!(pdu.coding_indicator, Some(0x02));
        assert_eq!(
            pdu.advertiser_address.unwrap().to_string(),
            "06:05:04:03:02:01"
        );
    }

    #[test]
    fn test_data_header_bits() {
        let mut buf = ACCESS_ADDRESS.to_le_bytes().to_vec();
        // llid=2, sn=1, nesn=0, md=1
        buf.push(0b0001_0110);
        buf.push(3);
        buf.extend_from_slice(&[0x07, 0x08, 0x09]);
        let buf = Bytes::from(buf);

        let pdu = LinkLayerPdu::decode(&buf, Phy::TwoM, PduFormat::Data).unwrap();
        let PduHeader::Data { llid, sn, nesn, md } = pdu.header else {
            panic!("expected data header");
        };
        assert_eq!(llid, 2);
        assert!(sn);
        assert!(!nesn);
        assert!(md);
        assert_eq!(pdu.length, 3);
        assert_eq!(pdu.payload.as_ref(), &[0x07, 0x08, 0x09]);
        assert!(pdu.device_name().is_none());
    }

    #[test]
    fn test_truncated_buffers_are_malformed() {
        let truncations: &[&[u8]] = &[
            &[],
            &[0xD6, 0xBE],                        // partial access address
            &[0xD6, 0xBE, 0x89, 0x8E],            // missing header
            &[0xD6, 0xBE, 0x89, 0x8E, 0x40],      // missing length
            &[0xD6, 0xBE, 0x89, 0x8E, 0x40, 10],  // missing advertiser address
        ];
        for bytes in truncations {
            let buf = Bytes::copy_from_slice(bytes);
            let err = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap_err();
            assert!(matches!(err, ProtocolError::MalformedPdu { .. }));
        }
    }

    #[test]
    fn test_reserved_pdu_type_keeps_payload() {
        let body = [0x55, 0x56];
        let buf = adv_buffer(0x0F, 2, &body);
        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        let PduHeader::Advertising { pdu_type, .. } = pdu.header else {
            panic!("expected advertising header");
        };
        assert_eq!(pdu_type, AdvPduType::Reserved(0x0F));
        assert!(pdu.advertiser_address.is_none());
        assert_eq!(pdu.payload.as_ref(), &[0x55, 0x56]);
    }

    #[test]
    fn test_shortened_name_resolves() {
        let mut body = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        body.extend_from_slice(&[0x03, 0x08, 0x42, 0x57]); // shortened "BW"
        let buf = adv_buffer(0x44, body.len() as u8, &body);
        let pdu = LinkLayerPdu::decode(&buf, Phy::OneM, PduFormat::Advertising).unwrap();
        assert_eq!(pdu.device_name().as_deref(), Some("BW"));
    }
}
