//! Printable capture records.
//!
//! One record is emitted per decoded packet. Consumers (logging, UI) treat
//! it as an opaque structured value; ordering follows capture order.

use bluewire_protocol::{
    ad_structures, AdCategory, AdvFormat, CapturedPdu, DeviceAddress, Envelope, PduHeader, Phy,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Radio metadata section of a record.
#[derive(Debug, Clone, Serialize)]
pub struct RadioSummary {
    pub channel: u8,
    pub rssi_dbm: i8,
    pub phy: &'static str,
    pub crc_ok: bool,
    pub direction: bool,
    pub encrypted: bool,
    pub mic_ok: bool,
    /// CRC checked out and, for encrypted traffic, the MIC did too.
    pub ok: bool,
    pub event_counter: u16,
    pub timestamp_us: u32,
}

/// One advertising-data element, formatted for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct AdElement {
    pub kind: u8,
    pub category: &'static str,
    /// Raw element data, hex.
    pub data: String,
    /// UTF-8 rendering for local-name elements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// 16-bit service UUIDs for UUID-list elements.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_uuids: Vec<String>,
}

/// Link-layer section of a record.
#[derive(Debug, Clone, Serialize)]
pub struct PduSummary {
    pub access_address: String,
    pub pdu_type: &'static str,
    pub extended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llid: Option<u8>,
    pub length: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertiser_address: Option<DeviceAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertiser_address_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_address: Option<DeviceAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_address: Option<DeviceAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ad: Vec<AdElement>,
}

/// One printable record per decoded packet.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    /// Host receive time, distinct from the sniffer capture timestamp.
    pub received_at: DateTime<Utc>,
    pub event: &'static str,
    /// Raw deframed packet bytes, hex.
    pub raw: String,
    pub protocol_version: u8,
    pub sequence_counter: u16,
    pub packet_type: &'static str,
    pub packet_type_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio: Option<RadioSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdu: Option<PduSummary>,
}

impl CaptureRecord {
    /// Builds a record for a decoded advertising-channel capture.
    pub fn advertising(captured: &CapturedPdu, raw_frame: &[u8]) -> Self {
        Self::capture("advertising", captured, raw_frame)
    }

    /// Builds a record for a decoded data-channel capture.
    pub fn data(captured: &CapturedPdu, raw_frame: &[u8]) -> Self {
        Self::capture("data", captured, raw_frame)
    }

    /// Builds a diagnostic record for a non-capture envelope.
    pub fn diagnostic(envelope: &Envelope, raw_frame: &[u8]) -> Self {
        Self {
            received_at: Utc::now(),
            event: "diagnostic",
            raw: hex::encode_upper(raw_frame),
            protocol_version: envelope.version.number(),
            sequence_counter: envelope.counter,
            packet_type: envelope.packet_type.name(),
            packet_type_code: envelope.packet_type.code(),
            radio: None,
            pdu: None,
        }
    }

    fn capture(event: &'static str, captured: &CapturedPdu, raw_frame: &[u8]) -> Self {
        let metadata = &captured.metadata;
        let radio = RadioSummary {
            channel: metadata.channel,
            rssi_dbm: metadata.rssi,
            phy: phy_name(metadata.phy),
            crc_ok: metadata.flags.crc_ok,
            direction: metadata.flags.direction,
            encrypted: metadata.flags.encrypted,
            mic_ok: metadata.flags.mic_ok,
            ok: metadata.ok(),
            event_counter: metadata.event_counter,
            timestamp_us: metadata.timestamp,
        };

        let pdu = &captured.pdu;
        let (pdu_type, extended, llid, addr_type) = match pdu.header {
            PduHeader::Advertising {
                pdu_type,
                format,
                tx_addr,
                ..
            } => (
                pdu_type.name(),
                format == AdvFormat::Extended,
                None,
                Some(tx_addr.name()),
            ),
            PduHeader::Data { llid, .. } => ("DATA", false, Some(llid), None),
        };

        let ad = match pdu.header {
            PduHeader::Advertising { pdu_type, .. } if pdu_type.has_ad_payload() => {
                ad_structures(&pdu.payload).map(AdElement::from).collect()
            }
            _ => Vec::new(),
        };

        Self {
            received_at: Utc::now(),
            event,
            raw: hex::encode_upper(raw_frame),
            protocol_version: captured.envelope.version.number(),
            sequence_counter: captured.envelope.counter,
            packet_type: captured.envelope.packet_type.name(),
            packet_type_code: captured.envelope.packet_type.code(),
            radio: Some(radio),
            pdu: Some(PduSummary {
                access_address: format!("{:#010X}", pdu.access_address),
                pdu_type,
                extended,
                llid,
                length: pdu.length,
                advertiser_address: pdu.advertiser_address,
                advertiser_address_type: pdu.advertiser_address.and(addr_type),
                scan_address: pdu.scan_address,
                target_address: pdu.target_address,
                device_name: captured.device_name.clone(),
                ad,
            }),
        }
    }
}

impl From<bluewire_protocol::AdStructure<'_>> for AdElement {
    fn from(element: bluewire_protocol::AdStructure<'_>) -> Self {
        let category = element.category();
        let text = category
            .is_local_name()
            .then(|| String::from_utf8_lossy(element.data).into_owned());
        let service_uuids = match category {
            AdCategory::ServiceUuids16Complete | AdCategory::ServiceUuids16Incomplete => element
                .uuids16()
                .map(|uuid| format!("{uuid:#06X}"))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            kind: element.kind,
            category: category.name(),
            data: hex::encode_upper(element.data),
            text,
            service_uuids,
        }
    }
}

impl fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.radio, &self.pdu) {
            (Some(radio), Some(pdu)) => {
                write!(
                    f,
                    "#{:<5} {:15} ch{:02} {:>4} dBm {:>5}",
                    self.sequence_counter, pdu.pdu_type, radio.channel, radio.rssi_dbm, radio.phy,
                )?;
                if let Some(addr) = &pdu.advertiser_address {
                    write!(f, " {addr}")?;
                }
                if let Some(name) = &pdu.device_name {
                    write!(f, " \"{name}\"")?;
                }
                write!(f, " aa={}", pdu.access_address)?;
                if !radio.ok {
                    write!(f, " [bad]")?;
                }
                Ok(())
            }
            _ => write!(
                f,
                "#{:<5} {} v{} raw={}",
                self.sequence_counter, self.packet_type, self.protocol_version, self.raw
            ),
        }
    }
}

fn phy_name(phy: Phy) -> &'static str {
    match phy {
        Phy::OneM => "1M",
        Phy::TwoM => "2M",
        Phy::Coded => "coded",
        Phy::Reserved(_) => "reserved",
    }
}
