//! Advertising-data (AD structure) TLV parsing.
//!
//! The advertising payload is a run of `| length | type | data |` elements.
//! Parsing is lazy and tolerant: a zero length or an element overrunning the
//! slice ends iteration, yielding whatever elements came before it.

use std::fmt;

/// AD type code: flags.
pub const AD_TYPE_FLAGS: u8 = 0x01;
/// AD type code: incomplete list of 16-bit service UUIDs.
pub const AD_TYPE_UUID16_INCOMPLETE: u8 = 0x02;
/// AD type code: complete list of 16-bit service UUIDs.
pub const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
/// AD type code: shortened local name.
pub const AD_TYPE_NAME_SHORTENED: u8 = 0x08;
/// AD type code: complete local name.
pub const AD_TYPE_NAME_COMPLETE: u8 = 0x09;
/// AD type code: manufacturer-specific data.
pub const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// Semantic category of an AD element, for downstream formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdCategory {
    Flags,
    ServiceUuids16Incomplete,
    ServiceUuids16Complete,
    ShortenedLocalName,
    CompleteLocalName,
    ManufacturerData,
    Unknown,
}

impl AdCategory {
    pub fn name(&self) -> &'static str {
        match self {
            AdCategory::Flags => "flags",
            AdCategory::ServiceUuids16Incomplete => "service-uuids16-incomplete",
            AdCategory::ServiceUuids16Complete => "service-uuids16",
            AdCategory::ShortenedLocalName => "shortened-local-name",
            AdCategory::CompleteLocalName => "complete-local-name",
            AdCategory::ManufacturerData => "manufacturer-data",
            AdCategory::Unknown => "unknown",
        }
    }

    pub fn is_local_name(&self) -> bool {
        matches!(
            self,
            AdCategory::ShortenedLocalName | AdCategory::CompleteLocalName
        )
    }
}

impl fmt::Display for AdCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One Type-Length-Value element of the advertising-data stream.
///
/// `data` borrows from the parsed slice; elements are produced lazily and are
/// not retained past the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub kind: u8,
    pub data: &'a [u8],
}

impl<'a> AdStructure<'a> {
    pub fn category(&self) -> AdCategory {
        match self.kind {
            AD_TYPE_FLAGS => AdCategory::Flags,
            AD_TYPE_UUID16_INCOMPLETE => AdCategory::ServiceUuids16Incomplete,
            AD_TYPE_UUID16_COMPLETE => AdCategory::ServiceUuids16Complete,
            AD_TYPE_NAME_SHORTENED => AdCategory::ShortenedLocalName,
            AD_TYPE_NAME_COMPLETE => AdCategory::CompleteLocalName,
            AD_TYPE_MANUFACTURER => AdCategory::ManufacturerData,
            _ => AdCategory::Unknown,
        }
    }

    /// 16-bit service UUIDs for the UUID-list categories, little-endian
    /// pairs. A trailing odd byte is ignored.
    pub fn uuids16(&self) -> impl Iterator<Item = u16> + 'a {
        self.data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    }
}

/// Lazy iterator over the AD elements of `data`.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + 1 + len > self.data.len() {
            return None;
        }
        let kind = self.data[self.pos + 1];
        let data = &self.data[self.pos + 2..self.pos + 1 + len];
        self.pos += 1 + len;
        Some(AdStructure { kind, data })
    }
}

/// Walks the TLV advertising-data stream in `data`.
pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data, pos: 0 }
}
