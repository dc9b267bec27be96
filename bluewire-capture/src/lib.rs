//! # bluewire-capture
//!
//! Receive-side capture pipeline for the bluewire sniffer: a single-threaded
//! pull loop that deframes the serial byte stream, decodes each packet, and
//! hands printable records to a consumer callback. The loop also sends the
//! one outbound command the pipeline needs: a follow request, once a decoded
//! advertiser matches the operator-configured target.

pub mod capture;
pub mod config;
pub mod error;
pub mod record;
pub mod transport;

pub use capture::{CaptureStats, FollowTarget, Sniffer};
pub use config::{CaptureConfig, ConfigError, FollowConfig, FramingConfig, TransportConfig};
pub use error::CaptureError;
pub use record::{AdElement, CaptureRecord, PduSummary, RadioSummary};
pub use transport::SerialTransport;
