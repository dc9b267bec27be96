//! The synchronous capture pull loop.
//!
//! One dedicated task repeatedly deframes the serial stream and feeds each
//! frame through the decode pipeline before requesting the next one. All
//! packet structures are owned by the current iteration; the only state that
//! crosses iterations is the outbound command counter and the follow latch.
//!
//! Error policy follows the protocol taxonomy: transport failures end the
//! loop, everything else is isolated to the frame that produced it.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::record::CaptureRecord;
use bluewire_protocol::{
    decode_frame, ByteSink, ByteSource, CapturedPdu, CommandBuilder, DecodedPacket, Deframer,
    DeviceAddress, FollowFilter, ProtocolError,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Counters accumulated over one capture run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CaptureStats {
    /// Frames successfully deframed.
    pub frames: u64,
    /// Capture events decoded into records.
    pub packets: u64,
    /// Non-capture envelopes surfaced as diagnostics.
    pub diagnostics: u64,
    /// Frames or packets dropped by a recoverable failure.
    pub dropped: u64,
    /// Per-frame deadline expiries.
    pub timeouts: u64,
}

/// Operator-configured target to steer the sniffer onto.
#[derive(Debug, Clone, Copy)]
pub struct FollowTarget {
    pub address: DeviceAddress,
    pub filter: FollowFilter,
}

/// The capture loop: transport, deframer, decode pipeline, follow trigger.
pub struct Sniffer<T: ByteSource + ByteSink> {
    transport: T,
    deframer: Deframer,
    commands: CommandBuilder,
    follow: Option<FollowTarget>,
    following: bool,
    stop: Arc<AtomicBool>,
    stats: CaptureStats,
}

impl<T: ByteSource + ByteSink> Sniffer<T> {
    pub fn new(transport: T, config: &CaptureConfig, stop: Arc<AtomicBool>) -> Self {
        let follow = config.follow.as_ref().map(|f| FollowTarget {
            address: f.address,
            filter: f.filter,
        });
        Self {
            transport,
            deframer: Deframer::new(config.framing.frame_timeout()),
            commands: CommandBuilder::new(),
            follow,
            following: false,
            stop,
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Runs the pull loop until the stop signal is raised or the transport
    /// fails, handing each record to `emit`.
    ///
    /// The stop signal is checked between frames; no cancellation happens
    /// mid-frame. Malformed frames are never retried — the loop always moves
    /// on to the next frame in the stream.
    pub fn run<F>(&mut self, mut emit: F) -> Result<CaptureStats, CaptureError>
    where
        F: FnMut(CaptureRecord),
    {
        while !self.stop.load(Ordering::Relaxed) {
            let frame = match self.deframer.read_frame(&mut self.transport) {
                Ok(frame) => frame,
                Err(err @ ProtocolError::Transport(_)) => {
                    tracing::error!(%err, "capture loop stopping");
                    return Err(err.into());
                }
                Err(ProtocolError::FrameTimeout) => {
                    self.stats.timeouts += 1;
                    tracing::trace!("frame deadline expired, resynchronizing");
                    continue;
                }
                Err(err) => {
                    self.stats.dropped += 1;
                    tracing::warn!(%err, "frame discarded, resynchronizing");
                    continue;
                }
            };
            self.stats.frames += 1;

            match decode_frame(&frame) {
                Ok(DecodedPacket::Advertising(captured)) => {
                    self.maybe_follow(&captured)?;
                    self.stats.packets += 1;
                    emit(CaptureRecord::advertising(&captured, &frame));
                }
                Ok(DecodedPacket::Data(captured)) => {
                    self.stats.packets += 1;
                    emit(CaptureRecord::data(&captured, &frame));
                }
                Ok(DecodedPacket::Diagnostic(envelope)) => {
                    self.stats.diagnostics += 1;
                    tracing::debug!(
                        packet_type = %envelope.packet_type,
                        counter = envelope.counter,
                        "diagnostic envelope"
                    );
                    emit(CaptureRecord::diagnostic(&envelope, &frame));
                }
                Ok(DecodedPacket::Invalid {
                    envelope,
                    ble_header_length,
                }) => {
                    self.stats.dropped += 1;
                    tracing::warn!(
                        ble_header_length,
                        counter = envelope.counter,
                        "capture rejected by header-length gate"
                    );
                }
                Err(err) => {
                    self.stats.dropped += 1;
                    tracing::warn!(%err, "packet dropped");
                }
            }
        }

        tracing::info!("capture loop stopped");
        Ok(self.stats)
    }

    /// Sends the follow request once a decoded advertiser matches the
    /// configured target. The request is sent once per run; the sniffer
    /// stays locked on the target afterwards.
    fn maybe_follow(&mut self, captured: &CapturedPdu) -> Result<(), CaptureError> {
        let Some(target) = self.follow else {
            return Ok(());
        };
        if self.following || captured.pdu.advertiser_address != Some(target.address) {
            return Ok(());
        }

        let framed = self.commands.follow(target.address, target.filter);
        self.transport
            .write_all(&framed)
            .map_err(ProtocolError::Transport)?;
        self.following = true;
        tracing::info!(address = %target.address, "follow request sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FollowConfig;
    use bluewire_protocol::{enframe, BLE_HEADER_LENGTH};
    use std::collections::VecDeque;
    use std::io;

    /// Scripted transport: replays queued reads, records writes, then either
    /// idles (timeouts) or fails.
    struct ScriptTransport {
        reads: VecDeque<Option<u8>>,
        writes: Vec<Vec<u8>>,
        fail_when_exhausted: bool,
    }

    impl ScriptTransport {
        fn new(streams: &[&[u8]], fail_when_exhausted: bool) -> Self {
            let reads = streams
                .iter()
                .flat_map(|s| s.iter().map(|&b| Some(b)))
                .collect();
            Self {
                reads,
                writes: Vec::new(),
                fail_when_exhausted,
            }
        }
    }

    impl ByteSource for ScriptTransport {
        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            match self.reads.pop_front() {
                Some(read) => Ok(read),
                None if self.fail_when_exhausted => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
                }
                None => Ok(None),
            }
        }
    }

    impl ByteSink for ScriptTransport {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }
    }

    fn quick_config() -> CaptureConfig {
        let mut config = CaptureConfig::default();
        config.framing.frame_timeout_ms = 20;
        config
    }

    fn adv_frame(advertiser_wire: [u8; 6]) -> Vec<u8> {
        let mut ble = 0x8E89_BED6u32.to_le_bytes().to_vec();
        ble.push(0x40);
        ble.push(6);
        ble.push(0xEE); // padding
        ble.extend_from_slice(&advertiser_wire);

        let mut payload = vec![BLE_HEADER_LENGTH, 0x01, 37, 0x28, 0, 0, 0, 0, 0, 0];
        payload.extend_from_slice(&ble);
        let len = (payload.len() as u16).to_le_bytes();
        let mut frame = vec![len[0], len[1], 0x02, 0x01, 0x00, 0x02];
        frame.extend_from_slice(&payload);
        frame
    }

    fn run_until(
        transport: ScriptTransport,
        config: &CaptureConfig,
        expected_records: usize,
    ) -> (Sniffer<ScriptTransport>, Vec<CaptureRecord>, Result<CaptureStats, CaptureError>) {
        let stop = Arc::new(AtomicBool::new(false));
        let mut sniffer = Sniffer::new(transport, config, stop.clone());
        let mut records = Vec::new();
        let result = sniffer.run(|record| {
            records.push(record);
            if records.len() >= expected_records {
                stop.store(true, Ordering::Relaxed);
            }
        });
        (sniffer, records, result)
    }

    #[test]
    fn test_emits_record_then_stops_on_signal() {
        let framed = enframe(&adv_frame([0x2A, 0x00, 0xEF, 0xBE, 0xAD, 0xDE]));
        let transport = ScriptTransport::new(&[framed.as_slice()], false);
        let (_, records, result) = run_until(transport, &quick_config(), 1);

        let stats = result.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "advertising");
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.packets, 1);
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let framed = enframe(&adv_frame([1, 2, 3, 4, 5, 6]));
        let transport = ScriptTransport::new(&[framed.as_slice()], true);
        let stop = Arc::new(AtomicBool::new(false));
        let mut sniffer = Sniffer::new(transport, &quick_config(), stop);

        let mut count = 0usize;
        let err = sniffer.run(|_| count += 1).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Protocol(ProtocolError::Transport(_))
        ));
        assert_eq!(count, 1);
        assert_eq!(sniffer.stats().frames, 1);
    }

    #[test]
    fn test_corrupt_frame_dropped_stream_continues() {
        // A frame with an invalid escape sequence, then a valid capture.
        let bad = [0xAB, 0x01, 0xCD, 0x42];
        let good = enframe(&adv_frame([1, 2, 3, 4, 5, 6]));
        let transport = ScriptTransport::new(&[bad.as_slice(), good.as_slice()], false);
        let (sniffer, records, result) = run_until(transport, &quick_config(), 1);

        assert!(result.is_ok());
        assert_eq!(records.len(), 1);
        assert_eq!(sniffer.stats().dropped, 1);
    }

    #[test]
    fn test_invalid_header_gate_emits_nothing() {
        let mut frame = adv_frame([1, 2, 3, 4, 5, 6]);
        frame[6] = 9; // corrupt the metadata header length
        let good = adv_frame([6, 5, 4, 3, 2, 1]);
        let bad_framed = enframe(&frame);
        let good_framed = enframe(&good);
        let transport =
            ScriptTransport::new(&[bad_framed.as_slice(), good_framed.as_slice()], false);
        let (sniffer, records, result) = run_until(transport, &quick_config(), 1);

        assert!(result.is_ok());
        assert_eq!(records.len(), 1);
        let stats = sniffer.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.packets, 1);
    }

    #[test]
    fn test_follow_sent_once_on_match() {
        let target: DeviceAddress = "DE:AD:BE:EF:00:2A".parse().unwrap();
        let wire = target.to_wire();
        let other = enframe(&adv_frame([9, 9, 9, 9, 9, 9]));
        let matching = enframe(&adv_frame(wire));
        let transport = ScriptTransport::new(
            &[other.as_slice(), matching.as_slice(), matching.as_slice()],
            false,
        );

        let mut config = quick_config();
        config.follow = Some(FollowConfig {
            address: target,
            filter: FollowFilter {
                advertisements_only: true,
                ..Default::default()
            },
        });
        let (sniffer, records, result) = run_until(transport, &config, 3);

        assert!(result.is_ok());
        assert_eq!(records.len(), 3);
        let writes = &sniffer.transport.writes;
        assert_eq!(writes.len(), 1, "follow request must be sent exactly once");

        let expected = CommandBuilder::new().follow(
            target,
            FollowFilter {
                advertisements_only: true,
                ..Default::default()
            },
        );
        assert_eq!(writes[0], expected);
    }

    #[test]
    fn test_diagnostic_envelope_emitted() {
        let ping = enframe(&[0x00, 0x00, 0x01, 0x02, 0x00, 0x0E]);
        let transport = ScriptTransport::new(&[ping.as_slice()], false);
        let (sniffer, records, result) = run_until(transport, &quick_config(), 1);

        assert!(result.is_ok());
        assert_eq!(records[0].event, "diagnostic");
        assert_eq!(records[0].packet_type, "ping-response");
        assert_eq!(sniffer.stats().diagnostics, 1);
    }
}
