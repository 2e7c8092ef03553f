//! TWCC receiver handler: records arrivals and emits feedback payloads.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rtcp::transport_feedbacks::transport_layer_cc::{
    TransportLayerCc, REFERENCE_TIME_UNIT_US,
};
use rtp::extension::transport_cc_extension::TransportCcExtension;
use shared::error::Result;
use shared::marshal::Unmarshal;
use shared::Handler;

use super::packet_info::PacketInfoStore;
use crate::TaggedPacket;

/// Default interval between feedback reports.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Default header extension id carrying the transport-wide sequence number.
const DEFAULT_HDR_EXT_ID: u8 = 1;

/// Builder for [`TwccReceiver`].
///
/// # Example
///
/// ```ignore
/// let receiver = TwccReceiverBuilder::new()
///     .with_interval(Duration::from_millis(100))
///     .with_hdr_ext_id(5)
///     .build();
/// ```
pub struct TwccReceiverBuilder {
    interval: Duration,
    hdr_ext_id: u8,
}

impl Default for TwccReceiverBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            hdr_ext_id: DEFAULT_HDR_EXT_ID,
        }
    }
}

impl TwccReceiverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval between feedback reports.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the RTP header extension id that carries the transport-wide
    /// sequence number.
    pub fn with_hdr_ext_id(mut self, hdr_ext_id: u8) -> Self {
        self.hdr_ext_id = hdr_ext_id;
        self
    }

    pub fn build(self) -> TwccReceiver {
        TwccReceiver {
            interval: self.interval,
            hdr_ext_id: self.hdr_ext_id,
            store: PacketInfoStore::new(),
            fb_pkt_count: 0,
            start_time: None,
            next_timeout: None,
            read_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
        }
    }
}

/// Tracks transport-wide sequence numbers on inbound RTP packets and
/// periodically queues TWCC feedback payloads on the write side.
///
/// Packets pass through unchanged on the read side.
pub struct TwccReceiver {
    interval: Duration,
    hdr_ext_id: u8,
    store: PacketInfoStore,
    fb_pkt_count: u8,
    /// Stream epoch for arrival timestamps.
    start_time: Option<Instant>,
    next_timeout: Option<Instant>,
    read_queue: VecDeque<TaggedPacket>,
    write_queue: VecDeque<TransportLayerCc>,
}

impl TwccReceiver {
    fn build_feedback(&mut self) {
        let Some(window) = self.store.stats() else {
            return;
        };
        self.store.reset();

        self.write_queue.push_back(TransportLayerCc {
            base_sequence_number: window.base_seq as u16,
            packet_status_count: window.packet_status_count,
            reference_time: (window.reference_time_us / REFERENCE_TIME_UNIT_US) as u32,
            fb_pkt_count: self.fb_pkt_count,
            recv_deltas: window.receive_deltas,
        });
        self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);
    }
}

impl Handler for TwccReceiver {
    type Rin = TaggedPacket;
    type Rout = TaggedPacket;
    type Win = ();
    type Wout = TransportLayerCc;
    type Ein = ();
    type Eout = ();

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Some(ext_data) = msg.packet.header.get_extension(self.hdr_ext_id) {
            if let Ok(tcc) = TransportCcExtension::unmarshal(&mut ext_data.as_ref()) {
                if self.start_time.is_none() {
                    self.start_time = Some(msg.now);
                    self.next_timeout = Some(msg.now + self.interval);
                }
                let arrival_us = self
                    .start_time
                    .map(|start| msg.now.duration_since(start).as_micros() as i64)
                    .unwrap_or(0);
                self.store.insert(tcc.transport_sequence, arrival_us);
            }
        }

        self.read_queue.push_back(msg);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<TransportLayerCc> {
        self.write_queue.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some(timeout) = self.next_timeout {
            if now >= timeout {
                self.build_feedback();
                self.next_timeout = Some(now + self.interval);
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.next_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::marshal::Marshal;

    fn packet_with_twcc(seq: u16, twcc_seq: u16, hdr_ext_id: u8) -> rtp::Packet {
        let mut pkt = rtp::Packet {
            header: rtp::header::Header {
                sequence_number: seq,
                ..Default::default()
            },
            ..Default::default()
        };
        let tcc_ext = TransportCcExtension {
            transport_sequence: twcc_seq,
        };
        let ext_data = tcc_ext.marshal().unwrap();
        pkt.header.set_extension(hdr_ext_id, ext_data.freeze());
        pkt
    }

    fn tagged(pkt: rtp::Packet, now: Instant) -> TaggedPacket {
        TaggedPacket {
            now,
            arrival_ts: None,
            packet: pkt,
        }
    }

    #[test]
    fn test_no_timeout_before_first_packet() {
        let mut receiver = TwccReceiverBuilder::new().build();
        assert!(receiver.poll_timeout().is_none());
    }

    #[test]
    fn test_packets_pass_through() {
        let mut receiver = TwccReceiverBuilder::new().with_hdr_ext_id(5).build();
        let now = Instant::now();

        receiver
            .handle_read(tagged(packet_with_twcc(7, 0, 5), now))
            .unwrap();
        let out = receiver.poll_read().unwrap();
        assert_eq!(out.packet.header.sequence_number, 7);
        assert!(receiver.poll_read().is_none());
    }

    #[test]
    fn test_feedback_on_timeout() {
        let mut receiver = TwccReceiverBuilder::new()
            .with_interval(Duration::from_millis(100))
            .with_hdr_ext_id(5)
            .build();
        let base = Instant::now();

        for i in 0..4u16 {
            receiver
                .handle_read(tagged(
                    packet_with_twcc(i, i, 5),
                    base + Duration::from_millis(u64::from(i) * 10),
                ))
                .unwrap();
        }

        assert_eq!(receiver.poll_timeout(), Some(base + Duration::from_millis(100)));
        receiver
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();

        let feedback = receiver.poll_write().unwrap();
        assert_eq!(feedback.base_sequence_number, 0);
        assert_eq!(feedback.packet_status_count, 4);
        assert_eq!(feedback.fb_pkt_count, 0);
        assert_eq!(
            feedback.recv_deltas,
            vec![Some(0), Some(10_000), Some(10_000), Some(10_000)]
        );
    }

    #[test]
    fn test_packets_without_extension_are_ignored() {
        let mut receiver = TwccReceiverBuilder::new().with_hdr_ext_id(5).build();
        let now = Instant::now();

        let pkt = rtp::Packet::default();
        receiver.handle_read(tagged(pkt, now)).unwrap();

        assert!(receiver.poll_timeout().is_none());
        receiver
            .handle_timeout(now + Duration::from_millis(500))
            .unwrap();
        assert!(receiver.poll_write().is_none());
    }

    #[test]
    fn test_store_resets_between_windows() {
        let mut receiver = TwccReceiverBuilder::new()
            .with_interval(Duration::from_millis(100))
            .with_hdr_ext_id(5)
            .build();
        let base = Instant::now();

        receiver
            .handle_read(tagged(packet_with_twcc(0, 0, 5), base))
            .unwrap();
        receiver
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();
        let first = receiver.poll_write().unwrap();
        assert_eq!(first.fb_pkt_count, 0);
        assert_eq!(first.packet_status_count, 1);

        // Empty window: no feedback is produced.
        receiver
            .handle_timeout(base + Duration::from_millis(200))
            .unwrap();
        assert!(receiver.poll_write().is_none());

        receiver
            .handle_read(tagged(
                packet_with_twcc(1, 10, 5),
                base + Duration::from_millis(250),
            ))
            .unwrap();
        receiver
            .handle_timeout(base + Duration::from_millis(300))
            .unwrap();
        let second = receiver.poll_write().unwrap();
        assert_eq!(second.fb_pkt_count, 1);
        assert_eq!(second.base_sequence_number, 10);
        assert_eq!(second.packet_status_count, 1);
    }
}
