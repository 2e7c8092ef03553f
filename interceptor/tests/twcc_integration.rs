//! Integration tests for TWCC feedback generation.
//!
//! These tests verify that the receiver handler:
//! - Extracts transport-wide sequence numbers from the header extension
//! - Builds feedback windows covering losses and reordering
//! - Produces payloads that survive a marshal/unmarshal round trip

use std::time::{Duration, Instant};

use interceptor::twcc::TRANSPORT_CC_URI;
use interceptor::{TaggedPacket, TwccReceiverBuilder};
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use rtp::extension::transport_cc_extension::TransportCcExtension;
use shared::marshal::{Marshal, Unmarshal};
use shared::Handler;

const EXT_ID: u8 = 5;
const INTERVAL: Duration = Duration::from_millis(100);

fn rtp_packet_with_twcc(seq: u16, twcc_seq: u16) -> rtp::Packet {
    let mut pkt = rtp::Packet {
        header: rtp::header::Header {
            sequence_number: seq,
            ssrc: 0x2222_2222,
            payload_type: 96,
            ..Default::default()
        },
        payload: vec![0u8; 100].into(),
    };
    let ext = TransportCcExtension {
        transport_sequence: twcc_seq,
    };
    pkt.header
        .set_extension(EXT_ID, ext.marshal().unwrap().freeze());
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
fn test_uri_matches_draft() {
    assert!(TRANSPORT_CC_URI.contains("transport-wide-cc-extensions-01"));
}

#[test]
fn test_feedback_covers_received_packets() {
    let mut receiver = TwccReceiverBuilder::new()
        .with_interval(INTERVAL)
        .with_hdr_ext_id(EXT_ID)
        .build();
    let base = Instant::now();

    for i in 0..5u16 {
        receiver
            .handle_read(tagged(
                rtp_packet_with_twcc(i, i),
                base + Duration::from_millis(u64::from(i) * 10),
            ))
            .unwrap();
    }
    while receiver.poll_read().is_some() {}

    receiver.handle_timeout(base + INTERVAL).unwrap();

    let feedback = receiver.poll_write().expect("feedback should be generated");
    assert_eq!(feedback.base_sequence_number, 0);
    assert_eq!(feedback.packet_status_count, 5);
    assert!(feedback.recv_deltas.iter().all(Option::is_some));
}

#[test]
fn test_feedback_marks_missing_packets() {
    let mut receiver = TwccReceiverBuilder::new()
        .with_interval(INTERVAL)
        .with_hdr_ext_id(EXT_ID)
        .build();
    let base = Instant::now();

    for (i, twcc_seq) in [0u16, 1, 4, 5].iter().enumerate() {
        receiver
            .handle_read(tagged(
                rtp_packet_with_twcc(i as u16, *twcc_seq),
                base + Duration::from_millis(i as u64 * 10),
            ))
            .unwrap();
    }
    while receiver.poll_read().is_some() {}

    receiver.handle_timeout(base + INTERVAL).unwrap();

    let feedback = receiver.poll_write().unwrap();
    assert_eq!(feedback.packet_status_count, 6);
    let received: Vec<bool> = feedback
        .recv_deltas
        .iter()
        .map(Option::is_some)
        .collect();
    assert_eq!(received, vec![true, true, false, false, true, true]);
}

#[test]
fn test_feedback_payload_roundtrip() {
    let mut receiver = TwccReceiverBuilder::new()
        .with_interval(INTERVAL)
        .with_hdr_ext_id(EXT_ID)
        .build();
    let base = Instant::now();

    // Losses, a burst, and a straggler across a rollover.
    let arrivals: &[(u16, u64)] = &[
        (65_533, 0),
        (65_534, 5),
        (0, 12),
        (65_535, 15),
        (3, 30),
    ];
    for (twcc_seq, offset_ms) in arrivals {
        receiver
            .handle_read(tagged(
                rtp_packet_with_twcc(0, *twcc_seq),
                base + Duration::from_millis(*offset_ms),
            ))
            .unwrap();
    }
    while receiver.poll_read().is_some() {}

    receiver.handle_timeout(base + INTERVAL).unwrap();
    let feedback = receiver.poll_write().unwrap();
    assert_eq!(feedback.base_sequence_number, 65_533);
    // 65533..=65535 then 0..=3 of the next cycle.
    assert_eq!(feedback.packet_status_count, 7);

    let raw = feedback.marshal().unwrap();
    assert_eq!(raw.len() % 4, 0);
    let decoded = TransportLayerCc::unmarshal(&mut raw.freeze()).unwrap();
    assert_eq!(decoded, feedback);
}

#[test]
fn test_feedback_packet_count_wraps() {
    let mut receiver = TwccReceiverBuilder::new()
        .with_interval(INTERVAL)
        .with_hdr_ext_id(EXT_ID)
        .build();
    let base = Instant::now();

    let mut now = base;
    for round in 0..258u32 {
        receiver
            .handle_read(tagged(rtp_packet_with_twcc(0, round as u16), now))
            .unwrap();
        while receiver.poll_read().is_some() {}
        now += INTERVAL;
        receiver.handle_timeout(now).unwrap();
    }

    let mut last = None;
    while let Some(feedback) = receiver.poll_write() {
        last = Some(feedback.fb_pkt_count);
    }
    // 258 feedbacks: the u8 counter wraps to 1.
    assert_eq!(last, Some(1));
}

#[test]
fn test_quantized_deltas_survive_the_wire() {
    let mut receiver = TwccReceiverBuilder::new()
        .with_interval(INTERVAL)
        .with_hdr_ext_id(EXT_ID)
        .build();
    let base = Instant::now();

    // All arrival offsets are multiples of 250us, so the wire loses
    // nothing.
    for i in 0..4u16 {
        receiver
            .handle_read(tagged(
                rtp_packet_with_twcc(i, i),
                base + Duration::from_micros(u64::from(i) * 2_500),
            ))
            .unwrap();
    }
    while receiver.poll_read().is_some() {}

    receiver.handle_timeout(base + INTERVAL).unwrap();
    let feedback = receiver.poll_write().unwrap();

    let raw = feedback.marshal().unwrap();
    let decoded = TransportLayerCc::unmarshal(&mut raw.freeze()).unwrap();
    assert_eq!(decoded.recv_deltas, feedback.recv_deltas);
    assert_eq!(
        decoded.recv_deltas,
        vec![Some(0), Some(2_500), Some(2_500), Some(2_500)]
    );
}
