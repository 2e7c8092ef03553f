//! Per-window arrival bookkeeping for TWCC feedback.

use std::collections::BTreeMap;

use rtcp::transport_feedbacks::transport_layer_cc::REFERENCE_TIME_UNIT_US;

use crate::seqnum::{classify, Cycle, SEQ_NUM_CYCLE};

/// Everything the feedback codec needs for one window: the extended base
/// sequence number, the floored reference time, and one delta slot per
/// sequence number in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackWindow {
    pub base_seq: u32,
    pub packet_status_count: u16,
    /// Arrival time of the base packet rounded down to a 64 ms multiple,
    /// in microseconds since the stream epoch.
    pub reference_time_us: i64,
    pub receive_deltas: Vec<Option<i64>>,
}

/// Maps extended sequence numbers to arrival timestamps for one feedback
/// window.
///
/// Promotion across 16-bit rollovers uses the same short-arc rule as the
/// jitter buffer's store, but this store has no release commitment: the
/// whole window is replaced after each feedback, so a packet from the cycle
/// below the base simply re-keys the stored entries one cycle up and takes
/// the bottom itself.
#[derive(Debug, Default)]
pub struct PacketInfoStore {
    base_seq: Option<u32>,
    max_seq: Option<u32>,
    seq_to_ts: BTreeMap<u32, i64>,
}

impl PacketInfoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.base_seq.is_none()
    }

    /// Forgets the current window.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records the arrival of `seq` at `arrival_us` microseconds since the
    /// stream epoch. The first arrival wins if the same sequence number
    /// shows up twice in one window.
    pub fn insert(&mut self, seq: u16, arrival_us: i64) {
        let index = match self.base_seq {
            None => u32::from(seq),
            Some(base) => {
                let roc = base >> 16;
                match classify(base as u16, seq) {
                    Cycle::Current => (roc << 16) | u32::from(seq),
                    Cycle::Next => ((roc + 1) << 16) | u32::from(seq),
                    Cycle::Previous => {
                        if roc == 0 {
                            self.shift_cycle_up();
                            u32::from(seq)
                        } else {
                            ((roc - 1) << 16) | u32::from(seq)
                        }
                    }
                }
            }
        };

        self.seq_to_ts.entry(index).or_insert(arrival_us);
        self.base_seq = Some(self.base_seq.map_or(index, |base| base.min(index)));
        self.max_seq = Some(self.max_seq.map_or(index, |max| max.max(index)));
    }

    fn shift_cycle_up(&mut self) {
        self.seq_to_ts = std::mem::take(&mut self.seq_to_ts)
            .into_iter()
            .map(|(index, ts)| (index + SEQ_NUM_CYCLE, ts))
            .collect();
        self.base_seq = self.base_seq.map(|base| base + SEQ_NUM_CYCLE);
        self.max_seq = self.max_seq.map(|max| max + SEQ_NUM_CYCLE);
    }

    /// Assembles the current window into codec input, or `None` while the
    /// store is empty.
    ///
    /// Each delta is the arrival time minus the previous received arrival,
    /// starting from the floored reference time; missing sequence numbers
    /// occupy a slot but do not advance the running timestamp.
    pub fn stats(&self) -> Option<FeedbackWindow> {
        let base = self.base_seq?;
        let max = self.max_seq?;

        let span = u64::from(max - base) + 1;
        let packet_status_count = if span > u64::from(u16::MAX) {
            log::warn!("feedback window of {span} statuses exceeds 16 bits, truncating");
            u16::MAX
        } else {
            span as u16
        };

        let base_ts = *self.seq_to_ts.get(&base)?;
        let reference_time_us = base_ts.div_euclid(REFERENCE_TIME_UNIT_US) * REFERENCE_TIME_UNIT_US;

        let mut receive_deltas = Vec::with_capacity(usize::from(packet_status_count));
        let mut previous_ts = reference_time_us;
        for index in base..base + u32::from(packet_status_count) {
            match self.seq_to_ts.get(&index) {
                Some(&ts) => {
                    receive_deltas.push(Some(ts - previous_ts));
                    previous_ts = ts;
                }
                None => receive_deltas.push(None),
            }
        }

        Some(FeedbackWindow {
            base_seq: base,
            packet_status_count,
            reference_time_us,
            receive_deltas,
        })
    }
}
