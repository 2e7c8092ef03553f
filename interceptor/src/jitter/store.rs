//! Ordered sparse storage for out-of-order RTP packets.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use shared::error::{Error, Result};

use crate::seqnum::{classify, Cycle, SEQ_NUM_CYCLE};

/// A buffered packet together with its extended sequence index and the
/// local time at which it entered the store.
#[derive(Debug, Clone)]
pub struct StoredPacket {
    pub index: u32,
    pub inserted_at: Instant,
    pub packet: rtp::Packet,
}

/// One position of a drained prefix: either a buffered packet or a marker
/// for an index that was never received.
#[derive(Debug, Clone)]
pub enum StoreEntry {
    Packet(StoredPacket),
    Gap,
}

/// An ordered, sparse store of RTP packets keyed by a 32-bit extended
/// sequence index.
///
/// Arriving 16-bit wire sequence numbers are promoted onto a monotonically
/// increasing index by tracking rollovers against the next expected index.
/// The store keeps a committed lower water mark: once an index has been
/// drained (or skipped over as lost), nothing at or below it is accepted
/// again.
#[derive(Debug, Default)]
pub struct PacketStore {
    packets: BTreeMap<u32, StoredPacket>,
    /// Index of the most recently drained or skipped packet. `None` stands
    /// in for "one below `first_index`" until the first drain, which keeps
    /// a first packet with sequence number 0 free of sentinel arithmetic.
    base_index: Option<u32>,
    /// Index of the first packet ever accepted, for expected-count stats.
    first_index: Option<u32>,
    /// Highest index ever accepted.
    end_index: Option<u32>,
    /// Count of accepted packets since inception.
    received: u64,
}

impl PacketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index right after the water mark, i.e. the next index that
    /// `pop_ordered` would emit.
    fn next_index(&self) -> u32 {
        match self.base_index {
            Some(base) => base + 1,
            None => 0,
        }
    }

    /// Promotes `seq` to an extended index relative to the next expected
    /// index and inserts the packet.
    ///
    /// Returns the assigned index, `ErrLatePacket` for an index at or below
    /// the water mark, or `ErrDuplicatePacket` for an index already
    /// buffered.
    pub fn insert(&mut self, packet: rtp::Packet, now: Instant) -> Result<u32> {
        let seq = packet.header.sequence_number;

        let index = match self.first_index {
            None => u32::from(seq),
            Some(first) => {
                let next = self.next_index();
                let roc = next >> 16;
                match classify(next as u16, seq) {
                    Cycle::Current => (roc << 16) | u32::from(seq),
                    Cycle::Next => ((roc + 1) << 16) | u32::from(seq),
                    Cycle::Previous => {
                        // A packet from the cycle below the reference can
                        // only be accommodated while no release has been
                        // observed; afterwards the water mark is committed
                        // and the packet is simply late.
                        if next != first {
                            return Err(Error::ErrLatePacket);
                        }
                        let index = if roc == 0 {
                            // No room below cycle 0: lift everything stored
                            // one cycle up and take its place.
                            self.shift_cycle_up();
                            u32::from(seq)
                        } else {
                            ((roc - 1) << 16) | u32::from(seq)
                        };
                        self.first_index = Some(index);
                        self.base_index = index.checked_sub(1);
                        index
                    }
                }
            }
        };

        if let Some(base) = self.base_index {
            if index <= base {
                return Err(Error::ErrLatePacket);
            }
        }
        if self.packets.contains_key(&index) {
            return Err(Error::ErrDuplicatePacket);
        }

        if self.first_index.is_none() {
            self.first_index = Some(index);
            self.base_index = index.checked_sub(1);
        }
        self.end_index = Some(self.end_index.map_or(index, |end| end.max(index)));
        self.received += 1;
        self.packets.insert(
            index,
            StoredPacket {
                index,
                inserted_at: now,
                packet,
            },
        );

        Ok(index)
    }

    fn shift_cycle_up(&mut self) {
        self.packets = std::mem::take(&mut self.packets)
            .into_iter()
            .map(|(index, mut stored)| {
                stored.index = index + SEQ_NUM_CYCLE;
                (stored.index, stored)
            })
            .collect();
        self.base_index = self.base_index.map(|base| base + SEQ_NUM_CYCLE);
        self.first_index = self.first_index.map(|first| first + SEQ_NUM_CYCLE);
        self.end_index = self.end_index.map(|end| end + SEQ_NUM_CYCLE);
    }

    /// Pops the contiguous run of packets starting right after the water
    /// mark, stopping at the first missing index.
    pub fn pop_ordered(&mut self) -> Vec<StoredPacket> {
        let mut ordered = Vec::new();
        loop {
            let next = self.next_index();
            let Some(stored) = self.packets.remove(&next) else {
                break;
            };
            self.base_index = Some(next);
            ordered.push(stored);
        }
        ordered
    }

    /// Drains every prefix whose oldest packet has dwelt in the store for
    /// at least `latency`, emitting a [`StoreEntry::Gap`] for each index
    /// skipped over. Dwell time is wall-clock time since insertion, not
    /// media time.
    pub fn pop_older_than(&mut self, now: Instant, latency: Duration) -> Vec<StoreEntry> {
        let mut entries = Vec::new();
        loop {
            let (lowest, inserted_at) = match self.packets.first_key_value() {
                Some((&index, stored)) => (index, stored.inserted_at),
                None => break,
            };
            if now.duration_since(inserted_at) < latency {
                break;
            }

            let mut next = self.next_index();
            while next < lowest {
                entries.push(StoreEntry::Gap);
                self.base_index = Some(next);
                next += 1;
            }
            if let Some(stored) = self.packets.remove(&lowest) {
                entries.push(StoreEntry::Packet(stored));
            }
            self.base_index = Some(lowest);
        }
        entries
    }

    /// Drains everything left in the store in order, gap markers included,
    /// leaving the store empty.
    pub fn dump(&mut self) -> Vec<StoreEntry> {
        let mut entries = Vec::new();
        let Some(end) = self.end_index else {
            return entries;
        };

        let mut next = self.next_index();
        while next <= end {
            match self.packets.remove(&next) {
                Some(stored) => entries.push(StoreEntry::Packet(stored)),
                None => entries.push(StoreEntry::Gap),
            }
            self.base_index = Some(next);
            next += 1;
        }
        entries
    }

    /// Insertion time of the lowest-index packet still buffered.
    pub fn first_inserted_at(&self) -> Option<Instant> {
        self.packets
            .first_key_value()
            .map(|(_, stored)| stored.inserted_at)
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn first_index(&self) -> Option<u32> {
        self.first_index
    }

    pub fn end_index(&self) -> Option<u32> {
        self.end_index
    }
}
