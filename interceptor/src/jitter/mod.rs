//! A latency-bounded reordering jitter buffer.

mod stats;
mod store;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use shared::error::{Error, Result};
use shared::Handler;

use crate::TaggedPacket;
use stats::ReceptionStats;

pub use stats::JitterBufferStats;
pub use store::{PacketStore, StoreEntry, StoredPacket};

/// Events emitted on the read side, strictly ordered by extended sequence
/// index. A `Discontinuity` stands at the position of every index that was
/// skipped over as lost; `EndOfStream` is terminal.
#[derive(Debug, Clone)]
pub enum JitterBufferEvent {
    Packet(rtp::Packet),
    Discontinuity,
    EndOfStream,
}

/// Control inputs accepted by the jitter buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterBufferControl {
    /// Produce a [`JitterBufferStats`] snapshot on the event side.
    QueryStats,
    /// Flush everything buffered (gaps included) and terminate the stream.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Buffering everything while the initial latency period elapses.
    Waiting,
    /// Normal operation: insert, then release.
    Running,
    /// Terminal; all input and timer firings are ignored.
    Drained,
}

/// Builder for [`JitterBuffer`]. Latency and clock rate are both required.
///
/// # Example
///
/// ```ignore
/// let jb = JitterBufferBuilder::new()
///     .with_latency(Duration::from_millis(200))
///     .with_clock_rate(90_000)
///     .build()?;
/// ```
#[derive(Default)]
pub struct JitterBufferBuilder {
    latency: Option<Duration>,
    clock_rate: Option<u32>,
}

impl JitterBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long packets may dwell in the buffer waiting for their
    /// predecessors.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sets the RTP clock rate in Hz used for jitter computation.
    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = Some(clock_rate);
        self
    }

    pub fn build(self) -> Result<JitterBuffer> {
        let latency = self.latency.ok_or(Error::ErrLatencyNotSet)?;
        let clock_rate = self.clock_rate.ok_or(Error::ErrClockRateNotSet)?;

        Ok(JitterBuffer {
            latency,
            state: State::Waiting,
            store: PacketStore::new(),
            stats: ReceptionStats::new(clock_rate),
            start_time: None,
            initial_deadline: None,
            eviction_deadline: None,
            read_queue: VecDeque::new(),
            event_queue: VecDeque::new(),
        })
    }
}

/// Reorders RTP packets by extended sequence index, bounds their dwell time
/// by the configured latency, and keeps RFC 3550 receiver statistics.
///
/// The buffer starts in a waiting period of one latency, during which it
/// only accumulates. Once running, each insert releases the in-order prefix
/// immediately, and a lazily armed one-shot timer evicts whatever is stuck
/// behind a loss.
#[derive(Debug)]
pub struct JitterBuffer {
    latency: Duration,
    state: State,
    store: PacketStore,
    stats: ReceptionStats,
    /// Stream epoch: the time the first packet was observed.
    start_time: Option<Instant>,
    initial_deadline: Option<Instant>,
    eviction_deadline: Option<Instant>,
    read_queue: VecDeque<JitterBufferEvent>,
    event_queue: VecDeque<JitterBufferStats>,
}

impl JitterBuffer {
    /// Computes a statistics snapshot and rolls the loss interval forward.
    pub fn get_and_update_stats(&mut self) -> JitterBufferStats {
        let expected = match (self.store.first_index(), self.store.end_index()) {
            (Some(first), Some(end)) => u64::from(end - first) + 1,
            _ => 0,
        };
        self.stats.report(
            expected,
            self.store.received(),
            self.store.end_index().unwrap_or(0),
        )
    }

    /// One release cycle: evict overdue prefixes, then the in-order run,
    /// then re-arm the eviction timer if something is still buffered and no
    /// timer is outstanding.
    fn send_buffers(&mut self, now: Instant) {
        for entry in self.store.pop_older_than(now, self.latency) {
            self.read_queue.push_back(match entry {
                StoreEntry::Packet(stored) => JitterBufferEvent::Packet(stored.packet),
                StoreEntry::Gap => JitterBufferEvent::Discontinuity,
            });
        }
        for stored in self.store.pop_ordered() {
            self.read_queue.push_back(JitterBufferEvent::Packet(stored.packet));
        }

        if self.eviction_deadline.is_none() {
            if let Some(first_inserted_at) = self.store.first_inserted_at() {
                let send_after = self
                    .latency
                    .saturating_sub(now.duration_since(first_inserted_at));
                self.eviction_deadline = Some(now + send_after);
            }
        }
    }

    fn end_of_stream(&mut self) {
        for entry in self.store.dump() {
            self.read_queue.push_back(match entry {
                StoreEntry::Packet(stored) => JitterBufferEvent::Packet(stored.packet),
                StoreEntry::Gap => JitterBufferEvent::Discontinuity,
            });
        }
        self.read_queue.push_back(JitterBufferEvent::EndOfStream);
        self.state = State::Drained;
        self.initial_deadline = None;
        self.eviction_deadline = None;
    }
}

impl Handler for JitterBuffer {
    type Rin = TaggedPacket;
    type Rout = JitterBufferEvent;
    type Win = ();
    type Wout = ();
    type Ein = JitterBufferControl;
    type Eout = JitterBufferStats;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        if self.state == State::Drained {
            log::warn!(
                "dropping packet seq={} received after end-of-stream",
                msg.packet.header.sequence_number
            );
            return Ok(());
        }

        let now = msg.now;
        if self.start_time.is_none() {
            self.start_time = Some(now);
            self.initial_deadline = Some(now + self.latency);
        }

        let arrival = msg.arrival_ts.unwrap_or(now);
        let elapsed = self
            .start_time
            .map(|start| arrival.duration_since(start))
            .unwrap_or_default();
        self.stats.update_jitter(elapsed, msg.packet.header.timestamp);

        let seq = msg.packet.header.sequence_number;
        match self.store.insert(msg.packet, now) {
            Ok(_) => {}
            Err(err @ (Error::ErrLatePacket | Error::ErrDuplicatePacket)) => {
                log::warn!("dropping packet seq={seq}: {err}");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if self.state == State::Running {
            self.send_buffers(now);
        }
        Ok(())
    }

    fn poll_read(&mut self) -> Option<JitterBufferEvent> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<()> {
        None
    }

    fn handle_event(&mut self, evt: JitterBufferControl) -> Result<()> {
        match evt {
            JitterBufferControl::QueryStats => {
                let report = self.get_and_update_stats();
                self.event_queue.push_back(report);
            }
            JitterBufferControl::EndOfStream => {
                if self.state != State::Drained {
                    self.end_of_stream();
                }
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<JitterBufferStats> {
        self.event_queue.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        match self.state {
            State::Waiting => {
                if let Some(deadline) = self.initial_deadline {
                    if now >= deadline {
                        self.initial_deadline = None;
                        self.state = State::Running;
                        self.send_buffers(now);
                    }
                }
            }
            State::Running => {
                if let Some(deadline) = self.eviction_deadline {
                    if now >= deadline {
                        self.eviction_deadline = None;
                        self.send_buffers(now);
                    }
                }
            }
            // Stray firings after teardown are expected and ignored.
            State::Drained => {}
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        match self.state {
            State::Waiting => self.initial_deadline,
            State::Running => self.eviction_deadline,
            State::Drained => None,
        }
    }
}
