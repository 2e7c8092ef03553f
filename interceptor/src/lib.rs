//! Sans-io RTP receiver handlers.
//!
//! This crate hosts the two stream processors of the receiver core:
//!
//! - [`JitterBuffer`]: absorbs transport jitter up to a configured latency,
//!   re-orders packets by a 32-bit extended sequence index, signals losses
//!   as discontinuity events and keeps RFC 3550 receiver statistics.
//! - [`TwccReceiver`]: records transport-wide sequence-number arrivals and
//!   periodically emits transport-wide congestion control feedback payloads.
//!
//! Both are [`shared::Handler`]s: single-owner state machines driven by
//! `handle_read`/`handle_timeout` and drained through `poll_*`. They never
//! consult the clock themselves; every input carries its own `Instant`.

#![warn(rust_2018_idioms)]

use std::time::Instant;

pub mod jitter;
pub(crate) mod seqnum;
pub mod twcc;

pub use jitter::{
    JitterBuffer, JitterBufferBuilder, JitterBufferControl, JitterBufferEvent, JitterBufferStats,
};
pub use twcc::{TwccReceiver, TwccReceiverBuilder};

/// An RTP packet tagged with its receive timing.
///
/// `now` is the local monotonic time at which the packet is handed to a
/// handler. `arrival_ts` optionally carries an earlier arrival timestamp
/// recorded by the transport; when absent, `now` doubles as the arrival
/// time.
#[derive(Debug, Clone)]
pub struct TaggedPacket {
    pub now: Instant,
    pub arrival_ts: Option<Instant>,
    pub packet: rtp::Packet,
}
