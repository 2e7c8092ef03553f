//! RFC 3550 receiver statistics: interarrival jitter (appendix A.8) and
//! interval loss accounting (appendix A.3).

use std::time::Duration;

/// Statistics snapshot produced on demand by the jitter buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterBufferStats {
    /// Fraction of packets lost since the previous snapshot. Zero when the
    /// interval is empty or the loss count is non-positive.
    pub fraction_lost: f64,
    /// Cumulative loss, clamped to the signed 24-bit range.
    pub total_lost: i32,
    /// Highest extended sequence index seen so far.
    pub highest_seq_num: u32,
    /// Smoothed interarrival jitter, in RTP clock ticks.
    pub interarrival_jitter: f64,
}

/// Running reception statistics for a single stream.
#[derive(Debug)]
pub(crate) struct ReceptionStats {
    clock_rate: f64,
    expected_prior: u64,
    received_prior: u64,
    last_transit: Option<i64>,
    jitter: f64,
}

impl ReceptionStats {
    pub(crate) fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate: f64::from(clock_rate),
            expected_prior: 0,
            received_prior: 0,
            last_transit: None,
            jitter: 0.0,
        }
    }

    /// Folds one arrival into the jitter estimate.
    ///
    /// `arrival` is the arrival time relative to the stream epoch; it is
    /// converted to RTP clock ticks so the relative transit can be compared
    /// against the packet's RTP timestamp.
    /// <https://tools.ietf.org/html/rfc3550#appendix-A.8>
    pub(crate) fn update_jitter(&mut self, arrival: Duration, rtp_timestamp: u32) {
        let arrival_ticks = (arrival.as_secs_f64() * self.clock_rate) as i64;
        let transit = arrival_ticks - i64::from(rtp_timestamp);

        if let Some(last_transit) = self.last_transit {
            let d = (transit - last_transit).abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.last_transit = Some(transit);
    }

    /// Produces a snapshot and rolls the interval counters forward.
    pub(crate) fn report(
        &mut self,
        expected: u64,
        received: u64,
        highest_seq_num: u32,
    ) -> JitterBufferStats {
        let lost = expected as i64 - received as i64;
        let total_lost = lost.clamp(-(1 << 23), (1 << 23) - 1) as i32;

        let expected_interval = expected - self.expected_prior;
        let received_interval = received - self.received_prior;
        let lost_interval = expected_interval as i64 - received_interval as i64;

        let fraction_lost = if expected_interval == 0 || lost_interval <= 0 {
            0.0
        } else {
            lost_interval as f64 / expected_interval as f64
        };

        self.expected_prior = expected;
        self.received_prior = received;

        JitterBufferStats {
            fraction_lost,
            total_lost,
            highest_seq_num,
            interarrival_jitter: self.jitter,
        }
    }
}
