use std::time::Instant;

use crate::error::Result;

/// A sans-io stream processor.
///
/// A handler owns all of its state and is driven entirely from the outside:
/// the caller feeds it inbound messages (`handle_read`), outbound messages
/// (`handle_write`), control events (`handle_event`) and clock ticks
/// (`handle_timeout`), then drains whatever the handler produced through the
/// matching `poll_*` methods. Handlers never block, never spawn, and learn
/// the current time only from the `Instant`s handed to them.
///
/// Timers are cooperative: `poll_timeout` reports the earliest deadline the
/// handler cares about (if any), and the caller is expected to invoke
/// `handle_timeout` once that time has come.
pub trait Handler {
    /// Associated read input message type
    type Rin: 'static;
    /// Associated read output message type
    type Rout: 'static;
    /// Associated write input message type
    type Win: 'static;
    /// Associated write output message type
    type Wout: 'static;
    /// Associated event input message type
    type Ein: 'static;
    /// Associated event output message type
    type Eout: 'static;

    /// Handles an inbound message.
    fn handle_read(&mut self, msg: Self::Rin) -> Result<()>;

    /// Polls the next inbound output.
    fn poll_read(&mut self) -> Option<Self::Rout>;

    /// Handles an outbound message.
    fn handle_write(&mut self, msg: Self::Win) -> Result<()>;

    /// Polls the next outbound output.
    fn poll_write(&mut self) -> Option<Self::Wout>;

    /// Handles a control event.
    fn handle_event(&mut self, _evt: Self::Ein) -> Result<()> {
        Ok(())
    }

    /// Polls the next produced event.
    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    /// Handles a clock tick at `now`.
    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    /// Polls the earliest deadline this handler is waiting on.
    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }
}
