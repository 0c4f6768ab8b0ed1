//! Bounded nested pumping for host-loop mode
//!
//! When the application owns the event loop, a fetch cannot block on a
//! rendezvous that only the loop would fill. It drives the pump itself
//! until the reply arrives or the deadline passes.

use std::time::{Duration, Instant};

use lamco_selection_core::{Reply, SelectionKind, SelectionStore};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use tracing::warn;

use super::{min_timeout, poll_timeout, EventPump, PumpStatus};
use crate::clipboard::{ClipboardError, Result};

/// Pump until `done` returns true or `deadline` passes
///
/// Returns whether `done` was satisfied.
pub fn pump_until(pump: &dyn EventPump, deadline: Instant, mut done: impl FnMut() -> bool) -> Result<bool> {
    loop {
        if done() {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        pump.prepare()?;
        let wait = min_timeout(Some(deadline - now), pump.poll_timeout());
        {
            let mut fds = [PollFd::new(pump.fd(), PollFlags::POLLIN)];
            match poll(&mut fds, poll_timeout(wait)) {
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(ClipboardError::Driver(format!("poll failed: {}", e))),
            }
        }

        if pump.dispatch()? == PumpStatus::Exit {
            return Ok(done());
        }
    }
}

/// Wait for the reply to `serial` on `kind`, pumping the connection meanwhile
pub fn await_pumped(
    pump: &dyn EventPump,
    store: &SelectionStore,
    kind: SelectionKind,
    serial: u32,
    timeout: Duration,
) -> Option<Reply> {
    let mut reply = None;
    let deadline = Instant::now() + timeout;
    let pumped = pump_until(pump, deadline, || {
        if reply.is_none() {
            reply = store.try_take(kind, serial);
        }
        reply.is_some()
    });
    if let Err(e) = pumped {
        warn!("Nested pump for {} failed: {}", kind, e);
    }
    reply
}
