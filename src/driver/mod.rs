//! Event loop scheduling
//!
//! A backend's connection is driven either by a dedicated event thread
//! ([`ThreadDriver`]) or by the embedding application's own loop through
//! the [`EventPump`] hooks. Fetches issued in host-loop mode pump the
//! connection themselves, bounded by a deadline ([`pump_until`]).
//!
//! Host loops built on tokio can use [`drive_async`].

use std::os::fd::BorrowedFd;
use std::time::Duration;

use crate::clipboard::Result;

mod async_fd;
mod nested;
mod thread;

pub use async_fd::drive_async;
pub use nested::{await_pumped, pump_until};
pub use thread::ThreadDriver;

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// Keep polling
    Continue,
    /// The connection is finished (shut down or lost)
    Exit,
}

/// Hooks a host event loop calls to drive a backend connection
///
/// The loop calls [`prepare`](Self::prepare) before it blocks, waits for
/// [`fd`](Self::fd) to become readable (or for [`poll_timeout`](Self::poll_timeout)
/// to elapse), then calls [`dispatch`](Self::dispatch).
pub trait EventPump: Send + Sync {
    /// File descriptor to watch for readability
    fn fd(&self) -> BorrowedFd<'_>;

    /// Flush outgoing requests before blocking
    fn prepare(&self) -> Result<()>;

    /// Read and handle every event available without blocking
    fn dispatch(&self) -> Result<PumpStatus>;

    /// Upper bound on one wait, for connections that buffer events
    /// internally where the fd alone does not show them
    fn poll_timeout(&self) -> Option<Duration> {
        None
    }
}

pub(crate) fn poll_timeout(timeout: Option<Duration>) -> nix::poll::PollTimeout {
    match timeout {
        Some(timeout) => {
            nix::poll::PollTimeout::try_from(timeout).unwrap_or(nix::poll::PollTimeout::MAX)
        }
        None => nix::poll::PollTimeout::NONE,
    }
}

/// Shorter of two optional waits
pub(crate) fn min_timeout(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_timeout() {
        let short = Some(Duration::from_millis(10));
        let long = Some(Duration::from_millis(20));
        assert_eq!(min_timeout(short, long), short);
        assert_eq!(min_timeout(None, long), long);
        assert_eq!(min_timeout(short, None), short);
        assert_eq!(min_timeout(None, None), None);
    }
}
