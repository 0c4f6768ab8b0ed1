//! Bounded rendezvous between the event side and a waiting caller.
//!
//! A waiter arms the rendezvous with a ticket, asks the peer for something
//! and waits. The event side publishes the answer under the same ticket.
//! Publishes carrying any other ticket are dropped, so a late reply to an
//! abandoned request can never satisfy a newer one.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Ticket value that never matches an armed rendezvous
pub const NO_TICKET: u32 = 0;

#[derive(Debug)]
struct State<T> {
    ticket: u32,
    value: Option<T>,
}

/// Value slot with `publish` / bounded `wait`
#[derive(Debug)]
pub struct Rendezvous<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rendezvous<T> {
    /// Create a disarmed rendezvous
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                ticket: NO_TICKET,
                value: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Expect a value under `ticket`, discarding anything pending
    pub fn arm(&self, ticket: u32) {
        let mut state = self.state.lock();
        state.ticket = ticket;
        state.value = None;
    }

    /// Stop accepting values
    pub fn disarm(&self) {
        self.arm(NO_TICKET);
    }

    /// Ticket currently armed, [`NO_TICKET`] when idle
    pub fn ticket(&self) -> u32 {
        self.state.lock().ticket
    }

    /// Hand a value to the waiter armed with `ticket`
    ///
    /// Returns false when the ticket does not match. A newer publish under
    /// the same ticket replaces a value nobody has taken yet.
    pub fn publish(&self, ticket: u32, value: T) -> bool {
        let mut state = self.state.lock();
        if ticket == NO_TICKET || state.ticket != ticket {
            return false;
        }
        state.value = Some(value);
        self.ready.notify_all();
        true
    }

    /// Take the value for `ticket` if it has arrived
    pub fn try_take(&self, ticket: u32) -> Option<T> {
        let mut state = self.state.lock();
        if state.ticket != ticket {
            return None;
        }
        state.value.take()
    }

    /// Wait up to `timeout` for the value published under `ticket`
    pub fn wait(&self, ticket: u32, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.ticket != ticket {
                return None;
            }
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return if state.ticket == ticket { state.value.take() } else { None };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_publish_then_wait() {
        let rv = Rendezvous::new();
        rv.arm(7);
        assert!(rv.publish(7, "reply"));
        assert_eq!(rv.wait(7, Duration::from_millis(10)), Some("reply"));
        assert_eq!(rv.try_take(7), None);
    }

    #[test]
    fn test_stale_ticket_dropped() {
        let rv = Rendezvous::new();
        rv.arm(2);
        assert!(!rv.publish(1, "old"));
        assert!(!rv.publish(NO_TICKET, "none"));
        assert_eq!(rv.try_take(2), None);
    }

    #[test]
    fn test_rearm_discards_pending() {
        let rv = Rendezvous::new();
        rv.arm(3);
        rv.publish(3, 1);
        rv.arm(3);
        assert_eq!(rv.try_take(3), None);
    }

    #[test]
    fn test_wait_times_out() {
        let rv: Rendezvous<u8> = Rendezvous::new();
        rv.arm(5);
        let start = Instant::now();
        assert_eq!(rv.wait(5, Duration::from_millis(50)), None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_cross_thread_wakeup() {
        let rv = Arc::new(Rendezvous::new());
        rv.arm(9);
        let publisher = {
            let rv = Arc::clone(&rv);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                rv.publish(9, vec![1u8, 2, 3])
            })
        };
        assert_eq!(rv.wait(9, Duration::from_secs(5)), Some(vec![1, 2, 3]));
        assert!(publisher.join().unwrap());
    }

    #[test]
    fn test_disarm_wakes_nothing() {
        let rv = Rendezvous::new();
        rv.arm(4);
        rv.disarm();
        assert!(!rv.publish(4, ()));
        assert_eq!(rv.ticket(), NO_TICKET);
    }
}
