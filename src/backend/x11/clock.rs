//! X server clock
//!
//! Ownership must be claimed with a real server timestamp, never
//! `CurrentTime`. The server only hands out its time inside events, so the
//! clock is calibrated once from a PropertyNotify and extrapolated with the
//! local monotonic clock. Later PropertyNotify events on our window
//! recalibrate it.

use std::time::Instant;

use lamco_selection_core::{Timestamp, CURRENT_TIME};
use parking_lot::Mutex;
use tracing::debug;
use x11rb::connection::Connection as _;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _, PropMode, Property, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::clipboard::Result;

#[derive(Debug)]
pub(crate) struct ServerClock {
    base: Mutex<(Instant, Timestamp)>,
}

impl ServerClock {
    pub(crate) fn new(server_time: Timestamp) -> Self {
        Self {
            base: Mutex::new((Instant::now(), server_time)),
        }
    }

    /// Append nothing to `property` and read the time of the notification
    pub(crate) fn calibrate(conn: &RustConnection, window: Window, property: Atom) -> Result<Self> {
        conn.change_property8(PropMode::APPEND, window, property, AtomEnum::STRING, &[])?;
        conn.flush()?;

        loop {
            match conn.wait_for_event()? {
                Event::PropertyNotify(event)
                    if event.window == window && event.atom == property && event.state == Property::NEW_VALUE =>
                {
                    debug!("Server time calibrated at {}", event.time);
                    return Ok(Self::new(event.time));
                }
                other => debug!("Ignoring event during clock calibration: {:?}", other),
            }
        }
    }

    pub(crate) fn observe(&self, server_time: Timestamp) {
        if server_time != CURRENT_TIME {
            *self.base.lock() = (Instant::now(), server_time);
        }
    }

    /// Extrapolated server time, never `CurrentTime`
    pub(crate) fn now(&self) -> Timestamp {
        let (at, base) = *self.base.lock();
        let elapsed = at.elapsed().as_millis() as u32;
        match base.wrapping_add(elapsed) {
            CURRENT_TIME => 1,
            time => time,
        }
    }
}
