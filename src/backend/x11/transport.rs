//! [`SelectionTransport`] over the X11 control window

use std::time::Duration;

use lamco_selection_core::{
    Format, Owner, Reply, SelectionError, SelectionKind, SelectionResult, SelectionTransport, Timestamp,
};

use super::{ControlReply, X11Shared};
use crate::clipboard::ClipboardError;
use crate::config::Scheduling;
use crate::driver::await_pumped;

fn transport_error(e: ClipboardError) -> SelectionError {
    SelectionError::Transport(e.to_string())
}

impl SelectionTransport for X11Shared {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn query_owner(&self, kind: SelectionKind) -> SelectionResult<Owner> {
        match self.control(self.atoms.LAMCO_QUERY, kind)? {
            ControlReply::Owner(owner) => Ok(owner),
            other => Err(SelectionError::Protocol(format!("unexpected control reply {other:?}"))),
        }
    }

    fn send_conversion_request(&self, kind: SelectionKind, format: Format, serial: u32) -> SelectionResult<()> {
        let target = self
            .registry
            .id(format)
            .ok_or_else(|| SelectionError::UnsupportedFormat(format.name().to_string()))?;
        if !self.is_alive() {
            return Err(SelectionError::Transport("X11 connection closed".to_string()));
        }

        self.store.arm(kind, serial);
        self.send_command(
            self.atoms.LAMCO_CONVERT,
            [self.atoms.selection(kind), target, serial, self.clock.now(), 0],
        )
        .map_err(transport_error)
    }

    fn await_reply(&self, kind: SelectionKind, serial: u32, timeout: Duration) -> Option<Reply> {
        match self.scheduling {
            Scheduling::Thread => self.store.wait_ready(kind, serial, timeout),
            Scheduling::HostLoop => await_pumped(self, &self.store, kind, serial, timeout),
        }
    }

    fn continue_transfer(&self, kind: SelectionKind, serial: u32) -> SelectionResult<()> {
        self.send_command(self.atoms.LAMCO_CONTINUE, [self.atoms.selection(kind), serial, 0, 0, 0])
            .map_err(transport_error)
    }

    fn become_owner(&self, kind: SelectionKind) -> SelectionResult<()> {
        match self.control(self.atoms.LAMCO_OFFER, kind)? {
            ControlReply::Offered(true) => Ok(()),
            ControlReply::Offered(false) => Err(SelectionError::Refused(format!("ownership of {kind}"))),
            other => Err(SelectionError::Protocol(format!("unexpected control reply {other:?}"))),
        }
    }
}
