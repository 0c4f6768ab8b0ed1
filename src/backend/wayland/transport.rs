//! [`SelectionTransport`] over wlr-data-control offers and sources

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::os::fd::AsFd;
use std::time::Duration;

use lamco_selection_core::{
    Format, Owner, Reply, SelectionError, SelectionKind, SelectionResult, SelectionTransport, Timestamp,
    DEFAULT_CHUNK_SIZE,
};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{debug, trace};
use wayland_client::Proxy;

use super::state::OfferMimes;
use super::WaylandClient;
use crate::backend::SelectionEvent;
use crate::driver::poll_timeout;

/// Data request whose pipe has not been read yet
#[derive(Debug)]
pub(crate) struct PendingRead {
    serial: u32,
    format: Format,
    pipe: File,
}

/// Read `pipe` to end of file; each wait is bounded by `timeout`
///
/// `Ok(None)` means the writer stalled past the bound.
fn read_pipe(pipe: &mut File, timeout: Duration, max_size: usize) -> io::Result<Option<Vec<u8>>> {
    let mut data = Vec::new();
    let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];

    loop {
        let ready = {
            let mut fds = [PollFd::new(pipe.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, poll_timeout(Some(timeout))) {
                Ok(n) => n > 0,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if !ready {
            return Ok(None);
        }

        match pipe.read(&mut buf) {
            Ok(0) => return Ok(Some(data)),
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if data.len() > max_size {
                    return Err(io::Error::other(format!(
                        "selection data exceeds {} bytes",
                        max_size
                    )));
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e),
        }
    }
}

impl WaylandClient {
    fn current_offer_formats(&self, kind: SelectionKind) -> Vec<(Format, String)> {
        self.shared
            .selections
            .lock()
            .offers
            .get(&kind)
            .and_then(|offer| offer.data::<OfferMimes>().map(OfferMimes::formats))
            .unwrap_or_default()
    }

    /// Ask the offer for `format`; `None` means the pipe is pending
    fn request_data(&self, kind: SelectionKind, format: Format, serial: u32) -> SelectionResult<Option<Reply>> {
        let selections = self.shared.selections.lock();
        let Some(offer) = selections.offers.get(&kind) else {
            return Ok(Some(Reply::Refused));
        };
        let mime = offer
            .data::<OfferMimes>()
            .and_then(|mimes| mimes.formats().into_iter().find(|(f, _)| *f == format))
            .map(|(_, mime)| mime);
        let Some(mime) = mime else {
            return Ok(Some(Reply::Refused));
        };

        let (read, write) = nix::unistd::pipe().map_err(io::Error::from)?;
        offer.receive(mime, write.as_fd());
        drop(selections);
        self.flush()
            .map_err(|e| SelectionError::Transport(e.to_string()))?;
        // Only the owner may hold the write end from here on
        drop(write);

        self.reads.lock().insert(
            kind,
            PendingRead {
                serial,
                format,
                pipe: File::from(read),
            },
        );
        trace!(selection = %kind, %format, serial, "Requested offer data");
        Ok(None)
    }
}

impl SelectionTransport for WaylandClient {
    fn now(&self) -> Timestamp {
        (self.shared.epoch.elapsed().as_millis() as u32).wrapping_add(1).max(1)
    }

    fn query_owner(&self, kind: SelectionKind) -> SelectionResult<Owner> {
        if !self.shared.is_alive() {
            return Err(SelectionError::Transport("Wayland connection closed".to_string()));
        }
        let selections = self.shared.selections.lock();
        Ok(if selections.sources.contains_key(&kind) {
            Owner::This
        } else if selections.offers.contains_key(&kind) {
            Owner::Peer
        } else {
            Owner::Nobody
        })
    }

    fn send_conversion_request(&self, kind: SelectionKind, format: Format, serial: u32) -> SelectionResult<()> {
        if !self.shared.supports(kind) {
            return Err(SelectionError::UnsupportedFormat(format!("{kind} on Wayland")));
        }
        self.shared.store.arm(kind, serial);
        self.reads.lock().remove(&kind);

        let reply = match format {
            Format::Targets => {
                let offered = self.current_offer_formats(kind);
                if offered.is_empty() {
                    Reply::Refused
                } else {
                    Reply::Targets(offered.into_iter().map(|(format, _)| format).collect())
                }
            }
            format => match self.request_data(kind, format, serial)? {
                Some(reply) => reply,
                // The pipe is read in await_reply
                None => return Ok(()),
            },
        };
        self.shared.store.publish(kind, serial, reply);
        Ok(())
    }

    fn await_reply(&self, kind: SelectionKind, serial: u32, timeout: Duration) -> Option<Reply> {
        if let Some(reply) = self.shared.store.try_take(kind, serial) {
            return Some(reply);
        }

        let pending = self.reads.lock().remove(&kind);
        let mut pending = pending.filter(|p| p.serial == serial)?;
        match read_pipe(&mut pending.pipe, timeout, self.shared.max_size) {
            Ok(Some(bytes)) => Some(Reply::Data {
                format: pending.format,
                bytes,
            }),
            Ok(None) => None,
            Err(e) => {
                debug!(selection = %kind, "Reading offer failed: {}", e);
                Some(Reply::Refused)
            }
        }
    }

    fn continue_transfer(&self, _kind: SelectionKind, _serial: u32) -> SelectionResult<()> {
        Err(SelectionError::InvalidState(
            "wlr-data-control has no incremental transfers".to_string(),
        ))
    }

    fn become_owner(&self, kind: SelectionKind) -> SelectionResult<()> {
        if !self.shared.supports(kind) {
            return Err(SelectionError::UnsupportedFormat(format!("{kind} on Wayland")));
        }
        if !self.shared.is_alive() {
            return Err(SelectionError::Transport("Wayland connection closed".to_string()));
        }

        let shared = &self.shared;
        let mut selections = shared.selections.lock();
        let Some(device) = selections.device.clone() else {
            return Err(SelectionError::InvalidState("no data device".to_string()));
        };

        let event = if shared.store.has_data(kind) {
            let source = shared.manager.create_data_source(&shared.qh, kind);
            for format in Format::TEXT_FORMATS {
                source.offer(format.name().to_string());
            }
            match kind {
                SelectionKind::Primary => device.set_primary_selection(Some(&source)),
                _ => device.set_selection(Some(&source)),
            }
            // The replaced source is destroyed when its cancel arrives
            selections.sources.insert(kind, source);
            SelectionEvent::OwnershipAcquired(kind)
        } else {
            match kind {
                SelectionKind::Primary => device.set_primary_selection(None),
                _ => device.set_selection(None),
            }
            if selections.sources.remove(&kind).is_none() {
                drop(selections);
                return self.flush().map_err(|e| SelectionError::Transport(e.to_string()));
            }
            SelectionEvent::OwnershipLost(kind)
        };
        drop(selections);

        self.flush()
            .map_err(|e| SelectionError::Transport(e.to_string()))?;
        shared.events.emit(event);
        Ok(())
    }
}
