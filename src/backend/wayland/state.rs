//! Protocol object state and event dispatch

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lamco_selection_core::{Format, RequestHandler, Response, SelectionKind, SelectionStore, CURRENT_TIME};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use wayland_client::globals::GlobalListContents;
use wayland_client::protocol::wl_registry::WlRegistry;
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::{event_created_child, Connection, Dispatch, Proxy, QueueHandle};
use wayland_protocols_wlr::data_control::v1::client::{
    zwlr_data_control_device_v1::{self, ZwlrDataControlDeviceV1},
    zwlr_data_control_manager_v1::ZwlrDataControlManagerV1,
    zwlr_data_control_offer_v1::{self, ZwlrDataControlOfferV1},
    zwlr_data_control_source_v1::{self, ZwlrDataControlSourceV1},
};

use crate::backend::{EventHub, SelectionEvent};

/// Mime types announced for one offer
#[derive(Debug, Default)]
pub(crate) struct OfferMimes(Mutex<Vec<String>>);

impl OfferMimes {
    /// Known formats on offer with the exact mime string to request them by
    pub(crate) fn formats(&self) -> Vec<(Format, String)> {
        self.0
            .lock()
            .iter()
            .filter_map(|mime| Format::from_name(mime).map(|format| (format, mime.clone())))
            .collect()
    }
}

/// Current protocol objects per selection
#[derive(Debug, Default)]
pub(crate) struct Selections {
    pub(crate) device: Option<ZwlrDataControlDeviceV1>,
    pub(crate) offers: HashMap<SelectionKind, ZwlrDataControlOfferV1>,
    pub(crate) sources: HashMap<SelectionKind, ZwlrDataControlSourceV1>,
}

/// State shared between the API side and event dispatch
pub(crate) struct WaylandShared {
    pub(crate) conn: Connection,
    pub(crate) qh: QueueHandle<WaylandState>,
    pub(crate) manager: ZwlrDataControlManagerV1,
    pub(crate) seat: WlSeat,
    pub(crate) primary_supported: bool,
    pub(crate) store: SelectionStore,
    pub(crate) handler: RequestHandler,
    pub(crate) events: EventHub,
    pub(crate) selections: Mutex<Selections>,
    pub(crate) max_size: usize,
    pub(crate) epoch: Instant,
    pub(crate) alive: AtomicBool,
}

impl WaylandShared {
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn supports(&self, kind: SelectionKind) -> bool {
        match kind {
            SelectionKind::Clipboard => true,
            SelectionKind::Primary => self.primary_supported,
            SelectionKind::Secondary => false,
        }
    }

    fn record_offer(&self, kind: SelectionKind, offer: Option<ZwlrDataControlOfferV1>) {
        trace!(selection = %kind, offer = ?offer.as_ref().map(Proxy::id), "Selection offer");
        let mut selections = self.selections.lock();
        let previous = match offer {
            Some(offer) => selections.offers.insert(kind, offer),
            None => selections.offers.remove(&kind),
        };
        if let Some(previous) = previous {
            previous.destroy();
        }
    }

    /// Replace a device the compositor finished
    fn recreate_device(&self) {
        let mut selections = self.selections.lock();
        if let Some(device) = selections.device.take() {
            device.destroy();
        }
        for (_, offer) in selections.offers.drain() {
            offer.destroy();
        }
        if self.is_alive() {
            debug!("Data device finished, recreating it");
            selections.device = Some(self.manager.get_data_device(&self.seat, &self.qh, ()));
        }
    }

    fn serve(&self, kind: SelectionKind, mime_type: &str, fd: OwnedFd) {
        if let Some(bytes) = reply_bytes(&self.handler, &self.store, kind, mime_type) {
            send_to_pipe(fd, bytes);
        }
    }

    fn source_cancelled(&self, kind: SelectionKind, source: &ZwlrDataControlSourceV1) {
        source.destroy();
        let mut selections = self.selections.lock();
        if selections.sources.get(&kind) == Some(source) {
            selections.sources.remove(&kind);
            drop(selections);
            debug!(selection = %kind, "Source cancelled, ownership lost");
            self.events.emit(SelectionEvent::OwnershipLost(kind));
        }
    }
}

/// Bytes to send for a `Send` event, `None` when the request is refused
fn reply_bytes(handler: &RequestHandler, store: &SelectionStore, kind: SelectionKind, mime_type: &str) -> Option<Vec<u8>> {
    let format = Format::from_name(mime_type);
    match handler.handle(store, kind, format, CURRENT_TIME) {
        Response::Data { bytes, .. } => Some(bytes),
        other => {
            debug!(selection = %kind, mime_type, ?other, "Not serving request");
            None
        }
    }
}

/// Write `bytes` to the peer's pipe on a thread of its own and close it
fn send_to_pipe(fd: OwnedFd, bytes: Vec<u8>) {
    // The compositor may hand out a non-blocking pipe
    if let Err(e) = nix::fcntl::fcntl(fd.as_raw_fd(), nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::empty())) {
        debug!("Failed to make pipe blocking: {}", e);
    }

    let spawned = std::thread::Builder::new()
        .name("lamco-wl-send".to_string())
        .spawn(move || {
            let mut pipe = File::from(fd);
            if let Err(e) = pipe.write_all(&bytes) {
                debug!("Peer stopped reading: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn writer thread: {}", e);
    }
}

/// Dispatch state; one is built for every dispatch pass
pub(crate) struct WaylandState {
    pub(crate) shared: Arc<WaylandShared>,
}

impl Dispatch<WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &WlRegistry,
        _event: <WlRegistry as Proxy>::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // Globals are resolved once at startup
    }
}

impl Dispatch<WlSeat, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &WlSeat,
        _event: <WlSeat as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // Ignore seat events (capabilities, name)
    }
}

impl Dispatch<ZwlrDataControlManagerV1, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &ZwlrDataControlManagerV1,
        _event: <ZwlrDataControlManagerV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // No events expected from the manager
    }
}

impl Dispatch<ZwlrDataControlDeviceV1, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _proxy: &ZwlrDataControlDeviceV1,
        event: <ZwlrDataControlDeviceV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        use zwlr_data_control_device_v1::Event;

        match event {
            Event::DataOffer { id } => trace!("New data offer {:?}", id.id()),
            Event::Selection { id } => state.shared.record_offer(SelectionKind::Clipboard, id),
            Event::PrimarySelection { id } => state.shared.record_offer(SelectionKind::Primary, id),
            Event::Finished => state.shared.recreate_device(),
            _ => debug!("Unhandled data control device event: {:?}", event),
        }
    }

    event_created_child!(WaylandState, ZwlrDataControlDeviceV1, [
        zwlr_data_control_device_v1::EVT_DATA_OFFER_OPCODE => (ZwlrDataControlOfferV1, OfferMimes::default()),
    ]);
}

impl Dispatch<ZwlrDataControlOfferV1, OfferMimes> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &ZwlrDataControlOfferV1,
        event: <ZwlrDataControlOfferV1 as Proxy>::Event,
        mimes: &OfferMimes,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        if let zwlr_data_control_offer_v1::Event::Offer { mime_type } = event {
            mimes.0.lock().push(mime_type);
        }
    }
}

impl Dispatch<ZwlrDataControlSourceV1, SelectionKind> for WaylandState {
    fn event(
        state: &mut Self,
        source: &ZwlrDataControlSourceV1,
        event: <ZwlrDataControlSourceV1 as Proxy>::Event,
        &kind: &SelectionKind,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        use zwlr_data_control_source_v1::Event;

        match event {
            Event::Send { mime_type, fd } => state.shared.serve(kind, &mime_type, fd),
            Event::Cancelled => state.shared.source_cancelled(kind, source),
            _ => debug!("Unhandled data control source event: {:?}", event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use lamco_selection_core::{Envelope, RegisterType};

    #[test]
    fn test_offer_mimes_keep_original_spelling() {
        let mimes = OfferMimes::default();
        mimes.0.lock().extend([
            "image/png".to_string(),
            "text/plain;charset=UTF-8".to_string(),
            "UTF8_STRING".to_string(),
        ]);
        let formats = mimes.formats();
        assert_eq!(
            formats,
            vec![
                (Format::PlainUtf8, "text/plain;charset=UTF-8".to_string()),
                (Format::Utf8String, "UTF8_STRING".to_string()),
            ]
        );
    }

    fn store_with(text: &'static str) -> SelectionStore {
        let store = SelectionStore::new();
        store.write(SelectionKind::Clipboard, Some(Envelope::utf8(RegisterType::Line, text)), 1);
        store
    }

    #[test]
    fn test_text_mime_served() {
        let store = store_with("line\n");
        let handler = RequestHandler::default();

        let bytes = reply_bytes(&handler, &store, SelectionKind::Clipboard, "text/plain;charset=utf-8");
        assert_eq!(bytes.as_deref(), Some(&b"line\n"[..]));
        let bytes = reply_bytes(&handler, &store, SelectionKind::Clipboard, "UTF8_STRING");
        assert_eq!(bytes.as_deref(), Some(&b"line\n"[..]));
    }

    #[test]
    fn test_unservable_requests_refused() {
        let store = store_with("line\n");
        let handler = RequestHandler::default();

        assert!(reply_bytes(&handler, &store, SelectionKind::Clipboard, "image/png").is_none());
        assert!(reply_bytes(&handler, &store, SelectionKind::Clipboard, "TARGETS").is_none());
        assert!(reply_bytes(&handler, &store, SelectionKind::Primary, "UTF8_STRING").is_none());
    }

    #[test]
    fn test_send_to_nonblocking_pipe_delivers_everything() {
        let (read, write) = nix::unistd::pipe().unwrap();
        nix::fcntl::fcntl(
            write.as_raw_fd(),
            nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK),
        )
        .unwrap();
        // Larger than a pipe buffer, so the writer has to wait for us
        let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();

        send_to_pipe(write, payload.clone());

        let mut received = Vec::new();
        File::from(read).read_to_end(&mut received).unwrap();
        assert_eq!(received, payload);
    }
}
