//! Event handling for the control window

use std::time::Instant;

use lamco_selection_core::{Format, Owner, Reply, Response, SelectionKind, CURRENT_TIME};
use tracing::{debug, info, trace, warn};
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, Property, PropertyNotifyEvent, SelectionClearEvent, SelectionNotifyEvent,
    SelectionRequestEvent, Timestamp, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::NONE;

use super::wire::SelectionWire;
use super::{ControlReply, Handover, InboundTransfer, X11Shared};
use crate::backend::SelectionEvent;
use crate::clipboard::Result;
use crate::driver::PumpStatus;

/// Any property type
const ANY_TYPE: Atom = 0;

impl<C: SelectionWire> X11Shared<C> {
    pub(super) fn handle_event(&self, event: Event) -> Result<PumpStatus> {
        match event {
            Event::ClientMessage(event) if event.window == self.window => return self.on_command(event),
            Event::SelectionNotify(event) => self.on_selection_notify(event)?,
            Event::PropertyNotify(event) if event.window == self.window => self.on_property_notify(event)?,
            Event::SelectionRequest(event) => self.on_selection_request(event)?,
            Event::SelectionClear(event) => self.on_selection_clear(event),
            Event::Error(error) => debug!("X11 error event: {:?}", error),
            other => trace!("Ignoring event {:?}", other),
        }
        Ok(PumpStatus::Continue)
    }

    fn publish(&self, kind: SelectionKind, serial: u32, reply: Reply) {
        if !self.store.publish(kind, serial, reply) {
            debug!(selection = %kind, serial, "Dropping reply for an abandoned fetch");
        }
    }

    fn on_command(&self, event: ClientMessageEvent) -> Result<PumpStatus> {
        let data = event.data.as_data32();
        let atoms = &self.atoms;

        if event.type_ == atoms.WM_PROTOCOLS && data[0] == atoms.WM_DELETE_WINDOW {
            return self.begin_stop();
        }

        let Some(kind) = atoms.kind_of(data[0]) else {
            debug!("Command for unknown selection atom {}", data[0]);
            return Ok(PumpStatus::Continue);
        };

        if event.type_ == atoms.LAMCO_CONVERT {
            self.start_conversion(kind, data[1], data[2], data[3])?;
        } else if event.type_ == atoms.LAMCO_CONTINUE {
            trace!(selection = %kind, serial = data[1], "Requesting next chunk");
            self.conn.delete_property(self.window, atoms.reply_property(kind))?;
        } else if event.type_ == atoms.LAMCO_OFFER {
            let offered = self.offer(kind)?;
            self.control.publish(data[1], ControlReply::Offered(offered));
        } else if event.type_ == atoms.LAMCO_QUERY {
            let owner = self.owner_of(kind)?;
            self.control.publish(data[1], ControlReply::Owner(owner));
        }
        Ok(PumpStatus::Continue)
    }

    fn start_conversion(&self, kind: SelectionKind, target: Atom, serial: u32, time: Timestamp) -> Result<()> {
        let Some(format) = self.registry.format(target) else {
            self.publish(kind, serial, Reply::Refused);
            return Ok(());
        };
        debug!(selection = %kind, %format, serial, "Converting selection");

        self.inbound.lock().insert(
            kind,
            InboundTransfer {
                serial,
                format,
                target,
                time,
                incremental: false,
            },
        );

        let property = self.atoms.reply_property(kind);
        self.conn.delete_property(self.window, property)?;
        self.conn
            .convert_selection(self.window, self.atoms.selection(kind), target, property, time)?;
        Ok(())
    }

    fn owner_of(&self, kind: SelectionKind) -> Result<Owner> {
        Ok(match self.conn.selection_owner(self.atoms.selection(kind))? {
            NONE => Owner::Nobody,
            owner if owner == self.window => Owner::This,
            _ => Owner::Peer,
        })
    }

    /// Claim `kind` with its slot timestamp, or release it if the slot is empty
    fn offer(&self, kind: SelectionKind) -> Result<bool> {
        let selection = self.atoms.selection(kind);

        if !self.store.has_data(kind) {
            if self.owner_of(kind)? == Owner::This {
                self.conn.set_selection_owner(NONE, selection, self.clock.now())?;
                debug!(selection = %kind, "Released ownership");
                self.events.emit(SelectionEvent::OwnershipLost(kind));
            }
            return Ok(true);
        }

        self.conn
            .set_selection_owner(self.window, selection, self.store.timestamp(kind))?;
        let owned = self.owner_of(kind)? == Owner::This;
        if owned {
            debug!(selection = %kind, time = self.store.timestamp(kind), "Acquired ownership");
            self.events.emit(SelectionEvent::OwnershipAcquired(kind));
        } else {
            warn!(selection = %kind, "Server did not grant ownership");
        }
        Ok(owned)
    }

    fn on_selection_notify(&self, event: SelectionNotifyEvent) -> Result<()> {
        if event.selection == self.atoms.CLIPBOARD_MANAGER {
            self.handover_notified();
            return Ok(());
        }
        let Some(kind) = self.atoms.kind_of(event.selection) else {
            return Ok(());
        };
        let Some(pending) = self.inbound.lock().get(&kind).copied() else {
            debug!(selection = %kind, "SelectionNotify without a fetch in progress");
            return Ok(());
        };
        if pending.incremental {
            debug!(selection = %kind, "SelectionNotify during incremental transfer");
            return Ok(());
        }
        // A late answer to an abandoned request names another target or time
        if event.target != pending.target || (event.time != CURRENT_TIME && event.time != pending.time) {
            debug!(
                selection = %kind,
                target = event.target,
                time = event.time,
                "SelectionNotify for an abandoned request"
            );
            return Ok(());
        }

        if event.property == NONE {
            self.inbound.lock().remove(&kind);
            self.publish(kind, pending.serial, Reply::Refused);
            return Ok(());
        }

        let property = self.conn.get_property(self.window, event.property, ANY_TYPE)?;

        if property.type_ == self.atoms.INCR {
            let size_hint = property
                .value32()
                .and_then(|v| v.first().copied())
                .unwrap_or(0) as usize;
            debug!(selection = %kind, size_hint, "Owner started incremental transfer");
            if let Some(entry) = self.inbound.lock().get_mut(&kind) {
                entry.incremental = true;
            }
            self.publish(
                kind,
                pending.serial,
                Reply::Incremental {
                    format: pending.format,
                    size_hint,
                },
            );
            return Ok(());
        }

        self.conn.delete_property(self.window, event.property)?;
        self.inbound.lock().remove(&kind);

        let reply = if pending.format == Format::Targets {
            let declared_list = property.type_ == self.atoms.ATOM
                || Some(property.type_) == self.registry.id(Format::Targets);
            match property.value32() {
                Some(ids) if declared_list => Reply::Targets(self.registry.formats(&ids)),
                _ => Reply::Refused,
            }
        } else {
            match self.registry.format(property.type_) {
                Some(format) if format.is_text() => Reply::Data {
                    format,
                    bytes: property.value,
                },
                _ => {
                    debug!(selection = %kind, type_ = property.type_, "Owner replied with an unknown type");
                    Reply::Refused
                }
            }
        };
        self.publish(kind, pending.serial, reply);
        Ok(())
    }

    fn on_property_notify(&self, event: PropertyNotifyEvent) -> Result<()> {
        self.clock.observe(event.time);
        if event.state != Property::NEW_VALUE {
            return Ok(());
        }
        let Some(kind) = self.atoms.kind_of_property(event.atom) else {
            return Ok(());
        };
        let Some(pending) = self.inbound.lock().get(&kind).copied().filter(|p| p.incremental) else {
            return Ok(());
        };

        let chunk = self.conn.get_property(self.window, event.atom, ANY_TYPE)?.value;
        if chunk.is_empty() {
            // End of transfer; deleting the empty property completes it
            self.conn.delete_property(self.window, event.atom)?;
            self.inbound.lock().remove(&kind);
        }
        self.publish(kind, pending.serial, Reply::Chunk(chunk));
        Ok(())
    }

    fn on_selection_request(&self, event: SelectionRequestEvent) -> Result<()> {
        // Obsolete clients send property None and expect the target instead
        let property = if event.property == NONE {
            event.target
        } else {
            event.property
        };

        let answered = match self.atoms.kind_of(event.selection) {
            Some(kind) => match self.answer_request(kind, &event, property) {
                Ok(answered) => answered,
                Err(e) => {
                    debug!(selection = %kind, "Failed to answer request: {}", e);
                    false
                }
            },
            None => false,
        };

        let notify = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: event.time,
            requestor: event.requestor,
            selection: event.selection,
            target: event.target,
            property: if answered { property } else { NONE },
        };
        self.conn.send_selection_notify(notify)?;

        let is_targets = Some(event.target) == self.registry.id(Format::Targets);
        if answered && !is_targets {
            self.handover_written();
        }
        Ok(())
    }

    fn answer_request(&self, kind: SelectionKind, event: &SelectionRequestEvent, property: Atom) -> Result<bool> {
        let target = self.registry.format(event.target);
        trace!(selection = %kind, ?target, requestor = event.requestor, "SelectionRequest");

        match self.handler.handle(&self.store, kind, target, event.time) {
            Response::Targets {
                formats,
                declare_as_atom,
            } => {
                let ids: Vec<Atom> = formats.iter().filter_map(|&f| self.registry.id(f)).collect();
                let type_ = if declare_as_atom {
                    self.atoms.ATOM
                } else {
                    event.target
                };
                self.conn.change_property32(event.requestor, property, type_, &ids)?;
                Ok(true)
            }
            Response::Acknowledged => {
                self.conn
                    .change_property8(event.requestor, property, self.atoms.NULL, &[])?;
                Ok(true)
            }
            Response::Timestamp(time) => {
                self.conn
                    .change_property32(event.requestor, property, self.atoms.INTEGER, &[time])?;
                Ok(true)
            }
            Response::Data { format, bytes } => self.write_data(event.requestor, property, format, &bytes),
            Response::Multiple => self.answer_multiple(kind, event, property),
            Response::Refused => Ok(false),
        }
    }

    fn write_data(&self, requestor: u32, property: Atom, format: Format, bytes: &[u8]) -> Result<bool> {
        if bytes.len() > self.max_request_bytes {
            debug!(
                bytes = bytes.len(),
                max = self.max_request_bytes,
                "Refusing conversion larger than one request"
            );
            return Ok(false);
        }
        // TEXT is answered as compound text
        let declared = match format {
            Format::Text => Format::CompoundText,
            other => other,
        };
        let Some(type_) = self.registry.id(declared) else {
            return Ok(false);
        };
        self.conn.change_property8(requestor, property, type_, bytes)?;
        Ok(true)
    }

    fn answer_multiple(&self, kind: SelectionKind, event: &SelectionRequestEvent, property: Atom) -> Result<bool> {
        if event.property == NONE {
            return Ok(false);
        }
        let list = self
            .conn
            .get_property(event.requestor, property, self.atoms.ATOM_PAIR)?;
        let Some(values) = list.value32() else {
            return Ok(false);
        };
        let pairs: Vec<_> = values
            .chunks_exact(2)
            .map(|pair| (self.registry.format(pair[0]), (pair[0], pair[1])))
            .collect();

        let reply = self.handler.handle_multiple(&self.store, kind, &pairs, event.time);
        let mut failed = Vec::new();
        for conversion in &reply.conversions {
            let (_, destination) = conversion.destination;
            if !self.write_data(event.requestor, destination, conversion.format, &conversion.bytes)? {
                failed.push(conversion.destination);
            }
        }

        let written: Vec<u32> = pairs
            .iter()
            .zip(&reply.destinations)
            .flat_map(|(&(_, (target, destination)), outcome)| {
                let ok = outcome.is_some_and(|d| !failed.contains(&d));
                [target, if ok { destination } else { NONE }]
            })
            .collect();
        self.conn
            .change_property32(event.requestor, property, self.atoms.ATOM_PAIR, &written)?;
        Ok(true)
    }

    fn on_selection_clear(&self, event: SelectionClearEvent) {
        if let Some(kind) = self.atoms.kind_of(event.selection) {
            debug!(selection = %kind, "Lost selection ownership");
            self.events.emit(SelectionEvent::OwnershipLost(kind));
        }
    }

    /// Start stopping: hand owned selections to a clipboard manager if one runs
    pub(super) fn begin_stop(&self) -> Result<PumpStatus> {
        if !self.handover_enabled {
            return Ok(PumpStatus::Exit);
        }

        let mut owns_any = false;
        for kind in [SelectionKind::Primary, SelectionKind::Clipboard] {
            if self.store.has_data(kind) && self.owner_of(kind)? == Owner::This {
                owns_any = true;
            }
        }
        if !owns_any {
            return Ok(PumpStatus::Exit);
        }

        let manager = self.conn.selection_owner(self.atoms.CLIPBOARD_MANAGER)?;
        let Some(save_targets) = self.registry.id(Format::SaveTargets) else {
            return Ok(PumpStatus::Exit);
        };
        if manager == NONE {
            debug!("No clipboard manager running");
            return Ok(PumpStatus::Exit);
        }

        info!("Handing selections over to the clipboard manager");
        self.conn.convert_selection(
            self.window,
            self.atoms.CLIPBOARD_MANAGER,
            save_targets,
            self.atoms.LAMCO_CLIPBOARD,
            self.clock.now(),
        )?;
        self.conn.flush()?;
        *self.handover.lock() = Handover::InProgress {
            deadline: Instant::now() + self.handover_timeout,
            written: false,
            notified: false,
        };
        Ok(PumpStatus::Continue)
    }

    // Some managers notify before they read, so both must happen
    fn handover_notified(&self) {
        if let Handover::InProgress { notified, .. } = &mut *self.handover.lock() {
            trace!("Clipboard manager finished requesting");
            *notified = true;
        }
    }

    fn handover_written(&self) {
        if let Handover::InProgress { written, .. } = &mut *self.handover.lock() {
            trace!("Clipboard manager read our contents");
            *written = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use lamco_selection_core::{
        Envelope, FormatConverter, FormatRegistry, RegisterType, Rendezvous, RequestHandler, SelectionStore,
    };
    use parking_lot::Mutex;
    use x11rb::protocol::xproto::{Window, PROPERTY_NOTIFY_EVENT, SELECTION_REQUEST_EVENT};

    use super::*;
    use crate::backend::x11::atoms::Atoms;
    use crate::backend::x11::clock::ServerClock;
    use crate::backend::x11::wire::{MockSelectionWire, PropertyData};
    use crate::backend::EventHub;
    use crate::config::Scheduling;

    const WINDOW: Window = 0x0040_0001;
    const REQUESTOR: Window = 0x0060_0001;
    const MANAGER: Window = 0x0070_0001;
    const OWNED_AT: Timestamp = 5_000;

    const ATOMS: Atoms = Atoms {
        PRIMARY: 1,
        SECONDARY: 2,
        CLIPBOARD: 3,
        CLIPBOARD_MANAGER: 4,
        ATOM: 5,
        ATOM_PAIR: 6,
        INCR: 7,
        INTEGER: 8,
        NULL: 9,
        WM_PROTOCOLS: 10,
        WM_DELETE_WINDOW: 11,
        LAMCO_CONVERT: 12,
        LAMCO_CONTINUE: 13,
        LAMCO_OFFER: 14,
        LAMCO_QUERY: 15,
        LAMCO_PRIMARY: 16,
        LAMCO_SECONDARY: 17,
        LAMCO_CLIPBOARD: 18,
        LAMCO_TIMESTAMP: 19,
    };

    /// Atoms 100 and up, in advertised order
    fn atom(format: Format) -> Atom {
        let index = Format::ADVERTISED.iter().position(|&f| f == format).unwrap();
        100 + index as Atom
    }

    fn shared(wire: MockSelectionWire) -> X11Shared<MockSelectionWire> {
        X11Shared {
            conn: wire,
            window: WINDOW,
            atoms: ATOMS,
            registry: FormatRegistry::from_pairs(Format::ADVERTISED.into_iter().map(|f| (f, atom(f)))),
            clock: ServerClock::new(OWNED_AT),
            store: SelectionStore::new(),
            handler: RequestHandler::new(FormatConverter::new(), true),
            events: EventHub::new(),
            scheduling: Scheduling::Thread,
            inbound: Mutex::new(HashMap::new()),
            control: Rendezvous::new(),
            control_lock: Mutex::new(()),
            control_timeout: Duration::from_millis(100),
            handover: Mutex::new(Handover::Idle),
            handover_enabled: true,
            handover_timeout: Duration::from_secs(5),
            max_request_bytes: 1 << 16,
            alive: AtomicBool::new(true),
        }
    }

    fn with_text(shared: &X11Shared<MockSelectionWire>, text: &'static str) {
        shared
            .store
            .write(SelectionKind::Clipboard, Some(Envelope::utf8(RegisterType::Char, text)), OWNED_AT);
    }

    fn request(target: Atom, property: Atom, time: Timestamp) -> SelectionRequestEvent {
        SelectionRequestEvent {
            response_type: SELECTION_REQUEST_EVENT,
            sequence: 0,
            time,
            owner: WINDOW,
            requestor: REQUESTOR,
            selection: ATOMS.CLIPBOARD,
            target,
            property,
        }
    }

    fn notify(target: Atom, property: Atom, time: Timestamp) -> SelectionNotifyEvent {
        SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time,
            requestor: WINDOW,
            selection: ATOMS.CLIPBOARD,
            target,
            property,
        }
    }

    /// Record every SelectionNotify sent
    fn record_notifies(wire: &mut MockSelectionWire) -> Arc<Mutex<Vec<SelectionNotifyEvent>>> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let recorded = sent.clone();
        wire.expect_send_selection_notify().returning(move |event| {
            recorded.lock().push(event);
            Ok(())
        });
        sent
    }

    /// Put a TARGETS or text fetch for CLIPBOARD in progress
    fn converting(wire: &mut MockSelectionWire, format: Format, time: Timestamp) -> (Atom, u32) {
        wire.expect_delete_property()
            .withf(|&window, &property| window == WINDOW && property == ATOMS.LAMCO_CLIPBOARD)
            .returning(|_, _| Ok(()));
        let target = atom(format);
        wire.expect_convert_selection()
            .withf(move |&requestor, &selection, &t, &property, &at| {
                requestor == WINDOW
                    && selection == ATOMS.CLIPBOARD
                    && t == target
                    && property == ATOMS.LAMCO_CLIPBOARD
                    && at == time
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        (target, 7)
    }

    #[test]
    fn test_refused_request_sends_one_notify_with_none() {
        let mut wire = MockSelectionWire::new();
        wire.expect_change_property8().never();
        wire.expect_change_property32().never();
        let sent = record_notifies(&mut wire);
        let shared = shared(wire);

        // Nothing stored
        shared
            .on_selection_request(request(atom(Format::Utf8String), 42, OWNED_AT + 1))
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].property, NONE);
        assert_eq!(sent[0].target, atom(Format::Utf8String));
        assert_eq!(sent[0].requestor, REQUESTOR);
        assert_eq!(sent[0].time, OWNED_AT + 1);
    }

    #[test]
    fn test_text_request_written_then_notified() {
        let mut wire = MockSelectionWire::new();
        wire.expect_change_property8()
            .withf(|&window, &property, &type_, data| {
                window == REQUESTOR && property == 42 && type_ == atom(Format::Utf8String) && data == b"hello"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let sent = record_notifies(&mut wire);
        let shared = shared(wire);
        with_text(&shared, "hello");

        shared
            .on_selection_request(request(atom(Format::Utf8String), 42, OWNED_AT + 1))
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].property, 42);
    }

    #[test]
    fn test_request_before_ownership_refused() {
        let mut wire = MockSelectionWire::new();
        wire.expect_change_property8().never();
        let sent = record_notifies(&mut wire);
        let shared = shared(wire);
        with_text(&shared, "hello");

        shared
            .on_selection_request(request(atom(Format::Utf8String), 42, OWNED_AT - 1))
            .unwrap();

        assert_eq!(sent.lock()[0].property, NONE);
    }

    #[test]
    fn test_targets_declared_as_atom_list() {
        let mut wire = MockSelectionWire::new();
        let advertised: Vec<Atom> = Format::ADVERTISED.into_iter().map(atom).collect();
        wire.expect_change_property32()
            .withf(move |&window, &property, &type_, data| {
                window == REQUESTOR && property == 42 && type_ == ATOMS.ATOM && data == advertised.as_slice()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let sent = record_notifies(&mut wire);
        let shared = shared(wire);
        with_text(&shared, "hello");

        shared
            .on_selection_request(request(atom(Format::Targets), 42, CURRENT_TIME))
            .unwrap();

        assert_eq!(sent.lock()[0].property, 42);
    }

    #[test]
    fn test_obsolete_requestor_answered_in_target_property() {
        let mut wire = MockSelectionWire::new();
        let target = atom(Format::String);
        wire.expect_change_property8()
            .withf(move |_, &property, &type_, data| property == target && type_ == target && data == b"caf\xe9")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let sent = record_notifies(&mut wire);
        let shared = shared(wire);
        with_text(&shared, "café");

        shared.on_selection_request(request(target, NONE, CURRENT_TIME)).unwrap();

        assert_eq!(sent.lock()[0].property, target);
    }

    #[test]
    fn test_conversion_larger_than_one_request_refused() {
        let mut wire = MockSelectionWire::new();
        wire.expect_change_property8().never();
        let sent = record_notifies(&mut wire);
        let mut shared = shared(wire);
        shared.max_request_bytes = 4;
        with_text(&shared, "hello world");

        shared
            .on_selection_request(request(atom(Format::Utf8String), 42, CURRENT_TIME))
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].property, NONE);
    }

    #[test]
    fn test_multiple_marks_failed_pairs_with_none() {
        let mut wire = MockSelectionWire::new();
        let utf8 = atom(Format::Utf8String);
        let unknown: Atom = 999;
        let pairs = [utf8, 60, unknown, 61];
        wire.expect_get_property()
            .withf(|&window, &property, &type_| window == REQUESTOR && property == 50 && type_ == ATOMS.ATOM_PAIR)
            .times(1)
            .returning(move |_, _, _| {
                Ok(PropertyData {
                    type_: ATOMS.ATOM_PAIR,
                    format: 32,
                    value: pairs.iter().flat_map(|v| v.to_ne_bytes()).collect(),
                })
            });
        wire.expect_change_property8()
            .withf(move |&window, &property, &type_, data| {
                window == REQUESTOR && property == 60 && type_ == utf8 && data == b"hello"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        wire.expect_change_property32()
            .withf(move |&window, &property, &type_, data| {
                window == REQUESTOR && property == 50 && type_ == ATOMS.ATOM_PAIR && data == [utf8, 60, unknown, NONE]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let sent = record_notifies(&mut wire);
        let shared = shared(wire);
        with_text(&shared, "hello");

        shared
            .on_selection_request(request(atom(Format::Multiple), 50, CURRENT_TIME))
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].property, 50);
    }

    #[test]
    fn test_notify_for_abandoned_request_ignored() {
        let mut wire = MockSelectionWire::new();
        let (targets, serial) = converting(&mut wire, Format::Targets, 9_000);
        let shared = shared(wire);
        shared.store.arm(SelectionKind::Clipboard, serial);
        shared
            .start_conversion(SelectionKind::Clipboard, targets, serial, 9_000)
            .unwrap();

        // Late refusal of an earlier UTF8_STRING request
        shared
            .on_selection_notify(notify(atom(Format::Utf8String), NONE, 8_000))
            .unwrap();
        // Same target, earlier request time
        shared.on_selection_notify(notify(targets, NONE, 8_000)).unwrap();

        assert_eq!(shared.store.try_take(SelectionKind::Clipboard, serial), None);
        assert!(shared.inbound.lock().contains_key(&SelectionKind::Clipboard));

        shared.on_selection_notify(notify(targets, NONE, 9_000)).unwrap();
        assert_eq!(
            shared.store.try_take(SelectionKind::Clipboard, serial),
            Some(Reply::Refused)
        );
        assert!(shared.inbound.lock().is_empty());
    }

    #[test]
    fn test_targets_reply_read_and_published() {
        let mut wire = MockSelectionWire::new();
        let (targets, serial) = converting(&mut wire, Format::Targets, 9_000);
        let offered = [atom(Format::String), atom(Format::Utf8String), 999];
        wire.expect_get_property()
            .withf(|&window, &property, _| window == WINDOW && property == ATOMS.LAMCO_CLIPBOARD)
            .times(1)
            .returning(move |_, _, _| {
                Ok(PropertyData {
                    type_: ATOMS.ATOM,
                    format: 32,
                    value: offered.iter().flat_map(|v| v.to_ne_bytes()).collect(),
                })
            });
        let shared = shared(wire);
        shared.store.arm(SelectionKind::Clipboard, serial);
        shared
            .start_conversion(SelectionKind::Clipboard, targets, serial, 9_000)
            .unwrap();

        // Owners may answer with CurrentTime
        shared
            .on_selection_notify(notify(targets, ATOMS.LAMCO_CLIPBOARD, CURRENT_TIME))
            .unwrap();

        assert_eq!(
            shared.store.try_take(SelectionKind::Clipboard, serial),
            Some(Reply::Targets(vec![Format::String, Format::Utf8String]))
        );
    }

    #[test]
    fn test_incremental_chunks_published_until_empty() {
        let mut wire = MockSelectionWire::new();
        let (utf8, serial) = converting(&mut wire, Format::Utf8String, 9_000);
        let mut properties = VecDeque::from(vec![
            PropertyData {
                type_: ATOMS.INCR,
                format: 32,
                value: 2037u32.to_ne_bytes().to_vec(),
            },
            PropertyData {
                type_: utf8,
                format: 8,
                value: b"abc".to_vec(),
            },
            PropertyData {
                type_: utf8,
                format: 8,
                value: Vec::new(),
            },
        ]);
        wire.expect_get_property()
            .times(3)
            .returning(move |_, _, _| Ok(properties.pop_front().unwrap_or_default()));
        let shared = shared(wire);
        let kind = SelectionKind::Clipboard;
        shared.store.arm(kind, serial);
        shared.start_conversion(kind, utf8, serial, 9_000).unwrap();

        shared
            .on_selection_notify(notify(utf8, ATOMS.LAMCO_CLIPBOARD, 9_000))
            .unwrap();
        assert_eq!(
            shared.store.try_take(kind, serial),
            Some(Reply::Incremental {
                format: Format::Utf8String,
                size_hint: 2037,
            })
        );

        let new_value = PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: WINDOW,
            atom: ATOMS.LAMCO_CLIPBOARD,
            time: 9_100,
            state: Property::NEW_VALUE,
        };
        shared.on_property_notify(new_value).unwrap();
        assert_eq!(shared.store.try_take(kind, serial), Some(Reply::Chunk(b"abc".to_vec())));

        // Deleting the reply property is ours to do, not a chunk
        shared
            .on_property_notify(PropertyNotifyEvent {
                state: Property::DELETE,
                ..new_value
            })
            .unwrap();
        assert_eq!(shared.store.try_take(kind, serial), None);

        shared.on_property_notify(new_value).unwrap();
        assert_eq!(shared.store.try_take(kind, serial), Some(Reply::Chunk(Vec::new())));
        assert!(shared.inbound.lock().is_empty());
    }

    fn owners(wire: &mut MockSelectionWire, manager: Window) {
        wire.expect_selection_owner().returning(move |selection| {
            Ok(match selection {
                s if s == ATOMS.CLIPBOARD => WINDOW,
                s if s == ATOMS.CLIPBOARD_MANAGER => manager,
                _ => NONE,
            })
        });
    }

    #[test]
    fn test_handover_waits_for_manager_to_read_and_notify() {
        let mut wire = MockSelectionWire::new();
        owners(&mut wire, MANAGER);
        wire.expect_convert_selection()
            .withf(|&requestor, &selection, &target, &property, _| {
                requestor == WINDOW
                    && selection == ATOMS.CLIPBOARD_MANAGER
                    && target == atom(Format::SaveTargets)
                    && property == ATOMS.LAMCO_CLIPBOARD
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        wire.expect_flush().returning(|| Ok(()));
        wire.expect_change_property8().returning(|_, _, _, _| Ok(()));
        wire.expect_change_property32().returning(|_, _, _, _| Ok(()));
        record_notifies(&mut wire);
        let shared = shared(wire);
        with_text(&shared, "hello");

        assert_eq!(shared.begin_stop().unwrap(), PumpStatus::Continue);
        assert_eq!(shared.handover_status(), PumpStatus::Continue);

        // Capability queries alone do not count as reading
        shared
            .on_selection_request(request(atom(Format::Targets), 42, CURRENT_TIME))
            .unwrap();
        shared
            .on_selection_notify(SelectionNotifyEvent {
                selection: ATOMS.CLIPBOARD_MANAGER,
                ..notify(atom(Format::SaveTargets), ATOMS.LAMCO_CLIPBOARD, CURRENT_TIME)
            })
            .unwrap();
        assert_eq!(shared.handover_status(), PumpStatus::Continue);

        shared
            .on_selection_request(request(atom(Format::Utf8String), 42, CURRENT_TIME))
            .unwrap();
        assert_eq!(shared.handover_status(), PumpStatus::Exit);
    }

    #[test]
    fn test_stop_without_manager_exits_at_once() {
        let mut wire = MockSelectionWire::new();
        owners(&mut wire, NONE);
        wire.expect_convert_selection().never();
        let shared = shared(wire);
        with_text(&shared, "hello");

        assert_eq!(shared.begin_stop().unwrap(), PumpStatus::Exit);
        assert_eq!(shared.handover_status(), PumpStatus::Continue);
    }
}
