//! Inbound request handling.
//!
//! Decides how to answer a peer that wants to read one of our selections.
//! The transport turns the [`Response`] into protocol writes and must send
//! exactly one reply per request, refusals included.

use tracing::debug;

use crate::codec::FormatConverter;
use crate::error::{SelectionError, SelectionResult};
use crate::formats::Format;
use crate::store::{SelectionKind, SelectionStore, Timestamp, CURRENT_TIME};

/// How to answer one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// List of supported targets
    Targets {
        /// Targets in answer order
        formats: Vec<Format>,
        /// Declare the list with the generic ATOM type rather than TARGETS
        declare_as_atom: bool,
    },
    /// Empty acknowledgement (DELETE, SAVE_TARGETS)
    Acknowledged,
    /// Ownership timestamp
    Timestamp(Timestamp),
    /// Converted selection data
    Data {
        /// Target the bytes were converted to
        format: Format,
        /// Converted bytes
        bytes: Vec<u8>,
    },
    /// Compound request: read the pairs and call
    /// [`RequestHandler::handle_multiple`]
    Multiple,
    /// Refuse the request
    Refused,
}

/// One successful conversion inside a compound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion<D> {
    /// Where the requester wants the data
    pub destination: D,
    /// Target converted to
    pub format: Format,
    /// Converted bytes
    pub bytes: Vec<u8>,
}

/// Outcome of a compound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleReply<D> {
    /// Data to write, one entry per satisfied pair
    pub conversions: Vec<Conversion<D>>,
    /// Destination list to write back; failed pairs are `None`
    pub destinations: Vec<Option<D>>,
}

/// Answers peers' conversion requests from the selection store
#[derive(Debug, Clone)]
pub struct RequestHandler {
    converter: FormatConverter,
    targets_reply_type_atom: bool,
}

impl Default for RequestHandler {
    fn default() -> Self {
        Self::new(FormatConverter::new(), true)
    }
}

impl RequestHandler {
    /// Create a handler
    ///
    /// `targets_reply_type_atom` selects the type declared on capability
    /// replies: ATOM (true) or TARGETS (false, for older peers).
    pub fn new(converter: FormatConverter, targets_reply_type_atom: bool) -> Self {
        Self {
            converter,
            targets_reply_type_atom,
        }
    }

    /// Reject a request whose timestamp predates our ownership of `kind`
    ///
    /// `CurrentTime` requests are always accepted.
    pub fn check_fresh(store: &SelectionStore, kind: SelectionKind, requester_time: Timestamp) -> SelectionResult<()> {
        let owned = store.timestamp(kind);
        if requester_time != CURRENT_TIME && requester_time < owned {
            return Err(SelectionError::StaleRequest {
                requester: requester_time,
                owned,
            });
        }
        Ok(())
    }

    fn is_stale(store: &SelectionStore, kind: SelectionKind, requester_time: Timestamp) -> bool {
        match Self::check_fresh(store, kind, requester_time) {
            Ok(()) => false,
            Err(e) => {
                debug!(selection = %kind, "Refusing request: {}", e);
                true
            }
        }
    }

    /// Decide the answer to a request for `target`
    ///
    /// `target` is `None` when the requester asked for something that is not
    /// a known format.
    pub fn handle(
        &self,
        store: &SelectionStore,
        kind: SelectionKind,
        target: Option<Format>,
        requester_time: Timestamp,
    ) -> Response {
        if Self::is_stale(store, kind, requester_time) {
            return Response::Refused;
        }

        let Some(target) = target else {
            return Response::Refused;
        };

        match target {
            Format::Targets => Response::Targets {
                formats: Format::ADVERTISED.to_vec(),
                declare_as_atom: self.targets_reply_type_atom,
            },
            Format::Delete => {
                debug!(selection = %kind, "Peer requested DELETE, clearing slot");
                store.clear(kind);
                Response::Acknowledged
            }
            Format::SaveTargets => Response::Acknowledged,
            Format::Timestamp => Response::Timestamp(store.timestamp(kind)),
            Format::Multiple => Response::Multiple,
            format => match self.convert(store, kind, format) {
                Some(bytes) => Response::Data { format, bytes },
                None => Response::Refused,
            },
        }
    }

    /// Answer the (target, destination) pairs of a compound request
    pub fn handle_multiple<D: Copy>(
        &self,
        store: &SelectionStore,
        kind: SelectionKind,
        pairs: &[(Option<Format>, D)],
        requester_time: Timestamp,
    ) -> MultipleReply<D> {
        let stale = Self::is_stale(store, kind, requester_time);
        let mut conversions = Vec::new();
        let mut destinations = Vec::with_capacity(pairs.len());

        for &(target, destination) in pairs {
            let converted = target
                .filter(|_| !stale)
                .and_then(|format| self.convert(store, kind, format).map(|bytes| (format, bytes)));
            match converted {
                Some((format, bytes)) => {
                    conversions.push(Conversion {
                        destination,
                        format,
                        bytes,
                    });
                    destinations.push(Some(destination));
                }
                None => destinations.push(None),
            }
        }

        MultipleReply {
            conversions,
            destinations,
        }
    }

    /// Convert the slot content to a text format
    pub fn convert(&self, store: &SelectionStore, kind: SelectionKind, format: Format) -> Option<Vec<u8>> {
        if !format.is_text() {
            return None;
        }
        let guard = store.read(kind);
        let envelope = guard.envelope()?;
        match self.converter.encode(format, envelope) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(selection = %kind, %format, "Conversion failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::register::RegisterType;

    fn owned_store(stamp: Timestamp) -> SelectionStore {
        let store = SelectionStore::new();
        store.write(
            SelectionKind::Clipboard,
            Some(Envelope::utf8(RegisterType::Line, "line\n")),
            stamp,
        );
        store
    }

    #[test]
    fn test_targets() {
        let store = owned_store(10);
        let handler = RequestHandler::new(FormatConverter::new(), true);
        match handler.handle(&store, SelectionKind::Clipboard, Some(Format::Targets), CURRENT_TIME) {
            Response::Targets {
                formats,
                declare_as_atom,
            } => {
                assert!(declare_as_atom);
                assert_eq!(formats[0], Format::Targets);
                assert!(formats.contains(&Format::VimEnc));
                assert!(formats.contains(&Format::String));
            }
            other => panic!("unexpected {other:?}"),
        }

        let legacy = RequestHandler::new(FormatConverter::new(), false);
        assert!(matches!(
            legacy.handle(&store, SelectionKind::Clipboard, Some(Format::Targets), 0),
            Response::Targets {
                declare_as_atom: false,
                ..
            }
        ));
    }

    #[test]
    fn test_stale_request_refused() {
        let store = owned_store(1000);
        let handler = RequestHandler::default();
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Utf8String), 999),
            Response::Refused
        );
        assert!(matches!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Utf8String), 1000),
            Response::Data { .. }
        ));
        assert!(matches!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Utf8String), CURRENT_TIME),
            Response::Data { .. }
        ));
    }

    #[test]
    fn test_stale_request_error_carries_both_times() {
        let store = owned_store(1000);
        assert!(matches!(
            RequestHandler::check_fresh(&store, SelectionKind::Clipboard, 999),
            Err(SelectionError::StaleRequest {
                requester: 999,
                owned: 1000
            })
        ));
        assert!(RequestHandler::check_fresh(&store, SelectionKind::Clipboard, CURRENT_TIME).is_ok());
        assert!(RequestHandler::check_fresh(&store, SelectionKind::Clipboard, 1001).is_ok());
    }

    #[test]
    fn test_data_conversion() {
        let store = owned_store(1);
        let handler = RequestHandler::default();
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::VimEnc), 0),
            Response::Data {
                format: Format::VimEnc,
                bytes: b"\x01utf-8\0line\n".to_vec(),
            }
        );
    }

    #[test]
    fn test_delete_clears_slot() {
        let store = owned_store(1);
        let handler = RequestHandler::default();
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Delete), 0),
            Response::Acknowledged
        );
        assert!(!store.has_data(SelectionKind::Clipboard));
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Utf8String), 0),
            Response::Refused
        );
    }

    #[test]
    fn test_housekeeping() {
        let store = owned_store(77);
        let handler = RequestHandler::default();
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Timestamp), 0),
            Response::Timestamp(77)
        );
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::SaveTargets), 0),
            Response::Acknowledged
        );
        assert_eq!(
            handler.handle(&store, SelectionKind::Clipboard, Some(Format::Multiple), 0),
            Response::Multiple
        );
        assert_eq!(handler.handle(&store, SelectionKind::Clipboard, None, 0), Response::Refused);
    }

    #[test]
    fn test_empty_slot_refuses_data() {
        let store = SelectionStore::new();
        let handler = RequestHandler::default();
        assert_eq!(
            handler.handle(&store, SelectionKind::Primary, Some(Format::Utf8String), 0),
            Response::Refused
        );
    }

    #[test]
    fn test_multiple() {
        let store = owned_store(1);
        let handler = RequestHandler::default();
        let pairs = [
            (Some(Format::Utf8String), 11u32),
            (None, 12),
            (Some(Format::Timestamp), 13),
            (Some(Format::String), 14),
        ];
        let reply = handler.handle_multiple(&store, SelectionKind::Clipboard, &pairs, 0);
        assert_eq!(reply.destinations, vec![Some(11), None, None, Some(14)]);
        assert_eq!(reply.conversions.len(), 2);
        assert_eq!(reply.conversions[0].bytes, b"line\n");
        assert_eq!(reply.conversions[1].format, Format::String);
    }

    #[test]
    fn test_multiple_stale_fails_every_pair() {
        let store = owned_store(50);
        let handler = RequestHandler::default();
        let reply = handler.handle_multiple(&store, SelectionKind::Clipboard, &[(Some(Format::Plain), 1u8)], 10);
        assert_eq!(reply.destinations, vec![None]);
        assert!(reply.conversions.is_empty());
    }
}
