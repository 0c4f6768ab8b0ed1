//! Outbound fetch: read a selection owned by another client.
//!
//! A fetch is a short chain of hops, each a conversion request followed by
//! a bounded wait:
//!
//! 1. `TARGETS`, to learn what the owner offers
//! 2. the best text format both sides understand
//! 3. a plain UTF-8 retry if the envelope carried a foreign encoding
//! 4. one hop per chunk when the owner answers incrementally
//!
//! Every hop gets its own fresh timeout, so a chain is bounded by
//! `hops * hop_timeout` rather than by a single overall deadline.
//!
//! Failures never reach the caller: they are logged with their
//! classification and the fetch yields nothing.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::codec::FormatConverter;
use crate::envelope::Envelope;
use crate::error::ErrorKind;
use crate::formats::{rank, Format};
use crate::store::{SelectionKind, SelectionStore};
use crate::transfer::{IncrementalTransfer, DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT_MS};
use crate::transport::{Owner, Reply, SelectionTransport};
use crate::{SelectionError, SelectionResult};

/// Fetch tuning
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bound on each individual wait
    pub hop_timeout: Duration,
    /// Largest payload accepted
    pub max_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            hop_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Runs fetch cycles against a transport
#[derive(Debug)]
pub struct FetchCoordinator {
    config: FetchConfig,
    converter: FormatConverter,
    in_flight: Mutex<()>,
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl FetchCoordinator {
    /// Create a coordinator
    pub fn new(config: FetchConfig) -> Self {
        let converter = FormatConverter::with_max_size(config.max_size);
        Self {
            config,
            converter,
            in_flight: Mutex::new(()),
        }
    }

    /// Get the fetch configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Read the current content of `kind`
    ///
    /// Our own selection is served from the store. A peer's selection is
    /// negotiated and, on success, cached in the store. `None` means there
    /// is nothing to read or the owner could not deliver it.
    pub fn fetch(
        &self,
        transport: &dyn SelectionTransport,
        store: &SelectionStore,
        kind: SelectionKind,
    ) -> Option<Envelope> {
        let owner = match transport.query_owner(kind) {
            Ok(owner) => owner,
            Err(e) => {
                warn!(selection = %kind, "Failed to query selection owner: {}", e);
                return None;
            }
        };

        match owner {
            Owner::This => return store.snapshot(kind),
            Owner::Nobody => {
                debug!(selection = %kind, "Selection has no owner");
                store.clear(kind);
                return None;
            }
            Owner::Peer => {}
        }

        // One cycle at a time: a second fetch would re-arm the rendezvous
        // under the first one.
        let _cycle = self.in_flight.lock();
        let serial = store.next_serial();
        let result = self.negotiate(transport, kind, serial);
        store.disarm(kind);

        match result {
            Ok(Some(envelope)) => {
                debug!(
                    selection = %kind,
                    bytes = envelope.len(),
                    register = %envelope.register_type,
                    "Fetched selection"
                );
                store.replace(kind, Some(envelope.clone()));
                Some(envelope)
            }
            Ok(None) => {
                debug!(selection = %kind, "Owner delivered an empty selection");
                store.clear(kind);
                None
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::Timeout | ErrorKind::Refusal => {
                        debug!(selection = %kind, kind = ?e.kind(), "Fetch gave no data: {}", e)
                    }
                    _ => warn!(selection = %kind, kind = ?e.kind(), "Fetch failed: {}", e),
                }
                None
            }
        }
    }

    fn hop(
        &self,
        transport: &dyn SelectionTransport,
        kind: SelectionKind,
        format: Format,
        serial: u32,
    ) -> SelectionResult<Reply> {
        trace!(selection = %kind, %format, serial, "Requesting conversion");
        transport.send_conversion_request(kind, format, serial)?;
        transport
            .await_reply(kind, serial, self.config.hop_timeout)
            .ok_or_else(|| self.timeout())
    }

    fn timeout(&self) -> SelectionError {
        SelectionError::Timeout(self.config.hop_timeout.as_millis() as u64)
    }

    fn negotiate(
        &self,
        transport: &dyn SelectionTransport,
        kind: SelectionKind,
        serial: u32,
    ) -> SelectionResult<Option<Envelope>> {
        let mut request = Format::Targets;
        let mut fell_back = false;

        loop {
            let reply = self.hop(transport, kind, request, serial)?;

            let (format, bytes) = match reply {
                Reply::Targets(offered) => {
                    if request != Format::Targets {
                        return Err(SelectionError::Protocol(format!("target list in reply to {request}")));
                    }
                    request = rank(&offered).ok_or(SelectionError::NoCommonFormat)?;
                    debug!(selection = %kind, offered = offered.len(), chosen = %request, "Negotiated format");
                    continue;
                }
                Reply::Data { format, bytes } => (format, bytes),
                Reply::Incremental { format, size_hint } => {
                    (format, self.receive_incremental(transport, kind, serial, size_hint)?)
                }
                Reply::Chunk(_) => {
                    return Err(SelectionError::Protocol("chunk outside incremental transfer".to_string()));
                }
                Reply::Refused => return Err(SelectionError::Refused(request.name().to_string())),
            };

            if request == Format::Targets {
                return Err(SelectionError::Protocol(format!("{format} data in reply to TARGETS")));
            }
            if bytes.is_empty() {
                return Ok(None);
            }

            match self.converter.decode(format, &bytes) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(e) if e.allows_fallback() && !fell_back => {
                    debug!(selection = %kind, "{}; retrying as {}", e, Format::Utf8String);
                    fell_back = true;
                    request = Format::Utf8String;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn receive_incremental(
        &self,
        transport: &dyn SelectionTransport,
        kind: SelectionKind,
        serial: u32,
        size_hint: usize,
    ) -> SelectionResult<Vec<u8>> {
        let mut transfer = IncrementalTransfer::new(self.config.max_size);
        transfer.start(size_hint)?;

        loop {
            transport.continue_transfer(kind, serial)?;
            let reply = transport.await_reply(kind, serial, self.config.hop_timeout);
            match reply {
                Some(Reply::Chunk(chunk)) => {
                    trace!(selection = %kind, bytes = chunk.len(), "Received chunk");
                    if transfer.push_chunk(&chunk)? {
                        break;
                    }
                }
                Some(Reply::Refused) => {
                    transfer.fail();
                    return Err(SelectionError::Refused("incremental transfer".to_string()));
                }
                Some(other) => {
                    transfer.fail();
                    return Err(SelectionError::Protocol(format!(
                        "unexpected reply during incremental transfer: {other:?}"
                    )));
                }
                None => {
                    transfer.cancel();
                    return Err(self.timeout());
                }
            }
        }

        let progress = transfer.progress();
        debug!(
            selection = %kind,
            bytes = progress.received_bytes,
            chunks = progress.chunks,
            elapsed = ?progress.started_at.map(|at| at.elapsed()),
            "Incremental transfer complete"
        );
        transfer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterType;
    use crate::transport::MockSelectionTransport;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn coordinator() -> FetchCoordinator {
        FetchCoordinator::new(FetchConfig {
            hop_timeout: Duration::from_millis(20),
            max_size: 1 << 20,
        })
    }

    fn peer_owned() -> MockSelectionTransport {
        let mut transport = MockSelectionTransport::new();
        transport.expect_query_owner().returning(|_| Ok(Owner::Peer));
        transport.expect_send_conversion_request().returning(|_, _, _| Ok(()));
        transport
    }

    #[test]
    fn test_own_selection_served_from_store() {
        let store = SelectionStore::new();
        store.write(SelectionKind::Clipboard, Some(Envelope::utf8(RegisterType::Char, "mine")), 1);
        let mut transport = MockSelectionTransport::new();
        transport.expect_query_owner().returning(|_| Ok(Owner::This));
        transport.expect_send_conversion_request().never();

        let env = coordinator().fetch(&transport, &store, SelectionKind::Clipboard).unwrap();
        assert_eq!(&env.payload[..], b"mine");
    }

    #[test]
    fn test_no_owner_is_empty() {
        let store = SelectionStore::new();
        store.write(SelectionKind::Primary, Some(Envelope::utf8(RegisterType::Char, "old")), 1);
        let mut transport = MockSelectionTransport::new();
        transport.expect_query_owner().returning(|_| Ok(Owner::Nobody));

        assert!(coordinator().fetch(&transport, &store, SelectionKind::Primary).is_none());
        assert!(!store.has_data(SelectionKind::Primary));
    }

    #[test]
    fn test_negotiates_best_format() {
        let store = SelectionStore::new();
        let mut transport = MockSelectionTransport::new();
        let mut seq = Sequence::new();
        transport.expect_query_owner().returning(|_| Ok(Owner::Peer));
        transport
            .expect_send_conversion_request()
            .with(eq(SelectionKind::Clipboard), eq(Format::Targets), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        transport
            .expect_await_reply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Some(Reply::Targets(vec![Format::String, Format::Utf8String])));
        transport
            .expect_send_conversion_request()
            .with(eq(SelectionKind::Clipboard), eq(Format::Utf8String), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        transport
            .expect_await_reply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Some(Reply::Data {
                    format: Format::Utf8String,
                    bytes: b"a\nb\n".to_vec(),
                })
            });

        let env = coordinator().fetch(&transport, &store, SelectionKind::Clipboard).unwrap();
        assert_eq!(env.to_lines(), (vec!["a".to_string(), "b".to_string()], RegisterType::Line));
        assert!(store.has_data(SelectionKind::Clipboard));
    }

    #[test]
    fn test_timeout_yields_nothing() {
        let store = SelectionStore::new();
        let mut transport = peer_owned();
        transport.expect_await_reply().returning(|_, _, _| None);

        assert!(coordinator().fetch(&transport, &store, SelectionKind::Clipboard).is_none());
    }

    #[test]
    fn test_refusal_leaves_store_untouched() {
        let store = SelectionStore::new();
        store.write(SelectionKind::Clipboard, Some(Envelope::utf8(RegisterType::Char, "keep")), 1);
        let mut transport = peer_owned();
        transport.expect_await_reply().returning(|_, _, _| Some(Reply::Refused));

        assert!(coordinator().fetch(&transport, &store, SelectionKind::Clipboard).is_none());
        assert_eq!(&store.snapshot(SelectionKind::Clipboard).unwrap().payload[..], b"keep");
    }

    #[test]
    fn test_no_common_format() {
        let store = SelectionStore::new();
        let mut transport = peer_owned();
        transport
            .expect_await_reply()
            .returning(|_, _, _| Some(Reply::Targets(vec![Format::Targets, Format::Multiple])));

        assert!(coordinator().fetch(&transport, &store, SelectionKind::Clipboard).is_none());
    }

    #[test]
    fn test_encoding_mismatch_falls_back_to_utf8_string() {
        let store = SelectionStore::new();
        let mut transport = MockSelectionTransport::new();
        transport.expect_query_owner().returning(|_| Ok(Owner::Peer));
        let requested = std::sync::Arc::new(Mutex::new(Vec::new()));
        let log = requested.clone();
        transport.expect_send_conversion_request().returning(move |_, format, _| {
            log.lock().push(format);
            Ok(())
        });
        let last = requested.clone();
        transport.expect_await_reply().returning(move |_, _, _| {
            let format = *last.lock().last().unwrap();
            Some(match format {
                Format::Targets => Reply::Targets(vec![Format::VimEnc, Format::Utf8String]),
                Format::VimEnc => Reply::Data {
                    format: Format::VimEnc,
                    bytes: b"\x00euc-jp\0\xA4\xA2".to_vec(),
                },
                _ => Reply::Data {
                    format: Format::Utf8String,
                    bytes: "あ".as_bytes().to_vec(),
                },
            })
        });

        let env = coordinator().fetch(&transport, &store, SelectionKind::Clipboard).unwrap();
        assert_eq!(&env.payload[..], "あ".as_bytes());
        assert_eq!(
            *requested.lock(),
            vec![Format::Targets, Format::VimEnc, Format::Utf8String]
        );
    }

    #[test]
    fn test_empty_reply_is_empty_selection() {
        let store = SelectionStore::new();
        let mut transport = peer_owned();
        let mut first = true;
        transport.expect_await_reply().returning(move |_, _, _| {
            if std::mem::take(&mut first) {
                Some(Reply::Targets(vec![Format::Utf8String]))
            } else {
                Some(Reply::Data {
                    format: Format::Utf8String,
                    bytes: Vec::new(),
                })
            }
        });

        assert!(coordinator().fetch(&transport, &store, SelectionKind::Clipboard).is_none());
    }
}
