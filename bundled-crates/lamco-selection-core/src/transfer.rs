//! Incremental transfer reassembly.
//!
//! Large selections arrive as a sequence of chunks ended by a zero-length
//! chunk. The owner announces a lower bound on the total size up front;
//! the real size is whatever arrives before the terminator.

use std::time::Instant;

use bytes::BytesMut;

use crate::{SelectionError, SelectionResult};

/// Default maximum data size: 16MB
pub const DEFAULT_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Default bound on each wait: 1 second
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Read size for streamed transfers: 64KB
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// State of a transfer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Transfer not started
    Pending,
    /// Transfer in progress
    InProgress,
    /// Terminating chunk received
    Completed,
    /// Owner went silent mid-transfer
    Cancelled,
    /// Transfer failed
    Failed,
}

/// Progress information for a transfer
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Size announced by the owner (a lower bound)
    pub size_hint: usize,

    /// Bytes received so far
    pub received_bytes: usize,

    /// Chunks received so far, terminator excluded
    pub chunks: usize,

    /// Current transfer state
    pub state: TransferState,

    /// Transfer start time
    pub started_at: Option<Instant>,
}

impl TransferProgress {
    fn new(size_hint: usize) -> Self {
        Self {
            size_hint,
            received_bytes: 0,
            chunks: 0,
            state: TransferState::Pending,
            started_at: None,
        }
    }
}

/// Reassembles an incremental transfer
///
/// ```rust
/// use lamco_selection_core::IncrementalTransfer;
///
/// let mut transfer = IncrementalTransfer::new(1 << 20);
/// transfer.start(2037).unwrap();
/// for size in [1000, 1000, 37] {
///     assert!(!transfer.push_chunk(&vec![b'x'; size]).unwrap());
/// }
/// assert!(transfer.push_chunk(&[]).unwrap());
/// assert_eq!(transfer.finish().unwrap().len(), 2037);
/// ```
#[derive(Debug)]
pub struct IncrementalTransfer {
    max_size: usize,
    progress: TransferProgress,
    buffer: BytesMut,
}

impl IncrementalTransfer {
    /// Create a transfer that refuses to grow past `max_size`
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            progress: TransferProgress::new(0),
            buffer: BytesMut::new(),
        }
    }

    /// Get current progress
    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    /// Begin receiving; `size_hint` is the size announced by the owner
    pub fn start(&mut self, size_hint: usize) -> SelectionResult<()> {
        if self.progress.state == TransferState::InProgress {
            return Err(SelectionError::InvalidState("transfer already in progress".to_string()));
        }
        if size_hint > self.max_size {
            self.progress.state = TransferState::Failed;
            return Err(SelectionError::DataSizeExceeded {
                actual: size_hint,
                max: self.max_size,
            });
        }

        self.buffer = BytesMut::with_capacity(size_hint);
        self.progress = TransferProgress::new(size_hint);
        self.progress.state = TransferState::InProgress;
        self.progress.started_at = Some(Instant::now());
        Ok(())
    }

    /// Append a chunk; returns true once the zero-length terminator arrives
    pub fn push_chunk(&mut self, chunk: &[u8]) -> SelectionResult<bool> {
        if self.progress.state != TransferState::InProgress {
            return Err(SelectionError::InvalidState(format!(
                "transfer not active: {:?}",
                self.progress.state
            )));
        }

        if chunk.is_empty() {
            self.progress.state = TransferState::Completed;
            return Ok(true);
        }

        let total = self.buffer.len() + chunk.len();
        if total > self.max_size {
            self.fail();
            return Err(SelectionError::DataSizeExceeded {
                actual: total,
                max: self.max_size,
            });
        }

        self.buffer.extend_from_slice(chunk);
        self.progress.received_bytes = total;
        self.progress.chunks += 1;
        Ok(false)
    }

    /// Take the assembled payload
    pub fn finish(&mut self) -> SelectionResult<Vec<u8>> {
        if self.progress.state != TransferState::Completed {
            return Err(SelectionError::InvalidState(format!(
                "transfer not completed: {:?}",
                self.progress.state
            )));
        }
        let data = std::mem::take(&mut self.buffer);
        self.progress = TransferProgress::new(0);
        Ok(data.to_vec())
    }

    /// Abandon the transfer after a failed step
    pub fn fail(&mut self) {
        self.progress.state = TransferState::Failed;
        self.buffer.clear();
    }

    /// Give up on a transfer the owner stopped feeding
    pub fn cancel(&mut self) {
        if self.progress.state == TransferState::InProgress {
            self.progress.state = TransferState::Cancelled;
        }
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassembly_matches_monolithic() {
        let content: Vec<u8> = (0..2037u32).map(|i| (i % 251) as u8).collect();
        let mut transfer = IncrementalTransfer::new(DEFAULT_MAX_SIZE);
        transfer.start(1000).unwrap();

        let mut offset = 0;
        for size in [1000, 1000, 37] {
            assert!(!transfer.push_chunk(&content[offset..offset + size]).unwrap());
            offset += size;
        }
        assert!(transfer.push_chunk(&[]).unwrap());

        assert_eq!(transfer.progress().chunks, 3);
        assert_eq!(transfer.finish().unwrap(), content);
    }

    #[test]
    fn test_size_limit() {
        let mut transfer = IncrementalTransfer::new(10);
        transfer.start(4).unwrap();
        transfer.push_chunk(&[0; 8]).unwrap();
        assert!(matches!(
            transfer.push_chunk(&[0; 8]),
            Err(SelectionError::DataSizeExceeded { actual: 16, max: 10 })
        ));
        assert_eq!(transfer.progress().state, TransferState::Failed);
    }

    #[test]
    fn test_announced_size_over_limit() {
        let mut transfer = IncrementalTransfer::new(10);
        assert!(transfer.start(11).is_err());
    }

    #[test]
    fn test_finish_before_terminator() {
        let mut transfer = IncrementalTransfer::new(100);
        transfer.start(0).unwrap();
        transfer.push_chunk(b"abc").unwrap();
        assert!(transfer.finish().is_err());
    }

    #[test]
    fn test_chunk_without_start() {
        let mut transfer = IncrementalTransfer::new(100);
        assert!(transfer.push_chunk(b"x").is_err());
    }

    #[test]
    fn test_cancel_discards_partial_data() {
        let mut transfer = IncrementalTransfer::new(100);
        transfer.start(0).unwrap();
        transfer.push_chunk(b"data").unwrap();
        transfer.cancel();
        assert_eq!(transfer.progress().state, TransferState::Cancelled);
        assert!(transfer.push_chunk(b"more").is_err());
        assert!(transfer.finish().is_err());
    }
}
