//! Boundary to the USB transport.
//!
//! The core never talks to USB directly. It hands filled buffers to a
//! [`Transport`] as [`Submission`]s and issues vendor control requests
//! through it.
//!
//! A `Submission` owns its buffer until the transport finishes with it.
//! [`Submission::complete`] (or dropping the submission) returns the
//! buffer to its pool and reports a [`TransferEvent`] on the completion
//! channel, exactly once.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::pool::{TransferBuffer, TransferBufferPool};

pub use memory::{CompletionMode, MemoryTransport, RecordedBulk, RecordedControl};

// ── ControlRequest ───────────────────────────────────────────────

/// A vendor control request (`bRequest`, `wValue`, `wIndex`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRequest {
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub const fn new(request: u8, value: u16, index: u16) -> Self {
        Self {
            request,
            value,
            index,
        }
    }
}

// ── TransferEvent ────────────────────────────────────────────────

/// Completion report for one bulk transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Dispatcher-assigned frame number.
    pub frame: u64,
    /// Chunk index within the frame.
    pub chunk: usize,
    /// Byte offset of the chunk within the frame stream.
    pub offset: usize,
    /// Bytes in the transfer.
    pub len: usize,
    pub outcome: Result<(), TransportError>,
}

impl TransferEvent {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub type TransferEventSender = mpsc::UnboundedSender<TransferEvent>;
pub type TransferEventReceiver = mpsc::UnboundedReceiver<TransferEvent>;

// ── Submission ───────────────────────────────────────────────────

struct InFlight {
    buffer: TransferBuffer,
    pool: TransferBufferPool,
    events: TransferEventSender,
}

/// A filled transfer buffer handed to the transport.
pub struct Submission {
    in_flight: Option<InFlight>,
    frame: u64,
    chunk: usize,
    offset: usize,
}

impl Submission {
    pub(crate) fn new(
        buffer: TransferBuffer,
        pool: TransferBufferPool,
        events: TransferEventSender,
        frame: u64,
        chunk: usize,
        offset: usize,
    ) -> Self {
        Self {
            in_flight: Some(InFlight {
                buffer,
                pool,
                events,
            }),
            frame,
            chunk,
            offset,
        }
    }

    /// The bytes to transmit.
    pub fn data(&self) -> &[u8] {
        match &self.in_flight {
            Some(f) => f.buffer.as_slice(),
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Finish the transfer: return the buffer and report `outcome`.
    pub fn complete(mut self, outcome: Result<(), TransportError>) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: Result<(), TransportError>) {
        let Some(InFlight {
            buffer,
            pool,
            events,
        }) = self.in_flight.take()
        else {
            return;
        };

        let len = buffer.len();
        pool.release(buffer);
        // The receiver may be gone during teardown; the buffer is back either way.
        let _ = events.send(TransferEvent {
            frame: self.frame,
            chunk: self.chunk,
            offset: self.offset,
            len,
            outcome,
        });
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        self.finish(Err(TransportError::Dropped));
    }
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("frame", &self.frame)
            .field("chunk", &self.chunk)
            .field("offset", &self.offset)
            .field("len", &self.len())
            .finish()
    }
}

/// A submission the transport refused, handed back to the caller.
#[derive(Debug)]
pub struct SubmitError {
    pub error: TransportError,
    pub submission: Submission,
}

// ── Transport ────────────────────────────────────────────────────

/// Asynchronous USB transport used by the core.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Vendor IN request; returns the number of bytes read into `buf`.
    async fn control_read(
        &self,
        request: ControlRequest,
        buf: &mut [u8],
    ) -> Result<usize, TransportError>;

    /// Vendor OUT request carrying `data`.
    async fn control_write(&self, request: ControlRequest, data: &[u8]) -> Result<(), TransportError>;

    /// Queue a bulk write. Must not block.
    ///
    /// On success the transport owns `submission` and must eventually
    /// [`complete`](Submission::complete) it. On failure it hands the
    /// submission back untouched.
    fn submit(&self, submission: Submission) -> Result<(), SubmitError>;
}

// ── Tests ────────────────────────────────────────────────────────
