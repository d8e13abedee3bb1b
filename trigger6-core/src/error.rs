//! Domain-specific error types for the trigger6 transport engine.
//!
//! Pure stages (mode decoding, conversion, encoding) return
//! `Result<T, Trigger6Error>`. Broken pool invariants and out-of-bounds
//! damage rectangles are programming errors and panic instead.

use thiserror::Error;

/// The canonical error type for the trigger6 core.
#[derive(Debug, Error)]
pub enum Trigger6Error {
    // ── Mode errors ──────────────────────────────────────────────
    /// The raw mode table is shorter than the fixed record layout.
    #[error("invalid mode table: expected {expected} bytes, got {actual}")]
    InvalidModeTable { expected: usize, actual: usize },

    /// No mode in the adapter's table matches the request.
    #[error("mode not supported: {width}x{height}@{refresh_hz}")]
    ModeNotSupported {
        width: u16,
        height: u16,
        refresh_hz: u16,
    },

    // ── Encoding errors ──────────────────────────────────────────
    /// The wire pixel format has no converter.
    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(crate::header::VideoFormat),

    /// A region coordinate does not fit the header field carrying it.
    #[error("region too large for {field}: {value}")]
    RegionTooLarge { field: &'static str, value: u64 },

    /// A header was shorter than its fixed wire size.
    #[error("{header} too short: {actual} < {expected}")]
    HeaderTooShort {
        header: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A header did not carry its expected marker.
    #[error("invalid {0} marker")]
    InvalidMarker(&'static str),

    // ── Configuration errors ─────────────────────────────────────
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    // ── Transfer errors ──────────────────────────────────────────
    /// A transfer buffer could not be obtained.
    #[error("transfer pool: {0}")]
    Pool(#[from] PoolError),

    /// The underlying transport reported a failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// A frame update was aborted part way through.
    #[error("dispatch: {0}")]
    Dispatch(#[from] DispatchError),
}

// ── PoolError ────────────────────────────────────────────────────

/// Reasons an acquire on the transfer pool did not yield a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool was shut down (device disconnect or teardown).
    #[error("pool shut down")]
    Shutdown,

    /// The caller's cancellation token fired while waiting.
    #[error("acquire cancelled")]
    Cancelled,
}

// ── TransportError ───────────────────────────────────────────────

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The submission was rejected before it reached the device.
    #[error("submit failed: {0}")]
    Submit(String),

    /// A control request failed.
    #[error("control request {request:#04x} failed: {reason}")]
    Control { request: u8, reason: String },

    /// The transfer did not complete within the transport's deadline.
    #[error("transfer timed out")]
    Timeout,

    /// The device went away.
    #[error("device disconnected")]
    Disconnected,

    /// The transport released the submission without completing it.
    #[error("submission dropped without completion")]
    Dropped,
}

// ── DispatchError ────────────────────────────────────────────────

/// A frame update stopped before all of its chunks were submitted.
///
/// `submitted` chunks are already in flight and will complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No buffer could be acquired for `chunk`.
    #[error("no buffer for chunk {chunk} after {submitted} submitted: {source}")]
    Pool {
        chunk: usize,
        submitted: usize,
        #[source]
        source: PoolError,
    },

    /// The transport rejected `chunk`.
    #[error("chunk {chunk} failed after {submitted} submitted: {source}")]
    Transport {
        chunk: usize,
        submitted: usize,
        #[source]
        source: TransportError,
    },
}

impl DispatchError {
    /// Number of chunks that were handed to the transport.
    pub fn submitted(&self) -> usize {
        match self {
            DispatchError::Pool { submitted, .. } | DispatchError::Transport { submitted, .. } => {
                *submitted
            }
        }
    }

    /// Index of the chunk that failed.
    pub fn chunk(&self) -> usize {
        match self {
            DispatchError::Pool { chunk, .. } | DispatchError::Transport { chunk, .. } => *chunk,
        }
    }
}
