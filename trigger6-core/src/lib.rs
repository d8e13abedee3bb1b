//! # trigger6-core
//!
//! Streaming engine for trigger6 USB display adapters.
//!
//! This crate contains:
//! - **Modes**: `ModeCatalog` decoding the adapter's 30-entry timing table
//! - **Conversion**: XRGB8888 damage regions to YUV422 or BGR24 wire pixels
//! - **Framing**: `ProtocolEncoder` for the legacy and session/video generations,
//!   chunked to the adapter's maximum transfer length
//! - **Pool**: `TransferBufferPool`, a fixed set of reusable transfer buffers
//! - **Dispatch**: `TransferDispatcher` submitting chunks over a `Transport`
//! - **Device**: `Device`, one attached adapter behind a single handle
//! - **Error**: `Trigger6Error`, a typed, `thiserror`-based error hierarchy

pub mod config;
pub mod convert;
pub mod device;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod header;
pub mod mode;
pub mod pool;
pub mod registers;
pub mod session;
pub mod stats;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::{DeviceConfig, ProtocolConfig};
pub use convert::WireEncoding;
pub use device::Device;
pub use dispatch::{DispatchReport, TransferDispatcher};
pub use encoder::{Chunk, ChunkFraming, MAX_TRANSFER_LENGTH, ProtocolEncoder, WireFrame};
pub use error::{DispatchError, PoolError, TransportError, Trigger6Error};
pub use header::{END_OF_BUFFER, LegacyHeader, SessionHeader, VideoFormat, VideoHeader};
pub use mode::{DisplayMode, MODE_COUNT, ModeCatalog};
pub use pool::{TransferBuffer, TransferBufferPool};
pub use session::{Generation, HeaderPlacement, Session, SessionParams, SessionVideo};
pub use stats::{StatsSnapshot, TransferStats};
pub use transport::{
    CompletionMode, ControlRequest, MemoryTransport, Submission, SubmitError, TransferEvent,
    Transport,
};
pub use types::{Framebuffer, Rect};
