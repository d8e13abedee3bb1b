//! Capture file: every USB request the core makes, in order.
//!
//! ## Record format
//!
//! ```text
//! kind:     u8   (1 = control read, 2 = control write, 3 = bulk)
//! request:  u8   (control only)
//! value:    u16  (control only)
//! index:    u16  (control only)
//! chunk:    u16  (bulk only)
//! frame:    u32  (bulk only)
//! offset:   u32  (bulk only)
//! length:   u32
//! data:     [u8; length]
//! ```
//!
//! All multi-byte fields are little-endian.
//!
//! [`CaptureTransport`] is a [`Transport`] that answers control reads
//! from an [`EmulatedAdapter`] and streams records to a writer task.
//! Bulk submissions complete once their record has been written.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::SinkExt;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, FramedWrite};
use tracing::{debug, error};

use trigger6_core::{ControlRequest, SubmitError, Submission, Transport, TransportError};

use crate::emulator::EmulatedAdapter;

/// Fixed size of a record header.
pub const RECORD_HEADER_SIZE: usize = 20;

/// Largest record payload accepted when decoding.
pub const MAX_RECORD_DATA: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown record kind {0}")]
    UnknownKind(u8),

    #[error("record data too large: {0} bytes")]
    TooLarge(usize),
}

// ── CaptureRecord ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    ControlRead = 1,
    ControlWrite = 2,
    Bulk = 3,
}

impl RecordKind {
    pub fn from_u8(v: u8) -> Result<Self, CaptureError> {
        match v {
            1 => Ok(Self::ControlRead),
            2 => Ok(Self::ControlWrite),
            3 => Ok(Self::Bulk),
            other => Err(CaptureError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub kind: RecordKind,
    pub request: ControlRequest,
    pub chunk: u16,
    pub frame: u32,
    pub offset: u32,
    pub data: Bytes,
}

impl CaptureRecord {
    pub fn control(kind: RecordKind, request: ControlRequest, data: &[u8]) -> Self {
        Self {
            kind,
            request,
            chunk: 0,
            frame: 0,
            offset: 0,
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn bulk(submission: &Submission) -> Self {
        Self {
            kind: RecordKind::Bulk,
            request: ControlRequest::new(0, 0, 0),
            chunk: submission.chunk() as u16,
            frame: submission.frame() as u32,
            offset: submission.offset() as u32,
            data: Bytes::copy_from_slice(submission.data()),
        }
    }
}

// ── CaptureCodec ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CaptureCodec;

impl Decoder for CaptureCodec {
    type Item = CaptureRecord;
    type Error = CaptureError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        let kind = RecordKind::from_u8(src[0])?;
        let length = u32::from_le_bytes([src[16], src[17], src[18], src[19]]) as usize;
        if length > MAX_RECORD_DATA {
            return Err(CaptureError::TooLarge(length));
        }
        if src.len() < RECORD_HEADER_SIZE + length {
            src.reserve(RECORD_HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        let mut header = src.split_to(RECORD_HEADER_SIZE);
        header.advance(1);
        let request = ControlRequest::new(
            header.get_u8(),
            header.get_u16_le(),
            header.get_u16_le(),
        );
        let chunk = header.get_u16_le();
        let frame = header.get_u32_le();
        let offset = header.get_u32_le();
        let data = src.split_to(length).freeze();

        Ok(Some(CaptureRecord {
            kind,
            request,
            chunk,
            frame,
            offset,
            data,
        }))
    }
}

impl Encoder<CaptureRecord> for CaptureCodec {
    type Error = CaptureError;

    fn encode(&mut self, item: CaptureRecord, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.data.len() > MAX_RECORD_DATA {
            return Err(CaptureError::TooLarge(item.data.len()));
        }
        dst.reserve(RECORD_HEADER_SIZE + item.data.len());
        dst.put_u8(item.kind as u8);
        dst.put_u8(item.request.request);
        dst.put_u16_le(item.request.value);
        dst.put_u16_le(item.request.index);
        dst.put_u16_le(item.chunk);
        dst.put_u32_le(item.frame);
        dst.put_u32_le(item.offset);
        dst.put_u32_le(item.data.len() as u32);
        dst.extend_from_slice(&item.data);
        Ok(())
    }
}

// ── CaptureTransport ─────────────────────────────────────────────

/// How a queued record reports back once written.
enum Completion {
    Control(oneshot::Sender<Result<(), TransportError>>),
    Bulk(Submission),
}

impl Completion {
    fn finish(self, outcome: Result<(), TransportError>) {
        match self {
            Completion::Control(ack) => {
                let _ = ack.send(outcome);
            }
            Completion::Bulk(submission) => submission.complete(outcome),
        }
    }
}

struct Job {
    record: CaptureRecord,
    completion: Completion,
}

pub struct CaptureTransport {
    adapter: Mutex<EmulatedAdapter>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl CaptureTransport {
    /// Start a writer task recording to `writer`. The task ends, handing
    /// the writer back, once the transport is dropped.
    pub fn new<W>(adapter: EmulatedAdapter, writer: W) -> (Self, JoinHandle<Result<W, CaptureError>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (jobs, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(FramedWrite::new(writer, CaptureCodec), rx));
        let transport = Self {
            adapter: Mutex::new(adapter),
            jobs,
        };
        (transport, handle)
    }

    /// Snapshot of the emulated adapter's state.
    pub fn adapter(&self) -> EmulatedAdapter {
        self.adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn record_control(&self, record: CaptureRecord) -> Result<(), TransportError> {
        let (ack, done) = oneshot::channel();
        self.jobs
            .send(Job {
                record,
                completion: Completion::Control(ack),
            })
            .map_err(|_| TransportError::Disconnected)?;
        done.await.map_err(|_| TransportError::Disconnected)?
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn control_read(
        &self,
        request: ControlRequest,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let n = self
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .control_read(request, buf)?;
        self.record_control(CaptureRecord::control(
            RecordKind::ControlRead,
            request,
            &buf[..n],
        ))
        .await?;
        Ok(n)
    }

    async fn control_write(&self, request: ControlRequest, data: &[u8]) -> Result<(), TransportError> {
        self.adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .control_write(request, data)?;
        self.record_control(CaptureRecord::control(
            RecordKind::ControlWrite,
            request,
            data,
        ))
        .await
    }

    fn submit(&self, submission: Submission) -> Result<(), SubmitError> {
        let record = CaptureRecord::bulk(&submission);
        let job = Job {
            record,
            completion: Completion::Bulk(submission),
        };
        match self.jobs.send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(Job {
                completion: Completion::Bulk(submission),
                ..
            })) => Err(SubmitError {
                error: TransportError::Disconnected,
                submission,
            }),
            Err(mpsc::error::SendError(job)) => {
                job.completion.finish(Err(TransportError::Disconnected));
                Ok(())
            }
        }
    }
}

async fn run_writer<W>(
    mut sink: FramedWrite<W, CaptureCodec>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) -> Result<W, CaptureError>
where
    W: AsyncWrite + Unpin,
{
    let mut records = 0u64;
    while let Some(Job { record, completion }) = jobs.recv().await {
        match sink.send(record).await {
            Ok(()) => {
                records += 1;
                completion.finish(Ok(()));
            }
            Err(e) => {
                error!(error = %e, "capture write failed");
                completion.finish(Err(TransportError::Submit(e.to_string())));
                // Fail everything still queued so buffers return to the pool.
                jobs.close();
                while let Some(job) = jobs.recv().await {
                    job.completion.finish(Err(TransportError::Disconnected));
                }
                return Err(e);
            }
        }
    }

    sink.close().await?;
    debug!(records, "capture writer finished");
    Ok(sink.into_inner())
}

// ── Tests ────────────────────────────────────────────────────────
