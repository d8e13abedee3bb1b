//! Hands encoded frame updates to the transport, one pooled buffer per
//! chunk.
//!
//! Chunks are submitted strictly in order. Acquiring a buffer may wait
//! for an earlier transfer to complete; that wait is the only
//! backpressure on the update path. Completions arrive on the event
//! channel returned by [`TransferDispatcher::new`], in whatever order
//! the transport finishes them.
//!
//! A chunk whose session header travels as a control write gets its
//! buffer first, so the device never sees a header without the bulk
//! write that follows it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::encoder::{ChunkFraming, WireFrame};
use crate::error::DispatchError;
use crate::pool::TransferBufferPool;
use crate::transport::{
    ControlRequest, SubmitError, Submission, TransferEventReceiver, TransferEventSender, Transport,
};
use crate::types::Rect;

/// Outcome of a fully submitted frame update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Frame number carried by this update's [`TransferEvent`](crate::transport::TransferEvent)s.
    pub frame: u64,
    /// Damaged region after block alignment.
    pub rect: Rect,
    pub chunks: usize,
    /// Bytes handed to bulk transfers.
    pub bytes: usize,
}

pub struct TransferDispatcher<T: Transport> {
    transport: Arc<T>,
    pool: TransferBufferPool,
    events: TransferEventSender,
    cancel: CancellationToken,
    next_frame: u64,
}

impl<T: Transport> TransferDispatcher<T> {
    /// Create a dispatcher and the receiving end of its completion
    /// channel.
    ///
    /// The channel is unbounded so completions never block or get lost
    /// on a transport thread. It holds one event per finished chunk
    /// until read; the receiver must be drained continuously (the
    /// [`Device`](crate::Device) monitor task does this) or dropped.
    pub fn new(transport: Arc<T>, pool: TransferBufferPool) -> (Self, TransferEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            transport,
            pool,
            events,
            cancel: CancellationToken::new(),
            next_frame: 0,
        };
        (dispatcher, rx)
    }

    /// Abort buffer waits when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn pool(&self) -> &TransferBufferPool {
        &self.pool
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Submit every chunk of `frame` in order.
    ///
    /// On error the remaining chunks are not submitted; the chunks
    /// counted in [`DispatchError::submitted`] stay in flight and will
    /// still complete. An empty frame submits nothing.
    pub async fn dispatch(&mut self, frame: &WireFrame) -> Result<DispatchReport, DispatchError> {
        let frame_id = self.next_frame;
        self.next_frame += 1;
        let mut bytes = 0;

        for (submitted, chunk) in frame.chunks.iter().enumerate() {
            let mut buffer = self
                .pool
                .acquire_or_cancel(&self.cancel)
                .await
                .map_err(|source| DispatchError::Pool {
                    chunk: chunk.index,
                    submitted,
                    source,
                })?;

            // An out-of-band header is only sent once its bulk write is
            // certain to have a buffer.
            if let ChunkFraming::Control { request, header } = &chunk.framing {
                let written = self
                    .transport
                    .control_write(ControlRequest::new(*request, 0, 0), &header.encode())
                    .await;
                if let Err(source) = written {
                    self.pool.release(buffer);
                    return Err(DispatchError::Transport {
                        chunk: chunk.index,
                        submitted,
                        source,
                    });
                }
            }

            if let ChunkFraming::Inline(header) = &chunk.framing {
                buffer.extend_from_slice(&header.encode());
            }
            buffer.extend_from_slice(&chunk.payload);
            let len = buffer.len();

            let submission = Submission::new(
                buffer,
                self.pool.clone(),
                self.events.clone(),
                frame_id,
                chunk.index,
                chunk.offset,
            );
            if let Err(SubmitError { error, submission }) = self.transport.submit(submission) {
                warn!(frame = frame_id, chunk = chunk.index, %error, "submit failed");
                submission.complete(Err(error.clone()));
                return Err(DispatchError::Transport {
                    chunk: chunk.index,
                    submitted,
                    source: error,
                });
            }

            trace!(frame = frame_id, chunk = chunk.index, len, "chunk submitted");
            bytes += len;
        }

        Ok(DispatchReport {
            frame: frame_id,
            rect: frame.rect,
            chunks: frame.chunks.len(),
            bytes,
        })
    }
}

impl<T: Transport> std::fmt::Debug for TransferDispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferDispatcher")
            .field("pool", &self.pool)
            .field("next_frame", &self.next_frame)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok, task};

    use super::*;
    use crate::encoder::Chunk;
    use crate::error::{PoolError, TransportError};
    use crate::header::SessionHeader;
    use crate::transport::{CompletionMode, MemoryTransport};

    fn frame(chunks: &[&'static [u8]]) -> WireFrame {
        let mut offset = 0;
        let chunks = chunks
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                let chunk = Chunk {
                    index,
                    offset,
                    framing: ChunkFraming::Plain,
                    payload: Bytes::from_static(payload),
                };
                offset += payload.len();
                chunk
            })
            .collect();
        WireFrame {
            rect: Rect::new(0, 0, 16, 1),
            sequence: None,
            stream_len: offset,
            chunks,
        }
    }

    fn deferred() -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport::new(Vec::new()).with_completion(CompletionMode::Deferred))
    }

    #[tokio::test]
    async fn submits_chunks_in_order() {
        let transport = Arc::new(MemoryTransport::new(Vec::new()));
        let pool = TransferBufferPool::new(2, 16);
        let (mut dispatcher, mut rx) = TransferDispatcher::new(transport.clone(), pool.clone());

        let report = dispatcher.dispatch(&frame(&[b"aaaa", b"bb", b"c"])).await.unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.bytes, 7);
        assert_eq!(transport.bulk_bytes(), b"aaaabbc");
        assert_eq!(pool.free_count(), 2);

        let offsets: Vec<_> = (0..3).map(|_| rx.try_recv().unwrap().offset).collect();
        assert_eq!(offsets, vec![0, 4, 6]);
    }

    #[tokio::test]
    async fn frames_are_numbered() {
        let transport = Arc::new(MemoryTransport::new(Vec::new()));
        let (mut dispatcher, _rx) = TransferDispatcher::new(transport, TransferBufferPool::new(1, 8));
        assert_eq!(dispatcher.dispatch(&frame(&[b"x"])).await.unwrap().frame, 0);
        assert_eq!(dispatcher.dispatch(&frame(&[b"y"])).await.unwrap().frame, 1);
    }

    #[test]
    fn waits_for_completion_when_pool_empty() {
        let transport = deferred();
        let pool = TransferBufferPool::new(1, 8);
        let (mut dispatcher, _rx) = TransferDispatcher::new(transport.clone(), pool);
        let wire = frame(&[b"one", b"two"]);

        let mut dispatch = task::spawn(dispatcher.dispatch(&wire));
        assert_pending!(dispatch.poll());
        assert_eq!(transport.submission_count(), 1);

        assert!(transport.complete_next(Ok(())));
        assert!(dispatch.is_woken());
        let report = assert_ready_ok!(dispatch.poll());
        assert_eq!(report.chunks, 2);
        assert_eq!(transport.bulk_bytes(), b"onetwo");
    }

    #[test]
    fn cancel_interrupts_blocked_acquire() {
        let transport = deferred();
        let cancel = CancellationToken::new();
        let (dispatcher, _rx) = TransferDispatcher::new(transport.clone(), TransferBufferPool::new(1, 8));
        let mut dispatcher = dispatcher.with_cancel(cancel.clone());
        let wire = frame(&[b"one", b"two", b"three"]);

        let mut dispatch = task::spawn(dispatcher.dispatch(&wire));
        assert_pending!(dispatch.poll());

        cancel.cancel();
        assert!(dispatch.is_woken());
        let err = assert_ready_err!(dispatch.poll());
        assert_eq!(
            err,
            DispatchError::Pool {
                chunk: 1,
                submitted: 1,
                source: PoolError::Cancelled
            }
        );
        assert_eq!(transport.pending_count(), 1);
    }

    #[tokio::test]
    async fn failed_submit_releases_buffer_and_aborts() {
        let transport = Arc::new(MemoryTransport::new(Vec::new()));
        transport.fail_submission(1, TransportError::Submit("stall".into()));
        let pool = TransferBufferPool::new(2, 8);
        let (mut dispatcher, mut rx) = TransferDispatcher::new(transport.clone(), pool.clone());

        let err = dispatcher
            .dispatch(&frame(&[b"a", b"b", b"c"]))
            .await
            .unwrap_err();
        assert_eq!(err.chunk(), 1);
        assert_eq!(err.submitted(), 1);
        assert_eq!(transport.submission_count(), 2);
        assert_eq!(pool.free_count(), 2);

        assert!(rx.try_recv().unwrap().is_success());
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.chunk, 1);
        assert_eq!(failed.outcome, Err(TransportError::Submit("stall".into())));
    }

    #[tokio::test]
    async fn control_framing_writes_header_first() {
        let transport = Arc::new(MemoryTransport::new(Vec::new()));
        let (mut dispatcher, _rx) =
            TransferDispatcher::new(transport.clone(), TransferBufferPool::new(1, 8));
        let header = SessionHeader {
            session: 1,
            total_length: 3,
            address: 0,
            chunk_length: 3,
            offset: 0,
            output_index: 0,
            reserved: [0; 8],
        };
        let mut wire = frame(&[b"abc"]);
        wire.chunks[0].framing = ChunkFraming::Control {
            request: 0x91,
            header,
        };

        dispatcher.dispatch(&wire).await.unwrap();
        let writes = transport.control_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].request.request, 0x91);
        assert_eq!(writes[0].data, header.encode().to_vec());
        assert_eq!(transport.bulk_bytes(), b"abc");
    }

    fn control_framed(chunks: &[&'static [u8]]) -> WireFrame {
        let mut wire = frame(chunks);
        for chunk in &mut wire.chunks {
            chunk.framing = ChunkFraming::Control {
                request: 0x91,
                header: SessionHeader {
                    session: 1,
                    total_length: 0,
                    address: 0,
                    chunk_length: chunk.payload.len() as u32,
                    offset: chunk.offset as u32,
                    output_index: 0,
                    reserved: [0; 8],
                },
            };
        }
        wire
    }

    #[test]
    fn cancelled_control_chunk_sends_no_header() {
        let transport = deferred();
        let cancel = CancellationToken::new();
        let (dispatcher, _rx) = TransferDispatcher::new(transport.clone(), TransferBufferPool::new(1, 8));
        let mut dispatcher = dispatcher.with_cancel(cancel.clone());
        let wire = control_framed(&[b"one", b"two"]);

        let mut dispatch = task::spawn(dispatcher.dispatch(&wire));
        assert_pending!(dispatch.poll());
        assert_eq!(transport.control_writes().len(), 1);

        cancel.cancel();
        let err = assert_ready_err!(dispatch.poll());
        assert_eq!(err.chunk(), 1);
        assert_eq!(transport.control_writes().len(), transport.bulk_transfers().len());
    }

    #[tokio::test]
    async fn failed_header_write_releases_buffer() {
        let transport = Arc::new(MemoryTransport::new(Vec::new()));
        transport.disconnect();
        let pool = TransferBufferPool::new(1, 8);
        let (mut dispatcher, _rx) = TransferDispatcher::new(transport.clone(), pool.clone());

        let err = dispatcher.dispatch(&control_framed(&[b"abc"])).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Transport {
                chunk: 0,
                submitted: 0,
                source: TransportError::Disconnected
            }
        );
        assert_eq!(pool.counts(), (1, 0));
        assert_eq!(transport.submission_count(), 0);
    }
}
