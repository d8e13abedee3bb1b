//! In-process [`Transport`] backed by plain memory.
//!
//! Serves a fixed mode table and connector status, records every
//! control write and bulk transfer, and completes submissions either
//! immediately, on a spawned task, or when the owner says so.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::trace;

use super::{ControlRequest, SubmitError, Submission, Transport};
use crate::error::TransportError;
use crate::registers::{REQUEST_CONNECTOR_STATUS, REQUEST_READ_MODES};

/// When accepted submissions complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Inside `submit`.
    #[default]
    Immediate,
    /// On a tokio task spawned by `submit`.
    Spawned,
    /// Held until [`MemoryTransport::complete_pending`].
    Deferred,
}

/// A control write as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedControl {
    pub request: ControlRequest,
    pub data: Vec<u8>,
}

/// A bulk transfer as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBulk {
    pub frame: u64,
    pub chunk: usize,
    pub offset: usize,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct State {
    submissions: usize,
    fail_at: Option<(usize, TransportError)>,
    disconnected: bool,
    reads: Vec<ControlRequest>,
    writes: Vec<RecordedControl>,
    bulk: Vec<RecordedBulk>,
    pending: VecDeque<Submission>,
}

pub struct MemoryTransport {
    mode_table: Vec<u8>,
    connector_status: u8,
    completion: CompletionMode,
    state: Mutex<State>,
}

impl MemoryTransport {
    pub fn new(mode_table: Vec<u8>) -> Self {
        Self {
            mode_table,
            connector_status: 0,
            completion: CompletionMode::Immediate,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_connector_status(mut self, status: u8) -> Self {
        self.connector_status = status;
        self
    }

    pub fn with_completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject the `n`-th submission (zero-based, counted over the
    /// transport's lifetime) with `error`.
    pub fn fail_submission(&self, n: usize, error: TransportError) {
        self.state().fail_at = Some((n, error));
    }

    /// Fail every later request with [`TransportError::Disconnected`]
    /// and complete held submissions the same way.
    pub fn disconnect(&self) {
        let pending = {
            let mut state = self.state();
            state.disconnected = true;
            std::mem::take(&mut state.pending)
        };
        for sub in pending {
            sub.complete(Err(TransportError::Disconnected));
        }
    }

    /// Complete all held submissions in submission order.
    pub fn complete_pending(&self, outcome: Result<(), TransportError>) -> usize {
        let pending = std::mem::take(&mut self.state().pending);
        let n = pending.len();
        for sub in pending {
            sub.complete(outcome.clone());
        }
        n
    }

    /// Complete all held submissions, newest first.
    pub fn complete_pending_reversed(&self, outcome: Result<(), TransportError>) -> usize {
        let pending = std::mem::take(&mut self.state().pending);
        let n = pending.len();
        for sub in pending.into_iter().rev() {
            sub.complete(outcome.clone());
        }
        n
    }

    /// Complete the oldest held submission, if any.
    pub fn complete_next(&self, outcome: Result<(), TransportError>) -> bool {
        let next = self.state().pending.pop_front();
        match next {
            Some(sub) => {
                sub.complete(outcome);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn submission_count(&self) -> usize {
        self.state().submissions
    }

    pub fn control_reads(&self) -> Vec<ControlRequest> {
        self.state().reads.clone()
    }

    pub fn control_writes(&self) -> Vec<RecordedControl> {
        self.state().writes.clone()
    }

    pub fn bulk_transfers(&self) -> Vec<RecordedBulk> {
        self.state().bulk.clone()
    }

    /// All bulk payloads concatenated in submission order.
    pub fn bulk_bytes(&self) -> Vec<u8> {
        self.state()
            .bulk
            .iter()
            .flat_map(|b| b.data.iter().copied())
            .collect()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryTransport")
            .field("completion", &self.completion)
            .field("submissions", &state.submissions)
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn control_read(
        &self,
        request: ControlRequest,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        {
            let mut state = self.state();
            if state.disconnected {
                return Err(TransportError::Disconnected);
            }
            state.reads.push(request);
        }

        match request.request {
            REQUEST_READ_MODES => {
                let start = usize::from(request.index).min(self.mode_table.len());
                let src = &self.mode_table[start..];
                let n = src.len().min(buf.len());
                buf[..n].copy_from_slice(&src[..n]);
                Ok(n)
            }
            REQUEST_CONNECTOR_STATUS => match buf.first_mut() {
                Some(b) => {
                    *b = self.connector_status;
                    Ok(1)
                }
                None => Ok(0),
            },
            other => Err(TransportError::Control {
                request: other,
                reason: "unsupported request".into(),
            }),
        }
    }

    async fn control_write(&self, request: ControlRequest, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.writes.push(RecordedControl {
            request,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn submit(&self, submission: Submission) -> Result<(), SubmitError> {
        let mut state = self.state();
        let n = state.submissions;
        state.submissions += 1;

        if state.disconnected {
            return Err(SubmitError {
                error: TransportError::Disconnected,
                submission,
            });
        }
        if matches!(&state.fail_at, Some((at, _)) if *at == n) {
            if let Some((_, error)) = state.fail_at.take() {
                return Err(SubmitError { error, submission });
            }
        }

        trace!(
            frame = submission.frame(),
            chunk = submission.chunk(),
            len = submission.len(),
            "bulk transfer"
        );
        state.bulk.push(RecordedBulk {
            frame: submission.frame(),
            chunk: submission.chunk(),
            offset: submission.offset(),
            data: submission.data().to_vec(),
        });

        match self.completion {
            CompletionMode::Immediate => {
                drop(state);
                submission.complete(Ok(()));
            }
            CompletionMode::Spawned => {
                drop(state);
                tokio::spawn(async move { submission.complete(Ok(())) });
            }
            CompletionMode::Deferred => state.pending.push_back(submission),
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
