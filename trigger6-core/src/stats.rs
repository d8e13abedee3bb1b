//! Transfer counters shared between the update path and the completion
//! monitor.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::transport::TransferEvent;

/// Lock-free counters updated as frames are dispatched and transfers
/// complete.
#[derive(Debug, Default)]
pub struct TransferStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    transfers_completed: AtomicU64,
    transfers_failed: AtomicU64,
    bytes_completed: AtomicU64,
}

/// Point-in-time copy of [`TransferStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub bytes_completed: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame update had all of its chunks submitted.
    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame update was abandoned before all chunks were submitted.
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one completion event into the counters.
    pub fn record_completion(&self, event: &TransferEvent) {
        if event.is_success() {
            self.transfers_completed.fetch_add(1, Ordering::Relaxed);
            self.bytes_completed
                .fetch_add(event.len as u64, Ordering::Relaxed);
        } else {
            self.transfers_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            bytes_completed: self.bytes_completed.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Transfers that have finished either way.
    pub fn transfers_finished(&self) -> u64 {
        self.transfers_completed + self.transfers_failed
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frames sent={} dropped={}, transfers ok={} failed={}, {} bytes",
            self.frames_sent,
            self.frames_dropped,
            self.transfers_completed,
            self.transfers_failed,
            self.bytes_completed
        )
    }
}
