//! Bounded pool of reusable bulk-transfer buffers.
//!
//! The pool owns a fixed number of equally sized buffers. A producer
//! [`acquire`](TransferBufferPool::acquire)s one, fills it and hands it
//! to the transport. The transport's completion hands it back with
//! [`release`](TransferBufferPool::release), possibly from another
//! thread.
//!
//! ## Synchronization
//!
//! - A tokio [`Semaphore`] counts free buffers. Waiters are served in
//!   FIFO order and each release wakes exactly one of them.
//! - A [`Mutex`] guards the free list and the per-slot in-flight flags.
//! - A [`Notify`] wakes [`drain_and_destroy`](TransferBufferPool::drain_and_destroy)
//!   whenever a buffer comes back.
//!
//! A [`TransferBuffer`] is a move-only value that owns its storage, so a
//! buffer cannot be released twice and teardown never frees memory that
//! a transfer still uses. Dropping a buffer returns it to its pool just
//! like [`release`](TransferBufferPool::release).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PoolError;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

// ── TransferBuffer ───────────────────────────────────────────────

/// One fixed-capacity transfer buffer, checked out of a pool.
///
/// Goes back to the pool when dropped.
pub struct TransferBuffer {
    pool: Arc<PoolInner>,
    slot: usize,
    data: Box<[u8]>,
    len: usize,
}

impl TransferBuffer {
    /// Index of this buffer within its pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append `bytes` after the current contents.
    ///
    /// # Panics
    ///
    /// Panics if the buffer would overflow its fixed capacity.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let end = self.len + bytes.len();
        assert!(
            end <= self.data.len(),
            "transfer of {end} bytes exceeds buffer capacity {}",
            self.data.len()
        );
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Drop for TransferBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.check_in(self.slot, data);
    }
}

impl std::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("slot", &self.slot)
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

// ── TransferBufferPool ───────────────────────────────────────────

/// Storage of a buffer sitting on the free list.
struct FreeSlot {
    slot: usize,
    data: Box<[u8]>,
}

struct PoolState {
    free: VecDeque<FreeSlot>,
    in_flight: Vec<bool>,
}

struct PoolInner {
    id: u64,
    capacity: usize,
    buffer_len: usize,
    available: Semaphore,
    state: Mutex<PoolState>,
    returned: Notify,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a buffer off the free list. The caller must hold a permit.
    fn checkout(self: &Arc<Self>) -> TransferBuffer {
        let FreeSlot { slot, data } = {
            let mut state = self.lock();
            let free = state
                .free
                .pop_front()
                .expect("free list out of sync with semaphore permits");
            debug_assert!(!state.in_flight[free.slot], "free buffer marked in flight");
            state.in_flight[free.slot] = true;
            free
        };
        TransferBuffer {
            pool: Arc::clone(self),
            slot,
            data,
            len: 0,
        }
    }

    /// Put a slot's storage back on the free list and wake one waiter.
    fn check_in(&self, slot: usize, data: Box<[u8]>) {
        {
            let mut state = self.lock();
            debug_assert!(state.in_flight[slot], "buffer {slot} returned while not in flight");
            state.in_flight[slot] = false;
            state.free.push_back(FreeSlot { slot, data });
        }
        self.available.add_permits(1);
        self.returned.notify_waiters();
    }
}

/// Shared handle to a fixed set of transfer buffers.
///
/// Cloning is cheap; completions keep a clone to release buffers.
#[derive(Clone)]
pub struct TransferBufferPool {
    inner: Arc<PoolInner>,
}

impl TransferBufferPool {
    /// Allocate `capacity` buffers of `buffer_len` bytes each.
    pub fn new(capacity: usize, buffer_len: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be > 0");
        assert!(buffer_len > 0, "buffer length must be > 0");

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let free = (0..capacity)
            .map(|slot| FreeSlot {
                slot,
                data: vec![0u8; buffer_len].into_boxed_slice(),
            })
            .collect();

        debug!(pool = id, capacity, buffer_len, "transfer pool created");

        Self {
            inner: Arc::new(PoolInner {
                id,
                capacity,
                buffer_len,
                available: Semaphore::new(capacity),
                state: Mutex::new(PoolState {
                    free,
                    in_flight: vec![false; capacity],
                }),
                returned: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Capacity of each buffer in bytes.
    pub fn buffer_len(&self) -> usize {
        self.inner.buffer_len
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().in_flight.iter().filter(|f| **f).count()
    }

    /// `(free, in_flight)` taken under one lock.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.inner.lock();
        (state.free.len(), state.in_flight.iter().filter(|f| **f).count())
    }

    /// `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.available.is_closed()
    }

    /// Wait for a free buffer.
    ///
    /// Returns [`PoolError::Shutdown`] if the pool is (or becomes) shut
    /// down while waiting. Cancel-safe: dropping the future never loses
    /// a buffer.
    pub async fn acquire(&self) -> Result<TransferBuffer, PoolError> {
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .map_err(|_| PoolError::Shutdown)?;
        // The permit now travels with the buffer and is restored when it
        // comes back.
        permit.forget();
        Ok(self.inner.checkout())
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`PoolError::Cancelled`] when `cancel` fires.
    pub async fn acquire_or_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<TransferBuffer, PoolError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PoolError::Cancelled),
            result = self.acquire() => result,
        }
    }

    /// Return an in-flight buffer and wake one waiter. Same as dropping
    /// it, but checks that the buffer came from this pool.
    ///
    /// Never blocks beyond the free-list lock, so completions may call
    /// it from any thread.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` belongs to another pool.
    pub fn release(&self, buffer: TransferBuffer) {
        assert!(
            Arc::ptr_eq(&buffer.pool, &self.inner),
            "buffer released to a pool that does not own it"
        );
        drop(buffer);
    }

    /// Refuse further acquires and fail every waiting one with
    /// [`PoolError::Shutdown`]. In-flight buffers can still be released.
    pub fn shutdown(&self) {
        self.inner.available.close();
    }

    /// Shut down, wait for every in-flight buffer to come back, then free
    /// all buffers. Returns how many were freed.
    pub async fn drain_and_destroy(self) -> usize {
        self.shutdown();
        loop {
            let returned = self.inner.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if state.free.len() == self.inner.capacity {
                    let freed = state.free.drain(..).count();
                    debug!(pool = self.inner.id, freed, "transfer pool destroyed");
                    return freed;
                }
            }

            returned.await;
        }
    }
}

impl std::fmt::Debug for TransferBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (free, in_flight) = self.counts();
        f.debug_struct("TransferBufferPool")
            .field("id", &self.inner.id)
            .field("capacity", &self.inner.capacity)
            .field("free", &free)
            .field("in_flight", &in_flight)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
