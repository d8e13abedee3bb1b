//! One attached adapter: mode table, session state, transfer pool and
//! dispatcher behind a single handle.
//!
//! ```text
//! attach ──► read modes ──► build pool / encoder / dispatcher
//!                               │
//! notify_damage ──► encode ──► dispatch ──► Transport::submit
//!                                               │
//!                    completion monitor ◄── TransferEvent
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::dispatch::{DispatchReport, TransferDispatcher};
use crate::encoder::ProtocolEncoder;
use crate::error::Trigger6Error;
use crate::mode::{DisplayMode, ModeCatalog};
use crate::pool::TransferBufferPool;
use crate::registers;
use crate::session::Generation;
use crate::stats::{StatsSnapshot, TransferStats};
use crate::transport::{TransferEventReceiver, Transport};
use crate::types::{Framebuffer, Rect};

pub struct Device<T: Transport> {
    config: DeviceConfig,
    catalog: ModeCatalog,
    current_mode: Option<DisplayMode>,
    encoder: ProtocolEncoder,
    generation: Generation,
    dispatcher: TransferDispatcher<T>,
    stats: Arc<TransferStats>,
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
}

impl<T: Transport> Device<T> {
    /// Bring up a device session on `transport`.
    ///
    /// Must be called from within a tokio runtime; the completion
    /// monitor runs as a spawned task.
    pub async fn attach(transport: Arc<T>, config: DeviceConfig) -> Result<Self, Trigger6Error> {
        config.validate()?;

        let catalog = registers::read_mode_table(transport.as_ref(), config.output_index).await?;
        for (i, mode) in catalog.iter().enumerate() {
            debug!(index = i, %mode, "adapter mode");
        }

        let pool = TransferBufferPool::new(config.pool_capacity(), config.max_transfer_length);
        let encoder = ProtocolEncoder::new(config.block_granularity, config.max_transfer_length);
        let cancel = CancellationToken::new();
        let (dispatcher, events) = TransferDispatcher::new(transport, pool);
        let dispatcher = dispatcher.with_cancel(cancel.child_token());

        let stats = Arc::new(TransferStats::new());
        let monitor = tokio::spawn(run_monitor(events, stats.clone()));

        info!(
            modes = catalog.len(),
            buffers = config.pool_capacity(),
            buffer_len = config.max_transfer_length,
            protocol = ?config.protocol,
            "device attached"
        );

        Ok(Self {
            generation: config.generation(),
            config,
            catalog,
            current_mode: None,
            encoder,
            dispatcher,
            stats,
            cancel,
            monitor,
        })
    }

    pub fn modes(&self) -> &ModeCatalog {
        &self.catalog
    }

    pub fn current_mode(&self) -> Option<&DisplayMode> {
        self.current_mode.as_ref()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn pool(&self) -> &TransferBufferPool {
        self.dispatcher.pool()
    }

    pub fn transport(&self) -> &Arc<T> {
        self.dispatcher.transport()
    }

    // ── Control ──────────────────────────────────────────────────

    /// Program the first table mode matching `width`x`height`@`refresh_hz`.
    pub async fn set_mode(
        &mut self,
        width: u16,
        height: u16,
        refresh_hz: u16,
    ) -> Result<DisplayMode, Trigger6Error> {
        let mode = self.catalog.lookup(width, height, refresh_hz).ok_or(
            Trigger6Error::ModeNotSupported {
                width,
                height,
                refresh_hz,
            },
        )?;
        registers::set_resolution(self.transport().as_ref(), &mode).await?;
        self.current_mode = Some(mode);
        Ok(mode)
    }

    pub async fn enable_output(&self) -> Result<(), Trigger6Error> {
        registers::enable_output(self.transport().as_ref()).await
    }

    pub async fn disable_output(&self) -> Result<(), Trigger6Error> {
        registers::disable_output(self.transport().as_ref()).await
    }

    pub async fn connector_status(&self) -> Result<u8, Trigger6Error> {
        registers::read_connector_status(self.transport().as_ref(), self.config.output_index).await
    }

    /// Start a new session; the next update carries sequence 0.
    pub fn renegotiate(&mut self, session_number: u32) {
        self.generation.renegotiate(session_number);
        info!(session = session_number, "session renegotiated");
    }

    // ── Updates ──────────────────────────────────────────────────

    /// Encode and submit the update for `rect` of `fb`.
    ///
    /// Returns `Ok(None)` when `rect` is empty. Waits while the transfer
    /// pool is exhausted. A failure part way through drops the rest of
    /// the update; chunks already submitted still complete.
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not inside `fb`.
    pub async fn notify_damage(
        &mut self,
        rect: Rect,
        fb: &Framebuffer<'_>,
    ) -> Result<Option<DispatchReport>, Trigger6Error> {
        let frame = self.encoder.encode(rect, fb, &mut self.generation)?;
        if frame.is_empty() {
            return Ok(None);
        }

        match self.dispatcher.dispatch(&frame).await {
            Ok(report) => {
                self.stats.record_frame_sent();
                Ok(Some(report))
            }
            Err(e) => {
                self.stats.record_frame_dropped();
                warn!(rect = %frame.rect, error = %e, "frame update dropped");
                Err(e.into())
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Interrupt any update waiting for a buffer and fail later ones with
    /// [`PoolError::Cancelled`](crate::error::PoolError::Cancelled).
    /// Used when the device goes away.
    pub fn cancel_pending(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels pending updates from another task.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tear down: wait for every in-flight transfer, free the pool and
    /// stop the completion monitor. Returns the final counters.
    pub async fn detach(self) -> StatsSnapshot {
        let Self {
            dispatcher,
            stats,
            monitor,
            ..
        } = self;

        let pool = dispatcher.pool().clone();
        drop(dispatcher);
        let freed = pool.drain_and_destroy().await;

        if let Err(e) = monitor.await {
            warn!(error = %e, "completion monitor failed");
        }

        let snapshot = stats.snapshot();
        info!(freed, %snapshot, "device detached");
        snapshot
    }
}

impl<T: Transport> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("modes", &self.catalog.len())
            .field("current_mode", &self.current_mode)
            .field("generation", &self.generation)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Fold completions into `stats` until every sender is gone.
async fn run_monitor(mut events: TransferEventReceiver, stats: Arc<TransferStats>) {
    while let Some(event) = events.recv().await {
        stats.record_completion(&event);
        if let Err(e) = &event.outcome {
            warn!(
                frame = event.frame,
                chunk = event.chunk,
                error = %e,
                "transfer failed"
            );
        }
    }
    debug!("completion monitor stopped");
}

// ── Tests ────────────────────────────────────────────────────────
