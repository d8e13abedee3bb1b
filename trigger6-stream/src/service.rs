//! Streaming session driver.
//!
//! Attaches the core to an emulated adapter, programs the configured
//! mode and pushes a moving test pattern through it, recording every
//! USB request to the capture writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tracing::{info, warn};

use trigger6_core::{Device, StatsSnapshot};

use crate::capture::CaptureTransport;
use crate::config::StreamConfig;
use crate::emulator::{EmulatedAdapter, STATUS_CONNECTED};
use crate::pattern::TestPattern;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a finished run sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReport {
    /// Frame updates handed to the device, the initial full frame included.
    pub updates: u32,
    pub stats: StatsSnapshot,
}

// ── StreamService ────────────────────────────────────────────────

pub struct StreamService {
    config: StreamConfig,
    running: Arc<AtomicBool>,
}

impl StreamService {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle that stops the run from another task (e.g. Ctrl-C).
    /// Storing `false` before the run starts still takes effect: only
    /// the initial full frame is sent.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Stream to the configured capture file.
    pub async fn run(&self) -> Result<StreamReport, BoxError> {
        let path = &self.config.output.capture_path;
        let file = tokio::fs::File::create(path).await?;
        info!("capturing to {}", path.display());
        let (report, _file) = self.run_with(file).await?;
        Ok(report)
    }

    /// Stream to `writer`, handing it back when the capture is complete.
    pub async fn run_with<W>(&self, writer: W) -> Result<(StreamReport, W), BoxError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let out = &self.config.output;

        let (transport, capture) = CaptureTransport::new(EmulatedAdapter::default(), writer);
        let transport = Arc::new(transport);
        let mut device = Device::attach(Arc::clone(&transport), self.config.device.clone()).await?;

        let status = device.connector_status().await?;
        if status != STATUS_CONNECTED {
            warn!(status, "no monitor reported; streaming anyway");
        }
        let mode = device.set_mode(out.width, out.height, out.refresh_hz).await?;
        device.enable_output().await?;
        info!(%mode, frames = out.frames, "streaming test pattern");

        let mut pattern = TestPattern::new(u32::from(out.width), u32::from(out.height), out.box_size);
        device
            .notify_damage(pattern.bounds(), &pattern.framebuffer())
            .await?;
        let mut updates = 1;

        let interval = Duration::from_millis(out.frame_interval_ms);
        for _ in 0..out.frames {
            if !self.running.load(Ordering::SeqCst) {
                info!("stop requested");
                break;
            }
            let damage = pattern.advance();
            device.notify_damage(damage, &pattern.framebuffer()).await?;
            updates += 1;
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        device.disable_output().await?;
        let stats = device.detach().await;
        info!(updates, %stats, "stream finished");

        // The writer task ends once the last transport handle is gone.
        drop(transport);
        let writer = capture.await??;

        Ok((StreamReport { updates, stats }, writer))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use trigger6_core::{HeaderPlacement, ProtocolConfig, SessionParams, VideoFormat};

    use super::*;
    use crate::inspect::inspect;

    fn config(frames: u32) -> StreamConfig {
        let mut config = StreamConfig::default();
        config.output.width = 640;
        config.output.height = 480;
        config.output.frames = frames;
        config.output.frame_interval_ms = 0;
        config
    }

    #[tokio::test]
    async fn legacy_run_is_captured() {
        let service = StreamService::new(config(3));
        let (report, capture) = service.run_with(Vec::new()).await.unwrap();
        assert_eq!(report.updates, 4);
        assert_eq!(report.stats.frames_sent, 4);
        assert_eq!(report.stats.transfers_failed, 0);

        let mut out = Vec::new();
        let summary = inspect(&capture[..], &mut out).await.unwrap();
        assert_eq!(summary.control_reads, 3);
        assert_eq!(summary.control_writes, 3);
        assert_eq!(summary.legacy_updates, 4);
        assert_eq!(summary.bulk_bytes as u64, report.stats.bytes_completed);
        // Full 640x480 frame: 8 + 614400 + 8 bytes in 65536-byte chunks.
        assert!(summary.bulk_transfers >= 10);
    }

    #[tokio::test]
    async fn session_video_run_is_captured() {
        let mut config = config(2);
        config.device.protocol = ProtocolConfig::SessionVideo(SessionParams {
            session_number: 1,
            output_index: 0,
            destination_address: 0,
            frame_type: 0,
            format: VideoFormat::Bgr24,
            header_placement: HeaderPlacement::Inline,
            session_reserved: [0; 8],
            video_reserved: [0; 4],
        });

        let (report, capture) = StreamService::new(config)
            .run_with(Vec::new())
            .await
            .unwrap();
        assert_eq!(report.updates, 3);

        let mut out = Vec::new();
        let summary = inspect(&capture[..], &mut out).await.unwrap();
        assert_eq!(summary.video_updates, 3);
        assert_eq!(summary.legacy_updates, 0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("set resolution 640x480@60"));
    }

    #[tokio::test]
    async fn stop_before_run_sends_only_first_frame() {
        let service = StreamService::new(config(5));
        service.stop_handle().store(false, Ordering::SeqCst);

        let (report, capture) = service.run_with(Vec::new()).await.unwrap();
        assert_eq!(report.updates, 1);
        assert_eq!(report.stats.frames_sent, 1);

        let mut out = Vec::new();
        let summary = inspect(&capture[..], &mut out).await.unwrap();
        assert_eq!(summary.legacy_updates, 1);
        // Output is still switched off on the way out.
        assert_eq!(summary.control_writes, 3);
    }

    #[tokio::test]
    async fn unknown_mode_fails() {
        let mut config = config(1);
        config.output.width = 3840;
        config.output.height = 2160;
        assert!(StreamService::new(config).run_with(Vec::new()).await.is_err());
    }
}
