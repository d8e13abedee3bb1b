//! Configuration for the streaming tool.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trigger6_core::DeviceConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Adapter session settings.
    pub device: DeviceConfig,
    /// What to render and where to record it.
    pub output: OutputConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Rendering and capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Capture file receiving every control write and bulk transfer.
    pub capture_path: PathBuf,
    /// Requested mode; must be in the emulated adapter's table.
    pub width: u16,
    pub height: u16,
    pub refresh_hz: u16,
    /// Frame updates to send after the initial full frame.
    pub frames: u32,
    /// Delay between updates in milliseconds (0 = as fast as possible).
    pub frame_interval_ms: u64,
    /// Edge length of the moving square in the test pattern.
    pub box_size: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            capture_path: PathBuf::from("trigger6.cap"),
            width: 1280,
            height: 720,
            refresh_hz: 60,
            frames: 120,
            frame_interval_ms: 16,
            box_size: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl StreamConfig {
    /// Load the stream configuration from `path`.
    ///
    /// A missing, unreadable or malformed file leaves the built-in
    /// defaults in place; the reason is logged.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no stream config; streaming with built-in defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read stream config; streaming with built-in defaults");
                return Self::default();
            }
        };
        match toml::from_str::<Self>(&contents) {
            Ok(config) => {
                debug!(
                    path = %path.display(),
                    capture = %config.output.capture_path.display(),
                    protocol = ?config.device.protocol,
                    "stream config loaded"
                );
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stream config rejected; streaming with built-in defaults");
                Self::default()
            }
        }
    }

    /// Write the default configuration to `path` for `--init-config`.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "default stream config written");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
