//! Software stand-in for the adapter's control endpoint.
//!
//! Answers mode-table and connector-status reads from a built-in table
//! of common VESA/CEA timings and tracks the output and resolution
//! state that control writes set.

use trigger6_core::mode::{MODE_COUNT, MODE_RECORD_SIZE, MODE_TABLE_SIZE};
use trigger6_core::registers::{
    REQUEST_CONNECTOR_STATUS, REQUEST_OUTPUT_ENABLE, REQUEST_READ_MODES, REQUEST_SET_RESOLUTION,
};
use trigger6_core::{ControlRequest, DisplayMode, TransportError};

/// Connector status byte reported while a monitor is attached.
pub const STATUS_CONNECTED: u8 = 1;

// (clock kHz, Hz, h total, h active, h sync start, h sync, v total, v active, v sync start, v sync, +h, +v)
type Timing = (u32, u16, u16, u16, u16, u16, u16, u16, u16, u16, bool, bool);

const TIMINGS: [Timing; 14] = [
    (148_500, 60, 2200, 1920, 2008, 44, 1125, 1080, 1084, 5, true, true),
    (148_500, 50, 2640, 1920, 2448, 44, 1125, 1080, 1084, 5, true, true),
    (74_250, 30, 2200, 1920, 2008, 44, 1125, 1080, 1084, 5, true, true),
    (146_250, 60, 2240, 1680, 1784, 176, 1089, 1050, 1053, 6, false, true),
    (108_000, 60, 1800, 1600, 1624, 80, 1000, 900, 901, 3, true, true),
    (106_500, 60, 1904, 1440, 1520, 152, 934, 900, 903, 6, false, true),
    (85_500, 60, 1792, 1366, 1436, 143, 798, 768, 771, 3, true, true),
    (108_000, 60, 1688, 1280, 1328, 112, 1066, 1024, 1025, 3, true, true),
    (83_500, 60, 1680, 1280, 1352, 128, 831, 800, 803, 6, false, true),
    (74_250, 60, 1650, 1280, 1390, 40, 750, 720, 725, 5, true, true),
    (74_250, 50, 1980, 1280, 1720, 40, 750, 720, 725, 5, true, true),
    (65_000, 60, 1344, 1024, 1048, 136, 806, 768, 771, 6, false, false),
    (40_000, 60, 1056, 800, 840, 128, 628, 600, 601, 4, true, true),
    (25_175, 60, 800, 640, 656, 96, 525, 480, 490, 2, false, false),
];

/// The built-in timings as mode records.
pub fn builtin_modes() -> Vec<DisplayMode> {
    TIMINGS
        .iter()
        .map(|&(clock, hz, ht, ha, hs, hw, vt, va, vs, vw, hp, vp)| DisplayMode {
            pixel_clock_khz: clock,
            refresh_rate_hz: hz,
            line_total_pixels: ht,
            line_active_pixels: ha,
            line_active_plus_front_porch_pixels: hs,
            line_sync_width: hw,
            frame_total_lines: vt,
            frame_active_lines: va,
            frame_active_plus_front_porch_lines: vs,
            frame_sync_width: vw,
            sync_polarity_0: u8::from(hp),
            sync_polarity_1: u8::from(vp),
            reserved: [0; 4],
        })
        .collect()
}

/// Raw mode table with the built-in timings first and zeroed records after.
pub fn builtin_mode_table() -> Vec<u8> {
    let mut raw = vec![0u8; MODE_TABLE_SIZE];
    for (i, mode) in builtin_modes().iter().take(MODE_COUNT).enumerate() {
        raw[i * MODE_RECORD_SIZE..(i + 1) * MODE_RECORD_SIZE].copy_from_slice(&mode.to_bytes());
    }
    raw
}

// ── EmulatedAdapter ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EmulatedAdapter {
    mode_table: Vec<u8>,
    connector_status: u8,
    output_enabled: bool,
    resolution: Option<DisplayMode>,
}

impl Default for EmulatedAdapter {
    fn default() -> Self {
        Self::new(builtin_mode_table())
    }
}

impl EmulatedAdapter {
    pub fn new(mode_table: Vec<u8>) -> Self {
        Self {
            mode_table,
            connector_status: STATUS_CONNECTED,
            output_enabled: false,
            resolution: None,
        }
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    pub fn resolution(&self) -> Option<&DisplayMode> {
        self.resolution.as_ref()
    }

    /// Answer a vendor IN request.
    pub fn control_read(
        &self,
        request: ControlRequest,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        match request.request {
            REQUEST_READ_MODES => {
                let start = usize::from(request.index).min(self.mode_table.len());
                let src = &self.mode_table[start..];
                let n = src.len().min(buf.len());
                buf[..n].copy_from_slice(&src[..n]);
                Ok(n)
            }
            REQUEST_CONNECTOR_STATUS if !buf.is_empty() => {
                buf[0] = self.connector_status;
                Ok(1)
            }
            other => Err(TransportError::Control {
                request: other,
                reason: "stall".into(),
            }),
        }
    }

    /// Apply a vendor OUT request. Unknown requests are accepted
    /// unchanged, as session headers travel this way.
    pub fn control_write(&mut self, request: ControlRequest, data: &[u8]) -> Result<(), TransportError> {
        match request.request {
            REQUEST_OUTPUT_ENABLE => self.output_enabled = request.index != 0,
            REQUEST_SET_RESOLUTION => {
                let record: &[u8; MODE_RECORD_SIZE] =
                    data.try_into().map_err(|_| TransportError::Control {
                        request: REQUEST_SET_RESOLUTION,
                        reason: format!("expected {MODE_RECORD_SIZE}-byte mode, got {}", data.len()),
                    })?;
                self.resolution = Some(DisplayMode::from_bytes(record));
            }
            _ => {}
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
