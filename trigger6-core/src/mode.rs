//! Display mode table reported by the adapter.
//!
//! The adapter exposes its supported timings as a table of
//! [`MODE_COUNT`] packed little-endian records of [`MODE_RECORD_SIZE`]
//! bytes each. The table is read in two control transfers
//! ([`MODE_TABLE_FIRST_READ`] then [`MODE_TABLE_SECOND_READ`] bytes).
//!
//! ## Record layout
//!
//! ```text
//! pixel_clock_khz:                      u32  (4)
//! refresh_rate_hz:                      u16  (2)
//! line_total_pixels:                    u16  (2)
//! line_active_pixels:                   u16  (2)
//! line_active_plus_front_porch_pixels:  u16  (2)
//! line_sync_width:                      u16  (2)
//! frame_total_lines:                    u16  (2)
//! frame_active_lines:                   u16  (2)
//! frame_active_plus_front_porch_lines:  u16  (2)
//! frame_sync_width:                     u16  (2)
//! reserved[0..3]:                       u16  (6)
//! sync_polarity_0:                      u8   (1)
//! sync_polarity_1:                      u8   (1)
//! reserved[3]:                          u16  (2)
//! ```

use crate::error::Trigger6Error;

// ── Constants ────────────────────────────────────────────────────

/// Size of one packed mode record.
pub const MODE_RECORD_SIZE: usize = 32;

/// Number of records in the adapter's mode table.
pub const MODE_COUNT: usize = 30;

/// Total size of the raw mode table.
pub const MODE_TABLE_SIZE: usize = MODE_RECORD_SIZE * MODE_COUNT;

/// Length of the first mode-table read.
pub const MODE_TABLE_FIRST_READ: usize = 512;

/// Length of the second mode-table read (at offset [`MODE_TABLE_FIRST_READ`]).
pub const MODE_TABLE_SECOND_READ: usize = MODE_TABLE_SIZE - MODE_TABLE_FIRST_READ;

// ── DisplayMode ──────────────────────────────────────────────────

/// One video timing supported by the adapter.
///
/// `reserved` holds the fields whose meaning is unknown; they are kept
/// so that [`to_bytes`](Self::to_bytes) reproduces the record exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DisplayMode {
    pub pixel_clock_khz: u32,
    pub refresh_rate_hz: u16,
    pub line_total_pixels: u16,
    pub line_active_pixels: u16,
    pub line_active_plus_front_porch_pixels: u16,
    pub line_sync_width: u16,
    pub frame_total_lines: u16,
    pub frame_active_lines: u16,
    pub frame_active_plus_front_porch_lines: u16,
    pub frame_sync_width: u16,
    pub sync_polarity_0: u8,
    pub sync_polarity_1: u8,
    pub reserved: [u16; 4],
}

impl DisplayMode {
    /// Decode one packed record.
    pub fn from_bytes(bytes: &[u8; MODE_RECORD_SIZE]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([bytes[off], bytes[off + 1]]);
        Self {
            pixel_clock_khz: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            refresh_rate_hz: u16_at(4),
            line_total_pixels: u16_at(6),
            line_active_pixels: u16_at(8),
            line_active_plus_front_porch_pixels: u16_at(10),
            line_sync_width: u16_at(12),
            frame_total_lines: u16_at(14),
            frame_active_lines: u16_at(16),
            frame_active_plus_front_porch_lines: u16_at(18),
            frame_sync_width: u16_at(20),
            reserved: [u16_at(22), u16_at(24), u16_at(26), u16_at(30)],
            sync_polarity_0: bytes[28],
            sync_polarity_1: bytes[29],
        }
    }

    /// Encode back into the packed record the adapter expects.
    pub fn to_bytes(&self) -> [u8; MODE_RECORD_SIZE] {
        let mut buf = [0u8; MODE_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.pixel_clock_khz.to_le_bytes());
        buf[4..6].copy_from_slice(&self.refresh_rate_hz.to_le_bytes());
        buf[6..8].copy_from_slice(&self.line_total_pixels.to_le_bytes());
        buf[8..10].copy_from_slice(&self.line_active_pixels.to_le_bytes());
        buf[10..12].copy_from_slice(&self.line_active_plus_front_porch_pixels.to_le_bytes());
        buf[12..14].copy_from_slice(&self.line_sync_width.to_le_bytes());
        buf[14..16].copy_from_slice(&self.frame_total_lines.to_le_bytes());
        buf[16..18].copy_from_slice(&self.frame_active_lines.to_le_bytes());
        buf[18..20].copy_from_slice(&self.frame_active_plus_front_porch_lines.to_le_bytes());
        buf[20..22].copy_from_slice(&self.frame_sync_width.to_le_bytes());
        buf[22..24].copy_from_slice(&self.reserved[0].to_le_bytes());
        buf[24..26].copy_from_slice(&self.reserved[1].to_le_bytes());
        buf[26..28].copy_from_slice(&self.reserved[2].to_le_bytes());
        buf[28] = self.sync_polarity_0;
        buf[29] = self.sync_polarity_1;
        buf[30..32].copy_from_slice(&self.reserved[3].to_le_bytes());
        buf
    }

    /// Active width in pixels.
    pub fn width(&self) -> u16 {
        self.line_active_pixels
    }

    /// Active height in lines.
    pub fn height(&self) -> u16 {
        self.frame_active_lines
    }

    fn matches(&self, width: u16, height: u16, refresh_hz: u16) -> bool {
        self.line_active_pixels == width
            && self.frame_active_lines == height
            && self.refresh_rate_hz == refresh_hz
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@{} ({} kHz)",
            self.line_active_pixels, self.frame_active_lines, self.refresh_rate_hz, self.pixel_clock_khz
        )
    }
}

// ── ModeCatalog ──────────────────────────────────────────────────

/// The adapter's mode table, in hardware order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeCatalog {
    modes: Vec<DisplayMode>,
}

impl ModeCatalog {
    /// Decode the raw table. Only the first [`MODE_TABLE_SIZE`] bytes
    /// are read; field values are not checked for plausibility.
    pub fn decode(raw: &[u8]) -> Result<Self, Trigger6Error> {
        if raw.len() < MODE_TABLE_SIZE {
            return Err(Trigger6Error::InvalidModeTable {
                expected: MODE_TABLE_SIZE,
                actual: raw.len(),
            });
        }

        let modes = raw[..MODE_TABLE_SIZE]
            .chunks_exact(MODE_RECORD_SIZE)
            .map(|record| {
                let mut bytes = [0u8; MODE_RECORD_SIZE];
                bytes.copy_from_slice(record);
                DisplayMode::from_bytes(&bytes)
            })
            .collect();

        Ok(Self { modes })
    }

    /// Re-encode the whole table.
    pub fn encode(&self) -> Vec<u8> {
        self.modes.iter().flat_map(|m| m.to_bytes()).collect()
    }

    /// First mode matching `width`x`height`@`refresh_hz`, in table order.
    pub fn lookup(&self, width: u16, height: u16, refresh_hz: u16) -> Option<DisplayMode> {
        self.modes
            .iter()
            .find(|m| m.matches(width, height, refresh_hz))
            .copied()
    }

    pub fn modes(&self) -> &[DisplayMode] {
        &self.modes
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayMode> {
        self.modes.iter()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u16, height: u16, refresh: u16, clock: u32) -> DisplayMode {
        DisplayMode {
            pixel_clock_khz: clock,
            refresh_rate_hz: refresh,
            line_total_pixels: width + 280,
            line_active_pixels: width,
            line_active_plus_front_porch_pixels: width + 88,
            line_sync_width: 44,
            frame_total_lines: height + 45,
            frame_active_lines: height,
            frame_active_plus_front_porch_lines: height + 4,
            frame_sync_width: 5,
            sync_polarity_0: 1,
            sync_polarity_1: 1,
            reserved: [0x11, 0x22, 0x33, 0x44],
        }
    }

    fn table(modes: &[DisplayMode]) -> Vec<u8> {
        let mut raw = vec![0u8; MODE_TABLE_SIZE];
        for (i, m) in modes.iter().enumerate() {
            raw[i * MODE_RECORD_SIZE..(i + 1) * MODE_RECORD_SIZE].copy_from_slice(&m.to_bytes());
        }
        raw
    }

    #[test]
    fn read_sizes_cover_table() {
        assert_eq!(MODE_TABLE_FIRST_READ, 512);
        assert_eq!(MODE_TABLE_SECOND_READ, 448);
        assert_eq!(MODE_TABLE_FIRST_READ / MODE_RECORD_SIZE, 16);
    }

    #[test]
    fn decodes_fixed_count() {
        let catalog = ModeCatalog::decode(&table(&[])).unwrap();
        assert_eq!(catalog.len(), MODE_COUNT);
    }

    #[test]
    fn decodes_field_offsets() {
        let mut raw = vec![0u8; MODE_TABLE_SIZE];
        raw[0..4].copy_from_slice(&148_500u32.to_le_bytes());
        raw[4..6].copy_from_slice(&60u16.to_le_bytes());
        raw[8..10].copy_from_slice(&1920u16.to_le_bytes());
        raw[16..18].copy_from_slice(&1080u16.to_le_bytes());
        raw[28] = 1;
        raw[30..32].copy_from_slice(&0xBEEFu16.to_le_bytes());

        let catalog = ModeCatalog::decode(&raw).unwrap();
        let first = catalog.modes()[0];
        assert_eq!(first.pixel_clock_khz, 148_500);
        assert_eq!(first.refresh_rate_hz, 60);
        assert_eq!(first.width(), 1920);
        assert_eq!(first.height(), 1080);
        assert_eq!(first.sync_polarity_0, 1);
        assert_eq!(first.sync_polarity_1, 0);
        assert_eq!(first.reserved[3], 0xBEEF);
    }

    #[test]
    fn reserved_fields_survive_reencode() {
        let raw = table(&[mode(1280, 720, 60, 74_250), mode(1920, 1080, 60, 148_500)]);
        let catalog = ModeCatalog::decode(&raw).unwrap();
        assert_eq!(catalog.encode(), raw);
    }

    #[test]
    fn lookup_exact_match() {
        let raw = table(&[mode(1280, 720, 60, 74_250), mode(1920, 1080, 60, 148_500)]);
        let catalog = ModeCatalog::decode(&raw).unwrap();

        let hit = catalog.lookup(1920, 1080, 60).unwrap();
        assert_eq!(hit.pixel_clock_khz, 148_500);
        assert!(catalog.lookup(1920, 1080, 59).is_none());
    }

    #[test]
    fn lookup_first_match_wins() {
        let raw = table(&[mode(1920, 1080, 60, 148_500), mode(1920, 1080, 60, 138_500)]);
        let catalog = ModeCatalog::decode(&raw).unwrap();
        assert_eq!(catalog.lookup(1920, 1080, 60).unwrap().pixel_clock_khz, 148_500);
    }

    #[test]
    fn short_table_rejected() {
        let err = ModeCatalog::decode(&[0u8; MODE_TABLE_FIRST_READ]).unwrap_err();
        assert!(matches!(
            err,
            Trigger6Error::InvalidModeTable {
                expected: 960,
                actual: 512
            }
        ));
    }
}
