//! Wire headers for both adapter protocol generations.
//!
//! ## Legacy frame update (8 bytes, big-endian fields)
//!
//! ```text
//! marker:   u16 BE  (0xff00)
//! x:        u8      (in 16-pixel blocks)
//! y:        u16 BE
//! width:    u8      (in 16-pixel blocks)
//! height:   u16 BE
//! ```
//! followed by YUV 4:2:2 payload and [`END_OF_BUFFER`].
//!
//! ## Session header (32 bytes, little-endian)
//!
//! ```text
//! session:        u32
//! total_length:   u32
//! address:        u32
//! chunk_length:   u32
//! offset:         u32
//! output_index:   u32
//! reserved:       [u8; 8]
//! ```
//!
//! ## Video header (32 bytes, little-endian, first chunk only)
//!
//! ```text
//! frame_type:     u32
//! data_length:    u32
//! sequence:       u32
//! width:          u16
//! height:         u16
//! start_address:  u32
//! end_address:    u32
//! format:         u32
//! reserved:       [u8; 4]
//! ```

use serde::{Deserialize, Serialize};

use crate::convert::WireEncoding;
use crate::error::Trigger6Error;

// ── Constants ────────────────────────────────────────────────────

/// Horizontal block size used by the legacy header's x/width fields.
pub const LEGACY_BLOCK: u32 = 16;

/// Sentinel closing every legacy frame update.
pub const END_OF_BUFFER: [u8; 8] = [0xff, 0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

const LEGACY_MARKER: u16 = 0xff00;

fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

fn le_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

fn check_len(header: &'static str, data: &[u8], expected: usize) -> Result<(), Trigger6Error> {
    if data.len() < expected {
        return Err(Trigger6Error::HeaderTooShort {
            header,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

// ── LegacyHeader ─────────────────────────────────────────────────

/// Frame-update header of the first adapter generation.
///
/// `x` and `width` are in [`LEGACY_BLOCK`] units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyHeader {
    pub x_blocks: u8,
    pub y: u16,
    pub width_blocks: u8,
    pub height: u16,
}

impl LegacyHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 8;

    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&LEGACY_MARKER.to_be_bytes());
        buf[2] = self.x_blocks;
        buf[3..5].copy_from_slice(&self.y.to_be_bytes());
        buf[5] = self.width_blocks;
        buf[6..8].copy_from_slice(&self.height.to_be_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, Trigger6Error> {
        check_len("legacy header", data, Self::SIZE)?;
        if u16::from_be_bytes([data[0], data[1]]) != LEGACY_MARKER {
            return Err(Trigger6Error::InvalidMarker("legacy header"));
        }
        Ok(Self {
            x_blocks: data[2],
            y: u16::from_be_bytes([data[3], data[4]]),
            width_blocks: data[5],
            height: u16::from_be_bytes([data[6], data[7]]),
        })
    }
}

// ── SessionHeader ────────────────────────────────────────────────

/// Per-chunk header of the session/video generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHeader {
    pub session: u32,
    pub total_length: u32,
    pub address: u32,
    pub chunk_length: u32,
    pub offset: u32,
    pub output_index: u32,
    pub reserved: [u8; 8],
}

impl SessionHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 32;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.session.to_le_bytes());
        buf[4..8].copy_from_slice(&self.total_length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.address.to_le_bytes());
        buf[12..16].copy_from_slice(&self.chunk_length.to_le_bytes());
        buf[16..20].copy_from_slice(&self.offset.to_le_bytes());
        buf[20..24].copy_from_slice(&self.output_index.to_le_bytes());
        buf[24..32].copy_from_slice(&self.reserved);
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, Trigger6Error> {
        check_len("session header", data, Self::SIZE)?;
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[24..32]);
        Ok(Self {
            session: le_u32(data, 0),
            total_length: le_u32(data, 4),
            address: le_u32(data, 8),
            chunk_length: le_u32(data, 12),
            offset: le_u32(data, 16),
            output_index: le_u32(data, 20),
            reserved,
        })
    }
}

// ── VideoFormat ──────────────────────────────────────────────────

/// Pixel-format tag carried in the video header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Nv12,
    Bgr24,
    Jpeg,
}

impl VideoFormat {
    /// Device-defined tag value.
    pub const fn tag(self) -> u32 {
        match self {
            VideoFormat::Nv12 => 0x6,
            VideoFormat::Bgr24 => 0x9,
            VideoFormat::Jpeg => 0xD,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x6 => Some(VideoFormat::Nv12),
            0x9 => Some(VideoFormat::Bgr24),
            0xD => Some(VideoFormat::Jpeg),
            _ => None,
        }
    }

    /// Payload encoding produced for this format, if one exists.
    pub fn wire_encoding(self) -> Option<WireEncoding> {
        match self {
            VideoFormat::Bgr24 => Some(WireEncoding::Bgr24),
            VideoFormat::Nv12 | VideoFormat::Jpeg => None,
        }
    }
}

// ── VideoHeader ──────────────────────────────────────────────────

/// Frame description sent once at the start of a session/video update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoHeader {
    pub frame_type: u32,
    pub data_length: u32,
    pub sequence: u32,
    pub width: u16,
    pub height: u16,
    pub start_address: u32,
    pub end_address: u32,
    /// Raw format tag; see [`VideoFormat::from_tag`].
    pub format: u32,
    pub reserved: [u8; 4],
}

impl VideoHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 32;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.frame_type.to_le_bytes());
        buf[4..8].copy_from_slice(&self.data_length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[12..14].copy_from_slice(&self.width.to_le_bytes());
        buf[14..16].copy_from_slice(&self.height.to_le_bytes());
        buf[16..20].copy_from_slice(&self.start_address.to_le_bytes());
        buf[20..24].copy_from_slice(&self.end_address.to_le_bytes());
        buf[24..28].copy_from_slice(&self.format.to_le_bytes());
        buf[28..32].copy_from_slice(&self.reserved);
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, Trigger6Error> {
        check_len("video header", data, Self::SIZE)?;
        let mut reserved = [0u8; 4];
        reserved.copy_from_slice(&data[28..32]);
        Ok(Self {
            frame_type: le_u32(data, 0),
            data_length: le_u32(data, 4),
            sequence: le_u32(data, 8),
            width: le_u16(data, 12),
            height: le_u16(data, 14),
            start_address: le_u32(data, 16),
            end_address: le_u32(data, 20),
            format: le_u32(data, 24),
            reserved,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_header_bytes() {
        let hdr = LegacyHeader {
            x_blocks: 2,
            y: 0x0102,
            width_blocks: 4,
            height: 0x0304,
        };
        assert_eq!(hdr.encode(), [0xff, 0x00, 2, 0x01, 0x02, 4, 0x03, 0x04]);
        assert_eq!(LegacyHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn legacy_header_bad_marker() {
        let err = LegacyHeader::decode(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, Trigger6Error::InvalidMarker(_)));
    }

    #[test]
    fn session_header_layout() {
        let hdr = SessionHeader {
            session: 1,
            total_length: 0x0001_0020,
            address: 0xAABB_CCDD,
            chunk_length: 0x8000,
            offset: 0x10000,
            output_index: 0,
            reserved: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        let bytes = hdr.encode();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(&bytes[16..20], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(&bytes[24..32], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(SessionHeader::decode(&bytes).unwrap(), hdr);
    }

    #[test]
    fn video_header_layout() {
        let hdr = VideoHeader {
            frame_type: 3,
            data_length: 1920 * 1080 * 3,
            sequence: 7,
            width: 1920,
            height: 1080,
            start_address: 0,
            end_address: 1920 * 1080 * 3,
            format: VideoFormat::Bgr24.tag(),
            reserved: [0; 4],
        };
        let bytes = hdr.encode();
        assert_eq!(&bytes[12..14], &1920u16.to_le_bytes());
        assert_eq!(&bytes[24..28], &[0x09, 0, 0, 0]);
        assert_eq!(VideoHeader::decode(&bytes).unwrap(), hdr);
    }

    #[test]
    fn format_tags() {
        assert_eq!(VideoFormat::Nv12.tag(), 0x6);
        assert_eq!(VideoFormat::Bgr24.tag(), 0x9);
        assert_eq!(VideoFormat::Jpeg.tag(), 0xD);
        assert_eq!(VideoFormat::from_tag(0xD), Some(VideoFormat::Jpeg));
        assert_eq!(VideoFormat::from_tag(0x7), None);
    }

    #[test]
    fn headers_too_short() {
        assert!(SessionHeader::decode(&[0u8; 16]).is_err());
        assert!(VideoHeader::decode(&[0u8; 31]).is_err());
        assert!(LegacyHeader::decode(&[0xff]).is_err());
    }
}
