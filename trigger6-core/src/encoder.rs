//! Frame-update encoder and chunker.
//!
//! Turns one damaged rectangle into a [`WireFrame`]: header bytes plus
//! converted pixels, split into transfers no longer than the transport
//! maximum.
//!
//! - **Legacy**: `[legacy header | YUV422 lines | end-of-buffer]` as one
//!   stream, cut into plain chunks.
//! - **Session/video**: `[video header | BGR24 lines]` as one stream,
//!   cut into chunks that each carry their own session header with the
//!   chunk's offset and length. With inline placement the session
//!   header shares the transfer, so chunk payloads are
//!   [`SessionHeader::SIZE`] bytes shorter.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::convert::{WireEncoding, convert_into};
use crate::error::Trigger6Error;
use crate::header::{END_OF_BUFFER, LEGACY_BLOCK, LegacyHeader, SessionHeader, VideoHeader};
use crate::session::{Generation, HeaderPlacement, SessionVideo};
use crate::types::{Framebuffer, Rect};

// ── Constants ────────────────────────────────────────────────────

/// Largest single bulk transfer the adapter accepts.
pub const MAX_TRANSFER_LENGTH: usize = 65536;

/// Horizontal alignment required for partial updates.
pub const DEFAULT_BLOCK_GRANULARITY: u32 = 16;

// ── Chunking ─────────────────────────────────────────────────────

/// Split `total` bytes into `(offset, len)` spans of at most `max`.
///
/// Yields `ceil(total / max)` contiguous spans in ascending order.
pub fn chunk_spans(total: usize, max: usize) -> impl Iterator<Item = (usize, usize)> {
    assert!(max > 0, "chunk size must be > 0");
    (0..total.div_ceil(max)).map(move |i| {
        let offset = i * max;
        (offset, max.min(total - offset))
    })
}

// ── Chunk ────────────────────────────────────────────────────────

/// How a chunk's session header (if any) is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFraming {
    /// Legacy stream: no per-chunk header.
    Plain,
    /// Session header at the start of the bulk transfer.
    Inline(SessionHeader),
    /// Session header sent as a control write before the bulk transfer.
    Control { request: u8, header: SessionHeader },
}

/// One bounded piece of a [`WireFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the frame's chunks.
    pub index: usize,
    /// Byte offset of `payload` within the frame stream.
    pub offset: usize,
    pub framing: ChunkFraming,
    pub payload: Bytes,
}

impl Chunk {
    /// Bytes this chunk occupies in its bulk transfer.
    pub fn bulk_len(&self) -> usize {
        match self.framing {
            ChunkFraming::Inline(_) => SessionHeader::SIZE + self.payload.len(),
            ChunkFraming::Plain | ChunkFraming::Control { .. } => self.payload.len(),
        }
    }

    /// The session header carried by this chunk, however it travels.
    pub fn session_header(&self) -> Option<&SessionHeader> {
        match &self.framing {
            ChunkFraming::Plain => None,
            ChunkFraming::Inline(header) | ChunkFraming::Control { header, .. } => Some(header),
        }
    }
}

// ── WireFrame ────────────────────────────────────────────────────

/// A fully framed and chunked frame update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    /// The damaged rectangle after block alignment.
    pub rect: Rect,
    /// Video-header sequence number, for session/video framing.
    pub sequence: Option<u32>,
    /// Length of the framed stream, excluding per-chunk session headers.
    pub stream_len: usize,
    pub chunks: Vec<Chunk>,
}

impl WireFrame {
    fn empty(rect: Rect) -> Self {
        Self {
            rect,
            sequence: None,
            stream_len: 0,
            chunks: Vec::new(),
        }
    }

    /// `true` if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes across all bulk transfers.
    pub fn bulk_len(&self) -> usize {
        self.chunks.iter().map(Chunk::bulk_len).sum()
    }
}

// ── ProtocolEncoder ──────────────────────────────────────────────

/// Stateless frame-update encoder; session state lives in the
/// [`Generation`] passed to [`encode`](Self::encode).
#[derive(Debug, Clone)]
pub struct ProtocolEncoder {
    granularity: u32,
    max_transfer_length: usize,
}

impl Default for ProtocolEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_GRANULARITY, MAX_TRANSFER_LENGTH)
    }
}

impl ProtocolEncoder {
    pub fn new(granularity: u32, max_transfer_length: usize) -> Self {
        assert!(granularity > 0, "granularity must be > 0");
        assert!(
            max_transfer_length > SessionHeader::SIZE,
            "max transfer length must exceed the session header"
        );
        Self {
            granularity,
            max_transfer_length,
        }
    }

    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    pub fn max_transfer_length(&self) -> usize {
        self.max_transfer_length
    }

    /// Encode the update for `rect` of `fb`.
    ///
    /// A zero-area rectangle yields an empty frame and consumes no
    /// sequence number.
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not inside the framebuffer; clamping is the
    /// caller's job.
    pub fn encode(
        &self,
        rect: Rect,
        fb: &Framebuffer<'_>,
        generation: &mut Generation,
    ) -> Result<WireFrame, Trigger6Error> {
        assert!(
            rect.fits_within(fb.width(), fb.height()),
            "damage {rect} outside {}x{} framebuffer",
            fb.width(),
            fb.height()
        );

        if rect.is_empty() {
            return Ok(WireFrame::empty(rect));
        }

        let aligned = rect.align_horizontal(self.granularity);
        let frame = match generation {
            Generation::Legacy => self.encode_legacy(aligned, fb)?,
            Generation::SessionVideo(sv) => self.encode_session(aligned, fb, sv)?,
        };

        debug!(
            rect = %frame.rect,
            sequence = ?frame.sequence,
            stream_len = frame.stream_len,
            chunks = frame.chunks.len(),
            "encoded frame update"
        );
        Ok(frame)
    }

    // ── Legacy ───────────────────────────────────────────────────

    fn encode_legacy(&self, rect: Rect, fb: &Framebuffer<'_>) -> Result<WireFrame, Trigger6Error> {
        if rect.x1 % LEGACY_BLOCK != 0 || rect.x2 % LEGACY_BLOCK != 0 {
            return Err(Trigger6Error::InvalidConfig(
                "legacy framing needs 16-pixel block alignment",
            ));
        }

        let header = LegacyHeader {
            x_blocks: narrow_u8("x", rect.x1 / LEGACY_BLOCK)?,
            y: narrow_u16("y", rect.y1)?,
            width_blocks: narrow_u8("width", rect.width() / LEGACY_BLOCK)?,
            height: narrow_u16("height", rect.height())?,
        };

        let encoding = WireEncoding::Yuv422;
        let stream_len = LegacyHeader::SIZE + encoding.payload_len(&rect) + END_OF_BUFFER.len();
        let mut stream = BytesMut::with_capacity(stream_len);
        stream.put_slice(&header.encode());
        convert_into(fb, rect, encoding, &mut stream);
        stream.put_slice(&END_OF_BUFFER);
        let stream = stream.freeze();

        let chunks = chunk_spans(stream.len(), self.max_transfer_length)
            .enumerate()
            .map(|(index, (offset, len))| Chunk {
                index,
                offset,
                framing: ChunkFraming::Plain,
                payload: stream.slice(offset..offset + len),
            })
            .collect();

        Ok(WireFrame {
            rect,
            sequence: None,
            stream_len: stream.len(),
            chunks,
        })
    }

    // ── Session / video ──────────────────────────────────────────

    fn encode_session(
        &self,
        rect: Rect,
        fb: &Framebuffer<'_>,
        sv: &mut SessionVideo,
    ) -> Result<WireFrame, Trigger6Error> {
        let params = &sv.params;
        let encoding = params
            .format
            .wire_encoding()
            .ok_or(Trigger6Error::UnsupportedFormat(params.format))?;

        let width = narrow_u16("width", rect.width())?;
        let height = narrow_u16("height", rect.height())?;
        let pixel_len = encoding.payload_len(&rect);
        let stream_len = VideoHeader::SIZE + pixel_len;
        let total_length = narrow_u32("payload", stream_len)?;
        let data_length = narrow_u32("payload", pixel_len)?;

        let sequence = sv.session.next_sequence();
        let video = VideoHeader {
            frame_type: params.frame_type,
            data_length,
            sequence,
            width,
            height,
            start_address: params.destination_address,
            end_address: params.destination_address.wrapping_add(data_length),
            format: params.format.tag(),
            reserved: params.video_reserved,
        };

        let mut stream = BytesMut::with_capacity(stream_len);
        stream.put_slice(&video.encode());
        convert_into(fb, rect, encoding, &mut stream);
        let stream = stream.freeze();

        let max_payload = match params.header_placement {
            HeaderPlacement::Inline => self.max_transfer_length - SessionHeader::SIZE,
            HeaderPlacement::Control { .. } => self.max_transfer_length,
        };

        let session = sv.session.number();
        let chunks = chunk_spans(stream.len(), max_payload)
            .enumerate()
            .map(|(index, (offset, len))| {
                let header = SessionHeader {
                    session,
                    total_length,
                    address: params.destination_address,
                    chunk_length: len as u32,
                    offset: offset as u32,
                    output_index: params.output_index,
                    reserved: params.session_reserved,
                };
                let framing = match params.header_placement {
                    HeaderPlacement::Inline => ChunkFraming::Inline(header),
                    HeaderPlacement::Control { request } => ChunkFraming::Control { request, header },
                };
                Chunk {
                    index,
                    offset,
                    framing,
                    payload: stream.slice(offset..offset + len),
                }
            })
            .collect();

        Ok(WireFrame {
            rect,
            sequence: Some(sequence),
            stream_len: stream.len(),
            chunks,
        })
    }
}

fn narrow_u8(field: &'static str, value: u32) -> Result<u8, Trigger6Error> {
    u8::try_from(value).map_err(|_| Trigger6Error::RegionTooLarge {
        field,
        value: value.into(),
    })
}

fn narrow_u16(field: &'static str, value: u32) -> Result<u16, Trigger6Error> {
    u16::try_from(value).map_err(|_| Trigger6Error::RegionTooLarge {
        field,
        value: value.into(),
    })
}

fn narrow_u32(field: &'static str, value: usize) -> Result<u32, Trigger6Error> {
    u32::try_from(value).map_err(|_| Trigger6Error::RegionTooLarge {
        field,
        value: value as u64,
    })
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::VideoFormat;
    use crate::session::{SessionParams, SessionVideo};

    fn params(placement: HeaderPlacement) -> SessionParams {
        SessionParams {
            session_number: 3,
            output_index: 1,
            destination_address: 0x1000,
            frame_type: 2,
            format: VideoFormat::Bgr24,
            header_placement: placement,
            session_reserved: [0xAA; 8],
            video_reserved: [0xBB; 4],
        }
    }

    fn solid(width: u32, height: u32) -> Vec<u8> {
        vec![0x80; (width * height * 4) as usize]
    }

    #[test]
    fn spans_match_transfer_limit() {
        let spans: Vec<_> = chunk_spans(150_000, MAX_TRANSFER_LENGTH).collect();
        assert_eq!(spans, vec![(0, 65536), (65536, 65536), (131072, 18928)]);
    }

    #[test]
    fn spans_are_contiguous() {
        for (total, max) in [(0, 7), (1, 7), (7, 7), (8, 7), (1000, 64), (65537, 65536)] {
            let spans: Vec<_> = chunk_spans(total, max).collect();
            assert_eq!(spans.len(), total.div_ceil(max));
            assert_eq!(spans.iter().map(|s| s.1).sum::<usize>(), total);
            let mut expected = 0;
            for (offset, len) in spans {
                assert_eq!(offset, expected);
                assert!(len <= max && len > 0);
                expected += len;
            }
        }
    }

    #[test]
    fn legacy_frame_layout() {
        let data = solid(64, 4);
        let fb = Framebuffer::packed(&data, 64, 4);
        let enc = ProtocolEncoder::default();
        let frame = enc
            .encode(Rect::new(5, 1, 20, 3), &fb, &mut Generation::Legacy)
            .unwrap();

        assert_eq!(frame.rect, Rect::new(0, 1, 32, 3));
        assert_eq!(frame.sequence, None);
        assert_eq!(frame.stream_len, 8 + 32 * 2 * 2 + 8);
        assert_eq!(frame.chunks.len(), 1);

        let payload = &frame.chunks[0].payload;
        assert_eq!(&payload[..8], &[0xff, 0x00, 0, 0, 1, 2, 0, 2]);
        assert_eq!(&payload[payload.len() - 8..], &END_OF_BUFFER);
    }

    #[test]
    fn legacy_full_hd_splits_into_chunks() {
        let data = solid(1920, 1080);
        let fb = Framebuffer::packed(&data, 1920, 1080);
        let enc = ProtocolEncoder::default();
        let frame = enc.encode(fb.bounds(), &fb, &mut Generation::Legacy).unwrap();

        let total = 8 + 1920 * 1080 * 2 + 8;
        assert_eq!(frame.stream_len, total);
        assert_eq!(frame.chunks.len(), total.div_ceil(MAX_TRANSFER_LENGTH));
        assert!(frame.chunks.iter().all(|c| c.bulk_len() <= MAX_TRANSFER_LENGTH));
        // Only the first chunk starts with the header.
        assert_eq!(&frame.chunks[0].payload[..2], &[0xff, 0x00]);
        assert_eq!(frame.chunks[1].framing, ChunkFraming::Plain);
    }

    #[test]
    fn legacy_x_overflow_reported() {
        let data = solid(4112, 1);
        let fb = Framebuffer::packed(&data, 4112, 1);
        let err = ProtocolEncoder::default()
            .encode(Rect::new(4096, 0, 4112, 1), &fb, &mut Generation::Legacy)
            .unwrap_err();
        assert!(matches!(err, Trigger6Error::RegionTooLarge { field: "x", .. }));
    }

    #[test]
    fn empty_rect_is_noop() {
        let data = solid(32, 2);
        let fb = Framebuffer::packed(&data, 32, 2);
        let mut generation = Generation::SessionVideo(SessionVideo::new(params(HeaderPlacement::Inline)));
        let frame = ProtocolEncoder::default()
            .encode(Rect::new(8, 1, 8, 2), &fb, &mut generation)
            .unwrap();

        assert!(frame.is_empty());
        assert_eq!(generation.session().unwrap().peek_sequence(), 0);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_bounds_rect_panics() {
        let data = solid(32, 2);
        let fb = Framebuffer::packed(&data, 32, 2);
        let _ = ProtocolEncoder::default().encode(Rect::new(0, 0, 33, 2), &fb, &mut Generation::Legacy);
    }

    #[test]
    fn session_chunks_carry_offsets() {
        let data = solid(1920, 64);
        let fb = Framebuffer::packed(&data, 1920, 64);
        let mut generation = Generation::SessionVideo(SessionVideo::new(params(HeaderPlacement::Inline)));
        let frame = ProtocolEncoder::default()
            .encode(fb.bounds(), &fb, &mut generation)
            .unwrap();

        let pixel_len = 1920 * 64 * 3;
        assert_eq!(frame.stream_len, VideoHeader::SIZE + pixel_len);
        assert_eq!(frame.sequence, Some(0));

        let max_payload = MAX_TRANSFER_LENGTH - SessionHeader::SIZE;
        assert_eq!(frame.chunks.len(), frame.stream_len.div_ceil(max_payload));

        let mut expected_offset = 0;
        for chunk in &frame.chunks {
            let header = chunk.session_header().unwrap();
            assert_eq!(header.session, 3);
            assert_eq!(header.offset as usize, expected_offset);
            assert_eq!(header.chunk_length as usize, chunk.payload.len());
            assert_eq!(header.total_length as usize, frame.stream_len);
            assert_eq!(header.output_index, 1);
            assert_eq!(header.reserved, [0xAA; 8]);
            assert!(chunk.bulk_len() <= MAX_TRANSFER_LENGTH);
            expected_offset += chunk.payload.len();
        }

        let video = VideoHeader::decode(&frame.chunks[0].payload).unwrap();
        assert_eq!(video.sequence, 0);
        assert_eq!((video.width, video.height), (1920, 64));
        assert_eq!(video.data_length as usize, pixel_len);
        assert_eq!(video.start_address, 0x1000);
        assert_eq!(video.end_address as usize, 0x1000 + pixel_len);
        assert_eq!(video.format, 0x9);
        assert_eq!(video.reserved, [0xBB; 4]);
    }

    #[test]
    fn session_sequence_increments_per_frame() {
        let data = solid(32, 2);
        let fb = Framebuffer::packed(&data, 32, 2);
        let enc = ProtocolEncoder::default();
        let mut generation = Generation::SessionVideo(SessionVideo::new(params(HeaderPlacement::Inline)));

        let seqs: Vec<_> = (0..3)
            .map(|_| enc.encode(fb.bounds(), &fb, &mut generation).unwrap().sequence)
            .collect();
        assert_eq!(seqs, vec![Some(0), Some(1), Some(2)]);

        generation.renegotiate(8);
        let frame = enc.encode(fb.bounds(), &fb, &mut generation).unwrap();
        assert_eq!(frame.sequence, Some(0));
        assert_eq!(frame.chunks[0].session_header().unwrap().session, 8);
    }

    #[test]
    fn control_placement_uses_full_transfer() {
        let data = solid(1920, 64);
        let fb = Framebuffer::packed(&data, 1920, 64);
        let mut generation =
            Generation::SessionVideo(SessionVideo::new(params(HeaderPlacement::Control { request: 0x51 })));
        let frame = ProtocolEncoder::default()
            .encode(fb.bounds(), &fb, &mut generation)
            .unwrap();

        assert_eq!(frame.chunks[0].payload.len(), MAX_TRANSFER_LENGTH);
        assert!(matches!(
            frame.chunks[0].framing,
            ChunkFraming::Control { request: 0x51, .. }
        ));
    }

    #[test]
    fn unsupported_format_rejected() {
        let data = solid(32, 2);
        let fb = Framebuffer::packed(&data, 32, 2);
        let mut p = params(HeaderPlacement::Inline);
        p.format = VideoFormat::Nv12;
        let mut generation = Generation::SessionVideo(SessionVideo::new(p));

        let err = ProtocolEncoder::default()
            .encode(fb.bounds(), &fb, &mut generation)
            .unwrap_err();
        assert!(matches!(err, Trigger6Error::UnsupportedFormat(VideoFormat::Nv12)));
        assert_eq!(generation.session().unwrap().peek_sequence(), 0);
    }
}
