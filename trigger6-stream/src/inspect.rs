//! Human-readable dump of a capture file.
//!
//! The start of each frame update is decoded as whichever framing it
//! carries: a legacy header, an inline session header followed by a
//! video header, or a bare video header (session header sent by
//! control write).

use std::io::Write;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use trigger6_core::mode::MODE_RECORD_SIZE;
use trigger6_core::registers::{
    REQUEST_CONNECTOR_STATUS, REQUEST_OUTPUT_ENABLE, REQUEST_READ_MODES, REQUEST_SET_RESOLUTION,
};
use trigger6_core::{DisplayMode, LegacyHeader, SessionHeader, VideoFormat, VideoHeader};

use crate::capture::{CaptureCodec, CaptureError, CaptureRecord, RecordKind};

/// Totals over a capture file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InspectSummary {
    pub control_reads: usize,
    pub control_writes: usize,
    pub bulk_transfers: usize,
    pub bulk_bytes: usize,
    pub legacy_updates: usize,
    pub video_updates: usize,
}

/// Decode every record from `reader`, describing each on `out`.
pub async fn inspect<R, W>(reader: R, out: &mut W) -> Result<InspectSummary, CaptureError>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut records = FramedRead::new(reader, CaptureCodec);
    let mut summary = InspectSummary::default();

    while let Some(record) = records.next().await {
        let record = record?;
        match record.kind {
            RecordKind::ControlRead => {
                summary.control_reads += 1;
                writeln!(out, "ctrl in   {}", describe_read(&record))?;
            }
            RecordKind::ControlWrite => {
                summary.control_writes += 1;
                writeln!(out, "ctrl out  {}", describe_write(&record))?;
            }
            RecordKind::Bulk => {
                summary.bulk_transfers += 1;
                summary.bulk_bytes += record.data.len();
                let detail = if record.offset == 0 {
                    match describe_update(&record.data) {
                        Some(Update::Legacy(text)) => {
                            summary.legacy_updates += 1;
                            text
                        }
                        Some(Update::Video(text)) => {
                            summary.video_updates += 1;
                            text
                        }
                        None => "unrecognised frame start".to_string(),
                    }
                } else {
                    String::new()
                };
                writeln!(
                    out,
                    "bulk      frame {} chunk {} offset {} len {} {detail}",
                    record.frame,
                    record.chunk,
                    record.offset,
                    record.data.len()
                )?;
            }
        }
    }

    writeln!(
        out,
        "{} control reads, {} control writes, {} bulk transfers ({} bytes), {} legacy + {} video updates",
        summary.control_reads,
        summary.control_writes,
        summary.bulk_transfers,
        summary.bulk_bytes,
        summary.legacy_updates,
        summary.video_updates
    )?;
    Ok(summary)
}

fn describe_read(record: &CaptureRecord) -> String {
    let r = record.request;
    match r.request {
        REQUEST_READ_MODES => format!(
            "read modes output {} offset {}: {} bytes",
            r.value,
            r.index,
            record.data.len()
        ),
        REQUEST_CONNECTOR_STATUS => format!(
            "connector status output {}: {:?}",
            r.value,
            record.data.first()
        ),
        other => format!("request {other:#04x} value {} index {}", r.value, r.index),
    }
}

fn describe_write(record: &CaptureRecord) -> String {
    let r = record.request;
    match r.request {
        REQUEST_OUTPUT_ENABLE if r.index != 0 => "enable output".to_string(),
        REQUEST_OUTPUT_ENABLE => "disable output".to_string(),
        REQUEST_SET_RESOLUTION => match <&[u8; MODE_RECORD_SIZE]>::try_from(record.data.as_ref()) {
            Ok(bytes) => format!("set resolution {}", DisplayMode::from_bytes(bytes)),
            Err(_) => format!("set resolution ({} bytes)", record.data.len()),
        },
        other => match SessionHeader::decode(&record.data) {
            Ok(h) if record.data.len() == SessionHeader::SIZE => format!(
                "request {other:#04x} session header: session {} chunk {}+{} of {}",
                h.session, h.offset, h.chunk_length, h.total_length
            ),
            _ => format!("request {other:#04x} ({} bytes)", record.data.len()),
        },
    }
}

enum Update {
    Legacy(String),
    Video(String),
}

fn describe_update(data: &[u8]) -> Option<Update> {
    if let Ok(h) = LegacyHeader::decode(data) {
        return Some(Update::Legacy(format!(
            "legacy x {} y {} {}x{}",
            u32::from(h.x_blocks) * 16,
            h.y,
            u32::from(h.width_blocks) * 16,
            h.height
        )));
    }

    if let Ok(session) = SessionHeader::decode(data) {
        if session.chunk_length as usize + SessionHeader::SIZE == data.len() {
            if let Some(video) = describe_video(&data[SessionHeader::SIZE..]) {
                return Some(Update::Video(format!("session {} {video}", session.session)));
            }
        }
    }

    describe_video(data).map(Update::Video)
}

fn describe_video(data: &[u8]) -> Option<String> {
    let h = VideoHeader::decode(data).ok()?;
    let format = VideoFormat::from_tag(h.format)?;
    Some(format!(
        "video seq {} {}x{} {:?} {} bytes at {:#x}",
        h.sequence, h.width, h.height, format, h.data_length, h.start_address
    ))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use tokio_util::codec::Encoder;
    use trigger6_core::ControlRequest;

    use super::*;

    fn encode(records: Vec<CaptureRecord>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for record in records {
            CaptureCodec.encode(record, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn bulk(offset: u32, data: Vec<u8>) -> CaptureRecord {
        CaptureRecord {
            kind: RecordKind::Bulk,
            request: ControlRequest::new(0, 0, 0),
            chunk: 0,
            frame: 0,
            offset,
            data: Bytes::from(data),
        }
    }

    #[tokio::test]
    async fn describes_legacy_update() {
        let header = LegacyHeader {
            x_blocks: 2,
            y: 10,
            width_blocks: 4,
            height: 8,
        };
        let mut data = header.encode().to_vec();
        data.extend_from_slice(&[0u8; 64]);

        let bytes = encode(vec![
            CaptureRecord::control(
                RecordKind::ControlWrite,
                ControlRequest::new(REQUEST_OUTPUT_ENABLE, 0, 1),
                &[],
            ),
            bulk(0, data),
            bulk(72, vec![0u8; 16]),
        ]);

        let mut out = Vec::new();
        let summary = inspect(&bytes[..], &mut out).await.unwrap();
        assert_eq!(summary.control_writes, 1);
        assert_eq!(summary.bulk_transfers, 2);
        assert_eq!(summary.legacy_updates, 1);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("enable output"));
        assert!(text.contains("legacy x 32 y 10 64x8"));
    }

    #[tokio::test]
    async fn describes_inline_session_update() {
        let video = VideoHeader {
            frame_type: 1,
            data_length: 48,
            sequence: 5,
            width: 16,
            height: 1,
            start_address: 0x1000,
            end_address: 0x1030,
            format: VideoFormat::Bgr24.tag(),
            reserved: [0; 4],
        };
        let session = SessionHeader {
            session: 2,
            total_length: 80,
            address: 0x1000,
            chunk_length: 80,
            offset: 0,
            output_index: 0,
            reserved: [0; 8],
        };
        let mut data = session.encode().to_vec();
        data.extend_from_slice(&video.encode());
        data.extend_from_slice(&[0u8; 48]);

        let mut out = Vec::new();
        let summary = inspect(&encode(vec![bulk(0, data)])[..], &mut out).await.unwrap();
        assert_eq!(summary.video_updates, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("session 2 video seq 5 16x1 Bgr24"));
    }
}
