//! Protocol generation and per-device session state.
//!
//! The adapter speaks one of two incompatible framings, selected when
//! the device session starts:
//!
//! - [`Generation::Legacy`]: one frame-update header per update.
//! - [`Generation::SessionVideo`]: a session header per chunk and a
//!   video header per update, numbered by a [`Session`].
//!
//! Values whose meaning is unknown (frame type, addresses, reserved
//! bytes) are supplied through [`SessionParams`].

use serde::{Deserialize, Serialize};

use crate::header::VideoFormat;

// ── Session ──────────────────────────────────────────────────────

/// Session number and frame sequence counter of one device session.
///
/// The sequence counter increases by one per encoded update and only
/// goes back to zero on [`renegotiate`](Self::renegotiate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    number: u32,
    next_sequence: u32,
}

impl Session {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            next_sequence: 0,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Sequence number the next update will carry.
    pub fn peek_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Claim the next sequence number.
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        seq
    }

    /// Start over under a new session number.
    pub fn renegotiate(&mut self, number: u32) {
        self.number = number;
        self.next_sequence = 0;
    }
}

// ── HeaderPlacement ──────────────────────────────────────────────

/// Where the per-chunk session header travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPlacement {
    /// Prepended to the chunk inside the bulk transfer.
    Inline,
    /// Sent as a vendor control write with `request` before the bulk
    /// transfer.
    Control { request: u8 },
}

// ── SessionParams ────────────────────────────────────────────────

/// Device-specific constants for the session/video framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Session number used at attach.
    pub session_number: u32,
    /// Output index written into every session header.
    pub output_index: u32,
    /// Destination address written into every session header; also the
    /// video header's start address.
    pub destination_address: u32,
    /// Frame type tag of the video header.
    pub frame_type: u32,
    /// Pixel format announced in the video header.
    pub format: VideoFormat,
    pub header_placement: HeaderPlacement,
    /// Opaque trailing bytes of the session header.
    #[serde(default)]
    pub session_reserved: [u8; 8],
    /// Opaque trailing bytes of the video header.
    #[serde(default)]
    pub video_reserved: [u8; 4],
}

// ── Generation ───────────────────────────────────────────────────

/// Session/video framing state: constants plus the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVideo {
    pub params: SessionParams,
    pub session: Session,
}

impl SessionVideo {
    pub fn new(params: SessionParams) -> Self {
        let session = Session::new(params.session_number);
        Self { params, session }
    }
}

/// The framing a device session speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Legacy,
    SessionVideo(SessionVideo),
}

impl Generation {
    /// The live session, if this generation has one.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Generation::Legacy => None,
            Generation::SessionVideo(sv) => Some(&sv.session),
        }
    }

    /// Switch to a new session number. No-op for legacy framing.
    pub fn renegotiate(&mut self, number: u32) {
        if let Generation::SessionVideo(sv) = self {
            sv.session.renegotiate(number);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
