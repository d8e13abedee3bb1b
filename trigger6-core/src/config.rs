//! Per-device configuration.
//!
//! Every field has a default, so a partial TOML table deserializes into
//! a working config:
//!
//! ```text
//! output_index = 0
//! max_transfer_length = 65536
//! transfer_budget = 6553600
//! block_granularity = 16
//!
//! [protocol]
//! generation = "session_video"
//! session_number = 1
//! output_index = 0
//! destination_address = 0
//! frame_type = 3
//! format = "bgr24"
//! header_placement = "inline"
//! ```

use serde::{Deserialize, Serialize};

use crate::encoder::{DEFAULT_BLOCK_GRANULARITY, MAX_TRANSFER_LENGTH};
use crate::error::Trigger6Error;
use crate::header::{LEGACY_BLOCK, SessionHeader};
use crate::session::{Generation, SessionParams, SessionVideo};

/// Default bytes of transfer buffering per device.
pub const DEFAULT_TRANSFER_BUDGET: usize = 100 * MAX_TRANSFER_LENGTH;

/// Which framing the device speaks, with its constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "generation", rename_all = "snake_case")]
pub enum ProtocolConfig {
    #[default]
    Legacy,
    SessionVideo(SessionParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Video output addressed by control requests.
    pub output_index: u16,
    /// Upper bound on one bulk transfer, session header included.
    pub max_transfer_length: usize,
    /// Total bytes of transfer buffers; sets how many chunks can be in
    /// flight at once.
    pub transfer_budget: usize,
    /// Horizontal alignment of damage rectangles, in pixels.
    pub block_granularity: u32,
    pub protocol: ProtocolConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            output_index: 0,
            max_transfer_length: MAX_TRANSFER_LENGTH,
            transfer_budget: DEFAULT_TRANSFER_BUDGET,
            block_granularity: DEFAULT_BLOCK_GRANULARITY,
            protocol: ProtocolConfig::Legacy,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), Trigger6Error> {
        if self.max_transfer_length <= SessionHeader::SIZE {
            return Err(Trigger6Error::InvalidConfig(
                "max_transfer_length must exceed the 32-byte session header",
            ));
        }
        if self.max_transfer_length > MAX_TRANSFER_LENGTH {
            return Err(Trigger6Error::InvalidConfig(
                "max_transfer_length must not exceed 65536 bytes",
            ));
        }
        if self.transfer_budget == 0 {
            return Err(Trigger6Error::InvalidConfig("transfer_budget must be > 0"));
        }
        if self.block_granularity == 0 {
            return Err(Trigger6Error::InvalidConfig("block_granularity must be > 0"));
        }
        match &self.protocol {
            ProtocolConfig::Legacy if self.block_granularity % LEGACY_BLOCK != 0 => Err(
                Trigger6Error::InvalidConfig("legacy block_granularity must be a multiple of 16"),
            ),
            ProtocolConfig::SessionVideo(params) if params.format.wire_encoding().is_none() => {
                Err(Trigger6Error::UnsupportedFormat(params.format))
            }
            _ => Ok(()),
        }
    }

    /// Number of transfer buffers the budget allows.
    pub fn pool_capacity(&self) -> usize {
        self.transfer_budget.div_ceil(self.max_transfer_length).max(1)
    }

    /// Fresh session state for this configuration.
    pub fn generation(&self) -> Generation {
        match &self.protocol {
            ProtocolConfig::Legacy => Generation::Legacy,
            ProtocolConfig::SessionVideo(params) => {
                Generation::SessionVideo(SessionVideo::new(params.clone()))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
