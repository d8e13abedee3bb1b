//! Vendor control requests understood by the adapter.
//!
//! ```text
//! request  dir  wValue        wIndex        data
//! 0x89     IN   output index  byte offset   mode table slice
//! 0x87     IN   output index  0             1 status byte
//! 0x03     OUT  0             1 / 0         none (enable / disable)
//! 0x12     OUT  0             0             32-byte mode record
//! ```

use tracing::{debug, info};

use crate::error::{Trigger6Error, TransportError};
use crate::mode::{
    DisplayMode, MODE_TABLE_FIRST_READ, MODE_TABLE_SECOND_READ, MODE_TABLE_SIZE, ModeCatalog,
};
use crate::transport::{ControlRequest, Transport};

pub const REQUEST_READ_MODES: u8 = 0x89;
pub const REQUEST_CONNECTOR_STATUS: u8 = 0x87;
pub const REQUEST_OUTPUT_ENABLE: u8 = 0x03;
pub const REQUEST_SET_RESOLUTION: u8 = 0x12;

/// Read and decode the adapter's mode table in two control reads.
pub async fn read_mode_table<T: Transport + ?Sized>(
    transport: &T,
    output_index: u16,
) -> Result<ModeCatalog, Trigger6Error> {
    let mut raw = vec![0u8; MODE_TABLE_SIZE];
    let mut filled = 0;

    for len in [MODE_TABLE_FIRST_READ, MODE_TABLE_SECOND_READ] {
        let offset = u16::try_from(filled).map_err(|_| Trigger6Error::RegionTooLarge {
            field: "mode table offset",
            value: filled as u64,
        })?;
        let request = ControlRequest::new(REQUEST_READ_MODES, output_index, offset);
        let n = transport
            .control_read(request, &mut raw[filled..filled + len])
            .await?;
        debug!(offset, requested = len, read = n, "mode table read");
        filled += n.min(len);
        if n < len {
            break;
        }
    }

    ModeCatalog::decode(&raw[..filled])
}

/// Raw connector status byte for `output_index`.
pub async fn read_connector_status<T: Transport + ?Sized>(
    transport: &T,
    output_index: u16,
) -> Result<u8, Trigger6Error> {
    let mut status = [0u8; 1];
    let request = ControlRequest::new(REQUEST_CONNECTOR_STATUS, output_index, 0);
    let n = transport.control_read(request, &mut status).await?;
    if n == 0 {
        return Err(TransportError::Control {
            request: REQUEST_CONNECTOR_STATUS,
            reason: "empty status reply".into(),
        }
        .into());
    }
    Ok(status[0])
}

pub async fn enable_output<T: Transport + ?Sized>(transport: &T) -> Result<(), Trigger6Error> {
    transport
        .control_write(ControlRequest::new(REQUEST_OUTPUT_ENABLE, 0, 1), &[])
        .await?;
    info!("output enabled");
    Ok(())
}

pub async fn disable_output<T: Transport + ?Sized>(transport: &T) -> Result<(), Trigger6Error> {
    transport
        .control_write(ControlRequest::new(REQUEST_OUTPUT_ENABLE, 0, 0), &[])
        .await?;
    info!("output disabled");
    Ok(())
}

/// Program the adapter's scanout timing.
pub async fn set_resolution<T: Transport + ?Sized>(
    transport: &T,
    mode: &DisplayMode,
) -> Result<(), Trigger6Error> {
    transport
        .control_write(
            ControlRequest::new(REQUEST_SET_RESOLUTION, 0, 0),
            &mode.to_bytes(),
        )
        .await?;
    info!(%mode, "resolution set");
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
