//! # trigger6-stream
//!
//! Runs `trigger6-core` against an emulated trigger6 adapter: reads its
//! mode table, programs a mode, streams a moving test pattern and
//! records every control request and bulk transfer to a capture file.
//!
//! ## Modes
//!
//! - **Stream** (default): render and capture per the TOML config.
//! - **Inspect**: decode a capture file and print each request.

pub mod capture;
pub mod config;
pub mod emulator;
pub mod inspect;
pub mod pattern;
pub mod service;
