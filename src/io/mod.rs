// src/io/mod.rs
//
// Receive path for fixed-width binary sensor samples.

pub mod codec;
mod error;
pub mod serial;
pub mod sink;
mod types;

use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::SampleCodec;
pub use error::IoError;
pub use sink::{ChannelSink, ConsoleSink, OutputFormat, SampleSink};
pub use types::{ConnectionState, Sample};

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
