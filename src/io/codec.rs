// src/io/codec.rs
//
// Wire codec for fixed-width sample frames.
//
// A frame is `channel_count` consecutive little-endian IEEE-754 f32 values.
// There is no header, trailer or checksum, so the channel count has to be
// agreed with the sender out of band. A mismatch cannot be detected here.

use crate::io::error::IoError;

/// Bytes per channel value on the wire.
pub const BYTES_PER_VALUE: usize = 4;

// ============================================================================
// Sample Codec
// ============================================================================

/// Encoder/decoder for one sample frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleCodec {
    channel_count: usize,
}

impl SampleCodec {
    pub fn new(channel_count: usize) -> Self {
        SampleCodec { channel_count }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Size of one encoded frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.channel_count * BYTES_PER_VALUE
    }

    /// Decode exactly one frame.
    ///
    /// Returns `Err(IoError::Protocol)` when `raw` is not exactly one frame long.
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<f32>, IoError> {
        if raw.len() != self.frame_size() {
            return Err(IoError::protocol(
                "codec",
                format!(
                    "cannot unpack {} bytes into {} channels (need {})",
                    raw.len(),
                    self.channel_count,
                    self.frame_size()
                ),
            ));
        }

        Ok(raw
            .chunks_exact(BYTES_PER_VALUE)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Encode channel values the way the sender does. Used for loopback tests.
    pub fn encode(&self, values: &[f32]) -> Result<Vec<u8>, IoError> {
        if values.len() != self.channel_count {
            return Err(IoError::protocol(
                "codec",
                format!(
                    "expected {} channel values, got {}",
                    self.channel_count,
                    values.len()
                ),
            ));
        }

        let mut out = Vec::with_capacity(self.frame_size());
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }
}
