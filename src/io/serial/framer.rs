// src/io/serial/framer.rs
//
// Length-based framing for fixed-width sample records.
//
// There are no delimiters on the wire: every `channel_count * 4` bytes is one
// frame. Alignment is recovered by throwing away the whole pending buffer
// (resync) and starting again at the next read.

use serde::{Deserialize, Serialize};

use crate::io::codec::SampleCodec;
use crate::io::error::IoError;

// =============================================================================
// Types
// =============================================================================

/// What to do with a partial frame when the link goes quiet mid-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Drop every pending byte and reset the transport input buffer.
    #[default]
    DiscardAll,
    /// Keep the partial frame and wait for the rest of it.
    RetainPartial,
}

/// Result of a single extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Extract {
    /// A complete frame, decoded into one value per channel.
    Frame(Vec<f32>),
    /// Fewer than one frame of bytes buffered. Nothing was consumed.
    NeedMore,
}

/// Counters for link-quality diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub frames: u64,
    pub resyncs: u64,
    pub discarded_bytes: u64,
}

// =============================================================================
// Sample Framer
// =============================================================================

/// Stateful framer for the sample stream.
pub struct SampleFramer {
    codec: SampleCodec,
    buffer: Vec<u8>,
    stats: FramerStats,
}

impl SampleFramer {
    pub fn new(channel_count: usize) -> Self {
        let codec = SampleCodec::new(channel_count);
        SampleFramer {
            codec,
            buffer: Vec::with_capacity(codec.frame_size() * 2),
            stats: FramerStats::default(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.codec.frame_size()
    }

    pub fn channel_count(&self) -> usize {
        self.codec.channel_count()
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes still missing before the next frame can be extracted.
    pub fn needed(&self) -> usize {
        self.frame_size().saturating_sub(self.buffer.len())
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Append bytes without extracting anything.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Remove and decode exactly one frame from the front of the buffer.
    ///
    /// With less than one frame buffered this returns `Extract::NeedMore` and
    /// leaves the buffer untouched. An unpack failure discards the buffer.
    pub fn try_extract(&mut self) -> Result<Extract, IoError> {
        let frame_size = self.frame_size();
        if frame_size == 0 || self.buffer.len() < frame_size {
            return Ok(Extract::NeedMore);
        }

        let raw: Vec<u8> = self.buffer.drain(..frame_size).collect();
        match self.codec.decode(&raw) {
            Ok(values) => {
                self.stats.frames += 1;
                Ok(Extract::Frame(values))
            }
            Err(e) => {
                self.resync();
                Err(e)
            }
        }
    }

    /// Feed raw bytes into the framer.
    /// Returns every complete frame now available, in arrival order.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Vec<f32>>, IoError> {
        self.push(data);

        let mut frames = Vec::new();
        while let Extract::Frame(values) = self.try_extract()? {
            frames.push(values);
        }
        Ok(frames)
    }

    /// Discard everything pending. Returns the number of bytes dropped.
    pub fn resync(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        if dropped > 0 {
            self.stats.resyncs += 1;
            self.stats.discarded_bytes += dropped as u64;
        }
        dropped
    }

    /// Hex dump of the pending bytes, for warnings.
    pub fn pending_hex(&self) -> String {
        hex::encode(&self.buffer)
    }
}
