// src/io/types.rs
//
// Shared types passed between the framer, the stream and the sinks.

use serde::Serialize;

// ============================================================================
// Samples
// ============================================================================

/// One decoded frame: a value per channel plus capture metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    /// Position in the stream, starting at 0. Gap-free across reconnects.
    pub sequence: u64,
    /// Host UNIX timestamp in microseconds, taken when the frame completed.
    pub timestamp_us: u64,
    /// Microseconds since the previous sample (None for the first one).
    /// Instrumentation only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_us: Option<u64>,
    /// Channel values in wire order.
    pub values: Vec<f32>,
}

impl Sample {
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Lifecycle of the transport handle owned by the connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget exhausted. Needs an explicit rearm.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(
            format!("{} -> {}", ConnectionState::Disconnected, ConnectionState::Failed),
            "disconnected -> failed"
        );
    }
}
