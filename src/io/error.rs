// src/io/error.rs
//
// Typed errors for the receive path. Every variant carries the device it was
// raised for so log lines and the final run summary can name the link.

use thiserror::Error;

/// Errors raised by transports, the framer and the connection manager.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IoError {
    /// Opening the transport failed.
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    /// Every connect attempt in the retry budget failed.
    #[error("{device}: giving up after {attempts} failed connection attempts")]
    RetryBudgetExhausted { device: String, attempts: u32 },

    /// The handle reported closed, or the link vanished underneath us.
    #[error("{device}: disconnected: {reason}")]
    Disconnected { device: String, reason: String },

    /// Transport-level read fault.
    #[error("{device}: read failed: {message}")]
    Read { device: String, message: String },

    /// An operation exceeded its timeout.
    #[error("{device}: timed out during {operation}")]
    Timeout { device: String, operation: String },

    /// A read returned fewer bytes than a frame needs and nothing else is pending.
    #[error("{device}: incomplete sample: got {received} of {expected} bytes")]
    IncompleteFrame {
        device: String,
        received: usize,
        expected: usize,
    },

    /// Bytes could not be unpacked into the expected sample layout.
    #[error("{device}: protocol error: {message}")]
    Protocol { device: String, message: String },

    /// Invalid settings (zero channels, zero baud...).
    #[error("{device}: invalid configuration: {message}")]
    Configuration { device: String, message: String },

    /// A stop was requested while connecting.
    #[error("{device}: cancelled")]
    Cancelled { device: String },

    /// Anything we could not classify. Handled like a disconnection.
    #[error("{device}: unexpected error: {message}")]
    Other { device: String, message: String },
}

impl IoError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn exhausted(device: &str, attempts: u32) -> Self {
        IoError::RetryBudgetExhausted {
            device: device.to_string(),
            attempts,
        }
    }

    pub fn disconnected(device: &str, reason: impl Into<String>) -> Self {
        IoError::Disconnected {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    pub fn read(device: &str, message: impl Into<String>) -> Self {
        IoError::Read {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(device: &str, operation: impl Into<String>) -> Self {
        IoError::Timeout {
            device: device.to_string(),
            operation: operation.into(),
        }
    }

    pub fn incomplete(device: &str, received: usize, expected: usize) -> Self {
        IoError::IncompleteFrame {
            device: device.to_string(),
            received,
            expected,
        }
    }

    pub fn protocol(device: &str, message: impl Into<String>) -> Self {
        IoError::Protocol {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn configuration(device: &str, message: impl Into<String>) -> Self {
        IoError::Configuration {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn cancelled(device: &str) -> Self {
        IoError::Cancelled {
            device: device.to_string(),
        }
    }

    pub fn other(device: &str, message: impl Into<String>) -> Self {
        IoError::Other {
            device: device.to_string(),
            message: message.into(),
        }
    }

    /// Errors recovered by tearing the link down and reconnecting.
    /// Unclassified errors land here too so the poll loop never spins on them.
    pub fn is_disconnection(&self) -> bool {
        matches!(
            self,
            IoError::Disconnected { .. }
                | IoError::Read { .. }
                | IoError::Timeout { .. }
                | IoError::Other { .. }
        )
    }

    /// Errors recovered by discarding the framer buffer, keeping the link up.
    pub fn is_resync(&self) -> bool {
        matches!(
            self,
            IoError::IncompleteFrame { .. } | IoError::Protocol { .. }
        )
    }

    /// Errors that halt the receiver.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IoError::RetryBudgetExhausted { .. } | IoError::Configuration { .. }
        )
    }
}

impl From<IoError> for String {
    fn from(e: IoError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(IoError::disconnected("COM6", "closed").is_disconnection());
        assert!(IoError::read("COM6", "broken pipe").is_disconnection());
        assert!(IoError::other("COM6", "weird").is_disconnection());
        assert!(IoError::timeout("COM6", "read of 16 bytes").is_disconnection());
        assert!(!IoError::connection("COM6", "busy").is_disconnection());

        assert!(IoError::incomplete("COM6", 10, 16).is_resync());
        assert!(IoError::protocol("COM6", "bad length").is_resync());
        assert!(!IoError::read("COM6", "x").is_resync());

        assert!(IoError::exhausted("COM6", 5).is_fatal());
        assert!(!IoError::cancelled("COM6").is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let msg = IoError::incomplete("/dev/rfcomm0", 10, 16).to_string();
        assert_eq!(msg, "/dev/rfcomm0: incomplete sample: got 10 of 16 bytes");

        let msg: String = IoError::exhausted("COM6", 5).into();
        assert_eq!(msg, "COM6: giving up after 5 failed connection attempts");
    }
}
