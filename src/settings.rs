// src/settings.rs
//
// Receiver settings, loaded from TOML. Every field has a default so a file
// only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::serial::{ConnectionPolicy, Parity, PortParams, ResyncPolicy, StreamConfig};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReceiverSettings {
    /// Serial port path. Empty means "ask the operator".
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Must match the sender's firmware.
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    #[serde(default)]
    pub resync_policy: ResyncPolicy,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64, // seconds (0 = disabled)
    /// Directory for log files. None logs to stderr only.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_baud_rate() -> u32 {
    115200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_stabilization_delay_ms() -> u64 {
    2000
}
fn default_retry_backoff_ms() -> u64 {
    3000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_channel_count() -> usize {
    4
}
fn default_poll_interval_us() -> u64 {
    1000
}
fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        ReceiverSettings {
            port: String::new(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
            stabilization_delay_ms: default_stabilization_delay_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            channel_count: default_channel_count(),
            poll_interval_us: default_poll_interval_us(),
            resync_policy: ResyncPolicy::default(),
            stats_interval_secs: default_stats_interval_secs(),
            log_dir: None,
        }
    }
}

impl ReceiverSettings {
    /// Reject settings the receiver cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.port.trim().is_empty() {
            return Err("No port specified".to_string());
        }
        if self.baud_rate == 0 {
            return Err("Baud rate must be greater than zero".to_string());
        }
        if self.channel_count == 0 {
            return Err("Channel count must be at least 1".to_string());
        }
        if self.max_reconnect_attempts == 0 {
            return Err("max_reconnect_attempts must be at least 1".to_string());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(format!("Unsupported data bits: {}", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(format!("Unsupported stop bits: {}", self.stop_bits));
        }
        Ok(())
    }

    pub fn port_params(&self) -> PortParams {
        PortParams {
            port: self.port.trim().to_string(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    pub fn connection_policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            stabilization_delay: Duration::from_millis(self.stabilization_delay_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channel_count: self.channel_count,
            poll_interval: Duration::from_micros(self.poll_interval_us),
            resync_policy: self.resync_policy,
            stats_interval: match self.stats_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// `<config dir>/streamtap/settings.toml`, if the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("streamtap").join("settings.toml"))
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<ReceiverSettings, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

/// Load from `path`, or from the default location when it exists, or defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ReceiverSettings, String> {
    if let Some(path) = path {
        return load_settings(path);
    }
    match default_settings_path() {
        Some(default) if default.exists() => {
            tlog!("[settings] Loading {}", default.display());
            load_settings(&default)
        }
        _ => Ok(ReceiverSettings::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = ReceiverSettings::default();
        assert_eq!(s.baud_rate, 115200);
        assert_eq!(s.channel_count, 4);
        assert_eq!(s.max_reconnect_attempts, 5);

        let params = s.port_params();
        assert_eq!(params.read_timeout, Duration::from_secs(1));
        assert_eq!(params.write_timeout, Duration::from_secs(1));

        let policy = s.connection_policy();
        assert_eq!(policy.stabilization_delay, Duration::from_secs(2));
        assert_eq!(policy.retry_backoff, Duration::from_secs(3));

        let stream = s.stream_config();
        assert_eq!(stream.poll_interval, Duration::from_millis(1));
        assert_eq!(stream.resync_policy, ResyncPolicy::DiscardAll);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let s: ReceiverSettings = toml::from_str(
            r#"
            port = "/dev/rfcomm0"
            channel_count = 8
            parity = "even"
            resync_policy = "retain_partial"
            stats_interval_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(s.port, "/dev/rfcomm0");
        assert_eq!(s.channel_count, 8);
        assert_eq!(s.parity, Parity::Even);
        assert_eq!(s.baud_rate, 115200);
        assert_eq!(s.stream_config().resync_policy, ResyncPolicy::RetainPartial);
        assert!(s.stream_config().stats_interval.is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut s = ReceiverSettings::default();
        assert!(s.validate().is_err()); // no port

        s.port = "COM6".to_string();
        assert!(s.validate().is_ok());

        s.channel_count = 0;
        assert!(s.validate().is_err());
        s.channel_count = 4;

        s.max_reconnect_attempts = 0;
        assert!(s.validate().is_err());
        s.max_reconnect_attempts = 5;

        s.data_bits = 9;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "port = \"COM6\"\nretry_backoff_ms = 500\n").unwrap();

        let s = load_or_default(Some(&path)).unwrap();
        assert_eq!(s.port, "COM6");
        assert_eq!(s.connection_policy().retry_backoff, Duration::from_millis(500));

        std::fs::write(&path, "port = [").unwrap();
        assert!(load_settings(&path).is_err());
    }
}
