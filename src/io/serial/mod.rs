// src/io/serial/mod.rs
//
// Serial sample receiver.
//
// Layers, bottom up:
// - transport: byte channel trait and the serialport binding
// - framer: fixed-width frame extraction and resync
// - connection: connect/retry/reconnect around one transport handle
// - stream: poll loop producing timestamped samples
// - reader: session supervisor feeding a sink

pub mod connection;
pub mod framer;
pub mod reader;
pub mod stream;
pub mod transport;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{
    ConnectionManager, ConnectionPolicy, ConnectionStats, RetryBudget, StateListener,
};
pub use framer::{Extract, FramerStats, ResyncPolicy, SampleFramer};
pub use reader::{RunSummary, SampleReader, StopReason};
pub use stream::{SampleStream, StreamConfig, StreamEnd};
pub use transport::{
    list_serial_ports, ByteTransport, Connector, PortKind, PortParams, SerialConnector,
    SerialPortInfo, SerialTransport,
};
pub use utils::Parity;
