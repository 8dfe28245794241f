// src/io/serial/transport.rs
//
// Byte transport abstraction and its serialport binding.
//
// The connection manager only ever talks to `Connector` and `ByteTransport`,
// so a Bluetooth SPP link, a USB CDC port or a test script all look the same.

use std::io::Read;
use std::time::Duration;

use super::utils::{
    line_summary, to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, Parity,
};
use crate::io::error::IoError;

// ============================================================================
// Traits
// ============================================================================

/// Parameters used for every open attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct PortParams {
    /// Port path (e.g., "/dev/rfcomm0", "/dev/cu.ESP32-EEG", "COM6")
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

/// An open byte channel. Owned by the connection manager.
pub trait ByteTransport {
    /// Liveness as last observed. Goes false after close or a fatal I/O error.
    fn is_open(&self) -> bool;

    /// Bytes sitting in the receive buffer right now.
    fn bytes_available(&mut self) -> Result<usize, IoError>;

    /// Read up to `n` bytes, waiting at most the read timeout.
    /// A short result means the timeout expired first; a transport may
    /// report an empty one as `IoError::Timeout`.
    fn read(&mut self, n: usize) -> Result<Vec<u8>, IoError>;

    /// Drop whatever the OS has buffered on the receive side.
    fn reset_input_buffer(&mut self) -> Result<(), IoError>;

    /// Release the handle. Safe to call more than once.
    fn close(&mut self);
}

/// Opens transports. Each successful open yields a logically new handle.
pub trait Connector {
    type Transport: ByteTransport;

    fn open(&mut self, params: &PortParams) -> Result<Self::Transport, IoError>;
}

// ============================================================================
// serialport Binding
// ============================================================================

/// Opens real serial ports through the serialport crate.
#[derive(Clone, Debug, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Transport = SerialTransport;

    fn open(&mut self, params: &PortParams) -> Result<SerialTransport, IoError> {
        // serialport has one timeout for both directions; the read side matters here
        let port = serialport::new(&params.port, params.baud_rate)
            .data_bits(to_serialport_data_bits(params.data_bits))
            .stop_bits(to_serialport_stop_bits(params.stop_bits))
            .parity(to_serialport_parity(&params.parity))
            .timeout(params.read_timeout)
            .open()
            .map_err(|e| IoError::connection(&params.port, e.to_string()))?;

        tlog!(
            "[transport] Opened {} at {} baud ({}, timeout {:?})",
            params.port,
            params.baud_rate,
            line_summary(params.data_bits, &params.parity, params.stop_bits),
            params.read_timeout
        );

        Ok(SerialTransport {
            name: params.port.clone(),
            port: Some(port),
        })
    }
}

/// An open serial port.
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    /// Mark the handle dead and build the matching error.
    fn fail(&mut self, reason: String) -> IoError {
        self.port = None;
        IoError::disconnected(&self.name, reason)
    }
}

impl ByteTransport for SerialTransport {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&mut self) -> Result<usize, IoError> {
        let result = match self.port.as_ref() {
            Some(port) => port.bytes_to_read(),
            None => return Err(IoError::disconnected(&self.name, "port is closed")),
        };
        match result {
            Ok(n) => Ok(n as usize),
            Err(e) => Err(self.fail(format!("bytes_to_read: {}", e))),
        }
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, IoError> {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return Err(IoError::disconnected(&self.name, "port is closed")),
        };

        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match port.read(&mut buf[filled..]) {
                Ok(0) => {
                    // EOF - port closed/disconnected
                    return Err(self.fail("end of stream".to_string()));
                }
                Ok(count) => filled += count,
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.port = None;
                    return Err(IoError::read(&self.name, e.to_string()));
                }
            }
        }

        if filled == 0 && n > 0 {
            return Err(IoError::timeout(&self.name, format!("read of {} bytes", n)));
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn reset_input_buffer(&mut self) -> Result<(), IoError> {
        let result = match self.port.as_ref() {
            Some(port) => port.clear(serialport::ClearBuffer::Input),
            None => return Err(IoError::disconnected(&self.name, "port is closed")),
        };
        result.map_err(|e| self.fail(format!("clear input: {}", e)))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tlog!("[transport] Closed {}", self.name);
        }
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// How a port is attached. Sensor headsets show up as Bluetooth SPP or USB CDC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortKind {
    Bluetooth,
    Usb,
    Pci,
    Unknown,
}

impl PortKind {
    pub fn label(&self) -> &'static str {
        match self {
            PortKind::Bluetooth => "Bluetooth",
            PortKind::Usb => "USB",
            PortKind::Pci => "PCI",
            PortKind::Unknown => "Unknown",
        }
    }

    /// Links a streaming sensor can sit behind.
    pub fn is_sensor_link(&self) -> bool {
        matches!(self, PortKind::Bluetooth | PortKind::Usb)
    }
}

/// A port the receiver could be pointed at.
#[derive(Clone, Debug, PartialEq)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub kind: PortKind,
    /// Manufacturer and product, when the OS reports them (USB only).
    pub description: Option<String>,
    /// `vid:pid` in hex (USB only).
    pub usb_id: Option<String>,
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let (kind, description, usb_id) = match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let text = [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                (
                    PortKind::Usb,
                    Some(text).filter(|t| !t.is_empty()),
                    Some(format!("{:04x}:{:04x}", usb.vid, usb.pid)),
                )
            }
            serialport::SerialPortType::BluetoothPort => (PortKind::Bluetooth, None, None),
            serialport::SerialPortType::PciPort => (PortKind::Pci, None, None),
            serialport::SerialPortType::Unknown => (PortKind::Unknown, None, None),
        };
        SerialPortInfo {
            port_name: p.port_name,
            kind,
            description,
            usb_id,
        }
    }
}

/// Ports a sensor could be streaming on, Bluetooth first.
///
/// With `include_all`, PCI and unidentified ports are listed too.
pub fn list_serial_ports(include_all: bool) -> Result<Vec<SerialPortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to enumerate ports: {}", e))?;
    Ok(select_ports(
        ports.into_iter().map(SerialPortInfo::from).collect(),
        include_all,
    ))
}

fn select_ports(mut ports: Vec<SerialPortInfo>, include_all: bool) -> Vec<SerialPortInfo> {
    ports.retain(|p| !is_dial_in(&p.port_name) && (include_all || p.kind.is_sensor_link()));
    ports.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.port_name.cmp(&b.port_name)));
    ports
}

/// macOS lists every device twice; the /dev/tty.* twin blocks on open
/// waiting for carrier detect, so only the /dev/cu.* one is usable.
fn is_dial_in(name: &str) -> bool {
    cfg!(target_os = "macos") && name.starts_with("/dev/tty.")
}
