// src/io/serial/mock.rs
//
// Scripted in-memory transport for exercising the connection manager, the
// sample stream and the reader without hardware.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::transport::{ByteTransport, Connector, PortParams};
use super::utils::Parity;
use crate::io::error::IoError;

/// One tick of link activity. Each `bytes_available` call consumes one step.
#[derive(Clone, Debug)]
pub enum Step {
    /// Bytes arrive in the receive buffer.
    Bytes(Vec<u8>),
    /// The next read returns only these bytes even though `report` are claimed.
    ShortRead { report: usize, bytes: Vec<u8> },
    /// Nothing happens.
    Quiet,
    /// The link drops: the handle reports closed from now on.
    Close,
    /// `bytes_available` fails with this error.
    Fault(IoError),
}

/// What the next `open` call does.
#[derive(Clone, Debug)]
pub enum OpenOutcome {
    Fail(String),
    /// Open succeeds but the handle is already dead after stabilization.
    Dead,
    Succeed(Vec<Step>),
}

/// Connector handing out scripted transports in order.
pub struct ScriptedConnector {
    outcomes: VecDeque<OpenOutcome>,
    /// Set when a transport runs out of script, to end the stream.
    stop_when_idle: Option<Arc<AtomicBool>>,
    pub opens: u32,
    pub resets: Rc<Cell<u32>>,
    /// Handles released through `close()`, whether or not the link was up.
    pub closes: Rc<Cell<u32>>,
}

impl ScriptedConnector {
    pub fn new(outcomes: Vec<OpenOutcome>) -> Self {
        ScriptedConnector {
            outcomes: outcomes.into(),
            stop_when_idle: None,
            opens: 0,
            resets: Rc::new(Cell::new(0)),
            closes: Rc::new(Cell::new(0)),
        }
    }

    pub fn stop_when_idle(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_when_idle = Some(flag);
        self
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn open(&mut self, params: &PortParams) -> Result<ScriptedTransport, IoError> {
        self.opens += 1;
        let outcome = self
            .outcomes
            .pop_front()
            .unwrap_or_else(|| OpenOutcome::Fail("no such device".to_string()));

        let (open, script) = match outcome {
            OpenOutcome::Fail(msg) => return Err(IoError::connection(&params.port, msg)),
            OpenOutcome::Dead => (false, Vec::new()),
            OpenOutcome::Succeed(script) => (true, script),
        };

        Ok(ScriptedTransport {
            name: params.port.clone(),
            open,
            released: false,
            script: script.into(),
            pending: VecDeque::new(),
            reported: None,
            stop_when_idle: self.stop_when_idle.clone(),
            resets: self.resets.clone(),
            closes: self.closes.clone(),
        })
    }
}

pub struct ScriptedTransport {
    name: String,
    open: bool,
    released: bool,
    script: VecDeque<Step>,
    pending: VecDeque<u8>,
    reported: Option<usize>,
    stop_when_idle: Option<Arc<AtomicBool>>,
    resets: Rc<Cell<u32>>,
    closes: Rc<Cell<u32>>,
}

impl ByteTransport for ScriptedTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    fn bytes_available(&mut self) -> Result<usize, IoError> {
        if !self.open {
            return Err(IoError::disconnected(&self.name, "port is closed"));
        }

        match self.script.pop_front() {
            Some(Step::Bytes(bytes)) => self.pending.extend(bytes),
            Some(Step::ShortRead { report, bytes }) => {
                self.pending.extend(bytes);
                self.reported = Some(report);
            }
            Some(Step::Quiet) => {}
            Some(Step::Close) => {
                self.open = false;
                return Err(IoError::disconnected(&self.name, "device went away"));
            }
            Some(Step::Fault(e)) => return Err(e),
            None => {
                if let Some(flag) = &self.stop_when_idle {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }

        Ok(self.reported.unwrap_or(0).max(self.pending.len()))
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, IoError> {
        if !self.open {
            return Err(IoError::disconnected(&self.name, "port is closed"));
        }
        self.reported = None;
        let count = n.min(self.pending.len());
        Ok(self.pending.drain(..count).collect())
    }

    fn reset_input_buffer(&mut self) -> Result<(), IoError> {
        self.pending.clear();
        self.resets.set(self.resets.get() + 1);
        Ok(())
    }

    fn close(&mut self) {
        if !self.released {
            self.closes.set(self.closes.get() + 1);
        }
        self.released = true;
        self.open = false;
    }
}

pub fn test_params() -> PortParams {
    PortParams {
        port: "/dev/rfcomm0".to_string(),
        baud_rate: 115200,
        data_bits: 8,
        stop_bits: 1,
        parity: Parity::None,
        read_timeout: Duration::from_millis(10),
        write_timeout: Duration::from_millis(10),
    }
}

/// Little-endian frame bytes for the given channel values.
pub fn frame(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
