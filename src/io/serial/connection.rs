// src/io/serial/connection.rs
//
// Connection lifecycle: connect with a bounded retry budget, loss detection
// and reconnection. The manager is the only owner of the transport handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::transport::{ByteTransport, Connector, PortParams};
use crate::io::error::IoError;
use crate::io::types::ConnectionState;

/// Longest uninterrupted sleep inside a wait. Bounds stop-request latency.
const WAIT_SLICE: Duration = Duration::from_millis(50);

// ============================================================================
// Policy and Budget
// ============================================================================

/// Timing and retry limits for connect attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionPolicy {
    /// Settle time after a successful open, before the handle is checked.
    pub stabilization_delay: Duration,
    /// Wait between failed attempts. Not taken after the last one.
    pub retry_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        ConnectionPolicy {
            stabilization_delay: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}

/// Consecutive failed connect attempts against a fixed maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u32,
    max: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        RetryBudget { attempts: 0, max }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max
    }

    /// Count a failure. Never exceeds the maximum.
    pub fn record_failure(&mut self) {
        self.attempts = (self.attempts + 1).min(self.max);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Lifetime counters, reported in the run summary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConnectionStats {
    pub open_attempts: u32,
    pub connects: u32,
    pub reconnects: u32,
    /// Sum of the backoff delays taken (configured, not measured).
    pub backoff_total: Duration,
}

// ============================================================================
// Connection Manager
// ============================================================================

/// Called with the new state on every transition.
pub type StateListener = Box<dyn FnMut(ConnectionState) + Send>;

pub struct ConnectionManager<C: Connector> {
    connector: C,
    params: PortParams,
    policy: ConnectionPolicy,
    state: ConnectionState,
    transport: Option<C::Transport>,
    budget: RetryBudget,
    stats: ConnectionStats,
    stop_flag: Arc<AtomicBool>,
    listener: Option<StateListener>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        params: PortParams,
        policy: ConnectionPolicy,
        stop_flag: Arc<AtomicBool>,
    ) -> Self {
        let budget = RetryBudget::new(policy.max_attempts);
        Self {
            connector,
            params,
            policy,
            state: ConnectionState::Disconnected,
            transport: None,
            budget,
            stats: ConnectionStats::default(),
            stop_flag,
            listener: None,
        }
    }

    /// Report every state transition to `listener`.
    pub fn set_state_listener(&mut self, listener: StateListener) {
        self.listener = Some(listener);
    }

    pub fn device(&self) -> &str {
        &self.params.port
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Borrow the live transport. Only valid until the next reconnection.
    pub fn transport_mut(&mut self) -> Option<&mut C::Transport> {
        self.transport.as_mut()
    }

    /// Open the transport, retrying until connected or the budget runs out.
    ///
    /// Returns immediately when already connected. Once the manager is in
    /// `Failed` no further open attempts are made until `rearm()`.
    pub fn connect(&mut self) -> Result<(), IoError> {
        if self.state == ConnectionState::Connected {
            if !self.detect_loss() {
                return Ok(());
            }
            tlog!(
                "[connection] Handle on {} reports closed, reconnecting",
                self.params.port
            );
            self.release();
            self.set_state(ConnectionState::Disconnected);
            self.stats.reconnects += 1;
        }
        if self.state == ConnectionState::Failed {
            return Err(IoError::exhausted(self.device(), self.budget.max()));
        }

        loop {
            if self.stop_requested() {
                self.set_state(ConnectionState::Disconnected);
                return Err(IoError::cancelled(self.device()));
            }
            if self.budget.is_exhausted() {
                return Err(self.fail());
            }

            self.set_state(ConnectionState::Connecting);
            self.stats.open_attempts += 1;
            tlog!(
                "[connection] Attempting to connect to {} ({} baud)...",
                self.params.port,
                self.params.baud_rate
            );

            let error = match self.connector.open(&self.params) {
                Ok(mut transport) => {
                    if !self.wait(self.policy.stabilization_delay) {
                        transport.close();
                        self.set_state(ConnectionState::Disconnected);
                        return Err(IoError::cancelled(self.device()));
                    }

                    if transport.is_open() {
                        self.transport = Some(transport);
                        self.set_state(ConnectionState::Connected);
                        self.budget.reset();
                        self.stats.connects += 1;
                        tlog!("[connection] Connected to {}", self.params.port);
                        return Ok(());
                    }

                    transport.close();
                    IoError::connection(self.device(), "port reported closed after stabilization")
                }
                Err(e) => e,
            };

            self.budget.record_failure();
            tlog!(
                "[connection] Connection failed (attempt {}/{}): {}",
                self.budget.attempts(),
                self.budget.max(),
                error
            );

            if self.budget.is_exhausted() {
                return Err(self.fail());
            }

            tlog!(
                "[connection] Retrying in {:.1}s...",
                self.policy.retry_backoff.as_secs_f64()
            );
            self.stats.backoff_total += self.policy.retry_backoff;
            if !self.wait(self.policy.retry_backoff) {
                self.set_state(ConnectionState::Disconnected);
                return Err(IoError::cancelled(self.device()));
            }
        }
    }

    /// True when there is no handle or the handle reports closed.
    pub fn detect_loss(&self) -> bool {
        self.transport.as_ref().map_or(true, |t| !t.is_open())
    }

    /// Release the dead handle and reconnect within the retry budget.
    pub fn handle_disconnection(&mut self, reason: &str) -> Result<(), IoError> {
        tlog!(
            "[connection] Disconnection detected on {}: {}",
            self.params.port,
            reason
        );
        self.release();
        if self.state != ConnectionState::Failed {
            self.set_state(ConnectionState::Disconnected);
            self.stats.reconnects += 1;
        }
        self.connect()
    }

    /// Release the handle without reconnecting. Leaves `Failed` untouched.
    pub fn close(&mut self) {
        self.release();
        if self.state != ConnectionState::Failed {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Clear a `Failed` state with a fresh budget, e.g. after the operator
    /// picked another port.
    pub fn rearm(&mut self, params: Option<PortParams>) {
        self.release();
        if let Some(params) = params {
            self.params = params;
        }
        self.budget.reset();
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tlog!("[connection] {}: {} -> {}", self.params.port, self.state, state);
        self.state = state;
        if let Some(listener) = self.listener.as_mut() {
            listener(state);
        }
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    fn fail(&mut self) -> IoError {
        self.release();
        self.set_state(ConnectionState::Failed);
        tlog!(
            "[connection] Max reconnection attempts reached for {}. Check the link and restart.",
            self.params.port
        );
        IoError::exhausted(self.device(), self.budget.max())
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    /// Sleep in slices so a stop request cuts the wait short.
    /// Returns false if a stop was requested.
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.release();
    }
}
