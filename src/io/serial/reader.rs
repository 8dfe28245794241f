// src/io/serial/reader.rs
//
// Top-level receive loop: connect, stream samples into a sink, shut down.
// Owns the stop flag shared with the connection manager and the stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::connection::{ConnectionManager, ConnectionPolicy, ConnectionStats};
use super::framer::FramerStats;
use super::stream::{SampleStream, StreamConfig, StreamEnd};
use super::transport::{Connector, PortParams, SerialConnector};
use crate::io::error::IoError;
use crate::io::sink::SampleSink;
use crate::settings::ReceiverSettings;

// ============================================================================
// Run Summary
// ============================================================================

/// Why the reader stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    /// Stop requested (Ctrl-C or `stop()`).
    Stopped,
    /// The retry budget ran out, during startup or after a drop.
    Failed(IoError),
    /// The sink refused a sample.
    SinkClosed(String),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Stopped => "stopped",
            StopReason::Failed(_) => "error",
            StopReason::SinkClosed(_) => "sink_closed",
        }
    }
}

/// What happened over one `run()`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub reason: StopReason,
    pub samples: u64,
    pub framer: FramerStats,
    pub connection: ConnectionStats,
}

impl RunSummary {
    pub fn is_failure(&self) -> bool {
        matches!(self.reason, StopReason::Failed(_))
    }
}

// ============================================================================
// Sample Reader
// ============================================================================

/// Supervises one receive session.
pub struct SampleReader<C: Connector> {
    manager: ConnectionManager<C>,
    stream_config: StreamConfig,
    cancel_flag: Arc<AtomicBool>,
    running: bool,
}

impl SampleReader<SerialConnector> {
    /// Reader for a real serial port described by the settings.
    pub fn from_settings(settings: &ReceiverSettings) -> Result<Self, IoError> {
        settings
            .validate()
            .map_err(|e| IoError::configuration(&settings.port, e))?;
        Ok(SampleReader::new(
            SerialConnector,
            settings.port_params(),
            settings.connection_policy(),
            settings.stream_config(),
        ))
    }
}

impl<C: Connector> SampleReader<C> {
    pub fn new(
        connector: C,
        params: PortParams,
        policy: ConnectionPolicy,
        stream_config: StreamConfig,
    ) -> Self {
        Self::with_stop_flag(
            connector,
            params,
            policy,
            stream_config,
            Arc::new(AtomicBool::new(false)),
        )
    }

    /// Like `new`, sharing an existing stop flag.
    pub fn with_stop_flag(
        connector: C,
        params: PortParams,
        policy: ConnectionPolicy,
        stream_config: StreamConfig,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(connector, params, policy, cancel_flag.clone()),
            stream_config,
            cancel_flag,
            running: false,
        }
    }

    /// Flag that stops the reader when set. Safe to hand to a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    pub fn stop(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Connect and forward samples into `sink` until stopped or failed.
    ///
    /// The transport is released on every return path; a panic in the sink
    /// releases it through the manager's `Drop`.
    pub fn run<S: SampleSink>(&mut self, sink: &mut S) -> RunSummary {
        self.running = true;
        let summary = self.run_session(sink);
        self.manager.close();
        self.running = false;

        match &summary.reason {
            StopReason::Failed(e) => tlog!("[reader] Receiver failed: {}", e),
            reason => tlog!(
                "[reader] Receiver {} after {} samples ({} resyncs, {} reconnects)",
                reason.label(),
                summary.samples,
                summary.framer.resyncs,
                summary.connection.reconnects
            ),
        }
        summary
    }

    fn run_session<S: SampleSink>(&mut self, sink: &mut S) -> RunSummary {
        if let Err(e) = self.manager.connect() {
            let reason = match e {
                IoError::Cancelled { .. } => StopReason::Stopped,
                e => StopReason::Failed(e),
            };
            return RunSummary {
                reason,
                samples: 0,
                framer: FramerStats::default(),
                connection: self.manager.stats(),
            };
        }

        tlog!(
            "[reader] Streaming {} channels from {}",
            self.stream_config.channel_count,
            self.manager.device()
        );

        let mut stream = SampleStream::new(
            &mut self.manager,
            self.stream_config.clone(),
            self.cancel_flag.clone(),
        );

        let mut samples = 0u64;
        let mut sink_error = None;
        for sample in stream.by_ref() {
            if let Err(e) = sink.accept(&sample) {
                sink_error = Some(e);
                break;
            }
            samples += 1;
        }

        let reason = match (sink_error, stream.end()) {
            (Some(e), _) => StopReason::SinkClosed(e),
            (None, Some(StreamEnd::Failed(e))) => StopReason::Failed(e.clone()),
            (None, _) => StopReason::Stopped,
        };
        let framer = stream.framer_stats();
        drop(stream);

        RunSummary {
            reason,
            samples,
            framer,
            connection: self.manager.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::mock::{frame, test_params, OpenOutcome, ScriptedConnector, Step};
    use crate::io::types::{ConnectionState, Sample};
    use std::time::Duration;

    fn stream_config() -> StreamConfig {
        StreamConfig {
            channel_count: 4,
            poll_interval: Duration::ZERO,
            ..StreamConfig::default()
        }
    }

    fn policy() -> ConnectionPolicy {
        ConnectionPolicy {
            stabilization_delay: Duration::ZERO,
            retry_backoff: Duration::from_millis(5),
            max_attempts: 5,
        }
    }

    fn reader_with(outcomes: Vec<OpenOutcome>) -> SampleReader<ScriptedConnector> {
        let stop = Arc::new(AtomicBool::new(false));
        SampleReader::with_stop_flag(
            ScriptedConnector::new(outcomes).stop_when_idle(stop.clone()),
            test_params(),
            policy(),
            stream_config(),
            stop,
        )
    }

    #[test]
    fn test_streams_into_sink_in_order() {
        let mut reader = reader_with(vec![OpenOutcome::Succeed(vec![
            Step::Bytes(frame(&[1.0, 2.0, 3.0, 4.0])),
            Step::Bytes(frame(&[5.0, 6.0, 7.0, 8.0])),
        ])]);

        let mut received: Vec<Sample> = Vec::new();
        let summary = reader.run(&mut |s: &Sample| received.push(s.clone()));

        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.samples, 2);
        assert_eq!(received[0].values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(received[1].values, vec![5.0, 6.0, 7.0, 8.0]);
        assert!(!reader.is_running());
        assert_eq!(reader.manager().state(), ConnectionState::Disconnected);
        assert_eq!(reader.manager().connector().closes.get(), 1);
    }

    #[test]
    fn test_startup_failure_emits_nothing() {
        let outcomes = (0..5).map(|_| OpenOutcome::Fail("Access denied".to_string())).collect();
        let mut reader = reader_with(outcomes);

        let mut count = 0;
        let summary = reader.run(&mut |_: &Sample| count += 1);

        assert!(summary.is_failure());
        assert_eq!(summary.reason.label(), "error");
        assert_eq!(count, 0);
        assert_eq!(summary.connection.open_attempts, 5);
        assert_eq!(summary.connection.backoff_total, Duration::from_millis(20));
        assert_eq!(reader.manager().state(), ConnectionState::Failed);
    }

    #[test]
    fn test_recovers_from_drop() {
        let mut reader = reader_with(vec![
            OpenOutcome::Succeed(vec![Step::Bytes(frame(&[1.0; 4])), Step::Close]),
            OpenOutcome::Succeed(vec![Step::Bytes(frame(&[2.0; 4]))]),
        ]);

        let mut received: Vec<Sample> = Vec::new();
        let summary = reader.run(&mut |s: &Sample| received.push(s.clone()));

        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.connection.reconnects, 1);
        let seqs: Vec<u64> = received.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_sink_error_stops_reader() {
        let mut reader = reader_with(vec![OpenOutcome::Succeed(vec![
            Step::Bytes(frame(&[1.0; 4])),
            Step::Bytes(frame(&[2.0; 4])),
        ])]);

        struct Refusing;
        impl SampleSink for Refusing {
            fn accept(&mut self, _: &Sample) -> Result<(), String> {
                Err("pipe closed".to_string())
            }
        }

        let summary = reader.run(&mut Refusing);
        assert_eq!(summary.reason, StopReason::SinkClosed("pipe closed".to_string()));
        assert_eq!(summary.samples, 0);
        assert!(reader.manager().detect_loss());
    }

    #[test]
    fn test_stop_before_run() {
        let mut reader = reader_with(vec![OpenOutcome::Succeed(vec![])]);
        reader.stop();

        let summary = reader.run(&mut |_: &Sample| {});
        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.connection.open_attempts, 0);
    }
}
