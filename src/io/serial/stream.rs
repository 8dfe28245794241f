// src/io/serial/stream.rs
//
// Polling loop that turns the connected transport into samples.
//
// Each call to `next()` runs poll cycles until a frame completes or the stream
// ends. Transport faults go to the connection manager, decode faults go to the
// framer's resync, and every cycle yields briefly to bound CPU use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::connection::ConnectionManager;
use super::framer::{Extract, FramerStats, ResyncPolicy, SampleFramer};
use super::transport::{ByteTransport, Connector};
use crate::io::error::IoError;
use crate::io::now_us;
use crate::io::types::Sample;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    pub channel_count: usize,
    /// Sleep between poll cycles. Lower means less latency, more CPU.
    pub poll_interval: Duration,
    pub resync_policy: ResyncPolicy,
    /// How often to log the observed sample rate. None disables it.
    pub stats_interval: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            channel_count: 4,
            poll_interval: Duration::from_millis(1),
            resync_policy: ResyncPolicy::DiscardAll,
            stats_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Why a stream stopped producing samples.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEnd {
    /// Stop flag set (Ctrl-C or an explicit stop).
    Stopped,
    /// The connection manager gave up.
    Failed(IoError),
}

// ============================================================================
// Rate Monitor
// ============================================================================

/// Accumulates sample arrivals and logs the effective rate periodically.
struct RateMonitor {
    interval: Option<Duration>,
    window_start: Instant,
    count: u64,
}

impl RateMonitor {
    fn new(interval: Option<Duration>) -> Self {
        RateMonitor {
            interval: interval.filter(|d| !d.is_zero()),
            window_start: Instant::now(),
            count: 0,
        }
    }

    fn record(&mut self, now: Instant) {
        let Some(interval) = self.interval else {
            return;
        };
        self.count += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= interval {
            tlog!(
                "[stream] rate: {:.1} samples/s ({} samples in {:.1}s)",
                self.count as f64 / elapsed.as_secs_f64(),
                self.count,
                elapsed.as_secs_f64()
            );
            self.window_start = now;
            self.count = 0;
        }
    }
}

// ============================================================================
// Sample Stream
// ============================================================================

/// Pull-based sample source over a connection manager.
///
/// The stream borrows the manager for its whole life but only touches the
/// transport inside a single poll cycle, so a reconnection always hands it a
/// fresh handle.
pub struct SampleStream<'a, C: Connector> {
    manager: &'a mut ConnectionManager<C>,
    framer: SampleFramer,
    config: StreamConfig,
    stop_flag: Arc<AtomicBool>,
    sequence: u64,
    last_sample: Option<Instant>,
    rate: RateMonitor,
    yield_pending: bool,
    end: Option<StreamEnd>,
}

impl<'a, C: Connector> SampleStream<'a, C> {
    pub fn new(
        manager: &'a mut ConnectionManager<C>,
        config: StreamConfig,
        stop_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            framer: SampleFramer::new(config.channel_count),
            rate: RateMonitor::new(config.stats_interval),
            manager,
            config,
            stop_flag,
            sequence: 0,
            last_sample: None,
            yield_pending: false,
            end: None,
        }
    }

    /// Set once the stream has ended.
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Run one poll cycle. Returns a sample if a frame completed.
    pub fn poll_cycle(&mut self) -> Option<Sample> {
        if self.end.is_some() {
            return None;
        }
        if self.stop_flag.load(Ordering::Relaxed) {
            self.end = Some(StreamEnd::Stopped);
            return None;
        }

        if self.manager.detect_loss() {
            tlog!("[stream] Connection lost! Attempting to reconnect...");
            self.recover("handle reports closed");
            return None;
        }

        match self.read_frame() {
            Ok(Some(values)) => Some(self.stamp(values)),
            Ok(None) => None,
            Err(e) if e.is_resync() => {
                self.resync(&e);
                None
            }
            Err(e) if e.is_fatal() => {
                tlog!("[stream] Fatal error: {}", e);
                self.manager.close();
                self.end = Some(StreamEnd::Failed(e));
                None
            }
            Err(e) => {
                if e.is_disconnection() {
                    tlog!("[stream] Serial error: {}", e);
                } else {
                    tlog!("[stream] Unclassified error, treating as disconnection: {}", e);
                }
                self.recover(&e.to_string());
                None
            }
        }
    }

    /// Read whatever the frame in flight still needs, if it is all there.
    ///
    /// Under `DiscardAll` a frame is either completed inside this cycle or
    /// reported incomplete; partial bytes never carry over to the next cycle.
    fn read_frame(&mut self) -> Result<Option<Vec<f32>>, IoError> {
        let device = self.manager.device().to_string();
        let discard = self.config.resync_policy == ResyncPolicy::DiscardAll;
        if discard && self.framer.buffered() > 0 {
            return Err(IoError::incomplete(
                &device,
                self.framer.buffered(),
                self.framer.frame_size(),
            ));
        }

        let transport = self
            .manager
            .transport_mut()
            .ok_or_else(|| IoError::disconnected(&device, "no transport"))?;

        let needed = self.framer.needed();
        if transport.bytes_available()? < needed {
            return Ok(None);
        }

        let mut chunk = transport.read(needed)?;
        loop {
            self.framer.push(&chunk);
            if let Extract::Frame(values) = self.framer.try_extract()? {
                return Ok(Some(values));
            }
            if !discard {
                return Ok(None);
            }

            // Short read: take the rest while the port still has bytes queued
            let available = transport.bytes_available()?;
            if available == 0 {
                break;
            }
            chunk = transport.read(available.min(self.framer.needed()))?;
            if chunk.is_empty() {
                break;
            }
        }

        Err(IoError::incomplete(
            &device,
            self.framer.buffered(),
            self.framer.frame_size(),
        ))
    }

    fn stamp(&mut self, values: Vec<f32>) -> Sample {
        let now = Instant::now();
        let interval_us = self
            .last_sample
            .map(|prev| now.duration_since(prev).as_micros() as u64);
        self.last_sample = Some(now);
        self.rate.record(now);

        let sample = Sample {
            sequence: self.sequence,
            timestamp_us: now_us(),
            interval_us,
            values,
        };
        self.sequence += 1;
        sample
    }

    /// Drop the pending partial frame and flush the transport input buffer.
    fn resync(&mut self, cause: &IoError) {
        let pending = self.framer.pending_hex();
        let dropped = self.framer.resync();
        tlog!(
            "[stream] {} - discarding {} buffered bytes to resync [{}]",
            cause,
            dropped,
            pending
        );

        let reset = match self.manager.transport_mut() {
            Some(transport) => transport.reset_input_buffer(),
            None => Ok(()),
        };
        if let Err(e) = reset {
            tlog!("[stream] Failed to reset input buffer: {}", e);
            self.recover(&e.to_string());
        }
    }

    /// Hand the link to the connection manager for reconnection.
    fn recover(&mut self, reason: &str) {
        self.last_sample = None;
        let dropped = self.framer.resync();
        if dropped > 0 {
            tlog!(
                "[stream] Dropped {} bytes of the frame in flight at disconnection",
                dropped
            );
        }

        match self.manager.handle_disconnection(reason) {
            Ok(()) => tlog!("[stream] Link recovered, resuming at sample {}", self.sequence),
            Err(IoError::Cancelled { .. }) => self.end = Some(StreamEnd::Stopped),
            Err(e) => {
                tlog!("[stream] Giving up: {}", e);
                self.end = Some(StreamEnd::Failed(e));
            }
        }
    }
}

impl<C: Connector> Iterator for SampleStream<'_, C> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            if self.end.is_some() {
                return None;
            }
            if self.yield_pending {
                std::thread::sleep(self.config.poll_interval);
            }
            self.yield_pending = true;

            if let Some(sample) = self.poll_cycle() {
                return Some(sample);
            }
        }
    }
}
