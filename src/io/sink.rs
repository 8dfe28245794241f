// src/io/sink.rs
//
// Sample consumers. The reader pushes every decoded sample into exactly one
// sink, in order, from a single thread.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::mpsc as std_mpsc;

use super::types::Sample;

/// Downstream consumer of decoded samples.
///
/// An error stops the reader: the sink has nowhere left to put data.
pub trait SampleSink {
    fn accept(&mut self, sample: &Sample) -> Result<(), String>;
}

impl<F> SampleSink for F
where
    F: FnMut(&Sample),
{
    fn accept(&mut self, sample: &Sample) -> Result<(), String> {
        self(sample);
        Ok(())
    }
}

// ============================================================================
// Console Sink
// ============================================================================

/// Line format for printed samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `HH:MM:SS.ffffff: (v0, v1, ...)`
    #[default]
    Text,
    /// Header row, then `sequence,timestamp_us,ch0,...`
    Csv,
    /// One JSON object per line
    Json,
}

/// Writes samples to any `Write`, normally stdout.
pub struct ConsoleSink<W: Write> {
    out: W,
    format: OutputFormat,
    header_written: bool,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        ConsoleSink::new(std::io::stdout(), format)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        ConsoleSink {
            out,
            format,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, sample: &Sample) -> Result<String, String> {
        match self.format {
            OutputFormat::Text => Ok(format_text(sample)),
            OutputFormat::Csv => {
                let mut line = String::new();
                if !self.header_written {
                    line.push_str(&csv_header(sample.channel_count()));
                    line.push('\n');
                    self.header_written = true;
                }
                line.push_str(&format_csv(sample));
                Ok(line)
            }
            OutputFormat::Json => {
                serde_json::to_string(sample).map_err(|e| format!("Failed to encode sample: {}", e))
            }
        }
    }
}

impl<W: Write> SampleSink for ConsoleSink<W> {
    fn accept(&mut self, sample: &Sample) -> Result<(), String> {
        let line = self.render(sample)?;
        writeln!(self.out, "{}", line).map_err(|e| format!("Output closed: {}", e))
    }
}

/// Wall-clock `HH:MM:SS.ffffff` for a microsecond UNIX timestamp.
pub fn format_time_us(timestamp_us: u64) -> String {
    chrono::DateTime::from_timestamp_micros(timestamp_us as i64)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%H:%M:%S%.6f")
                .to_string()
        })
        .unwrap_or_else(|| format!("{}us", timestamp_us))
}

fn format_text(sample: &Sample) -> String {
    let values: Vec<String> = sample.values.iter().map(|v| format!("{:?}", v)).collect();
    format!(
        "{}: ({})",
        format_time_us(sample.timestamp_us),
        values.join(", ")
    )
}

fn csv_header(channels: usize) -> String {
    let mut cols = vec!["sequence".to_string(), "timestamp_us".to_string()];
    cols.extend((0..channels).map(|i| format!("ch{}", i)));
    cols.join(",")
}

fn format_csv(sample: &Sample) -> String {
    let mut cols = vec![sample.sequence.to_string(), sample.timestamp_us.to_string()];
    cols.extend(sample.values.iter().map(|v| v.to_string()));
    cols.join(",")
}

// ============================================================================
// Channel Sink
// ============================================================================

/// Forwards samples to another thread.
pub struct ChannelSink {
    tx: std_mpsc::Sender<Sample>,
}

impl ChannelSink {
    pub fn new(tx: std_mpsc::Sender<Sample>) -> Self {
        ChannelSink { tx }
    }
}

impl SampleSink for ChannelSink {
    fn accept(&mut self, sample: &Sample) -> Result<(), String> {
        self.tx
            .send(sample.clone())
            .map_err(|_| "Sample receiver dropped".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            sequence: 7,
            timestamp_us: 1_700_000_000_123_456,
            interval_us: Some(4000),
            values: vec![1.0, -0.5, 2.25, 0.0],
        }
    }

    fn render(format: OutputFormat, samples: &[Sample]) -> String {
        let mut sink = ConsoleSink::new(Vec::new(), format);
        for s in samples {
            sink.accept(s).unwrap();
        }
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_text_format() {
        let out = render(OutputFormat::Text, &[sample()]);
        assert!(out.ends_with(".123456: (1.0, -0.5, 2.25, 0.0)\n"), "got {out}");
    }

    #[test]
    fn test_csv_header_once() {
        let out = render(OutputFormat::Csv, &[sample(), sample()]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "sequence,timestamp_us,ch0,ch1,ch2,ch3");
        assert_eq!(lines[1], "7,1700000000123456,1,-0.5,2.25,0");
    }

    #[test]
    fn test_json_format() {
        let out = render(OutputFormat::Json, &[sample()]);
        let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(v["sequence"], 7);
        assert_eq!(v["values"][2], 2.25);
        assert_eq!(v["interval_us"], 4000);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, rx) = std_mpsc::channel();
        let mut sink = ChannelSink::new(tx);
        sink.accept(&sample()).unwrap();
        assert_eq!(rx.recv().unwrap(), sample());

        drop(rx);
        assert!(sink.accept(&sample()).is_err());
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |s: &Sample| seen.push(s.sequence);
            sink.accept(&sample()).unwrap();
        }
        assert_eq!(seen, vec![7]);
    }
}
