// src/logging.rs
//
// Per-step sinks for the simulation harness.
// - EventSink: trait used by the simulator
// - NoopSink:  discards all records
// - FileSink:  writes one JSON line per step for offline analysis

use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::sim::StepRecord;

/// Abstract sink for per-step records.
pub trait EventSink {
    fn log_step(&mut self, record: &StepRecord);
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_step(&mut self, _record: &StepRecord) {}
}

/// JSONL file sink.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create(path: &str) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for FileSink {
    fn log_step(&mut self, record: &StepRecord) {
        // Logging failures must not stop the control loop.
        if serde_json::to_writer(&mut self.writer, record).is_ok() {
            let _ = self.writer.write_all(b"\n");
        }
        let _ = self.writer.flush();
    }
}

/// Collects records in memory (tests and short runs).
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<StepRecord>,
}

impl EventSink for MemorySink {
    fn log_step(&mut self, record: &StepRecord) {
        self.records.push(record.clone());
    }
}
