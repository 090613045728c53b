//! telemetry.rs
//!
//! Lightweight JSONL telemetry sink for controller runs.
//!
//! # Environment variables
//!
//! - `CALF_TELEMETRY_MODE`: `"off"` (default) disables telemetry,
//!   `"jsonl"` writes JSONL to `CALF_TELEMETRY_PATH`.
//! - `CALF_TELEMETRY_PATH`: Path to the JSONL file. Required when mode is
//!   `"jsonl"`.
//! - `CALF_TELEMETRY_APPEND`: Optional. When set to `"1"`/`"true"`/`"yes"`,
//!   appends to existing files instead of truncating. Default is truncate.
//!
//! Records built by [`sample_record`] and [`summary_record`] carry
//! `"schema_version": 1`. Anything passed straight to
//! [`TelemetrySink::log_json`] is written as-is; use [`ensure_schema_v1`] on
//! hand-built records.
//!
//! Telemetry never feeds back into control: open or write failures turn the
//! sink off for the rest of the process.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde_json::{json, Value as JsonValue};

use crate::diagnostics::DiagnosticEvent;
use crate::sim::{RunSummary, StepRecord};

/// Current telemetry schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Insert `schema_version: 1` into a JSON object if it is missing.
pub fn ensure_schema_v1(record: &mut JsonValue) {
    match record {
        JsonValue::Object(map) => {
            map.entry("schema_version")
                .or_insert_with(|| JsonValue::Number(SCHEMA_VERSION.into()));
        }
        _ => {
            debug_assert!(
                false,
                "ensure_schema_v1: telemetry records should be JSON objects, got {:?}",
                record
            );
        }
    }
}

/// Telemetry mode, controlled by CALF_TELEMETRY_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    /// Parse mode from environment. Defaults to Off.
    pub fn from_env() -> Self {
        match env::var("CALF_TELEMETRY_MODE") {
            Ok(s) => match s.to_lowercase().as_str() {
                "jsonl" => TelemetryMode::Jsonl,
                _ => TelemetryMode::Off,
            },
            Err(_) => TelemetryMode::Off,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let mode = TelemetryMode::from_env();

        let path = if mode == TelemetryMode::Jsonl {
            env::var("CALF_TELEMETRY_PATH").ok().map(PathBuf::from)
        } else {
            None
        };

        TelemetryConfig {
            mode,
            path,
            append: Self::append_from_env(),
        }
    }

    /// Config writing to `path`, bypassing the environment.
    pub fn jsonl(path: impl Into<PathBuf>, append: bool) -> Self {
        TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append,
        }
    }

    pub fn off() -> Self {
        TelemetryConfig {
            mode: TelemetryMode::Off,
            path: None,
            append: false,
        }
    }

    pub fn append_from_env() -> bool {
        env::var("CALF_TELEMETRY_APPEND")
            .ok()
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

/// A JSONL telemetry sink.
///
/// When mode == Off, all methods are no-ops.
/// When mode == Jsonl, the path is opened lazily on first use.
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
}

impl TelemetrySink {
    /// Never fails: invalid configuration falls back to Off.
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        TelemetrySink {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let path = match &self.path {
                Some(p) => p.clone(),
                None => {
                    // Jsonl without a path.
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            };

            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }

            let file = match options.open(&path) {
                Ok(f) => f,
                Err(_) => {
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            };

            self.writer = Some(BufWriter::new(file));
        }

        self.writer.as_mut()
    }

    /// Log a JSON value as a single line.
    pub fn log_json(&mut self, value: &JsonValue) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }

        let writer = match self.ensure_writer() {
            Some(w) => w,
            None => return,
        };

        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return,
        };

        if writeln!(writer, "{}", line).is_err() {
            self.mode = TelemetryMode::Off;
            self.writer = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Per-sample record: step data plus diagnostics raised during the step.
pub fn sample_record(step: &StepRecord, events: &[DiagnosticEvent]) -> JsonValue {
    json!({
        "schema_version": SCHEMA_VERSION,
        "record": "sample",
        "tick": step.tick,
        "t": step.time,
        "state": step.state,
        "action": step.action,
        "safe_certificate": step.safe_certificate,
        "critic_status": step.critic_status.as_str(),
        "actor_status": step.actor_status.as_str(),
        "events": events,
    })
}

pub fn summary_record(summary: &RunSummary) -> JsonValue {
    let mut value = serde_json::to_value(summary).unwrap_or(JsonValue::Null);
    if let JsonValue::Object(map) = &mut value {
        map.insert("record".to_string(), JsonValue::String("summary".to_string()));
        map.insert(
            "schema_version".to_string(),
            JsonValue::Number(SCHEMA_VERSION.into()),
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_inserts_missing_version() {
        let mut record = json!({"t": 0});
        ensure_schema_v1(&mut record);
        assert_eq!(record["schema_version"], 1);
    }

    #[test]
    fn ensure_schema_keeps_existing_version() {
        let mut record = json!({"schema_version": 7});
        ensure_schema_v1(&mut record);
        assert_eq!(record["schema_version"], 7);
    }

    #[test]
    fn off_sink_is_noop() {
        let mut sink = TelemetrySink::from_config(TelemetryConfig::off());
        assert!(!sink.is_enabled());
        sink.log_json(&json!({"x": 1}));
        sink.flush();
    }

    #[test]
    fn jsonl_without_path_disables_itself() {
        let mut sink = TelemetrySink::from_config(TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: None,
            append: false,
        });
        sink.log_json(&json!({"x": 1}));
        assert!(!sink.is_enabled());
    }
}
