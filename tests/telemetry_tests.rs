// tests/telemetry_tests.rs
//
// JSONL telemetry and step logs written by the simulator.

use serde_json::Value;

use calf::{
    build_controller, build_dynamics, ControllerConfig, FileSink, NoopSink, SimConfig, Simulator,
    SystemKind, TelemetryConfig, TelemetrySink,
};

fn point_sim(safe_only: bool) -> Simulator {
    let mut cfg = ControllerConfig::for_system(SystemKind::KinPoint);
    cfg.safe_only = safe_only;
    Simulator::new(
        SimConfig {
            dt: cfg.sampling_time,
            substeps: 1,
            initial_state: vec![1.0, -1.0],
            target: vec![0.0, 0.0],
            initial_spread: 0.0,
        },
        build_dynamics(&cfg),
        build_controller(&cfg).unwrap(),
    )
}

fn read_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn run_writes_samples_then_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.jsonl");

    let mut sim = point_sim(false);
    sim.reset(None);
    let mut telemetry = TelemetrySink::from_config(TelemetryConfig::jsonl(&path, false));
    sim.run(5, &mut NoopSink, &mut telemetry).unwrap();
    drop(telemetry);

    let records = read_lines(&path);
    assert_eq!(records.len(), 6);
    for (tick, rec) in records.iter().take(5).enumerate() {
        assert_eq!(rec["schema_version"], 1);
        assert_eq!(rec["record"], "sample");
        assert_eq!(rec["tick"], tick as u64);
        assert!(rec["events"].is_array());
        assert!(rec["action"].as_array().unwrap().len() == 2);
    }
    let summary = &records[5];
    assert_eq!(summary["record"], "summary");
    assert_eq!(summary["controller"], "ex-post");
    assert_eq!(summary["steps"], 5);
    assert_eq!(summary["counters"]["samples"], 5);
}

#[test]
fn append_mode_keeps_previous_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("runs.jsonl");

    for _ in 0..2 {
        let mut sim = point_sim(true);
        sim.reset(None);
        let mut telemetry = TelemetrySink::from_config(TelemetryConfig::jsonl(&path, true));
        sim.run(3, &mut NoopSink, &mut telemetry).unwrap();
    }

    let records = read_lines(&path);
    assert_eq!(records.len(), 8);
    let summaries = records.iter().filter(|r| r["record"] == "summary").count();
    assert_eq!(summaries, 2);
    assert_eq!(records[3]["controller"], "safe-only");
    assert!(records[3]["counters"].is_null());
}

#[test]
fn truncate_mode_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");
    std::fs::write(&path, "stale\n").unwrap();

    let mut sim = point_sim(true);
    sim.reset(None);
    let mut telemetry = TelemetrySink::from_config(TelemetryConfig::jsonl(&path, false));
    sim.run(2, &mut NoopSink, &mut telemetry).unwrap();
    drop(telemetry);

    assert_eq!(read_lines(&path).len(), 3);
}

#[test]
fn file_sink_writes_one_record_per_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steps.jsonl");

    let mut sim = point_sim(true);
    sim.reset(None);
    let mut sink = FileSink::create(path.to_str().unwrap()).unwrap();
    let mut telemetry = TelemetrySink::from_config(TelemetryConfig::off());
    sim.run(4, &mut sink, &mut telemetry).unwrap();
    drop(sink);

    let records = read_lines(&path);
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["state"], serde_json::json!([1.0, -1.0]));
    assert_eq!(records[0]["critic_status"], "pending");
    assert_eq!(records[3]["tick"], 3);
}
