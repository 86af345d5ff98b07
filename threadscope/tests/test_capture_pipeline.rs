use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use threadscope::capture::AcquisitionLog;
use threadscope::config::AnalysisConfig;
use threadscope::domain::{CaptureError, Pid, Tid};
use threadscope::pipeline::{analyze_capture, Analysis, SymbolOptions};
use threadscope::report::render;
use threadscope::symbolization::SymbolPolicy;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/ui_thread_capture.json");

fn assert_ms(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}ms, got {actual}ms");
}

fn analyze(path: &Path) -> Result<Analysis, CaptureError> {
    analyze_capture(path, &AnalysisConfig::default(), &SymbolOptions::default(), &mut AcquisitionLog::new())
}

/// Write `json` as `<dir>/trace.json`.
fn write_capture(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("trace.json");
    fs::write(&path, json).unwrap();
    path
}

#[test]
fn test_fixture_breakdown() {
    let analysis = analyze(Path::new(FIXTURE)).unwrap();
    let report = &analysis.report;

    assert_eq!(report.pid, Pid(4242));
    assert_eq!(report.target, Tid(17));

    let c = &report.breakdown.counters;
    assert_eq!(c.samples, 3);
    assert_eq!(c.skipped_samples, 1);
    assert_eq!(c.context_switches, 12);
    assert_eq!(c.skipped_context_switches, 1);
    assert_eq!(c.ready_thread_events, 3);

    let d = &report.breakdown.durations;
    assert_ms(d.running, 30.0);
    assert_ms(d.message_pump_wait, 10.0);
    assert_ms(d.process_message, 5.0);
    assert_ms(d.idle, 3.0);
    assert_ms(d.blocked, 9.0);
    assert_ms(d.not_running, 2.0);
    assert_ms(d.ready, 9.0);

    assert_eq!(report.breakdown.span, Some((0.0, 70.0)));
    assert!(report.breakdown.anomalies.is_empty());
}

#[test]
fn test_fixture_report_text_and_json() {
    let analysis = analyze(Path::new(FIXTURE)).unwrap();

    let text = render(&analysis.report);
    assert!(text.starts_with("thread TID:17 of devenv.exe (PID:4242)"));
    assert!(text.lines().any(|l| l.starts_with("message pump wait") && l.contains("10.000ms")));

    let mut buf = Vec::new();
    analysis.report.export(&mut buf).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(json["durations"]["running"], 30.0);
    assert_eq!(json["span"], serde_json::json!([0.0, 70.0]));
}

#[test]
fn test_sibling_archive_is_unpacked() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("trace.json");
    let mut encoder = GzEncoder::new(
        fs::File::create(dir.path().join("trace.json.gz")).unwrap(),
        Compression::default(),
    );
    encoder.write_all(&fs::read(FIXTURE).unwrap()).unwrap();
    encoder.finish().unwrap();

    let mut log = AcquisitionLog::new();
    let analysis =
        analyze_capture(&capture, &AnalysisConfig::default(), &SymbolOptions::default(), &mut log)
            .unwrap();

    assert!(capture.is_file());
    assert_eq!(analysis.report.target, Tid(17));
    assert!(log.lines().iter().any(|l| l.starts_with("Unpacking")));
}

#[test]
fn test_missing_capture() {
    let dir = tempfile::tempdir().unwrap();
    let err = analyze(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, CaptureError::CaptureNotFound(_)));
}

#[test]
fn test_ambiguous_process_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_capture(
        dir.path(),
        r#"{ "version": 1,
             "processes": [{ "pid": 1, "name": "devenv.exe" }, { "pid": 2, "name": "devenv.exe" }] }"#,
    );
    let err = analyze(&path).unwrap_err();
    assert_eq!(err.to_string(), "Expected exactly one instance of process 'devenv.exe', found 2");
}

#[test]
fn test_missing_target_thread_is_fatal() {
    let config =
        AnalysisConfig { entry_signature: "devenv!NoSuchMain".to_string(), ..AnalysisConfig::default() };
    let mut log = AcquisitionLog::new();
    let err =
        analyze_capture(Path::new(FIXTURE), &config, &SymbolOptions::default(), &mut log).unwrap_err();

    assert!(matches!(err, CaptureError::TargetThreadNotFound { pid: Pid(4242), .. }));
    // The log still accounts for the steps that succeeded
    assert!(log.lines().iter().any(|l| l.contains("Analyzing devenv.exe")));
}

const ADDRESS_CAPTURE: &str = r#"{
  "version": 1,
  "processes": [{ "pid": 7, "name": "devenv.exe" }],
  "events": [
    { "type": "sample", "timestamp": 0.0, "pid": 7, "tid": 3,
      "stack": [{ "module": "devenv", "method": "WinMain" }] },
    { "type": "context_switch", "timestamp": 1.0, "old_tid": 3, "new_tid": 0, "old_wait_reason": 13 },
    { "type": "context_switch", "timestamp": 11.0, "old_tid": 0, "new_tid": 3, "old_wait_reason": 0,
      "stack": [
        { "module": "user32", "address": 4352 },
        { "module": "msenv", "method": "MainMessageLoop::Run" },
        { "module": "devenv", "method": "WinMain" }
      ] }
  ]
}"#;

fn write_symbols(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("user32.sym.json"),
        r#"{ "module": "user32", "symbols": [{ "address": 4096, "size": 512, "name": "GetMessageW" }] }"#,
    )
    .unwrap();
}

#[test]
fn test_local_symbol_cache_resolves_label() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_capture(dir.path(), ADDRESS_CAPTURE);

    // Without symbols the label is an address and the wait counts as blocked
    let unresolved = analyze(&path).unwrap();
    assert_ms(unresolved.report.breakdown.durations.blocked, 10.0);
    assert_eq!(unresolved.symbols.unresolved, 1);

    write_symbols(&dir.path().join("symbols"));
    let resolved = analyze(&path).unwrap();
    assert_ms(resolved.report.breakdown.durations.message_pump_wait, 10.0);
    assert_ms(resolved.report.breakdown.durations.blocked, 0.0);
    assert_eq!(resolved.symbols.resolved, 1);
}

#[test]
fn test_symbol_path_respects_local_only_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_capture(dir.path(), ADDRESS_CAPTURE);
    let remote = tempfile::tempdir().unwrap();
    write_symbols(remote.path());

    let run = |policy| {
        let options = SymbolOptions { policy, symbol_path: vec![remote.path().to_path_buf()] };
        analyze_capture(&path, &AnalysisConfig::default(), &options, &mut AcquisitionLog::new())
            .unwrap()
    };

    let local_only = run(SymbolPolicy::LocalCacheOnly);
    assert_ms(local_only.report.breakdown.durations.blocked, 10.0);

    let with_path = run(SymbolPolicy::CacheAndSymbolPath);
    assert_ms(with_path.report.breakdown.durations.message_pump_wait, 10.0);
}

#[test]
fn test_acquisition_log_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_capture(dir.path(), ADDRESS_CAPTURE);
    let mut log = AcquisitionLog::new();
    analyze_capture(&path, &AnalysisConfig::default(), &SymbolOptions::default(), &mut log).unwrap();

    let written = log.persist(&path).unwrap();
    assert_eq!(written, dir.path().join("trace.threadscope.log"));
    let content = fs::read_to_string(written).unwrap();
    assert!(content.contains("Target thread TID:3"));
}

#[test]
fn test_image_mappings_name_modules_before_symbolization() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_capture(
        dir.path(),
        r#"{
  "version": 1,
  "processes": [{ "pid": 7, "name": "devenv.exe" }],
  "process_events": [
    { "kind": "image_rundown", "pid": 7, "image_file_name": "C:\\Windows\\System32\\user32.dll",
      "image_base": 4096, "image_size": 4096 }
  ],
  "events": [
    { "type": "sample", "timestamp": 0.0, "pid": 7, "tid": 3,
      "stack": [{ "module": "devenv", "method": "WinMain" }] },
    { "type": "context_switch", "timestamp": 1.0, "old_tid": 3, "new_tid": 0, "old_wait_reason": 13 },
    { "type": "context_switch", "timestamp": 11.0, "old_tid": 0, "new_tid": 3, "old_wait_reason": 0,
      "stack": [
        { "address": 4352 },
        { "module": "msenv", "method": "MainMessageLoop::Run" },
        { "module": "devenv", "method": "WinMain" }
      ] }
  ]
}"#,
    );
    write_symbols(&dir.path().join("symbols"));

    let mut log = AcquisitionLog::new();
    let analysis =
        analyze_capture(&path, &AnalysisConfig::default(), &SymbolOptions::default(), &mut log)
            .unwrap();

    assert_ms(analysis.report.breakdown.durations.message_pump_wait, 10.0);
    assert_eq!(analysis.symbols.resolved, 1);
    assert!(log.lines().iter().any(|l| l.starts_with("Assigned modules to 1 frames")));
}
