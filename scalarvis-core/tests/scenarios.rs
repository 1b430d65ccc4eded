//! End-to-end coverage for the six scenarios worked through in
//! SPEC_FULL.md's "End-to-end scenarios" section. These drive `Engine`
//! directly in-process (the scenarios are engine-level, not HTTP-level —
//! `scalavis-service/tests/integration.rs` covers the HTTP adapter
//! separately), the way `canopy-client/tests/service_integration.rs`
//! drives its own client value directly.

use scalarvis_core::{Config, Engine, GraphDataRequest, LineType, SmoothingParam, WatchSink};
use std::io::Write;
use std::time::Duration;

// -- TFEvent fixture encoding -------------------------------------------
//
// `tfevent.rs`'s own encode helpers are private to that module's test
// block, so an out-of-crate integration test needs its own copy of the
// same minimal protobuf writer to build fixture files.

fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

fn field_tag(field_number: u32, wire_type: u8) -> Vec<u8> {
    encode_varint(((field_number as u64) << 3) | wire_type as u64)
}

fn encode_value(tag_str: &str, value: f32) -> Vec<u8> {
    let mut out = field_tag(1, 2);
    out.extend(encode_varint(tag_str.len() as u64));
    out.extend(tag_str.as_bytes());
    out.extend(field_tag(2, 5));
    out.extend(value.to_bits().to_le_bytes());
    out
}

fn encode_summary(values: &[(&str, f32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (t, v) in values {
        let encoded = encode_value(t, *v);
        out.extend(field_tag(1, 2));
        out.extend(encode_varint(encoded.len() as u64));
        out.extend(encoded);
    }
    out
}

fn encode_event(step: i64, wall_time: f64, summary: &[u8]) -> Vec<u8> {
    let mut out = field_tag(1, 1);
    out.extend(wall_time.to_bits().to_le_bytes());
    out.extend(field_tag(2, 0));
    out.extend(encode_varint(step as u64));
    out.extend(field_tag(5, 2));
    out.extend(encode_varint(summary.len() as u64));
    out.extend(summary);
    out
}

/// Wrap a payload in the shared `[len:u64 LE][crc:u32][payload][crc:u32]`
/// record framing. Both CRCs are unverified on read, so zero bytes are
/// fine here.
fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend((payload.len() as u64).to_le_bytes());
    out.extend([0u8; 4]);
    out.extend(payload);
    out.extend([0u8; 4]);
    out
}

fn write_tfevent_file(path: &std::path::Path, events: &[(i64, f64, &[(&str, f32)])]) {
    let mut bytes = Vec::new();
    for (step, wall_time, values) in events {
        let summary = encode_summary(values);
        let event = encode_event(*step, *wall_time, &summary);
        bytes.extend(frame(&event));
    }
    std::fs::write(path, bytes).unwrap();
}

fn wait_finished(engine: &Engine, project: &str) {
    let mut status = engine.get_parse_state(&[project.to_string()]);
    for _ in 0..100 {
        if status[0].1 {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
        status = engine.get_parse_state(&[project.to_string()]);
    }
    panic!("import of project {project} never finished parsing");
}

fn line(response: &scalarvis_core::GraphDataResponse, line_type: LineType) -> Vec<(i64, f32)> {
    response
        .lines
        .iter()
        .find(|(lt, _)| *lt == line_type)
        .map(|(_, points)| points.iter().map(|p| (p.step, p.value)).collect())
        .unwrap_or_default()
}

// -- Scenario 1: Basic TFEvent ingestion --------------------------------

#[test]
fn scenario_1_basic_tfevent_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("out.tfevent.0.host");
    write_tfevent_file(
        &file_path,
        &[
            (0, 0.0, &[("Loss/train", 0.2)]),
            (10, 10.0, &[("Loss/train", 0.15)]),
            (20, 20.0, &[("Loss/train", 0.10)]),
        ],
    );

    let engine = Engine::new(Config::default()).unwrap();
    let project = engine
        .import_files(vec![dir.path().to_string_lossy().to_string()], false)
        .unwrap();
    wait_finished(&engine, &project);

    let file = file_path.to_string_lossy().to_string();
    let response = engine
        .get_scalar_data(vec![GraphDataRequest {
            tag: "Loss/train".to_string(),
            file: file.clone(),
            left: 0,
            right: 20,
            token: false,
            smoothing: None,
            sample: false,
        }])
        .unwrap();

    let points = line(&response[0], LineType::Normal);
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].0, 0);
    assert!((points[0].1 - 0.2).abs() < 1e-6);
    assert_eq!(points[1].0, 10);
    assert!((points[1].1 - 0.15).abs() < 1e-6);
    assert_eq!(points[2].0, 20);
    assert!((points[2].1 - 0.10).abs() < 1e-6);
}

// -- Scenario 2: Smoothing reconfiguration ------------------------------

#[test]
fn scenario_2_smoothing_reconfiguration() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("out.tfevent.0.host");
    write_tfevent_file(
        &file_path,
        &[
            (0, 0.0, &[("Loss/train", 0.2)]),
            (10, 10.0, &[("Loss/train", 0.15)]),
            (20, 20.0, &[("Loss/train", 0.10)]),
        ],
    );

    let engine = Engine::new(Config::default()).unwrap();
    let project = engine
        .import_files(vec![dir.path().to_string_lossy().to_string()], false)
        .unwrap();
    wait_finished(&engine, &project);
    let file = file_path.to_string_lossy().to_string();

    let response = engine
        .get_scalar_data(vec![GraphDataRequest {
            tag: "Loss/train".to_string(),
            file: file.clone(),
            left: 0,
            right: 20,
            token: false,
            smoothing: Some(SmoothingParam::Debiased { weight: 0.5 }),
            sample: false,
        }])
        .unwrap();
    let smoothed = line(&response[0], LineType::NormalSmoothing);
    assert_eq!(smoothed.len(), 3);
    assert!((smoothed[0].1 - 0.2).abs() < 1e-3, "first point always passes through raw");
    assert!((smoothed[1].1 - 0.15).abs() < 1e-3);
    assert!((smoothed[2].1 - 0.1167).abs() < 1e-3);

    // Reconfiguring to a different weight changes the values but not the
    // point count.
    let response = engine
        .get_scalar_data(vec![GraphDataRequest {
            tag: "Loss/train".to_string(),
            file,
            left: 0,
            right: 20,
            token: false,
            smoothing: Some(SmoothingParam::Debiased { weight: 0.9 }),
            sample: false,
        }])
        .unwrap();
    let reconfigured = line(&response[0], LineType::NormalSmoothing);
    assert_eq!(reconfigured.len(), 3);
    assert_ne!(reconfigured[2].1, smoothed[2].1);
}

// -- Scenario 3: Token-mode rescale --------------------------------------

#[test]
fn scenario_3_token_mode_rescale() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("out.tfevent.0.host");
    write_tfevent_file(
        &file_path,
        &[
            (0, 0.0, &[("Loss", 1.0)]),
            (10, 10.0, &[("Loss", 2.0)]),
            (20, 20.0, &[("Loss", 3.0)]),
        ],
    );

    let engine = Engine::new(Config::default()).unwrap();
    let project = engine
        .import_files(vec![dir.path().to_string_lossy().to_string()], false)
        .unwrap();
    wait_finished(&engine, &project);
    let file = file_path.to_string_lossy().to_string();

    let tags = engine.set_token_param(&file, 2000.0, 1000.0).unwrap();
    assert!(tags.contains(&"Loss".to_string()));

    let response = engine
        .get_scalar_data(vec![GraphDataRequest {
            tag: "Loss".to_string(),
            file,
            left: 0,
            right: 40_000_000,
            token: true,
            smoothing: None,
            sample: false,
        }])
        .unwrap();
    let points = line(&response[0], LineType::Token);
    assert_eq!(
        points.iter().map(|p| p.0).collect::<Vec<_>>(),
        vec![0, 20_000_000, 40_000_000]
    );
}

// -- Scenario 4: File-merge fan-out --------------------------------------

#[test]
fn scenario_4_file_merge_fanout() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut a = std::fs::File::create(dir.path().join("worker_0.log")).unwrap();
        writeln!(a, "2024-01-01 00:00:00,000 step: [0/1] loss: 1.0").unwrap();
        writeln!(a, "2024-01-01 00:00:01,000 step: [1/1] loss: 2.0").unwrap();
        let mut b = std::fs::File::create(dir.path().join("worker_1.log")).unwrap();
        writeln!(b, "2024-01-01 00:01:00,000 step: [10/1] loss: 3.0").unwrap();
        writeln!(b, "2024-01-01 00:01:01,000 step: [11/1] loss: 4.0").unwrap();
    }

    let engine = Engine::new(Config::default()).unwrap();
    let project = engine
        .import_files(vec![dir.path().to_string_lossy().to_string()], false)
        .unwrap();
    wait_finished(&engine, &project);

    let a = dir.path().join("worker_0.log").to_string_lossy().to_string();
    let b = dir.path().join("worker_1.log").to_string_lossy().to_string();
    let merged = engine.file_merge("merged".to_string(), vec![a, b], true).unwrap();
    assert_eq!(merged.action, "merge");
    assert!(merged.tags.contains(&"Loss".to_string()));

    let response = engine
        .get_scalar_data(vec![GraphDataRequest {
            tag: "Loss".to_string(),
            file: "merged".to_string(),
            left: 0,
            right: 100,
            token: false,
            smoothing: None,
            sample: false,
        }])
        .unwrap();
    let points = line(&response[0], LineType::Normal);
    assert_eq!(
        points.iter().map(|p| (p.0, p.1)).collect::<Vec<_>>(),
        vec![(0, 1.0), (1, 2.0), (10, 3.0), (11, 4.0)],
        "points from A then B, sorted by step"
    );
}

// -- Scenario 5: Incremental detection on watch --------------------------

#[test]
fn scenario_5_incremental_detection_on_watch() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(Config::default()).unwrap();

    // Empty import of the directory: nothing to parse yet, and it
    // registers the directory as watched.
    let project = engine
        .import_files(vec![dir.path().to_string_lossy().to_string()], false)
        .unwrap();
    wait_finished(&engine, &project);
    assert!(engine.get_all_graph_info().is_empty());

    // A new, still-empty file shows up under the watched directory (the
    // training job has only just opened it for writing).
    let path = dir.path().join("worker_0.log");
    std::fs::write(&path, "").unwrap();
    engine.on_file_created(dir.path(), "worker_0.log");
    assert!(engine
        .get_created_file_group_by_dir()
        .get(&dir.path().to_string_lossy().into_owned())
        .is_some_and(|files| files.contains("worker_0.log")));

    // A write-close on a file that was only ever *seen*, never
    // explicitly imported, must not parse anything yet.
    engine.on_file_write_close(dir.path(), "worker_0.log");
    std::thread::sleep(Duration::from_millis(50));
    assert!(
        engine.get_incremental_tag().is_empty(),
        "a created-but-unimported file must not produce an incremental tag"
    );

    // The client re-imports the path `GetCreatedFileGroupByDir` surfaced,
    // which is what actually marks it imported (mirrors
    // `ImportFileHandler::run` being called again for newly-discovered
    // files, same as the first explicit import). The file is still
    // empty, so this doesn't register any tag contributor yet.
    let path_str = path.to_string_lossy().to_string();
    let project = engine.import_files(vec![path_str], true).unwrap();
    wait_finished(&engine, &project);
    assert!(engine.get_incremental_tag().is_empty());

    // The training job writes its first line. The watcher's debounced
    // write-close fires once, and this is the first time `Loss` gets any
    // data at all, so it's exactly the case `GetIncrementalTag` exists
    // for.
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "2024-01-01 00:00:00,000 step: [0/1] loss: 1.0").unwrap();
    }
    engine.on_file_write_close(dir.path(), "worker_0.log");

    let mut incremental = engine.get_incremental_tag();
    for _ in 0..50 {
        if incremental.contains_key("Loss") {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
        incremental = engine.get_incremental_tag();
    }
    assert!(
        incremental.get("Loss").is_some_and(|files| files.iter().any(|f| f.ends_with("worker_0.log"))),
        "write-close on an already-imported file must surface through GetIncrementalTag"
    );
}

// -- Scenario 6: Windowed-median window-full -----------------------------

#[test]
fn scenario_6_windowed_median_window_full() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker_0.log");
    {
        let mut f = std::fs::File::create(&path).unwrap();
        for (step, value) in [1.0, 3.0, 2.0, 5.0, 4.0].iter().enumerate() {
            writeln!(f, "2024-01-01 00:00:{step:02},000 step: [{step}/1] loss: {value}").unwrap();
        }
    }

    let engine = Engine::new(Config::default()).unwrap();
    let project = engine
        .import_files(vec![dir.path().to_string_lossy().to_string()], false)
        .unwrap();
    wait_finished(&engine, &project);
    let file = path.to_string_lossy().to_string();

    let response = engine
        .get_scalar_data(vec![GraphDataRequest {
            tag: "Loss".to_string(),
            file,
            left: 0,
            right: 4,
            token: false,
            smoothing: Some(SmoothingParam::WindowMedian { window_size: 3 }),
            sample: false,
        }])
        .unwrap();
    let points = line(&response[0], LineType::NormalSmoothing);
    assert_eq!(
        points.iter().map(|p| p.1).collect::<Vec<_>>(),
        vec![1.0, 3.0, 2.0, 3.0, 4.0]
    );
}
