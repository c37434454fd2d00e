// FlashBatch - tests/e2e_batch.rs
//
// End-to-end tests for a full batch run.
//
// These tests drive `AppState` with a scripted engine and real on-disk
// documents: settings and rules go through the JSON store, snapshots and
// progress go through the reconciler and aggregator, and the finalized
// session is read back from the session log file.

use flashbatch::app::engine::FlashEngine;
use flashbatch::app::log_sync::LogBuffer;
use flashbatch::app::reconciler::MassProduction;
use flashbatch::app::session_log::SessionLogStore;
use flashbatch::app::state::AppState;
use flashbatch::core::filter::RuleDraft;
use flashbatch::core::model::{
    FilterField, FilterList, LogPaths, PortEventType, PortInfo, PortStatus, Snapshot, StartRequest,
    WriteFileInfo,
};
use flashbatch::core::progress::{
    PortProgressEvent, ProgressEvent, ProgressEventType, ProgressFinishStatus, ProgressOperation,
    ProgressType,
};
use flashbatch::platform::bus::EventBus;
use flashbatch::platform::store::JsonStore;
use flashbatch::util::error::EngineError;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

const NOW: u64 = 1_800_000_000_000;
const SESSION_ID: u64 = 42;

fn fixed_clock() -> u64 {
    NOW
}

fn fixed_time() -> String {
    "10:00:00".to_string()
}

/// Engine that answers each command with the next queued snapshot and
/// keeps the last start request it was sent.
#[derive(Default)]
struct ScriptedEngine {
    replies: VecDeque<Snapshot>,
    last_request: Option<StartRequest>,
}

impl ScriptedEngine {
    fn next(&mut self, command: &'static str) -> Result<Snapshot, EngineError> {
        self.replies.pop_front().ok_or(EngineError::Command {
            command,
            message: "no scripted reply".to_string(),
        })
    }
}

impl FlashEngine for ScriptedEngine {
    fn start(&mut self, request: &StartRequest) -> Result<Snapshot, EngineError> {
        self.last_request = Some(request.clone());
        self.next("mass_production_start")
    }
    fn stop(&mut self) -> Result<Snapshot, EngineError> {
        self.next("mass_production_stop")
    }
    fn refresh(&mut self, _trigger_flash: bool) -> Result<Snapshot, EngineError> {
        self.next("mass_production_refresh")
    }
    fn snapshot(&mut self) -> Result<Snapshot, EngineError> {
        self.next("mass_production_get_snapshot")
    }
    fn log_paths(&mut self) -> Result<LogPaths, EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_get_log_paths",
        })
    }
    fn open_log_directory(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

fn settings_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("massProduction.json")
}

fn log_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("massProduction-log.json")
}

fn make_state(dir: &TempDir, bus: &EventBus, replies: Vec<Snapshot>) -> AppState<ScriptedEngine> {
    let engine = ScriptedEngine {
        replies: replies.into(),
        last_request: None,
    };
    let mut mp = MassProduction::new(
        engine,
        JsonStore::new(settings_path(dir)),
        SessionLogStore::new(JsonStore::new(log_path(dir))),
        fixed_clock,
    );
    mp.load_from_storage();
    AppState::new(mp, bus, 1_000, fixed_clock).with_log_time_source(fixed_time)
}

fn make_port(name: &str, serial: &str, status: PortStatus, allowed: bool) -> PortInfo {
    PortInfo {
        id: format!("id-{name}"),
        name: name.to_string(),
        port_type: "usb".to_string(),
        vid: Some("303A".to_string()),
        pid: Some("1001".to_string()),
        serial_number: Some(serial.to_string()),
        status,
        is_allowed: allowed,
        last_seen_at: NOW,
        ..Default::default()
    }
}

fn make_snapshot(ports: Vec<PortInfo>, success: u32, ended: bool) -> Snapshot {
    Snapshot {
        is_running: !ended,
        is_enabled: true,
        session_id: SESSION_ID,
        started_at: Some(NOW - 60_000),
        ended_at: ended.then_some(NOW - 1_000),
        chip_model: Some("esp32s3".to_string()),
        memory_type: Some("flash".to_string()),
        max_concurrency: 4,
        success_count: success,
        total_count: 2,
        active_count: if ended { 0 } else { 2 - success },
        ports,
        ..Default::default()
    }
}

fn start_request() -> StartRequest {
    StartRequest {
        chip_model: "esp32s3".to_string(),
        memory_type: "flash".to_string(),
        baud_rate: Some(921_600),
        stub_path: String::new(),
        before_operation: "default_reset".to_string(),
        after_operation: "hard_reset".to_string(),
        files: vec![
            WriteFileInfo {
                address: 0x0,
                file_path: "/fw/bootloader.bin".to_string(),
            },
            WriteFileInfo {
                address: 0x8000,
                file_path: "/fw/partition-table.bin".to_string(),
            },
            WriteFileInfo {
                address: 0x10000,
                file_path: "C:\\fw\\app.bin".to_string(),
            },
        ],
        verify: true,
        no_compress: false,
        erase_all: false,
        auto_download: false,
        max_concurrency: 8,
        is_filter_enabled: false,
        whitelist: vec![],
        blacklist: vec![],
    }
}

fn progress(port: &str, id: u64, event_type: ProgressEventType, current: Option<u64>) -> PortProgressEvent {
    PortProgressEvent {
        port_name: port.to_string(),
        event: ProgressEvent {
            id,
            event_type,
            step: 0,
            progress_type: ProgressType::Bar { total: 1_024 },
            operation: ProgressOperation::WriteFlash {
                address: 0x10000,
                size: 1_024,
            },
            current,
            total: Some(1_024),
            status: (event_type == ProgressEventType::Finish).then_some(ProgressFinishStatus::Success),
        },
    }
}

fn read_doc(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// =============================================================================
// Full batch
// =============================================================================

#[test]
fn e2e_batch_with_blacklisted_port_finalizes_session() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new();

    let queued = vec![
        make_port("COM3", "A1", PortStatus::Queued, true),
        make_port("COM4", "A2", PortStatus::Queued, true),
        make_port("COM9", "BAD-7", PortStatus::Filtered, false),
    ];
    let mut state = make_state(&dir, &bus, vec![make_snapshot(queued, 0, false)]);

    // Rules and concurrency are persisted before the run.
    state.mass_production.set_max_concurrency(4.0);
    state.mass_production.add_rule(
        FilterList::Blacklist,
        RuleDraft {
            field: FilterField::SerialNumber,
            value: "bad".to_string(),
            enabled: true,
        },
    );
    let blocked = make_port("COM9", "BAD-7", PortStatus::Idle, false);
    assert!(!state.mass_production.is_port_allowed(&blocked));

    let lines = state.start_batch(start_request()).unwrap();
    assert!(lines[0].contains("Starting batch: 3 file(s)"));
    assert!(lines.iter().any(|l| l.ends_with("Flashing session started")));

    // The engine saw the stored settings, not the request's own.
    let sent = state.mass_production.engine().last_request.clone().unwrap();
    assert_eq!(sent.max_concurrency, 4);
    assert_eq!(sent.blacklist.len(), 1);

    // COM3 reports its write through progress events.
    state.on_progress(&progress("COM3", 1, ProgressEventType::Start, Some(0)));
    assert_eq!(state.mass_production.port("COM3").unwrap().status, PortStatus::Flashing);
    state.on_progress(&progress("COM3", 1, ProgressEventType::Increment, Some(512)));
    assert_eq!(state.mass_production.port("COM3").unwrap().progress, 50);
    state.on_progress(&progress("COM3", 1, ProgressEventType::Finish, None));
    assert!(state.mass_production.counter(1).is_none());
    assert!(state.progress.completed_files("COM3").unwrap().contains("app.bin"));
    assert!(!state.progress.is_completed());

    // COM3 done, COM4 flashing.
    state.on_snapshot(&make_snapshot(
        vec![
            make_port("COM3", "A1", PortStatus::Success, true),
            make_port("COM4", "A2", PortStatus::Flashing, true),
            make_port("COM9", "BAD-7", PortStatus::Filtered, false),
        ],
        1,
        false,
    ));

    // Both done; the engine reports the end.
    let lines = state.on_snapshot(&make_snapshot(
        vec![
            make_port("COM3", "A1", PortStatus::Success, true),
            make_port("COM4", "A2", PortStatus::Success, true),
            make_port("COM9", "BAD-7", PortStatus::Filtered, false),
        ],
        2,
        true,
    ));
    assert!(lines.iter().any(|l| l.ends_with("Flashing session ended")));
    assert!(lines
        .iter()
        .any(|l| l.contains("Session 42 finished: 2 succeeded, 0 failed, 2 total")));

    // In-memory session log.
    let logs = state.mass_production.session_logs().logs();
    assert_eq!(logs.len(), 1);
    let session = &logs[0];
    assert_eq!(session.session_id, SESSION_ID);
    assert_eq!((session.success, session.failed, session.total), (2, 0, 2));
    assert_eq!(session.ended_at, Some(NOW - 1_000));
    assert_eq!(
        session.file_summary,
        vec!["bootloader.bin", "partition-table.bin", "app.bin"]
    );

    let events_for = |port: &str| -> Vec<PortEventType> {
        session
            .port_events
            .iter()
            .filter(|e| e.port_name == port)
            .map(|e| e.event_type)
            .collect()
    };
    let expected = vec![PortEventType::Queued, PortEventType::Start, PortEventType::Success];
    assert_eq!(events_for("COM3"), expected);
    assert_eq!(events_for("COM4"), expected);
    assert!(events_for("COM9").is_empty());

    // Persisted documents.
    let log_doc = read_doc(&log_path(&dir));
    let stored = &log_doc["sessionLogs"]["value"][0];
    assert_eq!(stored["sessionId"], 42);
    assert_eq!(stored["success"], 2);
    assert_eq!(stored["failed"], 0);
    assert_eq!(stored["total"], 2);

    let settings_doc = read_doc(&settings_path(&dir));
    assert_eq!(settings_doc["settings"]["value"]["maxConcurrency"], 4);
    assert_eq!(
        settings_doc["settings"]["value"]["blacklist"][0]["value"],
        "bad"
    );
}

#[test]
fn e2e_late_snapshot_does_not_rewrite_finalized_session() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new();
    let mut state = make_state(&dir, &bus, vec![]);

    let done = vec![make_port("COM3", "A1", PortStatus::Success, true)];
    state.on_snapshot(&make_snapshot(done.clone(), 1, true));
    let before = state.mass_production.session_logs().logs().to_vec();

    // A duplicate arriving after the end changes nothing on disk.
    let mut late = make_snapshot(done, 1, true);
    late.failed_count = 9;
    state.on_snapshot(&late);
    assert_eq!(state.mass_production.session_logs().logs(), before.as_slice());

    // A fresh process sees the same single entry.
    let mut reopened = SessionLogStore::new(JsonStore::new(log_path(&dir)));
    reopened.load(NOW);
    assert_eq!(reopened.logs(), before.as_slice());
}

#[test]
fn e2e_secondary_window_mirrors_batch_log() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new();
    let queued = vec![make_port("COM3", "A1", PortStatus::Queued, true)];
    let mut state = make_state(&dir, &bus, vec![make_snapshot(queued, 0, false)]);
    state.start_batch(start_request()).unwrap();

    // A window opened mid-run is brought up to date by the sync reply.
    let mut window = LogBuffer::open_window(&bus, 1_000).with_time_source(fixed_time);
    state.poll_bus();
    window.poll();
    assert_eq!(window.messages(), state.log.messages());
    assert!(window.is_flashing());

    // Later progress arrives both as log lines and as relayed events.
    let lines = state.on_progress(&progress("COM3", 5, ProgressEventType::Start, Some(0)));
    let relayed = window.poll();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].port_name, "COM3");
    for line in &lines {
        assert!(window.messages().contains(line));
    }
}
