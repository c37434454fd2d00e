// FlashBatch - app/replay.rs
//
// Offline replay of recorded engine traffic. A recording is JSON lines,
// one record per line:
//
//   {"type": "start",    "payload": <StartRequest>}
//   {"type": "snapshot", "payload": <Snapshot>}
//   {"type": "progress", "payload": <PortProgressEvent>}
//
// Records are fed through `AppState` exactly as live traffic would be, so
// the session log ends up as it would after the real run. A `start` record
// only stages the batch; no engine command is sent.
//
// Malformed lines are skipped and counted; the replay continues.

use crate::app::engine::FlashEngine;
use crate::app::state::AppState;
use crate::core::model::{Snapshot, StartRequest};
use crate::core::progress::PortProgressEvent;
use crate::util::constants::MAX_REPLAY_ERRORS_REPORTED;
use crate::util::error::FlashBatchError;
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;

/// One recorded engine interaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ReplayRecord {
    Start(StartRequest),
    Snapshot(Snapshot),
    Progress(PortProgressEvent),
}

/// Outcome of a replay.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    /// Records applied.
    pub applied: usize,
    /// Lines that were not valid records.
    pub skipped: usize,
    /// The first few parse failures, as `line N: reason`.
    pub errors: Vec<String>,
    /// Log lines produced, in order.
    pub lines: Vec<String>,
}

/// Feed every record in `reader` into `state`.
///
/// Only a read failure on the source aborts the replay; `source` names it
/// in the error.
pub fn replay<E: FlashEngine, R: BufRead>(
    state: &mut AppState<E>,
    reader: R,
    source: &Path,
) -> Result<ReplaySummary, FlashBatchError> {
    let mut summary = ReplaySummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FlashBatchError::Io {
            path: source.to_path_buf(),
            operation: "read replay",
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: ReplayRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(line = idx + 1, error = %e, "Skipping malformed replay record");
                summary.skipped += 1;
                if summary.errors.len() < MAX_REPLAY_ERRORS_REPORTED {
                    summary.errors.push(format!("line {}: {e}", idx + 1));
                }
                continue;
            }
        };

        match record {
            ReplayRecord::Start(request) => {
                // No engine call here, so capture the file names directly.
                let (staged, line) = state.prepare_batch(request);
                state.mass_production.capture_file_summary(&staged);
                summary.lines.push(line);
            }
            ReplayRecord::Snapshot(snapshot) => {
                summary.lines.extend(state.on_snapshot(&snapshot));
            }
            ReplayRecord::Progress(event) => {
                summary.lines.extend(state.on_progress(&event));
            }
        }
        summary.applied += 1;
    }

    tracing::info!(
        source = %source.display(),
        applied = summary.applied,
        skipped = summary.skipped,
        "Replay complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::engine::DetachedEngine;
    use crate::app::reconciler::MassProduction;
    use crate::app::session_log::SessionLogStore;
    use crate::platform::bus::EventBus;
    use crate::platform::store::JsonStore;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn fixed_clock() -> u64 {
        1_800_000_000_000
    }

    fn make_state(dir: &TempDir) -> AppState<DetachedEngine> {
        let mp = MassProduction::new(
            DetachedEngine,
            JsonStore::new(dir.path().join("massProduction.json")),
            SessionLogStore::new(JsonStore::new(dir.path().join("massProduction-log.json"))),
            fixed_clock,
        );
        AppState::new(mp, &EventBus::new(), 1_000, fixed_clock)
    }

    const START: &str = r#"{"type":"start","payload":{"chip_model":"esp32","memory_type":"flash","stub_path":"","before_operation":"default_reset","after_operation":"hard_reset","files":[{"address":4096,"file_path":"C:\\fw\\app.bin"}],"verify":true,"no_compress":false,"erase_all":false,"auto_download":false,"max_concurrency":4,"is_filter_enabled":false,"whitelist":[],"blacklist":[]}}"#;

    fn snapshot_line(running: bool, status: &str, ended: bool) -> String {
        let ended_at = if ended { "1800000000000" } else { "null" };
        format!(
            r#"{{"type":"snapshot","payload":{{"is_running":{running},"is_enabled":true,"session_id":7,"started_at":1799999990000,"ended_at":{ended_at},"manual_stopped":false,"chip_model":"esp32","memory_type":"flash","auto_download":false,"max_concurrency":4,"queued_count":0,"active_count":0,"success_count":{s},"failed_count":0,"total_count":1,"ports":[{{"id":"p1","name":"COM3","port_type":"usb","status":"{status}","progress":0,"is_allowed":true,"last_seen_at":0}}]}}}}"#,
            s = u32::from(ended)
        )
    }

    #[test]
    fn test_replay_finalizes_session() {
        let dir = TempDir::new().unwrap();
        let mut state = make_state(&dir);
        let input = [
            START.to_string(),
            snapshot_line(true, "flashing", false),
            snapshot_line(false, "success", true),
        ]
        .join("\n");

        let summary = replay(&mut state, Cursor::new(input), Path::new("rec.jsonl")).unwrap();
        assert_eq!(summary.applied, 3);
        assert_eq!(summary.skipped, 0);

        let logs = state.mass_production.session_logs().logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].session_id, 7);
        assert_eq!(logs[0].file_summary, vec!["app.bin".to_string()]);
        assert_eq!(logs[0].success, 1);
        assert!(summary.lines.iter().any(|l| l.contains("Session 7 finished")));
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let dir = TempDir::new().unwrap();
        let mut state = make_state(&dir);
        let input = "not json\n\n{\"type\":\"teleport\",\"payload\":{}}\n";

        let summary = replay(&mut state, Cursor::new(input), Path::new("rec.jsonl")).unwrap();
        assert_eq!(summary.applied, 0);
        assert_eq!(summary.skipped, 2);
        assert!(summary.errors[0].starts_with("line 1:"));
        assert!(summary.errors[1].starts_with("line 3:"));
    }
}
