// FlashBatch - app/session_log.rs
//
// Durable audit log of finalized batch sessions.
//
// Invariants held at rest (after every load and save):
// - No entry started before `now - retention_days`.
// - Entries are sorted by `startedAt`, most recent first.
// - At most one entry per `sessionId`.
//
// Persistence is best-effort: read failures load an empty log and
// write failures are logged, never surfaced from `finalize`.

use crate::core::model::Session;
use crate::platform::store::JsonStore;
use crate::util::constants::{
    DEFAULT_LOG_RETENTION_DAYS, MS_PER_DAY, RECENT_SESSION_COUNT, SESSION_LOGS_KEY,
};
use crate::util::error::StoreError;
use serde_json::Value;

/// Drop sessions older than the retention window and sort newest first.
pub fn cleanup_logs_by_retention(
    mut logs: Vec<Session>,
    now_ms: u64,
    retention_days: u32,
) -> Vec<Session> {
    let cutoff = now_ms.saturating_sub(u64::from(retention_days) * MS_PER_DAY);
    logs.retain(|log| log.started_at >= cutoff);
    logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    logs
}

/// Parse stored sessions one by one, skipping any entry that does not
/// have the session shape. A non-array value is an empty log.
fn parse_sessions(raw: Value) -> Vec<Session> {
    let Value::Array(items) = raw else {
        return Vec::new();
    };
    let total = items.len();
    let sessions: Vec<Session> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if sessions.len() != total {
        tracing::warn!(
            dropped = total - sessions.len(),
            "Skipped malformed session log entries"
        );
    }
    sessions
}

/// Finalized sessions backed by the session log document.
#[derive(Debug)]
pub struct SessionLogStore {
    store: JsonStore,
    logs: Vec<Session>,
    retention_days: u32,
}

impl SessionLogStore {
    pub fn new(store: JsonStore) -> Self {
        Self::with_retention(store, DEFAULT_LOG_RETENTION_DAYS)
    }

    pub fn with_retention(store: JsonStore, retention_days: u32) -> Self {
        Self {
            store,
            logs: Vec::new(),
            retention_days,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Read the document, apply retention, and write back if anything was
    /// pruned.
    pub fn load(&mut self, now_ms: u64) {
        let loaded = match self.store.get(SESSION_LOGS_KEY) {
            Ok(Some(raw)) => parse_sessions(raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session logs; starting empty");
                self.logs = Vec::new();
                return;
            }
        };
        let loaded_len = loaded.len();
        self.logs = cleanup_logs_by_retention(loaded, now_ms, self.retention_days);

        tracing::debug!(
            sessions = self.logs.len(),
            pruned = loaded_len - self.logs.len(),
            "Session logs loaded"
        );

        if self.logs.len() != loaded_len {
            if let Err(e) = self.save(now_ms) {
                tracing::warn!(error = %e, "Failed to persist pruned session logs");
            }
        }
    }

    /// Apply retention and persist the whole log.
    pub fn save(&mut self, now_ms: u64) -> Result<(), StoreError> {
        let logs = std::mem::take(&mut self.logs);
        self.logs = cleanup_logs_by_retention(logs, now_ms, self.retention_days);
        let value = serde_json::to_value(&self.logs).map_err(|e| StoreError::Json {
            path: self.store.path().to_path_buf(),
            source: e,
        })?;
        self.store.set(SESSION_LOGS_KEY, value)?;
        self.store.save()
    }

    /// Record `session` as finished and return the stored copy.
    ///
    /// `endedAt` keeps the engine's value when present, else `now_ms`. An
    /// entry with the same `sessionId` is replaced in place; otherwise the
    /// session is prepended.
    pub fn finalize(&mut self, session: &Session, now_ms: u64) -> Session {
        let mut finalized = session.clone();
        finalized.ended_at = Some(session.ended_at.unwrap_or(now_ms));

        match self
            .logs
            .iter()
            .position(|log| log.session_id == finalized.session_id)
        {
            Some(idx) => self.logs[idx] = finalized.clone(),
            None => self.logs.insert(0, finalized.clone()),
        }

        tracing::info!(
            session_id = finalized.session_id,
            success = finalized.success,
            failed = finalized.failed,
            events = finalized.port_events.len(),
            "Session finalized"
        );

        if let Err(e) = self.save(now_ms) {
            tracing::warn!(session_id = finalized.session_id, error = %e, "Failed to save session logs");
        }
        finalized
    }

    /// Remove every session and persist the empty log.
    pub fn clear(&mut self, now_ms: u64) -> Result<(), StoreError> {
        self.logs.clear();
        tracing::info!("Session logs cleared");
        self.save(now_ms)
    }

    /// All retained sessions, newest first.
    pub fn logs(&self) -> &[Session] {
        &self.logs
    }

    /// The most recent sessions, for summary views.
    pub fn recent(&self) -> &[Session] {
        &self.logs[..self.logs.len().min(RECENT_SESSION_COUNT)]
    }

    pub fn get(&self, session_id: u64) -> Option<&Session> {
        self.logs.iter().find(|log| log.session_id == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const NOW: u64 = 1_800_000_000_000;

    fn make_session(id: u64, started_at: u64) -> Session {
        Session {
            session_id: id,
            started_at,
            ended_at: None,
            chip_model: None,
            memory_type: None,
            auto_download: false,
            max_concurrency: 8,
            total: 0,
            success: 0,
            failed: 0,
            manual_stopped: false,
            file_summary: vec![],
            port_events: vec![],
        }
    }

    fn log_store(dir: &TempDir) -> SessionLogStore {
        SessionLogStore::new(JsonStore::new(dir.path().join("massProduction-log.json")))
    }

    #[test]
    fn test_retention_drops_old_and_sorts_desc() {
        let day = MS_PER_DAY;
        let logs = vec![
            make_session(1, NOW - 31 * day),
            make_session(2, NOW - 2 * day),
            make_session(3, NOW - day),
            make_session(4, NOW - 30 * day),
        ];
        let kept = cleanup_logs_by_retention(logs, NOW, 30);
        let ids: Vec<u64> = kept.iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec![3, 2, 4]);
    }

    #[test]
    fn test_finalize_sets_end_and_prepends() {
        let dir = TempDir::new().unwrap();
        let mut logs = log_store(&dir);
        logs.finalize(&make_session(1, NOW - 1_000), NOW);
        let second = logs.finalize(&make_session(2, NOW - 500), NOW + 10);
        assert_eq!(second.ended_at, Some(NOW + 10));
        assert_eq!(logs.logs()[0].session_id, 2);
        assert_eq!(logs.logs().len(), 2);
    }

    #[test]
    fn test_finalize_keeps_engine_end_and_replaces_same_id() {
        let dir = TempDir::new().unwrap();
        let mut logs = log_store(&dir);
        let mut session = make_session(5, NOW - 1_000);
        logs.finalize(&session, NOW);
        session.ended_at = Some(NOW - 10);
        session.success = 3;
        let stored = logs.finalize(&session, NOW);
        assert_eq!(stored.ended_at, Some(NOW - 10));
        assert_eq!(logs.logs().len(), 1);
        assert_eq!(logs.get(5).unwrap().success, 3);
    }

    #[test]
    fn test_load_prunes_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("massProduction-log.json");
        let doc = json!({"sessionLogs": {"value": [
            serde_json::to_value(make_session(1, NOW - 40 * MS_PER_DAY)).unwrap(),
            serde_json::to_value(make_session(2, NOW - 1_000)).unwrap(),
            {"sessionId": "broken"}
        ]}});
        std::fs::write(&path, doc.to_string()).unwrap();

        let mut logs = SessionLogStore::new(JsonStore::new(&path));
        logs.load(NOW);
        assert_eq!(logs.logs().len(), 1);
        assert_eq!(logs.logs()[0].session_id, 2);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["sessionLogs"]["value"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_non_array_document_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("massProduction-log.json");
        std::fs::write(&path, r#"{"sessionLogs": {"value": "nope"}}"#).unwrap();
        let mut logs = SessionLogStore::new(JsonStore::new(&path));
        logs.load(NOW);
        assert!(logs.logs().is_empty());
    }

    #[test]
    fn test_recent_is_capped() {
        let dir = TempDir::new().unwrap();
        let mut logs = log_store(&dir);
        for id in 1..=12 {
            logs.finalize(&make_session(id, NOW - id * 1_000), NOW);
        }
        assert_eq!(logs.recent().len(), RECENT_SESSION_COUNT);
        assert_eq!(logs.recent()[0].session_id, 1);
    }

    #[test]
    fn test_clear_persists_empty_log() {
        let dir = TempDir::new().unwrap();
        let mut logs = log_store(&dir);
        logs.finalize(&make_session(1, NOW), NOW);
        logs.clear(NOW).unwrap();

        let mut reopened = log_store(&dir);
        reopened.load(NOW);
        assert!(reopened.logs().is_empty());
    }
}
