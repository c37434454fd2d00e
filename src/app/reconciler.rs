// FlashBatch - app/reconciler.rs
//
// Batch session reconciliation. `MassProduction` owns the client-side
// mirror of the engine's batch state and is the only writer of the port
// map and the current session.
//
// Merge rules applied by `apply_snapshot`:
// - Scalar run state is overwritten, last write wins. The engine is the
//   sole source of truth and snapshots carry no ordering guarantee.
// - A new non-zero `session_id` starts a new current session seeded with
//   the file names captured at batch start.
// - The port list is replaced wholesale.
// - Port events are derived against the previous port map, at most one per
//   port per snapshot, and only while the current session matches.
// - `ended_at` finalizes the session after event derivation. A finalized
//   session is immutable; later snapshots for it only refresh run state.

use crate::app::engine::FlashEngine;
use crate::app::session_log::SessionLogStore;
use crate::app::settings::{load_settings, save_settings};
use crate::core::filter::{self, RuleDraft, RulePatch};
use crate::core::format::operation_status;
use crate::core::model::{
    clamp_concurrency, FilterList, LogPaths, PortEvent, PortEventType, PortInfo, PortStatus,
    Session, Settings, Snapshot, StartRequest,
};
use crate::core::progress::{
    PortProgressEvent, ProgressCounter, ProgressEventType, ProgressFinishStatus, ProgressType,
};
use crate::platform::store::JsonStore;
use crate::util::error::{EngineError, StoreError};
use crate::util::time::Clock;
use std::collections::HashMap;

/// Scalar batch state mirrored from the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub is_running: bool,
    pub is_enabled: bool,
    pub session_id: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub manual_stopped: bool,
    pub chip_model: Option<String>,
    pub memory_type: Option<String>,
    pub queued_count: u32,
    pub active_count: u32,
    pub success_count: u32,
    pub failed_count: u32,
    pub total_count: u32,
}

impl From<&Snapshot> for RunState {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            is_running: snapshot.is_running,
            is_enabled: snapshot.is_enabled,
            session_id: snapshot.session_id,
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
            manual_stopped: snapshot.manual_stopped,
            chip_model: snapshot.chip_model.clone(),
            memory_type: snapshot.memory_type.clone(),
            queued_count: snapshot.queued_count,
            active_count: snapshot.active_count,
            success_count: snapshot.success_count,
            failed_count: snapshot.failed_count,
            total_count: snapshot.total_count,
        }
    }
}

// The engine reports "not set" as either absent or zero/empty.
fn non_zero(value: Option<u64>) -> Option<u64> {
    value.filter(|&v| v > 0)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// Event for `port` given what it looked like in the previous snapshot.
fn derive_event_type(previous: Option<&PortInfo>, port: &PortInfo) -> Option<PortEventType> {
    match previous {
        Some(prev) if prev.status == port.status => {
            if port.status == PortStatus::Error && prev.message != port.message {
                Some(PortEventType::Error)
            } else {
                None
            }
        }
        _ => port.status.event_type(),
    }
}

fn push_port_event(session: &mut Session, port: &PortInfo, event_type: PortEventType, now: u64) {
    tracing::debug!(
        session_id = session.session_id,
        port = %port.name,
        event = %event_type,
        "Port event"
    );
    session.port_events.push(PortEvent {
        id: format!("{}-{}-{}-{}", session.session_id, port.name, event_type, now),
        timestamp: now,
        port_name: port.name.clone(),
        event_type,
        message: non_empty(&port.message),
        duration_ms: port.task_duration_ms(),
        file_summary: session.file_summary.clone(),
    });
}

/// Client-side owner of batch state, settings and the session audit log.
pub struct MassProduction<E: FlashEngine> {
    engine: E,
    settings_store: JsonStore,
    session_logs: SessionLogStore,
    clock: Clock,

    run: RunState,
    settings: Settings,
    /// Settings are only written back once they have been loaded, so the
    /// defaults never overwrite a stored document.
    settings_ready: bool,

    ports: Vec<PortInfo>,
    current_session: Option<Session>,
    current_finalized: bool,
    /// File names captured at batch start, attached to the next new session.
    pending_file_summary: Vec<String>,
    counters: HashMap<u64, ProgressCounter>,
    log_paths: Option<LogPaths>,
}

impl<E: FlashEngine> MassProduction<E> {
    pub fn new(
        engine: E,
        settings_store: JsonStore,
        session_logs: SessionLogStore,
        clock: Clock,
    ) -> Self {
        Self {
            engine,
            settings_store,
            session_logs,
            clock,
            run: RunState::default(),
            settings: Settings::default(),
            settings_ready: false,
            ports: Vec::new(),
            current_session: None,
            current_finalized: false,
            pending_file_summary: Vec::new(),
            counters: HashMap::new(),
            log_paths: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_settings_ready(&self) -> bool {
        self.settings_ready
    }

    pub fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&PortInfo> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// The current session, or the last one finalized.
    pub fn current_session(&self) -> Option<&Session> {
        self.current_session.as_ref()
    }

    pub fn is_current_finalized(&self) -> bool {
        self.current_finalized
    }

    pub fn session_logs(&self) -> &SessionLogStore {
        &self.session_logs
    }

    pub fn pending_file_summary(&self) -> &[String] {
        &self.pending_file_summary
    }

    pub fn counter(&self, id: u64) -> Option<&ProgressCounter> {
        self.counters.get(&id)
    }

    /// Paths from the last successful `fetch_log_paths`.
    pub fn log_paths(&self) -> Option<&LogPaths> {
        self.log_paths.as_ref()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Load settings and session logs. Settings saves are enabled afterwards
    /// even if nothing was stored.
    pub fn load_from_storage(&mut self) {
        self.settings_ready = false;
        if let Some(settings) = load_settings(&mut self.settings_store) {
            self.settings = settings;
        }
        self.session_logs.load((self.clock)());
        self.settings_ready = true;
    }

    /// Persist the current settings. Failures are logged and discarded.
    pub fn save_settings(&mut self) {
        if let Err(e) = save_settings(&mut self.settings_store, &self.settings) {
            tracing::warn!(error = %e, "Failed to save settings");
        }
    }

    /// Explicit "settings changed" notification.
    fn settings_changed(&mut self) {
        if self.settings_ready {
            self.save_settings();
        }
    }

    pub fn clear_session_logs(&mut self) -> Result<(), StoreError> {
        self.session_logs.clear((self.clock)())
    }

    // -------------------------------------------------------------------------
    // Settings mutations
    // -------------------------------------------------------------------------

    /// Local enable flag for the batch panel. Not persisted; the next
    /// snapshot overwrites it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.run.is_enabled = enabled;
    }

    pub fn set_auto_download(&mut self, auto_download: bool) {
        self.settings.auto_download = auto_download;
        self.settings_changed();
    }

    /// Set concurrency, clamped to the supported range. Returns the stored value.
    pub fn set_max_concurrency(&mut self, value: f64) -> u8 {
        self.settings.max_concurrency = clamp_concurrency(value);
        self.settings_changed();
        self.settings.max_concurrency
    }

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.settings.is_filter_enabled = enabled;
        self.settings_changed();
    }

    pub fn add_rule(&mut self, list: FilterList, draft: RuleDraft) -> String {
        let id = filter::add_rule(&mut self.settings, list, draft, (self.clock)());
        tracing::debug!(list = list.label(), rule = %id, "Filter rule added");
        self.settings_changed();
        id
    }

    pub fn remove_rule(&mut self, list: FilterList, id: &str) -> bool {
        let removed = filter::remove_rule(&mut self.settings, list, id);
        if removed {
            self.settings_changed();
        }
        removed
    }

    pub fn update_rule(&mut self, list: FilterList, id: &str, patch: RulePatch) -> bool {
        let updated = filter::update_rule(&mut self.settings, list, id, patch);
        if updated {
            self.settings_changed();
        }
        updated
    }

    pub fn is_port_allowed(&self, port: &PortInfo) -> bool {
        filter::is_allowed(port, &self.settings)
    }

    /// Copy the batch settings into a start request.
    pub fn stage_request(&self, mut request: StartRequest) -> StartRequest {
        request.auto_download = self.settings.auto_download;
        request.max_concurrency = clamp_concurrency(f64::from(self.settings.max_concurrency));
        request.is_filter_enabled = self.settings.is_filter_enabled;
        request.whitelist = self.settings.whitelist.clone();
        request.blacklist = self.settings.blacklist.clone();
        request
    }

    // -------------------------------------------------------------------------
    // Snapshot reconciliation
    // -------------------------------------------------------------------------

    /// Merge one engine snapshot. Safe to call with duplicated or
    /// reordered snapshots.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let now = (self.clock)();
        let previous: HashMap<String, PortInfo> = std::mem::take(&mut self.ports)
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        self.run = RunState::from(snapshot);

        let max_concurrency = clamp_concurrency(f64::from(snapshot.max_concurrency));
        if self.settings.auto_download != snapshot.auto_download
            || self.settings.max_concurrency != max_concurrency
        {
            self.settings.auto_download = snapshot.auto_download;
            self.settings.max_concurrency = max_concurrency;
            self.settings_changed();
        }

        self.ensure_current_session(snapshot, now);
        self.ports = snapshot.ports.clone();

        let Some(session) = self
            .current_session
            .as_mut()
            .filter(|s| s.session_id == snapshot.session_id)
        else {
            return;
        };
        if self.current_finalized {
            tracing::trace!(session_id = session.session_id, "Snapshot for finalized session");
            return;
        }

        session.started_at = non_zero(snapshot.started_at).unwrap_or(session.started_at);
        session.ended_at = non_zero(snapshot.ended_at).or(session.ended_at);
        session.chip_model = non_empty(&snapshot.chip_model).or(session.chip_model.take());
        session.memory_type = non_empty(&snapshot.memory_type).or(session.memory_type.take());
        session.auto_download = snapshot.auto_download;
        session.max_concurrency = snapshot.max_concurrency;
        session.total = snapshot.total_count;
        session.success = snapshot.success_count;
        session.failed = snapshot.failed_count;
        session.manual_stopped = snapshot.manual_stopped;

        for port in &self.ports {
            if let Some(event_type) = derive_event_type(previous.get(&port.name), port) {
                push_port_event(session, port, event_type, now);
            }
        }

        if non_zero(snapshot.ended_at).is_some() {
            *session = self.session_logs.finalize(session, now);
            self.current_finalized = true;
        }
    }

    fn ensure_current_session(&mut self, snapshot: &Snapshot, now: u64) {
        if snapshot.session_id == 0 {
            return;
        }
        if self.current_session.as_ref().map(|s| s.session_id) == Some(snapshot.session_id) {
            return;
        }

        let file_summary = std::mem::take(&mut self.pending_file_summary);
        tracing::info!(
            session_id = snapshot.session_id,
            files = file_summary.len(),
            "New batch session"
        );
        self.current_session = Some(Session {
            session_id: snapshot.session_id,
            started_at: non_zero(snapshot.started_at).unwrap_or(now),
            ended_at: non_zero(snapshot.ended_at),
            chip_model: non_empty(&snapshot.chip_model),
            memory_type: non_empty(&snapshot.memory_type),
            auto_download: snapshot.auto_download,
            max_concurrency: snapshot.max_concurrency,
            total: snapshot.total_count,
            success: snapshot.success_count,
            failed: snapshot.failed_count,
            manual_stopped: snapshot.manual_stopped,
            file_summary,
            port_events: Vec::new(),
        });
        self.current_finalized = false;
    }

    /// Mirror one progress event onto its port row.
    ///
    /// Events for ports not in the current port map are ignored.
    pub fn apply_progress_event(&mut self, payload: &PortProgressEvent) {
        let now = (self.clock)();
        let Some(idx) = self.ports.iter().position(|p| p.name == payload.port_name) else {
            tracing::trace!(port = %payload.port_name, "Progress for unknown port");
            return;
        };
        let event = &payload.event;

        match event.event_type {
            ProgressEventType::Start => {
                let port = &mut self.ports[idx];
                let became_flashing = matches!(port.status, PortStatus::Queued | PortStatus::Idle);
                if became_flashing {
                    port.status = PortStatus::Flashing;
                }
                port.message = Some(operation_status(&event.operation).to_string());

                if let ProgressType::Bar { total } = event.progress_type {
                    let counter = ProgressCounter {
                        port_name: payload.port_name.clone(),
                        current: event.current.unwrap_or(0),
                        total,
                    };
                    if let Some(pct) = counter.percentage() {
                        port.progress = pct;
                    }
                    self.counters.insert(event.id, counter);
                }

                if became_flashing && !self.current_finalized {
                    if let Some(session) = self.current_session.as_mut() {
                        push_port_event(session, &self.ports[idx], PortEventType::Start, now);
                    }
                }
            }
            ProgressEventType::Update => {
                self.ports[idx].message = Some(operation_status(&event.operation).to_string());
            }
            ProgressEventType::Increment => {
                if let Some(counter) = self.counters.get_mut(&event.id) {
                    if counter.port_name == payload.port_name {
                        counter.current = counter.current.saturating_add(event.current.unwrap_or(0));
                        if let Some(pct) = counter.percentage() {
                            self.ports[idx].progress = pct;
                        }
                    }
                }
            }
            ProgressEventType::Finish => {
                self.counters.remove(&event.id);
                let port = &mut self.ports[idx];
                if let Some(ProgressFinishStatus::Failed { message }) = &event.status {
                    port.message = Some(message.clone());
                } else if port.status == PortStatus::Flashing {
                    port.progress = 100;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Engine commands
    // -------------------------------------------------------------------------

    /// Remember the request's file names for the next new session.
    pub fn capture_file_summary(&mut self, request: &StartRequest) {
        self.pending_file_summary = request
            .files
            .iter()
            .map(|f| f.file_name().to_string())
            .collect();
    }

    /// Start a batch. File names are captured before the engine is called
    /// so they attach to the session the engine creates.
    pub fn start_mass_production(&mut self, request: &StartRequest) -> Result<Snapshot, EngineError> {
        self.capture_file_summary(request);
        tracing::info!(
            chip = %request.chip_model,
            files = request.files.len(),
            max_concurrency = request.max_concurrency,
            "Starting batch"
        );
        let snapshot = self.engine.start(request)?;
        self.apply_snapshot(&snapshot);
        Ok(snapshot)
    }

    pub fn stop_mass_production(&mut self) -> Result<Snapshot, EngineError> {
        tracing::info!(session_id = self.run.session_id, "Stopping batch");
        let snapshot = self.engine.stop()?;
        self.apply_snapshot(&snapshot);
        Ok(snapshot)
    }

    pub fn refresh_mass_production(&mut self, trigger_flash: bool) -> Result<Snapshot, EngineError> {
        let snapshot = self.engine.refresh(trigger_flash)?;
        self.apply_snapshot(&snapshot);
        Ok(snapshot)
    }

    pub fn fetch_snapshot(&mut self) -> Result<Snapshot, EngineError> {
        let snapshot = self.engine.snapshot()?;
        self.apply_snapshot(&snapshot);
        Ok(snapshot)
    }

    pub fn fetch_log_paths(&mut self) -> Result<LogPaths, EngineError> {
        let paths = self.engine.log_paths()?;
        self.log_paths = Some(paths.clone());
        Ok(paths)
    }

    pub fn open_log_directory(&mut self) -> Result<(), EngineError> {
        self.engine.open_log_directory()
    }
}
