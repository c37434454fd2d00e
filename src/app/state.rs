// FlashBatch - app/state.rs
//
// Application state for one window. Routes engine snapshots into the
// reconciler and engine progress into both the reconciler (port rows) and
// the progress aggregator (figures and log lines), and keeps the log
// buffer's flashing flag in step with the engine's run state.

use crate::app::engine::FlashEngine;
use crate::app::log_sync::LogBuffer;
use crate::app::reconciler::MassProduction;
use crate::core::aggregator::{FlashFile, LogLine, ProgressAggregator};
use crate::core::model::{Snapshot, StartRequest};
use crate::core::progress::PortProgressEvent;
use crate::platform::bus::EventBus;
use crate::util::error::EngineError;
use crate::util::time::Clock;

/// Top-level state of the batch window.
pub struct AppState<E: FlashEngine> {
    pub mass_production: MassProduction<E>,
    pub progress: ProgressAggregator,
    pub log: LogBuffer,
    clock: Clock,
    announced_session: Option<u64>,
}

impl<E: FlashEngine> AppState<E> {
    /// Build the window state and write the ready banner.
    pub fn new(
        mass_production: MassProduction<E>,
        bus: &EventBus,
        max_log_messages: usize,
        clock: Clock,
    ) -> Self {
        let mut log = LogBuffer::new(bus, max_log_messages);
        log.initialize_log();
        Self {
            mass_production,
            progress: ProgressAggregator::new(),
            log,
            clock,
            announced_session: None,
        }
    }

    /// Replace the log buffer's timestamp source (tests, replays).
    pub fn with_log_time_source(mut self, time_of_day: fn() -> String) -> Self {
        self.log = self.log.with_time_source(time_of_day);
        self
    }

    /// Start a batch with the stored settings applied to `request`.
    ///
    /// Returns the log lines written. Engine failures are logged to the
    /// buffer and returned unchanged.
    pub fn start_batch(&mut self, request: StartRequest) -> Result<Vec<String>, EngineError> {
        let (request, line) = self.prepare_batch(request);
        let mut lines = vec![line];
        match self.mass_production.start_mass_production(&request) {
            Ok(snapshot) => {
                lines.extend(self.after_snapshot(&snapshot));
                Ok(lines)
            }
            Err(e) => {
                tracing::error!(error = %e, "Batch start failed");
                self.log.add_message(&format!("Start failed: {e}"), true);
                Err(e)
            }
        }
    }

    /// Apply stored settings to `request` and load its files into the
    /// aggregator. Returns the staged request and the log line written.
    ///
    /// File names for the session are captured by the reconciler when the
    /// engine is asked to start.
    pub fn prepare_batch(&mut self, request: StartRequest) -> (StartRequest, String) {
        let request = self.mass_production.stage_request(request);
        self.progress
            .set_files(request.files.iter().map(FlashFile::from).collect());

        let line = self.log.add_message(
            &format!(
                "Starting batch: {} file(s), chip {}, concurrency {}",
                request.files.len(),
                request.chip_model,
                request.max_concurrency
            ),
            true,
        );
        (request, line)
    }

    pub fn stop_batch(&mut self) -> Result<Vec<String>, EngineError> {
        match self.mass_production.stop_mass_production() {
            Ok(snapshot) => Ok(self.after_snapshot(&snapshot)),
            Err(e) => {
                tracing::error!(error = %e, "Batch stop failed");
                self.log.add_message(&format!("Stop failed: {e}"), true);
                Err(e)
            }
        }
    }

    pub fn refresh(&mut self, trigger_flash: bool) -> Result<Vec<String>, EngineError> {
        let snapshot = self.mass_production.refresh_mass_production(trigger_flash)?;
        Ok(self.after_snapshot(&snapshot))
    }

    /// Handle a snapshot pushed by the engine.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> Vec<String> {
        self.mass_production.apply_snapshot(snapshot);
        self.after_snapshot(snapshot)
    }

    fn after_snapshot(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::new();
        let running = snapshot.is_running;
        if running != self.log.is_flashing() {
            self.log.set_flashing(running);
            if let Some(line) = self.log.latest_message() {
                lines.push(line.to_string());
            }
        }
        self.progress.set_flashing(running);

        // Announce a finalized session once, on the first snapshot that
        // reports its end.
        let finalized = self
            .mass_production
            .current_session()
            .filter(|s| s.session_id == snapshot.session_id)
            .filter(|_| self.mass_production.is_current_finalized())
            .cloned();
        if let Some(session) = finalized {
            if self.announced_session != Some(session.session_id) {
                self.announced_session = Some(session.session_id);
                lines.push(self.log.add_message(
                    &format!(
                        "Session {} finished: {} succeeded, {} failed, {} total{}",
                        session.session_id,
                        session.success,
                        session.failed,
                        session.total,
                        if session.manual_stopped {
                            " (stopped)"
                        } else {
                            ""
                        }
                    ),
                    true,
                ));
            }
        }
        lines
    }

    /// Handle a progress event from the engine and relay it to other windows.
    pub fn on_progress(&mut self, event: &PortProgressEvent) -> Vec<String> {
        let lines = self.apply_progress(event);
        self.log.forward_progress(event.clone());
        lines
    }

    /// Apply bus traffic from other windows. Relayed progress updates the
    /// local figures but is not relayed again.
    pub fn poll_bus(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for event in self.log.poll() {
            lines.extend(self.apply_progress(&event));
        }
        lines
    }

    fn apply_progress(&mut self, event: &PortProgressEvent) -> Vec<String> {
        self.mass_production.apply_progress_event(event);
        let now = (self.clock)();
        self.progress
            .handle_event(&event.port_name, &event.event, now)
            .into_iter()
            .map(|LogLine { message, important }| {
                let text = if event.port_name.is_empty() {
                    message
                } else {
                    format!("{}: {message}", event.port_name)
                };
                self.log.add_message(&text, important)
            })
            .collect()
    }
}
