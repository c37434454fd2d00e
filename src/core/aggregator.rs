// FlashBatch - core/aggregator.rs
//
// Turns the engine's progress event stream into percentages, transfer
// speed, ETA, file-completion state and operation-labelled log lines.
//
// Core layer: pure logic. Time comes in as an argument and log output goes
// out as returned `LogLine`s, so the app layer decides where lines end up.
//
// Items are keyed by (port, id): in batch mode every port numbers its own
// operations, so ids repeat across ports. Single-device flashing uses the
// empty port name.
//
// Tolerance rules:
// - `increment`/`finish` for an id with no tracked entry on that port are
//   no-ops; the engine does not guarantee `start` is observed first.
// - Percentage, speed and ETA are always derived from accumulated deltas.
// - A `write_flash` finish only advances file completion while the batch is
//   flagged as flashing, so internal transfers during connect (stub
//   verification) cannot mark the plan complete.
// - Completion is tracked per port. The plan is complete once every port
//   that started a download has finished every file.

use crate::core::format::{
    describe_operation, finish_label, format_address, format_bytes, format_eta, format_speed,
    operation_name,
};
use crate::core::model::{file_name_of, WriteFileInfo};
use crate::core::progress::{
    ProgressCounter, ProgressEvent, ProgressEventType, ProgressOperation, ProgressType,
};
use std::collections::{HashMap, HashSet};

/// A file of the active download plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashFile {
    /// File name without directories.
    pub name: String,
    pub path: String,
    pub address: Option<u32>,
}

impl From<&WriteFileInfo> for FlashFile {
    fn from(info: &WriteFileInfo) -> Self {
        Self {
            name: file_name_of(&info.file_path).to_string(),
            path: info.file_path.clone(),
            address: Some(info.address),
        }
    }
}

/// A line destined for the log buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub message: String,
    pub important: bool,
}

impl LogLine {
    fn plain(message: String) -> Self {
        Self {
            message,
            important: false,
        }
    }

    fn important(message: String) -> Self {
        Self {
            message,
            important: true,
        }
    }
}

/// Lifecycle of one tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Active,
    Completed,
}

/// Everything known about one open progress id.
#[derive(Debug, Clone)]
pub struct ProgressItem {
    pub operation: ProgressOperation,
    /// Full operation description, refreshed on `update`.
    pub label: String,
    /// Mapped file name, formatted address, or `operation <id>`.
    pub display_name: String,
    /// Set when the address maps to a file of the plan.
    pub file_name: Option<String>,
    /// Only present for bar-type progress.
    pub counter: Option<ProgressCounter>,
    pub started_at: u64,
    pub percentage: u8,
    /// Bytes per second.
    pub speed: f64,
    /// Seconds remaining.
    pub eta: f64,
    pub status: ItemStatus,
}

/// Aggregate figures for the download currently in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TotalProgress {
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
    pub speed: f64,
    pub eta: f64,
    pub current_file_name: String,
    pub completed_count: usize,
    pub total_count: usize,
}

/// Resolved view of an operation: label, target address, plan file.
struct OperationMeta {
    label: String,
    file_name: Option<String>,
    display_name: String,
}

type ItemKey = (String, u64);

/// Consumes progress events and keeps derived progress state.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    items: HashMap<ItemKey, ProgressItem>,
    files: Vec<FlashFile>,
    /// Finished plan files per port. A port is present once it starts a download.
    completed_files: HashMap<String, HashSet<String>>,
    total: TotalProgress,
    current_file: Option<String>,
    current_operation: Option<String>,
    flash_completed: bool,
    is_flashing: bool,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the download plan. Resets completion tracking.
    pub fn set_files(&mut self, files: Vec<FlashFile>) {
        self.files = files;
        self.reset();
    }

    /// Mark whether a flashing session is actually active.
    pub fn set_flashing(&mut self, flashing: bool) {
        self.is_flashing = flashing;
    }

    pub fn is_flashing(&self) -> bool {
        self.is_flashing
    }

    /// Drop all open items and completion state, keeping the plan.
    pub fn reset(&mut self) {
        self.items.clear();
        self.completed_files.clear();
        self.current_file = None;
        self.current_operation = None;
        self.flash_completed = false;
        self.total = TotalProgress {
            total_count: self.files.len(),
            ..Default::default()
        };
    }

    pub fn item(&self, port_name: &str, id: u64) -> Option<&ProgressItem> {
        self.items.get(&(port_name.to_string(), id))
    }

    pub fn counter(&self, port_name: &str, id: u64) -> Option<&ProgressCounter> {
        self.item(port_name, id).and_then(|item| item.counter.as_ref())
    }

    pub fn open_items(&self) -> usize {
        self.items.len()
    }

    pub fn total_progress(&self) -> &TotalProgress {
        &self.total
    }

    pub fn current_operation(&self) -> Option<&str> {
        self.current_operation.as_deref()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    /// Plan files `port_name` has finished writing.
    pub fn completed_files(&self, port_name: &str) -> Option<&HashSet<String>> {
        self.completed_files.get(port_name)
    }

    pub fn is_completed(&self) -> bool {
        self.flash_completed
    }

    /// Apply one event and return the log lines it produced.
    ///
    /// `port_name` is empty for single-device flashing. `now` is epoch ms.
    pub fn handle_event(&mut self, port_name: &str, event: &ProgressEvent, now: u64) -> Vec<LogLine> {
        match event.event_type {
            ProgressEventType::Start => self.handle_start(port_name, event, now),
            ProgressEventType::Update => self.handle_update(port_name, event),
            ProgressEventType::Increment => self.handle_increment(port_name, event, now),
            ProgressEventType::Finish => self.handle_finish(port_name, event),
        }
    }

    fn resolve(&self, id: u64, operation: &ProgressOperation) -> OperationMeta {
        let address = operation.address();
        let file_name = if operation.is_download() {
            address.and_then(|addr| {
                self.files
                    .iter()
                    .find(|f| f.address == Some(addr))
                    .map(|f| f.name.clone())
            })
        } else {
            None
        };
        let display_name = match (&file_name, address) {
            (Some(name), _) => name.clone(),
            (None, Some(addr)) => format_address(addr),
            (None, None) => format!("operation {id}"),
        };
        OperationMeta {
            label: describe_operation(operation),
            file_name,
            display_name,
        }
    }

    fn handle_start(&mut self, port_name: &str, event: &ProgressEvent, now: u64) -> Vec<LogLine> {
        let meta = self.resolve(event.id, &event.operation);

        let counter = match event.progress_type {
            ProgressType::Bar { total } => Some(ProgressCounter {
                port_name: port_name.to_string(),
                current: event.current.unwrap_or(0),
                total,
            }),
            ProgressType::Spinner => None,
        };
        let percentage = counter
            .as_ref()
            .and_then(ProgressCounter::percentage)
            .unwrap_or(0);

        self.current_operation = Some(operation_name(&event.operation).to_string());
        if event.operation.is_download() {
            let completed = self.completed_files.entry(port_name.to_string()).or_default().len();
            self.current_file = Some(meta.display_name.clone());
            self.total = TotalProgress {
                current: counter.as_ref().map_or(0, |c| c.current),
                total: counter.as_ref().map_or(0, |c| c.total),
                percentage,
                current_file_name: meta.display_name.clone(),
                completed_count: completed,
                total_count: self.files.len(),
                ..Default::default()
            };
        }

        let line = LogLine::plain(format!("[{}] {}", meta.display_name, meta.label));

        tracing::debug!(
            id = event.id,
            port = port_name,
            operation = operation_name(&event.operation),
            "Progress started"
        );

        self.items.insert(
            (port_name.to_string(), event.id),
            ProgressItem {
                operation: event.operation,
                label: meta.label,
                display_name: meta.display_name,
                file_name: meta.file_name,
                counter,
                started_at: now,
                percentage,
                speed: 0.0,
                eta: 0.0,
                status: ItemStatus::Active,
            },
        );

        vec![line]
    }

    fn handle_update(&mut self, port_name: &str, event: &ProgressEvent) -> Vec<LogLine> {
        let meta = self.resolve(event.id, &event.operation);
        let line = LogLine::plain(format!("[{}] {}", meta.display_name, meta.label));

        if let Some(item) = self.items.get_mut(&(port_name.to_string(), event.id)) {
            item.operation = event.operation;
            item.label = meta.label;
            item.display_name = meta.display_name;
            item.file_name = meta.file_name;
        }
        self.current_operation = Some(operation_name(&event.operation).to_string());

        vec![line]
    }

    fn handle_increment(&mut self, port_name: &str, event: &ProgressEvent, now: u64) -> Vec<LogLine> {
        let Some(item) = self.items.get_mut(&(port_name.to_string(), event.id)) else {
            return Vec::new();
        };
        let Some(counter) = item.counter.as_mut() else {
            return Vec::new();
        };

        counter.current = counter.current.saturating_add(event.current.unwrap_or(0));
        if let Some(pct) = counter.percentage() {
            item.percentage = pct;
        }

        let elapsed_secs = now.saturating_sub(item.started_at) as f64 / 1000.0;
        if elapsed_secs > 0.0 && counter.current > 0 {
            item.speed = counter.current as f64 / elapsed_secs;
            if item.speed > 0.0 {
                item.eta = counter.total.saturating_sub(counter.current) as f64 / item.speed;
            }
        }
        if item.percentage >= 100 {
            item.status = ItemStatus::Completed;
        }

        if !item.operation.is_download() {
            return Vec::new();
        }

        self.total.current = counter.current;
        self.total.total = counter.total;
        self.total.percentage = item.percentage;
        self.total.speed = item.speed;
        self.total.eta = item.eta;

        if counter.total == 0 {
            return Vec::new();
        }
        let speed = if item.speed > 0.0 {
            format!(" @ {}", format_speed(item.speed))
        } else {
            String::new()
        };
        let eta = if item.eta > 0.0 {
            format!(", ETA {}", format_eta(item.eta))
        } else {
            String::new()
        };
        vec![LogLine::plain(format!(
            "[{}] progress: {}% ({}/{}){speed}{eta}",
            item.display_name,
            item.percentage,
            format_bytes(counter.current),
            format_bytes(counter.total),
        ))]
    }

    fn handle_finish(&mut self, port_name: &str, event: &ProgressEvent) -> Vec<LogLine> {
        let Some(mut item) = self.items.remove(&(port_name.to_string(), event.id)) else {
            return Vec::new();
        };
        item.status = ItemStatus::Completed;
        let label = finish_label(event.status.as_ref());

        if !item.operation.is_download() {
            self.current_operation = None;
            return vec![LogLine::important(format!(
                "[{}] {label}",
                operation_name(&item.operation)
            ))];
        }

        if !self.is_flashing {
            tracing::debug!(
                id = event.id,
                port = port_name,
                file = %item.display_name,
                "Download finished outside an active flash session; completion not recorded"
            );
            return vec![LogLine::plain(format!("[{}] {label}", item.display_name))];
        }

        let mut lines = vec![LogLine::important(format!("[{}] {label}", item.display_name))];

        let completed = self.completed_files.entry(port_name.to_string()).or_default();
        completed.insert(item.display_name.clone());
        let port_done = !self.files.is_empty() && completed.len() >= self.files.len();
        self.total.completed_count = completed.len();
        self.total.total_count = self.files.len();
        self.total.percentage = 100;
        if self.current_file.as_deref() == Some(item.display_name.as_str()) {
            self.current_file = None;
        }

        if port_done {
            tracing::info!(port = port_name, files = self.files.len(), "All files flashed");
            lines.push(LogLine::important("All files flashed".to_string()));
        }

        if port_done && self.all_ports_done() {
            self.flash_completed = true;
            self.current_operation = None;
            self.total.current_file_name.clear();
        }

        lines
    }

    /// True when every port that started a download has finished the plan.
    fn all_ports_done(&self) -> bool {
        let plan = self.files.len();
        plan > 0 && self.completed_files.values().all(|done| done.len() >= plan)
    }
}
