// FlashBatch - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// Two serialisation conventions coexist here:
// - Engine-facing types (PortInfo, Snapshot, StartRequest, LogPaths) use the
//   engine's snake_case field names.
// - Persisted documents (Settings, Session, PortEvent) use camelCase, which
//   is what existing settings and session log files contain.

use crate::util::constants::{CONCURRENCY_MAX, CONCURRENCY_MIN, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};

// =============================================================================
// Filter rules
// =============================================================================

/// Port attribute a filter rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    /// USB vendor/product id (`vid`, `pid`, or `vid:pid`).
    VidPid,
    SerialNumber,
    LocationPath,
    /// The OS port name (e.g. `COM7`, `/dev/ttyUSB0`).
    PortName,
}

impl FilterField {
    /// Parse the persisted spelling. Unknown spellings yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "vid_pid" => Some(Self::VidPid),
            "serial_number" => Some(Self::SerialNumber),
            "location_path" => Some(Self::LocationPath),
            "port_name" => Some(Self::PortName),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VidPid => "vid_pid",
            Self::SerialNumber => "serial_number",
            Self::LocationPath => "location_path",
            Self::PortName => "port_name",
        }
    }
}

impl std::fmt::Display for FilterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One allow/deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Unique within its list.
    pub id: String,
    pub field: FilterField,
    pub value: String,
    pub enabled: bool,
}

/// Which of the two rule lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterList {
    Whitelist,
    Blacklist,
}

impl FilterList {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Persisted batch settings, independent of any session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub auto_download: bool,
    /// Always within `CONCURRENCY_MIN..=CONCURRENCY_MAX`.
    pub max_concurrency: u8,
    pub is_filter_enabled: bool,
    pub whitelist: Vec<FilterRule>,
    pub blacklist: Vec<FilterRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_download: false,
            max_concurrency: DEFAULT_CONCURRENCY,
            is_filter_enabled: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

impl Settings {
    pub fn rules(&self, list: FilterList) -> &[FilterRule] {
        match list {
            FilterList::Whitelist => &self.whitelist,
            FilterList::Blacklist => &self.blacklist,
        }
    }

    pub fn rules_mut(&mut self, list: FilterList) -> &mut Vec<FilterRule> {
        match list {
            FilterList::Whitelist => &mut self.whitelist,
            FilterList::Blacklist => &mut self.blacklist,
        }
    }
}

/// Clamp a user- or engine-provided concurrency to the supported range.
///
/// Non-finite input resolves to the default; finite input is rounded to the
/// nearest integer before clamping.
pub fn clamp_concurrency(value: f64) -> u8 {
    if !value.is_finite() {
        return DEFAULT_CONCURRENCY;
    }
    let clamped = value
        .round()
        .clamp(f64::from(CONCURRENCY_MIN), f64::from(CONCURRENCY_MAX));
    clamped as u8
}

// =============================================================================
// Ports
// =============================================================================

/// Lifecycle status of one discovered port, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    #[default]
    Idle,
    Queued,
    Flashing,
    Success,
    Error,
    /// Rejected by the filter rules; never flashed.
    Filtered,
    Disconnected,
}

impl PortStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Flashing => "flashing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Filtered => "filtered",
            Self::Disconnected => "disconnected",
        }
    }

    /// Audit event produced when a port enters this status, if any.
    pub fn event_type(&self) -> Option<PortEventType> {
        match self {
            Self::Queued => Some(PortEventType::Queued),
            Self::Flashing => Some(PortEventType::Start),
            Self::Success => Some(PortEventType::Success),
            Self::Error => Some(PortEventType::Error),
            Self::Disconnected => Some(PortEventType::Disconnected),
            Self::Idle | Self::Filtered => None,
        }
    }
}

impl std::fmt::Display for PortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Engine-owned state of one device port. The client holds a read-only
/// mirror keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PortInfo {
    pub id: String,
    /// Unique within a session.
    pub name: String,
    pub port_type: String,
    #[serde(default)]
    pub vid: Option<String>,
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location_path: Option<String>,
    #[serde(default)]
    pub chip: Option<String>,
    pub status: PortStatus,
    /// 0..=100.
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub is_allowed: bool,
    pub last_seen_at: u64,
    #[serde(default)]
    pub task_started_at: Option<u64>,
    #[serde(default)]
    pub task_finished_at: Option<u64>,
}

impl PortInfo {
    /// Task duration, when the engine reported both ends of it.
    pub fn task_duration_ms(&self) -> Option<u64> {
        match (self.task_started_at, self.task_finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

// =============================================================================
// Engine requests and snapshots
// =============================================================================

/// One image to write, at a flash address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileInfo {
    pub address: u32,
    pub file_path: String,
}

impl WriteFileInfo {
    /// File name without directories; both `/` and `\` separate.
    pub fn file_name(&self) -> &str {
        file_name_of(&self.file_path)
    }
}

/// Last path component of `path`, accepting either separator. A path
/// ending in a separator has no file name and is returned whole.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|part| !part.is_empty())
        .unwrap_or(path)
}

/// Parameters of a batch start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub chip_model: String,
    pub memory_type: String,
    #[serde(default)]
    pub baud_rate: Option<u32>,
    pub stub_path: String,
    pub before_operation: String,
    pub after_operation: String,
    pub files: Vec<WriteFileInfo>,
    pub verify: bool,
    pub no_compress: bool,
    pub erase_all: bool,
    pub auto_download: bool,
    pub max_concurrency: u8,
    pub is_filter_enabled: bool,
    pub whitelist: Vec<FilterRule>,
    pub blacklist: Vec<FilterRule>,
}

/// Full authoritative batch state pushed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub is_running: bool,
    pub is_enabled: bool,
    /// 0 = no session has been started yet.
    pub session_id: u64,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub ended_at: Option<u64>,
    pub manual_stopped: bool,
    #[serde(default)]
    pub chip_model: Option<String>,
    #[serde(default)]
    pub memory_type: Option<String>,
    pub auto_download: bool,
    pub max_concurrency: u8,
    pub queued_count: u32,
    pub active_count: u32,
    pub success_count: u32,
    pub failed_count: u32,
    pub total_count: u32,
    #[serde(default)]
    pub ports: Vec<PortInfo>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            is_running: false,
            is_enabled: false,
            session_id: 0,
            started_at: None,
            ended_at: None,
            manual_stopped: false,
            chip_model: None,
            memory_type: None,
            auto_download: false,
            max_concurrency: DEFAULT_CONCURRENCY,
            queued_count: 0,
            active_count: 0,
            success_count: 0,
            failed_count: 0,
            total_count: 0,
            ports: Vec::new(),
        }
    }
}

/// Where the engine keeps its own files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPaths {
    pub settings_path: String,
    pub session_log_path: String,
    pub runtime_log_dir: String,
    pub runtime_log_path: String,
}

// =============================================================================
// Sessions and port events
// =============================================================================

/// Kind of an audited port lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortEventType {
    Queued,
    Start,
    Success,
    Error,
    Disconnected,
}

impl PortEventType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Start => "start",
            Self::Success => "success",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for PortEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One audited port transition. Append-only within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortEvent {
    /// `<session>-<port>-<type>-<timestamp>`.
    pub id: String,
    pub timestamp: u64,
    pub port_name: String,
    #[serde(rename = "type")]
    pub event_type: PortEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub file_summary: Vec<String>,
}

/// One batch-flashing run.
///
/// Mutable while current; finalized once the engine reports `ended_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: u64,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chip_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
    pub auto_download: bool,
    pub max_concurrency: u8,
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub manual_stopped: bool,
    /// File names (no directories) written in this session.
    #[serde(default)]
    pub file_summary: Vec<String>,
    #[serde(default)]
    pub port_events: Vec<PortEvent>,
}

impl Session {
    /// Wall-clock length of the session, if it has ended.
    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| end.saturating_sub(self.started_at))
    }
}
