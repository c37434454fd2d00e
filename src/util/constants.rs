// FlashBatch - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "FlashBatch";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "FlashBatch";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Concurrency
// =============================================================================

/// Lowest concurrency value handed to the flashing engine.
pub const CONCURRENCY_MIN: u8 = 1;

/// Highest concurrency value handed to the flashing engine.
pub const CONCURRENCY_MAX: u8 = 32;

/// Concurrency used when no valid value is available.
pub const DEFAULT_CONCURRENCY: u8 = 8;

// =============================================================================
// Session log retention
// =============================================================================

/// Session logs older than this many days are pruned on load and save.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

/// Minimum configurable retention (days).
pub const MIN_LOG_RETENTION_DAYS: u32 = 1;

/// Maximum configurable retention (days).
pub const MAX_LOG_RETENTION_DAYS: u32 = 365;

/// Number of entries exposed by the "recent sessions" view.
pub const RECENT_SESSION_COUNT: usize = 10;

/// Milliseconds in one day.
pub const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

// =============================================================================
// Log buffer
// =============================================================================

/// Rolling cap on the number of lines held by a log window.
pub const DEFAULT_MAX_LOG_MESSAGES: usize = 1_000;

/// Minimum configurable log buffer size.
pub const MIN_MAX_LOG_MESSAGES: usize = 100;

/// Maximum configurable log buffer size.
pub const MAX_MAX_LOG_MESSAGES: usize = 100_000;

/// Banner written once when a log buffer is first initialised.
pub const READY_BANNER: &str = "System ready";

// =============================================================================
// Filter rules
// =============================================================================

/// Length of the random base36 suffix appended to generated rule ids.
pub const RULE_ID_SUFFIX_LEN: usize = 7;

// =============================================================================
// Persisted documents
// =============================================================================

/// Document holding the batch settings.
pub const SETTINGS_STORE_FILE: &str = "massProduction.json";

/// Document holding the finalized session logs.
pub const LOG_STORE_FILE: &str = "massProduction-log.json";

/// Key of the settings value inside `SETTINGS_STORE_FILE`.
pub const SETTINGS_KEY: &str = "settings";

/// Key of the session log array inside `LOG_STORE_FILE`.
pub const SESSION_LOGS_KEY: &str = "sessionLogs";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime log subdirectory inside the platform data directory.
pub const RUNTIME_LOG_DIR_NAME: &str = "logs";

/// Runtime log file name.
pub const RUNTIME_LOG_FILE_NAME: &str = "flashbatch.log";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// =============================================================================
// Replay
// =============================================================================

/// Parse failures kept verbatim in a replay summary; the rest are only counted.
pub const MAX_REPLAY_ERRORS_REPORTED: usize = 20;
