// FlashBatch - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// All errors preserve the causal chain for diagnostic logging.
//
// Which errors surface and which are swallowed:
// - Engine errors are returned to the caller unchanged; starting or stopping
//   a batch is a user action and its failure must be visible.
// - Store errors are produced by `platform::store` but the app layer logs
//   and discards them; persistence is best-effort.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all FlashBatch operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug, Error)]
pub enum FlashBatchError {
    /// A command sent to the flashing engine failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Reading or writing a persisted document failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Export operation failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// I/O error with path context.
    #[error("I/O error during {operation} on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors reported by the flashing engine command surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No engine is attached to this process.
    #[error("no flashing engine attached; cannot run '{command}'")]
    Unavailable { command: &'static str },

    /// The engine rejected or failed the command.
    #[error("'{command}' failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors related to the JSON document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error reading or writing a document.
    #[error("document '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document is not a valid JSON object.
    #[error("document '{}' is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Config parse error '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    #[error("Config '{field}' = '{value}' is out of range. Expected: {expected}")]
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    #[error("Config I/O error '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to session log export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// I/O error writing the export file.
    #[error("Export I/O error '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// CSV serialisation error.
    #[error("CSV export error '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// JSON serialisation error.
    #[error("JSON export error '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for FlashBatch results.
pub type Result<T> = std::result::Result<T, FlashBatchError>;
