// FlashBatch - app/engine.rs
//
// Command surface of the native flashing engine. The engine owns device
// work and the authoritative batch state; every command answers with the
// state it produced.

use crate::core::model::{LogPaths, Snapshot, StartRequest};
use crate::util::error::EngineError;

/// Commands the client can send to the flashing engine.
///
/// Implementations are injected into `MassProduction` so tests and offline
/// tooling can supply their own.
pub trait FlashEngine {
    /// Begin a batch run (`mass_production_start`).
    fn start(&mut self, request: &StartRequest) -> Result<Snapshot, EngineError>;

    /// Stop the running batch (`mass_production_stop`).
    fn stop(&mut self) -> Result<Snapshot, EngineError>;

    /// Rescan ports, optionally flashing newly eligible ones
    /// (`mass_production_refresh`).
    fn refresh(&mut self, trigger_flash: bool) -> Result<Snapshot, EngineError>;

    /// Current state without side effects (`mass_production_get_snapshot`).
    fn snapshot(&mut self) -> Result<Snapshot, EngineError>;

    /// Where the engine keeps its settings, session log and runtime log.
    fn log_paths(&mut self) -> Result<LogPaths, EngineError>;

    /// Ask the host to reveal the runtime log directory.
    fn open_log_directory(&mut self) -> Result<(), EngineError>;
}

/// Engine used when no native engine is attached to this process.
///
/// Every command fails with `EngineError::Unavailable`, so state changes
/// only arrive through replayed snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEngine;

impl FlashEngine for DetachedEngine {
    fn start(&mut self, _request: &StartRequest) -> Result<Snapshot, EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_start",
        })
    }

    fn stop(&mut self) -> Result<Snapshot, EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_stop",
        })
    }

    fn refresh(&mut self, _trigger_flash: bool) -> Result<Snapshot, EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_refresh",
        })
    }

    fn snapshot(&mut self) -> Result<Snapshot, EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_get_snapshot",
        })
    }

    fn log_paths(&mut self) -> Result<LogPaths, EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_get_log_paths",
        })
    }

    fn open_log_directory(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable {
            command: "mass_production_open_log_directory",
        })
    }
}
