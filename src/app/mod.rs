// FlashBatch - app/mod.rs
//
// Application layer: batch reconciliation, persistence orchestration and
// cross-window log replication.
// Dependencies: core, platform.

pub mod engine;
pub mod log_sync;
pub mod reconciler;
pub mod replay;
pub mod session_log;
pub mod settings;
pub mod state;
