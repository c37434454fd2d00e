// FlashBatch - core/mod.rs
//
// Core business logic layer: data model, port filtering, progress
// aggregation, display formatting and export.
// Dependencies: serde, csv, rand, util.
// Must NOT depend on: platform, app, or any filesystem I/O.

pub mod aggregator;
pub mod export;
pub mod filter;
pub mod format;
pub mod model;
pub mod progress;
