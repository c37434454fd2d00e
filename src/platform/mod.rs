// FlashBatch - platform/mod.rs
//
// Platform abstraction layer: directories, config.toml, persisted JSON
// documents and the cross-window event bus.
// Dependencies: standard library, directories, serde_json, toml, core model types.
// Must NOT depend on: app.

pub mod bus;
pub mod config;
pub mod store;
