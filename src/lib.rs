// FlashBatch - lib.rs
//
// Library entry point, exposing every module for integration testing and
// for hosts that embed the batch client.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
