// FlashBatch - util/logging.rs
//
// Structured logging with runtime-selectable debug mode.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --debug
//   - Config file: [logging] level = "debug"
//
// Output: stderr always. When a runtime log file is configured a second
// layer writes plain (non-ANSI) lines to it through a non-blocking writer.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Pick the filter directive.
///
/// Priority: RUST_LOG env var > CLI --debug flag > config level > default "info".
fn build_filter(debug_flag: bool, config_level: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else if let Some(level) = config_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    }
}

/// Initialise the logging subsystem.
///
/// `debug_flag` is true when the user passed --debug on the CLI.
/// `config_level` is the level from config.toml (if present).
/// `log_file` is the runtime log file; its directory is created on demand.
///
/// The returned guard must be kept alive for as long as file output is
/// wanted; dropping it flushes and stops the background writer.
pub fn init(
    debug_flag: bool,
    config_level: Option<&str>,
    log_file: Option<&Path>,
) -> Option<WorkerGuard> {
    let filter = build_filter(debug_flag, config_level);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let (file_layer, guard) = match log_file.and_then(open_appender) {
        Some((appender, guard)) => {
            let layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        file = log_file.map(|p| p.display().to_string()),
        "Logging initialised"
    );

    guard
}

/// Open a non-rotating appender for `path`.
///
/// Returns `None` (stderr-only logging) when the directory cannot be
/// created; logging must never stop the application from starting.
fn open_appender(
    path: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name()?;

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "Warning: cannot create log directory '{}': {e}; logging to stderr only",
            dir.display()
        );
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}
