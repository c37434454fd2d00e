// FlashBatch - core/export.rs
//
// CSV and JSON export of finalized session logs.
// Core layer: writes to any Write trait object.

use crate::core::model::Session;
use crate::util::error::ExportError;
use crate::util::time::format_rfc3339;
use std::io::Write;
use std::path::Path;

/// Export sessions to CSV, one row per port event.
///
/// A session with no port events still produces one row so it is visible
/// in the export. Returns the number of data rows written.
///
/// Columns: session_id, started_at, ended_at, chip_model, total, success,
/// failed, manual_stopped, port, event, timestamp, duration_ms, message
pub fn export_csv<W: Write>(
    sessions: &[Session],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |e: csv::Error| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([
            "session_id",
            "started_at",
            "ended_at",
            "chip_model",
            "total",
            "success",
            "failed",
            "manual_stopped",
            "port",
            "event",
            "timestamp",
            "duration_ms",
            "message",
        ])
        .map_err(csv_err)?;

    let mut count = 0;
    for session in sessions {
        let session_cols = [
            session.session_id.to_string(),
            format_rfc3339(session.started_at),
            session.ended_at.map(format_rfc3339).unwrap_or_default(),
            session.chip_model.clone().unwrap_or_default(),
            session.total.to_string(),
            session.success.to_string(),
            session.failed.to_string(),
            session.manual_stopped.to_string(),
        ];

        if session.port_events.is_empty() {
            let mut record = session_cols.to_vec();
            record.extend(std::iter::repeat(String::new()).take(5));
            csv_writer.write_record(&record).map_err(csv_err)?;
            count += 1;
            continue;
        }

        for event in &session.port_events {
            let mut record = session_cols.to_vec();
            record.extend([
                event.port_name.clone(),
                event.event_type.label().to_string(),
                format_rfc3339(event.timestamp),
                event.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
                event.message.clone().unwrap_or_default(),
            ]);
            csv_writer.write_record(&record).map_err(csv_err)?;
            count += 1;
        }
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Export sessions to JSON in the same camelCase shape as the session log
/// document. Returns the number of sessions written.
pub fn export_json<W: Write>(
    sessions: &[Session],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, sessions).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(sessions.len())
}
