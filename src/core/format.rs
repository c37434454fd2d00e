// FlashBatch - core/format.rs
//
// Human-readable labels for progress operations, finish states, sizes,
// rates and durations. Every match over an operation kind is exhaustive so
// a new kind cannot be added without a label.

use crate::core::progress::{ProgressFinishStatus, ProgressOperation, StubStage};

/// `0x` followed by eight upper-case hex digits.
pub fn format_address(address: u32) -> String {
    format!("0x{address:08X}")
}

/// Bytes with a binary unit and one decimal place (`1.5 KB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        let rounded = (value * 10.0).round() / 10.0;
        format!("{rounded} {}", UNITS[unit])
    }
}

/// Transfer rate, `-- KB/s` when unknown.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "-- KB/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec.round() as u64))
}

/// Remaining time as `42s`, `3m 5s` or `1h 12m`.
pub fn format_eta(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

fn stub_stage_label(stage: StubStage) -> &'static str {
    match stage {
        StubStage::Start => "start",
        StubStage::SignatureKey => "signature",
        StubStage::RamStub => "RAM",
    }
}

/// Short name of the operation kind, used as a log line tag.
pub fn operation_name(operation: &ProgressOperation) -> &'static str {
    match operation {
        ProgressOperation::Connect => "Connect",
        ProgressOperation::DownloadStub { .. } => "Download stub",
        ProgressOperation::EraseFlash { .. } => "Erase flash",
        ProgressOperation::EraseRegion { .. } => "Erase region",
        ProgressOperation::EraseAllRegions => "Erase all regions",
        ProgressOperation::Verify { .. } => "Verify",
        ProgressOperation::CheckRedownload { .. } => "Check redownload",
        ProgressOperation::WriteFlash { .. } => "Write flash",
        ProgressOperation::ReadFlash { .. } => "Read flash",
        ProgressOperation::Unknown => "Operation",
    }
}

/// Present-tense status text shown on a port row while the operation runs.
pub fn operation_status(operation: &ProgressOperation) -> &'static str {
    match operation {
        ProgressOperation::Connect => "Connecting",
        ProgressOperation::DownloadStub { .. } => "Downloading stub",
        ProgressOperation::EraseFlash { .. } => "Erasing flash",
        ProgressOperation::EraseRegion { .. } => "Erasing region",
        ProgressOperation::EraseAllRegions => "Erasing all regions",
        ProgressOperation::Verify { .. } => "Verifying",
        ProgressOperation::CheckRedownload { .. } => "Checking",
        ProgressOperation::WriteFlash { .. } => "Flashing",
        ProgressOperation::ReadFlash { .. } => "Reading",
        ProgressOperation::Unknown => "Processing",
    }
}

/// Full description of an operation including its address and size.
pub fn describe_operation(operation: &ProgressOperation) -> String {
    match operation {
        ProgressOperation::Connect => "Connecting to device".to_string(),
        ProgressOperation::DownloadStub { stage } => {
            format!("Downloading stub ({})", stub_stage_label(*stage))
        }
        ProgressOperation::EraseFlash { address, .. } => {
            format!("Erasing flash @ {}", format_address(*address))
        }
        ProgressOperation::EraseRegion { address, len, .. } => format!(
            "Erasing region @ {} ({})",
            format_address(*address),
            format_bytes(*len)
        ),
        ProgressOperation::EraseAllRegions => "Erasing all regions".to_string(),
        ProgressOperation::Verify { address, len } => format!(
            "Verifying @ {} ({})",
            format_address(*address),
            format_bytes(*len)
        ),
        ProgressOperation::CheckRedownload { address, size } => format!(
            "Checking redownload @ {} ({})",
            format_address(*address),
            format_bytes(*size)
        ),
        ProgressOperation::WriteFlash { address, size } => format!(
            "Writing @ {} ({})",
            format_address(*address),
            format_bytes(*size)
        ),
        ProgressOperation::ReadFlash { address, size } => format!(
            "Reading @ {} ({})",
            format_address(*address),
            format_bytes(*size)
        ),
        ProgressOperation::Unknown => "Processing".to_string(),
    }
}

/// Text for a `finish` event. An absent status means success.
pub fn finish_label(status: Option<&ProgressFinishStatus>) -> String {
    match status {
        None | Some(ProgressFinishStatus::Success) => "done".to_string(),
        Some(ProgressFinishStatus::Retry) => "retry".to_string(),
        Some(ProgressFinishStatus::Skipped) => "skipped".to_string(),
        Some(ProgressFinishStatus::Required) => "required".to_string(),
        Some(ProgressFinishStatus::NotFound) => "not found".to_string(),
        Some(ProgressFinishStatus::Failed { message }) => format!("failed: {message}"),
        Some(ProgressFinishStatus::Aborted) => "aborted".to_string(),
    }
}
