// FlashBatch - core/progress.rs
//
// Progress event vocabulary emitted by the flashing engine.
//
// Each event id names one logical, possibly long-running operation. The
// engine sends `start`, any number of `update`/`increment`, then `finish`,
// but ordering across ids and relative to snapshots is not guaranteed.
// `increment` carries a delta, never an absolute position.

use serde::{Deserialize, Serialize};

/// Whether an operation has a known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressType {
    /// Indeterminate; no counter is kept.
    Spinner,
    /// Bounded with a known total.
    Bar { total: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubStage {
    Start,
    SignatureKey,
    RamStub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EraseFlashStyle {
    Complete,
    Addressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EraseRegionStyle {
    LegacyFlashStartDecimalLength,
    HexLength,
    Range,
}

/// What an operation is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressOperation {
    Connect,
    DownloadStub {
        stage: StubStage,
    },
    EraseFlash {
        address: u32,
        style: EraseFlashStyle,
    },
    EraseRegion {
        address: u32,
        len: u64,
        style: EraseRegionStyle,
    },
    EraseAllRegions,
    Verify {
        address: u32,
        len: u64,
    },
    CheckRedownload {
        address: u32,
        size: u64,
    },
    WriteFlash {
        address: u32,
        size: u64,
    },
    ReadFlash {
        address: u32,
        size: u64,
    },
    #[default]
    #[serde(other)]
    Unknown,
}

impl ProgressOperation {
    /// Flash address the operation targets, if it has one.
    pub fn address(&self) -> Option<u32> {
        match self {
            Self::EraseFlash { address, .. }
            | Self::EraseRegion { address, .. }
            | Self::Verify { address, .. }
            | Self::CheckRedownload { address, .. }
            | Self::WriteFlash { address, .. }
            | Self::ReadFlash { address, .. } => Some(*address),
            Self::Connect | Self::DownloadStub { .. } | Self::EraseAllRegions | Self::Unknown => {
                None
            }
        }
    }

    /// Only image writes count as file downloads.
    pub fn is_download(&self) -> bool {
        matches!(self, Self::WriteFlash { .. })
    }
}

/// Outcome carried by a `finish` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressFinishStatus {
    Success,
    Retry,
    Skipped,
    Required,
    NotFound,
    Failed { message: String },
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Start,
    Update,
    Increment,
    Finish,
}

/// One engine progress message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: u64,
    pub event_type: ProgressEventType,
    #[serde(default)]
    pub step: u64,
    pub progress_type: ProgressType,
    #[serde(default)]
    pub operation: ProgressOperation,
    /// Initial position on `start`, delta on `increment`.
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub status: Option<ProgressFinishStatus>,
}

/// A progress event tagged with the port it belongs to
/// (the `flash-progress` payload in batch mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProgressEvent {
    pub port_name: String,
    pub event: ProgressEvent,
}

/// Transient counter for one open bar-type progress id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressCounter {
    pub port_name: String,
    pub current: u64,
    pub total: u64,
}

impl ProgressCounter {
    /// `round(current / total * 100)` capped at 100; `None` while total is 0.
    pub fn percentage(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let pct = (self.current as f64 / self.total as f64 * 100.0).round();
        Some(pct.min(100.0) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_deserialises_tagged() {
        let op: ProgressOperation =
            serde_json::from_str(r#"{"kind":"write_flash","address":65536,"size":2048}"#).unwrap();
        assert_eq!(
            op,
            ProgressOperation::WriteFlash {
                address: 0x10000,
                size: 2048
            }
        );
        assert!(op.is_download());
        assert_eq!(op.address(), Some(0x10000));
    }

    #[test]
    fn test_unrecognised_operation_kind_is_unknown() {
        let op: ProgressOperation = serde_json::from_str(r#"{"kind":"teleport"}"#).unwrap();
        assert_eq!(op, ProgressOperation::Unknown);
    }

    #[test]
    fn test_event_defaults_optional_fields() {
        let event: ProgressEvent = serde_json::from_str(
            r#"{"id":4,"event_type":"increment","progress_type":{"kind":"spinner"}}"#,
        )
        .unwrap();
        assert_eq!(event.current, None);
        assert_eq!(event.operation, ProgressOperation::Unknown);
        assert_eq!(event.status, None);
    }

    #[test]
    fn test_failed_status_carries_message() {
        let status: ProgressFinishStatus =
            serde_json::from_str(r#"{"kind":"failed","message":"timeout"}"#).unwrap();
        assert_eq!(
            status,
            ProgressFinishStatus::Failed {
                message: "timeout".to_string()
            }
        );
    }

    #[test]
    fn test_counter_percentage() {
        let mut counter = ProgressCounter {
            port_name: "COM3".to_string(),
            current: 0,
            total: 0,
        };
        assert_eq!(counter.percentage(), None);
        counter.total = 3;
        counter.current = 1;
        assert_eq!(counter.percentage(), Some(33));
        counter.current = 9;
        assert_eq!(counter.percentage(), Some(100));
    }
}
