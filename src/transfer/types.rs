//! Transfer record, status definitions and event payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of transfers allowed to be active at once
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "downloading")]
    Downloading,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, TransferStatus::Uploading | TransferStatus::Downloading)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Pending may go active or be cancelled; an active status may finish,
    /// fail or be cancelled. Terminal statuses have no successors.
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, next) {
            (Pending, Uploading) | (Pending, Downloading) | (Pending, Cancelled) => true,
            (Uploading, Completed) | (Uploading, Failed) | (Uploading, Cancelled) => true,
            (Downloading, Completed) | (Downloading, Failed) | (Downloading, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Uploading => write!(f, "uploading"),
            TransferStatus::Downloading => write!(f, "downloading"),
            TransferStatus::Completed => write!(f, "completed"),
            TransferStatus::Failed => write!(f, "failed"),
            TransferStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Upload,
    Download,
}

impl TransferKind {
    /// Status a record of this kind takes once admitted
    pub fn active_status(self) -> TransferStatus {
        match self {
            TransferKind::Upload => TransferStatus::Uploading,
            TransferKind::Download => TransferStatus::Downloading,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// One upload or download as shown in the transfer queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub file_name: String,
    /// Upload source or download destination on the local disk
    pub file_path: String,
    pub account_id: String,
    pub bucket_name: String,
    pub object_key: String,
    /// 0 while unknown
    pub size: u64,
    pub transferred_bytes: u64,
    pub progress: u8,
    pub status: TransferStatus,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Caller-supplied fields of a new record; id, status and timestamps are
/// assigned by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDraft {
    pub kind: TransferKind,
    pub file_name: String,
    pub file_path: String,
    pub account_id: String,
    pub bucket_name: String,
    pub object_key: String,
    pub size: u64,
}

/// Registry change notification, sent after the change is applied
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Added(TransferRecord),
    StatusChanged(TransferStatusChanged),
    Progress(TransferProgress),
    Removed(TransferTaskDeleted),
    Cleared(TransferBatchOperation),
}

/// Progress event payload
#[derive(Debug, Clone, Serialize)]
pub struct TransferProgress {
    pub task_id: String,
    pub percent: u8,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
}

/// Status change event payload
#[derive(Debug, Clone, Serialize)]
pub struct TransferStatusChanged {
    pub task_id: String,
    pub status: TransferStatus,
    pub error: Option<String>,
}

/// Task deleted event payload
#[derive(Debug, Clone, Serialize)]
pub struct TransferTaskDeleted {
    pub task_id: String,
}

/// Batch operation event payload
#[derive(Debug, Clone, Serialize)]
pub struct TransferBatchOperation {
    pub operation: String, // "clear_completed"
    pub task_ids: Vec<String>,
}
