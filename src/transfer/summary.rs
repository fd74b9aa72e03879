//! Aggregate counts over the transfer queue, as shown by the status bar

use serde::Serialize;

use super::types::{TransferKind, TransferRecord, TransferStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub total: usize,
    pub pending: usize,
    pub active_uploads: usize,
    pub active_downloads: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub uploads: usize,
    pub downloads: usize,
    /// Sum of known sizes across all records
    pub total_bytes: u64,
    /// Bytes moved so far across pending and active records
    pub in_flight_transferred_bytes: u64,
    /// Known size of pending and active records
    pub in_flight_total_bytes: u64,
}

impl TransferSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TransferRecord>) -> Self {
        let mut summary = TransferSummary::default();
        for record in records {
            summary.total += 1;
            summary.total_bytes += record.size;
            match record.kind {
                TransferKind::Upload => summary.uploads += 1,
                TransferKind::Download => summary.downloads += 1,
            }
            match record.status {
                TransferStatus::Pending => summary.pending += 1,
                TransferStatus::Uploading => summary.active_uploads += 1,
                TransferStatus::Downloading => summary.active_downloads += 1,
                TransferStatus::Completed => summary.completed += 1,
                TransferStatus::Failed => summary.failed += 1,
                TransferStatus::Cancelled => summary.cancelled += 1,
            }
            if !record.status.is_terminal() {
                summary.in_flight_transferred_bytes += record.transferred_bytes;
                summary.in_flight_total_bytes += record.size;
            }
        }
        summary
    }

    /// Records currently holding a slot
    pub fn active(&self) -> usize {
        self.active_uploads + self.active_downloads
    }

    /// Records not yet in a terminal state (what the queue panel calls "in progress")
    pub fn in_progress(&self) -> usize {
        self.pending + self.active()
    }

    /// Records in any terminal state
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Combined percentage of unfinished work, 0 when nothing is known
    pub fn overall_percent(&self) -> u8 {
        if self.in_flight_total_bytes == 0 {
            return 0;
        }
        let ratio = self.in_flight_transferred_bytes as f64 / self.in_flight_total_bytes as f64;
        std::cmp::min((ratio * 100.0) as u64, 100) as u8
    }
}
