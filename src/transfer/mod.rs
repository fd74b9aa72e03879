//! Transfer queue - uploads and downloads between the local disk and a bucket
//!
//! - `types`: Records, statuses and registry events
//! - `registry`: The single owner of all transfer records
//! - `scheduler`: Bounded FIFO admission of pending transfers
//! - `orchestrator`: Submission, cancellation and retry
//! - `summary`: Aggregate counts for status and queue views
//! - `notify`: Notification and file picker collaborators

mod notify;
mod orchestrator;
mod registry;
mod scheduler;
mod summary;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use notify::{FilePicker, LogNotifier, Notification, NotificationLevel, Notifier};
pub use orchestrator::{file_name_of, object_key_for, DownloadItem, Selection, TransferOrchestrator};
pub use registry::TransferRegistry;
pub use scheduler::ConcurrencyScheduler;
pub use summary::TransferSummary;
pub use types::{
    RegistryEvent, TransferBatchOperation, TransferDraft, TransferKind, TransferProgress,
    TransferRecord, TransferStatus, TransferStatusChanged, TransferTaskDeleted,
    DEFAULT_MAX_CONCURRENT,
};
