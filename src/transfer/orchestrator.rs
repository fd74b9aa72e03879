//! Transfer orchestrator - the public entry point for uploads and downloads
//!
//! Submission resolves the browse context and local paths, creates pending
//! records and hands them to the scheduler. Once admitted, a job calls the
//! storage backend and turns the outcome into a terminal status plus a
//! notification. Backend failures never come back out of a submission call.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::notify::{FilePicker, Notification, Notifier};
use super::registry::TransferRegistry;
use super::scheduler::ConcurrencyScheduler;
use super::summary::TransferSummary;
use super::types::{RegistryEvent, TransferDraft, TransferKind, TransferRecord, TransferStatus};
use crate::config::TransferConfig;
use crate::error::{StorageError, TransferError};
use crate::storage::{ObjectTarget, StorageBackend};

/// Browse context the user is working in
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub account_id: Option<String>,
    pub bucket: Option<String>,
    /// Folder inside the bucket, without leading or trailing `/`; empty at the root
    pub current_path: String,
}

/// Object picked for download
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadItem {
    pub key: String,
    pub name: String,
}

/// Object key for `file_name` uploaded into `current_path`
pub fn object_key_for(current_path: &str, file_name: &str) -> String {
    let folder = current_path.trim_matches('/');
    if folder.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", folder, file_name)
    }
}

/// Last component of a local path, accepting both separators
pub fn file_name_of(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

pub struct TransferOrchestrator {
    registry: Arc<TransferRegistry>,
    scheduler: ConcurrencyScheduler,
    backend: Arc<dyn StorageBackend>,
    picker: Arc<dyn FilePicker>,
    notifier: Arc<dyn Notifier>,
    selection: RwLock<Selection>,
}

impl TransferOrchestrator {
    /// Must be called from within a tokio runtime
    pub fn new(
        registry: Arc<TransferRegistry>,
        backend: Arc<dyn StorageBackend>,
        picker: Arc<dyn FilePicker>,
        notifier: Arc<dyn Notifier>,
        config: &TransferConfig,
    ) -> Self {
        let config = config.clone().normalized();
        let scheduler = ConcurrencyScheduler::new(registry.clone(), config.max_concurrent);
        Self {
            registry,
            scheduler,
            backend,
            picker,
            notifier,
            selection: RwLock::new(Selection::default()),
        }
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.subscribe()
    }

    // Browse context

    pub fn selection(&self) -> Selection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_selection(&self, f: impl FnOnce(&mut Selection)) {
        let mut selection = self
            .selection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut selection);
    }

    /// Switch account; bucket and path reset
    pub fn select_account(&self, account_id: Option<String>) {
        self.with_selection(|s| {
            s.account_id = account_id;
            s.bucket = None;
            s.current_path.clear();
        });
    }

    /// Switch bucket; path resets
    pub fn select_bucket(&self, bucket: Option<String>) {
        self.with_selection(|s| {
            s.bucket = bucket;
            s.current_path.clear();
        });
    }

    pub fn set_current_path(&self, path: &str) {
        let path = path.trim_matches('/').to_string();
        self.with_selection(|s| s.current_path = path);
    }

    pub fn navigate_to_folder(&self, folder: &str) {
        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            return;
        }
        self.with_selection(|s| s.current_path = object_key_for(&s.current_path, folder));
    }

    pub fn navigate_up(&self) {
        self.with_selection(|s| {
            let mut parts: Vec<&str> = s.current_path.split('/').filter(|p| !p.is_empty()).collect();
            parts.pop();
            s.current_path = parts.join("/");
        });
    }

    /// Account and bucket to transfer against, or a user-facing selection error
    fn require_bucket(&self) -> Result<(String, String, String), TransferError> {
        let selection = self.selection();
        let result = match (selection.account_id, selection.bucket) {
            (Some(account), Some(bucket)) => Ok((account, bucket, selection.current_path)),
            (_, None) => Err(TransferError::NoBucketSelected),
            (None, Some(_)) => Err(TransferError::NoAccountSelected),
        };
        if let Err(e) = &result {
            self.notifier.notify(Notification::error(e.to_string()));
        }
        result
    }

    // Submission

    /// Queue an upload for each local path into the current folder.
    /// Returns the ids of the created records.
    pub async fn submit_upload(&self, local_paths: Vec<PathBuf>) -> Result<Vec<String>, TransferError> {
        let (account_id, bucket, current_path) = self.require_bucket()?;

        let mut ids = Vec::with_capacity(local_paths.len());
        for path in local_paths {
            let path_str = path.to_string_lossy().to_string();
            let file_name = file_name_of(&path_str);
            let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

            let draft = TransferDraft {
                kind: TransferKind::Upload,
                object_key: object_key_for(&current_path, &file_name),
                file_name,
                file_path: path_str,
                account_id: account_id.clone(),
                bucket_name: bucket.clone(),
                size,
            };
            ids.push(self.enqueue(draft));
        }
        Ok(ids)
    }

    /// Ask the picker for files, then upload them. A dismissed picker creates nothing.
    pub async fn pick_and_upload(&self) -> Result<Vec<String>, TransferError> {
        self.require_bucket()?;
        match self.picker.pick_files_to_upload().await {
            Some(paths) if !paths.is_empty() => self.submit_upload(paths).await,
            _ => Ok(Vec::new()),
        }
    }

    /// Ask where to save `key`, then queue the download.
    /// `Ok(None)` when the user dismissed the save dialog.
    pub async fn submit_download(
        &self,
        key: &str,
        display_name: &str,
    ) -> Result<Option<String>, TransferError> {
        let (account_id, bucket, _) = self.require_bucket()?;

        let Some(destination) = self.picker.pick_save_destination(display_name).await else {
            debug!("download_dismissed: {}", key);
            return Ok(None);
        };

        let draft = TransferDraft {
            kind: TransferKind::Download,
            file_name: display_name.to_string(),
            file_path: destination.to_string_lossy().to_string(),
            account_id,
            bucket_name: bucket,
            object_key: key.to_string(),
            size: 0,
        };
        Ok(Some(self.enqueue(draft)))
    }

    /// Prompt for each item in turn; the downloads themselves run concurrently
    /// up to the scheduler limit.
    pub async fn submit_batch_download(
        &self,
        items: Vec<DownloadItem>,
    ) -> Result<Vec<String>, TransferError> {
        let mut ids = Vec::new();
        for item in items {
            if let Some(id) = self.submit_download(&item.key, &item.name).await? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn enqueue(&self, draft: TransferDraft) -> String {
        let job = TransferJob {
            kind: draft.kind,
            file_name: draft.file_name.clone(),
            local_path: PathBuf::from(&draft.file_path),
            target: ObjectTarget {
                account_id: draft.account_id.clone(),
                bucket: draft.bucket_name.clone(),
                key: draft.object_key.clone(),
            },
        };
        let id = self.registry.add(draft);
        info!(
            "transfer_queued: {} kind={} key={}",
            id, job.kind, job.target.key
        );

        let registry = self.registry.clone();
        let backend = self.backend.clone();
        let notifier = self.notifier.clone();
        let job_id = id.clone();
        self.scheduler.admit(id.clone(), job.kind, move |cancel| {
            job.run(job_id, registry, backend, notifier, cancel)
        });
        id
    }

    // Queue management

    /// Cancel a pending or running transfer. Returns false when the record is
    /// unknown or already terminal.
    pub fn cancel(&self, id: &str) -> bool {
        match self.registry.update_status(id, TransferStatus::Cancelled, None) {
            Ok(()) => {
                self.scheduler.cancel(id);
                info!("transfer_cancelled: {}", id);
                true
            }
            Err(e) => {
                debug!("transfer_cancel_ignored: {} reason={}", id, e);
                false
            }
        }
    }

    /// Drop a record from the queue, stopping it first if it is still running
    pub fn remove(&self, id: &str) -> bool {
        self.scheduler.cancel(id);
        self.registry.remove(id)
    }

    /// Re-submit a failed or cancelled transfer as a new record; the old one stays
    pub fn retry(&self, id: &str) -> Result<String, TransferError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| TransferError::NotFound(id.to_string()))?;
        if !matches!(
            record.status,
            TransferStatus::Failed | TransferStatus::Cancelled
        ) {
            return Err(TransferError::NotRetryable(record.status));
        }

        let draft = TransferDraft {
            kind: record.kind,
            file_name: record.file_name,
            file_path: record.file_path,
            account_id: record.account_id,
            bucket_name: record.bucket_name,
            object_key: record.object_key,
            size: record.size,
        };
        let new_id = self.enqueue(draft);
        info!("transfer_retried: {} as={}", id, new_id);
        Ok(new_id)
    }

    pub fn clear_completed(&self) -> usize {
        self.registry.clear_completed()
    }

    pub fn list(&self) -> Vec<TransferRecord> {
        self.registry.list()
    }

    pub fn summary(&self) -> TransferSummary {
        self.registry.summary()
    }
}

/// Everything an admitted transfer needs to talk to the backend
struct TransferJob {
    kind: TransferKind,
    file_name: String,
    local_path: PathBuf,
    target: ObjectTarget,
}

impl TransferJob {
    async fn run(
        self,
        id: String,
        registry: Arc<TransferRegistry>,
        backend: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) {
        let progress = {
            let registry = registry.clone();
            let id = id.clone();
            Box::new(move |transferred: u64, total: u64| {
                let _ = registry.record_bytes(&id, transferred, total);
            })
        };

        let result = match self.kind {
            TransferKind::Upload => {
                backend
                    .upload_file(&self.target, &self.local_path, progress, cancel)
                    .await
            }
            TransferKind::Download => {
                backend
                    .download_file(&self.target, &self.local_path, progress, cancel)
                    .await
            }
        };

        match result {
            Ok(()) => match registry.update_status(&id, TransferStatus::Completed, None) {
                Ok(()) => {
                    info!("transfer_completed: {} kind={}", id, self.kind);
                    notifier.notify(Notification::success(self.success_message()));
                }
                Err(e) => debug!("transfer_result_dropped: {} reason={}", id, e),
            },
            Err(StorageError::Cancelled) => {
                debug!("transfer_aborted: {} kind={}", id, self.kind);
            }
            Err(err) => {
                let message = err.to_string();
                match registry.update_status(&id, TransferStatus::Failed, Some(message.clone())) {
                    Ok(()) => {
                        warn!("transfer_failed: {} kind={} error={}", id, self.kind, message);
                        notifier.notify(Notification::error(format!(
                            "{} {} failed: {}",
                            self.file_name, self.kind, message
                        )));
                    }
                    Err(e) => debug!("transfer_result_dropped: {} reason={}", id, e),
                }
            }
        }
    }

    fn success_message(&self) -> String {
        match self.kind {
            TransferKind::Upload => format!("{} uploaded successfully", self.file_name),
            TransferKind::Download => format!("{} downloaded successfully", self.file_name),
        }
    }
}
