//! In-memory collaborators for orchestrator tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::notify::{FilePicker, Notification, Notifier};
use crate::account::AccountCredentials;
use crate::error::StorageError;
use crate::storage::{
    BucketInfo, ObjectInfo, ObjectTarget, ProgressCallback, StorageBackend, StorageResult,
};

/// Backend whose transfers finish instantly unless gated or told to fail
#[derive(Default)]
pub struct FakeBackend {
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    /// Hold the transfer of `key` until the returned sender fires (or is dropped)
    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(key.to_string(), rx);
        tx
    }

    pub fn fail(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), message.to_string());
    }

    /// `"upload:<key>"` / `"download:<key>"` in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn transfer(
        &self,
        op: &str,
        key: &str,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()> {
        self.calls.lock().unwrap().push(format!("{}:{}", op, key));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        progress(50, 100);

        let gate = self.gates.lock().unwrap().remove(key);
        let result = match gate {
            Some(rx) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(StorageError::Cancelled),
                    _ = rx => Ok(()),
                }
            }
            None => {
                tokio::task::yield_now().await;
                Ok(())
            }
        };

        let result = result.and_then(|()| match self.failures.lock().unwrap().get(key) {
            Some(message) => Err(StorageError::Sdk(message.clone())),
            None => {
                progress(100, 100);
                Ok(())
            }
        });
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl StorageBackend for FakeBackend {
    async fn list_buckets(&self, _account_id: &str) -> StorageResult<Vec<BucketInfo>> {
        Ok(vec![BucketInfo {
            name: "my-bucket".to_string(),
            creation_date: None,
        }])
    }

    async fn get_bucket_info(&self, _account_id: &str, bucket: &str) -> StorageResult<BucketInfo> {
        Ok(BucketInfo {
            name: bucket.to_string(),
            creation_date: None,
        })
    }

    async fn create_bucket(&self, _account_id: &str, _bucket: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn delete_bucket(&self, _account_id: &str, _bucket: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn list_objects(
        &self,
        _account_id: &str,
        _bucket: &str,
        _prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectInfo>> {
        Ok(Vec::new())
    }

    async fn create_folder(&self, _account_id: &str, _bucket: &str, _path: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn delete_object(&self, _account_id: &str, _bucket: &str, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn delete_objects(
        &self,
        _account_id: &str,
        _bucket: &str,
        _keys: &[String],
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn get_presigned_url(
        &self,
        _account_id: &str,
        bucket: &str,
        key: &str,
        _expires_in_secs: u64,
    ) -> StorageResult<String> {
        Ok(format!("https://example.invalid/{}/{}", bucket, key))
    }

    async fn upload_file(
        &self,
        target: &ObjectTarget,
        _local_path: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()> {
        self.transfer("upload", &target.key, progress, cancel).await
    }

    async fn download_file(
        &self,
        target: &ObjectTarget,
        _dest_path: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()> {
        self.transfer("download", &target.key, progress, cancel).await
    }

    async fn validate_credentials(&self, _credentials: &AccountCredentials) -> StorageResult<()> {
        Ok(())
    }
}

/// Picker with canned answers; `None` plays a dismissed dialog
#[derive(Default)]
pub struct FakePicker {
    pub upload_files: Option<Vec<PathBuf>>,
    pub save_dir: Option<PathBuf>,
    prompts: Mutex<Vec<String>>,
}

impl FakePicker {
    pub fn saving_to(dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn uploading(files: Vec<PathBuf>) -> Self {
        Self {
            upload_files: Some(files),
            ..Self::default()
        }
    }

    /// Suggested names passed to the save dialog
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FilePicker for FakePicker {
    async fn pick_files_to_upload(&self) -> Option<Vec<PathBuf>> {
        self.upload_files.clone()
    }

    async fn pick_save_destination(&self, suggested_name: &str) -> Option<PathBuf> {
        self.prompts.lock().unwrap().push(suggested_name.to_string());
        self.save_dir.as_ref().map(|dir| dir.join(suggested_name))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
