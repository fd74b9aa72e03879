//! Storage backend capability consumed by the transfer queue
//!
//! The queue only ever talks to object storage through [`StorageBackend`];
//! the R2 implementation lives in [`crate::r2`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::account::AccountCredentials;
use crate::error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Byte progress callback: `(transferred, total)`
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub name: String,
    pub size: i64,
    pub last_modified: String,
    pub is_folder: bool,
    pub etag: Option<String>,
}

/// Where an object lives: which account's credentials, which bucket, which key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub account_id: String,
    pub bucket: String,
    pub key: String,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn list_buckets(&self, account_id: &str) -> StorageResult<Vec<BucketInfo>>;

    /// Fails with `StorageError::BucketNotFound` when the bucket is missing
    async fn get_bucket_info(&self, account_id: &str, bucket: &str) -> StorageResult<BucketInfo>;

    async fn create_bucket(&self, account_id: &str, bucket: &str) -> StorageResult<()>;

    async fn delete_bucket(&self, account_id: &str, bucket: &str) -> StorageResult<()>;

    /// Folders first, then files, one level below `prefix`
    async fn list_objects(
        &self,
        account_id: &str,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectInfo>>;

    async fn create_folder(&self, account_id: &str, bucket: &str, path: &str) -> StorageResult<()>;

    async fn delete_object(&self, account_id: &str, bucket: &str, key: &str) -> StorageResult<()>;

    async fn delete_objects(
        &self,
        account_id: &str,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<()>;

    async fn get_presigned_url(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
    ) -> StorageResult<String>;

    /// Upload `local_path` to `target`. Returns `StorageError::Cancelled` if
    /// `cancel` fires before the upload finishes.
    async fn upload_file(
        &self,
        target: &ObjectTarget,
        local_path: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()>;

    /// Download `target` into `dest_path`. Returns `StorageError::Cancelled`
    /// if `cancel` fires before the download finishes.
    async fn download_file(
        &self,
        target: &ObjectTarget,
        dest_path: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()>;

    /// Check a key pair before it is saved
    async fn validate_credentials(&self, credentials: &AccountCredentials) -> StorageResult<()>;
}
