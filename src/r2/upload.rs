//! R2 upload operations (simple, multipart)

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::types::{sdk_error, R2Result};
use crate::error::StorageError;
use crate::storage::ProgressCallback;

/// How a file is split up for upload
#[derive(Debug, Clone, Copy)]
pub struct UploadPlan {
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub concurrency: usize,
}

impl UploadPlan {
    pub fn uses_multipart(&self, file_size: u64) -> bool {
        file_size >= self.multipart_threshold
    }

    pub fn part_count(&self, file_size: u64) -> usize {
        file_size.div_ceil(self.part_size.max(1)) as usize
    }

    /// Byte range `[start, end)` of a 1-based part
    pub fn part_range(&self, part_number: usize, file_size: u64) -> (u64, u64) {
        let part_size = self.part_size.max(1);
        let start = (part_number as u64 - 1) * part_size;
        let end = std::cmp::min(start + part_size, file_size);
        (start, end)
    }
}

/// Upload a file with a single PUT
pub async fn upload_file_simple(
    client: &Client,
    bucket: &str,
    key: &str,
    file_path: &Path,
) -> R2Result<String> {
    let body = ByteStream::from_path(file_path).await.map_err(sdk_error)?;

    let response = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body)
        .send()
        .await
        .map_err(sdk_error)?;

    Ok(response.e_tag().unwrap_or_default().to_string())
}

/// Initiate multipart upload
pub async fn initiate_multipart_upload(client: &Client, bucket: &str, key: &str) -> R2Result<String> {
    let response = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(sdk_error)?;

    let upload_id = response
        .upload_id()
        .ok_or_else(|| StorageError::Sdk("No upload ID returned".to_string()))?
        .to_string();

    Ok(upload_id)
}

/// Upload a part in multipart upload
pub async fn upload_part(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: i32,
    data: Vec<u8>,
) -> R2Result<String> {
    let response = client
        .upload_part()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .part_number(part_number)
        .body(ByteStream::from(data))
        .send()
        .await
        .map_err(sdk_error)?;

    Ok(response.e_tag().unwrap_or_default().to_string())
}

/// Complete multipart upload
pub async fn complete_multipart_upload(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    mut parts: Vec<(i32, String)>, // (part_number, etag)
) -> R2Result<()> {
    // Parts must be listed in ascending order
    parts.sort_by_key(|(n, _)| *n);

    let completed_parts: Vec<CompletedPart> = parts
        .into_iter()
        .map(|(part_number, etag)| {
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(etag)
                .build()
        })
        .collect();

    let completed_upload = CompletedMultipartUpload::builder()
        .set_parts(Some(completed_parts))
        .build();

    client
        .complete_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .multipart_upload(completed_upload)
        .send()
        .await
        .map_err(sdk_error)?;

    Ok(())
}

/// Abort multipart upload
pub async fn abort_multipart_upload(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> R2Result<()> {
    client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
        .map_err(sdk_error)?;

    Ok(())
}

async fn read_part(file_path: &Path, start: u64, len: u64) -> R2Result<Vec<u8>> {
    let mut file = File::open(file_path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

/// Upload a large file using multipart upload, `plan.concurrency` parts at a time.
/// The first failing part stops the rest, and the upload is aborted on the
/// server if any part fails or `cancel` fires.
pub async fn upload_file_multipart(
    client: &Client,
    bucket: &str,
    key: &str,
    file_path: &Path,
    file_size: u64,
    plan: UploadPlan,
    progress: Arc<ProgressCallback>,
    cancel: &CancellationToken,
) -> R2Result<String> {
    let upload_id = initiate_multipart_upload(client, bucket, key).await?;
    let total_parts = plan.part_count(file_size);
    info!(
        "multipart_start: {} parts={} upload_id={}",
        key, total_parts, upload_id
    );

    // Fired by the caller's cancel or by the first failing part
    let abort = cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(plan.concurrency.max(1)));
    let uploaded_bytes = Arc::new(AtomicU64::new(0));
    let mut tasks: JoinSet<R2Result<(i32, String)>> = JoinSet::new();
    let mut first_error: Option<StorageError> = None;

    for part_number in 1..=total_parts {
        let permit = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    first_error = Some(StorageError::Sdk(e.to_string()));
                    abort.cancel();
                    break;
                }
            },
        };

        let client = client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let upload_id = upload_id.clone();
        let file_path = file_path.to_path_buf();
        let uploaded_bytes = uploaded_bytes.clone();
        let progress = progress.clone();
        let abort = abort.clone();
        let (start, end) = plan.part_range(part_number, file_size);

        tasks.spawn(async move {
            let part: R2Result<(i32, String)> = async {
                let data = read_part(&file_path, start, end - start).await?;
                let etag = tokio::select! {
                    biased;
                    _ = abort.cancelled() => return Err(StorageError::Cancelled),
                    etag = upload_part(&client, &bucket, &key, &upload_id, part_number as i32, data) => etag?,
                };
                let done = uploaded_bytes.fetch_add(end - start, Ordering::SeqCst) + (end - start);
                progress(done, file_size);
                Ok((part_number as i32, etag))
            }
            .await;
            // Signal before the permit is released so no further part starts
            if part.is_err() {
                abort.cancel();
            }
            drop(permit);
            part
        });
    }

    let mut parts = Vec::with_capacity(total_parts);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(part)) => parts.push(part),
            Ok(Err(StorageError::Cancelled)) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => {
                abort.cancel();
                if first_error.is_none() {
                    first_error = Some(StorageError::Sdk(format!("Task failed: {}", e)));
                }
            }
        }
    }

    if cancel.is_cancelled() || (first_error.is_none() && parts.len() < total_parts) {
        first_error = Some(StorageError::Cancelled);
    }

    if let Some(err) = first_error {
        warn!("multipart_abort: {} upload_id={} error={}", key, upload_id, err);
        if let Err(abort_err) = abort_multipart_upload(client, bucket, key, &upload_id).await {
            debug!("multipart_abort_failed: {} error={}", key, abort_err);
        }
        return Err(err);
    }

    complete_multipart_upload(client, bucket, key, &upload_id, parts).await?;
    Ok(upload_id)
}

/// Upload a file, choosing simple or multipart by size
pub async fn upload_file(
    client: &Client,
    bucket: &str,
    key: &str,
    file_path: &Path,
    plan: UploadPlan,
    progress: ProgressCallback,
    cancel: &CancellationToken,
) -> R2Result<String> {
    let file_size = tokio::fs::metadata(file_path).await?.len();
    progress(0, file_size);

    if !plan.uses_multipart(file_size) {
        let etag = tokio::select! {
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            etag = upload_file_simple(client, bucket, key, file_path) => etag?,
        };
        progress(file_size, file_size);
        return Ok(etag);
    }

    upload_file_multipart(
        client,
        bucket,
        key,
        file_path,
        file_size,
        plan,
        Arc::new(progress),
        cancel,
    )
    .await
}
