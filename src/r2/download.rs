//! Streaming download of a presigned object URL to a local file

use futures_util::StreamExt;
use log::debug;
use reqwest::Client;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::types::R2Result;
use crate::error::StorageError;
use crate::storage::ProgressCallback;

/// Write buffer size for downloads (2 MB) - reduces I/O operations
const WRITE_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Stream `url` into `destination`, reporting `(transferred, total)` after every flush.
/// A cancelled download removes the partial file.
pub async fn download_url_to_file(
    http: &Client,
    url: &str,
    destination: &Path,
    progress: &ProgressCallback,
    cancel: &CancellationToken,
) -> R2Result<u64> {
    // Waiting for headers can stall as long as the body can
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("download_cancelled_before_response: {}", destination.display());
            return Err(StorageError::Cancelled);
        }
        response = http.get(url).send() => response
            .map_err(|e| StorageError::Network(format!("Download request failed: {}", e)))?,
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(StorageError::Network(format!(
            "Download failed: {} - {}",
            status, text
        )));
    }

    let total_bytes = response.content_length().unwrap_or(0);
    progress(0, total_bytes);

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(destination).await?;

    let mut stream = response.bytes_stream();
    let mut write_buffer = Vec::with_capacity(WRITE_BUFFER_SIZE);
    let mut downloaded: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            chunk = stream.next() => Some(chunk),
        };

        let chunk = match next {
            None => {
                drop(file);
                let _ = tokio::fs::remove_file(destination).await;
                debug!("download_cancelled: {}", destination.display());
                return Err(StorageError::Cancelled);
            }
            Some(None) => break,
            Some(Some(chunk)) => chunk
                .map_err(|e| StorageError::Network(format!("Failed to read chunk: {}", e)))?,
        };

        write_buffer.extend_from_slice(&chunk);
        downloaded += chunk.len() as u64;

        if write_buffer.len() >= WRITE_BUFFER_SIZE {
            file.write_all(&write_buffer).await?;
            write_buffer.clear();
            progress(downloaded, total_bytes.max(downloaded));
        }
    }

    if !write_buffer.is_empty() {
        file.write_all(&write_buffer).await?;
    }
    file.flush().await?;

    progress(downloaded, total_bytes.max(downloaded));
    Ok(downloaded)
}
