//! Transfer tuning loaded from a JSON file, with defaults for every field

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::transfer::DEFAULT_MAX_CONCURRENT;

/// Files at or above this size go through multipart upload (100MB)
pub const MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;
/// Part size for multipart uploads (20MB)
pub const PART_SIZE: u64 = 20 * 1024 * 1024;
/// Parts uploaded in parallel within one multipart upload
pub const PART_CONCURRENCY: usize = 6;
/// Lifetime of presigned download URLs
pub const PRESIGN_EXPIRY_SECS: u64 = 3600;
/// Time allowed to establish a download connection
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Longest silence tolerated between reads of a download response
pub const READ_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// Transfers allowed to run at once
    pub max_concurrent: usize,
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub part_concurrency: usize,
    pub presign_expiry_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Overrides the `https://<account>.r2.cloudflarestorage.com` endpoint,
    /// for other S3-compatible services
    pub endpoint_url: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: PART_SIZE,
            part_concurrency: PART_CONCURRENCY,
            presign_expiry_secs: PRESIGN_EXPIRY_SECS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            endpoint_url: None,
        }
    }
}

impl TransferConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: TransferConfig = serde_json::from_str(content)?;
        Ok(config.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Raise values that would stall or break transfers to their minimums.
    /// Applied on load and by every constructor that takes a config.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.max(1);
        self.part_concurrency = self.part_concurrency.max(1);
        self.connect_timeout_secs = self.connect_timeout_secs.max(1);
        self.read_timeout_secs = self.read_timeout_secs.max(1);
        // S3 rejects non-final parts under 5MB
        self.part_size = self.part_size.max(5 * 1024 * 1024);
        self
    }
}
