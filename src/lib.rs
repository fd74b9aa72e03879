//! Transfer queue and R2 storage backend for the desktop file manager.
//!
//! The `transfer` module owns uploads and downloads: records, the concurrency
//! scheduler and the orchestrator the UI talks to. Object storage is reached
//! through the `storage::StorageBackend` trait, implemented for Cloudflare R2
//! in `r2`. With the `desktop` feature the queue is exposed as a Tauri plugin.

pub mod account;
pub mod config;
pub mod error;
pub mod r2;
pub mod storage;
pub mod transfer;

#[cfg(feature = "desktop")]
pub mod commands;

pub use account::{Account, AccountCredentials, AccountInfo, AccountStore};
pub use config::TransferConfig;
pub use error::{AccountError, ConfigError, RegistryError, StorageError, TransferError};
pub use r2::R2Backend;
pub use storage::{BucketInfo, ObjectInfo, ObjectTarget, StorageBackend};
pub use transfer::{
    TransferKind, TransferOrchestrator, TransferRecord, TransferRegistry, TransferStatus,
    TransferSummary,
};
