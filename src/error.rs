//! Error types shared across the transfer core, the storage backend and the account store

use thiserror::Error;

use crate::transfer::TransferStatus;

/// Failure of a storage backend operation. The message is what ends up in a
/// failed record's `error` field.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Sdk(String),

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl StorageError {
    pub fn sdk(err: impl std::fmt::Display) -> Self {
        StorageError::Sdk(err.to_string())
    }
}

/// Rejected registry mutation. Never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("transfer not found: {0}")]
    NotFound(String),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: TransferStatus,
        to: TransferStatus,
    },
}

/// Errors returned from orchestrator submission calls. Backend failures are not
/// here: they end up on the record instead.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Please select a bucket first")]
    NoBucketSelected,

    #[error("Please select an account first")]
    NoAccountSelected,

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("Only failed or cancelled transfers can be retried (status: {0})")]
    NotRetryable(TransferStatus),
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored secret for account {0} is corrupt")]
    CorruptSecret(String),
}

impl AccountError {
    pub fn database(err: impl std::fmt::Display) -> Self {
        AccountError::Database(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
