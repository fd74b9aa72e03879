//! User-facing collaborators of the orchestrator: toast notifications and
//! native file pickers

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier for headless use: writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => info!("notify: {}", notification.message),
            NotificationLevel::Error => warn!("notify: {}", notification.message),
        }
    }
}

/// Native file dialogs. `None` means the user dismissed the dialog.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick_files_to_upload(&self) -> Option<Vec<PathBuf>>;

    async fn pick_save_destination(&self, suggested_name: &str) -> Option<PathBuf>;
}
