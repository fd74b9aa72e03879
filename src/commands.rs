//! Tauri plugin exposing the transfer queue to the desktop UI
//!
//! Registry events are forwarded to the webview as `transfer-added`,
//! `transfer-status-changed`, `transfer-progress`, `transfer-task-deleted` and
//! `transfer-batch-operation`. Toasts go out as `transfer-notification`.

use async_trait::async_trait;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::account::{Account, AccountCredentials, AccountInfo, AccountStore};
use crate::config::{TransferConfig, PRESIGN_EXPIRY_SECS};
use crate::r2::R2Backend;
use crate::storage::{BucketInfo, ObjectInfo, StorageBackend};
use crate::transfer::{
    DownloadItem, FilePicker, Notification, Notifier, RegistryEvent, Selection, TransferOrchestrator,
    TransferRecord, TransferRegistry, TransferSummary,
};

const ACCOUNTS_DB: &str = "accounts.db";
const CONFIG_FILE: &str = "transfer.json";

pub struct TransferState {
    orchestrator: Arc<TransferOrchestrator>,
    accounts: Arc<AccountStore>,
}

struct TauriNotifier<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> Notifier for TauriNotifier<R> {
    fn notify(&self, notification: Notification) {
        let _ = self.app.emit("transfer-notification", notification);
    }
}

struct TauriFilePicker<R: Runtime> {
    app: AppHandle<R>,
}

#[async_trait]
impl<R: Runtime> FilePicker for TauriFilePicker<R> {
    async fn pick_files_to_upload(&self) -> Option<Vec<PathBuf>> {
        use tauri_plugin_dialog::DialogExt;

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.app
            .dialog()
            .file()
            .set_title("Select files to upload")
            .pick_files(move |paths| {
                let result = paths.map(|paths| {
                    paths
                        .into_iter()
                        .filter_map(|p| p.into_path().ok())
                        .collect::<Vec<_>>()
                });
                let _ = tx.send(result);
            });
        rx.await.ok().flatten()
    }

    async fn pick_save_destination(&self, suggested_name: &str) -> Option<PathBuf> {
        use tauri_plugin_dialog::DialogExt;

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.app
            .dialog()
            .file()
            .set_title("Save file")
            .set_file_name(suggested_name)
            .save_file(move |path| {
                let _ = tx.send(path.and_then(|p| p.into_path().ok()));
            });
        rx.await.ok().flatten()
    }
}

/// Forward registry events to the webview until the registry goes away
async fn forward_events<R: Runtime>(app: AppHandle<R>, mut events: broadcast::Receiver<RegistryEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                error!("transfer_events_lagged: skipped={}", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let _ = match event {
            RegistryEvent::Added(record) => app.emit("transfer-added", record),
            RegistryEvent::StatusChanged(payload) => app.emit("transfer-status-changed", payload),
            RegistryEvent::Progress(payload) => app.emit("transfer-progress", payload),
            RegistryEvent::Removed(payload) => app.emit("transfer-task-deleted", payload),
            RegistryEvent::Cleared(payload) => app.emit("transfer-batch-operation", payload),
        };
    }
}

async fn build_state<R: Runtime>(app: &AppHandle<R>) -> Result<TransferState, String> {
    let data_dir = app.path().app_data_dir().map_err(|e| e.to_string())?;
    std::fs::create_dir_all(&data_dir).map_err(|e| format!("Failed to create app data dir: {}", e))?;
    let config_dir = app.path().app_config_dir().map_err(|e| e.to_string())?;

    let config = TransferConfig::load(&config_dir.join(CONFIG_FILE)).map_err(|e| e.to_string())?;
    let accounts = Arc::new(
        AccountStore::open(&data_dir.join(ACCOUNTS_DB))
            .await
            .map_err(|e| e.to_string())?,
    );
    let backend = R2Backend::new(accounts.clone(), config.clone()).map_err(|e| e.to_string())?;

    let registry = Arc::new(TransferRegistry::new());
    tauri::async_runtime::spawn(forward_events(app.clone(), registry.subscribe()));

    let orchestrator = Arc::new(TransferOrchestrator::new(
        registry,
        Arc::new(backend),
        Arc::new(TauriFilePicker { app: app.clone() }),
        Arc::new(TauriNotifier { app: app.clone() }),
        &config,
    ));
    let selected = accounts.selected_account().await.map_err(|e| e.to_string())?;
    orchestrator.select_account(selected);

    info!(
        "transfer_plugin_ready: max_concurrent={} data_dir={}",
        config.max_concurrent,
        data_dir.display()
    );
    Ok(TransferState {
        orchestrator,
        accounts,
    })
}

pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("transfers")
        .invoke_handler(tauri::generate_handler![
            submit_upload,
            pick_and_upload,
            submit_download,
            submit_batch_download,
            cancel_transfer,
            remove_transfer,
            retry_transfer,
            clear_completed_transfers,
            list_transfers,
            transfer_summary,
            get_selection,
            select_account,
            select_bucket,
            set_current_path,
            navigate_to_folder,
            navigate_up,
            save_account,
            get_accounts,
            delete_account,
            validate_credentials,
            list_buckets,
            get_bucket_info,
            create_bucket,
            delete_bucket,
            list_objects,
            create_folder,
            delete_object,
            delete_objects,
            get_presigned_url,
        ])
        .setup(|app, _api| {
            let state = tauri::async_runtime::block_on(build_state(app))?;
            app.manage(state);
            Ok(())
        })
        .build()
}

// Transfers

#[tauri::command]
async fn submit_upload(
    state: State<'_, TransferState>,
    paths: Vec<String>,
) -> Result<Vec<String>, String> {
    let paths = paths.into_iter().map(PathBuf::from).collect();
    state
        .orchestrator
        .submit_upload(paths)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn pick_and_upload(state: State<'_, TransferState>) -> Result<Vec<String>, String> {
    state
        .orchestrator
        .pick_and_upload()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn submit_download(
    state: State<'_, TransferState>,
    key: String,
    display_name: String,
) -> Result<Option<String>, String> {
    state
        .orchestrator
        .submit_download(&key, &display_name)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn submit_batch_download(
    state: State<'_, TransferState>,
    items: Vec<DownloadItem>,
) -> Result<Vec<String>, String> {
    state
        .orchestrator
        .submit_batch_download(items)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn cancel_transfer(state: State<'_, TransferState>, id: String) -> bool {
    state.orchestrator.cancel(&id)
}

#[tauri::command]
fn remove_transfer(state: State<'_, TransferState>, id: String) -> bool {
    state.orchestrator.remove(&id)
}

#[tauri::command]
fn retry_transfer(state: State<'_, TransferState>, id: String) -> Result<String, String> {
    state.orchestrator.retry(&id).map_err(|e| e.to_string())
}

#[tauri::command]
fn clear_completed_transfers(state: State<'_, TransferState>) -> usize {
    state.orchestrator.clear_completed()
}

#[tauri::command]
fn list_transfers(state: State<'_, TransferState>) -> Vec<TransferRecord> {
    state.orchestrator.list()
}

#[tauri::command]
fn transfer_summary(state: State<'_, TransferState>) -> TransferSummary {
    state.orchestrator.summary()
}

// Browse context

#[tauri::command]
fn get_selection(state: State<'_, TransferState>) -> Selection {
    state.orchestrator.selection()
}

#[tauri::command]
async fn select_account(
    state: State<'_, TransferState>,
    account_id: Option<String>,
) -> Result<(), String> {
    state
        .accounts
        .set_selected_account(account_id.as_deref())
        .await
        .map_err(|e| e.to_string())?;
    state.orchestrator.select_account(account_id);
    Ok(())
}

#[tauri::command]
fn select_bucket(state: State<'_, TransferState>, bucket: Option<String>) {
    state.orchestrator.select_bucket(bucket);
}

#[tauri::command]
fn set_current_path(state: State<'_, TransferState>, path: String) {
    state.orchestrator.set_current_path(&path);
}

#[tauri::command]
fn navigate_to_folder(state: State<'_, TransferState>, folder: String) {
    state.orchestrator.navigate_to_folder(&folder);
}

#[tauri::command]
fn navigate_up(state: State<'_, TransferState>) {
    state.orchestrator.navigate_up();
}

// Accounts

#[tauri::command]
async fn save_account(state: State<'_, TransferState>, account: Account) -> Result<(), String> {
    let credentials = AccountCredentials {
        account_id: account.account_id.clone(),
        access_key_id: account.access_key_id.clone(),
        secret_access_key: account.secret_access_key.clone(),
    };
    state
        .orchestrator
        .backend()
        .validate_credentials(&credentials)
        .await
        .map_err(|e| e.to_string())?;
    state
        .accounts
        .save_account(&account)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_accounts(state: State<'_, TransferState>) -> Result<Vec<AccountInfo>, String> {
    state.accounts.get_accounts().await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn delete_account(state: State<'_, TransferState>, id: String) -> Result<(), String> {
    state
        .accounts
        .delete_account(&id)
        .await
        .map_err(|e| e.to_string())?;
    if state.orchestrator.selection().account_id.as_deref() == Some(id.as_str()) {
        state.orchestrator.select_account(None);
    }
    Ok(())
}

#[tauri::command]
async fn validate_credentials(
    state: State<'_, TransferState>,
    credentials: AccountCredentials,
) -> Result<(), String> {
    state
        .orchestrator
        .backend()
        .validate_credentials(&credentials)
        .await
        .map_err(|e| e.to_string())
}

// Browsing

#[tauri::command]
async fn list_buckets(
    state: State<'_, TransferState>,
    account_id: String,
) -> Result<Vec<BucketInfo>, String> {
    state
        .orchestrator
        .backend()
        .list_buckets(&account_id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_bucket_info(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
) -> Result<BucketInfo, String> {
    state
        .orchestrator
        .backend()
        .get_bucket_info(&account_id, &bucket)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn create_bucket(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
) -> Result<(), String> {
    state
        .orchestrator
        .backend()
        .create_bucket(&account_id, &bucket)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn delete_bucket(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
) -> Result<(), String> {
    state
        .orchestrator
        .backend()
        .delete_bucket(&account_id, &bucket)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn list_objects(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
    prefix: Option<String>,
) -> Result<Vec<ObjectInfo>, String> {
    state
        .orchestrator
        .backend()
        .list_objects(&account_id, &bucket, prefix.as_deref())
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn create_folder(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
    path: String,
) -> Result<(), String> {
    state
        .orchestrator
        .backend()
        .create_folder(&account_id, &bucket, &path)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn delete_object(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
    key: String,
) -> Result<(), String> {
    state
        .orchestrator
        .backend()
        .delete_object(&account_id, &bucket, &key)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn delete_objects(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
    keys: Vec<String>,
) -> Result<(), String> {
    state
        .orchestrator
        .backend()
        .delete_objects(&account_id, &bucket, &keys)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_presigned_url(
    state: State<'_, TransferState>,
    account_id: String,
    bucket: String,
    key: String,
    expires_in: Option<u64>,
) -> Result<String, String> {
    state
        .orchestrator
        .backend()
        .get_presigned_url(&account_id, &bucket, &key, expires_in.unwrap_or(PRESIGN_EXPIRY_SECS))
        .await
        .map_err(|e| e.to_string())
}
