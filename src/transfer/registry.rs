//! Transfer registry - the single owner of all transfer records
//!
//! Records live behind one mutex, keyed by id with a separate insertion-order
//! index. Every write is applied and announced on the broadcast channel inside
//! the same critical section, so subscribers see changes in the order they
//! were applied.

use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::summary::TransferSummary;
use super::types::{
    RegistryEvent, TransferBatchOperation, TransferDraft, TransferProgress, TransferRecord,
    TransferStatus, TransferStatusChanged, TransferTaskDeleted,
};
use crate::error::RegistryError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct RegistryState {
    records: HashMap<String, TransferRecord>,
    order: Vec<String>,
    next_seq: u64,
}

pub struct TransferRegistry {
    state: Mutex<RegistryState>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Append a new pending record and return its id
    pub fn add(&self, draft: TransferDraft) -> String {
        let mut state = self.lock();
        state.next_seq += 1;
        let id = format!(
            "transfer-{}-{}",
            Utc::now().timestamp_millis(),
            state.next_seq
        );
        let record = TransferRecord {
            id: id.clone(),
            file_name: draft.file_name,
            file_path: draft.file_path,
            account_id: draft.account_id,
            bucket_name: draft.bucket_name,
            object_key: draft.object_key,
            size: draft.size,
            transferred_bytes: 0,
            progress: 0,
            status: TransferStatus::Pending,
            kind: draft.kind,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        state.records.insert(id.clone(), record.clone());
        state.order.push(id.clone());
        self.emit(RegistryEvent::Added(record));
        id
    }

    /// Move a record along the status state machine.
    ///
    /// `completed_at` is stamped only on entering `completed`. `error` is kept
    /// only for `failed` and cleared otherwise.
    pub fn update_status(
        &self,
        id: &str,
        status: TransferStatus,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if !record.status.can_transition_to(status) {
            debug!(
                "registry_reject_transition: {} {} -> {}",
                id, record.status, status
            );
            return Err(RegistryError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.error = if status == TransferStatus::Failed {
            error
        } else {
            None
        };
        if status == TransferStatus::Completed {
            record.completed_at = Some(Utc::now());
            record.progress = 100;
        }

        let event = TransferStatusChanged {
            task_id: id.to_string(),
            status,
            error: record.error.clone(),
        };
        self.emit(RegistryEvent::StatusChanged(event));
        Ok(())
    }

    /// Set the percentage of a record directly
    pub fn update_progress(&self, id: &str, progress: u8) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if record.status.is_terminal() {
            return Ok(());
        }
        record.progress = progress.min(100);
        let event = TransferProgress {
            task_id: id.to_string(),
            percent: record.progress,
            transferred_bytes: record.transferred_bytes,
            total_bytes: record.size,
        };
        self.emit(RegistryEvent::Progress(event));
        Ok(())
    }

    /// Record a byte-level progress report from the backend.
    ///
    /// Fills in `size` when it was still unknown.
    pub fn record_bytes(
        &self,
        id: &str,
        transferred_bytes: u64,
        total_bytes: u64,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if record.status.is_terminal() {
            return Ok(());
        }
        if total_bytes > 0 {
            record.size = total_bytes;
        }
        record.transferred_bytes = transferred_bytes;
        record.progress = percent_of(transferred_bytes, record.size);
        let event = TransferProgress {
            task_id: id.to_string(),
            percent: record.progress,
            transferred_bytes,
            total_bytes: record.size,
        };
        self.emit(RegistryEvent::Progress(event));
        Ok(())
    }

    /// Delete a record; no-op for unknown ids
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.lock();
        if state.records.remove(id).is_none() {
            return false;
        }
        state.order.retain(|existing| existing != id);
        self.emit(RegistryEvent::Removed(TransferTaskDeleted {
            task_id: id.to_string(),
        }));
        true
    }

    /// Remove every `completed` record. Failed and cancelled records stay so
    /// the user can still inspect them.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.lock();
        let RegistryState { records, order, .. } = &mut *state;
        let mut removed = Vec::new();
        order.retain(|id| {
            let completed = records
                .get(id)
                .is_some_and(|r| r.status == TransferStatus::Completed);
            if completed {
                records.remove(id);
                removed.push(id.clone());
            }
            !completed
        });
        let count = removed.len();
        if count > 0 {
            self.emit(RegistryEvent::Cleared(TransferBatchOperation {
                operation: "clear_completed".to_string(),
                task_ids: removed,
            }));
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<TransferRecord> {
        self.lock().records.get(id).cloned()
    }

    /// Snapshot of all records in insertion order
    pub fn list(&self) -> Vec<TransferRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> TransferSummary {
        let state = self.lock();
        TransferSummary::from_records(state.records.values())
    }

    /// Wait until the record reaches a terminal status. Returns `None` if the
    /// record is (or becomes) absent.
    pub async fn wait_for_terminal(&self, id: &str) -> Option<TransferStatus> {
        let mut events = self.subscribe();
        loop {
            match self.get(id) {
                None => return None,
                Some(record) if record.status.is_terminal() => return Some(record.status),
                Some(_) => {}
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return self.get(id).map(|r| r.status)
                }
            }
        }
    }
}

fn percent_of(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    std::cmp::min(((transferred as f64 / total as f64) * 100.0) as u64, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::types::TransferKind;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn draft(name: &str, kind: TransferKind) -> TransferDraft {
        TransferDraft {
            kind,
            file_name: name.to_string(),
            file_path: format!("/tmp/{}", name),
            account_id: "acc".to_string(),
            bucket_name: "my-bucket".to_string(),
            object_key: name.to_string(),
            size: 0,
        }
    }

    #[test]
    fn add_creates_pending_record_in_order() {
        let registry = TransferRegistry::new();
        let a = registry.add(draft("a.txt", TransferKind::Upload));
        let b = registry.add(draft("b.txt", TransferKind::Download));

        let records = registry.list();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, a);
        assert_eq!(records[1].id, b);
        assert_eq!(records[0].status, TransferStatus::Pending);
        assert!(records[0].error.is_none());
        assert!(records[0].completed_at.is_none());
    }

    #[test]
    fn concurrent_adds_produce_distinct_ids() {
        let registry = Arc::new(TransferRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| registry.add(draft(&format!("{}-{}", t, i), TransferKind::Upload)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn completed_sets_completed_at() {
        let registry = TransferRegistry::new();
        let id = registry.add(draft("a.txt", TransferKind::Upload));
        registry
            .update_status(&id, TransferStatus::Uploading, None)
            .unwrap();
        registry
            .update_status(&id, TransferStatus::Completed, None)
            .unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TransferStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn failed_keeps_error_and_leaves_completed_at_unset() {
        let registry = TransferRegistry::new();
        let id = registry.add(draft("x.zip", TransferKind::Upload));
        registry
            .update_status(&id, TransferStatus::Uploading, None)
            .unwrap();
        registry
            .update_status(
                &id,
                TransferStatus::Failed,
                Some("network timeout".to_string()),
            )
            .unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("network timeout"));
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn error_is_dropped_for_non_failed_statuses() {
        let registry = TransferRegistry::new();
        let id = registry.add(draft("a.txt", TransferKind::Download));
        registry
            .update_status(&id, TransferStatus::Downloading, Some("noise".to_string()))
            .unwrap();
        assert!(registry.get(&id).unwrap().error.is_none());
    }

    #[test]
    fn terminal_records_reject_further_transitions() {
        let registry = TransferRegistry::new();
        let id = registry.add(draft("a.txt", TransferKind::Upload));
        registry
            .update_status(&id, TransferStatus::Cancelled, None)
            .unwrap();

        let err = registry
            .update_status(&id, TransferStatus::Uploading, None)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidTransition {
                from: TransferStatus::Cancelled,
                to: TransferStatus::Uploading,
            }
        );
        assert!(registry
            .update_status(&id, TransferStatus::Completed, None)
            .is_err());
        assert_eq!(registry.get(&id).unwrap().status, TransferStatus::Cancelled);
    }

    #[test]
    fn stale_ids_are_reported_not_panicked() {
        let registry = TransferRegistry::new();
        assert_eq!(
            registry.update_status("missing", TransferStatus::Completed, None),
            Err(RegistryError::NotFound("missing".to_string()))
        );
        assert!(registry.update_progress("missing", 10).is_err());
        assert!(!registry.remove("missing"));
    }

    #[test]
    fn clear_completed_keeps_failed_and_cancelled_in_order() {
        let registry = TransferRegistry::new();
        let ids: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|n| registry.add(draft(n, TransferKind::Upload)))
            .collect();

        let finish = |id: &str, status: TransferStatus| {
            registry
                .update_status(id, TransferStatus::Uploading, None)
                .unwrap();
            registry
                .update_status(id, status, Some("boom".to_string()))
                .unwrap();
        };
        finish(&ids[0], TransferStatus::Completed);
        finish(&ids[1], TransferStatus::Failed);
        finish(&ids[3], TransferStatus::Completed);
        registry
            .update_status(&ids[4], TransferStatus::Cancelled, None)
            .unwrap();

        assert_eq!(registry.clear_completed(), 2);
        let remaining: Vec<String> = registry.list().into_iter().map(|r| r.id).collect();
        assert_eq!(
            remaining,
            vec![ids[1].clone(), ids[2].clone(), ids[4].clone()]
        );
    }

    #[test]
    fn record_bytes_fills_unknown_size_and_clamps_percent() {
        let registry = TransferRegistry::new();
        let id = registry.add(draft("a.bin", TransferKind::Download));
        registry.record_bytes(&id, 50, 200).unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.size, 200);
        assert_eq!(record.progress, 25);

        registry.record_bytes(&id, 500, 0).unwrap();
        assert_eq!(registry.get(&id).unwrap().progress, 100);
        registry.update_progress(&id, 250).unwrap();
        assert_eq!(registry.get(&id).unwrap().progress, 100);
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let registry = TransferRegistry::new();
        let id = registry.add(draft("a.txt", TransferKind::Upload));
        let snapshot = registry.list();
        registry.remove(&id);
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_writes_in_order() {
        let registry = TransferRegistry::new();
        let mut events = registry.subscribe();
        let id = registry.add(draft("a.txt", TransferKind::Upload));
        registry
            .update_status(&id, TransferStatus::Uploading, None)
            .unwrap();
        registry.remove(&id);

        assert!(matches!(events.recv().await.unwrap(), RegistryEvent::Added(r) if r.id == id));
        assert!(matches!(
            events.recv().await.unwrap(),
            RegistryEvent::StatusChanged(e) if e.status == TransferStatus::Uploading
        ));
        assert!(matches!(events.recv().await.unwrap(), RegistryEvent::Removed(e) if e.task_id == id));
    }

    #[tokio::test]
    async fn wait_for_terminal_resolves_on_completion() {
        let registry = Arc::new(TransferRegistry::new());
        let id = registry.add(draft("a.txt", TransferKind::Upload));

        let waiter = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.wait_for_terminal(&id).await })
        };
        tokio::task::yield_now().await;
        registry
            .update_status(&id, TransferStatus::Uploading, None)
            .unwrap();
        registry
            .update_status(&id, TransferStatus::Completed, None)
            .unwrap();

        assert_eq!(waiter.await.unwrap(), Some(TransferStatus::Completed));
        assert_eq!(registry.wait_for_terminal("missing").await, None);
    }
}
