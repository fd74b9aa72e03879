//! Concurrency scheduler - bounded, FIFO admission of pending transfers
//!
//! A single queue worker pulls jobs off an unbounded channel in submission
//! order and only takes the next one once it holds a semaphore permit, so
//! admission order is submission order no matter which transfer finishes
//! first. The permit travels with the spawned job and is released when the
//! job future completes.

use log::{debug, error, info};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::registry::TransferRegistry;
use super::types::{TransferKind, TransferStatus};

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Job = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send + 'static>;

struct QueuedJob {
    id: String,
    kind: TransferKind,
    cancel: CancellationToken,
    run: Job,
}

type TokenMap = Arc<Mutex<HashMap<String, CancellationToken>>>;

pub struct ConcurrencyScheduler {
    registry: Arc<TransferRegistry>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    sender: mpsc::UnboundedSender<QueuedJob>,
    tokens: TokenMap,
    queued: Arc<AtomicUsize>,
}

impl ConcurrencyScheduler {
    /// Start the scheduler. Must be called from within a tokio runtime; the
    /// queue worker stops once the scheduler is dropped.
    pub fn new(registry: Arc<TransferRegistry>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let tokens: TokenMap = Arc::new(Mutex::new(HashMap::new()));
        let queued = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(run_queue_worker(
            receiver,
            registry.clone(),
            semaphore.clone(),
            tokens.clone(),
            queued.clone(),
        ));

        Self {
            registry,
            semaphore,
            max_concurrent,
            sender,
            tokens,
            queued,
        }
    }

    /// Queue a pending record for admission.
    ///
    /// Once a slot is free the record is moved to its active status and `run`
    /// is spawned with the record's cancellation token. `run` is responsible
    /// for the terminal transition.
    pub fn admit<F, Fut>(&self, id: String, kind: TransferKind, run: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        lock_tokens(&self.tokens).insert(id.clone(), cancel.clone());
        self.queued.fetch_add(1, Ordering::SeqCst);

        let job = QueuedJob {
            id: id.clone(),
            kind,
            cancel,
            run: Box::new(move |token| Box::pin(run(token))),
        };

        if self.sender.send(job).is_err() {
            error!("transfer_queue_closed: {}", id);
            self.queued.fetch_sub(1, Ordering::SeqCst);
            lock_tokens(&self.tokens).remove(&id);
            let _ = self.registry.update_status(
                &id,
                TransferStatus::Failed,
                Some("Transfer queue is not running".to_string()),
            );
        }
    }

    /// Signal the job for `id`, queued or running. Returns whether a job was found.
    pub fn cancel(&self, id: &str) -> bool {
        match lock_tokens(&self.tokens).get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Slots currently held by admitted jobs
    pub fn active_count(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Jobs waiting for a slot
    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

fn lock_tokens(
    tokens: &TokenMap,
) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
    tokens.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_queue_worker(
    mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
    registry: Arc<TransferRegistry>,
    semaphore: Arc<Semaphore>,
    tokens: TokenMap,
    queued: Arc<AtomicUsize>,
) {
    while let Some(job) = receiver.recv().await {
        let acquired = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => Some(permit),
        };
        queued.fetch_sub(1, Ordering::SeqCst);

        let permit = match acquired {
            Some(Ok(permit)) => permit,
            Some(Err(_)) => break,
            None => {
                debug!("queue_skip_cancelled: {}", job.id);
                lock_tokens(&tokens).remove(&job.id);
                continue;
            }
        };

        // Records cancelled or removed while queued fail this transition
        if let Err(e) = registry.update_status(&job.id, job.kind.active_status(), None) {
            debug!("queue_skip: {} reason={}", job.id, e);
            lock_tokens(&tokens).remove(&job.id);
            continue;
        }
        info!(
            "transfer_admitted: {} kind={} available={}",
            job.id,
            job.kind,
            semaphore.available_permits()
        );

        let tokens = tokens.clone();
        tokio::spawn(async move {
            let _permit = permit;
            (job.run)(job.cancel).await;
            lock_tokens(&tokens).remove(&job.id);
        });
    }
    debug!("transfer_queue_worker: stopped");
}
