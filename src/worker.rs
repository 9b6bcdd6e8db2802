//! # Sync Worker
//!
//! Background loop that polls for due integrations and runs their syncs with
//! bounded concurrency, a rate-limit pause after each sync, and a graceful
//! drain on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::StoreError;
use crate::sync_engine::{SyncEngine, SyncResult};

/// Lifecycle of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Polling,
    Dispatching,
    Draining,
    Stopped,
}

/// What the worker needs from the sync layer.
#[async_trait]
pub trait SyncDispatch: Send + Sync + 'static {
    /// Ids of integrations due now, in due order.
    async fn due_integrations(&self, limit: u64) -> Result<Vec<Uuid>, StoreError>;

    /// Run one integration's sync to completion.
    async fn execute(&self, integration_id: Uuid) -> SyncResult;

    /// Close sync logs abandoned by an earlier process.
    async fn recover_interrupted(&self, _max_age: chrono::Duration) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[async_trait]
impl SyncDispatch for SyncEngine {
    async fn due_integrations(&self, limit: u64) -> Result<Vec<Uuid>, StoreError> {
        let due = self.scheduler().get_integrations_due_for_sync(limit).await?;
        Ok(due.into_iter().map(|integration| integration.id).collect())
    }

    async fn execute(&self, integration_id: Uuid) -> SyncResult {
        self.execute_sync_with_logging(integration_id).await
    }

    async fn recover_interrupted(&self, max_age: chrono::Duration) -> Result<u64, StoreError> {
        self.recover_interrupted_logs(max_age).await
    }
}

pub struct SyncWorker<D: SyncDispatch> {
    dispatch: Arc<D>,
    config: WorkerConfig,
    state: watch::Sender<WorkerState>,
}

impl<D: SyncDispatch> SyncWorker<D> {
    pub fn new(dispatch: Arc<D>, config: WorkerConfig) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            dispatch,
            config,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Worker state changed");
        }
    }

    /// Run until `shutdown` fires, then drain in-flight syncs.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            poll_interval_seconds = self.config.poll_interval_seconds,
            "Starting sync worker"
        );

        let stale_after = chrono::Duration::seconds(self.config.stale_log_seconds as i64);
        if let Err(err) = self.dispatch.recover_interrupted(stale_after).await {
            error!(error = %err, "Failed to recover interrupted sync logs");
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut task_integrations: HashMap<tokio::task::Id, Uuid> = HashMap::new();

        'poll: while !shutdown.is_cancelled() {
            self.set_state(WorkerState::Polling);
            let due = match self.dispatch.due_integrations(self.config.batch_size).await {
                Ok(due) => due,
                Err(err) => {
                    error!(error = %err, "Failed to query due integrations");
                    Vec::new()
                }
            };
            gauge!("sync_worker_batch_size").set(due.len() as f64);

            if !due.is_empty() {
                info!(count = due.len(), "Dispatching due integrations");
                self.set_state(WorkerState::Dispatching);

                for integration_id in due {
                    let permit = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break 'poll,
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break 'poll,
                        },
                    };

                    let dispatch = self.dispatch.clone();
                    let cancel = shutdown.clone();
                    let rate_limit_delay = self.config.rate_limit_delay();
                    let handle = tasks.spawn(async move {
                        let result = dispatch.execute(integration_id).await;
                        if !result.success {
                            debug!(
                                integration_id = %integration_id,
                                error = result.error.as_deref().unwrap_or("unknown"),
                                "Sync finished with failure"
                            );
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = sleep(rate_limit_delay) => {}
                        }
                        drop(permit);
                    });
                    task_integrations.insert(handle.id(), integration_id);
                    gauge!("sync_worker_in_flight").set(tasks.len() as f64);

                    while let Some(joined) = tasks.try_join_next_with_id() {
                        record_completion(joined, &mut task_integrations);
                    }
                }

                while !tasks.is_empty() {
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'poll,
                        Some(joined) = tasks.join_next_with_id() => {
                            record_completion(joined, &mut task_integrations);
                            gauge!("sync_worker_in_flight").set(tasks.len() as f64);
                        }
                    }
                }
            }

            self.set_state(WorkerState::Idle);
            tokio::select! {
                _ = shutdown.cancelled() => break 'poll,
                _ = sleep(self.config.poll_interval()) => {}
            }
        }

        self.drain(tasks, task_integrations).await;
        self.set_state(WorkerState::Stopped);
        info!("Sync worker stopped");
    }

    async fn drain(&self, mut tasks: JoinSet<()>, mut task_integrations: HashMap<tokio::task::Id, Uuid>) {
        self.set_state(WorkerState::Draining);
        if tasks.is_empty() {
            return;
        }

        let grace = self.config.shutdown_grace();
        info!(
            in_flight = tasks.len(),
            grace_seconds = grace.as_secs(),
            "Waiting for in-flight syncs"
        );

        let deadline = Instant::now() + grace;
        let mut progress = interval(Duration::from_secs(1));
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
        progress.tick().await;

        while !tasks.is_empty() {
            tokio::select! {
                Some(joined) = tasks.join_next_with_id() => {
                    record_completion(joined, &mut task_integrations);
                }
                _ = progress.tick() => {
                    info!(remaining = tasks.len(), "Draining in-flight syncs");
                }
                _ = sleep_until(deadline) => {
                    warn!(
                        remaining = tasks.len(),
                        "Shutdown grace period elapsed; aborting in-flight syncs"
                    );
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next_with_id().await {
                        record_completion(joined, &mut task_integrations);
                    }
                }
            }
        }
        gauge!("sync_worker_in_flight").set(0.0);
    }
}

fn record_completion(
    joined: Result<(tokio::task::Id, ()), JoinError>,
    task_integrations: &mut HashMap<tokio::task::Id, Uuid>,
) {
    match joined {
        Ok((id, ())) => {
            task_integrations.remove(&id);
        }
        Err(err) => {
            let integration_id = task_integrations.remove(&err.id());
            if err.is_panic() {
                error!(integration_id = ?integration_id, "Sync task panicked");
            } else {
                warn!(integration_id = ?integration_id, "Sync task aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingDispatch {
        batches: Mutex<Vec<Vec<Uuid>>>,
        executed: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl SyncDispatch for RecordingDispatch {
        async fn due_integrations(&self, _limit: u64) -> Result<Vec<Uuid>, StoreError> {
            Ok(self.batches.lock().unwrap().pop().unwrap_or_default())
        }

        async fn execute(&self, integration_id: Uuid) -> SyncResult {
            self.executed.lock().unwrap().push(integration_id);
            SyncResult::succeeded(1, 0)
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            concurrency: 1,
            ..WorkerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_in_due_order_and_stops() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let dispatch = Arc::new(RecordingDispatch {
            batches: Mutex::new(vec![ids.clone()]),
            executed: Mutex::new(Vec::new()),
        });

        let worker = SyncWorker::new(dispatch.clone(), config());
        let mut states = worker.subscribe();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        // Three syncs with a one second pause each, then the poll sleep.
        sleep(Duration::from_secs(10)).await;
        assert_eq!(*dispatch.executed.lock().unwrap(), ids);
        assert_eq!(*states.borrow_and_update(), WorkerState::Idle);

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(*states.borrow(), WorkerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_never_polls() {
        let dispatch = Arc::new(RecordingDispatch {
            batches: Mutex::new(vec![vec![Uuid::new_v4()]]),
            executed: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        SyncWorker::new(dispatch.clone(), config()).run(shutdown).await;
        assert!(dispatch.executed.lock().unwrap().is_empty());
        assert_eq!(dispatch.batches.lock().unwrap().len(), 1);
    }
}
