//! # Sync Engine
//!
//! Runs one integration through fetch, path extraction, and persistence, and
//! wraps each run with sync-log bookkeeping and scheduling updates.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::adapters::json::{collapse, extract_path};
use crate::adapters::{ConnectionTestResult, DEFAULT_FETCH_LIMIT, FieldSchema, Registry};
use crate::crypto::CredentialStore;
use crate::error::StoreError;
use crate::models::integration::Model as IntegrationModel;
use crate::models::{IntegrationStatus, IntegrationType};
use crate::repositories::{
    DataFieldRepository, DataValueRepository, IntegrationRepository, SyncLogOutcome,
    SyncLogRepository,
};
use crate::scheduler::Scheduler;

/// Error reported when the same integration is already syncing in this process.
pub const ALREADY_IN_PROGRESS: &str = "sync already in progress";

/// Outcome of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    /// Data values written
    pub records_count: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn succeeded(records_count: usize, duration_ms: u64) -> Self {
        Self {
            success: true,
            records_count,
            duration_ms,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            records_count: 0,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
enum SyncFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Fetch(String),
}

/// Removes its integration id from the in-flight set when dropped.
struct InFlightGuard {
    integration_id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.integration_id);
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    integrations: IntegrationRepository,
    fields: DataFieldRepository,
    values: DataValueRepository,
    logs: SyncLogRepository,
    registry: Arc<Registry>,
    credentials: Arc<dyn CredentialStore>,
    scheduler: Scheduler,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl SyncEngine {
    pub fn new(
        db: DatabaseConnection,
        registry: Arc<Registry>,
        credentials: Arc<dyn CredentialStore>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            integrations: IntegrationRepository::new(db.clone()),
            fields: DataFieldRepository::new(db.clone()),
            values: DataValueRepository::new(db.clone()),
            logs: SyncLogRepository::new(db),
            registry,
            credentials,
            scheduler,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn sync_logs(&self) -> &SyncLogRepository {
        &self.logs
    }

    fn try_acquire(&self, integration_id: Uuid) -> Option<InFlightGuard> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(integration_id) {
            return None;
        }
        Some(InFlightGuard {
            integration_id,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Fetch, extract, and persist values for one integration.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn sync_integration(&self, integration_id: Uuid) -> SyncResult {
        let started = Instant::now();
        let outcome = self.run_sync(integration_id).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(records_count) => SyncResult::succeeded(records_count, duration_ms),
            Err(err) => SyncResult::failed(err.to_string(), duration_ms),
        }
    }

    async fn run_sync(&self, integration_id: Uuid) -> Result<usize, SyncFailure> {
        let integration = self.load(integration_id).await?;
        let fields = self.fields.list_for_integration(integration_id).await?;

        if integration.integration_type.parse::<IntegrationType>() == Ok(IntegrationType::Manual) {
            debug!("Manual integration, nothing to fetch");
            return Ok(0);
        }

        let adapter = self
            .registry
            .get(&integration.integration_type)
            .map_err(StoreError::from)?;
        let config = self
            .credentials
            .decrypt(&integration)
            .map_err(StoreError::from)?;

        let paths: Vec<String> = fields.iter().map(|field| field.path.clone()).collect();
        let fetched = adapter
            .fetch_data(&config, Some(&paths), DEFAULT_FETCH_LIMIT)
            .await;
        drop(config);

        if !fetched.success {
            return Err(SyncFailure::Fetch(
                fetched.error.unwrap_or_else(|| "fetch failed".to_string()),
            ));
        }

        let mut batch = Vec::with_capacity(fields.len());
        for field in &fields {
            let found: Vec<_> = fetched
                .data
                .iter()
                .flat_map(|row| extract_path(row, &field.path))
                .collect();
            match collapse(found) {
                Some(value) => batch.push((field.id, value)),
                None => debug!(path = %field.path, "No values found for field"),
            }
        }

        let written = self.values.insert_batch(batch, Utc::now()).await?;
        debug!(
            rows = fetched.data.len(),
            fields = fields.len(),
            written,
            "Sync data persisted"
        );
        Ok(written as usize)
    }

    async fn load(&self, integration_id: Uuid) -> Result<IntegrationModel, StoreError> {
        self.integrations
            .find_by_id(integration_id)
            .await?
            .ok_or(StoreError::IntegrationNotFound { id: integration_id })
    }

    /// Run a sync with log bookkeeping and scheduling updates. Used by both
    /// the worker and on-demand triggers.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn execute_sync_with_logging(&self, integration_id: Uuid) -> SyncResult {
        let Some(_guard) = self.try_acquire(integration_id) else {
            debug!("Sync skipped; another sync for this integration is running");
            return SyncResult::failed(ALREADY_IN_PROGRESS, 0);
        };

        let started = Instant::now();
        let integration = match self.load(integration_id).await {
            Ok(integration) => integration,
            Err(err) => return SyncResult::failed(err.to_string(), started.elapsed().as_millis() as u64),
        };
        let integration_type = integration.integration_type.clone();

        let log = match self.logs.open(integration_id, Utc::now()).await {
            Ok(log) => log,
            Err(err) => return SyncResult::failed(err.to_string(), started.elapsed().as_millis() as u64),
        };

        let engine = self.clone();
        let span = info_span!("sync_task", integration_id = %integration_id);
        let result = match tokio::spawn(
            async move { engine.sync_integration(integration_id).await }.instrument(span),
        )
        .await
        {
            Ok(result) => result,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("sync panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "sync task was cancelled".to_string()
                };
                error!(error = %message, "Sync task did not complete");
                SyncResult::failed(message, started.elapsed().as_millis() as u64)
            }
        };

        let outcome = SyncLogOutcome {
            success: result.success,
            duration_ms: result.duration_ms as i64,
            records_count: result.records_count as i32,
            error_message: result.error.clone(),
        };
        if let Err(err) = self.logs.close(log, outcome).await {
            error!(error = %err, "Failed to close sync log");
        }

        if let Err(err) = self
            .scheduler
            .update_integration_after_sync(integration_id, &result)
            .await
        {
            error!(error = %err, "Failed to update integration schedule");
        }

        let outcome_label = if result.success { "success" } else { "failure" };
        counter!(
            "integration_sync_total",
            "type" => integration_type.clone(),
            "outcome" => outcome_label
        )
        .increment(1);
        histogram!("integration_sync_duration_ms", "type" => integration_type.clone())
            .record(result.duration_ms as f64);

        if result.success {
            info!(
                integration_type = %integration_type,
                records_count = result.records_count,
                duration_ms = result.duration_ms,
                "Integration sync completed"
            );
        } else {
            warn!(
                integration_type = %integration_type,
                duration_ms = result.duration_ms,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Integration sync failed"
            );
        }

        result
    }

    /// Probe an integration's source and mark it connected on success.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn test_connection(&self, integration_id: Uuid) -> Result<ConnectionTestResult, StoreError> {
        let integration = self.load(integration_id).await?;
        let adapter = self.registry.get(&integration.integration_type)?;
        let config = self.credentials.decrypt(&integration)?;

        let result = adapter.test_connection(&config).await;
        if result.success {
            self.integrations
                .set_status(integration_id, IntegrationStatus::Connected)
                .await?;
        }
        info!(
            success = result.success,
            response_time_ms = result.response_time_ms,
            "Connection test finished"
        );
        Ok(result)
    }

    /// Discover an integration's fields, optionally storing new paths.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn discover_fields(
        &self,
        integration_id: Uuid,
        persist: bool,
    ) -> Result<Vec<FieldSchema>, StoreError> {
        let integration = self.load(integration_id).await?;
        let adapter = self.registry.get(&integration.integration_type)?;
        let config = self.credentials.decrypt(&integration)?;

        let discovered = adapter.discover_fields(&config).await;
        if persist {
            self.fields
                .upsert_discovered(integration_id, &discovered)
                .await?;
        }
        Ok(discovered)
    }

    /// Close logs left `RUNNING` for longer than `max_age`.
    pub async fn recover_interrupted_logs(&self, max_age: chrono::Duration) -> Result<u64, StoreError> {
        self.logs.fail_stale_running(Utc::now() - max_age).await
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }

    #[test]
    fn failed_result_has_no_records() {
        let result = SyncResult::failed(ALREADY_IN_PROGRESS, 0);
        assert!(!result.success);
        assert_eq!(result.records_count, 0);
        assert_eq!(result.error.as_deref(), Some("sync already in progress"));
    }
}
