//! # Sync Scheduler
//!
//! Retry policy and scheduling state for integrations. Computes when an
//! integration is next due, applies exponential backoff after failures,
//! auto-disables integrations that keep failing, and answers the worker's
//! due-integration query.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::Registry;
use crate::config::RetryPolicyConfig;
use crate::error::StoreError;
use crate::models::IntegrationStatus;
use crate::models::integration::Model as IntegrationModel;
use crate::repositories::{IntegrationRepository, ScheduleUpdate};
use crate::sync_engine::SyncResult;

/// Consecutive failures tolerated before an integration is disabled.
pub const MAX_RETRIES: i32 = 3;

/// First backoff step after a failure.
pub const BASE_BACKOFF_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_backoff: Duration::seconds(BASE_BACKOFF_SECONDS),
        }
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::seconds(config.base_backoff_seconds),
        }
    }
}

impl RetryPolicy {
    /// When an integration next becomes due.
    ///
    /// No interval (or a non-positive one) means manual-only and yields `None`.
    /// A retry count within `1..=max_retries` schedules `base * 2^(n-1)` from
    /// now; anything else schedules one interval from now.
    pub fn calculate_next_sync_at(
        &self,
        sync_interval: Option<i32>,
        retry_count: i32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let interval = sync_interval.filter(|seconds| *seconds > 0)?;

        if (1..=self.max_retries).contains(&retry_count) {
            let factor = 2i32.saturating_pow((retry_count - 1) as u32);
            return Some(now + self.base_backoff * factor);
        }

        Some(now + Duration::seconds(i64::from(interval)))
    }

    /// State to persist after one sync attempt.
    pub fn next_schedule(
        &self,
        integration: &IntegrationModel,
        success: bool,
        now: DateTime<Utc>,
    ) -> ScheduleUpdate {
        if success {
            return ScheduleUpdate {
                status: IntegrationStatus::Synced,
                retry_count: 0,
                sync_enabled: integration.sync_enabled,
                next_sync_at: self.calculate_next_sync_at(integration.sync_interval, 0, now),
                last_sync: Some(now),
                auto_disabled: false,
            };
        }

        let retry_count = integration.retry_count.saturating_add(1);
        if retry_count > self.max_retries {
            return ScheduleUpdate {
                status: IntegrationStatus::Error,
                retry_count,
                sync_enabled: false,
                next_sync_at: None,
                last_sync: None,
                auto_disabled: integration.sync_enabled,
            };
        }

        ScheduleUpdate {
            status: IntegrationStatus::Error,
            retry_count,
            sync_enabled: integration.sync_enabled,
            next_sync_at: self.calculate_next_sync_at(integration.sync_interval, retry_count, now),
            last_sync: None,
            auto_disabled: false,
        }
    }
}

/// Scheduling state owner, shared by the sync engine and worker.
#[derive(Clone)]
pub struct Scheduler {
    integrations: IntegrationRepository,
    registry: Arc<Registry>,
    policy: RetryPolicy,
}

impl Scheduler {
    pub fn new(db: DatabaseConnection, registry: Arc<Registry>, policy: RetryPolicy) -> Self {
        Self {
            integrations: IntegrationRepository::new(db),
            registry,
            policy,
        }
    }

    /// Record the outcome of a sync attempt. Returns the applied update, or
    /// `None` when the integration no longer exists.
    #[instrument(skip(self, result), fields(integration_id = %integration_id, success = result.success))]
    pub async fn update_integration_after_sync(
        &self,
        integration_id: Uuid,
        result: &SyncResult,
    ) -> Result<Option<ScheduleUpdate>, StoreError> {
        let Some(integration) = self.integrations.find_by_id(integration_id).await? else {
            debug!("Integration removed before its schedule could be updated");
            return Ok(None);
        };

        let update = self.policy.next_schedule(&integration, result.success, Utc::now());
        let integration_type = integration.integration_type.clone();

        match self.integrations.apply_schedule(integration, update.clone()).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                debug!("Integration removed while its schedule was being updated");
                return Ok(None);
            }
            Err(err) => return Err(err),
        }

        if update.auto_disabled {
            counter!("integration_auto_disabled_total", "type" => integration_type).increment(1);
            warn!(
                retry_count = update.retry_count,
                max_retries = self.policy.max_retries,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Integration disabled after repeated sync failures"
            );
        } else {
            info!(
                status = %update.status,
                retry_count = update.retry_count,
                next_sync_at = ?update.next_sync_at,
                "Integration schedule updated"
            );
        }

        Ok(Some(update))
    }

    /// Enabled, scheduled, sync-capable integrations that are due now.
    pub async fn get_integrations_due_for_sync(
        &self,
        limit: u64,
    ) -> Result<Vec<IntegrationModel>, StoreError> {
        let tags = self.registry.sync_capable_tags();
        self.integrations.list_due(&tags, Utc::now(), limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn integration(retry_count: i32, sync_interval: Option<i32>) -> IntegrationModel {
        IntegrationModel {
            id: Uuid::new_v4(),
            name: "orders".to_string(),
            integration_type: "API".to_string(),
            config_ciphertext: b"{}".to_vec(),
            status: "pending".to_string(),
            sync_enabled: true,
            sync_interval,
            retry_count,
            next_sync_at: None,
            last_sync: None,
            created_at: now().fixed_offset(),
            updated_at: now().fixed_offset(),
        }
    }

    #[test]
    fn interval_schedule_without_retries() {
        let policy = RetryPolicy::default();
        for interval in [1, 60, 3600, 86_400] {
            assert_eq!(
                policy.calculate_next_sync_at(Some(interval), 0, now()),
                Some(now() + Duration::seconds(i64::from(interval)))
            );
        }
    }

    #[test]
    fn backoff_doubles_regardless_of_interval() {
        let policy = RetryPolicy::default();
        for interval in [30, 3600] {
            assert_eq!(
                policy.calculate_next_sync_at(Some(interval), 1, now()),
                Some(now() + Duration::minutes(1))
            );
            assert_eq!(
                policy.calculate_next_sync_at(Some(interval), 2, now()),
                Some(now() + Duration::minutes(2))
            );
            assert_eq!(
                policy.calculate_next_sync_at(Some(interval), 3, now()),
                Some(now() + Duration::minutes(4))
            );
        }
    }

    #[test]
    fn retry_past_max_falls_back_to_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.calculate_next_sync_at(Some(3600), 4, now()),
            Some(now() + Duration::hours(1))
        );
    }

    #[test]
    fn manual_only_has_no_next_sync() {
        let policy = RetryPolicy::default();
        for retry in 0..6 {
            assert_eq!(policy.calculate_next_sync_at(None, retry, now()), None);
        }
        assert_eq!(policy.calculate_next_sync_at(Some(0), 0, now()), None);
        assert_eq!(policy.calculate_next_sync_at(Some(-5), 1, now()), None);
    }

    #[test]
    fn success_resets_retries() {
        let update = RetryPolicy::default().next_schedule(&integration(2, Some(600)), true, now());
        assert_eq!(update.status, IntegrationStatus::Synced);
        assert_eq!(update.retry_count, 0);
        assert_eq!(update.last_sync, Some(now()));
        assert_eq!(update.next_sync_at, Some(now() + Duration::minutes(10)));
        assert!(update.sync_enabled);
    }

    #[test]
    fn fourth_consecutive_failure_disables() {
        let policy = RetryPolicy::default();
        for (previous, expected_delay) in [(0, 1), (1, 2), (2, 4)] {
            let update = policy.next_schedule(&integration(previous, Some(3600)), false, now());
            assert_eq!(update.retry_count, previous + 1);
            assert_eq!(update.status, IntegrationStatus::Error);
            assert!(update.sync_enabled);
            assert_eq!(
                update.next_sync_at,
                Some(now() + Duration::minutes(expected_delay))
            );
        }

        let update = policy.next_schedule(&integration(3, Some(3600)), false, now());
        assert_eq!(update.retry_count, 4);
        assert!(!update.sync_enabled);
        assert!(update.auto_disabled);
        assert_eq!(update.next_sync_at, None);
    }

    #[test]
    fn failures_of_disabled_integration_are_not_a_new_disable() {
        let policy = RetryPolicy::default();
        for previous in [0, 3, 7] {
            let mut disabled = integration(previous, Some(3600));
            disabled.sync_enabled = false;
            let update = policy.next_schedule(&disabled, false, now());
            assert_eq!(update.retry_count, previous + 1);
            assert!(!update.sync_enabled);
            assert!(!update.auto_disabled);
        }
    }

    #[test]
    fn policy_follows_configuration() {
        let policy = RetryPolicy::from(&RetryPolicyConfig {
            max_retries: 1,
            base_backoff_seconds: 10,
        });
        assert_eq!(
            policy.calculate_next_sync_at(Some(3600), 1, now()),
            Some(now() + Duration::seconds(10))
        );
        assert!(!policy.next_schedule(&integration(1, Some(3600)), false, now()).sync_enabled);
    }
}
