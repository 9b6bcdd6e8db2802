//! # Integration Repository
//!
//! Reads and writes integration rows, including the scheduling columns the
//! sync subsystem owns.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::NullOrdering;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel, Order,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::{StoreError, map_db_err};
use crate::models::IntegrationStatus;
use crate::models::integration::{ActiveModel, Column, Entity, Model};

/// Fields required to create an integration.
#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub name: String,
    pub integration_type: String,
    pub config_ciphertext: Vec<u8>,
    pub sync_enabled: bool,
    pub sync_interval: Option<i32>,
}

/// Scheduling state written after each sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleUpdate {
    pub status: IntegrationStatus,
    pub retry_count: i32,
    pub sync_enabled: bool,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    /// Set only when this update turns an enabled integration off.
    pub auto_disabled: bool,
}

/// Repository for integration database operations
#[derive(Clone)]
pub struct IntegrationRepository {
    db: DatabaseConnection,
}

impl IntegrationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewIntegration) -> Result<Model, StoreError> {
        self.create_with_id(Uuid::new_v4(), new).await
    }

    /// Insert with a caller-chosen id, used when the configuration blob is
    /// encrypted against that id before the row exists.
    pub async fn create_with_id(&self, id: Uuid, new: NewIntegration) -> Result<Model, StoreError> {
        let now = Utc::now().fixed_offset();
        let integration = ActiveModel {
            id: Set(id),
            name: Set(new.name),
            integration_type: Set(new.integration_type),
            config_ciphertext: Set(new.config_ciphertext),
            status: Set(IntegrationStatus::Pending.as_str().to_string()),
            sync_enabled: Set(new.sync_enabled),
            sync_interval: Set(new.sync_interval),
            retry_count: Set(0),
            next_sync_at: Set(None),
            last_sync: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = integration
            .insert(&self.db)
            .await
            .map_err(|e| map_db_err("create integration", e))?;

        tracing::info!(
            integration_id = %model.id,
            integration_type = %model.integration_type,
            "Integration created"
        );
        Ok(model)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, StoreError> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| map_db_err("find integration", e))
    }

    /// Integrations whose next run has passed, plus ones never scheduled and
    /// never synced. Ordered by `next_sync_at` with never-scheduled rows first.
    pub async fn list_due(
        &self,
        sync_capable_types: &[String],
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Model>, StoreError> {
        if sync_capable_types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let due = Condition::any()
            .add(Column::NextSyncAt.lte(now.fixed_offset()))
            .add(
                Condition::all()
                    .add(Column::NextSyncAt.is_null())
                    .add(Column::LastSync.is_null()),
            );

        Entity::find()
            .filter(Column::SyncEnabled.eq(true))
            .filter(Column::SyncInterval.is_not_null())
            .filter(Column::IntegrationType.is_in(sync_capable_types.iter().cloned()))
            .filter(due)
            .order_by_with_nulls(Column::NextSyncAt, Order::Asc, NullOrdering::First)
            .order_by_asc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err("list due integrations", e))
    }

    /// Persist scheduling state on an already-loaded integration.
    pub async fn apply_schedule(
        &self,
        integration: Model,
        update: ScheduleUpdate,
    ) -> Result<Model, StoreError> {
        let mut active = integration.into_active_model();
        active.status = Set(update.status.as_str().to_string());
        active.retry_count = Set(update.retry_count);
        active.sync_enabled = Set(update.sync_enabled);
        active.next_sync_at = Set(update.next_sync_at.map(|t| t.fixed_offset()));
        if let Some(last_sync) = update.last_sync {
            active.last_sync = Set(Some(last_sync.fixed_offset()));
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(&self.db)
            .await
            .map_err(|e| map_db_err("update integration schedule", e))
    }

    pub async fn set_status(&self, id: Uuid, status: IntegrationStatus) -> Result<(), StoreError> {
        let integration = self
            .find_by_id(id)
            .await?
            .ok_or(StoreError::IntegrationNotFound { id })?;
        let mut active = integration.into_active_model();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());
        active
            .update(&self.db)
            .await
            .map_err(|e| map_db_err("update integration status", e))?;
        Ok(())
    }
}
