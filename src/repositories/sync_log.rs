//! # SyncLog Repository
//!
//! Each sync attempt opens one `RUNNING` row and closes it exactly once.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::{StoreError, map_db_err};
use crate::models::SyncLogStatus;
use crate::models::sync_log::{ActiveModel, Column, Entity, Model};

/// Error recorded on logs left `RUNNING` by a process that went away.
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

/// Terminal outcome written when a log is closed.
#[derive(Debug, Clone)]
pub struct SyncLogOutcome {
    pub success: bool,
    pub duration_ms: i64,
    pub records_count: i32,
    pub error_message: Option<String>,
}

/// One page of sync logs, newest first.
#[derive(Debug, Clone)]
pub struct SyncLogPage {
    pub logs: Vec<Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Repository for sync log database operations
#[derive(Clone)]
pub struct SyncLogRepository {
    db: DatabaseConnection,
}

impl SyncLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn open(&self, integration_id: Uuid, started_at: DateTime<Utc>) -> Result<Model, StoreError> {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            integration_id: Set(integration_id),
            status: Set(SyncLogStatus::Running.as_str().to_string()),
            started_at: Set(started_at.fixed_offset()),
            completed_at: Set(None),
            duration_ms: Set(None),
            records_count: Set(None),
            error_message: Set(None),
        }
        .insert(&self.db)
        .await
        .map_err(|e| map_db_err("open sync log", e))
    }

    pub async fn close(&self, log: Model, outcome: SyncLogOutcome) -> Result<Model, StoreError> {
        let status = if outcome.success {
            SyncLogStatus::Success
        } else {
            SyncLogStatus::Failed
        };

        let mut active = log.into_active_model();
        active.status = Set(status.as_str().to_string());
        active.completed_at = Set(Some(Utc::now().fixed_offset()));
        active.duration_ms = Set(Some(outcome.duration_ms));
        active.records_count = Set(Some(outcome.records_count));
        active.error_message = Set(outcome.error_message);

        active
            .update(&self.db)
            .await
            .map_err(|e| map_db_err("close sync log", e))
    }

    /// Logs for one integration, newest first. `page` is zero-based.
    pub async fn list_for_integration(
        &self,
        integration_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<SyncLogPage, StoreError> {
        let per_page = per_page.max(1);
        let query = Entity::find().filter(Column::IntegrationId.eq(integration_id));

        let total = query
            .clone()
            .count(&self.db)
            .await
            .map_err(|e| map_db_err("count sync logs", e))?;

        let logs = query
            .order_by_desc(Column::StartedAt)
            .offset(page * per_page)
            .limit(per_page)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err("list sync logs", e))?;

        Ok(SyncLogPage {
            logs,
            total,
            page,
            per_page,
        })
    }

    /// Close `RUNNING` logs started before `cutoff` as failed. Returns how
    /// many were closed.
    pub async fn fail_stale_running(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let now = Utc::now().fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SyncLogStatus::Failed.as_str()))
            .col_expr(Column::CompletedAt, Expr::value(now))
            .col_expr(Column::ErrorMessage, Expr::value(INTERRUPTED_MESSAGE))
            .filter(Column::Status.eq(SyncLogStatus::Running.as_str()))
            .filter(Column::StartedAt.lt(cutoff.fixed_offset()))
            .exec(&self.db)
            .await
            .map_err(|e| map_db_err("fail stale sync logs", e))?;

        if result.rows_affected > 0 {
            tracing::warn!(
                closed = result.rows_affected,
                "Closed sync logs left running by a previous process"
            );
        }
        Ok(result.rows_affected)
    }
}
