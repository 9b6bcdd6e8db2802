//! SyncLog entity model
//!
//! This module contains the SeaORM entity model for the sync_logs table,
//! an append-only audit trail with one row per sync attempt.

use super::integration::Entity as Integration;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

/// Audit record of one sync attempt
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    /// Unique identifier for the log entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Integration the attempt belongs to
    pub integration_id: Uuid,

    /// RUNNING until closed, then SUCCESS or FAILED
    pub status: String,

    /// Timestamp when the attempt started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the attempt finished
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Wall-clock duration in milliseconds
    pub duration_ms: Option<i64>,

    /// Number of field values written
    pub records_count: Option<i32>,

    /// Failure reason for FAILED attempts
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Integration",
        from = "Column::IntegrationId",
        to = "super::integration::Column::Id"
    )]
    Integration,
}

impl Related<Integration> for Entity {
    fn to() -> RelationDef {
        Relation::Integration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
