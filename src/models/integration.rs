//! Integration entity model
//!
//! This module contains the SeaORM entity model for the integrations table,
//! which stores configured data sources together with their sync scheduling state.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Integration entity representing one configured data source
#[derive(Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    /// Unique identifier for the integration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human readable name
    pub name: String,

    /// Adapter type tag (API, GRAPHQL, MANUAL)
    pub integration_type: String,

    /// Encrypted adapter configuration (URL, auth, headers, query, field list)
    pub config_ciphertext: Vec<u8>,

    /// Status of the integration (pending|connected|synced|error)
    pub status: String,

    /// Whether the scheduler may pick this integration up
    pub sync_enabled: bool,

    /// Sync cadence in seconds; `None` means manual-only
    pub sync_interval: Option<i32>,

    /// Consecutive failed sync attempts
    pub retry_count: i32,

    /// Next time the integration becomes due
    pub next_sync_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last successful sync
    pub last_sync: Option<DateTimeWithTimeZone>,

    /// Timestamp when the integration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the integration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

// The configuration blob may hold plaintext for legacy rows; keep it out of logs.
impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("integration_type", &self.integration_type)
            .field("config_ciphertext", &"[REDACTED]")
            .field("status", &self.status)
            .field("sync_enabled", &self.sync_enabled)
            .field("sync_interval", &self.sync_interval)
            .field("retry_count", &self.retry_count)
            .field("next_sync_at", &self.next_sync_at)
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::data_field::Entity")]
    DataField,
    #[sea_orm(has_many = "super::sync_log::Entity")]
    SyncLog,
}

impl Related<super::data_field::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DataField.def()
    }
}

impl Related<super::sync_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
